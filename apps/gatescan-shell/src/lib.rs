//! Terminal harness for exercising the Gatescan flows against a real
//! backend. The terminal stands in for the chat-platform host: launch
//! identity comes from flags or env, links are printed instead of opened,
//! and the "scanner" reads payloads from stdin.
#![allow(clippy::print_stdout, clippy::print_stderr)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod terminal_bridge;

use clap::Parser;

use gatescan_client_core::access::evaluate_access;
use gatescan_client_core::login::{LoginError, LoginFlow, LoginPolicy, LoginStep};
use gatescan_client_core::scan::ScanFlow;
use gatescan_identity_client::{HttpIdentityClient, IdentityClientConfig};
use terminal_bridge::{TerminalBridge, read_line};

pub const DEFAULT_ALLOWED_EMAIL_SUFFIX: &str = "@gmail.com";

#[derive(Parser)]
#[command(name = "gatescan")]
#[command(about = "Gatescan mini-app smoke harness")]
pub struct GatescanCli {
    /// Backend base URL.
    #[arg(long, env = "GATESCAN_BACKEND_URL")]
    pub base_url: String,

    /// Backend anonymous API key.
    #[arg(long, env = "GATESCAN_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// Numeric platform user id the host would supply at launch.
    #[arg(long, env = "GATESCAN_PLATFORM_USER_ID")]
    pub platform_user_id: Option<u64>,

    /// Raw signed launch payload the host would supply at launch.
    #[arg(long, env = "GATESCAN_LAUNCH_PAYLOAD", hide_env_values = true)]
    pub launch_payload: Option<String>,

    /// Access token of an existing session to restore before running.
    #[arg(long, env = "GATESCAN_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Email domain suffix allowed to request login codes.
    #[arg(long, default_value = DEFAULT_ALLOWED_EMAIL_SUFFIX)]
    pub allowed_email_suffix: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Evaluate the session gate and print the access decision
    Access,
    /// Run the email one-time-code login and identity bind
    Login {
        /// Address to send the one-time code to
        #[arg(long)]
        email: String,
    },
    /// Read a payload from stdin and classify it like a scanned QR code
    Scan,
}

pub async fn run(cli: GatescanCli) -> anyhow::Result<()> {
    let client = HttpIdentityClient::new(IdentityClientConfig::new(
        cli.base_url.as_str(),
        cli.api_key.as_str(),
    ))?;
    if let Some(token) = &cli.access_token {
        let session = client.restore_session(token).await?;
        tracing::info!(subject = %session.subject, "session restored");
    }
    let bridge = TerminalBridge::new(cli.platform_user_id, cli.launch_payload.clone());

    match &cli.command {
        Commands::Access => {
            let decision = evaluate_access(&client, &bridge).await;
            println!("access: {decision:?}");
            Ok(())
        }
        Commands::Login { email } => run_login(&cli, &client, &bridge, email).await,
        Commands::Scan => {
            let mut flow = ScanFlow::new(&bridge);
            let outcome = flow.scan().await?;
            println!("scan: {outcome:?}");
            if let Some(text) = flow.displayed_text() {
                println!("displayed text: {text}");
            }
            Ok(())
        }
    }
}

async fn run_login(
    cli: &GatescanCli,
    client: &HttpIdentityClient,
    bridge: &TerminalBridge,
    email: &str,
) -> anyhow::Result<()> {
    let policy = LoginPolicy::new(cli.allowed_email_suffix.as_str());
    let mut flow = LoginFlow::new(client, bridge, policy);

    flow.request_code(email).await?;
    println!("one-time code sent to {email}");

    let code = read_line("code: ")?;
    match flow.verify_and_bind(&code).await {
        Ok(()) => {}
        Err(LoginError::Backend(error)) if flow.step() == LoginStep::Bind => {
            // Session exists; only the bind call failed and may be retried.
            println!("bind failed ({error}); retrying once");
            flow.retry_bind().await?;
        }
        Err(error) => return Err(error.into()),
    }

    println!("login complete: step={}", flow.step().as_str());
    Ok(())
}
