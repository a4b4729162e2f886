//! Host bridge backed by the terminal.

use std::io::{BufRead, Write};

use async_trait::async_trait;

use gatescan_client_core::bridge::{BridgeError, HostBridge, require_payload};

pub struct TerminalBridge {
    platform_user_id: Option<u64>,
    launch_payload: Option<String>,
}

impl TerminalBridge {
    pub fn new(platform_user_id: Option<u64>, launch_payload: Option<String>) -> Self {
        Self {
            platform_user_id,
            launch_payload,
        }
    }
}

#[async_trait]
impl HostBridge for TerminalBridge {
    fn launch_platform_user_id(&self) -> Option<u64> {
        self.platform_user_id
    }

    fn signed_launch_payload(&self) -> Result<String, BridgeError> {
        require_payload(self.launch_payload.clone())
    }

    fn open_external_link(&self, url: &str) -> Result<(), BridgeError> {
        println!("open link: {url}");
        Ok(())
    }

    /// Reads stdin lines as "scanned" payloads until one is accepted or
    /// input ends (the dismissed-scanner case).
    async fn capture_single_code(
        &self,
        accept: &mut (dyn for<'a> FnMut(&'a str) -> bool + Send),
    ) -> Result<Option<String>, BridgeError> {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = line.map_err(|error| BridgeError::Rejected(error.to_string()))?;
            if accept(&line) {
                return Ok(Some(line));
            }
        }
        Ok(None)
    }
}

pub fn read_line(prompt: &str) -> anyhow::Result<String> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut buffer = String::new();
    std::io::stdin().read_line(&mut buffer)?;
    Ok(buffer.trim().to_string())
}
