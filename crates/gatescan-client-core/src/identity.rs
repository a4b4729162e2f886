//! Identity backend seam and shared account types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Table holding the account-to-platform binding, keyed by the session
/// subject id.
pub const PROFILE_TABLE: &str = "profiles";
pub const PROFILE_SUBJECT_COLUMN: &str = "id";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("identity_request_failed:{message}")]
    Request { message: String },
    #[error("identity_http_{status}:{body}")]
    Http { status: u16, body: String },
    #[error("identity_json_decode_failed:{message}")]
    Decode { message: String },
    #[error("identity_rejected:{message}")]
    Rejected { message: String },
}

/// Backend session issued on successful passcode verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Subject identifier of the authenticated account.
    pub subject: String,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Backend-persisted mapping from an account subject to the platform user id
/// it was bound to.
///
/// The bound id is kept loose (`serde_json::Value`) because deployed rows
/// carry it either as a JSON number or as a numeric string; the gate compares
/// coercively via [`platform_id_matches`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProfileRecord {
    pub id: String,
    #[serde(default)]
    pub platform_user_id: serde_json::Value,
}

/// Loose equality between a stored bound platform id and the numeric id
/// supplied by the current launch context.
pub fn platform_id_matches(bound: &serde_json::Value, current: u64) -> bool {
    match bound {
        serde_json::Value::Number(number) => number.as_u64() == Some(current),
        serde_json::Value::String(text) => text.trim().parse::<u64>().ok() == Some(current),
        _ => false,
    }
}

/// Hosted identity/data backend.
///
/// `invoke_function` reaches server-side functions (the bind step);
/// `query_one` is a filtered single-row read against a named table.
#[async_trait]
pub trait IdentityBackend: Send + Sync {
    async fn current_session(&self) -> Result<Option<Session>, IdentityError>;

    /// Emails a one-time code, creating the account when `create_if_absent`.
    async fn send_one_time_code(
        &self,
        email: &str,
        create_if_absent: bool,
    ) -> Result<(), IdentityError>;

    /// Verifies an emailed code; success establishes a session.
    async fn verify_code(&self, email: &str, code: &str) -> Result<Session, IdentityError>;

    async fn invoke_function(
        &self,
        name: &str,
        body: &serde_json::Value,
    ) -> Result<(), IdentityError>;

    async fn query_one(
        &self,
        table: &str,
        filters: &[(&str, &str)],
    ) -> Result<Option<serde_json::Value>, IdentityError>;
}
