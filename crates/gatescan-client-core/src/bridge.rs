//! Host bridge seam.
//!
//! Host-bridge calls can throw synchronously or reject asynchronously for
//! environment reasons the client cannot predict (old host versions, desktop
//! clients without a camera). Every capability is therefore exposed as a
//! `Result` over [`BridgeError`] so call sites handle failure uniformly
//! instead of relying on ambient exception propagation.

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("host capability unavailable in this environment")]
    Unavailable,
    #[error("host bridge rejected the call: {0}")]
    Rejected(String),
}

/// Native capabilities provided by the chat-platform host.
///
/// `capture_single_code` drives the host QR scanner. The `accept` predicate
/// receives each decoded payload as it arrives and returns whether to
/// accept-and-close. Some host clients invoke the predicate but never resolve
/// the awaited call, so callers must perform their terminal side effect from
/// inside the predicate; a resolved `Ok(Some(_))` repeats the accepted
/// payload.
#[async_trait]
pub trait HostBridge: Send + Sync {
    /// Numeric platform user id from the launch context, if the host
    /// supplied one.
    fn launch_platform_user_id(&self) -> Option<u64>;

    /// Raw signed launch payload proving the user's platform identity.
    ///
    /// The payload is untrusted client-side; only a backend verifies its
    /// signature. Implementations map an absent or empty payload to
    /// [`BridgeError::Unavailable`].
    fn signed_launch_payload(&self) -> Result<String, BridgeError>;

    /// Asks the host to open `url` outside the mini-app.
    fn open_external_link(&self, url: &str) -> Result<(), BridgeError>;

    /// Runs the host scanner until `accept` returns `true`, the user
    /// dismisses it (`Ok(None)`), or the environment does not support
    /// scanning (`Err`).
    async fn capture_single_code(
        &self,
        accept: &mut (dyn for<'a> FnMut(&'a str) -> bool + Send),
    ) -> Result<Option<String>, BridgeError>;
}

/// Normalizes an optional raw payload the way `signed_launch_payload`
/// implementations are expected to: trimmed, never empty.
pub fn require_payload(raw: Option<String>) -> Result<String, BridgeError> {
    match raw {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(BridgeError::Unavailable),
    }
}
