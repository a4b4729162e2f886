//! Session gate.
//!
//! Runs once per load and decides whether the main application or the login
//! flow is rendered. The checks are ordered and short-circuit: no session
//! means no profile read. Every failure along the way denies access; the
//! gate never fails open.

use crate::bridge::HostBridge;
use crate::identity::{
    IdentityBackend, IdentityError, PROFILE_SUBJECT_COLUMN, PROFILE_TABLE, ProfileRecord,
    platform_id_matches,
};

#[derive(Debug, Clone, PartialEq)]
pub enum AccessDecision {
    Granted {
        subject: String,
        platform_user_id: u64,
    },
    Denied(DenialReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DenialReason {
    /// No backend session exists.
    NoSession,
    /// The launch context carries no numeric platform user id.
    NoPlatformIdentity,
    /// No profile record for the session subject.
    NoProfile,
    /// A profile exists but was bound to a different platform user.
    PlatformMismatch {
        bound: serde_json::Value,
        current: u64,
    },
    /// A backend read failed; denied without distinguishing transient from
    /// definitive (the literal fail-closed contract).
    BackendUnavailable { message: String },
}

impl AccessDecision {
    #[must_use]
    pub fn has_access(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }
}

impl From<IdentityError> for AccessDecision {
    fn from(error: IdentityError) -> Self {
        Self::Denied(DenialReason::BackendUnavailable {
            message: error.to_string(),
        })
    }
}

/// Computes the access decision for the current load: a session must exist
/// and its profile's bound platform id must match the launch platform id.
pub async fn evaluate_access(
    backend: &dyn IdentityBackend,
    bridge: &dyn HostBridge,
) -> AccessDecision {
    let session = match backend.current_session().await {
        Ok(Some(session)) => session,
        Ok(None) => {
            tracing::debug!("access denied: no session");
            return AccessDecision::Denied(DenialReason::NoSession);
        }
        Err(error) => {
            tracing::warn!(%error, "access denied: session read failed");
            return error.into();
        }
    };

    let Some(platform_user_id) = bridge.launch_platform_user_id() else {
        tracing::debug!(subject = %session.subject, "access denied: no launch platform id");
        return AccessDecision::Denied(DenialReason::NoPlatformIdentity);
    };

    let row = match backend
        .query_one(PROFILE_TABLE, &[(PROFILE_SUBJECT_COLUMN, &session.subject)])
        .await
    {
        Ok(Some(row)) => row,
        Ok(None) => {
            tracing::debug!(subject = %session.subject, "access denied: no profile record");
            return AccessDecision::Denied(DenialReason::NoProfile);
        }
        Err(error) => {
            tracing::warn!(%error, "access denied: profile read failed");
            return error.into();
        }
    };

    let profile: ProfileRecord = match serde_json::from_value(row) {
        Ok(profile) => profile,
        Err(error) => {
            tracing::warn!(%error, "access denied: profile record malformed");
            return AccessDecision::Denied(DenialReason::BackendUnavailable {
                message: error.to_string(),
            });
        }
    };

    if platform_id_matches(&profile.platform_user_id, platform_user_id) {
        AccessDecision::Granted {
            subject: session.subject,
            platform_user_id,
        }
    } else {
        tracing::debug!(
            subject = %session.subject,
            current = platform_user_id,
            "access denied: platform id mismatch"
        );
        AccessDecision::Denied(DenialReason::PlatformMismatch {
            bound: profile.platform_user_id,
            current: platform_user_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgeError;
    use crate::identity::Session;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct StubBackend {
        session: Result<Option<Session>, IdentityError>,
        profile: Result<Option<serde_json::Value>, IdentityError>,
        profile_queries: Mutex<Vec<(String, String)>>,
    }

    impl StubBackend {
        fn new(
            session: Result<Option<Session>, IdentityError>,
            profile: Result<Option<serde_json::Value>, IdentityError>,
        ) -> Self {
            Self {
                session,
                profile,
                profile_queries: Mutex::new(Vec::new()),
            }
        }

        fn profile_query_count(&self) -> usize {
            self.profile_queries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .len()
        }
    }

    #[async_trait]
    impl IdentityBackend for StubBackend {
        async fn current_session(&self) -> Result<Option<Session>, IdentityError> {
            self.session.clone()
        }

        async fn send_one_time_code(
            &self,
            _email: &str,
            _create_if_absent: bool,
        ) -> Result<(), IdentityError> {
            Ok(())
        }

        async fn verify_code(&self, _email: &str, _code: &str) -> Result<Session, IdentityError> {
            Err(IdentityError::Rejected {
                message: "not under test".to_string(),
            })
        }

        async fn invoke_function(
            &self,
            _name: &str,
            _body: &serde_json::Value,
        ) -> Result<(), IdentityError> {
            Ok(())
        }

        async fn query_one(
            &self,
            table: &str,
            filters: &[(&str, &str)],
        ) -> Result<Option<serde_json::Value>, IdentityError> {
            let filter = filters
                .first()
                .map(|(column, value)| ((*column).to_string(), (*value).to_string()))
                .unwrap_or_default();
            self.profile_queries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push((table.to_string(), filter.1));
            self.profile.clone()
        }
    }

    struct StubBridge {
        platform_user_id: Option<u64>,
    }

    #[async_trait]
    impl HostBridge for StubBridge {
        fn launch_platform_user_id(&self) -> Option<u64> {
            self.platform_user_id
        }

        fn signed_launch_payload(&self) -> Result<String, BridgeError> {
            Err(BridgeError::Unavailable)
        }

        fn open_external_link(&self, _url: &str) -> Result<(), BridgeError> {
            Ok(())
        }

        async fn capture_single_code(
            &self,
            _accept: &mut (dyn for<'a> FnMut(&'a str) -> bool + Send),
        ) -> Result<Option<String>, BridgeError> {
            Ok(None)
        }
    }

    fn session(subject: &str) -> Session {
        Session {
            subject: subject.to_string(),
            access_token: "token".to_string(),
            email: Some("user@example.com".to_string()),
        }
    }

    #[tokio::test]
    async fn denies_without_session_and_skips_profile_query() {
        let backend = StubBackend::new(Ok(None), Ok(None));
        let bridge = StubBridge {
            platform_user_id: Some(111),
        };

        let decision = evaluate_access(&backend, &bridge).await;

        assert_eq!(decision, AccessDecision::Denied(DenialReason::NoSession));
        assert_eq!(backend.profile_query_count(), 0);
    }

    #[tokio::test]
    async fn denies_without_launch_platform_id() {
        let backend = StubBackend::new(Ok(Some(session("u1"))), Ok(None));
        let bridge = StubBridge {
            platform_user_id: None,
        };

        let decision = evaluate_access(&backend, &bridge).await;

        assert_eq!(
            decision,
            AccessDecision::Denied(DenialReason::NoPlatformIdentity)
        );
        assert_eq!(backend.profile_query_count(), 0);
    }

    #[tokio::test]
    async fn denies_when_profile_record_is_missing() {
        let backend = StubBackend::new(Ok(Some(session("u1"))), Ok(None));
        let bridge = StubBridge {
            platform_user_id: Some(111),
        };

        let decision = evaluate_access(&backend, &bridge).await;

        assert_eq!(decision, AccessDecision::Denied(DenialReason::NoProfile));
        assert_eq!(backend.profile_query_count(), 1);
    }

    #[tokio::test]
    async fn denies_on_bound_platform_mismatch() {
        let backend = StubBackend::new(
            Ok(Some(session("u1"))),
            Ok(Some(json!({ "id": "u1", "platform_user_id": 111 }))),
        );
        let bridge = StubBridge {
            platform_user_id: Some(222),
        };

        let decision = evaluate_access(&backend, &bridge).await;

        assert_eq!(
            decision,
            AccessDecision::Denied(DenialReason::PlatformMismatch {
                bound: json!(111),
                current: 222,
            })
        );
    }

    #[tokio::test]
    async fn grants_on_exact_binding() {
        let backend = StubBackend::new(
            Ok(Some(session("u1"))),
            Ok(Some(json!({ "id": "u1", "platform_user_id": 111 }))),
        );
        let bridge = StubBridge {
            platform_user_id: Some(111),
        };

        let decision = evaluate_access(&backend, &bridge).await;

        assert!(decision.has_access());
        assert_eq!(
            decision,
            AccessDecision::Granted {
                subject: "u1".to_string(),
                platform_user_id: 111,
            }
        );
    }

    #[tokio::test]
    async fn grants_when_binding_is_a_numeric_string() {
        let backend = StubBackend::new(
            Ok(Some(session("u1"))),
            Ok(Some(json!({ "id": "u1", "platform_user_id": "111" }))),
        );
        let bridge = StubBridge {
            platform_user_id: Some(111),
        };

        assert!(evaluate_access(&backend, &bridge).await.has_access());
    }

    #[tokio::test]
    async fn fails_closed_on_session_read_error() {
        let backend = StubBackend::new(
            Err(IdentityError::Request {
                message: "timeout".to_string(),
            }),
            Ok(None),
        );
        let bridge = StubBridge {
            platform_user_id: Some(111),
        };

        let decision = evaluate_access(&backend, &bridge).await;

        assert!(!decision.has_access());
        assert!(matches!(
            decision,
            AccessDecision::Denied(DenialReason::BackendUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn fails_closed_on_profile_read_error() {
        let backend = StubBackend::new(
            Ok(Some(session("u1"))),
            Err(IdentityError::Http {
                status: 503,
                body: "unavailable".to_string(),
            }),
        );
        let bridge = StubBridge {
            platform_user_id: Some(111),
        };

        assert!(!evaluate_access(&backend, &bridge).await.has_access());
    }
}
