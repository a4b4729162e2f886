//! Login/bind flow.
//!
//! Collects an email, requests a one-time code, verifies it, then binds the
//! verified account to the platform identity supplied by the host launch
//! context. The flow is an explicit finite-state value owned by the view;
//! transitions happen only through the operations below, and a busy latch
//! rejects overlapping dispatches (the render layer disables its buttons
//! while a call is in flight, but the flow does not rely on that alone).

use crate::bridge::{BridgeError, HostBridge};
use crate::identity::{IdentityBackend, IdentityError};

/// Server-side function that validates the signed launch payload and writes
/// the account-to-platform binding.
pub const BIND_FUNCTION: &str = "bind_platform_identity";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStep {
    /// Collecting an email address.
    Email,
    /// Collecting the emailed one-time code.
    Otp,
    /// Code verified and a session exists, but the bind call failed; only
    /// the bind step is retried, never the whole login.
    Bind,
    /// Bound; the caller routes into the main application.
    Complete,
}

impl LoginStep {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Otp => "otp",
            Self::Bind => "bind",
            Self::Complete => "complete",
        }
    }
}

/// Email acceptance policy: only addresses ending in the configured domain
/// suffix may request a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPolicy {
    allowed_email_suffix: String,
}

impl LoginPolicy {
    #[must_use]
    pub fn new(allowed_email_suffix: impl Into<String>) -> Self {
        Self {
            allowed_email_suffix: allowed_email_suffix.into().to_lowercase(),
        }
    }

    #[must_use]
    pub fn allows(&self, normalized_email: &str) -> bool {
        normalized_email.ends_with(&self.allowed_email_suffix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoginError {
    #[error("email must not be empty")]
    EmptyEmail,
    #[error("email domain is not allowed")]
    DisallowedDomain,
    #[error("verification code must not be empty")]
    EmptyCode,
    #[error("another request is still in flight")]
    Busy,
    #[error("operation not valid in step {step}")]
    WrongStep { step: &'static str },
    #[error("platform identity unavailable: {0}")]
    Environment(#[from] BridgeError),
    #[error(transparent)]
    Backend(#[from] IdentityError),
}

pub fn normalize_email(raw: &str) -> Result<String, LoginError> {
    let normalized = raw.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(LoginError::EmptyEmail);
    }
    Ok(normalized)
}

pub fn normalize_code(raw: &str) -> Result<String, LoginError> {
    let collapsed = raw.split_whitespace().collect::<String>();
    if collapsed.is_empty() {
        return Err(LoginError::EmptyCode);
    }
    Ok(collapsed)
}

pub struct LoginFlow<'a> {
    backend: &'a dyn IdentityBackend,
    bridge: &'a dyn HostBridge,
    policy: LoginPolicy,
    step: LoginStep,
    email: Option<String>,
    busy: bool,
}

impl<'a> LoginFlow<'a> {
    #[must_use]
    pub fn new(
        backend: &'a dyn IdentityBackend,
        bridge: &'a dyn HostBridge,
        policy: LoginPolicy,
    ) -> Self {
        Self {
            backend,
            bridge,
            policy,
            step: LoginStep::Email,
            email: None,
            busy: false,
        }
    }

    #[must_use]
    pub fn step(&self) -> LoginStep {
        self.step
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Email the flow is verifying a code for, once past the `Email` step.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Validates the address against the policy and asks the backend to email
    /// a one-time code, creating the account if absent. Policy rejections
    /// never reach the backend; backend errors keep the flow at `Email`.
    pub async fn request_code(&mut self, email: &str) -> Result<(), LoginError> {
        self.ensure_step(LoginStep::Email)?;
        let normalized = normalize_email(email)?;
        if !self.policy.allows(&normalized) {
            return Err(LoginError::DisallowedDomain);
        }

        self.begin()?;
        let result = self.backend.send_one_time_code(&normalized, true).await;
        self.busy = false;

        result?;
        self.email = Some(normalized);
        self.step = LoginStep::Otp;
        Ok(())
    }

    /// Verifies the emailed code, then binds the now-authenticated account to
    /// the signed launch payload.
    ///
    /// The payload is read before anything else: without it the backend could
    /// create a session that can never be bound, so the flow aborts with an
    /// environment error and makes no verify call. A verify failure keeps the
    /// flow at `Otp`; a bind failure leaves the fresh session intact and
    /// parks the flow at `Bind` for [`Self::retry_bind`].
    pub async fn verify_and_bind(&mut self, code: &str) -> Result<(), LoginError> {
        self.ensure_step(LoginStep::Otp)?;
        let code = normalize_code(code)?;
        let Some(email) = self.email.clone() else {
            return Err(LoginError::WrongStep {
                step: self.step.as_str(),
            });
        };

        let payload = self.bridge.signed_launch_payload()?;

        self.begin()?;
        let verified = self.backend.verify_code(&email, &code).await;
        match verified {
            Ok(session) => {
                tracing::debug!(subject = %session.subject, "code verified, binding identity");
            }
            Err(error) => {
                self.busy = false;
                return Err(error.into());
            }
        }

        let bound = self.invoke_bind(&payload).await;
        self.busy = false;
        bound
    }

    /// Repeats only the bind call after a bind failure.
    pub async fn retry_bind(&mut self) -> Result<(), LoginError> {
        self.ensure_step(LoginStep::Bind)?;
        let payload = self.bridge.signed_launch_payload()?;

        self.begin()?;
        let bound = self.invoke_bind(&payload).await;
        self.busy = false;
        bound
    }

    /// Manual `Otp`/`Bind` → `Email` transition.
    pub fn back_to_email(&mut self) -> Result<(), LoginError> {
        if self.busy {
            return Err(LoginError::Busy);
        }
        match self.step {
            LoginStep::Otp | LoginStep::Bind => {
                self.step = LoginStep::Email;
                self.email = None;
                Ok(())
            }
            step => Err(LoginError::WrongStep {
                step: step.as_str(),
            }),
        }
    }

    async fn invoke_bind(&mut self, payload: &str) -> Result<(), LoginError> {
        let body = serde_json::json!({ "payload": payload });
        match self.backend.invoke_function(BIND_FUNCTION, &body).await {
            Ok(()) => {
                self.step = LoginStep::Complete;
                Ok(())
            }
            Err(error) => {
                tracing::warn!(%error, "identity bind failed, session left intact");
                self.step = LoginStep::Bind;
                Err(error.into())
            }
        }
    }

    fn ensure_step(&self, expected: LoginStep) -> Result<(), LoginError> {
        if self.step == expected {
            Ok(())
        } else {
            Err(LoginError::WrongStep {
                step: self.step.as_str(),
            })
        }
    }

    fn begin(&mut self) -> Result<(), LoginError> {
        if self.busy {
            return Err(LoginError::Busy);
        }
        self.busy = true;
        Ok(())
    }
}
