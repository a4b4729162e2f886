#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! HTTP implementation of the identity backend seam.
//!
//! Talks to a hosted backend exposing GoTrue-style auth endpoints under
//! `/auth/v1` and PostgREST-style data access under `/rest/v1`. The verified
//! session is held in-process only; there is no request retry anywhere in
//! this client (errors are terminal to the current attempt).

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use gatescan_client_core::identity::{IdentityBackend, IdentityError, Session};

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct IdentityClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_ms: u64,
}

impl IdentityClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug)]
pub struct HttpIdentityClient {
    base_url: String,
    api_key: String,
    timeout: Duration,
    http: reqwest::Client,
    session: RwLock<Option<Session>>,
}

/// Body of a successful `/auth/v1/verify` response.
#[derive(Debug, Deserialize)]
pub struct VerifyResponse {
    pub access_token: String,
    #[serde(default)]
    pub user: Option<UserRecord>,
}

#[derive(Debug, Deserialize)]
pub struct UserRecord {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl HttpIdentityClient {
    pub fn new(config: IdentityClientConfig) -> Result<Self, IdentityError> {
        let base_url = normalize_base_url(&config.base_url)?;
        Ok(Self {
            base_url,
            api_key: config.api_key,
            timeout: Duration::from_millis(config.timeout_ms.max(250)),
            http: reqwest::Client::new(),
            session: RwLock::new(None),
        })
    }

    #[must_use]
    pub fn endpoint(&self, path: &str) -> Option<String> {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.starts_with('/') {
            Some(format!("{}{}", self.base_url, trimmed))
        } else {
            Some(format!("{}/{}", self.base_url, trimmed))
        }
    }

    #[must_use]
    pub fn otp_path() -> &'static str {
        "/auth/v1/otp"
    }

    #[must_use]
    pub fn verify_path() -> &'static str {
        "/auth/v1/verify"
    }

    #[must_use]
    pub fn user_path() -> &'static str {
        "/auth/v1/user"
    }

    #[must_use]
    pub fn logout_path() -> &'static str {
        "/auth/v1/logout"
    }

    #[must_use]
    pub fn rpc_path(function: &str) -> String {
        format!("/rest/v1/rpc/{}", function.trim())
    }

    #[must_use]
    pub fn table_query_path(table: &str, filters: &[(&str, &str)]) -> String {
        let mut path = format!("/rest/v1/{}?", table.trim());
        for (column, value) in filters {
            path.push_str(&format!("{column}=eq.{value}&"));
        }
        path.push_str("limit=1");
        path
    }

    /// Restores a session from a previously issued access token by asking
    /// the backend who it belongs to.
    pub async fn restore_session(&self, access_token: &str) -> Result<Session, IdentityError> {
        let response = self
            .send(reqwest::Method::GET, Self::user_path(), None, Some(access_token))
            .await?;
        let user: UserRecord = decode_json_response(response).await?;
        let session = Session {
            subject: user.id,
            access_token: access_token.to_string(),
            email: user.email,
        };
        self.store_session(Some(session.clone()));
        Ok(session)
    }

    /// Revokes the current session on the backend and forgets it locally.
    pub async fn sign_out(&self) -> Result<(), IdentityError> {
        let Some(session) = self.session_snapshot() else {
            return Ok(());
        };
        let response = self
            .send(
                reqwest::Method::POST,
                Self::logout_path(),
                Some(serde_json::json!({})),
                Some(&session.access_token),
            )
            .await?;
        ensure_success(response).await?;
        self.store_session(None);
        Ok(())
    }

    fn session_snapshot(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn store_session(&self, session: Option<Session>) {
        *self
            .session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = session;
    }

    async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
        bearer: Option<&str>,
    ) -> Result<reqwest::Response, IdentityError> {
        let url = self.endpoint(path).ok_or(IdentityError::Request {
            message: "empty request path".to_string(),
        })?;

        let bearer = bearer
            .map(|token| token.to_string())
            .or_else(|| self.session_snapshot().map(|session| session.access_token))
            .unwrap_or_else(|| self.api_key.clone());

        let mut request = self
            .http
            .request(method, url)
            .header("apikey", &self.api_key)
            .header("x-request-id", format!("req_{}", Uuid::new_v4().simple()))
            .bearer_auth(bearer)
            .timeout(self.timeout);
        if let Some(body) = body {
            request = request.json(&body);
        }

        request.send().await.map_err(|error| IdentityError::Request {
            message: error.to_string(),
        })
    }
}

#[async_trait]
impl IdentityBackend for HttpIdentityClient {
    async fn current_session(&self) -> Result<Option<Session>, IdentityError> {
        Ok(self.session_snapshot())
    }

    async fn send_one_time_code(
        &self,
        email: &str,
        create_if_absent: bool,
    ) -> Result<(), IdentityError> {
        let body = serde_json::json!({
            "email": email,
            "create_user": create_if_absent,
        });
        let response = self
            .send(reqwest::Method::POST, Self::otp_path(), Some(body), None)
            .await?;
        ensure_success(response).await
    }

    async fn verify_code(&self, email: &str, code: &str) -> Result<Session, IdentityError> {
        let body = serde_json::json!({
            "type": "email",
            "email": email,
            "token": code,
        });
        let response = self
            .send(reqwest::Method::POST, Self::verify_path(), Some(body), None)
            .await?;
        let verified: VerifyResponse = decode_json_response(response).await?;
        let session = session_from_verify(verified)?;
        self.store_session(Some(session.clone()));
        tracing::debug!(subject = %session.subject, "session established");
        Ok(session)
    }

    async fn invoke_function(
        &self,
        name: &str,
        body: &serde_json::Value,
    ) -> Result<(), IdentityError> {
        let response = self
            .send(
                reqwest::Method::POST,
                &Self::rpc_path(name),
                Some(body.clone()),
                None,
            )
            .await?;
        ensure_success(response).await
    }

    async fn query_one(
        &self,
        table: &str,
        filters: &[(&str, &str)],
    ) -> Result<Option<serde_json::Value>, IdentityError> {
        let response = self
            .send(
                reqwest::Method::GET,
                &Self::table_query_path(table, filters),
                None,
                None,
            )
            .await?;
        let rows: Vec<serde_json::Value> = decode_json_response(response).await?;
        Ok(rows.into_iter().next())
    }
}

pub fn session_from_verify(verified: VerifyResponse) -> Result<Session, IdentityError> {
    let Some(user) = verified.user else {
        return Err(IdentityError::Decode {
            message: "verify response carried no user record".to_string(),
        });
    };
    Ok(Session {
        subject: user.id,
        access_token: verified.access_token,
        email: user.email,
    })
}

fn normalize_base_url(base_url: &str) -> Result<String, IdentityError> {
    let trimmed = base_url.trim();
    if trimmed.is_empty() {
        return Err(IdentityError::Request {
            message: "backend base url missing".to_string(),
        });
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

/// Maps an HTTP error body to the core taxonomy: client errors become
/// user-facing rejections (the backend message is surfaced verbatim), the
/// rest keep their status and raw body.
pub fn format_http_error(status: u16, body: &[u8]) -> IdentityError {
    let text = String::from_utf8_lossy(body).trim().to_string();
    if (400..500).contains(&status) {
        if let Some(message) = rejection_message(&text) {
            return IdentityError::Rejected { message };
        }
    }
    let body = if text.is_empty() {
        "<empty>".to_string()
    } else {
        text
    };
    IdentityError::Http { status, body }
}

fn rejection_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    for key in ["msg", "message", "error_description"] {
        if let Some(message) = value.get(key).and_then(|v| v.as_str()) {
            if !message.trim().is_empty() {
                return Some(message.trim().to_string());
            }
        }
    }
    None
}

async fn ensure_success(response: reqwest::Response) -> Result<(), IdentityError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let bytes = response.bytes().await.unwrap_or_default();
    Err(format_http_error(status.as_u16(), &bytes))
}

async fn decode_json_response<T>(response: reqwest::Response) -> Result<T, IdentityError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let status = response.status();
    let bytes = response.bytes().await.map_err(|error| IdentityError::Request {
        message: error.to_string(),
    })?;

    if !status.is_success() {
        return Err(format_http_error(status.as_u16(), &bytes));
    }

    serde_json::from_slice::<T>(&bytes).map_err(|error| IdentityError::Decode {
        message: error.to_string(),
    })
}
