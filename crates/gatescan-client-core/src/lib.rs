#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! Client core for the Gatescan mini-app.
//!
//! The host platform (chat-app web view) and the hosted identity backend are
//! reached only through the [`bridge::HostBridge`] and
//! [`identity::IdentityBackend`] trait seams; everything in this crate is
//! plain flow logic on top of them:
//!
//! - [`access`] — the session gate deciding login flow vs. main application
//! - [`login`] — email one-time-code login and platform identity binding
//! - [`scan`] — QR capture, URL classification, link opening

pub mod access;
pub mod bridge;
pub mod identity;
pub mod login;
pub mod scan;

pub use access::{AccessDecision, DenialReason, evaluate_access};
pub use bridge::{BridgeError, HostBridge};
pub use identity::{IdentityBackend, IdentityError, ProfileRecord, Session};
pub use login::{LoginError, LoginFlow, LoginPolicy, LoginStep};
pub use scan::{QrClassification, ScanFlow, ScanOutcome, normalize_url};
