//! QR capture flow.
//!
//! A captured payload is classified once: URLs are handed to the host's
//! external-link opener, everything else is displayed as text. Host clients
//! signal acceptance twice in the worst case (the accept predicate fires,
//! then the awaited call also resolves with the payload), so the terminal
//! action is guarded by a one-shot latch; the second signal is a no-op.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::bridge::{BridgeError, HostBridge};

#[allow(clippy::expect_used)]
static ABSOLUTE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://\S+$").expect("static pattern compiles"));

#[allow(clippy::expect_used)]
static WWW_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^www\.\S+$").expect("static pattern compiles"));

/// Returns the payload as an openable URL, or `None` when it should be
/// displayed as text.
///
/// `https?://` payloads are accepted as-is; `www.` payloads are accepted with
/// an `https://` prefix. Both must survive a real URL parse.
#[must_use]
pub fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if ABSOLUTE_URL.is_match(trimmed) && Url::parse(trimmed).is_ok() {
        return Some(trimmed.to_string());
    }
    if WWW_URL.is_match(trimmed) {
        let prefixed = format!("https://{trimmed}");
        if Url::parse(&prefixed).is_ok() {
            return Some(prefixed);
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrClassification {
    /// Open via the host; never displayed raw.
    Link(String),
    /// Displayed raw; the original payload, untrimmed.
    Text(String),
}

#[must_use]
pub fn classify_payload(raw: &str) -> QrClassification {
    match normalize_url(raw) {
        Some(url) => QrClassification::Link(url),
        None => QrClassification::Text(raw.to_string()),
    }
}

/// One-shot latch around payload classification.
///
/// The first non-empty payload offered wins and is classified; every later
/// offer returns `None` so the caller performs the terminal side effect at
/// most once, no matter how many times the host signals acceptance.
#[derive(Debug, Default)]
pub struct ScanLatch {
    fired: Option<QrClassification>,
}

impl ScanLatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&mut self, payload: &str) -> Option<QrClassification> {
        if self.fired.is_some() || payload.trim().is_empty() {
            return None;
        }
        let classification = classify_payload(payload);
        self.fired = Some(classification.clone());
        Some(classification)
    }

    #[must_use]
    pub fn classification(&self) -> Option<&QrClassification> {
        self.fired.as_ref()
    }

    #[must_use]
    fn into_classification(self) -> Option<QrClassification> {
        self.fired
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The payload was a URL and the host was asked to open it.
    LinkOpened(String),
    /// The payload was opaque text, now held as the displayed result.
    TextCaptured(String),
    /// The scanner closed without an accepted payload.
    Dismissed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("scanning is not supported in this environment: {0}")]
    ScannerUnavailable(BridgeError),
    #[error("could not open link: {0}")]
    OpenLink(BridgeError),
}

/// Per-view scan state: the last displayed text result plus the scanner
/// invocation itself.
pub struct ScanFlow<'a> {
    bridge: &'a dyn HostBridge,
    displayed_text: Option<String>,
}

impl<'a> ScanFlow<'a> {
    #[must_use]
    pub fn new(bridge: &'a dyn HostBridge) -> Self {
        Self {
            bridge,
            displayed_text: None,
        }
    }

    /// Text result of the last scan, if the last accepted payload was not a
    /// URL.
    #[must_use]
    pub fn displayed_text(&self) -> Option<&str> {
        self.displayed_text.as_deref()
    }

    /// Invokes the host scanner and classifies the first non-empty payload.
    ///
    /// The full classify-and-act side effect runs inside the accept
    /// predicate because some host clients never resolve the awaited call.
    /// When the call does resolve with the payload, the latch swallows the
    /// repeat. Scanner errors leave the prior displayed result untouched.
    pub async fn scan(&mut self) -> Result<ScanOutcome, ScanError> {
        let bridge = self.bridge;
        let displayed = &mut self.displayed_text;
        let mut latch = ScanLatch::new();
        let mut open_error: Option<BridgeError> = None;

        let resolved = {
            let mut accept = |payload: &str| {
                if let Some(classification) = latch.offer(payload) {
                    if let Err(error) = act_on(bridge, displayed, classification) {
                        open_error = Some(error);
                    }
                    return true;
                }
                !payload.trim().is_empty()
            };
            bridge.capture_single_code(&mut accept).await
        };

        let resolved = resolved.map_err(ScanError::ScannerUnavailable)?;
        if let Some(payload) = resolved {
            // Redundant second signal from hosts that do resolve the call.
            if let Some(classification) = latch.offer(&payload) {
                if let Err(error) = act_on(bridge, displayed, classification) {
                    open_error = Some(error);
                }
            }
        }

        match latch.into_classification() {
            None => Ok(ScanOutcome::Dismissed),
            Some(QrClassification::Link(link)) => {
                if let Some(error) = open_error {
                    return Err(ScanError::OpenLink(error));
                }
                tracing::debug!(%link, "opened scanned link");
                Ok(ScanOutcome::LinkOpened(link))
            }
            Some(QrClassification::Text(text)) => Ok(ScanOutcome::TextCaptured(text)),
        }
    }
}

/// Terminal action for a classified payload: URLs clear the text result and
/// go to the host opener, text replaces the displayed result.
fn act_on(
    bridge: &dyn HostBridge,
    displayed: &mut Option<String>,
    classification: QrClassification,
) -> Result<(), BridgeError> {
    match classification {
        QrClassification::Link(link) => {
            *displayed = None;
            bridge.open_external_link(&link)
        }
        QrClassification::Text(text) => {
            *displayed = Some(text);
            Ok(())
        }
    }
}
