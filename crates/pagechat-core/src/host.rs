//! Messaging with the page host.
//!
//! The host owns the tab; the content script inside it answers snapshot
//! requests. A content script that is not loaded yet gets injected and the
//! request is retried a bounded number of times.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::dom::Document;
use crate::extract::{ExtractOptions, PageSnapshot, extract_with};

/// Status shown when the page cannot be reached.
pub const UNREACHABLE_MESSAGE: &str = "Could not access page content. Try refreshing the page.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostErrorKind {
    /// No content script answered the request
    NotResponding,
    /// The content script could not be injected
    InjectionFailed,
    /// Every attempt went unanswered
    Exhausted,
}

impl fmt::Display for HostErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostErrorKind::NotResponding => write!(f, "not_responding"),
            HostErrorKind::InjectionFailed => write!(f, "injection_failed"),
            HostErrorKind::Exhausted => write!(f, "exhausted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostError {
    pub kind: HostErrorKind,
    pub message: String,
}

impl HostError {
    pub fn new(kind: HostErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_responding() -> Self {
        Self::new(HostErrorKind::NotResponding, "Receiving end does not exist")
    }

    pub fn injection_failed(message: impl Into<String>) -> Self {
        Self::new(HostErrorKind::InjectionFailed, message)
    }

    fn exhausted() -> Self {
        Self::new(HostErrorKind::Exhausted, UNREACHABLE_MESSAGE)
    }

    /// True when the user should be told the page is unreachable.
    pub fn is_terminal(&self) -> bool {
        self.kind != HostErrorKind::NotResponding
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for HostError {}

pub type HostResult<T> = std::result::Result<T, HostError>;

/// A tab that can answer snapshot requests.
pub trait PageHost {
    /// Asks the content script for a snapshot.
    ///
    /// `Ok(None)` means the script answered without content.
    fn request_snapshot(&mut self) -> impl Future<Output = HostResult<Option<PageSnapshot>>> + Send;

    /// Loads the content script into the tab.
    fn inject(&mut self) -> impl Future<Output = HostResult<()>> + Send;
}

/// Attempt count and the waits around an injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub injection_delay: Duration,
    pub settle_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            injection_delay: Duration::from_millis(200),
            settle_delay: Duration::from_millis(500),
        }
    }
}

/// Requests a snapshot, injecting the content script between attempts.
///
/// Errors other than [`HostErrorKind::NotResponding`] end the retry loop
/// immediately. Running out of attempts yields [`HostErrorKind::Exhausted`]
/// carrying [`UNREACHABLE_MESSAGE`].
pub async fn fetch_snapshot<H: PageHost>(
    host: &mut H,
    policy: &RetryPolicy,
) -> HostResult<Option<PageSnapshot>> {
    let attempts = policy.attempts.max(1);
    for attempt in 1..=attempts {
        match host.request_snapshot().await {
            Ok(snapshot) => {
                debug!(attempt, found = snapshot.is_some(), "snapshot received");
                return Ok(snapshot);
            }
            Err(err) if err.kind == HostErrorKind::NotResponding => {
                if attempt == attempts {
                    break;
                }
                debug!(attempt, "content script not responding, injecting");
                tokio::time::sleep(policy.injection_delay).await;
                if let Err(err) = host.inject().await {
                    warn!(error = %err, "content script injection failed");
                    return Err(HostError::injection_failed(err.message));
                }
                tokio::time::sleep(policy.settle_delay).await;
            }
            Err(err) => return Err(err),
        }
    }

    warn!(attempts, "page host never answered");
    Err(HostError::exhausted())
}

/// Host backed by an already serialized document.
///
/// The content script is always present, so injection is a no-op.
#[derive(Debug, Clone)]
pub struct DocumentHost {
    document: Document,
    options: ExtractOptions,
}

impl DocumentHost {
    pub fn new(document: Document, options: ExtractOptions) -> Self {
        Self { document, options }
    }
}

impl PageHost for DocumentHost {
    async fn request_snapshot(&mut self) -> HostResult<Option<PageSnapshot>> {
        Ok(Some(extract_with(&self.document, &self.options)))
    }

    async fn inject(&mut self) -> HostResult<()> {
        Ok(())
    }
}
