//! Single-page fetching
//!
//! A [`PageSource`] performs one network attempt and classifies it as a
//! [`FetchOutcome`]. The [`RetryingFetcher`] turns those attempts into exactly
//! one [`PageResult`] per [`PageRequest`], renewing the session through the
//! [`SessionGate`](crate::session::SessionGate) when authorization lapses.

pub mod http;
mod retry;

pub use http::HttpPageSource;
pub use retry::{RetryPolicy, RetryingFetcher};

use crate::session::{Session, SessionError};
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// One page to download, `index` is the 1-based page number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub index: u32,
    pub locator: String,
}

impl PageRequest {
    pub fn new(index: u32, locator: impl Into<String>) -> Self {
        Self {
            index,
            locator: locator.into(),
        }
    }
}

/// Terminal state of a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    Success,
    Failed(String),
}

/// Result of downloading one page, written exactly once per request
#[derive(Debug, Clone)]
pub struct PageResult {
    pub index: u32,
    pub payload: Bytes,
    pub outcome: PageOutcome,
    /// Network attempts counted against the retry budget
    pub attempts: u32,
}

impl PageResult {
    pub fn success(index: u32, payload: Bytes, attempts: u32) -> Self {
        Self {
            index,
            payload,
            outcome: PageOutcome::Success,
            attempts,
        }
    }

    pub fn failed(index: u32, reason: impl Into<String>, attempts: u32) -> Self {
        Self {
            index,
            payload: Bytes::new(),
            outcome: PageOutcome::Failed(reason.into()),
            attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == PageOutcome::Success
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            PageOutcome::Success => None,
            PageOutcome::Failed(reason) => Some(reason),
        }
    }
}

/// Classified result of a single network attempt
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success(Bytes),
    /// Authorization lapsed, the session must be renewed
    SessionExpired,
    /// Worth retrying after a pause (timeouts, resets, 5xx)
    Transient(String),
    /// Retrying cannot help (404, 410, unexpected content)
    Permanent(String),
}

/// Source of page payloads
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Perform exactly one attempt to fetch `locator`
    async fn fetch_page(&self, session: &Session, locator: &str) -> FetchOutcome;
}

/// Errors that abort the whole download rather than a single page
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Download cancelled")]
    Cancelled,
}
