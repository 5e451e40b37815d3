//! Lending library collaborators
//!
//! Login, loan bookkeeping and page locator discovery. Each concern is a
//! trait so the download flow can be exercised without the real service;
//! [`ArchiveClient`] implements all of them over HTTP.

mod book;
mod client;

pub use book::{BookInfo, BookUrl, Credentials, sanitize_title};
pub use client::{ArchiveClient, NOT_BORROWABLE};

use crate::session::{Reauthorize, RecoveryError, Session, SessionError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unexpected response while {context} (HTTP {status}): {body}")]
    UnexpectedResponse {
        context: &'static str,
        status: u16,
        body: String,
    },

    #[error("Loan error: {0}")]
    Loan(String),

    #[error("Unable to retrieve page images: found {0} page(s)")]
    NotEnoughPages(usize),

    #[error("Invalid book URL {url}: {reason}")]
    InvalidBookUrl { url: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Malformed response while {context}: {reason}")]
    Decode {
        context: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Whether the library actually lent the book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanStatus {
    Borrowed,
    /// The book is open access and needs no loan
    NotRequired,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<Session, ArchiveError>;
}

#[async_trait]
pub trait LocatorResolver: Send + Sync {
    async fn resolve(&self, session: &Session, book: &BookUrl) -> Result<BookInfo, ArchiveError>;
}

#[async_trait]
pub trait LoanManager: Send + Sync {
    async fn acquire(&self, session: &Session, book_id: &str) -> Result<LoanStatus, ArchiveError>;

    async fn release(&self, session: &Session, book_id: &str) -> Result<(), ArchiveError>;
}

/// Renews a lapsed session by borrowing the book again on the same cookie jar
pub struct LoanRenewal {
    loans: Arc<dyn LoanManager>,
    book_id: String,
}

impl LoanRenewal {
    pub fn new(loans: Arc<dyn LoanManager>, book_id: impl Into<String>) -> Self {
        Self {
            loans,
            book_id: book_id.into(),
        }
    }
}

#[async_trait]
impl Reauthorize for LoanRenewal {
    async fn reauthorize(&self, session: &Session) -> Result<Session, RecoveryError> {
        let status = self.loans.acquire(session, &self.book_id).await?;
        info!(book_id = %self.book_id, ?status, "Loan renewed");
        Ok(session.clone())
    }
}
