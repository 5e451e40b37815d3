//! Authenticated session handle and single-flight renewal

mod gate;

pub use gate::{Reauthorize, RecoveryError, SessionGate, SessionSnapshot};

use crate::config::HttpConfig;
use reqwest::Client;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),

    #[error("Session recovery failed: {0}")]
    RecoveryFailed(String),
}

/// Authenticated handle shared by every request of a run
///
/// Clones share the same connection pool and cookie jar, so renewing the
/// loan through one clone refreshes the session for all of them.
#[derive(Debug, Clone)]
pub struct Session {
    client: Client,
}

impl Session {
    /// Create an anonymous session with its own cookie jar
    pub fn new(config: &HttpConfig, user_agent: &str) -> Result<Self, SessionError> {
        let client = Client::builder()
            .cookie_store(true)
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}
