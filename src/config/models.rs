use crate::fetch::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub download: DownloadConfig,
}

/// Lending library endpoint and account settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Account email (loaded from environment, not from config file)
    #[serde(skip)]
    pub email: Option<String>,
    /// Account password (loaded from environment, not from config file)
    #[serde(skip)]
    pub password: Option<String>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            email: None,
            password: None,
        }
    }
}

fn default_base_url() -> String {
    "https://archive.org".to_string()
}

fn default_user_agent() -> String {
    "bookfetch/0.1.0".to_string()
}

/// HTTP client timeouts
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}

/// Page download pipeline settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    /// Number of pages fetched in parallel
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Counted attempts per page before it is recorded as failed
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Loan renewals a single page may trigger before it gives up
    #[serde(default = "default_max_session_renewals")]
    pub max_session_renewals: u32,
    /// Image scale requested from the server, 0 is the highest quality
    #[serde(default = "default_resolution")]
    pub resolution: u8,
}

impl DownloadConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: Duration::from_millis(self.retry_backoff_ms),
            max_session_renewals: self.max_session_renewals,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_session_renewals: default_max_session_renewals(),
            resolution: default_resolution(),
        }
    }
}

fn default_concurrency() -> usize {
    50
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_max_session_renewals() -> u32 {
    10
}

fn default_resolution() -> u8 {
    3
}
