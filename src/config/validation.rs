use super::models::Config;
use thiserror::Error;

/// Highest (lowest-quality) scale the image server accepts
pub const MAX_RESOLUTION: u8 = 10;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("download.concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("download.max_retries must be at least 1")]
    InvalidMaxRetries,

    #[error("download.resolution must be between 0 and {max}, got {value}")]
    ResolutionOutOfRange { value: u8, max: u8 },

    #[error("Invalid archive.base_url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Timeout must be positive: {field} = 0")]
    InvalidTimeout { field: &'static str },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_archive(config)?;
    validate_http(config)?;
    validate_download(config)?;
    Ok(())
}

/// Base URL must be an absolute http(s) URL
fn validate_archive(config: &Config) -> Result<(), ValidationError> {
    let base_url = &config.archive.base_url;
    let parsed = reqwest::Url::parse(base_url).map_err(|e| ValidationError::InvalidBaseUrl {
        url: base_url.clone(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ValidationError::InvalidBaseUrl {
            url: base_url.clone(),
            reason: format!("unsupported scheme '{}', expected http or https", scheme),
        }),
    }
}

fn validate_http(config: &Config) -> Result<(), ValidationError> {
    if config.http.connect_timeout_secs == 0 {
        return Err(ValidationError::InvalidTimeout {
            field: "http.connect_timeout_secs",
        });
    }
    if config.http.request_timeout_secs == 0 {
        return Err(ValidationError::InvalidTimeout {
            field: "http.request_timeout_secs",
        });
    }
    Ok(())
}

fn validate_download(config: &Config) -> Result<(), ValidationError> {
    let download = &config.download;

    if download.concurrency == 0 {
        return Err(ValidationError::InvalidConcurrency);
    }
    if download.max_retries == 0 {
        return Err(ValidationError::InvalidMaxRetries);
    }
    if download.resolution > MAX_RESOLUTION {
        return Err(ValidationError::ResolutionOutOfRange {
            value: download.resolution,
            max: MAX_RESOLUTION,
        });
    }

    Ok(())
}
