//! HTTP page source for the lending library image server

use super::{FetchOutcome, PageSource};
use crate::session::Session;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, REFERER};
use tracing::{debug, warn};

/// Downloads page images with the headers the image server expects
#[derive(Debug, Clone)]
pub struct HttpPageSource {
    headers: HeaderMap,
}

impl HttpPageSource {
    /// `referer` is the library origin the image requests pretend to come from
    pub fn new(referer: &str) -> Self {
        let mut headers = HeaderMap::new();
        match HeaderValue::from_str(referer) {
            Ok(value) => {
                headers.insert(REFERER, value);
            }
            Err(e) => warn!(referer, error = %e, "Invalid referer, sending page requests without it"),
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("image/avif,image/webp,image/apng,image/*,*/*;q=0.8"),
        );
        headers.insert("sec-fetch-site", HeaderValue::from_static("same-site"));
        headers.insert("sec-fetch-mode", HeaderValue::from_static("no-cors"));
        headers.insert("sec-fetch-dest", HeaderValue::from_static("image"));

        Self { headers }
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self, session: &Session, locator: &str) -> FetchOutcome {
        debug!(url = locator, "Starting page download");

        let response = match session
            .client()
            .get(locator)
            .headers(self.headers.clone())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return FetchOutcome::Transient(describe_transport_error(&e)),
        };

        let status = response.status();
        if let Some(outcome) = classify_status(status) {
            return outcome;
        }

        if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
            if !is_image(content_type) {
                return FetchOutcome::Permanent(format!(
                    "Unexpected content type: {}",
                    content_type.to_str().unwrap_or("<binary>")
                ));
            }
        }

        match response.bytes().await {
            Ok(bytes) => {
                debug!(url = locator, size = bytes.len(), "Page download completed");
                FetchOutcome::Success(bytes)
            }
            Err(e) => FetchOutcome::Transient(format!("Failed to read body: {}", e)),
        }
    }
}

/// Map a non-success status to an outcome, `None` means the body should be read
///
/// 401/403 mean the loan lapsed; 408, 429 and 5xx are worth retrying; every
/// other error status is final.
pub fn classify_status(status: StatusCode) -> Option<FetchOutcome> {
    if status.is_success() {
        return None;
    }

    let described = format!(
        "HTTP {}: {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown")
    );

    let outcome = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchOutcome::SessionExpired,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            FetchOutcome::Transient(described)
        }
        s if s.is_server_error() => FetchOutcome::Transient(described),
        _ => FetchOutcome::Permanent(described),
    };

    Some(outcome)
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "Connection timeout".to_string()
    } else if e.is_redirect() {
        "Too many redirects".to_string()
    } else if e.is_connect() {
        format!("Connection failed: {}", e)
    } else {
        format!("HTTP request failed: {}", e)
    }
}

fn is_image(content_type: &HeaderValue) -> bool {
    content_type
        .to_str()
        .ok()
        .and_then(|value| value.parse::<mime::Mime>().ok())
        .is_none_or(|media_type| media_type.type_() == mime::IMAGE)
}
