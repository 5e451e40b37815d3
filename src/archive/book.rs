use super::ArchiveError;
use serde_json::Value;
use std::fmt;

const FORBIDDEN_TITLE_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const MAX_TITLE_CHARS: usize = 150;

/// Account used to borrow books
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A validated `<base>/details/<id>` book address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookUrl {
    url: String,
    id: String,
}

impl BookUrl {
    pub fn parse(raw: &str, base_url: &str) -> Result<Self, ArchiveError> {
        let raw = raw.trim();
        let prefix = format!("{}/details/", base_url.trim_end_matches('/'));

        let Some(rest) = raw.strip_prefix(&prefix) else {
            return Err(ArchiveError::InvalidBookUrl {
                url: raw.to_string(),
                reason: format!("URL must start with \"{}\"", prefix),
            });
        };

        let id = rest.split(['/', '?', '#']).next().unwrap_or_default();
        if id.is_empty() {
            return Err(ArchiveError::InvalidBookUrl {
                url: raw.to_string(),
                reason: "missing book identifier".to_string(),
            });
        }

        Ok(Self {
            url: raw.to_string(),
            id: id.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for BookUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Everything needed to download a book
#[derive(Debug, Clone)]
pub struct BookInfo {
    /// Filesystem-safe title
    pub title: String,
    /// Page image addresses in reading order
    pub locators: Vec<String>,
    pub metadata: Value,
}

/// Make a title usable as a file or directory name
pub fn sanitize_title(raw: &str) -> String {
    raw.trim()
        .replace(' ', "_")
        .chars()
        .filter(|c| !FORBIDDEN_TITLE_CHARS.contains(c))
        .take(MAX_TITLE_CHARS)
        .collect()
}
