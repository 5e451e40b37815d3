//! Concurrent page download pipeline
//!
//! The [`Coordinator`] hands every [`PageRequest`](crate::fetch::PageRequest)
//! to exactly one worker, collects one [`PageResult`] per request and reports
//! progress as pages finish, in whatever order that happens.

mod coordinator;

pub use coordinator::Coordinator;

use crate::fetch::{FetchError, PageResult};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Page index {0} appears more than once")]
    DuplicateIndex(u32),

    #[error("Concurrency must be at least 1")]
    InvalidConcurrency,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Download worker crashed: {0}")]
    WorkerCrashed(String),

    #[error("No result recorded for page {0}")]
    MissingResult(u32),
}

/// One terminal result per requested page
#[derive(Debug, Clone, Default)]
pub struct PageResults {
    results: Vec<PageResult>,
}

impl PageResults {
    pub fn new(results: Vec<PageResult>) -> Self {
        Self { results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageResult> {
        self.results.iter()
    }

    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    /// `(index, reason)` of every failed page, by index
    pub fn failures(&self) -> Vec<(u32, String)> {
        let mut failures: Vec<(u32, String)> = self
            .results
            .iter()
            .filter_map(|r| r.failure_reason().map(|reason| (r.index, reason.to_string())))
            .collect();
        failures.sort_by_key(|(index, _)| *index);
        failures
    }

    /// Results ordered by page index
    pub fn into_sorted(mut self) -> Vec<PageResult> {
        self.results.sort_by_key(|r| r.index);
        self.results
    }
}
