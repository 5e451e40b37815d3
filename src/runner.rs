//! Downloads one book from loan to finished artifact

use crate::archive::{ArchiveError, BookUrl, LoanManager, LoanRenewal, LoanStatus, LocatorResolver};
use crate::assemble::naming::create_unique_dir;
use crate::assemble::{AssembleError, Artifact, AssemblyTarget, OutputMode, assemble};
use crate::fetch::{PageRequest, PageSource, RetryPolicy, RetryingFetcher};
use crate::pipeline::{Coordinator, PipelineError};
use crate::session::{Session, SessionGate};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum BookError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Assemble(#[from] AssembleError),

    #[error("Failed to create output directory: {0}")]
    OutputDir(#[source] std::io::Error),

    #[error("Assembly task failed: {0}")]
    AssemblyTask(String),
}

/// Per-run settings shared by every book
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Existing directory that receives the PDF or the per-book image folder
    pub output_dir: PathBuf,
    pub mode: OutputMode,
    pub save_metadata: bool,
    pub resolution: u8,
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct BookReport {
    pub book_id: String,
    pub title: String,
    pub total_pages: usize,
    pub artifact: Artifact,
    /// `(index, reason)` for every page missing from the artifact
    pub failures: Vec<(u32, String)>,
    /// Loan renewals needed during the download
    pub renewals: u64,
}

/// Append the scale parameters the image server expects to each locator
pub fn page_requests(locators: &[String], resolution: u8) -> Vec<PageRequest> {
    locators
        .iter()
        .enumerate()
        .map(|(i, locator)| {
            let separator = if locator.contains('?') { '&' } else { '?' };
            PageRequest::new(
                i as u32 + 1,
                format!("{}{}rotate=0&scale={}", locator, separator, resolution),
            )
        })
        .collect()
}

pub struct BookRunner {
    loans: Arc<dyn LoanManager>,
    resolver: Arc<dyn LocatorResolver>,
    source: Arc<dyn PageSource>,
    options: DownloadOptions,
}

impl BookRunner {
    pub fn new(
        loans: Arc<dyn LoanManager>,
        resolver: Arc<dyn LocatorResolver>,
        source: Arc<dyn PageSource>,
        options: DownloadOptions,
    ) -> Self {
        Self {
            loans,
            resolver,
            source,
            options,
        }
    }

    /// Borrow, download, assemble and return one book
    ///
    /// The loan is returned whenever it was granted, even if the download
    /// failed. A failed return is only logged.
    pub async fn run(
        &self,
        session: &Session,
        book: &BookUrl,
        cancel: &CancellationToken,
    ) -> Result<BookReport, BookError> {
        let book_id = book.id();
        info!(book_id, url = %book, "Starting book");

        let loan = self.loans.acquire(session, book_id).await?;
        let result = self.download(session, book, cancel).await;

        if loan == LoanStatus::Borrowed {
            if let Err(e) = self.loans.release(session, book_id).await {
                warn!(book_id, error = %e, "Failed to return the book");
            }
        }

        let report = result?;
        for (index, reason) in &report.failures {
            warn!(book_id, page = index, reason = %reason, "Page missing from output");
        }
        if !report.failures.is_empty() {
            warn!(
                book_id,
                excluded = report.failures.len(),
                total = report.total_pages,
                "Book is incomplete"
            );
        }
        Ok(report)
    }

    async fn download(
        &self,
        session: &Session,
        book: &BookUrl,
        cancel: &CancellationToken,
    ) -> Result<BookReport, BookError> {
        let book_id = book.id();
        let info = self.resolver.resolve(session, book).await?;
        let requests = page_requests(&info.locators, self.options.resolution);
        let total_pages = requests.len();

        let renewal = Arc::new(LoanRenewal::new(Arc::clone(&self.loans), book_id));
        let gate = Arc::new(SessionGate::new(session.clone(), renewal));
        let token = cancel.child_token();
        let fetcher = RetryingFetcher::new(
            Arc::clone(&self.source),
            Arc::clone(&gate),
            self.options.retry.clone(),
            token.clone(),
        );

        let results = Coordinator::new(fetcher, token)
            .run(requests, self.options.concurrency)
            .await?;

        if results.success_count() == 0 {
            warn!(book_id, pages = total_pages, "No page was downloaded, nothing to save");
            return Ok(BookReport {
                book_id: book_id.to_string(),
                title: info.title,
                total_pages,
                artifact: Artifact::Empty,
                failures: results.failures(),
                renewals: gate.refresh_count(),
            });
        }

        // Created only once there is something to put in it
        let dir = match self.options.mode {
            OutputMode::Images => create_unique_dir(&self.options.output_dir, &info.title)
                .map_err(BookError::OutputDir)?,
            OutputMode::Pdf => self.options.output_dir.clone(),
        };

        let mode = self.options.mode;
        let target = AssemblyTarget {
            dir,
            title: info.title.clone(),
            metadata: info.metadata,
            save_metadata: self.options.save_metadata,
        };
        let assembly = tokio::task::spawn_blocking(move || assemble(results, mode, &target))
            .await
            .map_err(|e| BookError::AssemblyTask(e.to_string()))??;

        match &assembly.artifact {
            Artifact::Document { path, pages } => {
                info!(book_id, path = %path.display(), pages, "PDF saved")
            }
            Artifact::Images { dir, files } => {
                info!(book_id, dir = %dir.display(), pages = files.len(), "Images saved")
            }
            Artifact::Empty => warn!(book_id, "Nothing saved"),
        }

        Ok(BookReport {
            book_id: book_id.to_string(),
            title: info.title,
            total_pages,
            artifact: assembly.artifact,
            failures: assembly.failures,
            renewals: gate.refresh_count(),
        })
    }
}
