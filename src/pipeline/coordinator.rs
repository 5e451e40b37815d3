use super::{PageResults, PipelineError};
use crate::fetch::{FetchError, PageOutcome, PageRequest, PageResult, RetryingFetcher};
use crate::observability::Progress;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Dispatches page requests to a bounded pool of download workers
///
/// Architecture:
/// 1. Requests are frozen into a shared slice before any worker starts
/// 2. Each worker claims the next slot with an atomic counter, so every
///    request is fetched by exactly one worker
/// 3. Results travel back over an mpsc channel tagged with their slot
/// 4. The coordinator stores each result in its slot and reports progress
///
/// A fatal fetch error cancels the shared token; the remaining workers stop at
/// their next suspension point and the error is returned.
pub struct Coordinator {
    fetcher: Arc<RetryingFetcher>,
    cancel: CancellationToken,
}

impl Coordinator {
    /// `cancel` should be the same token the fetcher was built with
    pub fn new(fetcher: RetryingFetcher, cancel: CancellationToken) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            cancel,
        }
    }

    /// Download every request with at most `concurrency` pages in flight
    pub async fn run(
        &self,
        requests: Vec<PageRequest>,
        concurrency: usize,
    ) -> Result<PageResults, PipelineError> {
        if concurrency == 0 {
            return Err(PipelineError::InvalidConcurrency);
        }
        ensure_unique_indices(&requests)?;

        let total = requests.len();
        if total == 0 {
            return Ok(PageResults::default());
        }

        let requests: Arc<[PageRequest]> = requests.into();
        let next = Arc::new(AtomicUsize::new(0));
        let workers = concurrency.min(total);
        let progress = Progress::new(total as u64);
        let (tx, mut rx) = mpsc::channel::<(usize, PageResult)>(workers);

        info!(pages = total, workers, "Downloading pages");

        let mut set = JoinSet::new();
        for worker_id in 0..workers {
            let requests = Arc::clone(&requests);
            let next = Arc::clone(&next);
            let fetcher = Arc::clone(&self.fetcher);
            let cancel = self.cancel.clone();
            let tx = tx.clone();

            set.spawn(async move {
                loop {
                    let slot = next.fetch_add(1, Ordering::Relaxed);
                    let Some(request) = requests.get(slot) else {
                        break;
                    };

                    let result = match fetcher.fetch(request).await {
                        Ok(result) => result,
                        Err(e) => {
                            cancel.cancel();
                            return Err(e);
                        }
                    };

                    if tx.send((slot, result)).await.is_err() {
                        break;
                    }
                }
                debug!(worker_id, "Worker drained the queue");
                Ok::<(), FetchError>(())
            });
        }
        drop(tx);

        let mut slots: Vec<Option<PageResult>> = vec![None; total];
        while let Some((slot, result)) = rx.recv().await {
            record(&progress, &result);
            slots[slot] = Some(result);
        }

        // Every sender is gone, so every worker has finished
        let mut fatal: Option<PipelineError> = None;
        while let Some(joined) = set.join_next().await {
            let err = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => PipelineError::Fetch(e),
                Err(e) => PipelineError::WorkerCrashed(e.to_string()),
            };
            // Prefer the root cause over the cancellations it triggered
            let replace = match &fatal {
                None => true,
                Some(PipelineError::Fetch(FetchError::Cancelled)) => {
                    !matches!(err, PipelineError::Fetch(FetchError::Cancelled))
                }
                Some(_) => false,
            };
            if replace {
                fatal = Some(err);
            }
        }
        if let Some(err) = fatal {
            error!(error = %err, "Page download aborted");
            return Err(err);
        }

        let results = slots
            .into_iter()
            .enumerate()
            .map(|(slot, result)| result.ok_or(PipelineError::MissingResult(requests[slot].index)))
            .collect::<Result<Vec<_>, _>>()?;

        let summary = progress.snapshot();
        info!(
            pages = summary.total,
            failed = summary.failed,
            bytes = summary.bytes,
            "All pages resolved"
        );

        Ok(PageResults::new(results))
    }
}

fn ensure_unique_indices(requests: &[PageRequest]) -> Result<(), PipelineError> {
    let mut seen = HashSet::with_capacity(requests.len());
    for request in requests {
        if !seen.insert(request.index) {
            return Err(PipelineError::DuplicateIndex(request.index));
        }
    }
    Ok(())
}

fn record(progress: &Progress, result: &PageResult) {
    let snapshot = match &result.outcome {
        PageOutcome::Success => progress.page_succeeded(result.payload.len() as u64),
        PageOutcome::Failed(reason) => {
            debug!(index = result.index, error = %reason, "Page recorded as failed");
            progress.page_failed()
        }
    };

    debug!(
        index = result.index,
        completed = snapshot.completed,
        total = snapshot.total,
        "Page finished"
    );

    if snapshot.crossed_decile() {
        info!(
            completed = snapshot.completed,
            total = snapshot.total,
            failed = snapshot.failed,
            "Download progress {}%",
            snapshot.percent()
        );
    }
}
