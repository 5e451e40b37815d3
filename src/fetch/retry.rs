use super::{FetchError, FetchOutcome, PageRequest, PageResult, PageSource};
use crate::session::SessionGate;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry budget for a single page
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Counted attempts before a page is recorded as failed
    pub max_retries: u32,
    /// Pause between transient failures
    pub backoff: Duration,
    /// Session renewals one page may trigger
    pub max_session_renewals: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_secs(1),
            max_session_renewals: 10,
        }
    }
}

/// Fetches one page, retrying transient failures and renewing lapsed sessions
pub struct RetryingFetcher {
    source: Arc<dyn PageSource>,
    gate: Arc<SessionGate>,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl RetryingFetcher {
    pub fn new(
        source: Arc<dyn PageSource>,
        gate: Arc<SessionGate>,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            gate,
            policy,
            cancel,
        }
    }

    pub fn gate(&self) -> &Arc<SessionGate> {
        &self.gate
    }

    /// Download a page until it succeeds or its budget is spent
    ///
    /// Page-level failures come back as `Ok` with a failed outcome. `Err` is
    /// reserved for conditions that end the whole download: an unrecoverable
    /// session or cancellation.
    pub async fn fetch(&self, request: &PageRequest) -> Result<PageResult, FetchError> {
        let index = request.index;
        let mut attempts = 0u32;
        let mut renewals = 0u32;

        loop {
            let snapshot = self.gate.current().await?;

            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                outcome = self.source.fetch_page(&snapshot.session, &request.locator) => outcome,
            };

            match outcome {
                FetchOutcome::Success(payload) => {
                    attempts += 1;
                    if attempts > 1 || renewals > 0 {
                        debug!(index, attempts, renewals, "Page succeeded after retry");
                    }
                    return Ok(PageResult::success(index, payload, attempts));
                }
                FetchOutcome::Permanent(reason) => {
                    attempts += 1;
                    warn!(index, error = %reason, "Page failed permanently");
                    return Ok(PageResult::failed(index, reason, attempts));
                }
                FetchOutcome::SessionExpired => {
                    if renewals >= self.policy.max_session_renewals {
                        warn!(index, renewals, "Session keeps expiring, giving up on page");
                        return Ok(PageResult::failed(
                            index,
                            format!("Session kept expiring after {} renewals", renewals),
                            attempts,
                        ));
                    }
                    renewals += 1;
                    debug!(index, version = snapshot.version, "Session expired, waiting for renewal");

                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                        renewed = self.gate.ensure_fresh(snapshot.version) => { renewed?; }
                    }
                }
                FetchOutcome::Transient(error) => {
                    attempts += 1;

                    if attempts >= self.policy.max_retries {
                        warn!(index, attempts, error = %error, "Page failed after retries");
                        return Ok(PageResult::failed(
                            index,
                            format!("Failed after {} attempts: {}", attempts, error),
                            attempts,
                        ));
                    }

                    warn!(index, attempts, error = %error, "Page download failed, retrying");

                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                        _ = tokio::time::sleep(self.policy.backoff) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use crate::fetch::PageOutcome;
    use crate::session::{Reauthorize, RecoveryError, Session, SessionError};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Renew;

    #[async_trait]
    impl Reauthorize for Renew {
        async fn reauthorize(&self, session: &Session) -> Result<Session, RecoveryError> {
            Ok(session.clone())
        }
    }

    struct Refuse;

    #[async_trait]
    impl Reauthorize for Refuse {
        async fn reauthorize(&self, _session: &Session) -> Result<Session, RecoveryError> {
            Err("loan expired and could not be renewed".into())
        }
    }

    /// Replays `script` in order, repeating the last entry forever
    struct Scripted {
        script: Vec<FetchOutcome>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(script: Vec<FetchOutcome>) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageSource for Scripted {
        async fn fetch_page(&self, _session: &Session, _locator: &str) -> FetchOutcome {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let step = call.min(self.script.len() - 1);
            self.script[step].clone()
        }
    }

    /// Renewal that never completes
    struct Hang;

    #[async_trait]
    impl Reauthorize for Hang {
        async fn reauthorize(&self, _session: &Session) -> Result<Session, RecoveryError> {
            std::future::pending().await
        }
    }

    fn fetcher(
        source: Arc<Scripted>,
        reauth: Arc<dyn Reauthorize>,
        cancel: CancellationToken,
    ) -> RetryingFetcher {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff: Duration::from_millis(1),
            max_session_renewals: 2,
        };
        fetcher_with_policy(source, reauth, policy, cancel)
    }

    fn fetcher_with_policy(
        source: Arc<Scripted>,
        reauth: Arc<dyn Reauthorize>,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> RetryingFetcher {
        let session = Session::new(&HttpConfig::default(), "bookfetch-test").unwrap();
        let gate = Arc::new(SessionGate::new(session, reauth));
        RetryingFetcher::new(source, gate, policy, cancel)
    }

    fn cancel_after(cancel: &CancellationToken, delay: Duration) {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            cancel.cancel();
        });
    }

    fn jpeg() -> FetchOutcome {
        FetchOutcome::Success(Bytes::from_static(b"\xFF\xD8page\xFF\xD9"))
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let source = Scripted::new(vec![jpeg()]);
        let fetcher = fetcher(source.clone(), Arc::new(Renew), CancellationToken::new());

        let result = fetcher.fetch(&PageRequest::new(1, "page-1")).await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.index, 1);
        assert_eq!(result.attempts, 1);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_exhausts_exactly_max_retries() {
        let source = Scripted::new(vec![FetchOutcome::Transient("connection reset".into())]);
        let fetcher = fetcher(source.clone(), Arc::new(Renew), CancellationToken::new());

        let result = fetcher.fetch(&PageRequest::new(7, "page-7")).await.unwrap();

        assert_eq!(source.calls(), 3);
        assert_eq!(result.attempts, 3);
        match result.outcome {
            PageOutcome::Failed(reason) => assert!(reason.contains("connection reset")),
            PageOutcome::Success => panic!("Expected failure"),
        }
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let source = Scripted::new(vec![
            FetchOutcome::Transient("timeout".into()),
            FetchOutcome::Transient("timeout".into()),
            jpeg(),
        ]);
        let fetcher = fetcher(source.clone(), Arc::new(Renew), CancellationToken::new());

        let result = fetcher.fetch(&PageRequest::new(2, "page-2")).await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test]
    async fn test_permanent_is_not_retried() {
        let source = Scripted::new(vec![FetchOutcome::Permanent("HTTP 404: Not Found".into())]);
        let fetcher = fetcher(source.clone(), Arc::new(Renew), CancellationToken::new());

        let result = fetcher.fetch(&PageRequest::new(4, "page-4")).await.unwrap();

        assert_eq!(source.calls(), 1);
        assert_eq!(result.failure_reason(), Some("HTTP 404: Not Found"));
    }

    #[tokio::test]
    async fn test_session_expiry_does_not_consume_budget() {
        let source = Scripted::new(vec![
            FetchOutcome::Transient("reset".into()),
            FetchOutcome::SessionExpired,
            FetchOutcome::Transient("reset".into()),
            jpeg(),
        ]);
        let fetcher = fetcher(source.clone(), Arc::new(Renew), CancellationToken::new());

        let result = fetcher.fetch(&PageRequest::new(5, "page-5")).await.unwrap();

        // Two transient failures plus the success; the 403 is not counted
        assert!(result.is_success());
        assert_eq!(result.attempts, 3);
        assert_eq!(source.calls(), 4);
        assert_eq!(fetcher.gate().refresh_count(), 1);
    }

    #[tokio::test]
    async fn test_endless_expiry_is_capped() {
        let source = Scripted::new(vec![FetchOutcome::SessionExpired]);
        let fetcher = fetcher(source.clone(), Arc::new(Renew), CancellationToken::new());

        let result = fetcher.fetch(&PageRequest::new(6, "page-6")).await.unwrap();

        assert!(!result.is_success());
        assert_eq!(fetcher.gate().refresh_count(), 2);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_failed_renewal_is_fatal() {
        let source = Scripted::new(vec![FetchOutcome::SessionExpired, jpeg()]);
        let fetcher = fetcher(source.clone(), Arc::new(Refuse), CancellationToken::new());

        let err = fetcher.fetch(&PageRequest::new(1, "page-1")).await.unwrap_err();

        assert!(matches!(
            err,
            FetchError::Session(SessionError::RecoveryFailed(_))
        ));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_fetch() {
        let source = Scripted::new(vec![FetchOutcome::Transient("slow".into())]);
        let cancel = CancellationToken::new();
        let fetcher = fetcher(source, Arc::new(Renew), cancel.clone());

        cancel.cancel();
        let err = fetcher.fetch(&PageRequest::new(1, "page-1")).await.unwrap_err();

        assert!(matches!(err, FetchError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff() {
        let source = Scripted::new(vec![FetchOutcome::Transient("timeout".into())]);
        let cancel = CancellationToken::new();
        let policy = RetryPolicy {
            max_retries: 3,
            backoff: Duration::from_secs(60),
            max_session_renewals: 2,
        };
        let fetcher = fetcher_with_policy(source.clone(), Arc::new(Renew), policy, cancel.clone());

        cancel_after(&cancel, Duration::from_millis(20));
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            fetcher.fetch(&PageRequest::new(1, "page-1")),
        )
        .await
        .expect("cancellation should cut the backoff short");

        assert!(matches!(result, Err(FetchError::Cancelled)));
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_renewal_wait() {
        let source = Scripted::new(vec![FetchOutcome::SessionExpired, jpeg()]);
        let cancel = CancellationToken::new();
        let fetcher = fetcher(source.clone(), Arc::new(Hang), cancel.clone());

        cancel_after(&cancel, Duration::from_millis(20));
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            fetcher.fetch(&PageRequest::new(1, "page-1")),
        )
        .await
        .expect("cancellation should end the wait for renewal");

        assert!(matches!(result, Err(FetchError::Cancelled)));
        assert_eq!(source.calls(), 1);
        assert_eq!(fetcher.gate().refresh_count(), 0);
    }
}
