use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, warn};

use logtap_source::LogSource;
use logtap_types::{
    CACHE_TTL, LineCount, LogSnapshot, LogsResponse, MAX_CONCURRENT_FETCHES, MAX_LINES_CAP,
};

use crate::{AdmissionController, SnapshotCache};

/// Tunables for a [`LogService`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServiceLimits {
    /// How long a snapshot satisfies lookups
    pub cache_ttl: Duration,

    /// Fetches allowed in flight before load is shed
    pub max_concurrent: usize,

    /// Upper clamp for requested line counts
    pub max_lines: usize,
}

impl Default for ServiceLimits {
    fn default() -> Self {
        Self {
            cache_ttl: CACHE_TTL,
            max_concurrent: MAX_CONCURRENT_FETCHES,
            max_lines: MAX_LINES_CAP,
        }
    }
}

/// Serves "the last N log lines" from a cache in front of a log source.
///
/// Cache hits never touch the source. Misses need an admission slot; when
/// none is free the request is answered from whatever snapshot exists, or
/// refused. The source is always called with no lock held.
pub struct LogService<S> {
    source: S,
    cache: SnapshotCache,
    admission: AdmissionController,
    max_lines: usize,
}

impl<S: LogSource> LogService<S> {
    pub fn new(source: S) -> Self {
        Self::with_limits(source, ServiceLimits::default())
    }

    pub fn with_limits(source: S, limits: ServiceLimits) -> Self {
        let cache = SnapshotCache::new(limits.cache_ttl);
        let admission = AdmissionController::new(limits.max_concurrent);
        debug!(
            ttl_ms = cache.ttl().as_millis() as u64,
            max_concurrent = admission.max_concurrent(),
            max_lines = limits.max_lines,
            "log service limits"
        );

        Self {
            source,
            cache,
            admission,
            max_lines: limits.max_lines,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Answer a request for the last `requested` lines.
    ///
    /// Never fails: every problem is reported through the response.
    pub async fn get_logs(&self, requested: i64) -> LogsResponse {
        let n = LineCount::with_cap(requested, self.max_lines);

        if let Some(snapshot) = self.cache.lookup(n) {
            debug!(lines = %n, "serving cached snapshot");
            return LogsResponse::cached(&snapshot);
        }

        let Some(permit) = self.admission.try_admit() else {
            return self.shed_load(n);
        };

        let response = self.fetch_and_store(n).await;
        drop(permit);
        response
    }

    /// Answer without fetching because no admission slot was free
    fn shed_load(&self, n: LineCount) -> LogsResponse {
        match self.cache.peek() {
            Some(peeked) => {
                warn!(
                    lines = %n,
                    snapshot_lines = %peeked.snapshot.requested(),
                    stale = peeked.stale,
                    "too many fetches in flight, serving last snapshot"
                );
                LogsResponse::degraded(&peeked.snapshot, n, peeked.stale)
            }
            None => {
                warn!(lines = %n, "too many fetches in flight and nothing cached");
                LogsResponse::too_many_requests()
            }
        }
    }

    async fn fetch_and_store(&self, n: LineCount) -> LogsResponse {
        let fetched = AssertUnwindSafe(self.source.fetch(n.get()))
            .catch_unwind()
            .await;

        match fetched {
            Ok(Ok(lines)) => {
                debug!(lines = %n, returned = lines.len(), "fetched fresh logs");
                let snapshot = self.cache.store(LogSnapshot::new(lines, n));
                LogsResponse::fresh(snapshot.lines().to_vec())
            }
            Ok(Err(err)) => {
                error!(lines = %n, error = %err, "log fetch failed");
                LogsResponse::failure(format!("Failed to read logs: {}", err))
            }
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                error!(lines = %n, %reason, "log fetch panicked");
                LogsResponse::failure("Failed to read logs: internal error".to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logtap_source::FetchError;
    use logtap_types::{Outcome, TOO_MANY_REQUESTS};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{Semaphore, mpsc};

    fn numbered(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("line {}", i)).collect()
    }

    /// Returns numbered lines and records every call
    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
        last_max_lines: AtomicUsize,
    }

    impl LogSource for CountingSource {
        async fn fetch(&self, max_lines: usize) -> Result<Vec<String>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last_max_lines.store(max_lines, Ordering::SeqCst);
            Ok(numbered(max_lines))
        }
    }

    struct FailingSource;

    impl LogSource for FailingSource {
        async fn fetch(&self, _max_lines: usize) -> Result<Vec<String>, FetchError> {
            Err(FetchError::Internal("disk on fire".to_string()))
        }
    }

    struct PanickingSource;

    impl LogSource for PanickingSource {
        async fn fetch(&self, _max_lines: usize) -> Result<Vec<String>, FetchError> {
            panic!("source bug");
        }
    }

    /// Announces each fetch, then blocks until the test opens the gate
    struct GatedSource {
        entered: mpsc::UnboundedSender<usize>,
        gate: Arc<Semaphore>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl GatedSource {
        fn new(entered: mpsc::UnboundedSender<usize>, gate: Arc<Semaphore>) -> Self {
            Self {
                entered,
                gate,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    impl LogSource for GatedSource {
        async fn fetch(&self, max_lines: usize) -> Result<Vec<String>, FetchError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let _ = self.entered.send(max_lines);

            let permit = self
                .gate
                .acquire()
                .await
                .map_err(|e| FetchError::Internal(e.to_string()))?;
            permit.forget();

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(numbered(max_lines))
        }
    }

    #[tokio::test]
    async fn test_oversized_request_is_clamped_and_cached() {
        let service = LogService::new(CountingSource::default());

        let first = service.get_logs(5000).await;
        assert!(first.success);
        assert_eq!(first.cached, Some(false));
        assert_eq!(first.lines, Some(1000));
        assert_eq!(service.source().last_max_lines.load(Ordering::SeqCst), 1000);
        assert_eq!(
            service.cache().peek().unwrap().snapshot.requested(),
            LineCount::new(1000)
        );

        let second = service.get_logs(5000).await;
        assert_eq!(second.cached, Some(true));
        assert_eq!(second.logs, first.logs);
        assert_eq!(service.source().calls.load(Ordering::SeqCst), 1);

        // 1000 is the same cache key as 5000
        let third = service.get_logs(1000).await;
        assert_eq!(third.cached, Some(true));
        assert_eq!(service.source().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_negative_request_is_clamped_to_zero() {
        let service = LogService::new(CountingSource::default());
        let response = service.get_logs(-20).await;

        assert!(response.success);
        assert_eq!(response.lines, Some(0));
        assert!(response.logs.is_empty());
        assert_eq!(service.source().last_max_lines.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_different_line_count_refetches() {
        let service = LogService::new(CountingSource::default());
        service.get_logs(10).await;
        let other = service.get_logs(20).await;

        assert_eq!(other.cached, Some(false));
        assert_eq!(other.logs.len(), 20);
        assert_eq!(service.source().calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_limits_are_applied() {
        let limits = ServiceLimits {
            cache_ttl: Duration::from_millis(750),
            max_concurrent: 5,
            max_lines: 40,
        };
        let service = LogService::with_limits(CountingSource::default(), limits);

        assert_eq!(service.cache().ttl(), Duration::from_millis(750));
        assert_eq!(service.admission().max_concurrent(), 5);
        assert_eq!(service.admission().active(), 0);
    }

    #[tokio::test]
    async fn test_expired_snapshot_is_refetched() {
        let limits = ServiceLimits {
            cache_ttl: Duration::from_millis(20),
            ..ServiceLimits::default()
        };
        let service = LogService::with_limits(CountingSource::default(), limits);

        service.get_logs(10).await;
        tokio::time::sleep(Duration::from_millis(60)).await;
        let again = service.get_logs(10).await;

        assert_eq!(again.cached, Some(false));
        assert_eq!(service.source().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_refused_with_snapshot_is_degraded() {
        let limits = ServiceLimits {
            max_concurrent: 0,
            ..ServiceLimits::default()
        };
        let service = LogService::with_limits(CountingSource::default(), limits);
        service
            .cache()
            .store(LogSnapshot::new(numbered(3), LineCount::new(3)));

        let matching = service.get_logs(3).await;
        // A fresh matching snapshot is an ordinary cache hit
        assert_eq!(matching.outcome(), Outcome::Cached);

        let response = service.get_logs(50).await;
        assert!(response.success);
        assert_eq!(response.cached, Some(true));
        assert!(!response.warning.as_deref().unwrap_or_default().is_empty());
        assert_eq!(response.logs, numbered(3));
        assert_eq!(response.requested_lines, Some(50));
        assert_eq!(response.snapshot_lines, Some(3));
        assert_eq!(service.source().calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refused_without_snapshot_is_soft_failure() {
        let limits = ServiceLimits {
            max_concurrent: 0,
            ..ServiceLimits::default()
        };
        let service = LogService::with_limits(CountingSource::default(), limits);

        let response = service.get_logs(10).await;
        assert!(!response.success);
        assert!(response.logs.is_empty());
        assert_eq!(response.error.as_deref(), Some(TOO_MANY_REQUESTS));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["logs"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_fetch_error_releases_slot() {
        let service = LogService::new(FailingSource);
        let response = service.get_logs(10).await;

        assert!(!response.success);
        assert!(response.logs.is_empty());
        assert!(response.error.unwrap().contains("disk on fire"));
        assert_eq!(service.admission().active(), 0);
        assert!(service.cache().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_panic_is_contained() {
        let service = LogService::new(PanickingSource);
        let response = service.get_logs(10).await;

        assert!(!response.success);
        assert!(response.logs.is_empty());
        assert_eq!(response.outcome(), Outcome::Failed);
        assert_eq!(service.admission().active(), 0);
    }

    #[tokio::test]
    async fn test_fourth_simultaneous_request_is_refused() {
        let (entered_tx, mut entered_rx) = mpsc::unbounded_channel();
        let gate = Arc::new(Semaphore::new(0));
        let service = Arc::new(LogService::new(GatedSource::new(
            entered_tx,
            Arc::clone(&gate),
        )));

        let mut handles = Vec::new();
        for lines in [10, 20, 30] {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move { service.get_logs(lines).await }));
        }

        // Wait until all three hold an admission slot inside the source
        for _ in 0..3 {
            entered_rx.recv().await.unwrap();
        }
        assert_eq!(service.admission().active(), 3);

        let refused = service.get_logs(40).await;
        assert!(!refused.success);
        assert!(refused.logs.is_empty());
        assert_eq!(refused.outcome(), Outcome::Refused);

        gate.add_permits(3);
        for handle in handles {
            let response = handle.await.unwrap();
            assert!(response.success);
            assert_eq!(response.cached, Some(false));
        }

        assert_eq!(service.admission().active(), 0);
        assert_eq!(service.source().max_in_flight.load(Ordering::SeqCst), 3);
        // Last completed fetch owns the slot, whichever it was
        assert!(!service.cache().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_admission_ceiling_under_load() {
        let (entered_tx, _entered_rx) = mpsc::unbounded_channel();
        let gate = Arc::new(Semaphore::new(0));
        let service = Arc::new(LogService::new(GatedSource::new(
            entered_tx,
            Arc::clone(&gate),
        )));

        let handles: Vec<_> = (1..=20)
            .map(|lines| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.get_logs(lines).await })
            })
            .collect();

        // Release fetches gradually while requests are still arriving
        for _ in 0..20 {
            assert!(service.admission().active() <= 3);
            gate.add_permits(1);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let mut answered = 0;
        for handle in handles {
            let response = handle.await.unwrap();
            assert!(matches!(
                response.outcome(),
                Outcome::Fresh | Outcome::Degraded | Outcome::Refused
            ));
            answered += 1;
        }

        assert_eq!(answered, 20);
        assert!(service.source().max_in_flight.load(Ordering::SeqCst) <= 3);
        assert_eq!(service.admission().active(), 0);
    }
}
