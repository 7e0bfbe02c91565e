//! Interval-driven, stale-while-revalidate cache for list-shaped datasets

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::domain::DomainError;
use crate::domain::dataset::{DatasetSource, PeriodicDataset};
use crate::infrastructure::observability::record_periodic_refresh;
use crate::infrastructure::single_flight::{SharedOutcome, SingleFlight};

type Snapshot<T> = Arc<PeriodicDataset<T>>;

struct RefreshInner<S: DatasetSource> {
    source: S,
    refresh_interval: Duration,
    snapshots: RwLock<HashMap<String, Snapshot<S::Item>>>,
    refreshes: SingleFlight<Snapshot<S::Item>>,
}

/// Serves whole datasets, reloading each one after its refresh interval
///
/// Only the very first `get` of a dataset waits for data. Afterwards callers
/// always get the current snapshot immediately; a due dataset is reloaded in
/// the background, at most once at a time, and a failed reload leaves the
/// previous snapshot in place.
pub struct PeriodicRefreshCache<S: DatasetSource> {
    inner: Arc<RefreshInner<S>>,
}

impl<S: DatasetSource> Clone for PeriodicRefreshCache<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: DatasetSource> fmt::Debug for PeriodicRefreshCache<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let datasets: Vec<String> = self
            .inner
            .snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();

        f.debug_struct("PeriodicRefreshCache")
            .field("refresh_interval", &self.inner.refresh_interval)
            .field("datasets", &datasets)
            .finish()
    }
}

impl<S: DatasetSource> PeriodicRefreshCache<S> {
    pub fn new(source: S, refresh_interval: Duration) -> Result<Self, DomainError> {
        if refresh_interval.is_zero() {
            return Err(DomainError::validation("refresh interval must be positive"));
        }

        Ok(Self {
            inner: Arc::new(RefreshInner {
                source,
                refresh_interval,
                snapshots: RwLock::new(HashMap::new()),
                refreshes: SingleFlight::new(),
            }),
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        self.inner.refresh_interval
    }

    /// Returns the dataset's items, loading it first if it was never loaded
    pub async fn get(&self, dataset_id: &str) -> Result<Vec<S::Item>, DomainError> {
        if let Some(snapshot) = self.inner.current(dataset_id) {
            if snapshot.is_due() {
                debug!(dataset = %dataset_id, "Dataset due, refreshing in background");
                // The reload runs detached; dropping its outcome does not cancel it
                drop(self.start_refresh(dataset_id));
            }

            return Ok(snapshot.items.clone());
        }

        let snapshot = self.start_refresh(dataset_id).await?;
        Ok(snapshot.items.clone())
    }

    /// Current items without triggering any load
    pub fn snapshot(&self, dataset_id: &str) -> Option<Vec<S::Item>> {
        self.inner
            .current(dataset_id)
            .map(|snapshot| snapshot.items.clone())
    }

    /// Whether a reload of the dataset is running right now
    pub fn is_refreshing(&self, dataset_id: &str) -> bool {
        self.inner.refreshes.is_in_flight(dataset_id)
    }

    /// Reloads the dataset now, joining a reload already in progress
    pub async fn refresh(&self, dataset_id: &str) -> Result<(), DomainError> {
        self.start_refresh(dataset_id).await.map(|_| ())
    }

    /// Reloads the given datasets every refresh interval until `shutdown` flips to true
    ///
    /// The first tick fires immediately, so the datasets are populated at startup.
    pub fn spawn_refresh_loop(
        &self,
        dataset_ids: Vec<String>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let cache = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cache.inner.refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                datasets = ?dataset_ids,
                interval_secs = cache.inner.refresh_interval.as_secs(),
                "Starting periodic refresh loop"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let refreshes = dataset_ids.iter().map(|id| cache.refresh(id));
                        // Failures are logged by the refresh itself
                        let _ = futures::future::join_all(refreshes).await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("Stopping periodic refresh loop");
                            break;
                        }
                    }
                }
            }
        })
    }

    fn start_refresh(&self, dataset_id: &str) -> SharedOutcome<Snapshot<S::Item>> {
        let inner = Arc::clone(&self.inner);
        let id = dataset_id.to_string();

        let (outcome, _) = self
            .inner
            .refreshes
            .join_or_start(dataset_id, move || async move { inner.reload(&id).await });

        outcome
    }
}

impl<S: DatasetSource> RefreshInner<S> {
    fn current(&self, dataset_id: &str) -> Option<Snapshot<S::Item>> {
        self.snapshots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(dataset_id)
            .cloned()
    }

    async fn reload(&self, dataset_id: &str) -> Result<Snapshot<S::Item>, DomainError> {
        match self.source.load(dataset_id).await {
            Ok(items) => {
                let snapshot = Arc::new(PeriodicDataset::new(items, self.refresh_interval));

                self.snapshots
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(dataset_id.to_string(), Arc::clone(&snapshot));

                record_periodic_refresh(dataset_id, true);
                debug!(dataset = %dataset_id, items = snapshot.items.len(), "Dataset refreshed");
                Ok(snapshot)
            }
            Err(e) => {
                record_periodic_refresh(dataset_id, false);

                if let Some(previous) = self.current(dataset_id) {
                    // Next reload waits a full interval
                    self.snapshots
                        .write()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(dataset_id.to_string(), Arc::new(previous.with_failed_attempt()));

                    error!(dataset = %dataset_id, error = %e, "Dataset refresh failed, keeping previous snapshot");
                } else {
                    error!(dataset = %dataset_id, error = %e, "Initial dataset load failed");
                }

                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dataset::MockDatasetSource;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Source that returns `generation-N` items, optionally parking each load on a gate
    struct GatedSource {
        loads: AtomicUsize,
        gate: Option<Arc<Notify>>,
        latency: Duration,
    }

    impl GatedSource {
        fn new(latency: Duration) -> Self {
            Self {
                loads: AtomicUsize::new(0),
                gate: None,
                latency,
            }
        }

        fn gated(gate: Arc<Notify>) -> Self {
            Self {
                loads: AtomicUsize::new(0),
                gate: Some(gate),
                latency: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl DatasetSource for GatedSource {
        type Item = String;

        async fn load(&self, _dataset_id: &str) -> Result<Vec<String>, DomainError> {
            let generation = self.loads.fetch_add(1, Ordering::SeqCst) + 1;

            if generation > 1 {
                if let Some(gate) = &self.gate {
                    gate.notified().await;
                }
            }

            tokio::time::sleep(self.latency).await;
            Ok(vec![format!("generation-{}", generation)])
        }
    }

    /// Source whose first load succeeds and every later one fails
    struct FlakySource {
        loads: AtomicUsize,
    }

    #[async_trait]
    impl DatasetSource for FlakySource {
        type Item = String;

        async fn load(&self, _dataset_id: &str) -> Result<Vec<String>, DomainError> {
            if self.loads.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(vec!["osmosis-1".to_string()])
            } else {
                Err(DomainError::upstream("http://registry", "HTTP 502"))
            }
        }
    }

    fn source_of<S: DatasetSource>(cache: &PeriodicRefreshCache<S>) -> &S {
        &cache.inner.source
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_get_awaits_initial_load() {
        let source = GatedSource::new(Duration::from_millis(100));
        let cache = PeriodicRefreshCache::new(source, Duration::from_secs(60)).unwrap();

        assert!(cache.snapshot("chains").is_none());

        let (a, b) = tokio::join!(cache.get("chains"), cache.get("chains"));

        assert_eq!(a.unwrap(), vec!["generation-1".to_string()]);
        assert_eq!(b.unwrap(), vec!["generation-1".to_string()]);
        assert_eq!(source_of(&cache).loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_snapshot_served_without_reload() {
        let source = GatedSource::new(Duration::ZERO);
        let cache = PeriodicRefreshCache::new(source, Duration::from_secs(60)).unwrap();

        cache.get("chains").await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        cache.get("chains").await.unwrap();

        assert_eq!(source_of(&cache).loads.load(Ordering::SeqCst), 1);
        assert!(!cache.is_refreshing("chains"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_while_revalidate() {
        let gate = Arc::new(Notify::new());
        let source = GatedSource::gated(Arc::clone(&gate));
        let cache = PeriodicRefreshCache::new(source, Duration::from_secs(60)).unwrap();

        assert_eq!(cache.get("chains").await.unwrap(), vec!["generation-1".to_string()]);

        tokio::time::advance(Duration::from_secs(61)).await;

        // Due: kicks off a reload that parks on the gate, yet returns at once
        assert_eq!(cache.get("chains").await.unwrap(), vec!["generation-1".to_string()]);
        tokio::task::yield_now().await;
        assert!(cache.is_refreshing("chains"));

        // Still refreshing: more callers get the old snapshot and no second reload starts
        for _ in 0..5 {
            assert_eq!(cache.get("chains").await.unwrap(), vec!["generation-1".to_string()]);
        }
        assert_eq!(source_of(&cache).loads.load(Ordering::SeqCst), 2);

        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(!cache.is_refreshing("chains"));
        assert_eq!(cache.snapshot("chains"), Some(vec!["generation-2".to_string()]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let mut source = MockDatasetSource::new();
        let mut seq = mockall::Sequence::new();

        source
            .expect_load()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec!["osmosis-1".to_string(), "neutron-1".to_string()]));
        source
            .expect_load()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(DomainError::upstream("http://registry", "HTTP 502")));

        let cache = PeriodicRefreshCache::new(source, Duration::from_secs(10)).unwrap();
        let initial = cache.get("chains").await.unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;

        let refreshed = cache.refresh("chains").await;
        assert!(matches!(refreshed, Err(DomainError::Upstream { .. })));
        assert_eq!(cache.snapshot("chains"), Some(initial));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_waits_for_next_interval() {
        let source = FlakySource {
            loads: AtomicUsize::new(0),
        };
        let cache = PeriodicRefreshCache::new(source, Duration::from_secs(300)).unwrap();
        cache.get("chains").await.unwrap();

        tokio::time::advance(Duration::from_secs(301)).await;

        for _ in 0..10 {
            assert_eq!(cache.get("chains").await.unwrap(), vec!["osmosis-1".to_string()]);
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(source_of(&cache).loads.load(Ordering::SeqCst), 2);

        tokio::time::advance(Duration::from_secs(300)).await;
        cache.get("chains").await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(source_of(&cache).loads.load(Ordering::SeqCst), 3);
        assert_eq!(cache.snapshot("chains"), Some(vec!["osmosis-1".to_string()]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_initial_load_propagates_and_is_retried() {
        let mut source = MockDatasetSource::new();
        let mut seq = mockall::Sequence::new();

        source
            .expect_load()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(DomainError::upstream("http://registry", "connection refused")));
        source
            .expect_load()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec!["osmosis-1".to_string()]));

        let cache = PeriodicRefreshCache::new(source, Duration::from_secs(10)).unwrap();

        assert!(cache.get("chains").await.is_err());
        assert!(cache.snapshot("chains").is_none());
        assert_eq!(cache.get("chains").await.unwrap(), vec!["osmosis-1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_datasets_are_independent() {
        let mut source = MockDatasetSource::new();
        source
            .expect_load()
            .withf(|id| id == "chains")
            .returning(|_| Ok(vec!["osmosis-1".to_string()]));
        source
            .expect_load()
            .withf(|id| id == "denoms")
            .returning(|_| Ok(vec!["uosmo".to_string(), "untrn".to_string()]));

        let cache = PeriodicRefreshCache::new(source, Duration::from_secs(10)).unwrap();

        assert_eq!(cache.get("chains").await.unwrap().len(), 1);
        assert_eq!(cache.get("denoms").await.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_loop_populates_and_stops_on_shutdown() {
        let source = GatedSource::new(Duration::ZERO);
        let cache = PeriodicRefreshCache::new(source, Duration::from_secs(30)).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = cache.spawn_refresh_loop(vec!["chains".to_string()], shutdown_rx);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(cache.snapshot("chains"), Some(vec!["generation-1".to_string()]));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(cache.snapshot("chains"), Some(vec!["generation-2".to_string()]));

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = PeriodicRefreshCache::new(MockDatasetSource::new(), Duration::ZERO);
        assert!(matches!(result, Err(DomainError::Validation { .. })));
    }
}
