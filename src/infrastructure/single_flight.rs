//! Single-flight coordination of concurrent computations
//!
//! At most one computation runs per key. The computation is spawned as a
//! detached task, so callers that lose interest never cancel it for the
//! others, and its registry entry is removed by a drop guard the moment it
//! settles (success, failure or panic). Failures are handed to every joined
//! caller and never kept around.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};

use crate::domain::DomainError;

/// Awaitable outcome of an in-flight computation, cloneable across callers
pub type SharedOutcome<T> = Shared<BoxFuture<'static, Result<T, DomainError>>>;

/// Whether the caller started the computation or joined one already running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightRole {
    Leader,
    Follower,
}

struct Flight<T> {
    id: u64,
    outcome: SharedOutcome<T>,
}

type Registry<T> = Arc<Mutex<HashMap<String, Flight<T>>>>;

/// Mutex-guarded map from key to the shared outcome of its running computation
pub struct SingleFlight<T> {
    flights: Registry<T>,
    next_id: AtomicU64,
}

impl<T> fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &lock(&self.flights).len())
            .finish()
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Joins the computation running for `key`, or spawns `work` as a new one
    ///
    /// `work` is only invoked when this caller becomes the leader. The
    /// returned outcome may be dropped without affecting the computation.
    pub fn join_or_start<F, Fut>(&self, key: &str, work: F) -> (SharedOutcome<T>, FlightRole)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DomainError>> + Send + 'static,
    {
        let mut flights = lock(&self.flights);

        if let Some(existing) = flights.get(key) {
            return (existing.outcome.clone(), FlightRole::Follower);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cleanup = FlightCleanup {
            flights: Arc::clone(&self.flights),
            key: key.to_string(),
            id,
        };
        let computation = work();

        // The registry lock is still held here, so the entry is inserted
        // before the task can possibly settle and remove it.
        let handle = tokio::spawn(async move {
            let _cleanup = cleanup;
            computation.await
        });

        let outcome = async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(DomainError::internal(format!(
                    "In-flight computation aborted: {}",
                    e
                ))),
            }
        }
        .boxed()
        .shared();

        flights.insert(
            key.to_string(),
            Flight {
                id,
                outcome: outcome.clone(),
            },
        );

        (outcome, FlightRole::Leader)
    }

    /// Runs `work` for `key` unless it is already running, then awaits the shared outcome
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> Result<T, DomainError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DomainError>> + Send + 'static,
    {
        let (outcome, _) = self.join_or_start(key, work);
        outcome.await
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        lock(&self.flights).contains_key(key)
    }

    pub fn in_flight_count(&self) -> usize {
        lock(&self.flights).len()
    }
}

/// Removes the registry entry when the computation settles or unwinds
struct FlightCleanup<T> {
    flights: Registry<T>,
    key: String,
    id: u64,
}

impl<T> Drop for FlightCleanup<T> {
    fn drop(&mut self) {
        let mut flights = lock(&self.flights);

        if flights.get(&self.key).is_some_and(|f| f.id == self.id) {
            flights.remove(&self.key);
        }
    }
}

fn lock<K>(mutex: &Mutex<K>) -> MutexGuard<'_, K> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
