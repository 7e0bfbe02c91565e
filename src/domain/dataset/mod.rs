//! Periodic dataset domain - slowly changing list-shaped data

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::DomainError;

#[cfg(test)]
use mockall::automock;

/// A fully loaded snapshot of one dataset
#[derive(Debug, Clone)]
pub struct PeriodicDataset<T> {
    pub items: Vec<T>,
    pub last_refreshed_at: Instant,
    /// Last reload attempt, successful or not
    pub last_attempt_at: Instant,
    pub refresh_interval: Duration,
}

impl<T> PeriodicDataset<T> {
    pub fn new(items: Vec<T>, refresh_interval: Duration) -> Self {
        let now = Instant::now();

        Self {
            items,
            last_refreshed_at: now,
            last_attempt_at: now,
            refresh_interval,
        }
    }

    /// The same items, with a reload attempt recorded now
    pub fn with_failed_attempt(&self) -> Self
    where
        T: Clone,
    {
        Self {
            items: self.items.clone(),
            last_refreshed_at: self.last_refreshed_at,
            last_attempt_at: Instant::now(),
            refresh_interval: self.refresh_interval,
        }
    }

    /// Whether the refresh interval has elapsed since the last reload attempt
    pub fn is_due(&self) -> bool {
        self.last_attempt_at.elapsed() >= self.refresh_interval
    }
}

/// Loads the full contents of a dataset
#[cfg_attr(test, automock(type Item = String;))]
#[async_trait]
pub trait DatasetSource: Send + Sync + 'static {
    type Item: Clone + Send + Sync + 'static;

    async fn load(&self, dataset_id: &str) -> Result<Vec<Self::Item>, DomainError>;
}
