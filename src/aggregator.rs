//! Top-level aggregator facade
//!
//! [`FeedAggregator`] wires storage, vendors, the delivery receiver, and the
//! lifecycle listener together and drives per-destination refresh tasks
//! through the single-flight [`TaskExecutor`]. It is the intended embedding
//! surface: a bot frontend constructs one aggregator, registers its vendors,
//! and forwards user commands to the subscription methods.
//!
//! Listener failures are logged and never fail the operation that triggered
//! them; state changes are persisted before notifications go out.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use feedrelay::aggregator::FeedAggregator;
//! use feedrelay::config::Config;
//! use feedrelay::listener::NoopListener;
//! use feedrelay::storage::SqliteStorage;
//!
//! # async fn example(receiver: Arc<dyn feedrelay::output::Receiver>) -> feedrelay::error::Result<()> {
//! let storage = Arc::new(SqliteStorage::new("feedrelay.db").await?);
//! let mut aggregator = FeedAggregator::new(
//!     Arc::new(Config::default()),
//!     storage,
//!     receiver,
//!     Arc::new(NoopListener),
//! );
//! // aggregator.register_vendor(my_vendor);
//! aggregator.start_active().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::error::Result;
use crate::executor::TaskExecutor;
use crate::listener::EventListener;
use crate::output::Receiver;
use crate::refresh::RefreshTask;
use crate::storage::Storage;
use crate::types::{FeedId, Subscription, SubscriptionHeader, UpdatePayload};
use crate::vendor::Vendor;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Reason recorded when a user suspends a subscription explicitly
const USER_SUSPENDED: &str = "suspended by user";

/// Facade wiring storage, vendors, delivery, and refresh scheduling together
pub struct FeedAggregator {
    config: Arc<Config>,
    storage: Arc<dyn Storage>,
    receiver: Arc<dyn Receiver>,
    listener: Arc<dyn EventListener>,
    vendors: HashMap<String, Arc<dyn Vendor>>,
    executor: TaskExecutor,
}

impl FeedAggregator {
    /// Create an aggregator with no vendors registered
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: Arc<Config>,
        storage: Arc<dyn Storage>,
        receiver: Arc<dyn Receiver>,
        listener: Arc<dyn EventListener>,
    ) -> Self {
        Self {
            config,
            storage,
            receiver,
            listener,
            vendors: HashMap::new(),
            executor: TaskExecutor::new(),
        }
    }

    /// Register a vendor under its own name
    ///
    /// Registration happens during setup, before any refresh task starts;
    /// re-registering a name replaces the previous vendor.
    pub fn register_vendor(&mut self, vendor: Arc<dyn Vendor>) {
        info!(vendor = vendor.name(), "vendor registered");
        self.vendors.insert(vendor.name().to_string(), vendor);
    }

    /// Start the refresh task for one destination
    ///
    /// Returns `false` when a task is already running for it. The task ends on
    /// its own once the destination has no eligible subscriptions left.
    pub async fn start(&self, feed_id: FeedId) -> Result<bool> {
        let task = RefreshTask::new(
            feed_id,
            Arc::clone(&self.config),
            Arc::clone(&self.storage),
            Arc::new(self.vendors.clone()),
            Arc::clone(&self.receiver),
            Arc::clone(&self.listener),
        );
        self.executor.submit(feed_id, |cancel| task.run(cancel)).await
    }

    /// Stop the refresh task for one destination
    ///
    /// Blocks until the task has observably returned. No-op when none runs.
    pub async fn stop(&self, feed_id: FeedId) -> Result<()> {
        self.executor.cancel(feed_id).await
    }

    /// Start refresh tasks for every destination with an active subscription
    ///
    /// Called once after startup to resume work persisted by a previous run.
    /// Returns the number of tasks started.
    pub async fn start_active(&self) -> Result<usize> {
        let mut started = 0;
        for feed_id in self.storage.active_feeds().await? {
            if self.start(feed_id).await? {
                started += 1;
            }
        }
        info!(started, "resumed refresh tasks for active destinations");
        Ok(started)
    }

    /// Create a subscription and ensure its destination's task is running
    pub async fn subscribe(&self, subscription: Subscription) -> Result<()> {
        let feed_id = subscription.header.feed_id;
        info!(subscription = %subscription.header, "subscribing");
        self.storage.create(subscription.clone()).await?;
        self.notify_resume(&subscription).await;
        self.start(feed_id).await?;
        Ok(())
    }

    /// Suspend a subscription at the user's request
    ///
    /// The subscription stays in storage with the suspension recorded; it can
    /// be resumed later by [`FeedAggregator::resume`].
    pub async fn unsubscribe(&self, header: &SubscriptionHeader) -> Result<()> {
        info!(subscription = %header, "unsubscribing");
        self.storage
            .update(
                Utc::now(),
                header,
                UpdatePayload::Failure(USER_SUSPENDED.to_string()),
            )
            .await?;
        if let Some(subscription) = self.storage.get(header).await? {
            if let Err(e) = self.listener.on_suspend(&subscription).await {
                warn!(subscription = %header, error = %e, "suspend notification failed");
            }
        }
        Ok(())
    }

    /// Reactivate a suspended subscription and ensure its task is running
    ///
    /// Clears the recorded failure while keeping the existing cursor, so the
    /// next refresh picks up where the subscription left off.
    pub async fn resume(&self, header: &SubscriptionHeader) -> Result<()> {
        info!(subscription = %header, "resuming");
        let Some(subscription) = self.storage.get(header).await? else {
            return Err(crate::error::StorageError::NotFound(header.to_string()).into());
        };
        self.storage
            .update(Utc::now(), header, UpdatePayload::Cursor(subscription.data.clone()))
            .await?;
        let mut resumed = subscription;
        resumed.error = None;
        self.notify_resume(&resumed).await;
        self.start(header.feed_id).await?;
        Ok(())
    }

    /// Delete one subscription permanently
    pub async fn delete(&self, header: &SubscriptionHeader) -> Result<()> {
        info!(subscription = %header, "deleting");
        let subscription = self.storage.get(header).await?;
        self.storage.delete(header).await?;
        if let Some(subscription) = subscription {
            if let Err(e) = self.listener.on_delete(&subscription).await {
                warn!(subscription = %header, error = %e, "delete notification failed");
            }
        }
        Ok(())
    }

    /// Bulk-delete a destination's subscriptions whose name matches `pattern`
    ///
    /// `pattern` uses `%` wildcards. Returns the number deleted.
    pub async fn clear(&self, feed_id: FeedId, pattern: &str) -> Result<u64> {
        let deleted = self.storage.clear(feed_id, pattern).await?;
        info!(%feed_id, pattern, deleted, "cleared subscriptions");
        if let Err(e) = self.listener.on_clear(feed_id, pattern, deleted).await {
            warn!(%feed_id, error = %e, "clear notification failed");
        }
        Ok(deleted)
    }

    /// All subscriptions of a destination, suspended ones included
    pub async fn list(&self, feed_id: FeedId) -> Result<Vec<Subscription>> {
        self.storage.list(feed_id).await
    }

    /// Cancel every refresh task and block until all have returned
    ///
    /// After this returns no refresh activity remains; further start and
    /// subscribe calls will not spawn tasks.
    pub async fn shutdown(&self) -> Result<()> {
        info!("shutting down aggregator");
        self.executor.close().await
    }

    async fn notify_resume(&self, subscription: &Subscription) {
        if let Err(e) = self.listener.on_resume(subscription).await {
            warn!(subscription = %subscription.header, error = %e, "resume notification failed");
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::listener::NoopListener;
    use crate::storage::MemoryStorage;
    use crate::test_helpers::CollectingReceiver;
    use crate::types::Update;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use tokio_util::sync::CancellationToken;

    /// Vendor that produces nothing and parks until the refresh is cancelled
    struct IdleVendor;

    #[async_trait]
    impl Vendor for IdleVendor {
        fn name(&self) -> &str {
            "idle"
        }

        async fn refresh(
            &self,
            cancel: CancellationToken,
            _subscription: Subscription,
            _updates: mpsc::Sender<Result<Update>>,
        ) {
            cancel.cancelled().await;
        }
    }

    fn quiet_config() -> Arc<Config> {
        Arc::new(Config {
            idle_interval: Duration::from_secs(3600),
            ..Config::default()
        })
    }

    fn aggregator(storage: Arc<MemoryStorage>) -> FeedAggregator {
        let mut aggregator = FeedAggregator::new(
            quiet_config(),
            storage,
            CollectingReceiver::new(),
            Arc::new(NoopListener),
        );
        aggregator.register_vendor(Arc::new(IdleVendor));
        aggregator
    }

    fn subscription(feed: i64, item: &str) -> Subscription {
        Subscription::new(
            SubscriptionHeader::new(FeedId(feed), "idle", item),
            format!("Sub {item}"),
            b"cursor".to_vec(),
        )
    }

    #[tokio::test]
    async fn test_subscribe_persists_and_starts_task() {
        let storage = Arc::new(MemoryStorage::new());
        let aggregator = aggregator(storage.clone());

        aggregator.subscribe(subscription(1, "a")).await.unwrap();

        let header = SubscriptionHeader::new(FeedId(1), "idle", "a");
        assert!(storage.get(&header).await.unwrap().is_some());
        assert_eq!(aggregator.executor.running().await.unwrap(), 1);

        aggregator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_subscribe_fails_without_second_task() {
        let storage = Arc::new(MemoryStorage::new());
        let aggregator = aggregator(storage);

        aggregator.subscribe(subscription(1, "a")).await.unwrap();
        let err = aggregator.subscribe(subscription(1, "a")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Storage(crate::error::StorageError::ConstraintViolation(_))
        ));
        assert_eq!(aggregator.executor.running().await.unwrap(), 1);

        aggregator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unsubscribe_suspends_but_keeps_record() {
        let storage = Arc::new(MemoryStorage::new());
        let aggregator = aggregator(storage.clone());
        aggregator.subscribe(subscription(1, "a")).await.unwrap();

        let header = SubscriptionHeader::new(FeedId(1), "idle", "a");
        aggregator.unsubscribe(&header).await.unwrap();

        let sub = storage.get(&header).await.unwrap().unwrap();
        assert_eq!(sub.error.as_deref(), Some(USER_SUSPENDED));

        aggregator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_resume_clears_suspension_and_keeps_cursor() {
        let storage = Arc::new(MemoryStorage::new());
        let aggregator = aggregator(storage.clone());
        aggregator.subscribe(subscription(1, "a")).await.unwrap();

        let header = SubscriptionHeader::new(FeedId(1), "idle", "a");
        aggregator.unsubscribe(&header).await.unwrap();
        aggregator.resume(&header).await.unwrap();

        let sub = storage.get(&header).await.unwrap().unwrap();
        assert!(!sub.is_suspended());
        assert_eq!(sub.data, b"cursor");

        aggregator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let storage = Arc::new(MemoryStorage::new());
        let aggregator = aggregator(storage.clone());
        aggregator.subscribe(subscription(1, "a")).await.unwrap();

        let header = SubscriptionHeader::new(FeedId(1), "idle", "a");
        aggregator.delete(&header).await.unwrap();
        assert!(storage.get(&header).await.unwrap().is_none());

        aggregator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_deletes_matching_names() {
        let storage = Arc::new(MemoryStorage::new());
        let aggregator = aggregator(storage);
        aggregator.subscribe(subscription(1, "alpha")).await.unwrap();
        aggregator.subscribe(subscription(1, "beta")).await.unwrap();

        let deleted = aggregator.clear(FeedId(1), "Sub a%").await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(aggregator.list(FeedId(1)).await.unwrap().len(), 1);

        aggregator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_active_resumes_persisted_destinations() {
        let storage = Arc::new(MemoryStorage::new());
        storage.create(subscription(1, "a")).await.unwrap();
        storage.create(subscription(2, "b")).await.unwrap();
        let mut suspended = subscription(3, "c");
        suspended.error = Some("broken".into());
        storage.create(suspended).await.unwrap();

        let aggregator = aggregator(storage);
        let started = aggregator.start_active().await.unwrap();
        assert_eq!(started, 2, "only destinations with active subscriptions start");
        assert_eq!(aggregator.executor.running().await.unwrap(), 2);

        aggregator.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_then_start_restarts_task() {
        let storage = Arc::new(MemoryStorage::new());
        let aggregator = aggregator(storage);
        aggregator.subscribe(subscription(1, "a")).await.unwrap();

        timeout(Duration::from_secs(1), aggregator.stop(FeedId(1)))
            .await
            .expect("stop must not hang")
            .unwrap();
        assert_eq!(aggregator.executor.running().await.unwrap(), 0);

        assert!(aggregator.start(FeedId(1)).await.unwrap());
        aggregator.shutdown().await.unwrap();
    }
}
