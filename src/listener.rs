//! Subscription lifecycle notifications
//!
//! Invoked after the corresponding state transition has been persisted.
//! Typical implementations notify a destination's administrators; failures
//! are logged by the caller and never retried.

use crate::error::Result;
use crate::types::{FeedId, Subscription};
use async_trait::async_trait;

/// Observer of subscription lifecycle transitions
#[async_trait]
pub trait EventListener: Send + Sync {
    /// A subscription was created or reactivated
    async fn on_resume(&self, subscription: &Subscription) -> Result<()>;

    /// A subscription was suspended (refresh failure or explicit unsubscribe)
    async fn on_suspend(&self, subscription: &Subscription) -> Result<()>;

    /// A subscription was deleted
    async fn on_delete(&self, subscription: &Subscription) -> Result<()>;

    /// A bulk clear removed `deleted` subscriptions matching `pattern`
    async fn on_clear(&self, feed_id: FeedId, pattern: &str, deleted: u64) -> Result<()>;
}

/// Listener that ignores every event
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

#[async_trait]
impl EventListener for NoopListener {
    async fn on_resume(&self, _subscription: &Subscription) -> Result<()> {
        Ok(())
    }

    async fn on_suspend(&self, _subscription: &Subscription) -> Result<()> {
        Ok(())
    }

    async fn on_delete(&self, _subscription: &Subscription) -> Result<()> {
        Ok(())
    }

    async fn on_clear(&self, _feed_id: FeedId, _pattern: &str, _deleted: u64) -> Result<()> {
        Ok(())
    }
}
