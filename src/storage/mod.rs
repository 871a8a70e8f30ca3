//! Subscription persistence
//!
//! The [`Storage`] trait is the contract the refresh machinery runs against;
//! embedders may bring their own backend. Two reference backends are bundled:
//!
//! - [`MemoryStorage`] — process-local, for tests and ephemeral deployments
//! - [`SqliteStorage`] — durable single-file backend over sqlx
//!
//! The backend is assumed to serialize conflicting writes to the same
//! subscription itself; the refresh machinery never locks records.

use crate::error::Result;
use crate::types::{FeedId, Subscription, SubscriptionHeader, UpdatePayload};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

mod memory;
mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

/// Persistence contract for subscriptions
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert a new subscription
    ///
    /// Fails with a constraint violation when the header already exists.
    async fn create(&self, subscription: Subscription) -> Result<()>;

    /// Look up one subscription by header
    async fn get(&self, header: &SubscriptionHeader) -> Result<Option<Subscription>>;

    /// Pop the next eligible subscription for a destination
    ///
    /// Returns the earliest-updated subscription that is not suspended, or
    /// `None` when the destination has nothing eligible. The oldest-first
    /// order is what gives round-robin fairness across a destination's
    /// subscriptions.
    async fn shift(&self, feed_id: FeedId) -> Result<Option<Subscription>>;

    /// Persist the outcome of a refresh attempt
    ///
    /// [`UpdatePayload::Cursor`] replaces the cursor and clears any error;
    /// [`UpdatePayload::Failure`] records the error, suspending the
    /// subscription. `at` becomes the new `updated_at` in both cases.
    async fn update(
        &self,
        at: DateTime<Utc>,
        header: &SubscriptionHeader,
        payload: UpdatePayload,
    ) -> Result<()>;

    /// All subscriptions of a destination, suspended ones included
    async fn list(&self, feed_id: FeedId) -> Result<Vec<Subscription>>;

    /// Destinations that currently have at least one active subscription
    async fn active_feeds(&self) -> Result<Vec<FeedId>>;

    /// Delete one subscription
    async fn delete(&self, header: &SubscriptionHeader) -> Result<()>;

    /// Bulk-delete a destination's subscriptions whose name matches `pattern`
    ///
    /// `pattern` uses SQL LIKE syntax with `%` wildcards. Returns the number
    /// of deleted subscriptions.
    async fn clear(&self, feed_id: FeedId, pattern: &str) -> Result<u64>;
}

/// Minimal LIKE-style matcher (`%` wildcard only) for non-SQL backends
fn like_match(pattern: &str, value: &str) -> bool {
    let segments: Vec<&str> = pattern.split('%').collect();
    if segments.len() == 1 {
        return pattern == value;
    }

    let mut rest = value;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(segment) {
                Some(tail) => rest = tail,
                None => return false,
            }
        } else if i == segments.len() - 1 {
            return rest.ends_with(segment);
        } else {
            match rest.find(segment) {
                Some(pos) => rest = &rest[pos + segment.len()..],
                None => return false,
            }
        }
    }
    true
}
