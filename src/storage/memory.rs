//! In-memory storage backend.

use super::{Storage, like_match};
use crate::error::{Result, StorageError};
use crate::types::{FeedId, Subscription, SubscriptionHeader, UpdatePayload};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Process-local storage backend
///
/// Holds everything in a map; suitable for tests and for deployments where
/// losing cursors on restart is acceptable (vendors re-deliver from their
/// initial cursor — the engine is at-least-once by design).
#[derive(Default)]
pub struct MemoryStorage {
    subscriptions: Mutex<HashMap<SubscriptionHeader, Subscription>>,
}

impl MemoryStorage {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn create(&self, subscription: Subscription) -> Result<()> {
        let mut map = self.subscriptions.lock().await;
        if map.contains_key(&subscription.header) {
            return Err(StorageError::ConstraintViolation(format!(
                "subscription {} already exists",
                subscription.header
            ))
            .into());
        }
        map.insert(subscription.header.clone(), subscription);
        Ok(())
    }

    async fn get(&self, header: &SubscriptionHeader) -> Result<Option<Subscription>> {
        Ok(self.subscriptions.lock().await.get(header).cloned())
    }

    async fn shift(&self, feed_id: FeedId) -> Result<Option<Subscription>> {
        let map = self.subscriptions.lock().await;
        Ok(map
            .values()
            .filter(|s| s.header.feed_id == feed_id && !s.is_suspended())
            .min_by_key(|s| s.updated_at)
            .cloned())
    }

    async fn update(
        &self,
        at: DateTime<Utc>,
        header: &SubscriptionHeader,
        payload: UpdatePayload,
    ) -> Result<()> {
        let mut map = self.subscriptions.lock().await;
        let Some(subscription) = map.get_mut(header) else {
            return Err(StorageError::NotFound(header.to_string()).into());
        };
        match payload {
            UpdatePayload::Cursor(data) => {
                subscription.data = data;
                subscription.error = None;
            }
            UpdatePayload::Failure(error) => {
                subscription.error = Some(error);
            }
        }
        subscription.updated_at = at;
        Ok(())
    }

    async fn list(&self, feed_id: FeedId) -> Result<Vec<Subscription>> {
        let map = self.subscriptions.lock().await;
        let mut subscriptions: Vec<Subscription> = map
            .values()
            .filter(|s| s.header.feed_id == feed_id)
            .cloned()
            .collect();
        subscriptions.sort_by_key(|s| s.updated_at);
        Ok(subscriptions)
    }

    async fn active_feeds(&self) -> Result<Vec<FeedId>> {
        let map = self.subscriptions.lock().await;
        let mut feeds: Vec<FeedId> = map
            .values()
            .filter(|s| !s.is_suspended())
            .map(|s| s.header.feed_id)
            .collect();
        feeds.sort();
        feeds.dedup();
        Ok(feeds)
    }

    async fn delete(&self, header: &SubscriptionHeader) -> Result<()> {
        let mut map = self.subscriptions.lock().await;
        match map.remove(header) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(header.to_string()).into()),
        }
    }

    async fn clear(&self, feed_id: FeedId, pattern: &str) -> Result<u64> {
        let mut map = self.subscriptions.lock().await;
        let before = map.len();
        map.retain(|header, s| {
            header.feed_id != feed_id || !like_match(pattern, &s.name)
        });
        Ok((before - map.len()) as u64)
    }
}
