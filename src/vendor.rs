//! Pluggable content-source integrations
//!
//! A vendor knows how to refresh one kind of subscription. The engine stays
//! agnostic of wire formats: vendors are registered by name and produce
//! [`Update`]s through a bounded channel, which is the lazy sequence the
//! refresh task consumes. When the task renders slower than updates arrive
//! the channel fills up and the vendor blocks — that is the back-pressure
//! mechanism, no extra coordination required.

use crate::error::Result;
use crate::types::{Subscription, Update};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Content-source integration capable of refreshing subscriptions
///
/// Implementations must respect `cancel` and return promptly once it fires;
/// dropping `updates` closes the sequence. A refresh error is reported as an
/// `Err` item on the channel, after which the consumer stops listening.
#[async_trait]
pub trait Vendor: Send + Sync {
    /// Registry name; matched against [`crate::types::SubscriptionHeader::vendor`]
    fn name(&self) -> &str;

    /// Produce updates for one subscription
    ///
    /// `subscription.data` carries the cursor persisted by the previous
    /// refresh; each produced [`Update`] carries the cursor to persist after
    /// it is handled, so delivery is at-least-once with idempotent offset
    /// advancement.
    async fn refresh(
        &self,
        cancel: CancellationToken,
        subscription: Subscription,
        updates: mpsc::Sender<Result<Update>>,
    );
}

/// Immutable name-to-vendor registry snapshot shared with refresh tasks
pub type VendorRegistry = Arc<HashMap<String, Arc<dyn Vendor>>>;
