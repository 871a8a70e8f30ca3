//! Core data model for feedrelay
//!
//! The central record is the [`Subscription`]: one tracked
//! (destination, vendor, item) relationship with persisted cursor state.
//! Vendors produce [`Update`]s during a refresh; every refresh attempt ends in
//! exactly one persisted [`UpdatePayload`].

use crate::error::Result;
use crate::markup::MarkupWriter;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a destination ("feed") — typically a chat id
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FeedId(pub i64);

impl FeedId {
    /// Create a new FeedId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for FeedId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<FeedId> for i64 {
    fn from(id: FeedId) -> Self {
        id.0
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FeedId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, <Self as FromStr>::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Composite key of one subscription: (destination, vendor, source item)
///
/// Immutable once created. The canonical string form (`feed/vendor/item`) is
/// used for logging and for pattern matching in bulk operations.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionHeader {
    /// Destination that owns the subscription
    pub feed_id: FeedId,
    /// Name of the vendor responsible for refreshing it
    pub vendor: String,
    /// Vendor-scoped identifier of the source item
    pub item_id: String,
}

impl SubscriptionHeader {
    /// Create a new header
    pub fn new(feed_id: FeedId, vendor: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            feed_id,
            vendor: vendor.into(),
            item_id: item_id.into(),
        }
    }
}

impl fmt::Display for SubscriptionHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.feed_id, self.vendor, self.item_id)
    }
}

/// One tracked (destination, vendor, item) relationship
///
/// Exclusively owned by storage; the refresh task holds at most one
/// subscription in flight per destination at a time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    /// Composite key, immutable once created
    pub header: SubscriptionHeader,
    /// Human-readable label, bounded length
    pub name: String,
    /// Opaque vendor-owned cursor bytes, replaced wholesale on each successful refresh
    pub data: Vec<u8>,
    /// Last-failure message; presence marks the subscription suspended
    pub error: Option<String>,
    /// Timestamp used only for oldest-updated-first ordering, not for correctness
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Create a fresh, active subscription with an initial cursor
    pub fn new(header: SubscriptionHeader, name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            header,
            name: name.into(),
            data,
            error: None,
            updated_at: Utc::now(),
        }
    }

    /// Returns true when the subscription is suspended (last refresh recorded a failure)
    pub fn is_suspended(&self) -> bool {
        self.error.is_some()
    }
}

/// Outcome persisted for a refresh attempt
///
/// An explicit tagged variant: the payload says whether the attempt advanced
/// the cursor or suspended the subscription, instead of callers inferring
/// intent from which field happens to be set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdatePayload {
    /// Successful refresh: replace the cursor and clear any error
    Cursor(Vec<u8>),
    /// Failed refresh: record the error, suspending the subscription
    Failure(String),
}

/// Render callback executed against a destination-bound markup writer
pub type RenderFn =
    Box<dyn for<'a> FnOnce(&'a mut MarkupWriter) -> BoxFuture<'a, Result<()>> + Send>;

/// One item produced by a vendor refresh
///
/// `render` is optional — a vendor may advance the cursor without producing
/// user-visible output. `data` is the new cursor to persist regardless of the
/// render outcome.
pub struct Update {
    /// Optional render callback producing rich-text output for this item
    pub render: Option<RenderFn>,
    /// New cursor to persist after this item is handled
    pub data: Vec<u8>,
}

impl Update {
    /// Cursor-only update (no user-visible output)
    pub fn cursor(data: Vec<u8>) -> Self {
        Self { render: None, data }
    }

    /// Update carrying a render callback
    pub fn rendered(data: Vec<u8>, render: RenderFn) -> Self {
        Self {
            render: Some(render),
            data,
        }
    }
}

impl fmt::Debug for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Update")
            .field("render", &self.render.as_ref().map(|_| "<fn>"))
            .field("data_len", &self.data.len())
            .finish()
    }
}
