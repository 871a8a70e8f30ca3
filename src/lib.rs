//! # feedrelay
//!
//! Backend library for feed-aggregation bots.
//!
//! ## Design Philosophy
//!
//! feedrelay is designed to be:
//! - **Library-first** - No bot frontend or transport, purely a Rust crate for embedding
//! - **Vendor-agnostic** - Sources plug in behind the [`vendor::Vendor`] trait
//! - **Single-flight** - At most one refresh task runs per destination at any instant
//! - **Cancellation-correct** - Every blocking point is interruptible; shutdown waits
//!   for tasks to observably return
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use feedrelay::{Config, FeedAggregator, NoopListener, SqliteStorage, run_with_shutdown};
//!
//! # async fn example(
//! #     receiver: Arc<dyn feedrelay::output::Receiver>,
//! #     vendor: Arc<dyn feedrelay::vendor::Vendor>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let storage = Arc::new(SqliteStorage::new("feedrelay.db").await?);
//! let mut aggregator = FeedAggregator::new(
//!     Arc::new(Config::default()),
//!     storage,
//!     receiver,
//!     Arc::new(NoopListener),
//! );
//! aggregator.register_vendor(vendor);
//! aggregator.start_active().await?;
//!
//! // Run until SIGTERM/SIGINT, then drain all refresh tasks
//! run_with_shutdown(aggregator).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Top-level aggregator facade
pub mod aggregator;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Keyed single-flight task executor
pub mod executor;
/// Reader/writer lock with strict arrival-order fairness
pub mod fair_lock;
/// Subscription lifecycle notifications
pub mod listener;
/// Rich-text markup writer over paged output
pub mod markup;
/// Paged output and the delivery receiver contract
pub mod output;
/// Per-destination refresh loop
pub mod refresh;
/// Subscription persistence
pub mod storage;
/// Core data model
pub mod types;
/// Vendor (source) contract
pub mod vendor;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use aggregator::FeedAggregator;
pub use config::{Config, OutputConfig};
pub use error::{Error, Result, StorageError};
pub use executor::TaskExecutor;
pub use fair_lock::FairLock;
pub use listener::{EventListener, NoopListener};
pub use markup::MarkupWriter;
pub use output::{MediaKind, MediaRef, PagedOutput, Receiver};
pub use storage::{MemoryStorage, SqliteStorage, Storage};
pub use types::{FeedId, Subscription, SubscriptionHeader, Update, UpdatePayload};
pub use vendor::{Vendor, VendorRegistry};

/// Helper function to run the aggregator with graceful signal handling.
///
/// Waits for a termination signal and then calls the aggregator's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use feedrelay::{Config, FeedAggregator, NoopListener, MemoryStorage, run_with_shutdown};
///
/// # async fn example(receiver: Arc<dyn feedrelay::output::Receiver>) -> feedrelay::Result<()> {
/// let aggregator = FeedAggregator::new(
///     Arc::new(Config::default()),
///     Arc::new(MemoryStorage::new()),
///     receiver,
///     Arc::new(NoopListener),
/// );
/// run_with_shutdown(aggregator).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_with_shutdown(aggregator: FeedAggregator) -> Result<()> {
    wait_for_signal().await;
    aggregator.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Handler registration can fail in restricted environments
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("received SIGINT, shutting down");
            } else {
                tracing::error!("no signal handlers could be registered, falling back to ctrl_c");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "SIGINT handler unavailable, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("received SIGTERM, shutting down");
            } else {
                tracing::error!("no signal handlers could be registered, falling back to ctrl_c");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received Ctrl+C, shutting down"),
        Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl+C"),
    }
}
