//! Per-destination refresh loop
//!
//! One [`RefreshTask`] serves one destination, driven by the
//! [`crate::executor::TaskExecutor`] under single-flight scheduling. Each
//! cycle shifts the destination's oldest-updated active subscription, runs its
//! vendor's refresh as a concurrent activity behind a bounded update queue,
//! renders every update through a fresh markup writer, and persists exactly
//! one outcome per attempt: a new cursor on success, a recorded failure on
//! suspension, or a bare timestamp bump when the vendor produced nothing
//! (which keeps round-robin fairness across the destination's subscriptions
//! advancing).
//!
//! Error routing follows a fixed taxonomy:
//! - cancellation propagates and ends the task, never logged as a failure
//! - a vendor error mid-stream aborts the attempt; earlier persisted cursors
//!   stand, the subscription is not suspended, the task logs and idles. An
//!   attempt that persisted nothing still gets the timestamp bump
//! - a missing vendor, a render/delivery failure, or a cursor persistence
//!   failure suspends the subscription and notifies the listener
//! - failure to persist the suspension itself is logged and the loop
//!   continues, leaving prior state untouched

use crate::config::Config;
use crate::error::{Error, Result};
use crate::listener::EventListener;
use crate::markup::MarkupWriter;
use crate::output::{PagedOutput, Receiver};
use crate::storage::Storage;
use crate::types::{FeedId, Subscription, UpdatePayload};
use crate::vendor::VendorRegistry;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Refresh loop for one destination
pub struct RefreshTask {
    feed_id: FeedId,
    config: Arc<Config>,
    storage: Arc<dyn Storage>,
    vendors: VendorRegistry,
    receiver: Arc<dyn Receiver>,
    listener: Arc<dyn EventListener>,
}

impl RefreshTask {
    /// Create a refresh task for `feed_id`
    pub fn new(
        feed_id: FeedId,
        config: Arc<Config>,
        storage: Arc<dyn Storage>,
        vendors: VendorRegistry,
        receiver: Arc<dyn Receiver>,
        listener: Arc<dyn EventListener>,
    ) -> Self {
        Self {
            feed_id,
            config,
            storage,
            vendors,
            receiver,
            listener,
        }
    }

    /// Run the loop until the destination has nothing eligible or `cancel` fires
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        info!(feed_id = %self.feed_id, "refresh task started");
        loop {
            let subscription = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                shifted = self.storage.shift(self.feed_id) => shifted?,
            };
            let Some(subscription) = subscription else {
                info!(feed_id = %self.feed_id, "no eligible subscriptions, refresh task ending");
                return Ok(());
            };

            debug!(subscription = %subscription.header, "refreshing");
            match self.refresh_one(&cancel, &subscription).await {
                Ok(()) => {}
                Err(e) if e.is_cancellation() => return Err(Error::Cancelled),
                Err(e) => self.suspend(&subscription, &e).await?,
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.config.idle_interval) => {}
            }
        }
    }

    /// Run one refresh attempt for one subscription
    ///
    /// Every returned error other than a mid-stream vendor error routes to the
    /// suspension path in [`RefreshTask::run`].
    async fn refresh_one(
        &self,
        cancel: &CancellationToken,
        subscription: &Subscription,
    ) -> Result<()> {
        let vendor = self
            .vendors
            .get(&subscription.header.vendor)
            .cloned()
            .ok_or_else(|| Error::UnknownVendor(subscription.header.vendor.clone()))?;

        let (tx, mut rx) = mpsc::channel(self.config.update_queue_depth);
        {
            let cancel = cancel.clone();
            let subscription = subscription.clone();
            tokio::spawn(async move {
                vendor.refresh(cancel, subscription, tx).await;
            });
        }

        let mut handled = 0u64;
        let mut aborted = false;
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                item = rx.recv() => item,
            };
            let Some(item) = item else {
                break;
            };
            match item {
                Err(e) => {
                    // Abort the attempt; cursors persisted so far stand and the
                    // queued remainder is discarded when rx drops
                    warn!(
                        subscription = %subscription.header,
                        error = %e,
                        "vendor refresh aborted"
                    );
                    aborted = true;
                    break;
                }
                Ok(update) => {
                    if let Some(render) = update.render {
                        let output = PagedOutput::new(
                            self.receiver.clone(),
                            self.feed_id,
                            self.config.output.clone(),
                        );
                        let mut writer = MarkupWriter::new(output);
                        render(&mut writer).await?;
                        writer.flush().await?;
                    }
                    self.storage
                        .update(
                            Utc::now(),
                            &subscription.header,
                            UpdatePayload::Cursor(update.data),
                        )
                        .await?;
                    handled += 1;
                }
            }
        }

        if handled == 0 {
            // Nothing persisted this attempt (empty refresh, or the vendor
            // failed before its first update): bump the timestamp so siblings
            // get their turn before this subscription is shifted again
            self.storage
                .update(
                    Utc::now(),
                    &subscription.header,
                    UpdatePayload::Cursor(subscription.data.clone()),
                )
                .await?;
        }
        debug!(
            subscription = %subscription.header,
            updates = handled,
            aborted,
            "refresh attempt finished"
        );
        Ok(())
    }

    /// Suspend a subscription after a failed refresh attempt
    ///
    /// Persists the failure, then notifies the listener. A cancellation-class
    /// persistence failure propagates and ends the task; any other
    /// persistence failure is logged and the loop continues.
    async fn suspend(&self, subscription: &Subscription, cause: &Error) -> Result<()> {
        warn!(
            subscription = %subscription.header,
            error = %cause,
            "suspending subscription"
        );
        let persisted = self
            .storage
            .update(
                Utc::now(),
                &subscription.header,
                UpdatePayload::Failure(cause.to_string()),
            )
            .await;
        match persisted {
            Ok(()) => {
                let mut suspended = subscription.clone();
                suspended.error = Some(cause.to_string());
                if let Err(e) = self.listener.on_suspend(&suspended).await {
                    warn!(
                        subscription = %subscription.header,
                        error = %e,
                        "suspend notification failed"
                    );
                }
                Ok(())
            }
            Err(e) if e.is_cancellation() => Err(e),
            Err(e) => {
                error!(
                    subscription = %subscription.header,
                    error = %e,
                    "failed to persist suspension"
                );
                Ok(())
            }
        }
    }
}
