//! Shared fixtures for unit tests.

use crate::error::Result;
use crate::output::{MediaRef, Receiver};
use crate::types::FeedId;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// One delivery captured by [`CollectingReceiver`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Sent {
    Text(String),
    Media { url: String, caption: String },
}

/// Receiver that records every delivery for later assertions
pub(crate) struct CollectingReceiver {
    sent: Mutex<Vec<Sent>>,
}

impl CollectingReceiver {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Text pages delivered so far, in order
    pub(crate) fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Sent::Text(t) => Some(t.clone()),
                Sent::Media { .. } => None,
            })
            .collect()
    }

    /// Drain everything delivered so far
    pub(crate) fn take(&self) -> Vec<Sent> {
        std::mem::take(&mut self.sent.lock().unwrap())
    }
}

#[async_trait]
impl Receiver for CollectingReceiver {
    async fn send_text(&self, _feed_id: FeedId, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Text(text.to_string()));
        Ok(())
    }

    async fn send_media(&self, _feed_id: FeedId, media: &MediaRef, caption: &str) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Media {
            url: media.url.clone(),
            caption: caption.to_string(),
        });
        Ok(())
    }
}
