//! Scripted vendors, capturing receivers, and recording listeners

use async_trait::async_trait;
use feedrelay::markup::MarkupWriter;
use feedrelay::{
    EventListener, FeedId, MediaRef, Receiver, Result, Subscription, Update, Vendor,
};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One delivery captured by [`CapturingReceiver`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Text(String),
    Media { url: String, caption: String },
}

/// Receiver recording every delivered page and media item
#[derive(Default)]
pub struct CapturingReceiver {
    deliveries: Mutex<Vec<Delivery>>,
}

impl CapturingReceiver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Everything delivered so far, in order
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    /// Text pages delivered so far, in order
    pub fn texts(&self) -> Vec<String> {
        self.deliveries()
            .into_iter()
            .filter_map(|d| match d {
                Delivery::Text(t) => Some(t),
                Delivery::Media { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl Receiver for CapturingReceiver {
    async fn send_text(&self, _feed_id: FeedId, text: &str) -> Result<()> {
        self.deliveries
            .lock()
            .unwrap()
            .push(Delivery::Text(text.to_string()));
        Ok(())
    }

    async fn send_media(&self, _feed_id: FeedId, media: &MediaRef, caption: &str) -> Result<()> {
        self.deliveries.lock().unwrap().push(Delivery::Media {
            url: media.url.clone(),
            caption: caption.to_string(),
        });
        Ok(())
    }
}

/// Listener recording every lifecycle notification it receives
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<String>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventListener for RecordingListener {
    async fn on_resume(&self, s: &Subscription) -> Result<()> {
        self.events.lock().unwrap().push(format!("resume:{}", s.header));
        Ok(())
    }

    async fn on_suspend(&self, s: &Subscription) -> Result<()> {
        self.events.lock().unwrap().push(format!("suspend:{}", s.header));
        Ok(())
    }

    async fn on_delete(&self, s: &Subscription) -> Result<()> {
        self.events.lock().unwrap().push(format!("delete:{}", s.header));
        Ok(())
    }

    async fn on_clear(&self, feed_id: FeedId, pattern: &str, deleted: u64) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(format!("clear:{feed_id}:{pattern}:{deleted}"));
        Ok(())
    }
}

/// Vendor that emits a fixed batch of text posts on its first refresh
///
/// Each post advances the cursor to the post's text bytes. Subsequent
/// refreshes produce nothing, so the refresh loop settles into idle waits.
pub struct PostOnceVendor {
    name: String,
    posts: Mutex<Vec<String>>,
}

impl PostOnceVendor {
    pub fn new(name: impl Into<String>, posts: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            posts: Mutex::new(posts.iter().map(|p| p.to_string()).collect()),
        })
    }
}

#[async_trait]
impl Vendor for PostOnceVendor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn refresh(
        &self,
        _cancel: CancellationToken,
        _subscription: Subscription,
        updates: mpsc::Sender<Result<Update>>,
    ) {
        let posts = std::mem::take(&mut *self.posts.lock().unwrap());
        for post in posts {
            let cursor = post.clone().into_bytes();
            let update = Update::rendered(
                cursor,
                Box::new(move |w: &mut MarkupWriter| {
                    Box::pin(async move {
                        w.start_tag("b", &[]).await?;
                        w.text(&post).await?;
                        w.end_tag().await
                    })
                }),
            );
            if updates.send(Ok(update)).await.is_err() {
                break;
            }
        }
    }
}

/// Vendor whose refresh always fails immediately
pub struct BrokenVendor;

#[async_trait]
impl Vendor for BrokenVendor {
    fn name(&self) -> &str {
        "broken"
    }

    async fn refresh(
        &self,
        _cancel: CancellationToken,
        _subscription: Subscription,
        updates: mpsc::Sender<Result<Update>>,
    ) {
        let _ = updates
            .send(Err(feedrelay::Error::Vendor("permanently broken".into())))
            .await;
    }
}
