//! Page-bounded output engine
//!
//! Buffers text for one destination and delivers it through an abstract
//! [`Receiver`] in size-limited pages. Callers choose between three write
//! primitives:
//!
//! - [`PagedOutput::write`] — uncapped append for short, known-safe fragments
//!   (tag markers and the like)
//! - [`PagedOutput::write_breakable`] — splits across pages at whitespace or
//!   punctuation near the capacity boundary
//! - [`PagedOutput::write_unbreakable`] — atomic unit; forced onto a fresh
//!   page when needed, degraded to a placeholder when wider than a page
//!
//! A registered prefix/suffix is repeated at the start/end of every page so
//! that open markup survives forced page breaks. Output past the configured
//! page maximum is silently truncated — a deliberate policy, not an error.

use crate::config::OutputConfig;
use crate::error::Result;
use crate::types::FeedId;
use async_trait::async_trait;
use std::sync::Arc;


/// Marker substituted for an unbreakable fragment wider than an empty page
pub const UNBREAKABLE_PLACEHOLDER: &str = "[...]";

/// Kind of a media attachment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    /// Still image
    Photo,
    /// Video clip
    Video,
    /// Generic file attachment
    Document,
}

/// Reference to an already-hosted media item
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaRef {
    /// Location the transport can resolve (URL or transport-native file id)
    pub url: String,
    /// Attachment kind
    pub kind: MediaKind,
}

impl MediaRef {
    /// Create a new media reference
    pub fn new(url: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }
}

/// Delivery transport for rendered pages
///
/// Implementations are destination-aware: one receiver serves every feed and
/// routes by `feed_id`. Errors are surfaced to the caller unmodified.
#[async_trait]
pub trait Receiver: Send + Sync {
    /// Deliver one text page to a destination
    async fn send_text(&self, feed_id: FeedId, text: &str) -> Result<()>;

    /// Deliver one media item with a caption to a destination
    async fn send_media(&self, feed_id: FeedId, media: &MediaRef, caption: &str) -> Result<()>;
}

/// Buffered, size-bounded text/media sink bound to one destination
///
/// Owned exclusively by one refresh task at a time; never shared.
pub struct PagedOutput {
    receiver: Arc<dyn Receiver>,
    feed_id: FeedId,
    limits: OutputConfig,
    buf: String,
    prefix: String,
    suffix: String,
    /// Pages emitted since the last flush; gates caption collapsing
    group_pages: u32,
    /// Pages emitted over the output's whole lifetime; drives overflow
    total_pages: u32,
    overflown: bool,
}

impl PagedOutput {
    /// Create an output bound to `feed_id` over `receiver`
    pub fn new(receiver: Arc<dyn Receiver>, feed_id: FeedId, limits: OutputConfig) -> Self {
        Self {
            receiver,
            feed_id,
            limits,
            buf: String::new(),
            prefix: String::new(),
            suffix: String::new(),
            group_pages: 0,
            total_pages: 0,
            overflown: false,
        }
    }

    /// Remaining capacity of the current page, in characters
    ///
    /// Accounts for the buffered text and the pending suffix, so it shrinks as
    /// open tags accumulate suffix text.
    pub fn page_capacity(&self) -> usize {
        self.limits
            .page_size
            .saturating_sub(char_len(&self.buf) + char_len(&self.suffix))
    }

    /// True once the page maximum has been reached; all writes are no-ops
    pub fn is_overflown(&self) -> bool {
        self.overflown
    }

    /// Total pages (text and media) delivered so far
    pub fn pages_sent(&self) -> u32 {
        self.total_pages
    }

    /// Register text repeated at the start of every page from now on
    pub fn update_prefix(&mut self, prefix: impl Into<String>) {
        self.prefix = prefix.into();
    }

    /// Register text repeated at the end of every page from now on
    pub fn update_suffix(&mut self, suffix: impl Into<String>) {
        self.suffix = suffix.into();
    }

    /// Append into the current page buffer, uncapped
    ///
    /// No breaking logic; for short fragments the caller knows are safe.
    pub fn write(&mut self, text: &str) {
        if self.overflown {
            return;
        }
        self.buf.push_str(text);
    }

    /// Append text, splitting it across as many pages as needed
    ///
    /// Break points are chosen by scanning backward from the capacity boundary
    /// for the nearest whitespace (trimmed) or `, . : ;` punctuation (kept on
    /// the earlier page); a hard split at the boundary is the fallback.
    pub async fn write_breakable(&mut self, text: &str) -> Result<()> {
        if self.overflown {
            return Ok(());
        }
        let mut rest = text;
        while !rest.is_empty() {
            let capacity = self.page_capacity();
            if char_len(rest) <= capacity {
                self.buf.push_str(rest);
                break;
            }
            if capacity == 0 {
                let before = self.total_pages;
                self.break_page().await?;
                if self.overflown {
                    break;
                }
                if self.total_pages == before {
                    // Prefix and suffix alone fill a page; give up on breaking
                    self.buf.push_str(rest);
                    break;
                }
                continue;
            }
            let (head, tail) = split_at_break(rest, capacity);
            self.buf.push_str(head);
            self.break_page().await?;
            if self.overflown {
                break;
            }
            rest = tail;
        }
        Ok(())
    }

    /// Append text as an atomic unit
    ///
    /// Forces a page break first when the text does not fit the remaining
    /// capacity. When it exceeds even an empty page, the fixed
    /// [`UNBREAKABLE_PLACEHOLDER`] is written instead — a degraded fallback,
    /// not an error.
    pub async fn write_unbreakable(&mut self, text: &str) -> Result<()> {
        if self.overflown {
            return Ok(());
        }
        let needed = char_len(text);
        if needed > self.page_capacity() {
            self.break_page().await?;
            if self.overflown {
                return Ok(());
            }
        }
        if needed > self.page_capacity() {
            self.buf.push_str(UNBREAKABLE_PLACEHOLDER);
        } else {
            self.buf.push_str(text);
        }
        Ok(())
    }

    /// Send a media item, optionally collapsing buffered text into its caption
    ///
    /// When `collapsible` is set, no page has been emitted yet in the current
    /// page group, and the buffered text plus caption fits the caption limit,
    /// the buffer is folded into the caption (`"{buffer}\n{caption}"`) and
    /// reset. Otherwise any buffered text is flushed as a standalone page
    /// first and the media goes out with just its own caption.
    pub async fn add_media(
        &mut self,
        media: &MediaRef,
        caption: &str,
        collapsible: bool,
    ) -> Result<()> {
        if self.overflown {
            return Ok(());
        }

        let has_content = char_len(&self.buf) > char_len(&self.prefix);
        if collapsible
            && self.group_pages == 0
            && has_content
            && char_len(&self.buf) + 1 + char_len(caption) <= self.limits.caption_size
        {
            let combined = format!("{}\n{}", self.buf, caption);
            self.buf.clear();
            self.buf.push_str(&self.prefix);
            return self.send_media(media, &combined).await;
        }

        if has_content {
            self.break_page().await?;
            if self.overflown {
                return Ok(());
            }
        }
        self.send_media(media, caption).await
    }

    /// Emit the current buffer as one page
    ///
    /// No-op when the buffer holds nothing beyond the re-seeded prefix. The
    /// pending suffix is appended, the page is sent, and the buffer restarts
    /// from the pending prefix. Reaching the configured page maximum marks the
    /// output overflown.
    pub async fn break_page(&mut self) -> Result<()> {
        if self.overflown || self.buf == self.prefix {
            return Ok(());
        }
        let mut page = std::mem::take(&mut self.buf);
        page.push_str(&self.suffix);
        self.receiver.send_text(self.feed_id, &page).await?;
        self.buf.push_str(&self.prefix);
        self.note_page_sent();
        Ok(())
    }

    /// Force a final page break and start a new page group
    ///
    /// Resets the group page counter used by caption collapsing; the overflow
    /// counter's lifetime is the whole output and is deliberately untouched.
    pub async fn flush(&mut self) -> Result<()> {
        self.break_page().await?;
        self.group_pages = 0;
        Ok(())
    }

    async fn send_media(&mut self, media: &MediaRef, caption: &str) -> Result<()> {
        self.receiver.send_media(self.feed_id, media, caption).await?;
        self.note_page_sent();
        Ok(())
    }

    fn note_page_sent(&mut self) {
        self.group_pages += 1;
        self.total_pages += 1;
        if self.total_pages >= self.limits.max_pages {
            self.overflown = true;
        }
    }
}

/// Character count; page limits are measured in characters, not bytes
fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split `text` so the head fits `capacity` characters, preferring a break at
/// whitespace (dropped) or `, . : ;` punctuation (kept on the head)
fn split_at_break(text: &str, capacity: usize) -> (&str, &str) {
    debug_assert!(capacity > 0);
    let boundary = text
        .char_indices()
        .nth(capacity)
        .map(|(i, _)| i)
        .unwrap_or(text.len());

    for (i, c) in text[..boundary].char_indices().rev() {
        if c.is_whitespace() {
            return (&text[..i], &text[i + c.len_utf8()..]);
        }
        if matches!(c, ',' | '.' | ':' | ';') {
            let after = i + c.len_utf8();
            return (&text[..after], &text[after..]);
        }
    }
    text.split_at(boundary)
}
