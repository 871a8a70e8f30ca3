//! Streaming rich-text composer over a paged output
//!
//! Consumes a stream of start-tag / text / end-tag events (from parsing an
//! HTML-like markup subset) and keeps the emitted pages independently
//! well-formed: every open tag's markup is registered as page prefix/suffix,
//! so a forced page break closes it at the end of one page and reopens it at
//! the start of the next.
//!
//! Only the open/ancestor path matters for that bookkeeping, so the writer
//! maintains a singly-linked chain of open tags (innermost first) rather than
//! a tree.
//!
//! Anchors are special: a link must reach the transport as one atomic unit,
//! so text and nested formatting written while an anchor is open accumulate
//! into a pending buffer that is emitted via
//! [`PagedOutput::write_unbreakable`] when the anchor closes.

use crate::error::Result;
use crate::output::{MediaRef, PagedOutput};


/// Maximum depth of the open-tag chain; exceeding it is a programming error
const MAX_TAG_DEPTH: usize = 16;

/// Opening and closing markup of a convertible tag
struct TagMarkup {
    open: &'static str,
    close: &'static str,
}

const BOLD: TagMarkup = TagMarkup {
    open: "<b>",
    close: "</b>",
};
const ITALIC: TagMarkup = TagMarkup {
    open: "<i>",
    close: "</i>",
};
const CODE: TagMarkup = TagMarkup {
    open: "<code>",
    close: "</code>",
};
const PRE: TagMarkup = TagMarkup {
    open: "<pre>",
    close: "</pre>",
};

/// One open tag in the chain
struct TagFrame {
    kind: FrameKind,
    next: Option<Box<TagFrame>>,
}

enum FrameKind {
    /// Convertible tag; `in_anchor` records whether its markup was routed into
    /// the pending anchor accumulator
    Markup {
        markup: &'static TagMarkup,
        in_anchor: bool,
    },
    /// Open anchor owning the pending accumulator
    Anchor,
    /// Unrecognized tag: no markup, tracked only for nesting depth
    Transparent,
}

/// Pending anchor accumulator
struct Anchor {
    href: String,
    text: String,
}

/// Streaming markup writer driving a [`PagedOutput`]
pub struct MarkupWriter {
    out: PagedOutput,
    chain: Option<Box<TagFrame>>,
    depth: usize,
    anchor: Option<Anchor>,
}

impl MarkupWriter {
    /// Create a writer over a destination-bound paged output
    pub fn new(out: PagedOutput) -> Self {
        Self {
            out,
            chain: None,
            depth: 0,
            anchor: None,
        }
    }

    /// Handle a start tag
    ///
    /// `attrs` carries the tag's attributes; only `href` on anchors is used.
    /// Unrecognized tags are tracked transparently so nesting stays balanced.
    pub async fn start_tag(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
        match name {
            // Void tag: emits a newline, opens nothing
            "br" => return self.out.write_breakable("\n").await,
            "a" => {
                if self.anchor.is_some() {
                    // Nested anchors cannot be represented; track depth only
                    self.push_frame(FrameKind::Transparent);
                } else {
                    let href = attrs
                        .iter()
                        .find(|(k, _)| *k == "href")
                        .map(|(_, v)| (*v).to_string())
                        .unwrap_or_default();
                    self.anchor = Some(Anchor {
                        href,
                        text: String::new(),
                    });
                    self.push_frame(FrameKind::Anchor);
                }
            }
            "b" | "strong" => self.open_markup(&BOLD).await?,
            "i" | "em" => self.open_markup(&ITALIC).await?,
            "code" => self.open_markup(&CODE).await?,
            "pre" => self.open_markup(&PRE).await?,
            _ => self.push_frame(FrameKind::Transparent),
        }
        Ok(())
    }

    /// Handle a text node
    pub async fn text(&mut self, text: &str) -> Result<()> {
        let escaped = escape_html(text);
        match self.anchor.as_mut() {
            Some(anchor) => {
                anchor.text.push_str(&escaped);
                Ok(())
            }
            None => self.out.write_breakable(&escaped).await,
        }
    }

    /// Handle an end tag, closing the innermost open tag
    ///
    /// Closing with no open tag is a programming error (the event stream is
    /// expected to be balanced; unrecognized tags are tracked too).
    pub async fn end_tag(&mut self) -> Result<()> {
        let frame = self.pop_frame();
        match frame.kind {
            FrameKind::Anchor => {
                let anchor = match self.anchor.take() {
                    Some(anchor) => anchor,
                    // Unreachable for balanced input: the frame was pushed
                    // together with the accumulator
                    None => return Ok(()),
                };
                let markup = format_anchor(&anchor);
                self.out.write_unbreakable(&markup).await?;
            }
            FrameKind::Markup { markup, in_anchor } => {
                match (in_anchor, self.anchor.as_mut()) {
                    (true, Some(anchor)) => anchor.text.push_str(markup.close),
                    _ => {
                        self.out.write(markup.close);
                        self.sync_page_markup();
                    }
                }
            }
            FrameKind::Transparent => {}
        }
        Ok(())
    }

    /// Send a media item through the underlying output
    pub async fn media(
        &mut self,
        media: &MediaRef,
        caption: &str,
        collapsible: bool,
    ) -> Result<()> {
        self.out.add_media(media, caption, collapsible).await
    }

    /// Force-close any still-open tags, then flush the paged output
    ///
    /// Guarantees every emitted page is independently well-formed markup.
    pub async fn flush(&mut self) -> Result<()> {
        while self.depth > 0 {
            self.end_tag().await?;
        }
        self.out.flush().await
    }

    async fn open_markup(&mut self, markup: &'static TagMarkup) -> Result<()> {
        if let Some(anchor) = self.anchor.as_mut() {
            anchor.text.push_str(markup.open);
            self.push_frame(FrameKind::Markup {
                markup,
                in_anchor: true,
            });
            return Ok(());
        }

        let overhead = markup.open.len() + markup.close.len();
        if self.out.page_capacity() < overhead {
            self.out.break_page().await?;
        }
        self.out.write(markup.open);
        self.push_frame(FrameKind::Markup {
            markup,
            in_anchor: false,
        });
        self.sync_page_markup();
        Ok(())
    }

    fn push_frame(&mut self, kind: FrameKind) {
        assert!(self.depth < MAX_TAG_DEPTH, "markup tag chain overflow");
        let next = self.chain.take();
        self.chain = Some(Box::new(TagFrame { kind, next }));
        self.depth += 1;
    }

    fn pop_frame(&mut self) -> TagFrame {
        let Some(mut frame) = self.chain.take() else {
            panic!("markup tag chain underflow");
        };
        self.chain = frame.next.take();
        self.depth -= 1;
        *frame
    }

    /// Recompute the page prefix/suffix from the open-tag chain
    ///
    /// Prefix is the opens outermost-first, suffix the closes innermost-first,
    /// so a page break closes and reopens nesting in the right order. Frames
    /// routed into an anchor accumulator contribute nothing: their markup
    /// lives inside the unbreakable anchor unit.
    fn sync_page_markup(&mut self) {
        let mut opens: Vec<&'static str> = Vec::new();
        let mut suffix = String::new();
        let mut current = self.chain.as_deref();
        while let Some(frame) = current {
            if let FrameKind::Markup {
                markup,
                in_anchor: false,
            } = frame.kind
            {
                opens.push(markup.open);
                suffix.push_str(markup.close);
            }
            current = frame.next.as_deref();
        }
        opens.reverse();
        self.out.update_prefix(opens.concat());
        self.out.update_suffix(suffix);
    }
}

/// Escape text content for HTML-like markup output
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Format a finished anchor accumulator into its final markup
fn format_anchor(anchor: &Anchor) -> String {
    format!(
        "<a href=\"{}\">{}</a>",
        anchor.href.replace('"', "&quot;"),
        anchor.text
    )
}
