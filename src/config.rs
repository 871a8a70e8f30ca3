//! Configuration types for feedrelay
//!
//! All size limits and intervals that shape delivery are explicit configuration
//! passed into constructors; there is no package-level global state.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Output sizing configuration (page and caption limits)
///
/// Groups the knobs that bound a single delivered message. Used as a nested
/// sub-config within [`Config`] and consumed directly by the paged output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Maximum characters per delivered text page (default: 4096)
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Maximum characters in a media caption (default: 1024)
    ///
    /// Smaller than `page_size`; governs caption collapsing — buffered text is
    /// folded into a media caption only when the combined text fits here.
    #[serde(default = "default_caption_size")]
    pub caption_size: usize,

    /// Maximum pages delivered for one output before silent truncation (default: 10)
    ///
    /// Once this many pages have been sent the output is overflown and every
    /// further write becomes a no-op. Truncation policy, not an error.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            caption_size: default_caption_size(),
            max_pages: default_max_pages(),
        }
    }
}

/// Top-level feedrelay configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Output sizing limits
    #[serde(default)]
    pub output: OutputConfig,

    /// Depth of the vendor update queue (default: 5)
    ///
    /// Bounds how far a vendor may run ahead of rendering; when the queue is
    /// full the vendor blocks, which is the back-pressure mechanism.
    #[serde(default = "default_update_queue_depth")]
    pub update_queue_depth: usize,

    /// Pause between refresh cycles of one destination (default: 60s)
    #[serde(with = "duration_secs", default = "default_idle_interval")]
    pub idle_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            update_queue_depth: default_update_queue_depth(),
            idle_interval: default_idle_interval(),
        }
    }
}

fn default_page_size() -> usize {
    4096
}

fn default_caption_size() -> usize {
    1024
}

fn default_max_pages() -> u32 {
    10
}

fn default_update_queue_depth() -> usize {
    5
}

fn default_idle_interval() -> Duration {
    Duration::from_secs(60)
}

/// Serde module for serializing/deserializing Duration as whole seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
