use crate::config::FrontierConfig;

/// Per-crawl scheduling limits
///
/// Every crawl starts from the configured defaults; `SetCrawlLimits` on the
/// control surface overrides them at runtime.
#[derive(Debug, Clone, Copy)]
pub struct CrawlLimits {
    /// Minimum interval between two serves from the same queue (milliseconds)
    pub min_delay_ms: i64,

    /// Maximum entries a single queue may hold; further Discovered items FAIL
    pub max_queue_size: Option<u64>,
}

impl CrawlLimits {
    pub fn from_config(config: &FrontierConfig) -> Self {
        Self {
            min_delay_ms: (config.default_min_delay_seconds * 1_000) as i64,
            max_queue_size: None,
        }
    }
}
