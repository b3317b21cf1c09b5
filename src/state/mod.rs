//! Per-queue and per-crawl scheduling state

mod crawl_limits;
mod queue_state;

pub use crawl_limits::CrawlLimits;
pub use queue_state::{QueueState, QueueStatus};
