//! The frontier engine
//!
//! Coordinates the queue store, the in-memory queue directory, ingest, and
//! the fetch scheduler. The engine is transport-agnostic: the service layer
//! feeds it items and requests, tests drive it directly.

pub mod directory;
mod ingest;
mod scheduler;

pub use directory::{Directory, Queue, QueueId};
pub use ingest::{run_ingest, IngestItem};

use crate::config::FrontierConfig;
use crate::state::{CrawlLimits, QueueState, QueueStatus};
use crate::storage::{Metadata, QueueStore, StoreError};
use crate::{FrontierError, Result};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Number of lock stripes serializing known-set updates per (crawl, url)
const KNOWN_STRIPES: usize = 64;

/// The unit of scheduling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlInfo {
    pub url: String,
    pub crawl_id: String,
    /// Queue key; derived from the URL when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// An ingest item: freshly discovered, or replayed from a prior crawl
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum UrlItem {
    Discovered {
        info: UrlInfo,
    },
    Known {
        info: UrlInfo,
        /// Epoch seconds at which the URL becomes eligible again
        refetchable_from: i64,
    },
}

impl UrlItem {
    pub fn info(&self) -> &UrlInfo {
        match self {
            Self::Discovered { info } => info,
            Self::Known { info, .. } => info,
        }
    }
}

/// Acknowledgement status for one ingested item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AckStatus {
    Ok,
    Skipped,
    Fail,
}

/// Acknowledgement for one ingested item, correlated by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub id: String,
    pub status: AckStatus,
}

/// Parameters of a fetch request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetParams {
    /// Global cap on URLs in the response
    #[serde(default = "default_max_urls")]
    pub max_urls: u32,

    /// Cap on distinct queues drawn from
    #[serde(default = "default_max_queues")]
    pub max_queues: u32,

    /// Seconds until an unacked URL may be re-served
    #[serde(default = "default_delay_requestable")]
    pub delay_requestable: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawl_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

fn default_max_urls() -> u32 {
    1
}

fn default_max_queues() -> u32 {
    1
}

fn default_delay_requestable() -> u64 {
    30
}

impl Default for GetParams {
    fn default() -> Self {
        Self {
            max_urls: default_max_urls(),
            max_queues: default_max_queues(),
            delay_requestable: default_delay_requestable(),
            crawl_id: None,
            key: None,
        }
    }
}

/// Stats for one queue, as reported by the control surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatsRow {
    pub crawl_id: String,
    pub key: String,
    pub status: String,
    pub active_count: u64,
    pub in_flight: u64,
    pub completed_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_produced_at: Option<i64>,
}

/// Aggregate stats across queues
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub queues: u64,
    pub active: u64,
    pub in_flight: u64,
    pub completed: u64,
    pub healthy: bool,
}

/// The frontier engine
pub struct Engine {
    store: Arc<dyn QueueStore>,
    directory: Directory,
    known_stripes: Vec<Mutex<()>>,
    config: FrontierConfig,
    read_only: AtomicBool,
}

impl Engine {
    /// Builds an engine over the given store, rebuilding the queue
    /// directory from persisted state
    pub async fn new(store: Arc<dyn QueueStore>, config: FrontierConfig) -> Result<Self> {
        let directory = Directory::new(&config);

        let queues = store.iterate_queues(None)?;
        for (crawl_id, key) in queues {
            let counts = store.queue_counts(&crawl_id, &key)?;
            let mut state = QueueState::new();
            state.scheduled_count = counts.scheduled;
            state.in_flight_count = counts.in_flight;
            state.completed_count = counts.completed;
            directory.insert(QueueId::new(crawl_id, key), state).await;
        }

        let rebuilt = directory.len().await;
        if rebuilt > 0 {
            tracing::info!("Rebuilt queue directory: {} queues", rebuilt);
        }

        Ok(Self {
            store,
            directory,
            known_stripes: (0..KNOWN_STRIPES).map(|_| Mutex::new(())).collect(),
            config,
            read_only: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &FrontierConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    pub(crate) fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Current wall-clock time in epoch milliseconds
    pub fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    // ===== Health =====

    /// True once a fatal storage error has been observed
    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Relaxed)
    }

    pub(crate) fn note_store_error(&self, error: &StoreError) {
        if error.is_fatal() {
            if !self.read_only.swap(true, Ordering::Relaxed) {
                tracing::error!(
                    "Fatal storage error, engine entering read-only mode: {}",
                    error
                );
            }
        } else {
            tracing::warn!("Transient storage error: {}", error);
        }
    }

    pub(crate) fn known_stripe(&self, crawl_id: &str, url: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        crawl_id.hash(&mut hasher);
        url.hash(&mut hasher);
        &self.known_stripes[hasher.finish() as usize % KNOWN_STRIPES]
    }

    // ===== Control Surface =====

    /// Lists all crawl ids known to the directory
    pub async fn list_crawls(&self) -> Vec<String> {
        self.directory.crawl_ids().await
    }

    /// Streams per-queue stats for one crawl
    ///
    /// By default only queues that could contribute to a fetch are listed;
    /// `include_inactive` adds paused, draining, and empty queues.
    pub async fn list_queues(
        &self,
        crawl_id: &str,
        include_inactive: bool,
        now: i64,
    ) -> Vec<QueueStatsRow> {
        let mut rows = Vec::new();
        for (id, queue) in self.directory.queues_of_crawl(crawl_id).await {
            let mut state = queue.state.lock().await;
            state.maybe_resume(now);
            let active = state.status == QueueStatus::Active && state.active_count() > 0;
            if !include_inactive && !active {
                continue;
            }
            rows.push(QueueStatsRow {
                crawl_id: id.crawl_id,
                key: id.key,
                status: state.status.to_db_string().to_string(),
                active_count: state.active_count(),
                in_flight: state.in_flight_count,
                completed_count: state.completed_count,
                last_produced_at: state.last_produced_at,
            });
        }
        rows
    }

    /// Aggregate stats, optionally restricted to one crawl
    pub async fn get_stats(&self, crawl_id: Option<&str>) -> Stats {
        let queues = match crawl_id {
            Some(crawl) => self.directory.queues_of_crawl(crawl).await,
            None => self.directory.snapshot().await,
        };

        let mut stats = Stats {
            healthy: !self.is_read_only(),
            ..Stats::default()
        };
        for (_, queue) in queues {
            let state = queue.state.lock().await;
            stats.queues += 1;
            stats.active += state.active_count();
            stats.in_flight += state.in_flight_count;
            stats.completed += state.completed_count;
        }
        stats
    }

    /// Blocks a queue until the given time (epoch milliseconds)
    ///
    /// A time in the past lifts an existing block.
    pub async fn block_queue_until(
        &self,
        crawl_id: &str,
        key: &str,
        until: i64,
        now: i64,
    ) -> Result<()> {
        let id = QueueId::new(crawl_id, key);
        let queue = self
            .directory
            .get(&id)
            .await
            .ok_or_else(|| FrontierError::UnknownQueue {
                crawl_id: crawl_id.to_string(),
                key: key.to_string(),
            })?;

        let mut state = queue.state.lock().await;
        if until > now {
            state.status = QueueStatus::Paused;
            state.blocked_until = Some(until);
        } else if state.status == QueueStatus::Paused {
            state.status = QueueStatus::Active;
            state.blocked_until = None;
        }
        Ok(())
    }

    /// Puts a queue into draining: no new URLs, remaining entries served
    ///
    /// An already-empty queue is deleted immediately.
    pub async fn drain_queue(&self, crawl_id: &str, key: &str) -> Result<()> {
        let id = QueueId::new(crawl_id, key);
        let queue = self
            .directory
            .get(&id)
            .await
            .ok_or_else(|| FrontierError::UnknownQueue {
                crawl_id: crawl_id.to_string(),
                key: key.to_string(),
            })?;

        let empty = {
            let mut state = queue.state.lock().await;
            state.status = QueueStatus::Draining;
            state.active_count() == 0
        };

        if empty {
            self.delete_queue(crawl_id, key).await?;
        }
        Ok(())
    }

    /// Overrides the per-crawl politeness delay and queue size cap
    pub async fn set_crawl_limits(
        &self,
        crawl_id: &str,
        min_delay_seconds: u64,
        max_queue_size: Option<u64>,
    ) {
        self.directory
            .set_limits(
                crawl_id,
                CrawlLimits {
                    min_delay_ms: (min_delay_seconds * 1_000) as i64,
                    max_queue_size,
                },
            )
            .await;
    }

    /// Deletes one queue; returns the number of entries removed
    pub async fn delete_queue(&self, crawl_id: &str, key: &str) -> Result<u64> {
        let removed = self.store.delete_queue(crawl_id, key).map_err(|e| {
            self.note_store_error(&e);
            FrontierError::Store(e)
        })?;
        self.directory.remove(&QueueId::new(crawl_id, key)).await;
        tracing::info!("Deleted queue {}/{} ({} entries)", crawl_id, key, removed);
        Ok(removed)
    }

    /// Deletes a crawl: all its queues and its known-set
    pub async fn delete_crawl(&self, crawl_id: &str) -> Result<u64> {
        let removed = self.store.delete_crawl(crawl_id).map_err(|e| {
            self.note_store_error(&e);
            FrontierError::Store(e)
        })?;
        self.directory.remove_crawl(crawl_id).await;
        tracing::info!("Deleted crawl {} ({} entries)", crawl_id, removed);
        Ok(removed)
    }

    /// Marks a URL completed: removes it from its queue for good
    ///
    /// This is the out-of-band completion path crawlers call after a
    /// successful fetch. Returns false if the URL was not scheduled.
    pub async fn mark_completed(&self, crawl_id: &str, url: &str) -> Result<bool> {
        let key = match self.store.known_key(crawl_id, url).map_err(|e| {
            self.note_store_error(&e);
            FrontierError::Store(e)
        })? {
            Some(key) => key,
            None => return Ok(false),
        };

        let removed = self
            .store
            .mark_completed(crawl_id, &key, url)
            .map_err(|e| {
                self.note_store_error(&e);
                FrontierError::Store(e)
            })?;

        let was_in_flight = match removed {
            Some(flag) => flag,
            None => return Ok(false),
        };

        let id = QueueId::new(crawl_id, &key);
        if let Some(queue) = self.directory.get(&id).await {
            let drained = {
                let mut state = queue.state.lock().await;
                if was_in_flight {
                    state.in_flight_count = state.in_flight_count.saturating_sub(1);
                } else {
                    state.scheduled_count = state.scheduled_count.saturating_sub(1);
                }
                state.completed_count += 1;
                state.status == QueueStatus::Draining && state.active_count() == 0
            };
            if drained {
                self.delete_queue(crawl_id, &key).await?;
            }
        }

        Ok(true)
    }

    /// Flushes the store to its durable medium
    pub async fn checkpoint(&self) -> Result<()> {
        if self.is_read_only() {
            return Err(FrontierError::ReadOnly);
        }
        self.store.checkpoint().map_err(|e| {
            self.note_store_error(&e);
            FrontierError::Store(e)
        })
    }
}
