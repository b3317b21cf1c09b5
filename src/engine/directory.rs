//! In-memory index of active queues
//!
//! The directory maps `(crawl_id, queue_key)` to live scheduling metadata
//! and owns the fairness cursor. Structure: a directory-wide read-write lock
//! around an ordered map, with each queue's state behind its own mutex, so
//! the scheduler can update one queue without touching the others. The
//! ordered map matters: the cursor needs a stable total order to guarantee
//! every eligible queue is visited before any is revisited.

use crate::config::FrontierConfig;
use crate::state::{CrawlLimits, QueueState};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::{Mutex, RwLock};

/// Identity of a queue
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueId {
    pub crawl_id: String,
    pub key: String,
}

impl QueueId {
    pub fn new(crawl_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            crawl_id: crawl_id.into(),
            key: key.into(),
        }
    }
}

impl std::fmt::Display for QueueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.crawl_id, self.key)
    }
}

/// A live queue: scheduling metadata behind its own lock
#[derive(Debug)]
pub struct Queue {
    pub state: Mutex<QueueState>,
}

impl Queue {
    fn new(state: QueueState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }
}

/// The queue directory
#[derive(Debug)]
pub struct Directory {
    queues: RwLock<BTreeMap<QueueId, Arc<Queue>>>,
    /// Last queue the scheduler served from; candidate scans start after it
    cursor: StdMutex<Option<QueueId>>,
    limits: RwLock<HashMap<String, CrawlLimits>>,
    defaults: CrawlLimits,
}

impl Directory {
    pub fn new(config: &FrontierConfig) -> Self {
        Self {
            queues: RwLock::new(BTreeMap::new()),
            cursor: StdMutex::new(None),
            limits: RwLock::new(HashMap::new()),
            defaults: CrawlLimits::from_config(config),
        }
    }

    // ===== Lookup and Mutation =====

    pub async fn get(&self, id: &QueueId) -> Option<Arc<Queue>> {
        self.queues.read().await.get(id).cloned()
    }

    /// Returns the queue, creating it with fresh state if absent
    pub async fn get_or_insert(&self, id: &QueueId) -> Arc<Queue> {
        if let Some(queue) = self.get(id).await {
            return queue;
        }
        let mut queues = self.queues.write().await;
        queues
            .entry(id.clone())
            .or_insert_with(|| Queue::new(QueueState::new()))
            .clone()
    }

    /// Inserts a queue with pre-built state (startup rebuild)
    pub async fn insert(&self, id: QueueId, state: QueueState) {
        self.queues.write().await.insert(id, Queue::new(state));
    }

    /// Removes a queue from the directory
    ///
    /// The cursor is left untouched even when it points at the removed id:
    /// candidate rotation only compares against it, so the scan resumes
    /// from the same position.
    pub async fn remove(&self, id: &QueueId) -> Option<Arc<Queue>> {
        self.queues.write().await.remove(id)
    }

    /// Removes every queue of a crawl, returning their ids
    pub async fn remove_crawl(&self, crawl_id: &str) -> Vec<QueueId> {
        let mut queues = self.queues.write().await;
        let doomed: Vec<QueueId> = queues
            .keys()
            .filter(|id| id.crawl_id == crawl_id)
            .cloned()
            .collect();
        for id in &doomed {
            queues.remove(id);
        }
        drop(queues);

        self.limits.write().await.remove(crawl_id);
        doomed
    }

    pub async fn len(&self) -> usize {
        self.queues.read().await.len()
    }

    // ===== Enumeration =====

    /// Snapshot of all queues, in directory order
    pub async fn snapshot(&self) -> Vec<(QueueId, Arc<Queue>)> {
        self.queues
            .read()
            .await
            .iter()
            .map(|(id, q)| (id.clone(), q.clone()))
            .collect()
    }

    /// Queues belonging to one crawl, in directory order
    pub async fn queues_of_crawl(&self, crawl_id: &str) -> Vec<(QueueId, Arc<Queue>)> {
        self.queues
            .read()
            .await
            .iter()
            .filter(|(id, _)| id.crawl_id == crawl_id)
            .map(|(id, q)| (id.clone(), q.clone()))
            .collect()
    }

    /// Distinct crawl ids present in the directory
    pub async fn crawl_ids(&self) -> Vec<String> {
        let queues = self.queues.read().await;
        let mut crawls: Vec<String> = Vec::new();
        for id in queues.keys() {
            if crawls.last().map(|c| c != &id.crawl_id).unwrap_or(true) {
                crawls.push(id.crawl_id.clone());
            }
        }
        crawls
    }

    /// Queues matching the filters, rotated to start just after the cursor
    ///
    /// This is the scheduler's candidate order: directory order, wrapped
    /// around, beginning with the first queue strictly after the last one
    /// served. A queue created after the cursor's position therefore gets
    /// visited in the current round.
    pub async fn candidates_after_cursor(
        &self,
        crawl_id: Option<&str>,
        key: Option<&str>,
    ) -> Vec<(QueueId, Arc<Queue>)> {
        let matching: Vec<(QueueId, Arc<Queue>)> = self
            .queues
            .read()
            .await
            .iter()
            .filter(|(id, _)| {
                crawl_id.map(|c| c == id.crawl_id).unwrap_or(true)
                    && key.map(|k| k == id.key).unwrap_or(true)
            })
            .map(|(id, q)| (id.clone(), q.clone()))
            .collect();

        let cursor = self.cursor();
        let split = match cursor {
            Some(cursor) => matching
                .iter()
                .position(|(id, _)| *id > cursor)
                .unwrap_or(0),
            None => 0,
        };

        let mut rotated = Vec::with_capacity(matching.len());
        rotated.extend_from_slice(&matching[split..]);
        rotated.extend_from_slice(&matching[..split]);
        rotated
    }

    // ===== Fairness Cursor =====

    pub fn cursor(&self) -> Option<QueueId> {
        self.cursor.lock().ok().and_then(|c| c.clone())
    }

    pub fn set_cursor(&self, id: QueueId) {
        if let Ok(mut cursor) = self.cursor.lock() {
            *cursor = Some(id);
        }
    }

    // ===== Per-Crawl Limits =====

    pub async fn limits_for(&self, crawl_id: &str) -> CrawlLimits {
        self.limits
            .read()
            .await
            .get(crawl_id)
            .copied()
            .unwrap_or(self.defaults)
    }

    pub async fn set_limits(&self, crawl_id: &str, limits: CrawlLimits) {
        self.limits
            .write()
            .await
            .insert(crawl_id.to_string(), limits);
    }

    pub fn default_limits(&self) -> CrawlLimits {
        self.defaults
    }
}
