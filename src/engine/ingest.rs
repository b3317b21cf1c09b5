//! Ingest pipeline
//!
//! Items arrive on a stream, each becomes a small unit of work against the
//! store, and each produces exactly one ack. Order of acks is not
//! guaranteed; callers correlate by id.

use crate::engine::{Ack, AckStatus, Engine, QueueId, UrlItem};
use crate::storage::PutOutcome;
use crate::url::{queue_key, validate_url};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

/// One item of an ingest stream, with its correlation id
#[derive(Debug, Clone)]
pub struct IngestItem {
    /// Caller-chosen ack correlation token; synthesized when absent
    pub id: Option<String>,
    pub item: UrlItem,
}

impl IngestItem {
    pub fn new(item: UrlItem) -> Self {
        Self { id: None, item }
    }

    pub fn with_id(id: impl Into<String>, item: UrlItem) -> Self {
        Self {
            id: Some(id.into()),
            item,
        }
    }
}

impl Engine {
    /// Applies one ingest item and returns its ack
    ///
    /// `now` is epoch milliseconds; Discovered items are scheduled at `now`,
    /// Known items at their own `refetchable_from`.
    pub async fn ingest(&self, ingest: IngestItem, now: i64) -> Ack {
        let info = ingest.item.info();
        let id = ingest
            .id
            .clone()
            .unwrap_or_else(|| format!("{}_{}", info.crawl_id, info.url));
        let status = self.apply_item(&ingest.item, now).await;
        Ack { id, status }
    }

    async fn apply_item(&self, item: &UrlItem, now: i64) -> AckStatus {
        if self.is_read_only() {
            return AckStatus::Fail;
        }

        let info = item.info();

        // Validation failures ack FAIL; they never tear down the stream.
        if info.crawl_id.is_empty() {
            tracing::debug!("Rejected item with empty crawl id");
            return AckStatus::Fail;
        }
        let parsed = match validate_url(&info.url) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Rejected URL: {}", e);
                return AckStatus::Fail;
            }
        };

        let derived_key = match info.key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => key.to_string(),
            None => match queue_key(&parsed) {
                Some(key) => key,
                None => return AckStatus::Fail,
            },
        };

        let replace = matches!(item, UrlItem::Known { .. });

        // Serialize the known-check and the store write per (crawl, url).
        let _stripe = self.known_stripe(&info.crawl_id, &info.url).lock().await;

        let recorded_key = match self.store().known_key(&info.crawl_id, &info.url) {
            Ok(recorded) => recorded,
            Err(e) => {
                self.note_store_error(&e);
                return AckStatus::Fail;
            }
        };

        if !replace && recorded_key.is_some() {
            return AckStatus::Skipped;
        }

        // A known URL never moves queues: the recorded key wins.
        let key = recorded_key.unwrap_or(derived_key);
        let id = QueueId::new(&info.crawl_id, &key);
        let queue = self.directory().get_or_insert(&id).await;
        let limits = self.directory().limits_for(&info.crawl_id).await;

        {
            let mut state = queue.state.lock().await;
            state.maybe_resume(now);
            if !state.status.accepts_urls() {
                tracing::debug!("Rejected item for {} queue {}", state.status, id);
                return AckStatus::Fail;
            }
            if !replace {
                if let Some(max) = limits.max_queue_size {
                    if state.active_count() >= max {
                        tracing::debug!("Queue {} over capacity ({})", id, max);
                        return AckStatus::Fail;
                    }
                }
            }
        }

        let schedule_at = match item {
            UrlItem::Discovered { .. } => now,
            UrlItem::Known {
                refetchable_from, ..
            } => refetchable_from.saturating_mul(1_000),
        };

        match self.store().put_scheduled(
            &info.crawl_id,
            &key,
            &info.url,
            schedule_at,
            &info.metadata,
            replace,
        ) {
            Ok(result) => {
                if result.created || result.cleared_in_flight {
                    let mut state = queue.state.lock().await;
                    if result.created {
                        state.scheduled_count += 1;
                    }
                    if result.cleared_in_flight {
                        state.in_flight_count = state.in_flight_count.saturating_sub(1);
                        state.scheduled_count += 1;
                    }
                }
                match result.outcome {
                    PutOutcome::Inserted | PutOutcome::Replaced => AckStatus::Ok,
                    PutOutcome::AlreadyKnown => AckStatus::Skipped,
                }
            }
            Err(e) => {
                self.note_store_error(&e);
                AckStatus::Fail
            }
        }
    }
}

/// Pumps one ingest stream through the engine
///
/// Reads items from `items` until the sender closes, dispatching each as its
/// own task. The semaphore is the admission limit: once `outstanding_limit`
/// writes are in flight, reading from the stream suspends until acks drain.
/// When the stream half-closes, remaining writes are drained before the ack
/// sender drops, which closes the ack stream.
pub async fn run_ingest(
    engine: Arc<Engine>,
    mut items: mpsc::Receiver<IngestItem>,
    acks: mpsc::Sender<Ack>,
    outstanding_limit: usize,
) {
    let admission = Arc::new(Semaphore::new(outstanding_limit.max(1)));
    let mut workers = JoinSet::new();

    while let Some(item) = items.recv().await {
        let permit = match admission.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let engine = engine.clone();
        let acks = acks.clone();
        workers.spawn(async move {
            let ack = engine.ingest(item, Engine::now_ms()).await;
            // A closed ack channel means the peer cancelled; committed
            // writes stay committed.
            let _ = acks.send(ack).await;
            drop(permit);
        });

        // Reap finished workers so the set does not grow with the stream.
        while workers.try_join_next().is_some() {}
    }

    while workers.join_next().await.is_some() {}
}
