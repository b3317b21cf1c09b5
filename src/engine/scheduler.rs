//! Fetch scheduler
//!
//! Produces URLs on demand under three constraints: politeness (a queue is
//! not served again before its minimum delay has passed), fairness (queue
//! selection is round-robin from the directory cursor), and the per-request
//! deadline (expiry returns partial results, never an error).

use crate::engine::{Engine, GetParams, UrlInfo};
use std::time::Duration;
use tokio::time::Instant;

impl Engine {
    /// Serves up to `params.max_urls` URLs, drawing from at most
    /// `params.max_queues` queues
    ///
    /// `now` is epoch milliseconds. Every served URL is marked in-flight
    /// until `now + delay_requestable`; unacked URLs re-become eligible
    /// automatically once that window lapses.
    pub async fn get_urls(&self, params: &GetParams, now: i64) -> Vec<UrlInfo> {
        let deadline =
            Instant::now() + Duration::from_millis(self.config().fetch_deadline_ms);
        self.get_urls_until(params, now, deadline).await
    }

    /// Same as [`get_urls`](Self::get_urls) with an explicit deadline
    pub async fn get_urls_until(
        &self,
        params: &GetParams,
        now: i64,
        deadline: Instant,
    ) -> Vec<UrlInfo> {
        if self.is_read_only() {
            return Vec::new();
        }

        let max_urls = params.max_urls.max(1) as usize;
        let max_queues = params.max_queues.max(1) as usize;
        let per_queue_cap = (max_urls + max_queues - 1) / max_queues;
        let in_flight_until = now + (params.delay_requestable as i64).saturating_mul(1_000);

        let candidates = self
            .directory()
            .candidates_after_cursor(params.crawl_id.as_deref(), params.key.as_deref())
            .await;

        let mut urls: Vec<UrlInfo> = Vec::new();
        let mut queues_served = 0usize;
        let mut last_served = None;

        for (id, queue) in candidates {
            if urls.len() >= max_urls || queues_served >= max_queues {
                break;
            }
            if Instant::now() >= deadline {
                tracing::debug!(
                    "Fetch deadline reached after {} urls, {} queues",
                    urls.len(),
                    queues_served
                );
                break;
            }

            let limits = self.directory().limits_for(&id.crawl_id).await;

            // The per-queue lock covers the fetch_due + mark_in_flight +
            // state update sequence, so two concurrent fetches cannot hand
            // out the same entry. The directory lock is not held here.
            let mut state = queue.state.lock().await;
            state.maybe_resume(now);
            if !state.can_serve(now) {
                continue;
            }

            let due = match self
                .store()
                .fetch_due(&id.crawl_id, &id.key, now, per_queue_cap)
            {
                Ok(due) => due,
                Err(e) => {
                    self.note_store_error(&e);
                    continue;
                }
            };
            if due.is_empty() {
                // Counted entries exist but none are due yet.
                continue;
            }

            let mut served_any = false;
            for entry in due {
                if urls.len() >= max_urls {
                    break;
                }
                match self
                    .store()
                    .mark_in_flight(&id.crawl_id, &id.key, &entry.url, in_flight_until)
                {
                    Ok(Some(was_in_flight)) => {
                        if !was_in_flight {
                            state.scheduled_count = state.scheduled_count.saturating_sub(1);
                            state.in_flight_count += 1;
                        }
                        state.record_serve(now, limits.min_delay_ms);
                        urls.push(UrlInfo {
                            url: entry.url,
                            crawl_id: id.crawl_id.clone(),
                            key: Some(id.key.clone()),
                            metadata: entry.metadata,
                        });
                        served_any = true;
                        // Politeness applies inside a response too: with a
                        // non-zero delay the queue is done for this round.
                        if state.next_eligible_at > now {
                            break;
                        }
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        self.note_store_error(&e);
                        break;
                    }
                }
            }
            drop(state);

            if served_any {
                queues_served += 1;
                last_served = Some(id);
            }
        }

        if let Some(id) = last_served {
            self.directory().set_cursor(id);
        }

        urls
    }
}
