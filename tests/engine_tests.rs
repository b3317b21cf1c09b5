//! Engine-level integration tests
//!
//! These drive the engine directly over the in-memory store with explicit
//! clock values, so politeness windows and in-flight lapses are tested
//! without real sleeping. Restart recovery uses the sqlite backend in a
//! temporary directory.

use kumo_frontier::config::FrontierConfig;
use kumo_frontier::engine::{
    run_ingest, AckStatus, Engine, GetParams, IngestItem, UrlInfo, UrlItem,
};
use kumo_frontier::storage::{Metadata, MemoryStore, QueueStore, SqliteStore};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;

async fn engine() -> Arc<Engine> {
    engine_with_store(Arc::new(MemoryStore::new())).await
}

async fn engine_with_store(store: Arc<dyn QueueStore>) -> Arc<Engine> {
    Arc::new(
        Engine::new(store, FrontierConfig::default())
            .await
            .unwrap(),
    )
}

fn discovered(crawl: &str, url: &str) -> IngestItem {
    IngestItem::new(UrlItem::Discovered {
        info: UrlInfo {
            url: url.to_string(),
            crawl_id: crawl.to_string(),
            key: None,
            metadata: Metadata::new(),
        },
    })
}

fn known(crawl: &str, url: &str, refetchable_from: i64) -> IngestItem {
    IngestItem::new(UrlItem::Known {
        info: UrlInfo {
            url: url.to_string(),
            crawl_id: crawl.to_string(),
            key: None,
            metadata: Metadata::new(),
        },
        refetchable_from,
    })
}

fn params(max_urls: u32, max_queues: u32) -> GetParams {
    GetParams {
        max_urls,
        max_queues,
        ..GetParams::default()
    }
}

// ===== Scenarios =====

#[tokio::test]
async fn scenario_dedup() {
    let engine = engine().await;

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let ack = engine
            .ingest(discovered("default", "http://a.com/x"), 1_000)
            .await;
        statuses.push(ack.status);
    }
    assert_eq!(
        statuses,
        vec![AckStatus::Ok, AckStatus::Skipped, AckStatus::Skipped]
    );

    let urls = engine.get_urls(&params(10, 10), 1_000).await;
    assert_eq!(urls.len(), 1);
    assert_eq!(urls[0].url, "http://a.com/x");
}

#[tokio::test]
async fn scenario_politeness() {
    let engine = engine().await;
    for i in 0..5 {
        let ack = engine
            .ingest(discovered("default", &format!("http://b.com/{}", i)), 1_000)
            .await;
        assert_eq!(ack.status, AckStatus::Ok);
    }

    // min_delay defaults to 1s; two calls 0.3s apart.
    let first = engine.get_urls(&params(5, 1), 10_000).await;
    assert_eq!(first.len(), 1);

    let second = engine.get_urls(&params(5, 1), 10_300).await;
    assert_eq!(second.len(), 0);
}

#[tokio::test]
async fn scenario_fairness() {
    let engine = engine().await;
    for host in ["a.com", "b.com", "c.com", "d.com", "e.com"] {
        for i in 0..2 {
            let ack = engine
                .ingest(
                    discovered("default", &format!("http://{}/{}", host, i)),
                    1_000,
                )
                .await;
            assert_eq!(ack.status, AckStatus::Ok);
        }
    }

    // First call: five distinct hosts, one URL each.
    let first = engine.get_urls(&params(5, 5), 10_000).await;
    assert_eq!(first.len(), 5);
    let hosts: BTreeSet<String> = first.iter().filter_map(|u| u.key.clone()).collect();
    assert_eq!(hosts.len(), 5);

    // Back-to-back: every queue is inside its politeness window.
    let second = engine.get_urls(&params(5, 5), 10_000).await;
    assert!(second.is_empty());

    // After the windows lapse the remaining URLs come out.
    let third = engine.get_urls(&params(5, 5), 11_000).await;
    assert_eq!(third.len(), 5);
}

#[tokio::test]
async fn scenario_reservice_after_unacked_window() {
    let engine = engine().await;
    let ack = engine
        .ingest(discovered("default", "http://c.com/y"), 1_000)
        .await;
    assert_eq!(ack.status, AckStatus::Ok);

    let mut p = params(10, 10);
    p.delay_requestable = 30;
    let urls = engine.get_urls(&p, 1_000).await;
    assert_eq!(urls.len(), 1);

    // Never acked; 31 seconds later it is served again.
    let urls = engine.get_urls(&p, 32_000).await;
    assert_eq!(urls.len(), 1);
    assert_eq!(urls[0].url, "http://c.com/y");
}

#[tokio::test]
async fn scenario_known_replay() {
    let engine = engine().await;

    // refetchable_from is epoch seconds; now is epoch milliseconds.
    let ack = engine.ingest(known("default", "http://d.com/z", 3_600), 0).await;
    assert_eq!(ack.status, AckStatus::Ok);

    assert!(engine.get_urls(&params(10, 10), 0).await.is_empty());

    let urls = engine.get_urls(&params(10, 10), 3_601_000).await;
    assert_eq!(urls.len(), 1);
    assert_eq!(urls[0].url, "http://d.com/z");
}

#[tokio::test]
async fn scenario_crawl_isolation() {
    let engine = engine().await;

    let a = engine.ingest(discovered("A", "http://e.com/"), 1_000).await;
    let b = engine.ingest(discovered("B", "http://e.com/"), 1_000).await;
    assert_eq!(a.status, AckStatus::Ok);
    assert_eq!(b.status, AckStatus::Ok);

    let removed = engine.delete_crawl("A").await.unwrap();
    assert_eq!(removed, 1);

    assert_eq!(engine.list_crawls().await, vec!["B"]);
    let urls = engine.get_urls(&params(10, 10), 2_000).await;
    assert_eq!(urls.len(), 1);
    assert_eq!(urls[0].crawl_id, "B");
}

// ===== Properties =====

#[tokio::test]
async fn property_exclusivity_one_queue_per_url() {
    let engine = engine().await;

    // First ingest fixes the queue; a replay with a divergent explicit key
    // must not create a second copy.
    engine
        .ingest(discovered("c", "http://example.com/x"), 1_000)
        .await;
    let replay = IngestItem::new(UrlItem::Known {
        info: UrlInfo {
            url: "http://example.com/x".to_string(),
            crawl_id: "c".to_string(),
            key: Some("elsewhere".to_string()),
            metadata: Metadata::new(),
        },
        refetchable_from: 1,
    });
    assert_eq!(engine.ingest(replay, 1_000).await.status, AckStatus::Ok);

    let mut from_original = params(10, 10);
    from_original.key = Some("example.com".to_string());
    let mut from_elsewhere = params(10, 10);
    from_elsewhere.key = Some("elsewhere".to_string());

    assert_eq!(engine.get_urls(&from_original, 10_000).await.len(), 1);
    assert!(engine.get_urls(&from_elsewhere, 10_000).await.is_empty());
}

#[tokio::test]
async fn property_dedup_exactly_one_ok() {
    let engine = engine().await;

    let mut ok = 0;
    let mut skipped = 0;
    for i in 0..20 {
        let ack = engine
            .ingest(discovered("c", "http://a.com/same"), 1_000 + i)
            .await;
        match ack.status {
            AckStatus::Ok => ok += 1,
            AckStatus::Skipped => skipped += 1,
            AckStatus::Fail => panic!("unexpected FAIL"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(skipped, 19);
}

#[tokio::test]
async fn property_roundtrip_drain() {
    let engine = engine().await;
    engine.set_crawl_limits("c", 0, None).await;

    let mut ingested = BTreeSet::new();
    for host in ["a.com", "b.com", "c.com"] {
        for i in 0..4 {
            let url = format!("http://{}/{}", host, i);
            let ack = engine.ingest(discovered("c", &url), 1_000).await;
            assert_eq!(ack.status, AckStatus::Ok);
            ingested.insert(url);
        }
    }

    // delay_requestable keeps served URLs in-flight, so repeated fetches at
    // one instant drain without repeats.
    let mut fetched = Vec::new();
    loop {
        let urls = engine.get_urls(&params(100, 100), 2_000).await;
        if urls.is_empty() {
            break;
        }
        fetched.extend(urls.into_iter().map(|u| u.url));
    }

    assert_eq!(fetched.len(), ingested.len(), "no URL served twice");
    let fetched: BTreeSet<String> = fetched.into_iter().collect();
    assert_eq!(fetched, ingested);
}

#[tokio::test]
async fn property_ack_correspondence() {
    let engine = engine().await;
    let (item_tx, item_rx) = mpsc::channel(8);
    let (ack_tx, mut ack_rx) = mpsc::channel(8);
    let pump = tokio::spawn(run_ingest(engine, item_rx, ack_tx, 100));

    // Valid, duplicate, and invalid items all ack.
    let items = vec![
        discovered("c", "http://a.com/1"),
        discovered("c", "http://a.com/1"),
        discovered("", "http://a.com/2"),
        discovered("c", "not a url"),
        known("c", "http://a.com/3", 60),
    ];
    let sent = items.len();
    for item in items {
        item_tx.send(item).await.unwrap();
    }
    drop(item_tx);

    let mut acks = Vec::new();
    while let Some(ack) = ack_rx.recv().await {
        acks.push(ack);
    }
    pump.await.unwrap();

    assert_eq!(acks.len(), sent);
    assert_eq!(
        acks.iter().filter(|a| a.status == AckStatus::Fail).count(),
        2
    );
}

#[tokio::test]
async fn property_restart_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("frontier.db");

    {
        let store = Arc::new(SqliteStore::new(&db_path).unwrap());
        let engine = engine_with_store(store).await;

        for host in ["a.com", "b.com"] {
            for i in 0..3 {
                let ack = engine
                    .ingest(discovered("c", &format!("http://{}/{}", host, i)), 1_000)
                    .await;
                assert_eq!(ack.status, AckStatus::Ok);
            }
        }
        engine.mark_completed("c", "http://a.com/0").await.unwrap();
        engine.checkpoint().await.unwrap();
    }

    // Fresh process: rebuild the directory from the store.
    let store = Arc::new(SqliteStore::new(&db_path).unwrap());
    let engine = engine_with_store(store).await;

    let queues = engine.list_queues("c", true, 2_000).await;
    assert_eq!(queues.len(), 2);

    let a = queues.iter().find(|q| q.key == "a.com").unwrap();
    assert_eq!(a.active_count, 2);
    assert_eq!(a.completed_count, 1);

    let b = queues.iter().find(|q| q.key == "b.com").unwrap();
    assert_eq!(b.active_count, 3);
    assert_eq!(b.completed_count, 0);
}

// ===== Control Surface =====

#[tokio::test]
async fn test_mark_completed_removes_for_good() {
    let engine = engine().await;
    engine
        .ingest(discovered("c", "http://e.com/done"), 1_000)
        .await;

    let urls = engine.get_urls(&params(10, 10), 1_000).await;
    assert_eq!(urls.len(), 1);

    assert!(engine.mark_completed("c", "http://e.com/done").await.unwrap());

    // Far beyond any window: nothing left to serve.
    assert!(engine.get_urls(&params(10, 10), 1_000_000).await.is_empty());

    // Completing twice is a no-op.
    assert!(!engine.mark_completed("c", "http://e.com/done").await.unwrap());

    // Still deduplicated afterwards.
    let ack = engine
        .ingest(discovered("c", "http://e.com/done"), 2_000)
        .await;
    assert_eq!(ack.status, AckStatus::Skipped);
}

#[tokio::test]
async fn test_get_stats_aggregates() {
    let engine = engine().await;
    for host in ["a.com", "b.com"] {
        for i in 0..2 {
            engine
                .ingest(discovered("c", &format!("http://{}/{}", host, i)), 1_000)
                .await;
        }
    }
    engine.get_urls(&params(1, 1), 1_000).await;

    let stats = engine.get_stats(Some("c")).await;
    assert_eq!(stats.queues, 2);
    assert_eq!(stats.active, 4);
    assert_eq!(stats.in_flight, 1);
    assert_eq!(stats.completed, 0);
    assert!(stats.healthy);

    let all = engine.get_stats(None).await;
    assert_eq!(all.queues, 2);
}

#[tokio::test]
async fn test_list_queues_filters_inactive() {
    let engine = engine().await;
    engine.ingest(discovered("c", "http://a.com/x"), 1_000).await;
    engine.ingest(discovered("c", "http://b.com/x"), 1_000).await;
    engine
        .block_queue_until("c", "a.com", 999_000, 1_000)
        .await
        .unwrap();

    let active = engine.list_queues("c", false, 2_000).await;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].key, "b.com");

    let all = engine.list_queues("c", true, 2_000).await;
    assert_eq!(all.len(), 2);
    let paused = all.iter().find(|q| q.key == "a.com").unwrap();
    assert_eq!(paused.status, "paused");
}

#[tokio::test]
async fn test_block_unknown_queue_is_an_error() {
    let engine = engine().await;
    assert!(engine
        .block_queue_until("c", "ghost.com", 10_000, 1_000)
        .await
        .is_err());
}

#[tokio::test]
async fn test_delete_queue_returns_removed_count() {
    let engine = engine().await;
    for i in 0..3 {
        engine
            .ingest(discovered("c", &format!("http://e.com/{}", i)), 1_000)
            .await;
    }
    engine.ingest(discovered("c", "http://other.com/"), 1_000).await;

    assert_eq!(engine.delete_queue("c", "e.com").await.unwrap(), 3);

    // Only the other queue remains.
    let urls = engine.get_urls(&params(10, 10), 2_000).await;
    assert_eq!(urls.len(), 1);
    assert_eq!(urls[0].key.as_deref(), Some("other.com"));
}

#[tokio::test]
async fn test_drain_queue_serves_then_deletes() {
    let engine = engine().await;
    engine.ingest(discovered("c", "http://e.com/x"), 1_000).await;
    engine.drain_queue("c", "e.com").await.unwrap();

    // Draining rejects new URLs...
    let ack = engine.ingest(discovered("c", "http://e.com/y"), 1_000).await;
    assert_eq!(ack.status, AckStatus::Fail);

    // ...but still serves what it holds.
    let urls = engine.get_urls(&params(10, 10), 1_000).await;
    assert_eq!(urls.len(), 1);

    // Completion of the last entry deletes the queue.
    assert!(engine.mark_completed("c", "http://e.com/x").await.unwrap());
    assert!(engine.list_queues("c", true, 2_000).await.is_empty());
}

#[tokio::test]
async fn test_set_crawl_limits_changes_politeness() {
    let engine = engine().await;
    engine.set_crawl_limits("c", 5, None).await;
    for i in 0..2 {
        engine
            .ingest(discovered("c", &format!("http://e.com/{}", i)), 1_000)
            .await;
    }

    assert_eq!(engine.get_urls(&params(1, 1), 10_000).await.len(), 1);
    // 1s later: still blocked under the 5s delay.
    assert!(engine.get_urls(&params(1, 1), 11_000).await.is_empty());
    // 5s later: eligible again.
    assert_eq!(engine.get_urls(&params(1, 1), 15_000).await.len(), 1);
}
