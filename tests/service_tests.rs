//! Service-level integration tests
//!
//! Each test runs a real server on an ephemeral port and talks to it over
//! the JSON-lines transport, exercising framing, ack correlation, response
//! streams, and the control surface end to end.

use kumo_frontier::config::{FrontierConfig, ServerConfig};
use kumo_frontier::engine::{AckStatus, Engine, GetParams, UrlInfo, UrlItem};
use kumo_frontier::service::{
    parse_line, stream_items, ClientFrame, FrontierClient, Server, ServerFrame, WireItem,
};
use kumo_frontier::storage::{Metadata, MemoryStore};
use std::sync::Arc;

async fn start_server(max_streams: u32) -> String {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(
        Engine::new(store, FrontierConfig::default())
            .await
            .unwrap(),
    );

    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        max_concurrent_streams: max_streams,
    };
    let server = Server::bind(engine, &config).await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    tokio::spawn(server.run());
    addr
}

fn put_frame(id: Option<&str>, crawl: &str, url: &str) -> ClientFrame {
    ClientFrame::Put {
        item: WireItem {
            id: id.map(|s| s.to_string()),
            item: UrlItem::Discovered {
                info: UrlInfo {
                    url: url.to_string(),
                    crawl_id: crawl.to_string(),
                    key: None,
                    metadata: Metadata::new(),
                },
            },
        },
    }
}

#[tokio::test]
async fn test_put_ack_correlation() {
    let addr = start_server(16).await;
    let mut client = FrontierClient::connect(&addr).await.unwrap();

    client
        .send(&put_frame(Some("token-42"), "c", "http://example.com/a"))
        .await
        .unwrap();

    match client.recv().await.unwrap() {
        Some(ServerFrame::Ack(ack)) => {
            assert_eq!(ack.id, "token-42");
            assert_eq!(ack.status, AckStatus::Ok);
        }
        other => panic!("expected ack, got {:?}", other),
    }
}

#[tokio::test]
async fn test_synthesized_ack_id() {
    let addr = start_server(16).await;
    let mut client = FrontierClient::connect(&addr).await.unwrap();

    client
        .send(&put_frame(None, "c", "http://example.com/a"))
        .await
        .unwrap();

    match client.recv().await.unwrap() {
        Some(ServerFrame::Ack(ack)) => assert_eq!(ack.id, "c_http://example.com/a"),
        other => panic!("expected ack, got {:?}", other),
    }
}

#[tokio::test]
async fn test_get_urls_stream_ends_with_count() {
    let addr = start_server(16).await;
    let mut client = FrontierClient::connect(&addr).await.unwrap();

    client
        .send(&put_frame(None, "c", "http://example.com/a"))
        .await
        .unwrap();
    assert!(matches!(
        client.recv().await.unwrap(),
        Some(ServerFrame::Ack(_))
    ));

    client
        .send(&ClientFrame::GetUrls {
            params: GetParams {
                max_urls: 10,
                max_queues: 10,
                ..GetParams::default()
            },
        })
        .await
        .unwrap();

    match client.recv().await.unwrap() {
        Some(ServerFrame::Url(url)) => assert_eq!(url.url, "http://example.com/a"),
        other => panic!("expected url, got {:?}", other),
    }
    match client.recv().await.unwrap() {
        Some(ServerFrame::End { count }) => assert_eq!(count, 1),
        other => panic!("expected end, got {:?}", other),
    }

    // Nothing left and the queue is polite: an empty stream is just `end`.
    let urls = client
        .get_urls(GetParams {
            max_urls: 10,
            max_queues: 10,
            ..GetParams::default()
        })
        .await
        .unwrap();
    assert!(urls.is_empty());
}

#[tokio::test]
async fn test_text_line_ingestion() {
    let addr = start_server(16).await;

    let lines = [
        "http://example.com/plain",
        "",
        r#"{"kind":"discovered","info":{"url":"http://example.com/json","crawl_id":"other"}}"#,
        "http://example.com/plain",
    ];

    let mut items = Vec::new();
    for line in lines {
        if let Some(parsed) = parse_line(line, "default") {
            items.push(parsed.unwrap());
        }
    }
    assert_eq!(items.len(), 3, "blank line dropped");

    let summary = stream_items(&addr, items).await.unwrap();
    assert_eq!(summary.ok, 2);
    assert_eq!(summary.skipped, 1, "duplicate plain line deduplicated");
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn test_pipelined_puts_ack_every_item() {
    let addr = start_server(16).await;

    let mut items = Vec::new();
    for i in 0..50 {
        if let Some(parsed) = parse_line(&format!("http://host{}.com/page", i % 10), "c") {
            items.push(parsed.unwrap());
        }
    }

    let summary = stream_items(&addr, items).await.unwrap();
    assert_eq!(summary.total(), 50);
    assert_eq!(summary.ok, 10);
    assert_eq!(summary.skipped, 40);
}

#[tokio::test]
async fn test_malformed_frame_does_not_close_stream() {
    let addr = start_server(16).await;
    let mut client = FrontierClient::connect(&addr).await.unwrap();

    client
        .send(&ClientFrame::GetStats { crawl_id: None })
        .await
        .unwrap();
    assert!(matches!(
        client.recv().await.unwrap(),
        Some(ServerFrame::Stats(_))
    ));

    // A raw connection sends an unknown op followed by a valid one; the
    // server answers the first with an error frame and keeps going.
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    let mut raw = tokio::net::TcpStream::connect(&addr).await.unwrap();
    raw.write_all(b"{\"op\":\"warp-drive\"}\n").await.unwrap();
    raw.write_all(b"{\"op\":\"list-crawls\"}\n").await.unwrap();

    let mut lines = BufReader::new(raw).lines();

    let first = lines.next_line().await.unwrap().unwrap();
    let first: ServerFrame = serde_json::from_str(&first).unwrap();
    assert!(matches!(first, ServerFrame::Error { .. }));

    let second = lines.next_line().await.unwrap().unwrap();
    let second: ServerFrame = serde_json::from_str(&second).unwrap();
    assert!(matches!(second, ServerFrame::Crawls { .. }));
}

#[tokio::test]
async fn test_control_surface_over_the_wire() {
    let addr = start_server(16).await;
    let mut client = FrontierClient::connect(&addr).await.unwrap();

    client
        .send(&ClientFrame::SetCrawlLimits {
            crawl_id: "c".to_string(),
            min_delay_seconds: 0,
            max_queue_size: None,
        })
        .await
        .unwrap();
    assert!(matches!(
        client.recv().await.unwrap(),
        Some(ServerFrame::Done)
    ));

    for i in 0..3 {
        client
            .send(&put_frame(None, "c", &format!("http://e.com/{}", i)))
            .await
            .unwrap();
    }
    for _ in 0..3 {
        assert!(matches!(
            client.recv().await.unwrap(),
            Some(ServerFrame::Ack(_))
        ));
    }

    client
        .send(&ClientFrame::ListCrawls)
        .await
        .unwrap();
    match client.recv().await.unwrap() {
        Some(ServerFrame::Crawls { crawls }) => assert_eq!(crawls, vec!["c"]),
        other => panic!("expected crawls, got {:?}", other),
    }

    client
        .send(&ClientFrame::ListQueues {
            crawl_id: "c".to_string(),
            include_inactive: true,
        })
        .await
        .unwrap();
    match client.recv().await.unwrap() {
        Some(ServerFrame::Queue(row)) => {
            assert_eq!(row.key, "e.com");
            assert_eq!(row.active_count, 3);
        }
        other => panic!("expected queue, got {:?}", other),
    }
    assert!(matches!(
        client.recv().await.unwrap(),
        Some(ServerFrame::End { count: 1 })
    ));

    client
        .send(&ClientFrame::Complete {
            crawl_id: "c".to_string(),
            url: "http://e.com/0".to_string(),
        })
        .await
        .unwrap();
    assert!(matches!(
        client.recv().await.unwrap(),
        Some(ServerFrame::Removed { count: 1 })
    ));

    client.send(&ClientFrame::Checkpoint).await.unwrap();
    assert!(matches!(
        client.recv().await.unwrap(),
        Some(ServerFrame::Done)
    ));

    client.send(&ClientFrame::ListNodes).await.unwrap();
    match client.recv().await.unwrap() {
        Some(ServerFrame::Nodes { nodes }) => {
            assert_eq!(nodes.len(), 1);
            assert_eq!(nodes[0], addr);
        }
        other => panic!("expected nodes, got {:?}", other),
    }

    client
        .send(&ClientFrame::DeleteCrawl {
            crawl_id: "c".to_string(),
        })
        .await
        .unwrap();
    match client.recv().await.unwrap() {
        Some(ServerFrame::Removed { count }) => assert_eq!(count, 2),
        other => panic!("expected removed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_block_queue_until_over_the_wire() {
    let addr = start_server(16).await;
    let mut client = FrontierClient::connect(&addr).await.unwrap();

    client
        .send(&put_frame(None, "c", "http://e.com/x"))
        .await
        .unwrap();
    assert!(matches!(
        client.recv().await.unwrap(),
        Some(ServerFrame::Ack(_))
    ));

    // Block far into the future; fetches come back empty.
    client
        .send(&ClientFrame::BlockQueueUntil {
            crawl_id: "c".to_string(),
            key: "e.com".to_string(),
            until: 4_102_444_800, // year 2100
        })
        .await
        .unwrap();
    assert!(matches!(
        client.recv().await.unwrap(),
        Some(ServerFrame::Done)
    ));

    let urls = client
        .get_urls(GetParams {
            max_urls: 10,
            max_queues: 10,
            ..GetParams::default()
        })
        .await
        .unwrap();
    assert!(urls.is_empty());

    // Blocking an unknown queue reports an error frame.
    client
        .send(&ClientFrame::BlockQueueUntil {
            crawl_id: "c".to_string(),
            key: "ghost.com".to_string(),
            until: 4_102_444_800,
        })
        .await
        .unwrap();
    assert!(matches!(
        client.recv().await.unwrap(),
        Some(ServerFrame::Error { .. })
    ));
}

#[tokio::test]
async fn test_stream_capacity_refusal() {
    let addr = start_server(1).await;

    // First stream occupies the only slot.
    let mut first = FrontierClient::connect(&addr).await.unwrap();
    first
        .send(&ClientFrame::GetStats { crawl_id: None })
        .await
        .unwrap();
    assert!(matches!(
        first.recv().await.unwrap(),
        Some(ServerFrame::Stats(_))
    ));

    // Second stream is refused with an error frame.
    let mut second = FrontierClient::connect(&addr).await.unwrap();
    match second.recv().await.unwrap() {
        Some(ServerFrame::Error { message }) => {
            assert!(message.contains("maximum concurrent streams"));
        }
        other => panic!("expected refusal, got {:?}", other),
    }
}
