//! Per-connection session handling
//!
//! One connection is one logical stream. A session runs four tasks: the
//! read loop (this function), the ingest pump, the ack forwarder, and the
//! frame writer. Put frames flow through the pump so the admission limit
//! can suspend the read loop; every other op is answered inline.

use crate::engine::{run_ingest, Engine, IngestItem};
use crate::service::wire::{ClientFrame, ServerFrame};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

pub(crate) async fn handle_connection(
    engine: Arc<Engine>,
    socket: TcpStream,
    node: Arc<String>,
) {
    let (read_half, write_half) = socket.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let (out_tx, out_rx) = mpsc::channel::<ServerFrame>(64);
    let writer = tokio::spawn(write_frames(write_half, out_rx));

    let outstanding = engine.config().ingest_outstanding_limit as usize;
    let (item_tx, item_rx) = mpsc::channel::<IngestItem>(64);
    let (ack_tx, mut ack_rx) = mpsc::channel(64);
    let pump = tokio::spawn(run_ingest(engine.clone(), item_rx, ack_tx, outstanding));

    let ack_out = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(ack) = ack_rx.recv().await {
            if ack_out.send(ServerFrame::Ack(ack)).await.is_err() {
                break;
            }
        }
    });

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<ClientFrame>(line) {
                    Ok(ClientFrame::Put { item }) => {
                        let ingest = IngestItem {
                            id: item.id,
                            item: item.item,
                        };
                        if item_tx.send(ingest).await.is_err() {
                            break;
                        }
                    }
                    Ok(frame) => dispatch(&engine, frame, &out_tx, &node).await,
                    Err(e) => {
                        // A malformed frame answers with an error; it never
                        // closes the stream.
                        let sent = out_tx
                            .send(ServerFrame::Error {
                                message: format!("malformed frame: {}", e),
                            })
                            .await;
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("Stream read ended: {}", e);
                break;
            }
        }
    }

    // Half-close: the pump drains outstanding writes, the ack stream
    // closes, and the writer flushes the remaining acks before the
    // connection goes away.
    drop(item_tx);
    drop(out_tx);
    let _ = pump.await;
    let _ = forwarder.await;
    let _ = writer.await;
}

async fn dispatch(engine: &Engine, frame: ClientFrame, out: &mpsc::Sender<ServerFrame>, node: &str) {
    match frame {
        // Handled by the session read loop.
        ClientFrame::Put { item } => {
            tracing::debug!("Put frame outside ingest path for {}", item.item.info().url);
        }

        ClientFrame::GetUrls { params } => {
            let urls = engine.get_urls(&params, Engine::now_ms()).await;
            let count = urls.len() as u64;
            for url in urls {
                if out.send(ServerFrame::Url(url)).await.is_err() {
                    return;
                }
            }
            let _ = out.send(ServerFrame::End { count }).await;
        }

        ClientFrame::ListCrawls => {
            let crawls = engine.list_crawls().await;
            let _ = out.send(ServerFrame::Crawls { crawls }).await;
        }

        ClientFrame::ListQueues {
            crawl_id,
            include_inactive,
        } => {
            let rows = engine
                .list_queues(&crawl_id, include_inactive, Engine::now_ms())
                .await;
            let count = rows.len() as u64;
            for row in rows {
                if out.send(ServerFrame::Queue(row)).await.is_err() {
                    return;
                }
            }
            let _ = out.send(ServerFrame::End { count }).await;
        }

        ClientFrame::GetStats { crawl_id } => {
            let stats = engine.get_stats(crawl_id.as_deref()).await;
            let _ = out.send(ServerFrame::Stats(stats)).await;
        }

        ClientFrame::BlockQueueUntil {
            crawl_id,
            key,
            until,
        } => {
            let result = engine
                .block_queue_until(
                    &crawl_id,
                    &key,
                    until.saturating_mul(1_000),
                    Engine::now_ms(),
                )
                .await;
            let _ = out.send(result_frame(result.map(|_| ServerFrame::Done))).await;
        }

        ClientFrame::DrainQueue { crawl_id, key } => {
            let result = engine.drain_queue(&crawl_id, &key).await;
            let _ = out.send(result_frame(result.map(|_| ServerFrame::Done))).await;
        }

        ClientFrame::SetCrawlLimits {
            crawl_id,
            min_delay_seconds,
            max_queue_size,
        } => {
            engine
                .set_crawl_limits(&crawl_id, min_delay_seconds, max_queue_size)
                .await;
            let _ = out.send(ServerFrame::Done).await;
        }

        ClientFrame::DeleteQueue { crawl_id, key } => {
            let result = engine.delete_queue(&crawl_id, &key).await;
            let _ = out
                .send(result_frame(result.map(|count| ServerFrame::Removed { count })))
                .await;
        }

        ClientFrame::DeleteCrawl { crawl_id } => {
            let result = engine.delete_crawl(&crawl_id).await;
            let _ = out
                .send(result_frame(result.map(|count| ServerFrame::Removed { count })))
                .await;
        }

        ClientFrame::Complete { crawl_id, url } => {
            let result = engine.mark_completed(&crawl_id, &url).await;
            let _ = out
                .send(result_frame(
                    result.map(|removed| ServerFrame::Removed {
                        count: removed as u64,
                    }),
                ))
                .await;
        }

        ClientFrame::Checkpoint => {
            let result = engine.checkpoint().await;
            let _ = out.send(result_frame(result.map(|_| ServerFrame::Done))).await;
        }

        ClientFrame::ListNodes => {
            let _ = out
                .send(ServerFrame::Nodes {
                    nodes: vec![node.to_string()],
                })
                .await;
        }
    }
}

fn result_frame(result: crate::Result<ServerFrame>) -> ServerFrame {
    match result {
        Ok(frame) => frame,
        Err(e) => ServerFrame::Error {
            message: e.to_string(),
        },
    }
}

async fn write_frames(mut writer: OwnedWriteHalf, rx: mpsc::Receiver<ServerFrame>) {
    let mut frames = ReceiverStream::new(rx);
    while let Some(frame) = frames.next().await {
        let mut line = match serde_json::to_string(&frame) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Dropping unencodable frame: {}", e);
                continue;
            }
        };
        line.push('\n');
        if writer.write_all(line.as_bytes()).await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}
