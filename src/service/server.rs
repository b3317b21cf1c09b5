//! TCP listener and stream admission
//!
//! Binding and serving are separate so the caller learns the bound address
//! (and its failure) before the accept loop starts; tests bind port 0.

use crate::engine::Engine;
use crate::service::session::handle_connection;
use crate::service::wire::ServerFrame;
use crate::config::ServerConfig;
use crate::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

/// The frontier RPC server
pub struct Server {
    listener: TcpListener,
    engine: Arc<Engine>,
    max_streams: usize,
    node: Arc<String>,
}

impl Server {
    /// Binds the listener; fails fast on an unusable address
    pub async fn bind(engine: Arc<Engine>, config: &ServerConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local = listener.local_addr()?;
        tracing::info!("Frontier listening on {}", local);

        Ok(Self {
            listener,
            engine,
            max_streams: config.max_concurrent_streams as usize,
            node: Arc::new(local.to_string()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Runs the accept loop until the listener fails
    pub async fn run(self) -> Result<()> {
        let streams = Arc::new(Semaphore::new(self.max_streams.max(1)));

        loop {
            let (socket, peer) = self.listener.accept().await?;

            match streams.clone().try_acquire_owned() {
                Ok(permit) => {
                    tracing::debug!("Accepted stream from {}", peer);
                    let engine = self.engine.clone();
                    let node = self.node.clone();
                    tokio::spawn(async move {
                        handle_connection(engine, socket, node).await;
                        tracing::debug!("Stream from {} closed", peer);
                        drop(permit);
                    });
                }
                Err(_) => {
                    tracing::warn!("Refusing stream from {}: at stream capacity", peer);
                    tokio::spawn(refuse(socket));
                }
            }
        }
    }
}

/// Tells an over-capacity client why it is being dropped
async fn refuse(mut socket: TcpStream) {
    let frame = ServerFrame::Error {
        message: "server at maximum concurrent streams".to_string(),
    };
    if let Ok(mut line) = serde_json::to_string(&frame) {
        line.push('\n');
        let _ = socket.write_all(line.as_bytes()).await;
    }
    let _ = socket.shutdown().await;
}
