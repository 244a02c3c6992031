//! HTTP server: accept loop and lifecycle.
//!
//! # Module Structure
//!
//! - `engine` - [`MockEngine`], registry + scenarios + log + proxy, and the per-request control flow
//! - `handler` - hyper service function bridging hyper requests to the engine

mod engine;
mod handler;

use anyhow::Context;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::ServerSettings;

pub use engine::MockEngine;
pub use handler::handle_request;

/// A running server. Dropping it without [`DecoyServer::stop`] leaves the
/// accept loop running until the runtime shuts down.
pub struct DecoyServer {
    engine: Arc<MockEngine>,
    local_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl DecoyServer {
    /// Validate `settings`, build the engine and start accepting connections.
    /// Port `0` binds an ephemeral port.
    pub async fn start(settings: ServerSettings) -> anyhow::Result<Self> {
        settings.validate()?;
        let (host, port) = (settings.host.clone(), settings.port);
        let engine = MockEngine::new(settings).context("Failed to initialise mock engine")?;

        let listener = TcpListener::bind((host.as_str(), port))
            .await
            .with_context(|| format!("Failed to bind {host}:{port}"))?;
        let local_addr = listener.local_addr()?;
        info!("Decoy listening on {}", local_addr);

        let (shutdown_tx, _) = broadcast::channel(1);
        let mut shutdown_rx = shutdown_tx.subscribe();
        let accept_engine = Arc::clone(&engine);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, addr)) => {
                                let engine = Arc::clone(&accept_engine);
                                tokio::spawn(async move {
                                    let io = TokioIo::new(stream);
                                    let service = service_fn(move |req| {
                                        handle_request(req, Arc::clone(&engine), addr)
                                    });
                                    if let Err(e) = http1::Builder::new()
                                        .serve_connection(io, service)
                                        .await
                                    {
                                        debug!("Connection error from {}: {}", addr, e);
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Accept error on {}: {}", local_addr, e);
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Decoy on {} shutting down", local_addr);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            engine,
            local_addr,
            shutdown_tx,
            task,
        })
    }

    pub fn engine(&self) -> &Arc<MockEngine> {
        &self.engine
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Base URL for clients; a wildcard bind address is reported as loopback.
    pub fn url(&self) -> String {
        let ip = self.local_addr.ip();
        if ip.is_unspecified() {
            format!("http://127.0.0.1:{}", self.port())
        } else {
            format!("http://{}", self.local_addr)
        }
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            error!("Accept loop ended abnormally: {}", e);
        }
    }
}
