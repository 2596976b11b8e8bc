// Relay server — accepts connections and hands each one to a session

pub mod registry;
mod session;

pub use registry::{Registry, SessionHandle, SessionId};

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::protocol::frame::MAX_FRAME_LEN;
use crate::sink::{DiskSink, FileSink};
use session::Session;

/// Port the relay listens on unless configured otherwise.
pub const DEFAULT_PORT: u16 = 12345;

/// Relay server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to listen on.
    pub bind_addr: SocketAddr,
    /// Largest frame body a client may declare before the connection is cut.
    pub max_frame_len: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

/// The relay: one listener, one shared registry, one session per client.
///
/// All state lives in memory and dies with the process; a restart starts
/// from an empty registry.
pub struct RelayServer {
    listener: TcpListener,
    registry: Arc<Registry>,
    sink: Arc<dyn FileSink>,
    max_frame_len: usize,
}

impl RelayServer {
    /// Bind with the default on-disk sink (the user's desktop).
    pub async fn bind(config: RelayConfig) -> io::Result<Self> {
        Self::bind_with_sink(config, Arc::new(DiskSink::desktop())).await
    }

    /// Bind with a caller-provided sink. Tests substitute recorders or
    /// temp-directory sinks here.
    pub async fn bind_with_sink(
        config: RelayConfig,
        sink: Arc<dyn FileSink>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        Ok(Self {
            listener,
            registry: Arc::new(Registry::new()),
            sink,
            max_frame_len: config.max_frame_len,
        })
    }

    /// Address the listener actually bound. Asking for port 0 resolves to a
    /// real port here.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The registry shared by every session on this relay.
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    /// Accept connections until the task is dropped.
    ///
    /// Every accepted socket gets its own session; a failed accept is logged
    /// and never tears down the relay.
    pub async fn run(self) {
        match self.listener.local_addr() {
            Ok(addr) => info!("relay listening on {}", addr),
            Err(e) => warn!("relay listening on unknown address: {}", e),
        }

        loop {
            match self.listener.accept().await {
                Ok((socket, peer)) => {
                    Session::spawn(
                        socket,
                        peer,
                        Arc::clone(&self.registry),
                        Arc::clone(&self.sink),
                        self.max_frame_len,
                    );
                }
                Err(e) => {
                    warn!("accept failed: {}", e);
                    // Errors like fd exhaustion repeat immediately; breathe
                    // before retrying instead of spinning.
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
