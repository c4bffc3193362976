//! WebSocket listener using tokio-tungstenite.
//!
//! Accepts TCP connections at the configured endpoint, performs the
//! WebSocket handshake off the accept loop, and hands upgraded connections
//! to the server. The listener can be told to stop accepting and confirms
//! closure once its accept task has wound down.

use std::net::SocketAddr;
use termbridge_core::{BridgeError, BridgeResult};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A handle to an accepted WebSocket connection.
pub struct WsConnection {
    pub ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
    pub remote_addr: SocketAddr,
}

/// A running listener: yields upgraded connections until closed.
pub struct WsListener {
    local_addr: SocketAddr,
    conn_rx: mpsc::Receiver<WsConnection>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WsListener {
    /// Bind the endpoint and start accepting in a background task.
    pub async fn bind(addr: SocketAddr) -> BridgeResult<Self> {
        let tcp_listener = TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::Transport(format!("bind {addr} failed: {e}")))?;
        let local_addr = tcp_listener
            .local_addr()
            .map_err(|e| BridgeError::Transport(format!("local_addr failed: {e}")))?;

        info!(addr = %local_addr, "listener started");

        let (conn_tx, conn_rx) = mpsc::channel::<WsConnection>(64);
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    accepted = tcp_listener.accept() => match accepted {
                        Ok((stream, addr)) => {
                            let conn_tx = conn_tx.clone();
                            tokio::spawn(async move {
                                match tokio_tungstenite::accept_async(stream).await {
                                    Ok(ws_stream) => {
                                        debug!(remote = %addr, "connection accepted");
                                        let conn = WsConnection {
                                            ws_stream,
                                            remote_addr: addr,
                                        };
                                        if conn_tx.send(conn).await.is_err() {
                                            warn!("connection channel closed");
                                        }
                                    }
                                    Err(e) => {
                                        warn!(remote = %addr, error = %e, "handshake failed");
                                    }
                                }
                            });
                        }
                        Err(e) => {
                            // Accept errors do not halt the listener.
                            error!(error = %e, "accept failed");
                        }
                    },
                }
            }
            info!("listener closed");
        });

        Ok(Self {
            local_addr,
            conn_rx,
            stop_tx,
            task,
        })
    }

    /// The bound address (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Receive the next upgraded connection; `None` once closed.
    pub async fn accept(&mut self) -> Option<WsConnection> {
        self.conn_rx.recv().await
    }

    /// Stop accepting new connections. Connections already handed over are
    /// unaffected.
    pub fn stop_accepting(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Stop accepting and wait until the accept task has fully wound down.
    pub async fn close(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.task.await;
    }
}
