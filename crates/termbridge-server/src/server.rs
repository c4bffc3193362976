//! Core server: accepts connections and runs one session controller per
//! connection until a shutdown request drains everything.

use crate::config::ServerConfig;
use crate::session::controller;
use crate::session::registry::SessionRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::transport::websocket::WsListener;
use std::future::Future;
use std::sync::Arc;
use termbridge_core::BridgeResult;
use tracing::info;

/// The bridge server instance.
pub struct BridgeServer {
    config: Arc<ServerConfig>,
    registry: Arc<SessionRegistry>,
}

impl BridgeServer {
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new(config.max_sessions));
        Self {
            config: Arc::new(config),
            registry,
        }
    }

    /// The session registry, shared with every controller.
    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    /// Bind the configured endpoint and serve until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> BridgeResult<()> {
        let listener = WsListener::bind(self.config.bind_addr()?).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from an already-bound listener until `shutdown`
    /// resolves, then drain every session before returning.
    pub async fn serve(
        self,
        mut listener: WsListener,
        shutdown: impl Future<Output = ()>,
    ) -> BridgeResult<()> {
        info!(
            addr = %listener.local_addr(),
            shell = %self.config.shell,
            max_sessions = self.config.max_sessions,
            "termbridge ready"
        );
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                conn = listener.accept() => match conn {
                    Some(conn) => {
                        let registry = self.registry.clone();
                        let config = self.config.clone();
                        tokio::spawn(controller::run_session(conn, registry, config));
                    }
                    None => break,
                },
                _ = &mut shutdown => {
                    info!("shutdown requested, draining sessions");
                    break;
                }
            }
        }

        ShutdownCoordinator::new(self.registry.clone())
            .drain(listener)
            .await;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use std::net::SocketAddr;
    use std::time::Duration;
    use termbridge_core::ServerMessage;
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    const WAIT: Duration = Duration::from_secs(10);

    type ClientWs = WebSocketStream<MaybeTlsStream<TcpStream>>;

    fn test_config() -> ServerConfig {
        ServerConfig {
            bind: "127.0.0.1".into(),
            port: 0,
            max_sessions: 8,
            shell: "/bin/sh".into(),
            working_dir: None,
            term: "dumb".into(),
            cols: 80,
            rows: 24,
        }
    }

    async fn start_server() -> (
        SocketAddr,
        Arc<SessionRegistry>,
        oneshot::Sender<()>,
        JoinHandle<()>,
    ) {
        let server = BridgeServer::new(test_config());
        let registry = server.registry();
        let listener = WsListener::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = listener.local_addr();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = stop_rx.await;
                })
                .await
                .unwrap();
        });
        (addr, registry, stop_tx, handle)
    }

    async fn connect(addr: SocketAddr) -> ClientWs {
        let (ws, _resp) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .expect("client connect failed");
        ws
    }

    async fn next_envelope(ws: &mut ClientWs) -> ServerMessage {
        loop {
            match timeout(WAIT, ws.next()).await.expect("no envelope in time") {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(&text).expect("bad envelope")
                }
                Some(Ok(_)) => continue,
                other => panic!("connection ended: {other:?}"),
            }
        }
    }

    async fn send_input(ws: &mut ClientWs, data: &str) {
        let frame = serde_json::json!({ "type": "input", "data": data }).to_string();
        ws.send(Message::Text(frame)).await.unwrap();
    }

    async fn wait_for_empty(registry: &SessionRegistry) {
        timeout(WAIT, async {
            while registry.count().await != 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("registry never drained");
    }

    #[tokio::test]
    async fn connect_receives_connected_envelope() {
        let (addr, registry, _stop, _handle) = start_server().await;
        let mut ws = connect(addr).await;

        match next_envelope(&mut ws).await {
            ServerMessage::Connected {
                terminal_id,
                shell,
                pid,
            } => {
                assert!(!terminal_id.is_empty());
                assert_eq!(shell, "/bin/sh");
                assert!(pid > 0);
            }
            other => panic!("expected connected, got {other:?}"),
        }
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn input_produces_output() {
        let (addr, _registry, _stop, _handle) = start_server().await;
        let mut ws = connect(addr).await;
        next_envelope(&mut ws).await; // connected

        send_input(&mut ws, "echo out_$((6+7))\n").await;

        let mut seen = String::new();
        timeout(WAIT, async {
            loop {
                if let ServerMessage::Output { data } = next_envelope(&mut ws).await {
                    seen.push_str(&data);
                    if seen.contains("out_13") {
                        break;
                    }
                }
            }
        })
        .await
        .expect("shell output never arrived");
    }

    #[tokio::test]
    async fn clean_shell_exit_sends_exit_envelope() {
        let (addr, registry, _stop, _handle) = start_server().await;
        let mut ws = connect(addr).await;
        next_envelope(&mut ws).await; // connected

        send_input(&mut ws, "exit\n").await;

        let event = timeout(WAIT, async {
            loop {
                match next_envelope(&mut ws).await {
                    ServerMessage::Output { .. } => continue,
                    other => break other,
                }
            }
        })
        .await
        .expect("exit envelope never arrived");

        assert_eq!(
            event,
            ServerMessage::Exit {
                code: Some(0),
                signal: None
            }
        );

        // The server closes the transport after the exit envelope.
        match timeout(WAIT, ws.next()).await.expect("close never arrived") {
            Some(Ok(Message::Close(_))) | None => {}
            other => panic!("expected close, got {other:?}"),
        }
        wait_for_empty(&registry).await;
    }

    #[tokio::test]
    async fn resize_updates_session_dimensions() {
        let (addr, registry, _stop, _handle) = start_server().await;
        let mut ws = connect(addr).await;

        let terminal_id = match next_envelope(&mut ws).await {
            ServerMessage::Connected { terminal_id, .. } => terminal_id,
            other => panic!("expected connected, got {other:?}"),
        };

        let frame = serde_json::json!({ "type": "resize", "cols": 120, "rows": 40 }).to_string();
        ws.send(Message::Text(frame)).await.unwrap();

        timeout(WAIT, async {
            while registry.dimensions(&terminal_id).await != Some((120, 40)) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("dimensions never updated");
    }

    #[tokio::test]
    async fn abrupt_disconnect_reaps_session() {
        let (addr, registry, _stop, _handle) = start_server().await;
        let mut ws = connect(addr).await;
        next_envelope(&mut ws).await; // connected
        assert_eq!(registry.count().await, 1);

        drop(ws);
        wait_for_empty(&registry).await;
    }

    #[tokio::test]
    async fn drain_kills_sessions_and_closes_listener() {
        let (addr, registry, stop, handle) = start_server().await;

        let mut first = connect(addr).await;
        let mut second = connect(addr).await;
        next_envelope(&mut first).await;
        next_envelope(&mut second).await;
        assert_eq!(registry.count().await, 2);

        stop.send(()).unwrap();
        timeout(WAIT, handle)
            .await
            .expect("drain never finished")
            .unwrap();

        wait_for_empty(&registry).await;
        assert!(
            tokio_tungstenite::connect_async(format!("ws://{addr}"))
                .await
                .is_err(),
            "listener still accepting after drain"
        );
    }
}
