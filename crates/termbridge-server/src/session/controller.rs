//! Per-session lifecycle controller.
//!
//! Drives one session from connection accept to teardown: spawns the shell,
//! registers the session, then relays envelopes until either side ends.
//! Termination of either side triggers termination of the other; only the
//! first trigger performs cleanup.

use crate::config::ServerConfig;
use crate::session::pty::{ExitEvent, PtyHandle, PtyStreams};
use crate::session::registry::{Session, SessionRegistry};
use crate::transport::websocket::WsConnection;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use termbridge_core::{
    decode_client, encode_server, generate_session_id, ClientMessage, ServerMessage,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Which side ended the session first.
enum CloseTrigger {
    /// The shell exited (or was killed).
    ProcessExit(ExitEvent),
    /// The client disconnected or the socket failed.
    TransportClosed,
}

/// Run one session to completion. Never returns an error: every failure
/// path ends in local cleanup and logging.
pub async fn run_session(
    conn: WsConnection,
    registry: Arc<SessionRegistry>,
    config: Arc<ServerConfig>,
) {
    let session_id = generate_session_id();
    let remote = conn.remote_addr;
    let (mut sink, mut source) = conn.ws_stream.split();

    // Initializing: spawn the shell behind a PTY. A spawn failure is
    // terminal for this session only: error envelope, close, never
    // registered, no retry.
    let spawned = PtyHandle::spawn(
        &config.shell,
        config.cols,
        config.rows,
        config.working_dir.as_deref(),
        &config.term,
    );
    let (pty, streams) = match spawned {
        Ok(pair) => pair,
        Err(e) => {
            warn!(session_id = %session_id, remote = %remote, error = %e, "shell spawn failed");
            send_or_log(
                &mut sink,
                &ServerMessage::Error {
                    message: e.to_string(),
                },
            )
            .await;
            let _ = sink.close().await;
            return;
        }
    };

    let pty = Arc::new(pty);
    let session = Session::new(session_id.clone(), pty.clone(), config.cols, config.rows);
    if let Err(e) = registry.insert(session).await {
        warn!(session_id = %session_id, remote = %remote, error = %e, "session rejected");
        pty.kill();
        send_or_log(
            &mut sink,
            &ServerMessage::Error {
                message: e.to_string(),
            },
        )
        .await;
        let _ = sink.close().await;
        return;
    }

    let pid = pty.process_id().unwrap_or(0);
    send_or_log(
        &mut sink,
        &ServerMessage::Connected {
            terminal_id: session_id.clone(),
            shell: config.shell.clone(),
            pid,
        },
    )
    .await;
    registry.activate(&session_id).await;
    info!(session_id = %session_id, remote = %remote, pid, shell = %config.shell, "session active");

    let PtyStreams {
        mut output,
        mut exit,
    } = streams;

    let trigger = loop {
        tokio::select! {
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    handle_frame(&text, &session_id, &pty, &registry).await;
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = sink.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => break CloseTrigger::TransportClosed,
                Some(Ok(other)) => {
                    debug!(session_id = %session_id, frame = ?other, "ignoring non-text frame");
                }
                Some(Err(e)) => {
                    debug!(session_id = %session_id, error = %e, "transport error");
                    break CloseTrigger::TransportClosed;
                }
            },

            Some(chunk) = output.recv() => {
                send_or_log(
                    &mut sink,
                    &ServerMessage::Output {
                        data: String::from_utf8_lossy(&chunk).into_owned(),
                    },
                )
                .await;
            }

            status = &mut exit => {
                break CloseTrigger::ProcessExit(status.unwrap_or_default());
            }
        }
    };

    // Closing: only the first termination trigger performs cleanup.
    if !registry.begin_close(&session_id).await {
        return;
    }

    match trigger {
        CloseTrigger::ProcessExit(event) => {
            drain_output(&mut sink, &mut output).await;
            info!(session_id = %session_id, code = ?event.code, signal = ?event.signal, "shell exited");
            send_or_log(
                &mut sink,
                &ServerMessage::Exit {
                    code: event.code,
                    signal: event.signal,
                },
            )
            .await;
            let _ = sink.close().await;
        }
        CloseTrigger::TransportClosed => {
            info!(session_id = %session_id, "transport closed, terminating shell");
            pty.kill();
        }
    }

    registry.remove(&session_id).await;
}

/// Apply one inbound text frame to the session. Unknown or malformed
/// envelopes are logged and ignored; the session stays active.
async fn handle_frame(
    text: &str,
    session_id: &str,
    pty: &PtyHandle,
    registry: &SessionRegistry,
) {
    match decode_client(text) {
        Ok(ClientMessage::Input { data }) => {
            if let Err(e) = pty.write(data.as_bytes()).await {
                warn!(session_id = %session_id, error = %e, "pty write failed");
            }
        }
        Ok(ClientMessage::Resize { cols, rows }) => {
            // Clamp zero to the 1×1 minimum.
            if cols == 0 || rows == 0 {
                debug!(session_id = %session_id, cols, rows, "clamping degenerate resize");
            }
            let (cols, rows) = (cols.max(1), rows.max(1));
            match pty.resize(cols, rows) {
                Ok(()) => registry.set_dimensions(session_id, cols, rows).await,
                Err(e) => warn!(session_id = %session_id, error = %e, "pty resize failed"),
            }
        }
        Ok(ClientMessage::Unknown) => {
            debug!(session_id = %session_id, frame = %text, "unrecognized envelope type");
        }
        Err(e) => {
            debug!(session_id = %session_id, error = %e, "malformed envelope");
        }
    }
}

/// Forward whatever output the reader pump buffered ahead of the exit
/// event. The pump drops its sender before firing the event, so this loop
/// always terminates.
async fn drain_output(sink: &mut WsSink, output: &mut mpsc::Receiver<Vec<u8>>) {
    while let Some(chunk) = output.recv().await {
        send_or_log(
            sink,
            &ServerMessage::Output {
                data: String::from_utf8_lossy(&chunk).into_owned(),
            },
        )
        .await;
    }
}

/// Best-effort send: a failed write means the transport is going down,
/// which the session loop observes on its next read.
async fn send_or_log(sink: &mut WsSink, msg: &ServerMessage) {
    match encode_server(msg) {
        Ok(text) => {
            if let Err(e) = sink.send(Message::Text(text)).await {
                debug!(error = %e, "ws send failed");
            }
        }
        Err(e) => warn!(error = %e, "envelope encode failed"),
    }
}
