//! PTY process adapter using portable-pty.
//!
//! Spawns a shell under a pseudo-terminal and exposes write, resize, and
//! forceful termination. Output is delivered as a byte-chunk stream and the
//! process end as a one-shot exit event; both are consumed by the owning
//! session task only.

use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, ExitStatus, MasterPty, PtySize};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Mutex as StdMutex;
use termbridge_core::{BridgeError, BridgeResult};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info};

/// How the process ended. At most one field is set: a normal exit carries
/// the status code, a signal death carries the signal name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExitEvent {
    pub code: Option<i32>,
    pub signal: Option<String>,
}

impl From<ExitStatus> for ExitEvent {
    fn from(status: ExitStatus) -> Self {
        match status.signal() {
            Some(sig) => Self {
                code: None,
                signal: Some(sig.to_string()),
            },
            None => Self {
                code: i32::try_from(status.exit_code()).ok(),
                signal: None,
            },
        }
    }
}

/// The consumer side of a spawned PTY: the output byte stream and the
/// one-shot exit notification.
pub struct PtyStreams {
    pub output: mpsc::Receiver<Vec<u8>>,
    pub exit: oneshot::Receiver<ExitEvent>,
}

/// A managed PTY instance.
pub struct PtyHandle {
    /// The master side, for resize (Mutex because MasterPty is not Sync).
    master: StdMutex<Box<dyn MasterPty + Send>>,
    /// Writer to the process's input.
    writer: Mutex<Box<dyn Write + Send>>,
    /// Kills the child without needing the child handle itself.
    killer: StdMutex<Box<dyn ChildKiller + Send + Sync>>,
    /// OS process id, captured at spawn.
    pid: Option<u32>,
}

impl PtyHandle {
    /// Spawn `shell` under a fresh PTY of the given size.
    ///
    /// The child inherits the host environment augmented with `TERM` and
    /// `COLORTERM` so interactive programs render correctly. A background
    /// thread pumps PTY output into the returned stream until EOF, then
    /// reaps the child and fires the exit event.
    pub fn spawn(
        shell: &str,
        cols: u16,
        rows: u16,
        working_dir: Option<&Path>,
        term: &str,
    ) -> BridgeResult<(Self, PtyStreams)> {
        let pty_system = native_pty_system();

        let size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };

        let pair = pty_system
            .openpty(size)
            .map_err(|e| BridgeError::Spawn(format!("failed to open PTY: {e}")))?;

        let mut cmd = CommandBuilder::new(shell);
        cmd.env("TERM", term);
        cmd.env("COLORTERM", "truecolor");
        if let Some(dir) = working_dir {
            cmd.cwd(dir);
        }

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| BridgeError::Spawn(format!("failed to spawn {shell}: {e}")))?;

        let killer = child.clone_killer();
        let pid = child.process_id();

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| BridgeError::Spawn(format!("failed to clone PTY reader: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| BridgeError::Spawn(format!("failed to take PTY writer: {e}")))?;

        // The slave must not outlive the spawn: holding it open would keep
        // the master reader from ever seeing EOF.
        drop(pair.slave);

        info!(shell, cols, rows, pid, "PTY spawned");

        let (out_tx, out_rx) = mpsc::channel::<Vec<u8>>(64);
        let (exit_tx, exit_rx) = oneshot::channel::<ExitEvent>();

        // One blocking I/O task per session: stream output until EOF, then
        // reap the child. The exit event therefore always fires after the
        // last output chunk has been queued.
        tokio::task::spawn_blocking(move || {
            let mut reader = reader;
            let mut buf = [0u8; 8192];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if out_tx.blocking_send(buf[..n].to_vec()).is_err() {
                            // Session task is gone; stop pumping.
                            break;
                        }
                    }
                }
            }
            drop(out_tx);

            let event = match child.wait() {
                Ok(status) => ExitEvent::from(status),
                Err(_) => ExitEvent::default(),
            };
            debug!(code = ?event.code, signal = ?event.signal, "PTY child reaped");
            let _ = exit_tx.send(event);
        });

        let handle = Self {
            master: StdMutex::new(pair.master),
            writer: Mutex::new(writer),
            killer: StdMutex::new(killer),
            pid,
        };
        let streams = PtyStreams {
            output: out_rx,
            exit: exit_rx,
        };

        Ok((handle, streams))
    }

    /// Forward raw bytes to the process's input. Best effort: the OS pipe is
    /// the only buffer.
    pub async fn write(&self, data: &[u8]) -> BridgeResult<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }

    /// Change the pseudo-terminal's window size.
    pub fn resize(&self, cols: u16, rows: u16) -> BridgeResult<()> {
        let size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        let master = self
            .master
            .lock()
            .map_err(|_| BridgeError::Pty("PTY master lock poisoned".into()))?;
        master
            .resize(size)
            .map_err(|e| BridgeError::Pty(format!("PTY resize failed: {e}")))?;
        debug!(cols, rows, "PTY resized");
        Ok(())
    }

    /// Current terminal size as reported by the PTY.
    pub fn size(&self) -> BridgeResult<(u16, u16)> {
        let master = self
            .master
            .lock()
            .map_err(|_| BridgeError::Pty("PTY master lock poisoned".into()))?;
        let size = master
            .get_size()
            .map_err(|e| BridgeError::Pty(format!("PTY get_size failed: {e}")))?;
        Ok((size.cols, size.rows))
    }

    /// Forcibly end the process. Idempotent: killing an already-dead child
    /// is a no-op, not an error.
    pub fn kill(&self) {
        match self.killer.lock() {
            Ok(mut killer) => {
                if let Err(e) = killer.kill() {
                    debug!(error = %e, "kill on exited process");
                }
            }
            Err(_) => debug!("killer lock poisoned"),
        }
    }

    /// OS process id of the child, if known.
    pub fn process_id(&self) -> Option<u32> {
        self.pid
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(10);

    async fn collect_until(output: &mut mpsc::Receiver<Vec<u8>>, needle: &str) -> String {
        let mut seen = String::new();
        loop {
            let chunk = timeout(WAIT, output.recv())
                .await
                .expect("timed out waiting for PTY output")
                .expect("output stream closed early");
            seen.push_str(&String::from_utf8_lossy(&chunk));
            if seen.contains(needle) {
                return seen;
            }
        }
    }

    #[tokio::test]
    async fn echo_round_trip() {
        let (pty, mut streams) = PtyHandle::spawn("/bin/sh", 80, 24, None, "dumb").unwrap();
        // The expansion only appears in output if the shell actually ran it.
        pty.write(b"echo bridge_$((40+2))\n").await.unwrap();
        collect_until(&mut streams.output, "bridge_42").await;
        pty.kill();
    }

    #[tokio::test]
    async fn input_order_is_preserved() {
        let (pty, mut streams) = PtyHandle::spawn("/bin/sh", 80, 24, None, "dumb").unwrap();
        pty.write(b"ec").await.unwrap();
        pty.write(b"ho").await.unwrap();
        pty.write(b" order_$((20+3))\n").await.unwrap();
        collect_until(&mut streams.output, "order_23").await;
        pty.kill();
    }

    #[tokio::test]
    async fn resize_round_trip() {
        let (pty, _streams) = PtyHandle::spawn("/bin/sh", 80, 24, None, "dumb").unwrap();
        pty.resize(120, 40).unwrap();
        assert_eq!(pty.size().unwrap(), (120, 40));
        pty.kill();
    }

    #[tokio::test]
    async fn clean_exit_reports_code_zero() {
        let (pty, mut streams) = PtyHandle::spawn("/bin/sh", 80, 24, None, "dumb").unwrap();
        pty.write(b"exit\n").await.unwrap();

        // Output closes at EOF, then the exit event fires.
        loop {
            match timeout(WAIT, streams.output.recv()).await.unwrap() {
                Some(_) => continue,
                None => break,
            }
        }
        let event = timeout(WAIT, streams.exit).await.unwrap().unwrap();
        assert_eq!(
            event,
            ExitEvent {
                code: Some(0),
                signal: None
            }
        );
    }

    #[tokio::test]
    async fn kill_is_idempotent() {
        let (pty, streams) = PtyHandle::spawn("/bin/sh", 80, 24, None, "dumb").unwrap();
        pty.kill();
        pty.kill();
        let event = timeout(WAIT, streams.exit).await.unwrap().unwrap();
        assert!(event.code != Some(0) || event.signal.is_some());
        // Still a no-op once the child is dead and reaped.
        pty.kill();
    }
}
