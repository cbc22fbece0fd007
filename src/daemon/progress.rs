//! Startup progress messages between daemon and launcher.
//!
//! Load phases never touch sockets: they push messages into a channel,
//! and one relay task owns the connect-send-close exchanges with the
//! launcher's receiver. Each message rides its own short-lived
//! connection, so nothing can time out during a long synchronous load
//! phase.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How long the relay waits for the launcher's ack of init_completed
const ACK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressMessage {
    Progress { message: String },
    InitCompleted,
    InitError { error: String },
    /// Launcher's reply to init_completed
    Ack,
}

/// Sender half handed to the load phases. Cheap to clone, safe to use
/// from blocking code.
#[derive(Clone)]
pub struct ProgressHandle {
    tx: mpsc::UnboundedSender<ProgressMessage>,
}

impl ProgressHandle {
    pub fn progress(&self, message: impl Into<String>) {
        let message = message.into();
        log::info!("{message}");
        let _ = self.tx.send(ProgressMessage::Progress { message });
    }

    /// Terminal success. The relay acknowledges with the launcher and
    /// then exits; await the relay handle before binding the port.
    pub fn completed(&self) {
        let _ = self.tx.send(ProgressMessage::InitCompleted);
    }

    /// Terminal failure; the relay forwards it and exits.
    pub fn error(&self, error: impl Into<String>) {
        let _ = self.tx.send(ProgressMessage::InitError {
            error: error.into(),
        });
    }
}

/// Create the progress channel plus its relay task. The relay finishes
/// after forwarding a terminal message (or when every handle is dropped).
pub fn channel(launcher_addr: String) -> (ProgressHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let relay = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let terminal = !matches!(message, ProgressMessage::Progress { .. });
            let wants_ack = message == ProgressMessage::InitCompleted;

            if let Err(err) = send_one(&launcher_addr, &message, wants_ack).await {
                // no launcher listening (manual foreground start): stderr
                // keeps the messages visible
                match &message {
                    ProgressMessage::Progress { message } => eprintln!("{message}"),
                    ProgressMessage::InitError { error } => eprintln!("init failed: {error}"),
                    _ => log::debug!("progress relay: {err}"),
                }
            }

            if terminal {
                break;
            }
        }
    });

    (ProgressHandle { tx }, relay)
}

/// One connect-send-close exchange. For init_completed, also waits for
/// the launcher's ack so the port handoff is ordered.
async fn send_one(
    addr: &str,
    message: &ProgressMessage,
    wants_ack: bool,
) -> std::io::Result<()> {
    let stream = TcpStream::connect(addr).await?;
    let (read_half, mut write_half) = stream.into_split();

    let mut raw = serde_json::to_string(message)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
    raw.push('\n');
    write_half.write_all(raw.as_bytes()).await?;
    write_half.flush().await?;

    if wants_ack {
        let mut lines = BufReader::new(read_half).lines();
        match tokio::time::timeout(ACK_TIMEOUT, lines.next_line()).await {
            Ok(Ok(Some(line))) => {
                match serde_json::from_str::<ProgressMessage>(&line) {
                    Ok(ProgressMessage::Ack) => {}
                    other => log::warn!("unexpected ack reply: {other:?}"),
                }
            }
            Ok(Ok(None)) | Ok(Err(_)) => {
                log::warn!("launcher closed before acking init_completed");
            }
            Err(_) => {
                log::warn!("timed out waiting for init_completed ack");
            }
        }
    }

    Ok(())
}
