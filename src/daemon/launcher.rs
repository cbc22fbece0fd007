//! Daemon discovery and launch.

use std::process::Stdio;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use crate::config::Config;
use crate::rpc::{ClientError, RpcClient};

use super::progress::ProgressMessage;

/// Poll interval for the accept loop; each tick re-checks the deadline
/// and whether the child died.
const POLL_TICK: Duration = Duration::from_millis(500);

/// Bound on reading a single progress line from an accepted connection
const LINE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to keep polling get_status after the handoff grace period
const CONFIRM_WINDOW: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("daemon failed to start: {0}")]
    StartupFailed(String),

    #[error("daemon did not finish initializing within {0} seconds")]
    Timeout(u64),

    #[error("a daemon seems to be running but did not answer: {0}")]
    Unreachable(String),
}

#[derive(Debug)]
pub enum LaunchOutcome {
    /// The port was taken: a daemon is already up, here is its status
    AlreadyRunning(Value),
    /// We launched a daemon and confirmed it is serving
    Started(Value),
}

/// Ensure a daemon is running, starting one if needed.
///
/// Binding the well-known port is the existence check and the launch
/// claim in one atomic step: success means no daemon, failure with
/// "address in use" means one is already there (possibly still
/// initializing behind its own launcher).
pub async fn start(config: &Config) -> Result<LaunchOutcome, LaunchError> {
    let addr = config.addr();

    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
            println!("daemon is already running");
            // mid-init the port belongs to another launcher and the status
            // query goes unanswered; that is still "already running"
            let status = match query_status(config).await {
                Ok(status) => status,
                Err(err) => serde_json::json!({
                    "status": "initializing",
                    "detail": err.to_string(),
                }),
            };
            return Ok(LaunchOutcome::AlreadyRunning(status));
        }
        Err(err) => return Err(err.into()),
    };

    println!("no daemon found, launching one...");
    let mut child = spawn_detached(config)?;

    let deadline = Instant::now() + Duration::from_secs(config.init_timeout_secs);
    wait_for_init(&listener, &mut child, deadline, config.init_timeout_secs).await?;

    // release the port for the daemon
    drop(listener);

    println!("initialization complete, waiting for the daemon to take over...");
    tokio::time::sleep(Duration::from_secs(config.ready_grace_secs)).await;

    let status = confirm_serving(config).await?;
    println!("daemon is up");
    Ok(LaunchOutcome::Started(status))
}

/// Run the progress receiver until init_completed, the child dying, or
/// the deadline. The source system waited forever here; we bound the
/// wait so a wedged daemon reports as a startup failure instead of a
/// hung launcher.
async fn wait_for_init(
    listener: &TcpListener,
    child: &mut std::process::Child,
    deadline: Instant,
    timeout_secs: u64,
) -> Result<(), LaunchError> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Err(LaunchError::StartupFailed(format!(
                "daemon process exited during initialization ({status})"
            )));
        }
        if Instant::now() >= deadline {
            return Err(LaunchError::Timeout(timeout_secs));
        }

        let accepted = match tokio::time::timeout(POLL_TICK, listener.accept()).await {
            Err(_) => continue,
            Ok(accepted) => accepted?,
        };

        match receive_message(accepted.0).await {
            Ok(Some(ProgressMessage::Progress { message })) => {
                println!("progress: {message}");
            }
            Ok(Some(ProgressMessage::InitCompleted)) => {
                return Ok(());
            }
            Ok(Some(ProgressMessage::InitError { error })) => {
                return Err(LaunchError::StartupFailed(error));
            }
            Ok(Some(ProgressMessage::Ack)) | Ok(None) => {}
            Err(err) => {
                log::debug!("progress connection failed: {err}");
            }
        }
    }
}

/// Read one message from a progress connection, acking init_completed.
async fn receive_message(
    stream: tokio::net::TcpStream,
) -> std::io::Result<Option<ProgressMessage>> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    let line = match tokio::time::timeout(LINE_TIMEOUT, lines.next_line()).await {
        Ok(line) => line?,
        Err(_) => return Ok(None),
    };
    let Some(line) = line else {
        return Ok(None);
    };

    let message: ProgressMessage = match serde_json::from_str(&line) {
        Ok(message) => message,
        Err(err) => {
            log::debug!("ignoring malformed progress line: {err}");
            return Ok(None);
        }
    };

    if message == ProgressMessage::InitCompleted {
        let mut ack = serde_json::to_string(&ProgressMessage::Ack)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
        ack.push('\n');
        write_half.write_all(ack.as_bytes()).await?;
        write_half.flush().await?;
    }

    Ok(Some(message))
}

/// Start the daemon as a fully detached child: null stdio and its own
/// session, so our lifetime and theirs are uncoupled.
fn spawn_detached(config: &Config) -> std::io::Result<std::process::Child> {
    let exe = std::env::current_exe()?;
    let mut cmd = std::process::Command::new(exe);
    cmd.arg("daemon")
        .arg("--data-dir")
        .arg(config.data_dir())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // SAFETY: setsid is async-signal-safe and we touch nothing else
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    let child = cmd.spawn()?;
    log::info!("spawned daemon process {}", child.id());
    Ok(child)
}

async fn query_status(config: &Config) -> Result<Value, ClientError> {
    let client = RpcClient::new(
        config.addr(),
        Duration::from_secs(config.request_timeout_secs),
    );
    client.get_status().await
}

/// The daemon binds the port on its own schedule after the handoff;
/// poll status briefly instead of failing on the first refused connect.
async fn confirm_serving(config: &Config) -> Result<Value, LaunchError> {
    let deadline = Instant::now() + CONFIRM_WINDOW;
    loop {
        match query_status(config).await {
            Ok(status) => return Ok(status),
            Err(err) => {
                if Instant::now() >= deadline {
                    return Err(LaunchError::Unreachable(err.to_string()));
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
