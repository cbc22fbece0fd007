//! Connection loop for the streaming JSON-RPC server.
//!
//! The server is generic over an injected handler rather than being
//! subclassed: transport concerns (framing, envelopes, chunk emission,
//! shutdown) live here, method semantics live behind `RpcHandler`.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use super::message::{
    RpcError, RpcOutcome, RpcRequest, RpcResponse, INVALID_REQUEST, PARSE_ERROR,
};

/// A method registry: maps a method name to a result. Implementations
/// dispatch with an explicit `match` — only intentionally exposed
/// operations are reachable.
pub trait RpcHandler: Send + Sync + 'static {
    fn call(&self, method: &str, params: Value) -> Result<RpcOutcome, RpcError>;
}

pub struct RpcServer<H: RpcHandler> {
    handler: Arc<H>,
}

impl<H: RpcHandler> RpcServer<H> {
    pub fn new(handler: Arc<H>) -> Self {
        Self { handler }
    }

    /// Accept connections until the shutdown flag flips. Each connection
    /// runs in its own task; requests on different connections share
    /// nothing but the handler.
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        log::info!("rpc server listening on {}", listener.local_addr()?);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            // transient accept failures must not kill the server
                            log::warn!("accept failed: {err}");
                            continue;
                        }
                    };
                    log::debug!("connection from {peer}");
                    let handler = self.handler.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(stream, handler, shutdown).await {
                            log::debug!("connection {peer} ended: {err}");
                        }
                    });
                }
                _ = shutdown.changed() => {
                    log::info!("rpc server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn handle_connection<H: RpcHandler>(
    stream: TcpStream,
    handler: Arc<H>,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = shutdown.changed() => break,
        };

        let Some(line) = line else {
            break; // client closed the connection
        };
        if line.trim().is_empty() {
            continue;
        }

        // a failed write means the client is gone; stop producing
        if !process_line(&line, &handler, &mut write_half).await? {
            break;
        }
    }

    Ok(())
}

/// Handle one request line. Returns false when the peer vanished
/// mid-response.
async fn process_line<H: RpcHandler>(
    line: &str,
    handler: &Arc<H>,
    writer: &mut OwnedWriteHalf,
) -> std::io::Result<bool> {
    let request: RpcRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(err) => {
            let response = RpcResponse::error(
                Value::Null,
                RpcError::new(PARSE_ERROR, format!("Parse error: {err}")),
            );
            return write_response(writer, &response).await;
        }
    };

    let id = request.id.clone();

    if request.jsonrpc.as_deref() != Some("2.0") {
        let response = RpcResponse::error(
            id,
            RpcError::new(INVALID_REQUEST, "Invalid Request: missing jsonrpc field"),
        );
        return write_response(writer, &response).await;
    }

    let Some(method) = request.method else {
        let response = RpcResponse::error(
            id,
            RpcError::new(INVALID_REQUEST, "Invalid Request: missing method field"),
        );
        return write_response(writer, &response).await;
    };

    // handlers run blocking work (embedding, scoring); keep the reactor free
    let outcome = {
        let handler = handler.clone();
        let params = request.params;
        tokio::task::block_in_place(move || handler.call(&method, params))
    };

    match outcome {
        Ok(RpcOutcome::Single(result)) => {
            write_response(writer, &RpcResponse::result(id, result)).await
        }
        Ok(RpcOutcome::Stream(chunks)) => {
            let last = chunks.len().saturating_sub(1);
            for (i, chunk) in chunks.into_iter().enumerate() {
                let response = RpcResponse::chunk(id.clone(), chunk, i < last);
                if !write_response(writer, &response).await? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Err(error) => write_response(writer, &RpcResponse::error(id, error)).await,
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &RpcResponse,
) -> std::io::Result<bool> {
    let mut raw = serde_json::to_string(response)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
    raw.push('\n');

    match writer.write_all(raw.as_bytes()).await {
        Ok(()) => {
            writer.flush().await?;
            Ok(true)
        }
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(false),
        Err(err) if err.kind() == std::io::ErrorKind::ConnectionReset => Ok(false),
        Err(err) => Err(err),
    }
}
