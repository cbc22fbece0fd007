//! Client side of the streaming RPC protocol.
//!
//! One connection per request: connect, send, read responses until the
//! result is complete, close. Responses are correlated by request id;
//! lines carrying a different id are ignored — they may belong to a
//! stale or already-resolved exchange, which is not an error. Every read
//! is bounded by the configured timeout, and the socket is dropped on
//! success, error and timeout alike.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::engine::{AuthorStat, DatabaseStats, ScoredResult};
use crate::settings::SearchSettings;
use crate::vector::Mode;

use super::message::{reassemble, RpcError, RpcRequest, RpcResponse, StreamChunk};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Connection refused: nothing is listening on the service port
    #[error("server is not running")]
    NotRunning,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer spoke, but not valid JSON-RPC
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered with an error object
    #[error("server error: {}", .0.message)]
    Rpc(RpcError),
}

pub struct RpcClient {
    addr: String,
    timeout: Duration,
    next_id: AtomicI64,
}

impl RpcClient {
    pub fn new(addr: String, timeout: Duration) -> Self {
        Self {
            addr,
            timeout,
            next_id: AtomicI64::new(1),
        }
    }

    /// Send one request and return its complete result. Chunked responses
    /// are reassembled transparently: the returned value is the
    /// concatenation of the chunks' `data` arrays in chunk order.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let stream = match timeout(self.timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::ConnectionRefused => {
                return Err(ClientError::NotRunning);
            }
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => return Err(ClientError::Timeout(self.timeout)),
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (read_half, mut write_half) = stream.into_split();

        let mut raw = RpcRequest::new(id, method, params).to_string();
        raw.push('\n');
        write_half.write_all(raw.as_bytes()).await?;
        write_half.flush().await?;

        let mut lines = BufReader::new(read_half).lines();
        let mut chunks: Vec<StreamChunk<Value>> = Vec::new();

        loop {
            let line = match timeout(self.timeout, lines.next_line()).await {
                Ok(line) => line?,
                Err(_) => return Err(ClientError::Timeout(self.timeout)),
            };
            let Some(line) = line else {
                return Err(ClientError::Protocol(
                    "connection closed before the response completed".into(),
                ));
            };

            let response: RpcResponse = serde_json::from_str(&line)
                .map_err(|err| ClientError::Protocol(format!("malformed response: {err}")))?;

            if response.jsonrpc != "2.0" {
                return Err(ClientError::Protocol(
                    "server does not speak JSON-RPC 2.0".into(),
                ));
            }
            if response.id != Value::from(id) {
                log::debug!("ignoring response for foreign id {:?}", response.id);
                continue;
            }
            if let Some(error) = response.error {
                return Err(ClientError::Rpc(error));
            }
            let Some(result) = response.result else {
                return Err(ClientError::Protocol(
                    "response carries neither result nor error".into(),
                ));
            };

            match response.more {
                None => {
                    if !chunks.is_empty() {
                        return Err(ClientError::Protocol(
                            "single response arrived mid-stream".into(),
                        ));
                    }
                    return Ok(result);
                }
                Some(more) => {
                    let chunk: StreamChunk<Value> =
                        serde_json::from_value(result).map_err(|err| {
                            ClientError::Protocol(format!("malformed stream chunk: {err}"))
                        })?;
                    chunks.push(chunk);
                    if !more {
                        return Ok(Value::Array(reassemble(chunks)));
                    }
                }
            }
        }
    }

    pub async fn get_status(&self) -> Result<Value, ClientError> {
        self.call("get_status", Value::Null).await
    }

    pub async fn stop_server(&self) -> Result<Value, ClientError> {
        self.call("stop_server", Value::Null).await
    }

    pub async fn search_similar(
        &self,
        query: &str,
        settings: &SearchSettings,
        mode: Mode,
        weights: Option<&[f32]>,
    ) -> Result<Vec<ScoredResult>, ClientError> {
        let mut params = serde_json::json!({
            "query": query,
            "search_settings": settings,
            "mode": mode,
        });
        if let Some(weights) = weights {
            params["weights"] = serde_json::json!(weights);
        }

        let result = self.call("search_similar", params).await?;
        serde_json::from_value(result)
            .map_err(|err| ClientError::Protocol(format!("malformed results: {err}")))
    }

    pub async fn vector_search(
        &self,
        query: &str,
        mode: Mode,
        top_k: Option<usize>,
    ) -> Result<Vec<(u64, f32)>, ClientError> {
        let mut params = serde_json::json!({
            "query": query,
            "mode": mode,
        });
        if let Some(top_k) = top_k {
            params["top_k"] = serde_json::json!(top_k);
        }

        let result = self.call("vector_search", params).await?;
        serde_json::from_value(result)
            .map_err(|err| ClientError::Protocol(format!("malformed results: {err}")))
    }

    pub async fn search_text(
        &self,
        search_term: &str,
        limit: Option<usize>,
        source: Option<&str>,
    ) -> Result<Vec<ScoredResult>, ClientError> {
        let mut params = serde_json::json!({ "search_term": search_term });
        if let Some(limit) = limit {
            params["limit"] = serde_json::json!(limit);
        }
        if let Some(source) = source {
            params["source"] = serde_json::json!(source);
        }

        let result = self.call("search_text", params).await?;
        serde_json::from_value(result)
            .map_err(|err| ClientError::Protocol(format!("malformed results: {err}")))
    }

    pub async fn get_database_stats(&self) -> Result<DatabaseStats, ClientError> {
        let result = self.call("get_database_stats", Value::Null).await?;
        serde_json::from_value(result)
            .map_err(|err| ClientError::Protocol(format!("malformed stats: {err}")))
    }

    pub async fn get_user_stats(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<AuthorStat>, ClientError> {
        let params = match limit {
            Some(limit) => serde_json::json!({ "limit": limit }),
            None => Value::Null,
        };
        let result = self.call("get_user_stats", params).await?;
        serde_json::from_value(result)
            .map_err(|err| ClientError::Protocol(format!("malformed stats: {err}")))
    }
}
