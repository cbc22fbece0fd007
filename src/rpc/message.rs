use serde::{Deserialize, Serialize};
use serde_json::Value;

// JSON-RPC 2.0 error codes
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// Incoming request. `jsonrpc` and `method` are optional here so the
/// server can answer a malformed request with -32600 instead of a parse
/// failure.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,

    #[serde(default)]
    pub id: Value,

    #[serde(default)]
    pub method: Option<String>,

    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: i64, method: &str, params: Value) -> Value {
        serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,

    /// Carries `{"kind": "..."}` for service errors
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_kind(code: i64, message: impl Into<String>, kind: &str) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(serde_json::json!({ "kind": kind })),
        }
    }

    /// The machine-readable kind, if the error carried one
    pub fn kind(&self) -> Option<&str> {
        self.data.as_ref()?.get("kind")?.as_str()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,

    #[serde(default)]
    pub id: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,

    /// Streaming marker. Absent on single-message responses; `true` on
    /// every chunk of a stream except the last.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub more: Option<bool>,
}

impl RpcResponse {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
            more: None,
        }
    }

    pub fn chunk(id: Value, result: Value, more: bool) -> Self {
        Self {
            more: Some(more),
            ..Self::result(id, result)
        }
    }

    pub fn error(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
            more: None,
        }
    }
}

/// One bounded slice of an oversized result sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk<T> {
    pub data: Vec<T>,

    /// 1-based chunk ordinal
    pub chunk: usize,

    pub total_chunks: usize,

    /// 1-based rank of the chunk's first element in the whole sequence
    pub start_rank: usize,
}

/// What a handler produced: either a plain result or a pre-chunked
/// stream. The server turns a stream into one response line per element.
#[derive(Debug)]
pub enum RpcOutcome {
    Single(Value),
    Stream(Vec<Value>),
}

/// Split an ordered result sequence into chunks. An empty sequence still
/// yields exactly one (empty) chunk so the client always sees a
/// well-formed stream.
pub fn into_chunks<T: Serialize>(items: Vec<T>, chunk_size: usize) -> Vec<StreamChunk<T>> {
    let total_chunks = if items.is_empty() {
        1
    } else {
        items.len().div_ceil(chunk_size)
    };

    if items.is_empty() {
        return vec![StreamChunk {
            data: Vec::new(),
            chunk: 1,
            total_chunks: 1,
            start_rank: 1,
        }];
    }

    let mut chunks = Vec::with_capacity(total_chunks);
    let mut items = items;
    let mut start_rank = 1;
    let mut ordinal = 1;

    while !items.is_empty() {
        let rest = items.split_off(items.len().min(chunk_size));
        chunks.push(StreamChunk {
            data: items,
            chunk: ordinal,
            total_chunks,
            start_rank,
        });
        start_rank += chunk_size;
        ordinal += 1;
        items = rest;
    }

    chunks
}

/// Client-side inverse of `into_chunks`: order by `chunk` and
/// concatenate. Network delivery order is not trusted.
pub fn reassemble<T>(mut chunks: Vec<StreamChunk<T>>) -> Vec<T> {
    chunks.sort_by_key(|c| c.chunk);
    chunks.into_iter().flat_map(|c| c.data).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_math() {
        let items: Vec<u64> = (0..50_000).collect();
        let chunks = into_chunks(items, 20_000);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].data.len(), 20_000);
        assert_eq!(chunks[1].data.len(), 20_000);
        assert_eq!(chunks[2].data.len(), 10_000);

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk, i + 1);
            assert_eq!(chunk.total_chunks, 3);
            assert_eq!(chunk.start_rank, i * 20_000 + 1);
        }
    }

    #[test]
    fn test_exact_multiple() {
        let chunks = into_chunks((0..40u64).collect(), 20);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].data.len(), 20);
    }

    #[test]
    fn test_empty_yields_one_chunk() {
        let chunks = into_chunks(Vec::<u64>::new(), 20_000);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].data.is_empty());
        assert_eq!(chunks[0].chunk, 1);
        assert_eq!(chunks[0].total_chunks, 1);
        assert_eq!(chunks[0].start_rank, 1);
    }

    #[test]
    fn test_reassemble_out_of_order() {
        let items: Vec<u64> = (0..45).collect();
        let mut chunks = into_chunks(items.clone(), 10);
        chunks.reverse();
        assert_eq!(reassemble(chunks), items);
    }

    #[test]
    fn test_roundtrip_is_identity() {
        let items: Vec<u64> = (0..12_345).collect();
        let chunks = into_chunks(items.clone(), 1_000);
        assert_eq!(reassemble(chunks), items);
    }

    #[test]
    fn test_response_serialization_shapes() {
        let single = RpcResponse::result(serde_json::json!(1), serde_json::json!({"ok": true}));
        let raw = serde_json::to_string(&single).unwrap();
        assert!(!raw.contains("more"));
        assert!(!raw.contains("error"));

        let chunk = RpcResponse::chunk(serde_json::json!(1), serde_json::json!([]), true);
        let raw = serde_json::to_string(&chunk).unwrap();
        assert!(raw.contains("\"more\":true"));

        let err = RpcResponse::error(
            serde_json::json!(2),
            RpcError::with_kind(INVALID_PARAMS, "bad top_k", "validation"),
        );
        let raw = serde_json::to_string(&err).unwrap();
        assert!(raw.contains("-32602"));
        assert!(raw.contains("\"kind\":\"validation\""));
    }

    #[test]
    fn test_error_kind_accessor() {
        let err = RpcError::with_kind(INVALID_PARAMS, "nope", "unsupported_mode");
        assert_eq!(err.kind(), Some("unsupported_mode"));
        assert_eq!(RpcError::new(INTERNAL_ERROR, "x").kind(), None);
    }
}
