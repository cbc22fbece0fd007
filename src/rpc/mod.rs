//! JSON-RPC 2.0 over a persistent line-delimited TCP connection.
//!
//! One JSON document per line, UTF-8. Responses whose payload would blow
//! the per-message budget are streamed: the server emits one response per
//! chunk, all sharing the request id, with `more: true` on every chunk
//! except the last. A response with no `more` field at all is a complete,
//! single-message result.
//!
//! - `message`: request/response/chunk types and the error-code table
//! - `server`: connection loop, generic over an injected handler
//! - `service`: the search handler (method name -> engine call table)
//! - `client`: request sender with chunk reassembly

pub mod client;
pub mod message;
pub mod server;
pub mod service;

pub use client::{ClientError, RpcClient};
pub use server::RpcServer;
pub use service::SearchService;
