//! The search service: method table wiring the RPC surface to the engine.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::watch;

use crate::engine::SearchEngine;
use crate::errors::SearchError;
use crate::settings::SearchSettings;
use crate::vector::{Mode, SpaceKind};

use super::message::{
    into_chunks, RpcError, RpcOutcome, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND,
};
use super::server::RpcHandler;

const DEFAULT_TEXT_LIMIT: usize = 50;
const DEFAULT_USER_STATS_LIMIT: usize = 50;

pub struct SearchService {
    engine: Arc<SearchEngine>,
    model: String,
    chunk_size: usize,
    shutdown: watch::Sender<bool>,
}

#[derive(Debug, Deserialize)]
struct SearchSimilarParams {
    query: String,
    #[serde(default)]
    search_settings: Option<SearchSettings>,
    #[serde(default)]
    mode: Option<Mode>,
    #[serde(default)]
    weights: Option<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct VectorSearchParams {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    mode: Option<Mode>,
    #[serde(default)]
    weights: Option<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct SearchTextParams {
    search_term: String,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserStatsParams {
    #[serde(default)]
    limit: Option<usize>,
}

impl SearchService {
    pub fn new(
        engine: Arc<SearchEngine>,
        model: String,
        chunk_size: usize,
        shutdown: watch::Sender<bool>,
    ) -> Self {
        Self {
            engine,
            model,
            chunk_size,
            shutdown,
        }
    }

    fn get_status(&self) -> Result<RpcOutcome, RpcError> {
        let modes: Vec<&str> = self
            .engine
            .available_modes()
            .map_err(service_error)?
            .iter()
            .map(|m| m.as_str())
            .collect();

        Ok(RpcOutcome::Single(json!({
            "status": "running",
            "ready": true,
            "model": self.model,
            "loaded_records": self.engine.records().len(),
            "available_modes": modes,
        })))
    }

    fn search_similar(&self, params: Value) -> Result<RpcOutcome, RpcError> {
        let params: SearchSimilarParams = parse_params(params)?;
        let settings = params.search_settings.unwrap_or_default();
        let mode = params.mode.unwrap_or_default();

        let results = self
            .engine
            .search(&params.query, &settings, mode, params.weights.as_deref())
            .map_err(service_error)?;

        Ok(RpcOutcome::Single(json!(results)))
    }

    fn vector_search(&self, params: Value) -> Result<RpcOutcome, RpcError> {
        let params: VectorSearchParams = parse_params(params)?;
        let mode = params.mode.unwrap_or_default();

        let pairs = self
            .engine
            .vector_search(&params.query, mode, params.weights.as_deref(), params.top_k)
            .map_err(service_error)?;

        // a bounded request is small by construction; only the unbounded
        // walk streams
        if params.top_k.is_some() {
            return Ok(RpcOutcome::Single(json!(pairs)));
        }

        let chunks = into_chunks(pairs, self.chunk_size)
            .into_iter()
            .map(|chunk| json!(chunk))
            .collect();
        Ok(RpcOutcome::Stream(chunks))
    }

    fn search_text(&self, params: Value) -> Result<RpcOutcome, RpcError> {
        let params: SearchTextParams = parse_params(params)?;

        let source = match params.source.as_deref() {
            None => SpaceKind::Content,
            Some(raw) => raw.parse().map_err(|err: String| {
                RpcError::with_kind(INVALID_PARAMS, err, "validation")
            })?,
        };

        let results = self
            .engine
            .text_search(
                &params.search_term,
                params.limit.unwrap_or(DEFAULT_TEXT_LIMIT),
                source,
            )
            .map_err(service_error)?;

        Ok(RpcOutcome::Single(json!(results)))
    }

    fn database_stats(&self) -> Result<RpcOutcome, RpcError> {
        Ok(RpcOutcome::Single(json!(self.engine.database_stats())))
    }

    fn user_stats(&self, params: Value) -> Result<RpcOutcome, RpcError> {
        let params: UserStatsParams = parse_params(params)?;
        let stats = self
            .engine
            .author_stats(params.limit.unwrap_or(DEFAULT_USER_STATS_LIMIT));
        Ok(RpcOutcome::Single(json!(stats)))
    }

    fn stop_server(&self) -> Result<RpcOutcome, RpcError> {
        log::info!("stop_server requested");
        let _ = self.shutdown.send(true);
        Ok(RpcOutcome::Single(json!({ "status": "stopping" })))
    }
}

impl RpcHandler for SearchService {
    fn call(&self, method: &str, params: Value) -> Result<RpcOutcome, RpcError> {
        match method {
            "get_status" => self.get_status(),
            "search_similar" => self.search_similar(params),
            "vector_search" => self.vector_search(params),
            "search_text" => self.search_text(params),
            "get_database_stats" => self.database_stats(),
            "get_user_stats" => self.user_stats(params),
            "stop_server" => self.stop_server(),
            other => Err(RpcError::new(
                METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            )),
        }
    }
}

fn parse_params<P: serde::de::DeserializeOwned>(params: Value) -> Result<P, RpcError> {
    let params = if params.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        params
    };
    serde_json::from_value(params).map_err(|err| {
        RpcError::with_kind(INVALID_PARAMS, format!("Invalid params: {err}"), "validation")
    })
}

/// Map an engine error onto the wire. User-caused errors go out verbatim;
/// internals are logged in full and sanitized.
fn service_error(err: SearchError) -> RpcError {
    match &err {
        SearchError::Validation(_) | SearchError::UnsupportedMode { .. } => {
            RpcError::with_kind(INVALID_PARAMS, err.to_string(), err.kind())
        }
        SearchError::Internal(detail) => {
            log::error!("internal error serving request: {detail}");
            RpcError::with_kind(INTERNAL_ERROR, "internal error", err.kind())
        }
    }
}
