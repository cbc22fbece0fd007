//! The daemon process: heavy one-time load, then the long-lived server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::config::{ArchiveMeta, Config};
use crate::engine::SearchEngine;
use crate::records::RecordStore;
use crate::rpc::{RpcServer, SearchService};
use crate::tags::TagStore;
use crate::vector::{FastEmbedder, SpaceKind, SpaceRegistry};

use super::progress::{self, ProgressHandle};

/// Attempts to claim the service port after the launcher releases it
const BIND_RETRIES: u32 = 5;

pub async fn run(config: Config) -> anyhow::Result<()> {
    // metadata first: a missing model identifier aborts before any
    // expensive work
    let meta = ArchiveMeta::load(&config.meta_path())?;

    let (progress, relay) = progress::channel(config.addr());
    progress.progress(format!("daemon starting with model '{}'", meta.model));

    let built = {
        let config = config.clone();
        let meta = meta.clone();
        let progress = progress.clone();
        tokio::task::spawn_blocking(move || build_engine(&config, &meta, &progress)).await?
    };

    let engine = match built {
        Ok(engine) => engine,
        Err(err) => {
            progress.error(err.to_string());
            drop(progress);
            let _ = relay.await;
            return Err(err);
        }
    };

    progress.completed();
    drop(progress);
    // the relay exchanges the ack with the launcher; the port handoff
    // must not start before that finished
    let _ = relay.await;

    tokio::time::sleep(Duration::from_secs(config.ready_grace_secs)).await;

    let listener = bind_with_retry(&config.addr()).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let service = Arc::new(SearchService::new(
        engine,
        meta.model.clone(),
        config.chunk_size,
        shutdown_tx.clone(),
    ));

    tokio::spawn(shutdown_on_signal(shutdown_tx));

    RpcServer::new(service).serve(listener, shutdown_rx).await?;
    log::info!("daemon stopped");
    Ok(())
}

/// The multi-minute part. Runs on a blocking thread; progress goes
/// through the channel, never a socket.
fn build_engine(
    config: &Config,
    meta: &ArchiveMeta,
    progress: &ProgressHandle,
) -> anyhow::Result<Arc<SearchEngine>> {
    let started = Instant::now();

    progress.progress("loading archive...");
    let csv_path = config.data_dir().join(&meta.csv);
    let records = Arc::new(RecordStore::load(&csv_path)?);
    progress.progress(format!(
        "archive loaded: {} posts ({:.2}s)",
        records.len(),
        started.elapsed().as_secs_f64()
    ));

    let tags = Arc::new(TagStore::load(&config.tags_path())?);
    if !tags.is_empty() {
        progress.progress(format!("tag sidecar loaded: {} posts tagged", tags.len()));
    }

    progress.progress(format!("initializing embedding model '{}'...", meta.model));
    let phase = Instant::now();
    let embedder = Arc::new(FastEmbedder::new(
        &meta.model,
        config.models_dir(),
        Some(Duration::from_secs(config.download_timeout_secs)),
    )?);
    progress.progress(format!(
        "embedding model ready ({:.2}s)",
        phase.elapsed().as_secs_f64()
    ));

    let registry = Arc::new(SpaceRegistry::new(config.vectors_dir(), &meta.model));

    // content is the default mode, load it now; reasoning/summary load
    // lazily on the first query that wants them
    progress.progress("loading content vectors...");
    let phase = Instant::now();
    match registry.space(SpaceKind::Content)? {
        Some(space) => progress.progress(format!(
            "content vectors loaded: {} ({:.2}s)",
            space.len(),
            phase.elapsed().as_secs_f64()
        )),
        None => progress.progress("no content vectors found"),
    }

    progress.progress(format!(
        "initialization complete ({:.2}s total)",
        started.elapsed().as_secs_f64()
    ));

    Ok(Arc::new(SearchEngine::new(records, tags, registry, embedder)))
}

/// The launcher releases the port just before the grace period, but the
/// OS may take a moment; retry briefly instead of dying on AddrInUse.
async fn bind_with_retry(addr: &str) -> std::io::Result<TcpListener> {
    let mut attempt = 0;
    loop {
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse && attempt < BIND_RETRIES => {
                attempt += 1;
                log::warn!("service port still busy, retry {attempt}/{BIND_RETRIES}");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

async fn shutdown_on_signal(shutdown: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutdown signal received");
    let _ = shutdown.send(true);
}
