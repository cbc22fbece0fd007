//! Integration tests: full client <-> server exchanges over loopback.

mod rpc_flow;

use std::sync::Arc;
use std::io::Write;

use crate::engine::SearchEngine;
use crate::records::RecordStore;
use crate::tags::TagStore;
use crate::vector::embeddings::StubEmbedder;
use crate::vector::storage::{model_id, write_space_file};
use crate::vector::{Embedder, SpaceKind, SpaceRegistry};

pub const STUB_MODEL: &str = "stub";
pub const STUB_DIMS: usize = 32;

/// Build a complete engine over a temp data directory: archive CSV,
/// content vectors embedded with the stub, no tag sidecar.
pub fn engine_fixture(rows: &[(u64, &str, &str, &str)]) -> (tempfile::TempDir, Arc<SearchEngine>) {
    let dir = tempfile::tempdir().unwrap();

    let csv_path = dir.path().join("archive.csv");
    let mut csv = std::fs::File::create(&csv_path).unwrap();
    for (id, author, timestamp, content) in rows {
        writeln!(
            csv,
            "\"{id}\",\"https://twitter.com/{author}/status/{id}\",\"{timestamp}\",\"{content}\",\"Tweet\"",
        )
        .unwrap();
    }

    let embedder = StubEmbedder { dims: STUB_DIMS };
    let entries: Vec<(u64, Vec<f32>)> = rows
        .iter()
        .map(|(id, _, _, content)| (*id, embedder.embed(content).unwrap()))
        .collect();

    let vectors_dir = dir.path().join("vectors");
    std::fs::create_dir_all(&vectors_dir).unwrap();
    write_space_file(
        &vectors_dir.join(SpaceKind::Content.file_name()),
        &model_id(STUB_MODEL),
        STUB_DIMS,
        &entries,
    )
    .unwrap();

    let records = Arc::new(RecordStore::load(&csv_path).unwrap());
    let tags = Arc::new(TagStore::load(&dir.path().join("tags.jsonl")).unwrap());
    let registry = Arc::new(SpaceRegistry::new(vectors_dir, STUB_MODEL));

    let engine = Arc::new(SearchEngine::new(records, tags, registry, Arc::new(embedder)));
    (dir, engine)
}

/// Uniform rows for chunking tests: `count` posts by one author, unique
/// contents, ascending timestamps.
pub fn uniform_rows(count: u64) -> Vec<(u64, String, String, String)> {
    (1..=count)
        .map(|i| {
            (
                i,
                "author".to_string(),
                format!("2022-01-01 00:{:02}:{:02}", (i / 60) % 60, i % 60),
                format!("post number {i}"),
            )
        })
        .collect()
}

pub fn borrow_rows(rows: &[(u64, String, String, String)]) -> Vec<(u64, &str, &str, &str)> {
    rows.iter()
        .map(|(id, a, t, c)| (*id, a.as_str(), t.as_str(), c.as_str()))
        .collect()
}
