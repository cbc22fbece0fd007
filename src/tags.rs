//! Optional tag sidecar (tags.jsonl).
//!
//! The offline tagging pipeline leaves one JSON object per line:
//! `{"key": <post id>, "reasoning": "...", "summary": "...", "tags": [...]}`.
//! When present, it supplies the text behind the `reasoning` and `summary`
//! text-search sources. Absence is a valid state.

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct TagEntry {
    pub key: u64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Default)]
pub struct TagStore {
    entries: HashMap<u64, TagEntry>,
}

impl TagStore {
    /// Load the sidecar if it exists. Malformed lines are skipped with a
    /// warning; a missing file yields an empty store.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        if !path.exists() {
            log::info!("no tag sidecar at {}", path.display());
            return Ok(Self::default());
        }

        let file = std::fs::File::open(path)?;
        let mut entries = HashMap::new();

        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TagEntry>(&line) {
                Ok(entry) => {
                    entries.insert(entry.key, entry);
                }
                Err(err) => {
                    log::warn!("skipping malformed tag line {}: {err}", lineno + 1);
                }
            }
        }

        log::info!("loaded tags for {} posts from {}", entries.len(), path.display());
        Ok(Self { entries })
    }

    pub fn get(&self, id: u64) -> Option<&TagEntry> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reasoning text for a post, empty if untagged
    pub fn reasoning(&self, id: u64) -> &str {
        self.get(id).map(|e| e.reasoning.as_str()).unwrap_or("")
    }

    /// Summary text for a post, empty if untagged
    pub fn summary(&self, id: u64) -> &str {
        self.get(id).map(|e| e.summary.as_str()).unwrap_or("")
    }
}
