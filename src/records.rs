//! Read-only archive access.
//!
//! Loads the post archive CSV into memory once at startup. Rows carry
//! `post_id, url, timestamp, content, log_type`; the author is recovered
//! from the post URL. Nothing here mutates after load, so the store is
//! shared across connections without locking.

use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

static AUTHOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://(?:www\.)?(?:twitter\.com|x\.com)/([^/]+)/status/\d+")
        .expect("author pattern is valid")
});

/// One post. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: u64,
    pub content: String,
    /// Sortable `YYYY-MM-DD HH:MM:SS` string as found in the archive
    pub timestamp: String,
    pub url: String,
    pub author: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RecordStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("archive is empty: {0}")]
    Empty(String),
}

/// In-memory snapshot of the archive.
pub struct RecordStore {
    posts: HashMap<u64, Record>,
    /// All ids, ascending integer order
    ids: Vec<u64>,
    /// Ids ordered newest first (timestamp desc, id asc on ties)
    ids_by_time_desc: Vec<u64>,
    author_counts: HashMap<String, u64>,
}

impl RecordStore {
    pub fn load(csv_path: &Path) -> Result<Self, RecordStoreError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(csv_path)?;

        let mut posts = HashMap::new();

        for row in reader.records() {
            let row = row?;
            if row.len() < 4 {
                log::warn!("skipping short archive row: {row:?}");
                continue;
            }

            let id = match row[0].trim().parse::<u64>() {
                Ok(id) => id,
                Err(_) => {
                    log::warn!("skipping archive row with bad id: {:?}", &row[0]);
                    continue;
                }
            };

            let url = row[1].trim().to_string();
            let author = extract_author(&url).unwrap_or_default();

            posts.insert(
                id,
                Record {
                    id,
                    url,
                    timestamp: row[2].trim().to_string(),
                    content: unescape_html(&row[3]),
                    author,
                },
            );
        }

        if posts.is_empty() {
            return Err(RecordStoreError::Empty(csv_path.display().to_string()));
        }

        let mut ids: Vec<u64> = posts.keys().copied().collect();
        ids.sort_unstable();

        let mut ids_by_time_desc = ids.clone();
        ids_by_time_desc.sort_by(|a, b| {
            let ta = &posts[a].timestamp;
            let tb = &posts[b].timestamp;
            tb.cmp(ta).then(a.cmp(b))
        });

        let mut author_counts: HashMap<String, u64> = HashMap::new();
        for record in posts.values() {
            if !record.author.is_empty() {
                *author_counts.entry(record.author.clone()).or_insert(0) += 1;
            }
        }

        log::info!(
            "loaded {} posts from {} ({} authors)",
            posts.len(),
            csv_path.display(),
            author_counts.len()
        );

        Ok(Self {
            posts,
            ids,
            ids_by_time_desc,
            author_counts,
        })
    }

    pub fn get(&self, id: u64) -> Option<&Record> {
        self.posts.get(&id)
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// All ids in ascending integer order
    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    /// Ids ordered newest first, id ascending within a timestamp
    pub fn ids_by_time_desc(&self) -> &[u64] {
        &self.ids_by_time_desc
    }

    /// Total posts by the given author, 0 if unknown
    pub fn author_count(&self, author: &str) -> u64 {
        self.author_counts.get(author).copied().unwrap_or(0)
    }

    /// (author, post_count) pairs sorted by count descending
    pub fn author_stats(&self) -> Vec<(String, u64)> {
        let mut stats: Vec<(String, u64)> = self
            .author_counts
            .iter()
            .map(|(author, count)| (author.clone(), *count))
            .collect();
        stats.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        stats
    }

    pub fn author_total(&self) -> usize {
        self.author_counts.len()
    }

    /// Earliest and latest timestamp in the archive
    pub fn date_range(&self) -> (String, String) {
        let mut earliest = String::new();
        let mut latest = String::new();
        for record in self.posts.values() {
            if record.timestamp.is_empty() {
                continue;
            }
            if earliest.is_empty() || record.timestamp < earliest {
                earliest = record.timestamp.clone();
            }
            if latest.is_empty() || record.timestamp > latest {
                latest = record.timestamp.clone();
            }
        }
        (earliest, latest)
    }
}

fn extract_author(url: &str) -> Option<String> {
    AUTHOR_RE
        .captures(url)
        .map(|caps| caps[1].to_string())
}

/// Archive exports store entity-escaped content
fn unescape_html(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
