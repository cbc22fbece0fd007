//! The search engine: ranking, filtering, deduplication.
//!
//! Stateless across calls — every search gets its own dedup tracker and
//! resolved filters, so concurrent requests share nothing mutable.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::SearchError;
use crate::query::{parse_terms, Query, Terms};
use crate::records::RecordStore;
use crate::settings::SearchSettings;
use crate::tags::TagStore;
use crate::vector::{Embedder, HybridScorer, Mode, SpaceKind, SpaceRegistry};

/// One accepted search result. Rank is 1-based and assigned after all
/// filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredResult {
    pub rank: usize,
    pub record_id: u64,
    pub score: f32,
    pub content: String,
    pub timestamp: String,
    pub url: String,
    pub author: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub total_posts: usize,
    pub total_authors: usize,
    pub earliest: String,
    pub latest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorStat {
    pub author: String,
    pub post_count: u64,
}

pub struct SearchEngine {
    records: Arc<RecordStore>,
    tags: Arc<TagStore>,
    scorer: HybridScorer,
    embedder: Arc<dyn Embedder>,
}

impl SearchEngine {
    pub fn new(
        records: Arc<RecordStore>,
        tags: Arc<TagStore>,
        registry: Arc<SpaceRegistry>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            records,
            tags,
            scorer: HybridScorer::new(registry),
            embedder,
        }
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn available_modes(&self) -> Result<Vec<Mode>, SearchError> {
        self.scorer.available_modes()
    }

    /// Filtered, deduplicated, ranked search. The candidate walk stops as
    /// soon as `settings.top_k` results are accepted.
    pub fn search(
        &self,
        raw_query: &str,
        settings: &SearchSettings,
        mode: Mode,
        weights: Option<&[f32]>,
    ) -> Result<Vec<ScoredResult>, SearchError> {
        settings.validate()?;
        let query = Query::parse(raw_query)?;
        let bounds = settings.date_filter.resolve();

        // Build the candidate stream: (id, score) in ranking order.
        let (candidates, compound_filter): (Box<dyn Iterator<Item = (u64, f32)> + '_>, _) =
            if let Some(seed) = &query.vector {
                let ranked = self.ranked_scores(seed, mode, weights)?;
                (Box::new(ranked.into_iter()), query.text.clone())
            } else {
                // text-only: hybrid scores don't exist, the mode names the
                // text source instead
                let source = mode.single_space().ok_or_else(|| {
                    SearchError::Validation(format!(
                        "hybrid mode '{mode}' requires a vector query"
                    ))
                })?;
                let terms = query.text.clone().ok_or_else(|| {
                    SearchError::Internal("parsed query has neither part".into())
                })?;
                let iter = self
                    .records
                    .ids_by_time_desc()
                    .iter()
                    .filter(move |&&id| {
                        self.source_text_matches(id, source, &terms)
                    })
                    .map(|&id| (id, 1.0));
                (Box::new(iter), None)
            };

        // Accept loop. Dedup key is (author, trimmed content); if a later
        // candidate duplicates an accepted one with a strictly earlier
        // timestamp it takes over that slot, so the earliest version of a
        // post is the one that survives.
        let mut accepted: Vec<(u64, f32)> = Vec::new();
        let mut seen: HashMap<(String, String), usize> = HashMap::new();

        for (id, score) in candidates {
            let Some(record) = self.records.get(id) else {
                continue;
            };

            if let Some(terms) = &compound_filter {
                if !terms.matches(&record.content.to_lowercase()) {
                    continue;
                }
            }

            let post_count = self.records.author_count(&record.author);
            if !settings.user_filter.allows(&record.author, post_count) {
                continue;
            }

            if !bounds.allows(&record.timestamp) {
                continue;
            }

            let key = (record.author.clone(), record.content.trim().to_string());
            if let Some(&slot) = seen.get(&key) {
                let held = self
                    .records
                    .get(accepted[slot].0)
                    .map(|r| r.timestamp.as_str())
                    .unwrap_or("");
                if record.timestamp.as_str() < held {
                    accepted[slot] = (id, score);
                }
                continue;
            }

            seen.insert(key, accepted.len());
            accepted.push((id, score));

            if accepted.len() >= settings.top_k {
                break;
            }
        }

        Ok(self.materialize(accepted))
    }

    /// Raw similarity ranking with no user/date filtering and no dedup.
    /// `top_k = None` walks the entire candidate space — this is the one
    /// path that produces oversized, chunked responses.
    pub fn vector_search(
        &self,
        raw_query: &str,
        mode: Mode,
        weights: Option<&[f32]>,
        top_k: Option<usize>,
    ) -> Result<Vec<(u64, f32)>, SearchError> {
        if top_k == Some(0) {
            return Err(SearchError::Validation("top_k must be at least 1".into()));
        }

        let query = Query::parse(raw_query)?;
        let Some(seed) = &query.vector else {
            return Err(SearchError::Validation(
                "vector query is empty: vector_search requires a vector query part".into(),
            ));
        };

        let ranked = self.ranked_scores(seed, mode, weights)?;

        let filtered = ranked.into_iter().filter(|(id, _)| match &query.text {
            Some(terms) => self
                .records
                .get(*id)
                .map(|r| terms.matches(&r.content.to_lowercase()))
                .unwrap_or(false),
            None => true,
        });

        Ok(match top_k {
            Some(k) => filtered.take(k).collect(),
            None => filtered.collect(),
        })
    }

    /// Plain text search over a source, newest first.
    pub fn text_search(
        &self,
        raw_terms: &str,
        limit: usize,
        source: SpaceKind,
    ) -> Result<Vec<ScoredResult>, SearchError> {
        let terms = parse_terms(raw_terms);
        if terms.is_empty() {
            return Err(SearchError::Validation("search terms are required".into()));
        }

        let accepted: Vec<(u64, f32)> = self
            .records
            .ids_by_time_desc()
            .iter()
            .filter(|&&id| self.source_text_matches(id, source, &terms))
            .map(|&id| (id, 1.0))
            .take(limit)
            .collect();

        Ok(self.materialize(accepted))
    }

    pub fn database_stats(&self) -> DatabaseStats {
        let (earliest, latest) = self.records.date_range();
        DatabaseStats {
            total_posts: self.records.len(),
            total_authors: self.records.author_total(),
            earliest,
            latest,
        }
    }

    pub fn author_stats(&self, limit: usize) -> Vec<AuthorStat> {
        self.records
            .author_stats()
            .into_iter()
            .take(limit)
            .map(|(author, post_count)| AuthorStat { author, post_count })
            .collect()
    }

    /// Embed the seed and rank every scored id: score descending, then
    /// timestamp ascending, then id ascending. The timestamp tie-break is
    /// what makes identical-content duplicates (equal vectors, equal
    /// scores) surface earliest-first.
    fn ranked_scores(
        &self,
        seed: &str,
        mode: Mode,
        weights: Option<&[f32]>,
    ) -> Result<Vec<(u64, f32)>, SearchError> {
        let query_vector = self
            .embedder
            .embed(seed)
            .map_err(|err| SearchError::Internal(format!("embedding failed: {err}")))?;

        let mut scores = self.scorer.scores(&query_vector, mode, weights)?;

        scores.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| self.timestamp_of(a.0).cmp(self.timestamp_of(b.0)))
                .then(a.0.cmp(&b.0))
        });

        Ok(scores)
    }

    fn timestamp_of(&self, id: u64) -> &str {
        self.records
            .get(id)
            .map(|r| r.timestamp.as_str())
            .unwrap_or("")
    }

    fn source_text_matches(&self, id: u64, source: SpaceKind, terms: &Terms) -> bool {
        match source {
            SpaceKind::Content => self
                .records
                .get(id)
                .map(|r| terms.matches(&r.content.to_lowercase()))
                .unwrap_or(false),
            SpaceKind::Reasoning => terms.matches(&self.tags.reasoning(id).to_lowercase()),
            SpaceKind::Summary => terms.matches(&self.tags.summary(id).to_lowercase()),
        }
    }

    fn materialize(&self, accepted: Vec<(u64, f32)>) -> Vec<ScoredResult> {
        accepted
            .into_iter()
            .enumerate()
            .filter_map(|(i, (id, score))| {
                self.records.get(id).map(|record| ScoredResult {
                    rank: i + 1,
                    record_id: id,
                    score,
                    content: record.content.clone(),
                    timestamp: record.timestamp.clone(),
                    url: record.url.clone(),
                    author: record.author.clone(),
                })
            })
            .collect()
    }
}
