//! Per-request search settings.
//!
//! A `SearchSettings` is built from the request payload, validated once,
//! and never shared across requests. Serde shapes match the wire format
//! exactly; runtime-only data (author post counts) never crosses the wire.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::errors::SearchError;

pub const TOP_K_MIN: usize = 1;
pub const TOP_K_MAX: usize = 100;
pub const DEFAULT_TOP_K: usize = 10;

/// Author allow/deny plus post-count thresholds.
///
/// `includes` and `excludes` are mutually exclusive; when a payload carries
/// both, `includes` wins. The thresholds compose with either.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub includes: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excludes: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_posts: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_posts: Option<u64>,
}

impl UserFilter {
    pub fn allows(&self, author: &str, post_count: u64) -> bool {
        if let Some(includes) = &self.includes {
            if !includes.iter().any(|u| u == author) {
                return false;
            }
        } else if let Some(excludes) = &self.excludes {
            if excludes.iter().any(|u| u == author) {
                return false;
            }
        }

        if let Some(min) = self.min_posts {
            if post_count < min {
                return false;
            }
        }
        if let Some(max) = self.max_posts {
            if post_count > max {
                return false;
            }
        }

        true
    }
}

/// Inclusive timestamp bounds. Bounds are plain strings on the wire; they
/// are resolved once per search call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

impl DateFilter {
    /// Parse the bounds. A malformed bound string is dropped (fail-open)
    /// rather than failing the request; that keeps a typo from turning a
    /// search into an error, at the cost of a wider result set.
    pub fn resolve(&self) -> DateBounds {
        let parse_bound = |bound: &Option<String>, which: &str| {
            bound.as_deref().and_then(|raw| {
                let parsed = parse_timestamp(raw);
                if parsed.is_none() {
                    log::warn!("ignoring malformed date bound {which}={raw:?}");
                }
                parsed
            })
        };

        DateBounds {
            from: parse_bound(&self.from, "from"),
            to: parse_bound(&self.to, "to"),
        }
    }
}

/// Resolved, ready-to-compare bounds
#[derive(Debug, Clone, Copy, Default)]
pub struct DateBounds {
    pub from: Option<NaiveDateTime>,
    pub to: Option<NaiveDateTime>,
}

impl DateBounds {
    /// An unparseable record timestamp passes (fail-open, matching the
    /// bound handling above).
    pub fn allows(&self, timestamp: &str) -> bool {
        if self.from.is_none() && self.to.is_none() {
            return true;
        }

        let Some(ts) = parse_timestamp(timestamp) else {
            return true;
        };

        if let Some(from) = self.from {
            if ts < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if ts > to {
                return false;
            }
        }
        true
    }
}

/// Accepts `YYYY-MM-DD HH:MM:SS` or a bare `YYYY-MM-DD` (midnight)
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default)]
    pub user_filter: UserFilter,

    #[serde(default)]
    pub date_filter: DateFilter,

    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            user_filter: UserFilter::default(),
            date_filter: DateFilter::default(),
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl SearchSettings {
    /// Out-of-range top_k is a hard error, never a silent clamp.
    pub fn validate(&self) -> Result<(), SearchError> {
        if !(TOP_K_MIN..=TOP_K_MAX).contains(&self.top_k) {
            return Err(SearchError::Validation(format!(
                "top_k must be between {TOP_K_MIN} and {TOP_K_MAX}, got {}",
                self.top_k
            )));
        }
        Ok(())
    }
}
