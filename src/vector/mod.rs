//! Vector spaces and similarity scoring.
//!
//! The archive carries up to three embedding spaces per post — raw
//! content, tagging reasoning, and summary — each persisted as one
//! binary file produced by the offline vectorization pipeline.
//!
//! - `storage`: binary file I/O for the per-space vector files
//! - `space`: a loaded space plus the lazy-loading registry
//! - `scorer`: combines per-space cosine scores into one ranking score
//! - `embeddings`: fastembed wrapper behind the `Embedder` trait

pub mod embeddings;
mod scorer;
mod space;
pub mod storage;

pub use embeddings::{Embedder, FastEmbedder};
pub use scorer::HybridScorer;
pub use space::SpaceRegistry;

use serde::{Deserialize, Serialize};

/// The semantic facets an archive can carry vectors for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpaceKind {
    Content,
    Reasoning,
    Summary,
}

impl SpaceKind {
    pub const ALL: [SpaceKind; 3] = [SpaceKind::Content, SpaceKind::Reasoning, SpaceKind::Summary];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpaceKind::Content => "content",
            SpaceKind::Reasoning => "reasoning",
            SpaceKind::Summary => "summary",
        }
    }

    /// File name of the space inside the vectors directory
    pub fn file_name(&self) -> String {
        format!("{}.bin", self.as_str())
    }
}

impl std::fmt::Display for SpaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SpaceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content" => Ok(SpaceKind::Content),
            "reasoning" => Ok(SpaceKind::Reasoning),
            "summary" => Ok(SpaceKind::Summary),
            other => Err(format!("unknown source '{other}'")),
        }
    }
}

/// Ranking-score strategy. Single-space modes score against one space;
/// the combined modes fold the per-space scores of every space a record
/// appears in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Content,
    Reasoning,
    Summary,
    Average,
    Maximum,
    Minimum,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Content
    }
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Content => "content",
            Mode::Reasoning => "reasoning",
            Mode::Summary => "summary",
            Mode::Average => "average",
            Mode::Maximum => "maximum",
            Mode::Minimum => "minimum",
        }
    }

    /// The single space this mode reads, if it is a single-space mode
    pub fn single_space(&self) -> Option<SpaceKind> {
        match self {
            Mode::Content => Some(SpaceKind::Content),
            Mode::Reasoning => Some(SpaceKind::Reasoning),
            Mode::Summary => Some(SpaceKind::Summary),
            _ => None,
        }
    }

    pub fn is_hybrid(&self) -> bool {
        self.single_space().is_none()
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content" => Ok(Mode::Content),
            "reasoning" => Ok(Mode::Reasoning),
            "summary" => Ok(Mode::Summary),
            "average" => Ok(Mode::Average),
            "maximum" => Ok(Mode::Maximum),
            "minimum" => Ok(Mode::Minimum),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}
