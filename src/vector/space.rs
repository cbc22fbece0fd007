//! Loaded vector spaces and the lazy-loading registry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use rayon::prelude::*;

use super::storage::{model_id, read_space_file, VectorStoreError};
use super::SpaceKind;

/// One fully-loaded vector space. Vectors are L2-normalized at load time
/// so cosine similarity reduces to a dot product.
pub struct VectorSpace {
    kind: SpaceKind,
    dimensions: usize,
    /// Post ids, ascending integer order
    ids: Vec<u64>,
    index_of: HashMap<u64, usize>,
    /// Row-major flat storage, one row per id in `ids` order
    vectors: Vec<f32>,
}

impl VectorSpace {
    pub fn from_entries(
        kind: SpaceKind,
        dimensions: usize,
        entries: Vec<(u64, Vec<f32>)>,
    ) -> Self {
        let mut kept: Vec<(u64, Vec<f32>)> = entries
            .into_iter()
            .filter_map(|(id, mut vector)| {
                let norm = l2_norm(&vector);
                if norm < f32::EPSILON {
                    log::warn!("skipping zero-norm {kind} vector for post {id}");
                    return None;
                }
                for value in &mut vector {
                    *value /= norm;
                }
                Some((id, vector))
            })
            .collect();

        // ids sort as integers, nothing else
        kept.sort_by_key(|(id, _)| *id);

        let mut ids = Vec::with_capacity(kept.len());
        let mut index_of = HashMap::with_capacity(kept.len());
        let mut vectors = Vec::with_capacity(kept.len() * dimensions);

        for (row, (id, vector)) in kept.into_iter().enumerate() {
            ids.push(id);
            index_of.insert(id, row);
            vectors.extend_from_slice(&vector);
        }

        Self {
            kind,
            dimensions,
            ids,
            index_of,
            vectors,
        }
    }

    pub fn kind(&self) -> SpaceKind {
        self.kind
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// All post ids in this space, ascending
    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    pub fn contains(&self, id: u64) -> bool {
        self.index_of.contains_key(&id)
    }

    pub fn get(&self, id: u64) -> Option<&[f32]> {
        self.index_of.get(&id).map(|&row| self.row(row))
    }

    fn row(&self, row: usize) -> &[f32] {
        &self.vectors[row * self.dimensions..(row + 1) * self.dimensions]
    }

    /// Cosine scores of every vector in this space against a normalized
    /// query vector. Order matches `ids()`.
    pub fn dot_scores(&self, query: &[f32]) -> Result<Vec<(u64, f32)>, VectorStoreError> {
        if query.len() != self.dimensions {
            return Err(VectorStoreError::InvalidFormat(format!(
                "query has {} dimensions, {} space has {}",
                query.len(),
                self.kind,
                self.dimensions
            )));
        }

        Ok(self
            .ids
            .par_iter()
            .enumerate()
            .map(|(row, &id)| (id, dot(self.row(row), query)))
            .collect())
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Normalize a query vector in place. Returns false for a zero vector.
pub(super) fn normalize(v: &mut [f32]) -> bool {
    let norm = l2_norm(v);
    if norm < f32::EPSILON {
        return false;
    }
    for value in v.iter_mut() {
        *value /= norm;
    }
    true
}

/// Lazily-loaded set of the configured spaces.
///
/// A space is loaded at most once; concurrent first-uses serialize on the
/// slot's write lock and the late arrivals find the loaded state. A load
/// failure is not cached, so a transient I/O error is retried on the next
/// request.
pub struct SpaceRegistry {
    vectors_dir: PathBuf,
    model_id: [u8; 32],
    slots: [RwLock<Option<Option<Arc<VectorSpace>>>>; SpaceKind::ALL.len()],
}

impl SpaceRegistry {
    pub fn new(vectors_dir: PathBuf, model_name: &str) -> Self {
        Self {
            vectors_dir,
            model_id: model_id(model_name),
            slots: Default::default(),
        }
    }

    /// Get a space, loading its file on first use. `Ok(None)` means the
    /// archive has no vectors for this facet — a valid state, not an error.
    pub fn space(&self, kind: SpaceKind) -> Result<Option<Arc<VectorSpace>>, VectorStoreError> {
        let slot = &self.slots[slot_index(kind)];

        if let Some(state) = slot.read().unwrap_or_else(|e| e.into_inner()).as_ref() {
            return Ok(state.clone());
        }

        let mut guard = slot.write().unwrap_or_else(|e| e.into_inner());
        // another task may have loaded while we waited for the lock
        if let Some(state) = guard.as_ref() {
            return Ok(state.clone());
        }

        let state = self.load(kind)?;
        *guard = Some(state.clone());
        Ok(state)
    }

    /// Whether the space exists and holds at least one vector
    pub fn is_available(&self, kind: SpaceKind) -> Result<bool, VectorStoreError> {
        Ok(self
            .space(kind)?
            .map(|space| !space.is_empty())
            .unwrap_or(false))
    }

    fn load(&self, kind: SpaceKind) -> Result<Option<Arc<VectorSpace>>, VectorStoreError> {
        let path = self.vectors_dir.join(kind.file_name());
        if !path.exists() {
            log::info!("no {kind} vectors at {}", path.display());
            return Ok(None);
        }

        let (dimensions, entries) = read_space_file(&path, &self.model_id)?;
        let space = VectorSpace::from_entries(kind, dimensions, entries);
        log::info!(
            "loaded {} {kind} vectors ({} dims) from {}",
            space.len(),
            dimensions,
            path.display()
        );

        if space.is_empty() {
            return Ok(None);
        }
        Ok(Some(Arc::new(space)))
    }
}

fn slot_index(kind: SpaceKind) -> usize {
    match kind {
        SpaceKind::Content => 0,
        SpaceKind::Reasoning => 1,
        SpaceKind::Summary => 2,
    }
}
