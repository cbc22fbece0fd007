//! Hybrid similarity scoring across vector spaces.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::SearchError;

use super::space::{normalize, SpaceRegistry, VectorSpace};
use super::storage::VectorStoreError;
use super::{Mode, SpaceKind};

/// Combines per-space cosine scores into one ranking score per post.
///
/// Policy for partially-vectorized posts: a combined mode folds only the
/// spaces a post actually has a vector in. A post with no vector in any
/// involved space is absent from the ranking entirely.
pub struct HybridScorer {
    registry: Arc<SpaceRegistry>,
}

impl HybridScorer {
    pub fn new(registry: Arc<SpaceRegistry>) -> Self {
        Self { registry }
    }

    /// Modes usable with the spaces currently on disk. Single-space modes
    /// need their space; combined modes need at least two.
    pub fn available_modes(&self) -> Result<Vec<Mode>, SearchError> {
        let mut modes = Vec::new();
        for kind in SpaceKind::ALL {
            if self.registry.is_available(kind).map_err(internal)? {
                modes.push(match kind {
                    SpaceKind::Content => Mode::Content,
                    SpaceKind::Reasoning => Mode::Reasoning,
                    SpaceKind::Summary => Mode::Summary,
                });
            }
        }
        if modes.len() >= 2 {
            modes.extend([Mode::Average, Mode::Maximum, Mode::Minimum]);
        }
        Ok(modes)
    }

    /// Score every post that has a vector in the spaces `mode` involves.
    /// The result is unordered; ranking is the caller's concern.
    pub fn scores(
        &self,
        query: &[f32],
        mode: Mode,
        weights: Option<&[f32]>,
    ) -> Result<Vec<(u64, f32)>, SearchError> {
        validate_weights(mode, weights)?;

        let mut query = query.to_vec();
        if !normalize(&mut query) {
            return Err(SearchError::Internal(
                "embedding model returned a zero vector".into(),
            ));
        }

        if let Some(kind) = mode.single_space() {
            let space = self
                .registry
                .space(kind)
                .map_err(internal)?
                .filter(|s| !s.is_empty())
                .ok_or_else(|| self.unsupported(mode))?;
            return space.dot_scores(&query).map_err(internal);
        }

        // combined modes: fold the scores of every loaded space
        let spaces = self.loaded_spaces()?;
        if spaces.len() < 2 {
            return Err(self.unsupported(mode));
        }

        let mut per_post: HashMap<u64, Vec<(usize, f32)>> = HashMap::new();
        for (slot, space) in &spaces {
            for (id, score) in space.dot_scores(&query).map_err(internal)? {
                per_post.entry(id).or_default().push((*slot, score));
            }
        }

        let folded = per_post
            .into_iter()
            .filter_map(|(id, scores)| fold(mode, &scores, weights).map(|score| (id, score)))
            .collect();

        Ok(folded)
    }

    fn loaded_spaces(&self) -> Result<Vec<(usize, Arc<VectorSpace>)>, SearchError> {
        let mut spaces = Vec::new();
        for (slot, kind) in SpaceKind::ALL.into_iter().enumerate() {
            if let Some(space) = self.registry.space(kind).map_err(internal)? {
                if !space.is_empty() {
                    spaces.push((slot, space));
                }
            }
        }
        Ok(spaces)
    }

    fn unsupported(&self, mode: Mode) -> SearchError {
        let available = self
            .available_modes()
            .map(|modes| modes.iter().map(|m| m.as_str().to_string()).collect())
            .unwrap_or_default();
        SearchError::UnsupportedMode {
            mode: mode.as_str().to_string(),
            available,
        }
    }
}

fn internal(err: VectorStoreError) -> SearchError {
    SearchError::Internal(err.to_string())
}

fn validate_weights(mode: Mode, weights: Option<&[f32]>) -> Result<(), SearchError> {
    let Some(weights) = weights else {
        return Ok(());
    };

    if mode != Mode::Average {
        return Err(SearchError::Validation(format!(
            "weights are only valid with mode 'average', not '{mode}'"
        )));
    }
    if weights.len() != SpaceKind::ALL.len() {
        return Err(SearchError::Validation(format!(
            "weights must have {} entries (one per space), got {}",
            SpaceKind::ALL.len(),
            weights.len()
        )));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(SearchError::Validation(
            "weights must be finite and non-negative".into(),
        ));
    }
    if weights.iter().sum::<f32>() <= 0.0 {
        return Err(SearchError::Validation(
            "weights must not all be zero".into(),
        ));
    }
    Ok(())
}

/// Fold one post's per-space scores. `scores` holds (space slot, score)
/// for the spaces the post has a vector in. Returns None when the
/// weights assign zero mass to every space the post appears in.
fn fold(mode: Mode, scores: &[(usize, f32)], weights: Option<&[f32]>) -> Option<f32> {
    match mode {
        Mode::Average => {
            if let Some(weights) = weights {
                // renormalize over the spaces this post actually has
                let mass: f32 = scores.iter().map(|(slot, _)| weights[*slot]).sum();
                if mass <= 0.0 {
                    return None;
                }
                Some(
                    scores
                        .iter()
                        .map(|(slot, score)| score * weights[*slot] / mass)
                        .sum(),
                )
            } else {
                Some(scores.iter().map(|(_, s)| s).sum::<f32>() / scores.len() as f32)
            }
        }
        Mode::Maximum => scores
            .iter()
            .map(|(_, s)| *s)
            .max_by(f32::total_cmp),
        Mode::Minimum => scores
            .iter()
            .map(|(_, s)| *s)
            .min_by(f32::total_cmp),
        _ => unreachable!("single-space modes never reach fold()"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::storage::{model_id, write_space_file};

    const MODEL: &str = "test-model";

    /// Registry with content + reasoning populated, summary absent.
    /// Post 1 is in both spaces, post 2 only in content.
    fn two_space_registry() -> (tempfile::TempDir, Arc<SpaceRegistry>) {
        let dir = tempfile::tempdir().unwrap();
        let id = model_id(MODEL);

        write_space_file(
            &dir.path().join(SpaceKind::Content.file_name()),
            &id,
            2,
            &[(1, vec![1.0, 0.0]), (2, vec![0.0, 1.0])],
        )
        .unwrap();
        write_space_file(
            &dir.path().join(SpaceKind::Reasoning.file_name()),
            &id,
            2,
            &[(1, vec![0.0, 1.0])],
        )
        .unwrap();

        let registry = Arc::new(SpaceRegistry::new(dir.path().to_path_buf(), MODEL));
        (dir, registry)
    }

    fn score_map(scores: Vec<(u64, f32)>) -> HashMap<u64, f32> {
        scores.into_iter().collect()
    }

    #[test]
    fn test_single_space_scoring() {
        let (_dir, registry) = two_space_registry();
        let scorer = HybridScorer::new(registry);

        let scores = score_map(scorer.scores(&[1.0, 0.0], Mode::Content, None).unwrap());
        assert!((scores[&1] - 1.0).abs() < 1e-6);
        assert!(scores[&2].abs() < 1e-6);
    }

    #[test]
    fn test_unavailable_single_mode() {
        let (_dir, registry) = two_space_registry();
        let scorer = HybridScorer::new(registry);

        let result = scorer.scores(&[1.0, 0.0], Mode::Summary, None);
        match result {
            Err(SearchError::UnsupportedMode { mode, available }) => {
                assert_eq!(mode, "summary");
                assert!(available.contains(&"content".to_string()));
                assert!(available.contains(&"average".to_string()));
            }
            other => panic!("expected UnsupportedMode, got {other:?}"),
        }
    }

    #[test]
    fn test_available_modes() {
        let (_dir, registry) = two_space_registry();
        let scorer = HybridScorer::new(registry);

        let modes = scorer.available_modes().unwrap();
        assert!(modes.contains(&Mode::Content));
        assert!(modes.contains(&Mode::Reasoning));
        assert!(!modes.contains(&Mode::Summary));
        assert!(modes.contains(&Mode::Average));
        assert!(modes.contains(&Mode::Maximum));
        assert!(modes.contains(&Mode::Minimum));
    }

    #[test]
    fn test_combined_modes_need_two_spaces() {
        let dir = tempfile::tempdir().unwrap();
        write_space_file(
            &dir.path().join(SpaceKind::Content.file_name()),
            &model_id(MODEL),
            2,
            &[(1, vec![1.0, 0.0])],
        )
        .unwrap();

        let scorer = HybridScorer::new(Arc::new(SpaceRegistry::new(
            dir.path().to_path_buf(),
            MODEL,
        )));
        assert!(matches!(
            scorer.scores(&[1.0, 0.0], Mode::Average, None),
            Err(SearchError::UnsupportedMode { .. })
        ));
    }

    #[test]
    fn test_average_uses_only_present_spaces() {
        let (_dir, registry) = two_space_registry();
        let scorer = HybridScorer::new(registry);

        // query halfway between the two axes
        let q = [1.0, 1.0];
        let scores = score_map(scorer.scores(&q, Mode::Average, None).unwrap());

        let inv_sqrt2 = 1.0 / 2.0_f32.sqrt();
        // post 1: mean of content (inv_sqrt2) and reasoning (inv_sqrt2)
        assert!((scores[&1] - inv_sqrt2).abs() < 1e-5);
        // post 2 degrades to its only space
        assert!((scores[&2] - inv_sqrt2).abs() < 1e-5);
    }

    #[test]
    fn test_weighted_average_renormalizes() {
        let (_dir, registry) = two_space_registry();
        let scorer = HybridScorer::new(registry);

        // content axis only; reasoning weighted 3x content, summary ignored
        let q = [1.0, 0.0];
        let scores = score_map(
            scorer
                .scores(&q, Mode::Average, Some(&[1.0, 3.0, 0.0]))
                .unwrap(),
        );

        // post 1: content=1.0, reasoning=0.0 -> (1*1 + 3*0) / 4
        assert!((scores[&1] - 0.25).abs() < 1e-5);
        // post 2 has only content; its weight renormalizes to 1
        assert!(scores[&2].abs() < 1e-5);
    }

    #[test]
    fn test_weighted_average_zero_mass_post_absent() {
        let (_dir, registry) = two_space_registry();
        let scorer = HybridScorer::new(registry);

        // all mass on reasoning: post 2 (content only) drops out
        let scores = score_map(
            scorer
                .scores(&[1.0, 0.0], Mode::Average, Some(&[0.0, 1.0, 0.0]))
                .unwrap(),
        );
        assert!(scores.contains_key(&1));
        assert!(!scores.contains_key(&2));
    }

    #[test]
    fn test_maximum_and_minimum() {
        let (_dir, registry) = two_space_registry();
        let scorer = HybridScorer::new(registry.clone());

        let q = [1.0, 0.0];
        // post 1: content=1.0, reasoning=0.0
        let max_scores = score_map(scorer.scores(&q, Mode::Maximum, None).unwrap());
        assert!((max_scores[&1] - 1.0).abs() < 1e-6);

        let min_scores = score_map(scorer.scores(&q, Mode::Minimum, None).unwrap());
        assert!(min_scores[&1].abs() < 1e-6);
    }

    #[test]
    fn test_weight_validation() {
        let (_dir, registry) = two_space_registry();
        let scorer = HybridScorer::new(registry);
        let q = [1.0, 0.0];

        // wrong mode
        assert!(matches!(
            scorer.scores(&q, Mode::Maximum, Some(&[1.0, 1.0, 1.0])),
            Err(SearchError::Validation(_))
        ));
        // wrong length
        assert!(matches!(
            scorer.scores(&q, Mode::Average, Some(&[1.0, 1.0])),
            Err(SearchError::Validation(_))
        ));
        // negative
        assert!(matches!(
            scorer.scores(&q, Mode::Average, Some(&[1.0, -1.0, 1.0])),
            Err(SearchError::Validation(_))
        ));
        // all zero
        assert!(matches!(
            scorer.scores(&q, Mode::Average, Some(&[0.0, 0.0, 0.0])),
            Err(SearchError::Validation(_))
        ));
    }
}
