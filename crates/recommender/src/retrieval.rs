//! Candidate retrieval by exact dot-product scan over all items.

use crate::error::{RecError, Result};
use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub item_id: usize,
    pub score: f32,
}

/// Highest score first, then lowest item id
fn rank_order(a: &ScoredItem, b: &ScoredItem) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.item_id.cmp(&b.item_id))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CandidateRetriever;

impl CandidateRetriever {
    pub fn new() -> Self {
        Self
    }

    /// Top `n` items by dot product with `user_vector`, skipping `exclude_items`.
    ///
    /// Ties are broken by ascending item id. Returns fewer than `n` items when
    /// the catalog runs out.
    ///
    /// # Errors
    /// `InvalidN` if `n <= 0`; `RankMismatch` if the vector length differs from K.
    pub fn top_n(
        &self,
        user_vector: ArrayView1<'_, f32>,
        exclude_items: &HashSet<usize>,
        item_factors: ArrayView2<'_, f32>,
        n: i64,
    ) -> Result<Vec<ScoredItem>> {
        if n <= 0 {
            return Err(RecError::InvalidN(n));
        }
        if user_vector.len() != item_factors.ncols() {
            return Err(RecError::RankMismatch {
                expected: item_factors.ncols(),
                actual: user_vector.len(),
            });
        }
        let n = usize::try_from(n).unwrap_or(usize::MAX);

        let scores = item_factors.dot(&user_vector);
        let mut candidates: Vec<ScoredItem> = scores
            .iter()
            .enumerate()
            .filter(|(item_id, _)| !exclude_items.contains(item_id))
            .map(|(item_id, &score)| ScoredItem { item_id, score })
            .collect();

        if candidates.len() > n {
            candidates.select_nth_unstable_by(n - 1, rank_order);
            candidates.truncate(n);
        }
        candidates.sort_unstable_by(rank_order);

        Ok(candidates)
    }
}
