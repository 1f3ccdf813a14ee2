//! Second-stage reranking
//!
//! The reranker is a pretrained classifier consumed as a black box: it takes
//! one feature vector per (user, candidate item) pair and returns a relevance
//! probability. Feature assembly belongs to the caller and is passed in as a
//! closure. Failures are surfaced, never swallowed.

use crate::error::{RecError, Result};
use crate::retrieval::ScoredItem;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Black-box relevance scorer
pub trait Reranker: Send + Sync {
    /// Relevance probability for one candidate's features.
    ///
    /// Implementations report an unreachable or failing model as
    /// `RecError::ScoringUnavailable`.
    fn score(&self, features: &[f32]) -> Result<f32>;
}

impl<F> Reranker for F
where
    F: Fn(&[f32]) -> Result<f32> + Send + Sync,
{
    fn score(&self, features: &[f32]) -> Result<f32> {
        self(features)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankedItem {
    pub item_id: usize,
    pub retrieval_score: f32,
    pub relevance: f32,
}

/// Score every candidate with `reranker` and order by relevance.
///
/// Ties keep ascending item id order.
pub fn rerank<R, F>(candidates: &[ScoredItem], reranker: &R, features: F) -> Result<Vec<RerankedItem>>
where
    R: Reranker + ?Sized,
    F: Fn(&ScoredItem) -> Result<Vec<f32>>,
{
    let mut reranked = candidates
        .iter()
        .map(|candidate| {
            let feature_vector = features(candidate)?;
            let relevance = reranker.score(&feature_vector)?;
            if !relevance.is_finite() {
                return Err(RecError::ScoringUnavailable(format!(
                    "non-finite relevance {} for item {}",
                    relevance, candidate.item_id
                )));
            }
            Ok(RerankedItem {
                item_id: candidate.item_id,
                retrieval_score: candidate.score,
                relevance,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    reranked.sort_by(|a, b| match b.relevance.total_cmp(&a.relevance) {
        Ordering::Equal => a.item_id.cmp(&b.item_id),
        other => other,
    });

    Ok(reranked)
}
