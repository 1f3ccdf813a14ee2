//! ALS Trainer
//!
//! Alternating least squares over a signed confidence matrix. Each iteration
//! first re-solves every user row with item factors held fixed, then every
//! item row with user factors held fixed. Rows inside a half-step are
//! independent and solved in parallel.
//!
//! The iteration count is the only stopping criterion.

use crate::config::AlsConfig;
use crate::error::{RecError, Result};
use crate::factors::{frobenius_sq, FactorStore};
use crate::interactions::InteractionMatrix;
use crate::solver::solve_row;
use ndarray::parallel::prelude::*;
use ndarray::{Array2, ArrayView2, Axis};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Coarse-grained cancellation flag checked between ALS iterations
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub struct AlsTrainer {
    config: AlsConfig,
}

impl AlsTrainer {
    pub fn new(config: AlsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AlsConfig {
        &self.config
    }

    /// Train a fresh model on `matrix`
    pub fn fit(&self, matrix: &InteractionMatrix) -> Result<FactorStore> {
        self.fit_with_cancel(matrix, &CancellationToken::new())
    }

    /// Train a fresh model, aborting with `Cancelled` if `token` fires
    /// between iterations.
    ///
    /// # Errors
    /// `EmptyMatrix` if the matrix carries no nonzero confidence.
    pub fn fit_with_cancel(
        &self,
        matrix: &InteractionMatrix,
        token: &CancellationToken,
    ) -> Result<FactorStore> {
        if matrix.nnz() == 0 {
            return Err(RecError::EmptyMatrix);
        }

        let start = Instant::now();
        let k = self.config.factors;
        let lambda = self.config.regularization as f64;
        let iterations = self.config.iterations;

        let initial = FactorStore::random(
            matrix.n_users(),
            matrix.n_items(),
            k,
            self.config.regularization,
            iterations,
            self.config.seed,
        )?;
        let mut user_factors = initial.user_factors().to_owned();
        let mut item_factors = initial.item_factors().to_owned();
        let item_view = matrix.transpose();

        tracing::info!(
            users = matrix.n_users(),
            items = matrix.n_items(),
            nnz = matrix.nnz(),
            factors = k,
            regularization = self.config.regularization,
            iterations,
            "Starting ALS fit"
        );

        for iteration in 0..iterations {
            if token.is_cancelled() {
                tracing::warn!(iteration, "ALS fit cancelled");
                return Err(RecError::Cancelled {
                    completed: iteration,
                    requested: iterations,
                });
            }

            solve_half_step(&mut user_factors, matrix, item_factors.view(), lambda)?;
            solve_half_step(&mut item_factors, &item_view, user_factors.view(), lambda)?;

            if tracing::enabled!(tracing::Level::DEBUG) {
                let loss = weighted_loss(matrix, user_factors.view(), item_factors.view());
                tracing::debug!(
                    iteration,
                    loss,
                    user_norm = frobenius_sq(user_factors.view()),
                    item_norm = frobenius_sq(item_factors.view()),
                    "ALS iteration complete"
                );
            }
        }

        tracing::info!("ALS fit finished in {:?}", start.elapsed());

        FactorStore::new(
            user_factors,
            item_factors,
            self.config.regularization,
            iterations,
            self.config.seed,
        )
    }
}

/// Re-solve every row of `target` that has stored entries in `matrix`.
///
/// Rows without entries keep their current values.
fn solve_half_step(
    target: &mut Array2<f32>,
    matrix: &InteractionMatrix,
    fixed: ArrayView2<'_, f32>,
    lambda: f64,
) -> Result<()> {
    target
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .try_for_each(|(row_idx, mut row)| {
            let (indices, confidences) = matrix.row(row_idx);
            if indices.is_empty() {
                return Ok(());
            }
            let solved = solve_row(indices, confidences, fixed, lambda)?;
            row.assign(&solved);
            Ok(())
        })
}

/// Mean confidence-weighted squared error over nonzero entries
pub(crate) fn weighted_loss(
    matrix: &InteractionMatrix,
    user_factors: ArrayView2<'_, f32>,
    item_factors: ArrayView2<'_, f32>,
) -> f32 {
    let mut loss = 0.0;
    let mut count = 0;

    for (user, item, value) in matrix.triplets() {
        if value == 0.0 {
            continue;
        }
        let prediction = user_factors.row(user).dot(&item_factors.row(item));
        loss += value.abs() * (value - prediction).powi(2);
        count += 1;
    }

    if count > 0 {
        loss / count as f32
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interactions::{Interaction, InteractionMatrixBuilder};

    fn small_matrix() -> InteractionMatrix {
        InteractionMatrixBuilder::new()
            .from_triplets(
                3,
                4,
                &[
                    (0, 0, 5.0),
                    (0, 1, 4.0),
                    (1, 0, 5.0),
                    (1, 2, -2.0),
                    (2, 3, 4.0),
                    (2, 1, -1.0),
                ],
            )
            .unwrap()
    }

    #[test]
    fn test_fit_shapes() {
        let trainer = AlsTrainer::new(AlsConfig::new(4, 0.1, 5));
        let store = trainer.fit(&small_matrix()).unwrap();

        assert_eq!(store.rank(), 4);
        assert_eq!(store.user_count(), 3);
        assert_eq!(store.item_count(), 4);
        assert_eq!(store.iterations(), 5);
        assert!(store.user_factors().iter().all(|v| v.is_finite()));
        assert!(store.item_factors().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_fit_is_deterministic_for_seed() {
        let config = AlsConfig::new(3, 0.1, 4).with_seed(99);
        let a = AlsTrainer::new(config.clone()).fit(&small_matrix()).unwrap();
        let b = AlsTrainer::new(config).fit(&small_matrix()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fit_reduces_loss() {
        let matrix = small_matrix();
        let config = AlsConfig::new(4, 0.1, 10);
        let initial = FactorStore::random(3, 4, 4, 0.1, 10, config.seed).unwrap();
        let trained = AlsTrainer::new(config).fit(&matrix).unwrap();

        let before = weighted_loss(&matrix, initial.user_factors(), initial.item_factors());
        let after = weighted_loss(&matrix, trained.user_factors(), trained.item_factors());
        assert!(after < before);
    }

    #[test]
    fn test_fit_reproduces_positive_signal() {
        let store = AlsTrainer::new(AlsConfig::new(4, 0.1, 10))
            .fit(&small_matrix())
            .unwrap();

        let liked = store.user_vector(0).unwrap().dot(&store.item_vector(0).unwrap());
        let disliked = store.user_vector(1).unwrap().dot(&store.item_vector(2).unwrap());
        assert!(liked > 0.0);
        assert!(disliked < 0.0);
    }

    #[test]
    fn test_fit_empty_matrix() {
        let trainer = AlsTrainer::new(AlsConfig::new(2, 0.1, 3));

        let result = trainer.fit(&InteractionMatrix::empty());
        assert!(matches!(result, Err(RecError::EmptyMatrix)));

        // Only zero-confidence entries: still no signal
        let neutral = InteractionMatrixBuilder::new()
            .build(&[Interaction::new(0, 0, 3.0)])
            .unwrap();
        assert!(matches!(trainer.fit(&neutral), Err(RecError::EmptyMatrix)));
    }

    #[test]
    fn test_fit_cancelled() {
        let token = CancellationToken::new();
        token.cancel();

        let result = AlsTrainer::new(AlsConfig::new(2, 0.1, 3)).fit_with_cancel(&small_matrix(), &token);
        assert!(matches!(
            result,
            Err(RecError::Cancelled {
                completed: 0,
                requested: 3
            })
        ));
    }

    #[test]
    fn test_fit_does_not_mutate_matrix() {
        let matrix = small_matrix();
        let copy = matrix.clone();
        AlsTrainer::new(AlsConfig::new(2, 0.1, 2)).fit(&matrix).unwrap();
        assert_eq!(matrix, copy);
    }

    #[test]
    fn test_rows_without_entries_keep_initial_values() {
        // user 1 has no entries
        let matrix = InteractionMatrixBuilder::new()
            .from_triplets(2, 2, &[(0, 0, 5.0)])
            .unwrap();
        let config = AlsConfig::new(2, 0.1, 3);
        let initial = FactorStore::random(2, 2, 2, 0.1, 3, config.seed).unwrap();
        let trained = AlsTrainer::new(config).fit(&matrix).unwrap();

        assert_eq!(trained.user_vector(1), initial.user_vector(1));
        assert_eq!(trained.item_vector(1), initial.item_vector(1));
    }
}
