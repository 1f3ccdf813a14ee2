//! Incremental Updater
//!
//! Re-solves the factor rows of selected users against the current, frozen
//! item factors. This is a single user-side ALS step: item factors are never
//! touched and neither is any user outside the target set.

use crate::error::{RecError, Result};
use crate::factors::FactorStore;
use crate::interactions::InteractionMatrix;
use crate::solver::solve_row;
use ndarray::Array1;
use std::collections::BTreeSet;

/// Solved rows waiting to be committed to a [`FactorStore`]
pub type SolvedRows = Vec<(usize, Array1<f32>)>;

#[derive(Debug, Clone, Copy, Default)]
pub struct IncrementalUpdater;

impl IncrementalUpdater {
    pub fn new() -> Self {
        Self
    }

    /// Recompute the rows of `target_users` in place.
    ///
    /// Grows the store first when a target user or a matrix item lies beyond
    /// its capacity. On any error `store` is left unchanged.
    ///
    /// # Errors
    /// `UnknownUserInMatrix` if a target user has no stored entries in `matrix`.
    pub fn partial_fit(
        &self,
        store: &mut FactorStore,
        target_users: &BTreeSet<usize>,
        matrix: &InteractionMatrix,
    ) -> Result<()> {
        self.validate(target_users, matrix)?;

        if self.needs_resize(store, target_users, matrix) {
            let mut staged = store.clone();
            let (users, items) = self.required_capacity(store, target_users, matrix);
            staged.resize(users, items);
            let rows = self.solve_rows(&staged, target_users, matrix)?;
            staged.commit_user_rows(rows)?;
            *store = staged;
        } else {
            let rows = self.solve_rows(store, target_users, matrix)?;
            store.commit_user_rows(rows)?;
        }

        tracing::debug!(
            users = target_users.len(),
            version = store.version(),
            "Partial fit committed"
        );
        Ok(())
    }

    /// Every target user must have at least one stored entry
    pub fn validate(&self, target_users: &BTreeSet<usize>, matrix: &InteractionMatrix) -> Result<()> {
        match target_users.iter().find(|&&user| !matrix.has_entries(user)) {
            Some(&user) => Err(RecError::UnknownUserInMatrix(user)),
            None => Ok(()),
        }
    }

    /// Whether `store` must grow before the target rows can be solved
    pub fn needs_resize(
        &self,
        store: &FactorStore,
        target_users: &BTreeSet<usize>,
        matrix: &InteractionMatrix,
    ) -> bool {
        let (users, items) = self.required_capacity(store, target_users, matrix);
        users > store.user_count() || items > store.item_count()
    }

    fn required_capacity(
        &self,
        store: &FactorStore,
        target_users: &BTreeSet<usize>,
        matrix: &InteractionMatrix,
    ) -> (usize, usize) {
        let users = target_users
            .iter()
            .next_back()
            .map(|&max| max + 1)
            .unwrap_or(0)
            .max(store.user_count());
        let items = matrix.n_items().max(store.item_count());
        (users, items)
    }

    /// Solve the target rows without mutating anything.
    ///
    /// `store` must already have capacity for the matrix items.
    pub fn solve_rows(
        &self,
        store: &FactorStore,
        target_users: &BTreeSet<usize>,
        matrix: &InteractionMatrix,
    ) -> Result<SolvedRows> {
        self.validate(target_users, matrix)?;
        if matrix.n_items() > store.item_count() {
            return Err(RecError::Solver(format!(
                "matrix has {} items but store holds {}",
                matrix.n_items(),
                store.item_count()
            )));
        }

        let lambda = store.regularization() as f64;
        let item_factors = store.item_factors();

        target_users
            .iter()
            .map(|&user| {
                let (indices, confidences) = matrix.row(user);
                let row = solve_row(indices, confidences, item_factors, lambda)?;
                Ok((user, row))
            })
            .collect()
    }
}
