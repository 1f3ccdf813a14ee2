//! Interaction Matrix Construction
//!
//! Turns raw rating events into a sparse user × item matrix of signed
//! confidences stored in CSR layout.
//!
//! Ratings at or above [`POSITIVE_THRESHOLD`] keep their value as a positive
//! confidence; lower ratings become the negative confidence `-(3 - r)`.
//! Missing ratings are filled with 0 and carry no weight. Duplicate
//! `(user, item)` pairs are collapsed by summing their confidences.

use crate::error::{RecError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Ratings at or above this value are positive feedback
pub const POSITIVE_THRESHOLD: f32 = 4.0;

/// A single raw rating event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: i64,
    pub item_id: i64,
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Interaction {
    pub fn new(user_id: i64, item_id: i64, rating: f32) -> Self {
        Self {
            user_id,
            item_id,
            rating: Some(rating),
            timestamp: None,
        }
    }

    /// Interaction without an explicit rating
    pub fn unrated(user_id: i64, item_id: i64) -> Self {
        Self {
            user_id,
            item_id,
            rating: None,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Signed confidence for a rating.
///
/// `None` and NaN are treated as the fill value 0, which maps to 0.
///
/// The transform is monotone only over ratings above 0: an explicit 0 is
/// read as "no rating" and lands at 0, above the `-(3 - r)` values of
/// ratings in `(0, 3)` (e.g. `confidence(Some(0.5)) == -2.5`).
pub fn confidence(rating: Option<f32>) -> f32 {
    let rating = match rating {
        Some(r) if !r.is_nan() => r,
        _ => 0.0,
    };

    if rating == 0.0 {
        0.0
    } else if rating >= POSITIVE_THRESHOLD {
        rating
    } else {
        -(3.0 - rating)
    }
}

/// Sparse user × item confidence matrix (CSR)
///
/// Entries with confidence 0 may be stored explicitly. They never contribute
/// to a solve but still mark the item as interacted for exclusion.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionMatrix {
    n_users: usize,
    n_items: usize,
    indptr: Vec<usize>,
    indices: Vec<u32>,
    data: Vec<f32>,
}

impl InteractionMatrix {
    pub fn empty() -> Self {
        Self {
            n_users: 0,
            n_items: 0,
            indptr: vec![0],
            indices: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Build from entries sorted by `(row, col)`
    fn from_entries(n_rows: usize, n_cols: usize, entries: BTreeMap<(u32, u32), f32>) -> Self {
        let mut indptr = vec![0usize; n_rows + 1];
        let mut indices = Vec::with_capacity(entries.len());
        let mut data = Vec::with_capacity(entries.len());

        for ((row, col), value) in entries {
            indptr[row as usize + 1] += 1;
            indices.push(col);
            data.push(value);
        }
        for row in 0..n_rows {
            indptr[row + 1] += indptr[row];
        }

        Self {
            n_users: n_rows,
            n_items: n_cols,
            indptr,
            indices,
            data,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_users, self.n_items)
    }

    pub fn n_users(&self) -> usize {
        self.n_users
    }

    pub fn n_items(&self) -> usize {
        self.n_items
    }

    /// Number of stored entries, explicit zeros included
    pub fn stored_entries(&self) -> usize {
        self.data.len()
    }

    /// Number of entries carrying a nonzero confidence
    pub fn nnz(&self) -> usize {
        self.data.iter().filter(|v| **v != 0.0).count()
    }

    /// Column indices and confidences of a row; empty when out of range
    pub fn row(&self, user: usize) -> (&[u32], &[f32]) {
        if user >= self.n_users {
            return (&[], &[]);
        }
        let range = self.indptr[user]..self.indptr[user + 1];
        (&self.indices[range.clone()], &self.data[range])
    }

    pub fn has_entries(&self, user: usize) -> bool {
        !self.row(user).0.is_empty()
    }

    /// Items the user has interacted with, including zero-confidence entries
    pub fn interacted_items(&self, user: usize) -> HashSet<usize> {
        self.row(user).0.iter().map(|&i| i as usize).collect()
    }

    pub fn get(&self, user: usize, item: usize) -> f32 {
        let (cols, vals) = self.row(user);
        u32::try_from(item)
            .ok()
            .and_then(|item| cols.binary_search(&item).ok())
            .map(|pos| vals[pos])
            .unwrap_or(0.0)
    }

    /// All stored entries as `(user, item, confidence)`, row-major
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        (0..self.n_users).flat_map(move |user| {
            let (cols, vals) = self.row(user);
            cols.iter()
                .zip(vals.iter())
                .map(move |(&item, &value)| (user, item as usize, value))
        })
    }

    /// Item × user view of the same entries
    pub fn transpose(&self) -> InteractionMatrix {
        let entries: BTreeMap<(u32, u32), f32> = self
            .triplets()
            .map(|(user, item, value)| ((item as u32, user as u32), value))
            .collect();
        Self::from_entries(self.n_items, self.n_users, entries)
    }
}

impl Default for InteractionMatrix {
    fn default() -> Self {
        Self::empty()
    }
}

/// Builds [`InteractionMatrix`] values from raw interactions.
///
/// Stateless; safe to share across threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct InteractionMatrixBuilder;

impl InteractionMatrixBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, interactions: &[Interaction]) -> Result<InteractionMatrix> {
        self.extend(&InteractionMatrix::empty(), interactions)
    }

    /// Add interactions on top of an existing matrix.
    ///
    /// Because duplicates are summed, the result equals building from the
    /// concatenation of the original interactions and `interactions`.
    pub fn extend(
        &self,
        base: &InteractionMatrix,
        interactions: &[Interaction],
    ) -> Result<InteractionMatrix> {
        let mut entries: BTreeMap<(u32, u32), f32> = base
            .triplets()
            .map(|(user, item, value)| ((user as u32, item as u32), value))
            .collect();
        let mut n_users = base.n_users();
        let mut n_items = base.n_items();

        for (index, interaction) in interactions.iter().enumerate() {
            let user = to_index(index, "user_id", interaction.user_id)?;
            let item = to_index(index, "item_id", interaction.item_id)?;

            if interaction.rating.map(f32::is_infinite).unwrap_or(false) {
                return Err(RecError::invalid_interaction(
                    index,
                    format!("rating {:?} is not finite", interaction.rating),
                ));
            }

            *entries.entry((user, item)).or_insert(0.0) += confidence(interaction.rating);
            n_users = n_users.max(user as usize + 1);
            n_items = n_items.max(item as usize + 1);
        }

        let matrix = InteractionMatrix::from_entries(n_users, n_items, entries);
        tracing::debug!(
            users = matrix.n_users(),
            items = matrix.n_items(),
            stored = matrix.stored_entries(),
            added = interactions.len(),
            "Built interaction matrix"
        );
        Ok(matrix)
    }

    /// Build directly from `(user, item, confidence)` triples, summing duplicates
    pub fn from_triplets(
        &self,
        n_users: usize,
        n_items: usize,
        triplets: &[(usize, usize, f32)],
    ) -> Result<InteractionMatrix> {
        let mut entries = BTreeMap::new();

        for (index, &(user, item, value)) in triplets.iter().enumerate() {
            if user >= n_users || item >= n_items {
                return Err(RecError::invalid_interaction(
                    index,
                    format!(
                        "({}, {}) outside matrix shape {}x{}",
                        user, item, n_users, n_items
                    ),
                ));
            }
            if !value.is_finite() {
                return Err(RecError::invalid_interaction(
                    index,
                    format!("confidence {} is not finite", value),
                ));
            }
            let user = to_index(index, "user_id", user as i64)?;
            let item = to_index(index, "item_id", item as i64)?;
            *entries.entry((user, item)).or_insert(0.0) += value;
        }

        Ok(InteractionMatrix::from_entries(n_users, n_items, entries))
    }
}

fn to_index(index: usize, field: &str, id: i64) -> Result<u32> {
    if id < 0 {
        return Err(RecError::invalid_interaction(
            index,
            format!("negative {} {}", field, id),
        ));
    }
    u32::try_from(id).map_err(|_| {
        RecError::invalid_interaction(index, format!("{} {} exceeds index range", field, id))
    })
}
