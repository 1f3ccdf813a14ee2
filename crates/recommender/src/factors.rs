//! Factor Store
//!
//! Owns the dense user and item factor matrices of a trained ALS model and
//! persists them as a self-describing bincode artifact:
//! - magic tag and format version
//! - rank K, regularization, iteration count, version and seed
//! - user and item matrices as shape + row-major f32 data
//!
//! Both matrices always share the same rank K.

use crate::error::{RecError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Instant;

const MODEL_MAGIC: [u8; 8] = *b"BRALSMDL";
const FORMAT_VERSION: u32 = 1;

/// Half-width of the uniform range used for freshly initialized rows
pub const INIT_SCALE: f32 = 0.1;

/// Dense user/item embeddings plus the hyperparameters that produced them
#[derive(Debug, Clone, PartialEq)]
pub struct FactorStore {
    user_factors: Array2<f32>,
    item_factors: Array2<f32>,
    regularization: f32,
    iterations: usize,
    seed: u64,
    version: u64,
    generation: u64,
}

impl FactorStore {
    /// Wrap trained factor matrices.
    ///
    /// # Errors
    /// `RankMismatch` if the matrices disagree on K, `CorruptModel` if K is 0.
    pub fn new(
        user_factors: Array2<f32>,
        item_factors: Array2<f32>,
        regularization: f32,
        iterations: usize,
        seed: u64,
    ) -> Result<Self> {
        let store = Self {
            user_factors,
            item_factors,
            regularization,
            iterations,
            seed,
            version: 1,
            generation: 0,
        };
        store.check_rank()?;
        Ok(store)
    }

    /// Randomly initialized store, as used at the start of a fit
    pub fn random(
        n_users: usize,
        n_items: usize,
        rank: usize,
        regularization: f32,
        iterations: usize,
        seed: u64,
    ) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let user_factors = random_rows(&mut rng, n_users, rank);
        let item_factors = random_rows(&mut rng, n_items, rank);
        Self::new(user_factors, item_factors, regularization, iterations, seed)
    }

    fn check_rank(&self) -> Result<()> {
        let rank = self.user_factors.ncols();
        if rank == 0 {
            return Err(RecError::CorruptModel("rank must be positive".to_string()));
        }
        if self.item_factors.ncols() != rank {
            return Err(RecError::RankMismatch {
                expected: rank,
                actual: self.item_factors.ncols(),
            });
        }
        Ok(())
    }

    pub fn rank(&self) -> usize {
        self.user_factors.ncols()
    }

    pub fn user_count(&self) -> usize {
        self.user_factors.nrows()
    }

    pub fn item_count(&self) -> usize {
        self.item_factors.nrows()
    }

    pub fn regularization(&self) -> f32 {
        self.regularization
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Bumped by every mutation (resize, committed partial fit)
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Identifies which full fit or load produced this store
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    pub fn user_factors(&self) -> ArrayView2<'_, f32> {
        self.user_factors.view()
    }

    pub fn item_factors(&self) -> ArrayView2<'_, f32> {
        self.item_factors.view()
    }

    pub fn user_vector(&self, user: usize) -> Option<ArrayView1<'_, f32>> {
        (user < self.user_count()).then(|| self.user_factors.row(user))
    }

    pub fn item_vector(&self, item: usize) -> Option<ArrayView1<'_, f32>> {
        (item < self.item_count()).then(|| self.item_factors.row(item))
    }

    /// Grow the matrices to at least the given row counts.
    ///
    /// New rows are drawn from a RNG seeded with the store seed and the old
    /// row count, so growth is reproducible. Existing rows are never touched
    /// and the store never shrinks. Returns whether anything grew.
    pub fn resize(&mut self, new_user_count: usize, new_item_count: usize) -> bool {
        let rank = self.rank();
        let mut grew = false;

        if new_user_count > self.user_count() {
            let old = self.user_count();
            let mut rng = StdRng::seed_from_u64(self.seed ^ (0x5553_4552u64 << 32) ^ old as u64);
            let rows = random_rows(&mut rng, new_user_count - old, rank);
            append_rows(&mut self.user_factors, rows);
            grew = true;
        }

        if new_item_count > self.item_count() {
            let old = self.item_count();
            let mut rng = StdRng::seed_from_u64(self.seed ^ (0x4954_454Du64 << 32) ^ old as u64);
            let rows = random_rows(&mut rng, new_item_count - old, rank);
            append_rows(&mut self.item_factors, rows);
            grew = true;
        }

        if grew {
            self.version += 1;
            tracing::debug!(
                users = self.user_count(),
                items = self.item_count(),
                "Resized factor store"
            );
        }
        grew
    }

    /// Overwrite user rows with freshly solved vectors.
    ///
    /// All rows are validated before any is written.
    pub fn commit_user_rows(&mut self, rows: Vec<(usize, Array1<f32>)>) -> Result<()> {
        for (user, row) in &rows {
            if *user >= self.user_count() {
                return Err(RecError::UnknownUser(*user));
            }
            if row.len() != self.rank() {
                return Err(RecError::RankMismatch {
                    expected: self.rank(),
                    actual: row.len(),
                });
            }
        }

        for (user, row) in rows {
            self.user_factors.row_mut(user).assign(&row);
        }
        self.version += 1;
        Ok(())
    }

    /// Persist the model to `path`.
    ///
    /// Writes to a sibling temp file first and renames it into place.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let start = Instant::now();

        let serializable = SerializableModel::from_store(self);
        let bytes = bincode::serialize(&serializable)
            .map_err(|e| RecError::CorruptModel(format!("failed to serialize model: {}", e)))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, &bytes)?;
        fs::rename(&tmp_path, path)?;

        tracing::info!(
            path = %path.display(),
            bytes = bytes.len(),
            rank = self.rank(),
            users = self.user_count(),
            items = self.item_count(),
            "Saved ALS model in {:?}",
            start.elapsed()
        );
        Ok(())
    }

    /// Load a model previously written by [`FactorStore::save`].
    ///
    /// # Errors
    /// `CorruptModel` if the file is truncated, has an unknown header, or
    /// holds inconsistent shapes; `Io` if it cannot be read.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;

        let serializable: SerializableModel = bincode::deserialize(&bytes).map_err(|e| {
            RecError::CorruptModel(format!("failed to decode {}: {}", path.display(), e))
        })?;
        let store = serializable.into_store()?;

        tracing::info!(
            path = %path.display(),
            rank = store.rank(),
            users = store.user_count(),
            items = store.item_count(),
            version = store.version(),
            "Loaded ALS model"
        );
        Ok(store)
    }
}

fn random_rows(rng: &mut StdRng, rows: usize, rank: usize) -> Array2<f32> {
    Array2::from_shape_simple_fn((rows, rank), || rng.gen_range(-INIT_SCALE..INIT_SCALE))
}

fn append_rows(target: &mut Array2<f32>, rows: Array2<f32>) {
    let mut grown = Array2::<f32>::zeros((target.nrows() + rows.nrows(), target.ncols()));
    grown
        .slice_mut(ndarray::s![..target.nrows(), ..])
        .assign(&*target);
    grown
        .slice_mut(ndarray::s![target.nrows().., ..])
        .assign(&rows);
    *target = grown;
}

/// On-disk representation of a [`FactorStore`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SerializableModel {
    magic: [u8; 8],
    format_version: u32,
    rank: usize,
    regularization: f32,
    iterations: usize,
    version: u64,
    seed: u64,
    user_shape: (usize, usize),
    user_data: Vec<f32>,
    item_shape: (usize, usize),
    item_data: Vec<f32>,
}

impl SerializableModel {
    fn from_store(store: &FactorStore) -> Self {
        Self {
            magic: MODEL_MAGIC,
            format_version: FORMAT_VERSION,
            rank: store.rank(),
            regularization: store.regularization,
            iterations: store.iterations,
            version: store.version,
            seed: store.seed,
            user_shape: store.user_factors.dim(),
            user_data: store.user_factors.iter().copied().collect(),
            item_shape: store.item_factors.dim(),
            item_data: store.item_factors.iter().copied().collect(),
        }
    }

    fn into_store(self) -> Result<FactorStore> {
        if self.magic != MODEL_MAGIC {
            return Err(RecError::CorruptModel("unrecognized model header".to_string()));
        }
        if self.format_version != FORMAT_VERSION {
            return Err(RecError::CorruptModel(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }
        if self.user_shape.1 != self.rank || self.item_shape.1 != self.rank {
            return Err(RecError::CorruptModel(format!(
                "rank mismatch: header K={}, user K={}, item K={}",
                self.rank, self.user_shape.1, self.item_shape.1
            )));
        }

        let user_factors = Array2::from_shape_vec(self.user_shape, self.user_data)
            .map_err(|e| RecError::CorruptModel(format!("user factors: {}", e)))?;
        let item_factors = Array2::from_shape_vec(self.item_shape, self.item_data)
            .map_err(|e| RecError::CorruptModel(format!("item factors: {}", e)))?;

        let mut store = FactorStore::new(
            user_factors,
            item_factors,
            self.regularization,
            self.iterations,
            self.seed,
        )
        .map_err(|e| RecError::CorruptModel(e.to_string()))?;
        store.version = self.version;
        Ok(store)
    }
}

/// Sum of squared row norms; handy for log lines
pub(crate) fn frobenius_sq(factors: ArrayView2<'_, f32>) -> f32 {
    factors
        .axis_iter(Axis(0))
        .map(|row| row.dot(&row))
        .sum()
}
