//! Recommendation Engine
//!
//! Owns the published model (factor store + interaction matrix) and
//! orchestrates building, training, incremental refits and retrieval.
//!
//! Concurrency:
//! - one reader-writer lock guards the published state; retrieval takes it
//!   shared, publishing a new model or committing rows takes it exclusively
//! - full fits run outside the lock and swap in on success
//! - partial fits serialize per user through striped mutexes, solve under
//!   the shared lock and commit under the exclusive lock
//! - ingestion is serialized; an ingest overtaken by another publish
//!   re-applies its interactions onto the matrix it finds there

use crate::config::AlsConfig;
use crate::error::{RecError, Result};
use crate::factors::FactorStore;
use crate::incremental::{IncrementalUpdater, SolvedRows};
use crate::interactions::{Interaction, InteractionMatrix, InteractionMatrixBuilder};
use crate::rerank::{rerank, RerankedItem, Reranker};
use crate::retrieval::{CandidateRetriever, ScoredItem};
use crate::trainer::{AlsTrainer, CancellationToken};
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const USER_LOCK_STRIPES: usize = 64;

/// Snapshot of the published model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub rank: usize,
    pub users: usize,
    pub items: usize,
    pub regularization: f32,
    pub iterations: usize,
    pub version: u64,
    pub generation: u64,
    pub nnz: usize,
}

/// The published matrix an ingest extended, and what it added
struct Rebase<'a> {
    base: Arc<InteractionMatrix>,
    interactions: &'a [Interaction],
}

/// Rows solved under the shared lock, waiting for the exclusive one
struct StagedRefit<'a> {
    target_users: &'a BTreeSet<usize>,
    matrix: Arc<InteractionMatrix>,
    rebase: Option<Rebase<'a>>,
    rows: Option<(u64, SolvedRows)>,
}

#[derive(Default)]
struct ModelState {
    factors: Option<FactorStore>,
    matrix: Arc<InteractionMatrix>,
}

impl ModelState {
    fn factors(&self) -> Result<&FactorStore> {
        self.factors.as_ref().ok_or(RecError::ModelNotTrained)
    }

    fn summary(&self) -> Result<ModelSummary> {
        let store = self.factors()?;
        Ok(ModelSummary {
            rank: store.rank(),
            users: store.user_count(),
            items: store.item_count(),
            regularization: store.regularization(),
            iterations: store.iterations(),
            version: store.version(),
            generation: store.generation(),
            nnz: self.matrix.nnz(),
        })
    }
}

pub struct RecommendationEngine {
    config: AlsConfig,
    model_path: Option<PathBuf>,
    state: RwLock<ModelState>,
    user_locks: Vec<Mutex<()>>,
    ingest_lock: Mutex<()>,
    generation: AtomicU64,
    builder: InteractionMatrixBuilder,
    trainer: AlsTrainer,
    updater: IncrementalUpdater,
    retriever: CandidateRetriever,
}

impl RecommendationEngine {
    pub fn new(config: AlsConfig) -> Self {
        Self {
            trainer: AlsTrainer::new(config.clone()),
            config,
            model_path: None,
            state: RwLock::new(ModelState::default()),
            user_locks: (0..USER_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            ingest_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            builder: InteractionMatrixBuilder::new(),
            updater: IncrementalUpdater::new(),
            retriever: CandidateRetriever::new(),
        }
    }

    /// Persist every full fit to `path`
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    pub fn config(&self) -> &AlsConfig {
        &self.config
    }

    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }

    pub fn is_trained(&self) -> bool {
        self.state.read().factors.is_some()
    }

    pub fn summary(&self) -> Result<ModelSummary> {
        self.state.read().summary()
    }

    /// Build, fit, persist (when a model path is set) and publish a new model
    pub fn train_from_scratch(&self, interactions: &[Interaction]) -> Result<ModelSummary> {
        self.train_from_scratch_with_cancel(interactions, &CancellationToken::new())
    }

    pub fn train_from_scratch_with_cancel(
        &self,
        interactions: &[Interaction],
        token: &CancellationToken,
    ) -> Result<ModelSummary> {
        let matrix = self.builder.build(interactions)?;
        let store = self.trainer.fit_with_cancel(&matrix, token)?;

        if let Some(path) = &self.model_path {
            store.save(path)?;
        }

        self.publish(store, matrix)
    }

    /// Load a persisted model and rebuild the exclusion matrix from `interactions`
    pub fn load(&self, path: impl AsRef<Path>, interactions: &[Interaction]) -> Result<ModelSummary> {
        let store = FactorStore::load(path)?;
        let matrix = self.builder.build(interactions)?;
        self.publish(store, matrix)
    }

    fn publish(&self, mut store: FactorStore, matrix: InteractionMatrix) -> Result<ModelSummary> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        store.set_generation(generation);

        let mut state = self.state.write();
        state.factors = Some(store);
        state.matrix = Arc::new(matrix);
        let summary = state.summary()?;

        tracing::info!(
            generation,
            rank = summary.rank,
            users = summary.users,
            items = summary.items,
            nnz = summary.nnz,
            "Published ALS model"
        );
        Ok(summary)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let state = self.state.read();
        state.factors()?.save(path)
    }

    pub fn user_vector(&self, user_id: usize) -> Result<Vec<f32>> {
        let state = self.state.read();
        state
            .factors()?
            .user_vector(user_id)
            .map(|v| v.to_vec())
            .ok_or(RecError::UnknownUser(user_id))
    }

    /// Top `n` items for `user_id`, excluding everything the user interacted with
    pub fn recommend(&self, user_id: usize, n: i64) -> Result<Vec<ScoredItem>> {
        if n <= 0 {
            return Err(RecError::InvalidN(n));
        }

        let state = self.state.read();
        let store = state.factors()?;
        let user_vector = store
            .user_vector(user_id)
            .ok_or(RecError::UnknownUser(user_id))?;
        let exclude = state.matrix.interacted_items(user_id);

        self.retriever
            .top_n(user_vector, &exclude, store.item_factors(), n)
    }

    /// Retrieval followed by the black-box reranker.
    ///
    /// `features` assembles the feature vector for `(user_id, candidate)`.
    pub fn recommend_reranked<F>(
        &self,
        user_id: usize,
        n: i64,
        reranker: &dyn Reranker,
        features: F,
    ) -> Result<Vec<RerankedItem>>
    where
        F: Fn(usize, &ScoredItem) -> Result<Vec<f32>>,
    {
        let candidates = self.recommend(user_id, n)?;
        rerank(&candidates, reranker, |candidate| features(user_id, candidate))
    }

    /// Re-solve the rows of `target_users` against `matrix` with item factors frozen.
    ///
    /// `matrix` is published together with the new rows, so exclusion
    /// follows it from then on. Returns the store version after the commit.
    pub fn partial_fit(
        &self,
        target_users: &BTreeSet<usize>,
        matrix: &InteractionMatrix,
    ) -> Result<u64> {
        self.refit_users(target_users, Arc::new(matrix.clone()), None)
    }

    /// Extend the current matrix with `new_interactions`, refit
    /// `affected_users`, and publish both together.
    ///
    /// Returns the store version after the commit.
    pub fn ingest_and_refit(
        &self,
        new_interactions: &[Interaction],
        affected_users: &BTreeSet<usize>,
    ) -> Result<u64> {
        let _ingest = self.ingest_lock.lock();

        let base = Arc::clone(&self.state.read().matrix);
        let matrix = Arc::new(self.builder.extend(&base, new_interactions)?);
        let rebase = Rebase {
            base,
            interactions: new_interactions,
        };
        let version = self.refit_users(affected_users, matrix, Some(rebase))?;

        tracing::info!(
            interactions = new_interactions.len(),
            users = affected_users.len(),
            version,
            "Ingested interactions"
        );
        Ok(version)
    }

    fn refit_users(
        &self,
        target_users: &BTreeSet<usize>,
        matrix: Arc<InteractionMatrix>,
        rebase: Option<Rebase<'_>>,
    ) -> Result<u64> {
        self.updater.validate(target_users, &matrix)?;
        let _row_guards = self.lock_users(target_users);

        let staged = self.stage_refit(target_users, matrix, rebase)?;
        self.commit_refit(staged)
    }

    /// Solve under the shared lock unless the store has to grow
    fn stage_refit<'a>(
        &self,
        target_users: &'a BTreeSet<usize>,
        matrix: Arc<InteractionMatrix>,
        rebase: Option<Rebase<'a>>,
    ) -> Result<StagedRefit<'a>> {
        let state = self.state.read();
        let store = state.factors()?;
        let rows = if self.updater.needs_resize(store, target_users, &matrix) {
            None
        } else {
            let rows = self.updater.solve_rows(store, target_users, &matrix)?;
            Some((store.generation(), rows))
        };

        Ok(StagedRefit {
            target_users,
            matrix,
            rebase,
            rows,
        })
    }

    /// Publish staged rows and their matrix under the exclusive lock
    fn commit_refit(&self, staged: StagedRefit<'_>) -> Result<u64> {
        let StagedRefit {
            target_users,
            mut matrix,
            rebase,
            mut rows,
        } = staged;

        let mut state = self.state.write();

        if let Some(rebase) = rebase {
            if !Arc::ptr_eq(&rebase.base, &state.matrix) {
                // Another publish replaced the matrix this ingest extended
                tracing::warn!(
                    interactions = rebase.interactions.len(),
                    "Re-applying ingested interactions onto the current matrix"
                );
                matrix = Arc::new(self.builder.extend(&state.matrix, rebase.interactions)?);
                rows = None;
            }
        }

        let store = state.factors.as_mut().ok_or(RecError::ModelNotTrained)?;
        match rows {
            Some((generation, rows)) if generation == store.generation() => {
                store.commit_user_rows(rows)?;
            }
            _ => {
                // A full fit replaced the model meanwhile, or the store must grow
                self.updater.partial_fit(store, target_users, &matrix)?;
            }
        }
        let version = store.version();

        state.matrix = matrix;
        Ok(version)
    }

    /// Lock the stripes covering `users` in ascending order
    fn lock_users(&self, users: &BTreeSet<usize>) -> Vec<MutexGuard<'_, ()>> {
        let stripes: BTreeSet<usize> = users.iter().map(|u| u % USER_LOCK_STRIPES).collect();
        stripes
            .into_iter()
            .map(|stripe| self.user_locks[stripe].lock())
            .collect()
    }
}
