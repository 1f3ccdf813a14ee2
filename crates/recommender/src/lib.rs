//! Book recommendation engine
//!
//! Collaborative filtering over implicit feedback: a signed confidence
//! matrix is factorized with Alternating Least Squares, candidates are
//! retrieved by exact dot-product scan, and individual users can be refit
//! incrementally while the item side stays frozen.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod factors;
pub mod feed;
pub mod incremental;
pub mod interactions;
pub mod rerank;
pub mod retrieval;
pub mod server;
pub mod solver;
pub mod telemetry;
pub mod trainer;

// Re-export key types
pub use catalog::{CatalogItem, ItemCatalog};
pub use config::{load_dotenv, AlsConfig, ConfigLoader, ServiceConfig};
pub use engine::{ModelSummary, RecommendationEngine};
pub use error::{RecError, Result};
pub use factors::FactorStore;
pub use feed::{load_interactions, read_interactions, read_records};
pub use incremental::IncrementalUpdater;
pub use interactions::{confidence, Interaction, InteractionMatrix, InteractionMatrixBuilder};
pub use rerank::{rerank, RerankedItem, Reranker};
pub use retrieval::{CandidateRetriever, ScoredItem};
pub use telemetry::{init_logging, LogConfig, LogFormat};
pub use trainer::{AlsTrainer, CancellationToken};
