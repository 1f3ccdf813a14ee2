//! Configuration loading for the recommendation engine and its service
//!
//! All settings are read from environment variables with the `BOOKREC_`
//! prefix, optionally seeded from a `.env` file via dotenvy.
//!
//! # Example
//!
//! ```no_run
//! use bookrec_engine::config::{load_dotenv, AlsConfig, ConfigLoader, ServiceConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! load_dotenv();
//!
//! let als = AlsConfig::from_env()?;
//! let service = ServiceConfig::from_env()?;
//!
//! als.validate()?;
//! service.validate()?;
//! # Ok(())
//! # }
//! ```

use crate::error::RecError;
use std::path::PathBuf;

/// Configuration loader trait
///
/// Provides standardized methods for loading and validating configuration from
/// environment variables.
pub trait ConfigLoader: Sized {
    /// Load configuration from environment variables, falling back to defaults
    /// for anything unset.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if a set variable cannot be parsed.
    fn from_env() -> Result<Self, RecError>;

    /// Validate configuration values
    fn validate(&self) -> Result<(), RecError>;
}

/// ALS model hyperparameters
///
/// # Environment Variables
///
/// - `BOOKREC_ALS_FACTORS` (optional): Embedding rank K (default: 64)
/// - `BOOKREC_ALS_REGULARIZATION` (optional): Ridge penalty λ (default: 0.5)
/// - `BOOKREC_ALS_ITERATIONS` (optional): Number of ALS sweeps (default: 7)
/// - `BOOKREC_ALS_SEED` (optional): RNG seed for factor initialization (default: 42)
#[derive(Debug, Clone, PartialEq)]
pub struct AlsConfig {
    /// Number of latent factors (embedding rank K)
    pub factors: usize,
    /// Regularization parameter (lambda)
    pub regularization: f32,
    /// Number of iterations; the only stopping criterion
    pub iterations: usize,
    /// Seed for factor initialization and resize
    pub seed: u64,
}

impl Default for AlsConfig {
    fn default() -> Self {
        Self {
            factors: 64,
            regularization: 0.5,
            iterations: 7,
            seed: 42,
        }
    }
}

impl AlsConfig {
    pub fn new(factors: usize, regularization: f32, iterations: usize) -> Self {
        Self {
            factors,
            regularization,
            iterations,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

impl ConfigLoader for AlsConfig {
    fn from_env() -> Result<Self, RecError> {
        let defaults = AlsConfig::default();

        Ok(Self {
            factors: parse_env_var("BOOKREC_ALS_FACTORS", defaults.factors)?,
            regularization: parse_env_var("BOOKREC_ALS_REGULARIZATION", defaults.regularization)?,
            iterations: parse_env_var("BOOKREC_ALS_ITERATIONS", defaults.iterations)?,
            seed: parse_env_var("BOOKREC_ALS_SEED", defaults.seed)?,
        })
    }

    fn validate(&self) -> Result<(), RecError> {
        if self.factors == 0 {
            return Err(RecError::Configuration {
                message: "factors must be greater than 0".to_string(),
                key: Some("BOOKREC_ALS_FACTORS".to_string()),
            });
        }

        // λ > 0 keeps every normal-equation system positive definite
        if !(self.regularization > 0.0) || !self.regularization.is_finite() {
            return Err(RecError::Configuration {
                message: format!(
                    "regularization must be a positive finite number, got {}",
                    self.regularization
                ),
                key: Some("BOOKREC_ALS_REGULARIZATION".to_string()),
            });
        }

        if self.iterations == 0 {
            return Err(RecError::Configuration {
                message: "iterations must be greater than 0".to_string(),
                key: Some("BOOKREC_ALS_ITERATIONS".to_string()),
            });
        }

        Ok(())
    }
}

/// Service configuration
///
/// # Environment Variables
///
/// - `BOOKREC_SERVICE_HOST` (optional): Bind host (default: "0.0.0.0")
/// - `BOOKREC_SERVICE_PORT` (optional): Bind port (default: 8082)
/// - `BOOKREC_SERVICE_WORKERS` (optional): HTTP worker threads (default: CPU count)
/// - `BOOKREC_MODEL_PATH` (optional): Persisted model file (default: "models/als_model.bin")
/// - `BOOKREC_INTERACTIONS_PATH` (optional): JSON-lines interaction feed
///   (default: "dataset/interactions.jsonl")
/// - `BOOKREC_ITEMS_PATH` (optional): JSON-lines item catalog with titles
///   (default: "dataset/items.jsonl")
/// - `BOOKREC_HOME_USER` (optional): User served by `GET /` (default: unset)
/// - `BOOKREC_RETRAIN` (optional): Train from scratch on startup (default: false)
/// - `BOOKREC_DEFAULT_COUNT` (optional): Recommendations when `count` is omitted (default: 100)
/// - `BOOKREC_MAX_COUNT` (optional): Upper bound for `count` (default: 1000)
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub model_path: PathBuf,
    pub interactions_path: PathBuf,
    pub items_path: PathBuf,
    pub home_user: Option<usize>,
    pub retrain: bool,
    pub default_count: usize,
    pub max_count: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8082,
            workers: num_cpus::get(),
            model_path: PathBuf::from("models/als_model.bin"),
            interactions_path: PathBuf::from("dataset/interactions.jsonl"),
            items_path: PathBuf::from("dataset/items.jsonl"),
            home_user: None,
            retrain: false,
            default_count: 100,
            max_count: 1000,
        }
    }
}

impl ConfigLoader for ServiceConfig {
    fn from_env() -> Result<Self, RecError> {
        let defaults = ServiceConfig::default();

        let host = std::env::var("BOOKREC_SERVICE_HOST")
            .or_else(|_| std::env::var("HOST"))
            .unwrap_or(defaults.host);

        let port = parse_env_var("BOOKREC_SERVICE_PORT", defaults.port)?;
        let workers = parse_env_var("BOOKREC_SERVICE_WORKERS", defaults.workers)?;

        let model_path = std::env::var("BOOKREC_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.model_path);
        let interactions_path = std::env::var("BOOKREC_INTERACTIONS_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.interactions_path);
        let items_path = std::env::var("BOOKREC_ITEMS_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.items_path);
        let home_user = match std::env::var("BOOKREC_HOME_USER") {
            Ok(_) => Some(parse_env_var("BOOKREC_HOME_USER", 0usize)?),
            Err(_) => defaults.home_user,
        };

        let retrain = parse_env_var("BOOKREC_RETRAIN", defaults.retrain)?;
        let default_count = parse_env_var("BOOKREC_DEFAULT_COUNT", defaults.default_count)?;
        let max_count = parse_env_var("BOOKREC_MAX_COUNT", defaults.max_count)?;

        Ok(Self {
            host,
            port,
            workers,
            model_path,
            interactions_path,
            items_path,
            home_user,
            retrain,
            default_count,
            max_count,
        })
    }

    fn validate(&self) -> Result<(), RecError> {
        if self.port == 0 {
            return Err(RecError::Configuration {
                message: "port must be greater than 0".to_string(),
                key: Some("BOOKREC_SERVICE_PORT".to_string()),
            });
        }

        if self.workers == 0 {
            return Err(RecError::Configuration {
                message: "workers must be greater than 0".to_string(),
                key: Some("BOOKREC_SERVICE_WORKERS".to_string()),
            });
        }

        if self.max_count == 0 {
            return Err(RecError::Configuration {
                message: "max_count must be greater than 0".to_string(),
                key: Some("BOOKREC_MAX_COUNT".to_string()),
            });
        }

        if self.default_count == 0 || self.default_count > self.max_count {
            return Err(RecError::Configuration {
                message: format!(
                    "default_count ({}) must be between 1 and max_count ({})",
                    self.default_count, self.max_count
                ),
                key: Some("BOOKREC_DEFAULT_COUNT".to_string()),
            });
        }

        Ok(())
    }
}

/// Parse an environment variable, using `default` when it is unset
///
/// # Errors
///
/// Returns a `Configuration` error if the value cannot be parsed
fn parse_env_var<T>(key: &str, default: T) -> Result<T, RecError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    std::env::var(key)
        .ok()
        .map(|v| {
            v.parse::<T>().map_err(|e| RecError::Configuration {
                message: format!("Failed to parse {}: {}", key, e),
                key: Some(key.to_string()),
            })
        })
        .unwrap_or(Ok(default))
}

/// Load .env file if present
///
/// A missing .env file is not an error.
pub fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_als_config_default() {
        let config = AlsConfig::default();
        assert_eq!(config.factors, 64);
        assert_eq!(config.regularization, 0.5);
        assert_eq!(config.iterations, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_als_config_from_env() {
        // sole owner of the BOOKREC_ALS_* variables
        env::set_var("BOOKREC_ALS_FACTORS", "16");
        env::set_var("BOOKREC_ALS_SEED", "7");

        let config = AlsConfig::from_env().unwrap();
        assert_eq!(config.factors, 16);
        assert_eq!(config.seed, 7);

        env::set_var("BOOKREC_ALS_ITERATIONS", "many");
        let result = AlsConfig::from_env();
        assert!(matches!(
            result,
            Err(RecError::Configuration { key: Some(ref k), .. }) if k == "BOOKREC_ALS_ITERATIONS"
        ));

        env::remove_var("BOOKREC_ALS_FACTORS");
        env::remove_var("BOOKREC_ALS_SEED");
        env::remove_var("BOOKREC_ALS_ITERATIONS");
    }

    #[test]
    fn test_als_config_validation() {
        assert!(AlsConfig::new(0, 0.1, 5).validate().is_err());
        assert!(AlsConfig::new(8, 0.0, 5).validate().is_err());
        assert!(AlsConfig::new(8, f32::NAN, 5).validate().is_err());
        assert!(AlsConfig::new(8, 0.1, 0).validate().is_err());
        assert!(AlsConfig::new(8, 0.1, 5).validate().is_ok());
    }

    #[test]
    fn test_service_config_default() {
        let config = ServiceConfig::default();
        assert_eq!(config.port, 8082);
        assert_eq!(config.default_count, 100);
        assert_eq!(config.max_count, 1000);
        assert!(!config.retrain);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_service_config_from_env() {
        env::set_var("BOOKREC_SERVICE_PORT", "9000");
        env::set_var("BOOKREC_RETRAIN", "true");
        env::set_var("BOOKREC_MODEL_PATH", "/tmp/model.bin");
        env::set_var("BOOKREC_HOME_USER", "159614");

        let config = ServiceConfig::from_env().unwrap();
        assert_eq!(config.port, 9000);
        assert!(config.retrain);
        assert_eq!(config.model_path, PathBuf::from("/tmp/model.bin"));
        assert_eq!(config.items_path, PathBuf::from("dataset/items.jsonl"));
        assert_eq!(config.home_user, Some(159614));

        env::set_var("BOOKREC_HOME_USER", "-1");
        assert!(ServiceConfig::from_env().is_err());
        env::remove_var("BOOKREC_HOME_USER");

        env::remove_var("BOOKREC_SERVICE_PORT");
        env::remove_var("BOOKREC_RETRAIN");
        env::remove_var("BOOKREC_MODEL_PATH");
    }

    #[test]
    fn test_service_config_validation() {
        let mut config = ServiceConfig::default();
        config.default_count = 2000;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.workers = 0;
        assert!(config.validate().is_err());
    }
}
