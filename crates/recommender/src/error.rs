use actix_web::{http::StatusCode, HttpResponse, ResponseError};

pub type Result<T> = std::result::Result<T, RecError>;

#[derive(Debug, thiserror::Error)]
pub enum RecError {
    #[error("Invalid interaction at position {index}: {reason}")]
    InvalidInteraction { index: usize, reason: String },

    #[error("Interaction matrix has no nonzero entries")]
    EmptyMatrix,

    #[error("Corrupt model: {0}")]
    CorruptModel(String),

    #[error("User {0} has no rows in the interaction matrix")]
    UnknownUserInMatrix(usize),

    #[error("Invalid N: {0} (must be greater than 0)")]
    InvalidN(i64),

    #[error("Scoring unavailable: {0}")]
    ScoringUnavailable(String),

    #[error("Rank mismatch: expected {expected}, got {actual}")]
    RankMismatch { expected: usize, actual: usize },

    #[error("Unknown user: {0}")]
    UnknownUser(usize),

    #[error("Model not trained")]
    ModelNotTrained,

    #[error("Training cancelled after {completed} of {requested} iterations")]
    Cancelled { completed: usize, requested: usize },

    #[error("Linear solve failed: {0}")]
    Solver(String),

    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        key: Option<String>,
    },

    #[error("Interaction feed error: {0}")]
    Feed(String),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecError {
    pub(crate) fn invalid_interaction(index: usize, reason: impl Into<String>) -> Self {
        RecError::InvalidInteraction {
            index,
            reason: reason.into(),
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            RecError::InvalidInteraction { .. } => "invalid_interaction",
            RecError::EmptyMatrix => "empty_matrix",
            RecError::CorruptModel(_) => "corrupt_model",
            RecError::UnknownUserInMatrix(_) => "unknown_user_in_matrix",
            RecError::InvalidN(_) => "invalid_n",
            RecError::ScoringUnavailable(_) => "scoring_unavailable",
            RecError::RankMismatch { .. } => "rank_mismatch",
            RecError::UnknownUser(_) => "unknown_user",
            RecError::ModelNotTrained => "model_not_trained",
            RecError::Cancelled { .. } => "cancelled",
            RecError::Solver(_) => "solver_error",
            RecError::Configuration { .. } => "configuration_error",
            RecError::Feed(_) => "feed_error",
            RecError::Logging(_) => "logging_error",
            RecError::Io(_) => "io_error",
        }
    }
}

impl ResponseError for RecError {
    fn status_code(&self) -> StatusCode {
        match self {
            RecError::InvalidInteraction { .. }
            | RecError::InvalidN(_)
            | RecError::EmptyMatrix
            | RecError::UnknownUserInMatrix(_) => StatusCode::BAD_REQUEST,
            RecError::UnknownUser(_) => StatusCode::NOT_FOUND,
            RecError::ModelNotTrained | RecError::ScoringUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.error_code(),
            "message": self.to_string(),
        }))
    }
}
