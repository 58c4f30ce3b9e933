//! Error types for the prediction pipeline

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Symbol not found: {symbol}")]
    NotFound { symbol: String },

    #[error("Invalid selection: {0}")]
    InvalidSelection(String),

    #[error("Column '{column}' has zero variance in the training data")]
    DegenerateColumn { column: String },

    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),

    #[error("Invalid hyperparameter: {0}")]
    InvalidHyperparameter(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("{}:{line}: column '{column}': {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        column: String,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable name, used in API error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::InvalidSelection(_) => "invalid_selection",
            Error::DegenerateColumn { .. } => "degenerate_column",
            Error::EmptyTrainingSet => "empty_training_set",
            Error::LengthMismatch { .. } => "length_mismatch",
            Error::UnsupportedModel(_) => "unsupported_model",
            Error::InvalidHyperparameter(_) => "invalid_hyperparameter",
            Error::InsufficientData(_) => "insufficient_data",
            Error::Parse { .. } => "parse",
            Error::Io(_) => "io",
            Error::Csv(_) => "csv",
            Error::Config(_) => "config",
            Error::Json(_) => "json",
            Error::Internal(_) => "internal",
        }
    }

    /// Whether the error was caused by the user's selection rather than the environment
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidSelection(_)
                | Error::DegenerateColumn { .. }
                | Error::EmptyTrainingSet
                | Error::LengthMismatch { .. }
                | Error::UnsupportedModel(_)
                | Error::InvalidHyperparameter(_)
                | Error::InsufficientData(_)
        )
    }
}
