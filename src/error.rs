use thiserror::Error;

use crate::engine::dialog::Role;

/// Which static ceiling a request ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityLimit {
    BatchSize,
    SequenceLength,
}

impl std::fmt::Display for CapacityLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapacityLimit::BatchSize => write!(f, "batch size"),
            CapacityLimit::SequenceLength => write!(f, "prompt length"),
        }
    }
}

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{limit} ({requested}) exceeds configured maximum ({max})")]
    CapacityExceeded {
        limit: CapacityLimit,
        requested: usize,
        max: usize,
    },

    #[error("Dialog ordering error: {0}")]
    DialogOrdering(String),

    #[error("Last message must be from user, got {0}")]
    DialogTermination(Role),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Degenerate probability distribution in batch row {row}")]
    DegenerateDistribution { row: usize },

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Config error: {0}")]
    Config(String),
}
