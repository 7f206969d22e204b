// Static generation ceilings, read from a `params.json`-style file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::InferenceError;

fn default_max_seq_len() -> usize {
    512
}

fn default_max_batch_size() -> usize {
    8
}

/// Limits that size every generation batch.
///
/// Neither value is negotiated at runtime: a request over either ceiling is
/// rejected before any scoring happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Longest token sequence (prompt plus generation) the model accepts.
    #[serde(default = "default_max_seq_len")]
    pub max_seq_len: usize,
    /// Largest number of prompts in one `generate` call.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Vocabulary size, when the config file states it. Checked against the
    /// tokenizer and model at load time.
    #[serde(default)]
    pub vocab_size: Option<usize>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            max_seq_len: default_max_seq_len(),
            max_batch_size: default_max_batch_size(),
            vocab_size: None,
        }
    }
}

impl ModelConfig {
    pub fn new(max_seq_len: usize, max_batch_size: usize) -> Self {
        Self {
            max_seq_len,
            max_batch_size,
            vocab_size: None,
        }
    }

    /// Parse and validate a config from JSON text. Unknown keys (model
    /// dimensions and the like) are ignored.
    pub fn from_json_str(raw: &str) -> Result<Self, InferenceError> {
        let config: ModelConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&raw)?;
        info!(
            path = %path.display(),
            max_seq_len = config.max_seq_len,
            max_batch_size = config.max_batch_size,
            "Loaded model config"
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), InferenceError> {
        if self.max_seq_len == 0 {
            return Err(InferenceError::Config("max_seq_len must be > 0".to_string()));
        }
        if self.max_batch_size == 0 {
            return Err(InferenceError::Config("max_batch_size must be > 0".to_string()));
        }
        if self.vocab_size == Some(0) {
            return Err(InferenceError::Config("vocab_size must be > 0".to_string()));
        }
        Ok(())
    }
}
