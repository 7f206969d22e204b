//! Table-driven scoring model.
//!
//! [`BigramModel`] assigns every position the logit row of the token at that
//! position, so the prediction for column `c + 1` depends only on the token
//! at column `c`. It is cheap, deterministic and loadable from JSON, which
//! makes it the reference backend for the CLI tools and end-to-end tests.

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::InferenceError;
use crate::tensor::{Logits, TokenGrid};

use super::ScoringModel;

/// On-disk transition table.
#[derive(Debug, Clone, Deserialize)]
pub struct BigramFile {
    pub vocab_size: usize,
    pub max_seq_len: usize,
    #[serde(default)]
    pub default_logit: f32,
    /// `(from, to, logit)` entries overriding `default_logit`.
    #[serde(default)]
    pub transitions: Vec<(u32, u32, f32)>,
}

#[derive(Debug, Clone)]
pub struct BigramModel {
    vocab_size: usize,
    max_seq_len: usize,
    /// `vocab_size x vocab_size`, row = current token.
    table: Vec<f32>,
}

impl BigramModel {
    /// A model where every transition has `default_logit`.
    pub fn new(vocab_size: usize, max_seq_len: usize, default_logit: f32) -> Self {
        Self {
            vocab_size,
            max_seq_len,
            table: vec![default_logit; vocab_size * vocab_size],
        }
    }

    /// Set the logit for predicting `to` after `from`.
    pub fn set_transition(&mut self, from: u32, to: u32, logit: f32) -> Result<(), InferenceError> {
        let v = self.vocab_size;
        if from as usize >= v || to as usize >= v {
            return Err(InferenceError::Model(format!(
                "transition {} -> {} outside vocabulary of size {}",
                from, to, v
            )));
        }
        self.table[from as usize * v + to as usize] = logit;
        Ok(())
    }

    /// Convenience builder: make `to` the strongly preferred successor of
    /// `from`.
    pub fn with_successor(mut self, from: u32, to: u32) -> Result<Self, InferenceError> {
        self.set_transition(from, to, 10.0)?;
        Ok(self)
    }

    pub fn from_file(file: BigramFile) -> Result<Self, InferenceError> {
        if file.vocab_size == 0 {
            return Err(InferenceError::Model("vocab_size must be > 0".to_string()));
        }
        let mut model = Self::new(file.vocab_size, file.max_seq_len, file.default_logit);
        for (from, to, logit) in file.transitions {
            model.set_transition(from, to, logit)?;
        }
        Ok(model)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let file: BigramFile = serde_json::from_str(&raw)?;
        let model = Self::from_file(file)?;
        info!(
            path = %path.display(),
            vocab_size = model.vocab_size,
            max_seq_len = model.max_seq_len,
            "Loaded bigram model"
        );
        Ok(model)
    }

    pub fn max_seq_len(&self) -> usize {
        self.max_seq_len
    }

    fn row(&self, token: u32) -> &[f32] {
        let start = token as usize * self.vocab_size;
        &self.table[start..start + self.vocab_size]
    }
}

impl ScoringModel for BigramModel {
    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn score(&mut self, tokens: &TokenGrid, start_pos: usize) -> Result<Logits, InferenceError> {
        let (rows, width) = (tokens.rows(), tokens.cols());
        if start_pos + width > self.max_seq_len {
            return Err(InferenceError::Model(format!(
                "positions {}..{} exceed max_seq_len ({})",
                start_pos,
                start_pos + width,
                self.max_seq_len
            )));
        }
        debug!(rows, width, start_pos, "Scoring slice");

        let mut data = Vec::with_capacity(rows * width * self.vocab_size);
        for r in 0..rows {
            for &token in tokens.row(r) {
                if token as usize >= self.vocab_size {
                    return Err(InferenceError::Model(format!(
                        "token id {} outside vocabulary of size {}",
                        token, self.vocab_size
                    )));
                }
                data.extend_from_slice(self.row(token));
            }
        }
        Logits::new(rows, width, self.vocab_size, data)
    }
}
