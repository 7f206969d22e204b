//! The scoring-model boundary.
//!
//! The generation engine only needs one capability from a language model:
//! given a `(rows, width)` slice of token ids and the absolute position of
//! its first column, return `(rows, width, vocab)` logits. Caching,
//! sharding and device placement all live behind [`ScoringModel::score`].

pub mod bigram;
pub mod config;

pub use bigram::BigramModel;
pub use config::ModelConfig;

use crate::error::InferenceError;
use crate::tensor::{Logits, TokenGrid};

/// A model that produces next-token logits for a batch of token slices.
///
/// `score` must be deterministic for identical inputs. Implementations may
/// keep internal state keyed on `start_pos` (for example a key-value cache);
/// the engine always scores columns left to right, and every call within
/// one `generate` covers the columns immediately after the previous call.
pub trait ScoringModel: Send {
    /// Number of logits produced per position.
    fn vocab_size(&self) -> usize;

    /// Score `tokens` whose first column sits at absolute position
    /// `start_pos`. Returns logits of shape `(tokens.rows(), tokens.cols(),
    /// vocab_size)`.
    fn score(&mut self, tokens: &TokenGrid, start_pos: usize) -> Result<Logits, InferenceError>;
}

impl<M: ScoringModel + ?Sized> ScoringModel for Box<M> {
    fn vocab_size(&self) -> usize {
        (**self).vocab_size()
    }

    fn score(&mut self, tokens: &TokenGrid, start_pos: usize) -> Result<Logits, InferenceError> {
        (**self).score(tokens, start_pos)
    }
}
