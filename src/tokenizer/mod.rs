//! Tokenizer trait and utilities for encoding text to token IDs.
//!
//! This module defines the [`Tokenizer`] trait consumed by the generation
//! engine and the dialog encoder, along with [`VocabTokenizer`], a
//! word-level implementation over a fixed vocabulary.

pub mod vocab;

pub use vocab::VocabTokenizer;

/// A tokenizer that converts text to token IDs and back.
///
/// All implementations must be thread-safe (`Send + Sync`) for concurrent use
/// across multiple threads.
pub trait Tokenizer: Send + Sync {
    /// Encode text into a sequence of token IDs, optionally wrapped in the
    /// beginning-of-sequence and end-of-sequence markers.
    fn encode(&self, text: &str, bos: bool, eos: bool) -> Vec<u32>;

    /// Decode a sequence of token IDs back into text.
    fn decode(&self, ids: &[u32]) -> String;

    /// Return the total vocabulary size.
    fn vocab_size(&self) -> usize;

    /// Beginning-of-sequence token ID.
    fn bos_id(&self) -> u32;

    /// End-of-sequence token ID.
    fn eos_id(&self) -> u32;

    /// Padding token ID used to fill unwritten batch positions.
    fn pad_id(&self) -> u32;
}

/// Encode a batch of texts using the given tokenizer.
///
/// Each text is encoded independently. Returns one `Vec<u32>` per input text.
pub fn encode_batch(tokenizer: &dyn Tokenizer, texts: &[&str], bos: bool, eos: bool) -> Vec<Vec<u32>> {
    texts
        .iter()
        .map(|text| tokenizer.encode(text, bos, eos))
        .collect()
}

/// Decode each id on its own, giving one display string per token.
pub fn decode_pieces(tokenizer: &dyn Tokenizer, ids: &[u32]) -> Vec<String> {
    ids.iter().map(|&id| tokenizer.decode(&[id])).collect()
}
