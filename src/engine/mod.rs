//! High-level generation APIs.
//!
//! - [`Generator`]: batched prompt → completion decoding
//! - [`dialog`]: chat dialog → `[INST]` prompt tokens
//! - [`sampler`]: greedy and nucleus token selection
//! - [`assemble`]: trimming decoded rows into predictions

pub mod assemble;
pub mod dialog;
pub mod generate;
pub mod sampler;

pub use assemble::{ChatPrediction, CompletionPrediction, GeneratedSequence, StopReason};
pub use dialog::{encode_dialog, Dialog, Message, Role};
pub use generate::{DecodedBatch, GenerationParams, Generator};
pub use sampler::Sampler;
