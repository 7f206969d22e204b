pub mod error;
pub mod tensor;
pub mod tokenizer;
pub mod model;
pub mod engine;
pub mod cli;

pub use error::InferenceError;
pub use engine::{GenerationParams, Generator};
pub use model::{ModelConfig, ScoringModel};
pub use tokenizer::Tokenizer;
