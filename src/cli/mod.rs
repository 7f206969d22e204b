//! Shared CLI utilities for the strata-generation binary tools.

use std::io::Read;
use std::path::Path;

use tracing::info;

use crate::engine::{Dialog, Generator};
use crate::error::InferenceError;
use crate::model::{BigramModel, ModelConfig};
use crate::tokenizer::VocabTokenizer;

/// Initialize tracing/logging to stderr.
///
/// If `disable` is true, no output is produced.
/// Otherwise respects `RUST_LOG` env var, defaulting to WARN.
pub fn init_logging(disable: bool) {
    use tracing_subscriber::EnvFilter;

    if disable {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Read input text from one of: prompt string, file path, or stdin.
///
/// Returns an error message string if no input source is provided.
pub fn read_input(
    prompt: Option<&str>,
    file: Option<&Path>,
    use_stdin: bool,
) -> Result<String, String> {
    if let Some(text) = prompt {
        return Ok(text.to_string());
    }

    if let Some(path) = file {
        return std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read file '{}': {}", path.display(), e));
    }

    if use_stdin {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("Failed to read stdin: {}", e))?;
        return Ok(buf);
    }

    Err("No input provided. Use --prompt, --file, or --stdin".to_string())
}

/// Collect a batch of prompts.
///
/// Repeated `--prompt` values win; otherwise the file or stdin is read and
/// every non-blank line becomes one prompt.
pub fn read_prompts(
    prompts: &[String],
    file: Option<&Path>,
    use_stdin: bool,
) -> Result<Vec<String>, String> {
    if !prompts.is_empty() {
        return Ok(prompts.to_vec());
    }
    let text = read_input(None, file, use_stdin)?;
    let batch: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if batch.is_empty() {
        return Err("Input contains no prompts".to_string());
    }
    Ok(batch)
}

/// Parse a JSON array of dialogs, each an array of `{role, content}`.
pub fn parse_dialogs(raw: &str) -> Result<Vec<Dialog>, InferenceError> {
    Ok(serde_json::from_str(raw)?)
}

/// Build a [`Generator`] from a vocabulary file, a bigram model file and an
/// optional config file.
///
/// Without a config the model's own `max_seq_len` is used together with the
/// default batch size.
pub fn load_generator(
    config: Option<&Path>,
    model: &Path,
    vocab: &Path,
    seed: u64,
) -> Result<Generator, InferenceError> {
    let tokenizer = VocabTokenizer::from_json_file(vocab)?;
    let model = BigramModel::from_json_file(model)?;
    let config = match config {
        Some(path) => ModelConfig::from_json_file(path)?,
        None => ModelConfig {
            max_seq_len: model.max_seq_len(),
            ..ModelConfig::default()
        },
    };
    if config.max_seq_len > model.max_seq_len() {
        return Err(InferenceError::Config(format!(
            "max_seq_len ({}) exceeds the model's context ({})",
            config.max_seq_len,
            model.max_seq_len()
        )));
    }
    info!(max_seq_len = config.max_seq_len, "Loading generator");
    Generator::new(config, Box::new(model), Box::new(tokenizer), seed)
}
