//! Batched autoregressive decoding.
//!
//! [`Generator`] owns a [`ScoringModel`], a [`Tokenizer`] and the
//! [`Sampler`]. One `generate` call lays every prompt into a shared
//! `(batch, total_len)` token grid, then walks a column cursor left to
//! right. Each step scores only the newly exposed columns, picks a token per
//! row from the logits at the last scored column, and writes it into the
//! grid unless that cell still belongs to the row's own prompt. Rows stop
//! contributing once they emit the end marker outside their prompt; the
//! loop ends when every row has.

use std::time::Instant;

use tracing::{debug, info};

use crate::error::{CapacityLimit, InferenceError};
use crate::model::{ModelConfig, ScoringModel};
use crate::tensor::{Grid, Logits, LogprobGrid, TokenGrid};
use crate::tokenizer::{encode_batch, Tokenizer};

use super::assemble::{self, ChatPrediction, CompletionPrediction, GeneratedSequence};
use super::dialog::{encode_dialog, Message};
use super::sampler::{argmax, log_prob, softmax_with_temperature, Sampler};

/// Seed used when the caller does not pick one.
pub const DEFAULT_SEED: u64 = 1;

/// Caller-facing generation settings.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    /// Softmax temperature. `<= 0.0` selects greedy (argmax) decoding.
    pub temperature: f32,
    /// Nucleus threshold in `(0, 1]`, used only when sampling.
    pub top_p: f32,
    /// Maximum tokens to generate per row. `None` means `max_seq_len - 1`.
    pub max_gen_len: Option<usize>,
    /// Return per-token log-probabilities.
    pub logprobs: bool,
    /// Include prompt tokens in the returned sequences.
    pub echo: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.6,
            top_p: 0.9,
            max_gen_len: None,
            logprobs: false,
            echo: false,
        }
    }
}

impl GenerationParams {
    /// Greedy decoding with default lengths.
    pub fn greedy() -> Self {
        Self {
            temperature: 0.0,
            ..Default::default()
        }
    }

    fn resolve_max_gen_len(&self, config: &ModelConfig) -> usize {
        self.max_gen_len
            .unwrap_or_else(|| config.max_seq_len.saturating_sub(1))
    }
}

/// The raw decode result: full-width grids, not yet trimmed.
#[derive(Debug, Clone)]
pub struct DecodedBatch {
    /// Prompts plus generated tokens, `pad_id` where nothing was written.
    pub tokens: TokenGrid,
    /// Log-probabilities of the realized tokens. Zero where a column was
    /// never scored or holds padding.
    pub logprobs: Option<LogprobGrid>,
    /// Original prompt length of each row.
    pub prompt_lens: Vec<usize>,
    /// Whether each row produced the end marker outside its prompt.
    pub eos_reached: Vec<bool>,
    /// Number of scoring calls issued.
    pub forward_passes: usize,
}

/// High-level batched generation engine.
pub struct Generator {
    config: ModelConfig,
    model: Box<dyn ScoringModel>,
    tokenizer: Box<dyn Tokenizer>,
    sampler: Sampler,
}

impl Generator {
    /// Assemble a generator from its collaborators.
    ///
    /// Fails if the config is invalid or the model and tokenizer disagree on
    /// the vocabulary size.
    pub fn new(
        config: ModelConfig,
        model: Box<dyn ScoringModel>,
        tokenizer: Box<dyn Tokenizer>,
        seed: u64,
    ) -> Result<Self, InferenceError> {
        config.validate()?;
        let vocab = model.vocab_size();
        if vocab != tokenizer.vocab_size() {
            return Err(InferenceError::Config(format!(
                "model vocab_size ({}) does not match tokenizer vocab_size ({})",
                vocab,
                tokenizer.vocab_size()
            )));
        }
        if let Some(expected) = config.vocab_size {
            if expected != vocab {
                return Err(InferenceError::Config(format!(
                    "config vocab_size ({}) does not match model vocab_size ({})",
                    expected, vocab
                )));
            }
        }

        info!(
            max_seq_len = config.max_seq_len,
            max_batch_size = config.max_batch_size,
            vocab_size = vocab,
            seed,
            "Generator ready"
        );

        Ok(Self {
            config,
            model,
            tokenizer,
            sampler: Sampler::new(seed),
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    /// Run the decode loop over a batch of prompt token sequences.
    ///
    /// All structural checks happen before the first scoring call. The
    /// returned grids are full width; see [`assemble::trim_batch`].
    pub fn decode(
        &mut self,
        prompt_tokens: &[Vec<u32>],
        max_gen_len: usize,
        temperature: f32,
        top_p: f32,
        want_logprobs: bool,
    ) -> Result<DecodedBatch, InferenceError> {
        let bsz = prompt_tokens.len();
        self.validate_batch(prompt_tokens, temperature, top_p)?;

        let prompt_lens: Vec<usize> = prompt_tokens.iter().map(|t| t.len()).collect();
        let min_prompt_len = prompt_lens.iter().copied().min().unwrap_or(0);
        let max_prompt_len = prompt_lens.iter().copied().max().unwrap_or(0);
        let total_len = self
            .config
            .max_seq_len
            .min(max_gen_len.saturating_add(max_prompt_len));

        let pad_id = self.tokenizer.pad_id();
        let eos_id = self.tokenizer.eos_id();

        let mut tokens = Grid::filled(bsz, total_len, pad_id);
        for (r, prompt) in prompt_tokens.iter().enumerate() {
            tokens.row_mut(r)[..prompt.len()].copy_from_slice(prompt);
        }
        let mut input_mask = Grid::filled(bsz, total_len, false);
        for (r, &len) in prompt_lens.iter().enumerate() {
            input_mask.row_mut(r)[..len].fill(true);
        }
        let mut logprobs = want_logprobs.then(|| Grid::filled(bsz, total_len, 0.0f32));
        let mut eos_reached = vec![false; bsz];
        let mut forward_passes = 0usize;

        info!(
            batch = bsz,
            min_prompt_len,
            max_prompt_len,
            total_len,
            temperature,
            top_p,
            "Starting batched decode"
        );
        let start = Instant::now();

        if min_prompt_len == total_len {
            // Nothing to generate; score the prompts once for their logprobs.
            let logits = self.score(&tokens, 0)?;
            forward_passes += 1;
            if let Some(lp) = logprobs.as_mut() {
                fill_logprobs(lp, &logits, &tokens, 0, pad_id);
            }
        }

        let mut prev_pos = 0usize;
        for cur_pos in min_prompt_len..total_len {
            let slice = tokens.columns(prev_pos, cur_pos);
            let logits = self.score(&slice, prev_pos)?;
            forward_passes += 1;

            let next = self.select_next(&logits, temperature, top_p)?;
            for (r, &token) in next.iter().enumerate() {
                // rows still inside their own prompt keep the prompt token
                if !input_mask.get(r, cur_pos) {
                    tokens.set(r, cur_pos, token);
                }
            }

            if let Some(lp) = logprobs.as_mut() {
                fill_logprobs(lp, &logits, &tokens, prev_pos, pad_id);
            }

            for (r, reached) in eos_reached.iter_mut().enumerate() {
                if !input_mask.get(r, cur_pos) && tokens.get(r, cur_pos) == eos_id {
                    *reached = true;
                }
            }

            debug!(
                cur_pos,
                finished = eos_reached.iter().filter(|&&e| e).count(),
                "Decode step"
            );

            prev_pos = cur_pos;
            if eos_reached.iter().all(|&e| e) {
                debug!(cur_pos, "All rows reached end marker");
                break;
            }
        }

        info!(
            forward_passes,
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Batched decode complete"
        );

        Ok(DecodedBatch {
            tokens,
            logprobs,
            prompt_lens,
            eos_reached,
            forward_passes,
        })
    }

    /// Decode and trim: one [`GeneratedSequence`] per prompt.
    pub fn generate(
        &mut self,
        prompt_tokens: &[Vec<u32>],
        params: &GenerationParams,
    ) -> Result<Vec<GeneratedSequence>, InferenceError> {
        let max_gen_len = params.resolve_max_gen_len(&self.config);
        let batch = self.decode(
            prompt_tokens,
            max_gen_len,
            params.temperature,
            params.top_p,
            params.logprobs,
        )?;
        Ok(assemble::trim_batch(
            &batch,
            max_gen_len,
            params.echo,
            self.tokenizer.eos_id(),
        ))
    }

    /// Complete raw text prompts.
    pub fn text_completion(
        &mut self,
        prompts: &[&str],
        params: &GenerationParams,
    ) -> Result<Vec<CompletionPrediction>, InferenceError> {
        let prompt_tokens = encode_batch(self.tokenizer.as_ref(), prompts, true, false);
        let sequences = self.generate(&prompt_tokens, params)?;
        Ok(sequences
            .iter()
            .map(|seq| assemble::completion_prediction(self.tokenizer.as_ref(), seq))
            .collect())
    }

    /// Produce the next assistant message for each dialog.
    ///
    /// Every dialog is validated and encoded before any scoring happens.
    /// Prompts are never echoed.
    pub fn chat_completion(
        &mut self,
        dialogs: &[Vec<Message>],
        params: &GenerationParams,
    ) -> Result<Vec<ChatPrediction>, InferenceError> {
        let encoded = dialogs
            .iter()
            .map(|d| encode_dialog(self.tokenizer.as_ref(), d))
            .collect::<Result<Vec<_>, _>>()?;
        let prompt_tokens: Vec<Vec<u32>> = encoded.iter().map(|e| e.tokens.clone()).collect();

        let params = GenerationParams {
            echo: false,
            ..params.clone()
        };
        let sequences = self.generate(&prompt_tokens, &params)?;
        Ok(sequences
            .iter()
            .zip(&encoded)
            .map(|(seq, enc)| assemble::chat_prediction(self.tokenizer.as_ref(), seq, enc.is_unsafe))
            .collect())
    }

    fn validate_batch(
        &self,
        prompt_tokens: &[Vec<u32>],
        temperature: f32,
        top_p: f32,
    ) -> Result<(), InferenceError> {
        let bsz = prompt_tokens.len();
        if bsz == 0 {
            return Err(InferenceError::InvalidInput("empty batch".to_string()));
        }
        if bsz > self.config.max_batch_size {
            return Err(InferenceError::CapacityExceeded {
                limit: CapacityLimit::BatchSize,
                requested: bsz,
                max: self.config.max_batch_size,
            });
        }

        let vocab = self.model.vocab_size();
        for (row, prompt) in prompt_tokens.iter().enumerate() {
            if prompt.is_empty() {
                return Err(InferenceError::InvalidInput(format!(
                    "prompt {} tokenized to empty sequence",
                    row
                )));
            }
            if prompt.len() > self.config.max_seq_len {
                return Err(InferenceError::CapacityExceeded {
                    limit: CapacityLimit::SequenceLength,
                    requested: prompt.len(),
                    max: self.config.max_seq_len,
                });
            }
            if let Some(&bad) = prompt.iter().find(|&&t| t as usize >= vocab) {
                return Err(InferenceError::InvalidInput(format!(
                    "prompt {} contains token id {} outside vocabulary of size {}",
                    row, bad, vocab
                )));
            }
        }

        if temperature > 0.0 && !(top_p > 0.0 && top_p <= 1.0) {
            return Err(InferenceError::InvalidInput(format!(
                "top_p must be in (0, 1], got {}",
                top_p
            )));
        }
        Ok(())
    }

    /// Call the model and check the logits shape against the request.
    fn score(&mut self, tokens: &TokenGrid, start_pos: usize) -> Result<Logits, InferenceError> {
        let logits = self.model.score(tokens, start_pos)?;
        let expected = [tokens.rows(), tokens.cols(), self.model.vocab_size()];
        if logits.shape() != expected {
            return Err(InferenceError::ShapeMismatch {
                expected: expected.to_vec(),
                actual: logits.shape().to_vec(),
            });
        }
        Ok(logits)
    }

    /// One candidate token per row from the last scored column.
    fn select_next(
        &mut self,
        logits: &Logits,
        temperature: f32,
        top_p: f32,
    ) -> Result<Vec<u32>, InferenceError> {
        if temperature > 0.0 {
            let probs = (0..logits.rows())
                .map(|r| softmax_with_temperature(logits.last(r), temperature, r))
                .collect::<Result<Vec<_>, _>>()?;
            self.sampler.sample_top_p(&probs, top_p)
        } else {
            (0..logits.rows())
                .map(|r| {
                    let row = logits.last(r);
                    if row.iter().any(|v| v.is_finite()) {
                        Ok(argmax(row))
                    } else {
                        Err(InferenceError::DegenerateDistribution { row: r })
                    }
                })
                .collect()
        }
    }
}

/// Store log-probabilities for the tokens predicted by a scored slice.
///
/// Logits at position `start + j` predict the token at `start + j + 1`.
/// Padding targets and positions past the grid are left untouched.
fn fill_logprobs(
    logprobs: &mut LogprobGrid,
    logits: &Logits,
    tokens: &TokenGrid,
    start: usize,
    pad_id: u32,
) {
    for r in 0..logits.rows() {
        for j in 0..logits.width() {
            let col = start + j + 1;
            if col >= tokens.cols() {
                break;
            }
            let target = tokens.get(r, col);
            let value = if target == pad_id {
                0.0
            } else {
                log_prob(logits.at(r, j), target)
            };
            logprobs.set(r, col, value);
        }
    }
}
