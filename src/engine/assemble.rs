//! Turning a decoded batch into per-prompt results.

use serde::Serialize;

use crate::tokenizer::{decode_pieces, Tokenizer};

use super::dialog::{Message, Role, UNSAFE_ERROR};
use super::generate::DecodedBatch;

/// Why a sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Produced the end-of-sequence token.
    StopToken,
    /// Produced `max_gen_len` tokens.
    MaxTokens,
    /// Ran into the model's context window first.
    ContextLength,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::StopToken => write!(f, "eos"),
            StopReason::MaxTokens => write!(f, "max_tokens"),
            StopReason::ContextLength => write!(f, "context_length"),
        }
    }
}

/// One row of a decoded batch after trimming.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedSequence {
    /// Generated ids, preceded by the prompt when echoing. Never contains
    /// the end-of-sequence token.
    pub token_ids: Vec<u32>,
    /// Aligned with `token_ids` when logprobs were requested.
    pub logprobs: Option<Vec<f32>>,
    pub stop_reason: StopReason,
    pub prompt_len: usize,
}

/// Slice each row of `batch` down to what the caller asked for.
///
/// A row keeps columns from its prompt end (or from 0 with `echo`) up to
/// `prompt_len + max_gen_len`, capped at the grid width, and is cut just
/// before its first `eos_id`.
pub fn trim_batch(
    batch: &DecodedBatch,
    max_gen_len: usize,
    echo: bool,
    eos_id: u32,
) -> Vec<GeneratedSequence> {
    let width = batch.tokens.cols();
    batch
        .prompt_lens
        .iter()
        .enumerate()
        .map(|(r, &prompt_len)| {
            let start = if echo { 0 } else { prompt_len };
            let limit = prompt_len.saturating_add(max_gen_len);
            let end = limit.min(width);

            let mut token_ids = batch.tokens.row(r)[start..end].to_vec();
            let mut logprobs = batch
                .logprobs
                .as_ref()
                .map(|lp| lp.row(r)[start..end].to_vec());

            let stop_reason = match token_ids.iter().position(|&t| t == eos_id) {
                Some(idx) => {
                    token_ids.truncate(idx);
                    if let Some(lp) = logprobs.as_mut() {
                        lp.truncate(idx);
                    }
                    StopReason::StopToken
                }
                None if limit <= width => StopReason::MaxTokens,
                None => StopReason::ContextLength,
            };

            GeneratedSequence {
                token_ids,
                logprobs,
                stop_reason,
                prompt_len,
            }
        })
        .collect()
}

/// Result of a text completion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionPrediction {
    pub generation: String,
    /// Per-token strings, present only when logprobs were requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<Vec<f32>>,
}

/// Result of a chat completion: the next assistant message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatPrediction {
    pub generation: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logprobs: Option<Vec<f32>>,
}

fn pieces(tokenizer: &dyn Tokenizer, seq: &GeneratedSequence) -> Option<Vec<String>> {
    seq.logprobs
        .as_ref()
        .map(|_| decode_pieces(tokenizer, &seq.token_ids))
}

pub fn completion_prediction(tokenizer: &dyn Tokenizer, seq: &GeneratedSequence) -> CompletionPrediction {
    CompletionPrediction {
        generation: tokenizer.decode(&seq.token_ids),
        tokens: pieces(tokenizer, seq),
        logprobs: seq.logprobs.clone(),
    }
}

/// Build the assistant reply. Only the text is replaced for a flagged
/// dialog; token pieces and logprobs still describe what was generated.
pub fn chat_prediction(
    tokenizer: &dyn Tokenizer,
    seq: &GeneratedSequence,
    is_unsafe: bool,
) -> ChatPrediction {
    let content = if is_unsafe {
        UNSAFE_ERROR.to_string()
    } else {
        tokenizer.decode(&seq.token_ids)
    };
    ChatPrediction {
        generation: Message::new(Role::Assistant, content),
        tokens: pieces(tokenizer, seq),
        logprobs: seq.logprobs.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::Grid;
    use crate::tokenizer::VocabTokenizer;

    const EOS: u32 = 2;

    fn batch(rows: Vec<Vec<u32>>, prompt_lens: Vec<usize>, with_logprobs: bool) -> DecodedBatch {
        let cols = rows[0].len();
        let n = rows.len();
        let tokens = Grid::from_vec(n, cols, rows.concat()).unwrap();
        let logprobs = with_logprobs.then(|| {
            let data = (0..n * cols).map(|i| -(i as f32)).collect();
            Grid::from_vec(n, cols, data).unwrap()
        });
        DecodedBatch {
            tokens,
            logprobs,
            prompt_lens,
            eos_reached: vec![false; n],
            forward_passes: 0,
        }
    }

    fn tokenizer() -> VocabTokenizer {
        VocabTokenizer::new(
            ["<pad>", "<s>", "</s>", "<unk>", "a", "b", "c"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            1,
            2,
            0,
            3,
        )
        .unwrap()
    }

    #[test]
    fn test_trim_cuts_before_eos() {
        let b = batch(vec![vec![1, 4, 5, EOS, 6, 6]], vec![2], true);
        let seqs = trim_batch(&b, 10, false, EOS);
        assert_eq!(seqs[0].token_ids, vec![5]);
        assert_eq!(seqs[0].logprobs, Some(vec![-2.0]));
        assert_eq!(seqs[0].stop_reason, StopReason::StopToken);
        assert_eq!(seqs[0].prompt_len, 2);
    }

    #[test]
    fn test_trim_max_tokens_and_context() {
        let b = batch(vec![vec![1, 4, 5, 6, 4, 5], vec![1, 4, 4, 4, 5, 6]], vec![1, 4], false);
        let seqs = trim_batch(&b, 3, false, EOS);
        assert_eq!(seqs[0].token_ids, vec![4, 5, 6]);
        assert_eq!(seqs[0].stop_reason, StopReason::MaxTokens);
        // row 1 would need 7 columns
        assert_eq!(seqs[1].token_ids, vec![5, 6]);
        assert_eq!(seqs[1].stop_reason, StopReason::ContextLength);
        assert!(seqs[1].logprobs.is_none());
    }

    #[test]
    fn test_trim_echo_keeps_prompt() {
        let b = batch(vec![vec![1, 4, 5, 6, EOS]], vec![2], true);
        let seqs = trim_batch(&b, 2, true, EOS);
        assert_eq!(seqs[0].token_ids, vec![1, 4, 5, 6]);
        assert_eq!(seqs[0].logprobs, Some(vec![0.0, -1.0, -2.0, -3.0]));
        assert_eq!(seqs[0].stop_reason, StopReason::MaxTokens);
    }

    #[test]
    fn test_completion_prediction_serialization() {
        let tok = tokenizer();
        let seq = GeneratedSequence {
            token_ids: vec![4, 5],
            logprobs: None,
            stop_reason: StopReason::MaxTokens,
            prompt_len: 1,
        };
        let pred = completion_prediction(&tok, &seq);
        assert_eq!(pred.generation, "a b");
        let json = serde_json::to_string(&pred).unwrap();
        assert_eq!(json, r#"{"generation":"a b"}"#);

        let seq = GeneratedSequence {
            logprobs: Some(vec![-0.5, -1.0]),
            ..seq
        };
        let json = serde_json::to_value(completion_prediction(&tok, &seq)).unwrap();
        assert_eq!(json["tokens"], serde_json::json!(["a", "b"]));
        assert_eq!(json["logprobs"], serde_json::json!([-0.5, -1.0]));
    }

    #[test]
    fn test_chat_prediction_unsafe_replaces_text() {
        let tok = tokenizer();
        let seq = GeneratedSequence {
            token_ids: vec![6],
            logprobs: Some(vec![-0.25]),
            stop_reason: StopReason::StopToken,
            prompt_len: 3,
        };
        let safe = chat_prediction(&tok, &seq, false);
        assert_eq!(safe.generation, Message::assistant("c"));
        let flagged = chat_prediction(&tok, &seq, true);
        assert_eq!(flagged.generation.content, UNSAFE_ERROR);
        assert_eq!(flagged.tokens, Some(vec!["c".to_string()]));

        let json = serde_json::to_value(&safe).unwrap();
        assert_eq!(json["generation"]["role"], "assistant");
    }

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(StopReason::StopToken.to_string(), "eos");
        assert_eq!(StopReason::MaxTokens.to_string(), "max_tokens");
        assert_eq!(StopReason::ContextLength.to_string(), "context_length");
    }
}
