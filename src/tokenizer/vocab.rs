//! Word-level tokenizer over a fixed vocabulary.
//!
//! Text is split on whitespace and each word is looked up verbatim; words
//! outside the vocabulary map to the unknown token. Decoding joins words
//! with single spaces and drops the special markers.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::InferenceError;

use super::Tokenizer;

/// On-disk vocabulary description.
#[derive(Debug, Clone, Deserialize)]
pub struct VocabFile {
    pub tokens: Vec<String>,
    pub bos_id: u32,
    pub eos_id: u32,
    pub pad_id: u32,
    pub unk_id: u32,
}

pub struct VocabTokenizer {
    tokens: Vec<String>,
    lookup: HashMap<String, u32>,
    bos_id: u32,
    eos_id: u32,
    pad_id: u32,
    unk_id: u32,
}

impl VocabTokenizer {
    pub fn new(
        tokens: Vec<String>,
        bos_id: u32,
        eos_id: u32,
        pad_id: u32,
        unk_id: u32,
    ) -> Result<Self, InferenceError> {
        for (name, id) in [("bos", bos_id), ("eos", eos_id), ("pad", pad_id), ("unk", unk_id)] {
            if id as usize >= tokens.len() {
                return Err(InferenceError::Tokenizer(format!(
                    "{}_id {} is outside vocabulary of size {}",
                    name,
                    id,
                    tokens.len()
                )));
            }
        }

        let mut lookup = HashMap::with_capacity(tokens.len());
        for (i, tok) in tokens.iter().enumerate() {
            // first occurrence wins on duplicates
            lookup.entry(tok.clone()).or_insert(i as u32);
        }

        Ok(Self {
            tokens,
            lookup,
            bos_id,
            eos_id,
            pad_id,
            unk_id,
        })
    }

    /// Load a vocabulary from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let file: VocabFile = serde_json::from_str(&raw)?;
        info!(path = %path.display(), vocab_size = file.tokens.len(), "Loaded vocabulary");
        Self::new(file.tokens, file.bos_id, file.eos_id, file.pad_id, file.unk_id)
    }

    fn is_special(&self, id: u32) -> bool {
        id == self.bos_id || id == self.eos_id || id == self.pad_id
    }
}

impl Tokenizer for VocabTokenizer {
    fn encode(&self, text: &str, bos: bool, eos: bool) -> Vec<u32> {
        let mut ids = Vec::new();
        if bos {
            ids.push(self.bos_id);
        }
        ids.extend(
            text.split_whitespace()
                .map(|word| self.lookup.get(word).copied().unwrap_or(self.unk_id)),
        );
        if eos {
            ids.push(self.eos_id);
        }
        ids
    }

    fn decode(&self, ids: &[u32]) -> String {
        ids.iter()
            .filter(|&&id| !self.is_special(id))
            .filter_map(|&id| self.tokens.get(id as usize))
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn vocab_size(&self) -> usize {
        self.tokens.len()
    }

    fn bos_id(&self) -> u32 {
        self.bos_id
    }

    fn eos_id(&self) -> u32 {
        self.eos_id
    }

    fn pad_id(&self) -> u32 {
        self.pad_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> Vec<String> {
        ["<pad>", "<s>", "</s>", "<unk>", "[INST]", "[/INST]", "hello", "world"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn test_encode_with_markers() {
        let tok = VocabTokenizer::new(vocab(), 1, 2, 0, 3).unwrap();
        assert_eq!(tok.encode("hello world", true, true), vec![1, 6, 7, 2]);
        assert_eq!(tok.encode("hello", false, false), vec![6]);
        assert_eq!(tok.encode("[INST] hello [/INST]", true, false), vec![1, 4, 6, 5]);
    }

    #[test]
    fn test_unknown_word() {
        let tok = VocabTokenizer::new(vocab(), 1, 2, 0, 3).unwrap();
        assert_eq!(tok.encode("hello mars", false, false), vec![6, 3]);
    }

    #[test]
    fn test_decode_skips_special_markers() {
        let tok = VocabTokenizer::new(vocab(), 1, 2, 0, 3).unwrap();
        assert_eq!(tok.decode(&[1, 6, 7, 2, 0]), "hello world");
        assert_eq!(tok.decode(&[]), "");
        // out of range ids are ignored
        assert_eq!(tok.decode(&[6, 99]), "hello");
    }

    #[test]
    fn test_special_id_out_of_range() {
        let err = VocabTokenizer::new(vocab(), 1, 42, 0, 3).err().unwrap();
        assert!(err.to_string().contains("eos_id 42"), "{}", err);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.json");
        std::fs::write(
            &path,
            r#"{"tokens": ["<pad>", "<s>", "</s>", "<unk>", "hi"], "bos_id": 1, "eos_id": 2, "pad_id": 0, "unk_id": 3}"#,
        )
        .unwrap();
        let tok = VocabTokenizer::from_json_file(&path).unwrap();
        assert_eq!(tok.vocab_size(), 5);
        assert_eq!(tok.encode("hi", true, false), vec![1, 4]);
        assert_eq!(tok.eos_id(), 2);
        assert_eq!(tok.pad_id(), 0);
    }

    #[test]
    fn test_from_json_file_missing() {
        let err = VocabTokenizer::from_json_file("/nonexistent/vocab.json").err().unwrap();
        assert!(matches!(err, InferenceError::Io(_)));
    }

    #[test]
    fn test_from_json_file_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocab.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = VocabTokenizer::from_json_file(&path).err().unwrap();
        assert!(matches!(err, InferenceError::Json(_)));
    }
}
