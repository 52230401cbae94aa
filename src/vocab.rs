//! Token vocabulary: id-to-surface-form mapping and greedy tokenization.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use thiserror::Error;

use crate::types::TID;

#[derive(Debug, Error)]
pub enum VocabularyError {
    #[error("no token with id {id} (vocabulary size {vocab_size})")]
    UnknownTokenId { id: TID, vocab_size: usize },

    #[error("cannot tokenize input at byte {position}: no vocabulary entry matches")]
    Untokenizable { position: usize },

    #[error("vocabulary file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("vocabulary parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Maps token ids to their textual surface form and back.
///
/// Loaded once per process from `vocab.json` (a JSON array of strings,
/// index = token id) and shared read-only across generations; lookups are
/// idempotent for the lifetime of the loaded model.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    tokens: Vec<String>,
    by_surface: HashMap<String, TID>,
    max_token_bytes: usize,
}

impl Vocabulary {
    pub fn new(tokens: Vec<String>) -> Self {
        let mut by_surface = HashMap::with_capacity(tokens.len());
        let mut max_token_bytes = 0;
        for (id, tok) in tokens.iter().enumerate() {
            max_token_bytes = max_token_bytes.max(tok.len());
            // First occurrence wins so duplicate surface forms keep the
            // lowest id.
            by_surface.entry(tok.clone()).or_insert(id as TID);
        }
        Self {
            tokens,
            by_surface,
            max_token_bytes,
        }
    }

    /// Reads a JSON array of token surface forms.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, VocabularyError> {
        let tokens: Vec<String> = serde_json::from_reader(reader)?;
        Ok(Self::new(tokens))
    }

    pub fn load(path: &Path) -> Result<Self, VocabularyError> {
        Self::from_reader(std::fs::File::open(path)?)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The surface form of a token id. Fails for out-of-range ids.
    pub fn token_by_id(&self, id: TID) -> Result<&str, VocabularyError> {
        self.tokens
            .get(id as usize)
            .map(String::as_str)
            .ok_or(VocabularyError::UnknownTokenId {
                id,
                vocab_size: self.tokens.len(),
            })
    }

    /// Greedy longest-match tokenization: at each position, the longest
    /// vocabulary entry prefixing the remaining input wins. Fails when no
    /// entry covers the next byte.
    pub fn tokenize(&self, text: &str) -> Result<Vec<TID>, VocabularyError> {
        let bytes = text.as_bytes();
        let mut ids = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let limit = self.max_token_bytes.min(bytes.len() - pos);
            let mut matched = None;
            for len in (1..=limit).rev() {
                // Candidate slices must stay on char boundaries to form
                // valid &str keys.
                let Some(candidate) = text.get(pos..pos + len) else {
                    continue;
                };
                if let Some(&id) = self.by_surface.get(candidate) {
                    matched = Some((id, len));
                    break;
                }
            }
            match matched {
                Some((id, len)) => {
                    ids.push(id);
                    pos += len;
                }
                None => return Err(VocabularyError::Untokenizable { position: pos }),
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> Vocabulary {
        Vocabulary::new(
            ["<eos>", "a", "b", "ab", "abc", " "]
                .into_iter()
                .map(String::from)
                .collect(),
        )
    }

    #[test]
    fn test_token_by_id() {
        let v = vocab();
        assert_eq!(v.token_by_id(1).unwrap(), "a");
        assert_eq!(v.token_by_id(4).unwrap(), "abc");
        assert!(matches!(
            v.token_by_id(6),
            Err(VocabularyError::UnknownTokenId { id: 6, .. })
        ));
    }

    #[test]
    fn test_token_by_id_idempotent() {
        let v = vocab();
        let first = v.token_by_id(3).unwrap().to_string();
        for _ in 0..10 {
            assert_eq!(v.token_by_id(3).unwrap(), first);
        }
    }

    #[test]
    fn test_tokenize_longest_match() {
        let v = vocab();
        // "abc" wins over "ab"+"c"-less splits; "ab" wins over "a"+"b".
        assert_eq!(v.tokenize("abc").unwrap(), vec![4]);
        assert_eq!(v.tokenize("ab a").unwrap(), vec![3, 5, 1]);
        assert_eq!(v.tokenize("ba").unwrap(), vec![2, 1]);
    }

    #[test]
    fn test_tokenize_unknown_input() {
        let v = vocab();
        let err = v.tokenize("ax").unwrap_err();
        assert!(matches!(err, VocabularyError::Untokenizable { position: 1 }));
    }

    #[test]
    fn test_json_round_trip() {
        let json = r#"["x", "y", "xy"]"#;
        let v = Vocabulary::from_reader(json.as_bytes()).unwrap();
        assert_eq!(v.len(), 3);
        assert_eq!(v.tokenize("xyx").unwrap(), vec![2, 0]);
    }
}
