//! Greedy longest-match WordPiece tokenizer.
//!
//! Grounded on `original_source/src/itn/wordpiece.cc`: for each word, walk
//! from the start looking for the longest vocabulary entry that matches
//! the remaining suffix (continuation pieces prefixed with `##`); a word
//! that can't be fully covered, or that exceeds
//! `max_input_chars_per_word`, becomes a single `unk_token`.

use std::collections::HashMap;

pub struct WordPieceTokenizer {
    vocab: Vec<String>,
    vocab_index: HashMap<String, usize>,
    unk_token: String,
    max_input_chars_per_word: usize,
}

impl WordPieceTokenizer {
    pub fn new(vocab: Vec<String>, unk_token: impl Into<String>, max_input_chars_per_word: usize) -> Self {
        let vocab_index = vocab
            .iter()
            .enumerate()
            .map(|(i, w)| (w.clone(), i))
            .collect();
        WordPieceTokenizer {
            vocab,
            vocab_index,
            unk_token: unk_token.into(),
            max_input_chars_per_word,
        }
    }

    /// Tokenizes `words` into word-pieces, flattened across all words.
    pub fn tokenize(&self, words: &[String]) -> Vec<String> {
        self.tokenize_with_word_boundaries(words).0
    }

    /// Same as [`tokenize`](Self::tokenize), but also returns, for each
    /// input word, the index into the returned piece vector of that
    /// word's *first* piece — used to collapse per-piece classifier
    /// predictions back onto whole words (§4.6 step 3).
    pub fn tokenize_with_word_boundaries(&self, words: &[String]) -> (Vec<String>, Vec<usize>) {
        let mut pieces = Vec::new();
        let mut first_piece_of_word = Vec::with_capacity(words.len());

        for word in words {
            first_piece_of_word.push(pieces.len());
            pieces.extend(self.tokenize_one(word));
        }
        (pieces, first_piece_of_word)
    }

    fn tokenize_one(&self, token: &str) -> Vec<String> {
        let chars: Vec<char> = token.chars().collect();
        if chars.len() > self.max_input_chars_per_word {
            return vec![self.unk_token.clone()];
        }

        let mut sub_tokens = Vec::new();
        let mut start = 0usize;
        let mut is_bad = false;
        while start < chars.len() {
            let mut end = chars.len();
            let mut current: Option<String> = None;
            while start < end {
                let mut substr: String = chars[start..end].iter().collect();
                if start > 0 {
                    substr = format!("##{substr}");
                }
                if self.vocab_index.contains_key(&substr) {
                    current = Some(substr);
                    break;
                }
                end -= 1;
            }
            match current {
                Some(piece) => {
                    sub_tokens.push(piece);
                    start = end;
                }
                None => {
                    is_bad = true;
                    break;
                }
            }
        }

        if is_bad {
            vec![self.unk_token.clone()]
        } else {
            sub_tokens
        }
    }

    /// Merges continuation pieces back into whole words. Not used by the
    /// punctuation pipeline (which collapses by index instead), but kept
    /// as a faithful port since it is part of the tokenizer's documented
    /// contract.
    pub fn merge(&self, pieces: &[String]) -> Vec<String> {
        let mut words: Vec<String> = Vec::new();
        for piece in pieces {
            if let Some(rest) = piece.strip_prefix("##") {
                if let Some(last) = words.last_mut() {
                    last.push_str(rest);
                    continue;
                }
            }
            words.push(piece.clone());
        }
        words
    }

    pub fn vocab(&self) -> &[String] {
        &self.vocab
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer() -> WordPieceTokenizer {
        let vocab = ["un", "##aff", "##able", "hello", "[UNK]"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        WordPieceTokenizer::new(vocab, "[UNK]", 100)
    }

    #[test]
    fn splits_known_word_into_pieces() {
        let t = tokenizer();
        let pieces = t.tokenize(&["unaffable".to_string()]);
        assert_eq!(pieces, vec!["un", "##aff", "##able"]);
    }

    #[test]
    fn whole_word_match_is_single_piece() {
        let t = tokenizer();
        assert_eq!(t.tokenize(&["hello".to_string()]), vec!["hello"]);
    }

    #[test]
    fn unmatched_word_becomes_unk() {
        let t = tokenizer();
        assert_eq!(t.tokenize(&["xyz".to_string()]), vec!["[UNK]"]);
    }

    #[test]
    fn overlong_word_becomes_unk_without_trying_to_split() {
        let t = WordPieceTokenizer::new(vec!["hello".into()], "[UNK]", 3);
        assert_eq!(t.tokenize(&["hello".to_string()]), vec!["[UNK]"]);
    }

    #[test]
    fn word_boundaries_point_at_first_piece_of_each_word() {
        let t = tokenizer();
        let (pieces, bounds) =
            t.tokenize_with_word_boundaries(&["hello".to_string(), "unaffable".to_string()]);
        assert_eq!(pieces, vec!["hello", "un", "##aff", "##able"]);
        assert_eq!(bounds, vec![0, 1]);
    }

    #[test]
    fn merge_reassembles_continuation_pieces() {
        let t = tokenizer();
        let merged = t.merge(&["un".into(), "##aff".into(), "##able".into()]);
        assert_eq!(merged, vec!["unaffable"]);
    }
}
