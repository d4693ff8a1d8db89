//! Punctuator: predicts end-of-word punctuation and sentence-initial
//! capitalization from a word sequence via a text classifier, per §4.6.
//!
//! Grounded on `original_source/src/itn/punctuation.h`'s `ElectraPunctuator`
//! (CLS/SEP batching, `Punctuate`/`PunctuateWithContext` signatures) for
//! the control flow; the classifier itself (`torch::jit::Module` there) is
//! a trait here since no `torch`/`tch` dependency exists anywhere in this
//! crate's corpus — it is an external collaborator per the purpose
//! statement, same as the acoustic model.

pub mod wordpiece;

use wordpiece::WordPieceTokenizer;

/// Per-word-piece punctuation label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    O,
    Comma,
    Period,
    Question,
}

impl Label {
    fn to_char(self) -> Option<char> {
        match self {
            Label::O => None,
            Label::Comma => Some(','),
            Label::Period => Some('.'),
            Label::Question => Some('?'),
        }
    }

    fn ends_sentence(self) -> bool {
        matches!(self, Label::Period | Label::Question)
    }
}

/// Stands in for the traced classifier model: given the CLS/SEP-wrapped
/// word-piece sequence, returns one label per *piece* (excluding CLS/SEP).
pub trait PunctuationClassifier: Send + Sync {
    fn classify(&self, pieces: &[String]) -> Vec<Label>;
}

/// A classifier that never predicts anything: every piece is `O`. Useful
/// as a safe default when no punctuation model is registered for a
/// language.
pub struct NoopClassifier;

impl PunctuationClassifier for NoopClassifier {
    fn classify(&self, pieces: &[String]) -> Vec<Label> {
        vec![Label::O; pieces.len()]
    }
}

pub struct Punctuator {
    tokenizer: WordPieceTokenizer,
    classifier: Box<dyn PunctuationClassifier>,
}

fn last_char_ends_sentence(word: &str) -> bool {
    matches!(word.chars().last(), Some('.') | Some('?') | Some('!'))
}

fn uppercase_first_char(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl Punctuator {
    pub fn new(tokenizer: WordPieceTokenizer, classifier: Box<dyn PunctuationClassifier>) -> Self {
        Punctuator {
            tokenizer,
            classifier,
        }
    }

    pub fn punctuate(&self, words: &[String], capitalize: bool) -> Vec<String> {
        self.punctuate_with_context(words, &[], capitalize)
    }

    /// `left_context`'s last word's last character decides whether the
    /// very first output word should be capitalized (§4.6 step 5).
    pub fn punctuate_with_context(
        &self,
        words: &[String],
        left_context: &[String],
        capitalize: bool,
    ) -> Vec<String> {
        if words.is_empty() {
            return Vec::new();
        }

        let (pieces, first_piece_of_word) = self.tokenizer.tokenize_with_word_boundaries(words);
        let piece_labels = self.classifier.classify(&pieces);

        let mut capitalize_next = capitalize
            && left_context
                .last()
                .is_some_and(|w| last_char_ends_sentence(w));

        let mut out = Vec::with_capacity(words.len());
        for (i, word) in words.iter().enumerate() {
            let mut new_word = if capitalize && capitalize_next {
                uppercase_first_char(word)
            } else {
                word.clone()
            };

            let label = first_piece_of_word
                .get(i)
                .and_then(|&idx| piece_labels.get(idx))
                .copied()
                .unwrap_or(Label::O);

            if let Some(ch) = label.to_char() {
                new_word.push(ch);
            }
            capitalize_next = label.ends_sentence();
            out.push(new_word);
        }
        out
    }
}
