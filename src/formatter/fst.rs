//! The lexicon/rewrite automaton: a byte/word-level rewrite grammar that
//! carries [`TimingWeight`]s through composition so output words keep
//! defensible timings even when the rewrite merges or splits input words.
//!
//! Grounded on `original_source/src/itn/formatter.cc`'s
//! `LookAheadFormatter::FormatWords` (compose word-symbol FST against the
//! rewrite FST, `ArcMap` the result into a parallel timing FST, recover
//! `(word, interval)` pairs). No FST library exists anywhere in this
//! crate's dependency corpus, so rather than fabricate one, the
//! lexicon ∘ rewrite composition is represented directly as a greedy
//! longest-match rule list over the word sequence — the exact algebra the
//! design specifies (times-fold for merges, first-arc-inherits for
//! splits) is preserved; only the "compiled as two separate composed
//! FSTs" mechanism is specialized to this crate's simpler static rule set.

use crate::formatter::semiring::{TimingWeight, times_fold};
use crate::types::AlignedWord;

/// One entry of the rewrite grammar: a run of `input_words` (matched
/// case-insensitively) rewritten to `output_words`.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pub input_words: Vec<String>,
    pub output_words: Vec<String>,
}

impl RewriteRule {
    pub fn new(input_words: &[&str], output_words: &[&str]) -> Self {
        RewriteRule {
            input_words: input_words.iter().map(|s| s.to_lowercase()).collect(),
            output_words: output_words.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Applies `rules` to `words` by a greedy longest-match walk over the
/// input, composing per-word [`TimingWeight`]s under `⊗` whenever a rule
/// spans more than one input word, and implementing the one-to-many split
/// rule from §4.5: the full source span lands on the first output word;
/// later output words get a zero-length interval anchored at the source
/// span's end, "inheriting" from the last weighted arc as the design
/// describes.
pub fn apply_rewrite(rules: &[RewriteRule], words: &[AlignedWord]) -> Vec<AlignedWord> {
    // Longest input match wins at each position, mirroring a composed FST
    // preferring the longest accepting path through the rewrite grammar.
    let mut by_len: Vec<&RewriteRule> = rules.iter().collect();
    by_len.sort_by(|a, b| b.input_words.len().cmp(&a.input_words.len()));

    let mut out = Vec::with_capacity(words.len());
    let mut i = 0;
    while i < words.len() {
        let matched = by_len.iter().find_map(|rule| {
            let n = rule.input_words.len();
            if n == 0 || i + n > words.len() {
                return None;
            }
            let is_match = words[i..i + n]
                .iter()
                .zip(&rule.input_words)
                .all(|(w, expect)| w.symbol.to_lowercase() == *expect);
            is_match.then_some((*rule, n))
        });

        match matched {
            Some((rule, n)) => {
                let span: TimingWeight = times_fold(
                    words[i..i + n]
                        .iter()
                        .map(|w| TimingWeight::from_interval(w.start_time_ms, w.end_time_ms())),
                );
                let (span_start, span_end) = span.to_interval().unwrap_or((0, 0));
                for (j, out_word) in rule.output_words.iter().enumerate() {
                    if j == 0 {
                        out.push(AlignedWord {
                            start_time_ms: span_start,
                            duration_ms: (span_end - span_start).max(0),
                            symbol: out_word.clone(),
                        });
                    } else {
                        out.push(AlignedWord {
                            start_time_ms: span_end,
                            duration_ms: 0,
                            symbol: out_word.clone(),
                        });
                    }
                }
                i += n;
            }
            None => {
                out.push(words[i].clone());
                i += 1;
            }
        }
    }
    out
}
