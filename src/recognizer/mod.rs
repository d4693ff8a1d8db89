//! Recognizer: the per-utterance decoder state machine. Owns a decoder
//! instance, a feature pipeline (inside the [`model::DecodingBackend`]),
//! an adaptation state, and an optional left-context word list from the
//! previous finalized segment, per the Recognizer state data model.
//!
//! Grounded on `original_source/src/recognizer.h/.cc`'s operation set.

pub mod endpoint;
pub mod model;
pub mod reference_backend;

use std::sync::Arc;

use crate::formatter::Formatter;
use crate::punctuator::Punctuator;
use crate::types::{Alternative, AlignedWord, normalize_max_alternatives};
use endpoint::{EndpointRule, has_endpoint, single_utterance_leading_silence_rule};
use model::{AdaptationState, DecodingBackend, Model};

/// The result of [`Recognizer::get_results`]: the 1-best aligned words
/// (after formatting/punctuation) plus the full alternative list.
pub struct Results {
    pub best_aligned: Vec<AlignedWord>,
    pub alternatives: Vec<Alternative>,
}

pub struct Recognizer {
    model: Arc<dyn Model>,
    backend: Box<dyn DecodingBackend>,
    adaptation_state: AdaptationState,
    left_context: Vec<AlignedWord>,
    formatter: Option<Arc<dyn Formatter>>,
    punctuator: Option<Arc<Punctuator>>,
}

impl Recognizer {
    /// `left_context` seeds the post-processing punctuator; it is the
    /// tail word sequence of the previous finalized segment.
    pub fn new(
        model: Arc<dyn Model>,
        adaptation_state: AdaptationState,
        left_context: Vec<AlignedWord>,
        formatter: Option<Arc<dyn Formatter>>,
        punctuator: Option<Arc<Punctuator>>,
    ) -> Self {
        let backend = model.new_backend(adaptation_state.clone(), &left_context);
        Recognizer {
            model,
            backend,
            adaptation_state,
            left_context,
            formatter,
            punctuator,
        }
    }

    /// Resets decoder state for a new segment, re-seeding from the
    /// current adaptation state and left context. The orchestrator's
    /// segment loop calls this at the top of every iteration.
    pub fn init_segment(&mut self) {
        self.backend = self
            .model
            .new_backend(self.adaptation_state.clone(), &self.left_context);
    }

    pub fn decode(&mut self, pcm_chunk: &[i16], flush: bool) {
        self.backend.decode(pcm_chunk, flush);
    }

    fn endpoint_rules(&self, single_utterance: bool) -> Vec<EndpointRule> {
        let mut rules = self.model.endpoint_rules().to_vec();
        if single_utterance {
            rules.push(single_utterance_leading_silence_rule(
                self.model.frame_shift_ms(),
            ));
        }
        rules
    }

    pub fn has_endpoint(&self, single_utterance: bool) -> bool {
        has_endpoint(
            &self.endpoint_rules(single_utterance),
            self.backend.num_frames_decoded(),
            self.backend.trailing_silence_frames(),
            self.backend.relative_cost(),
        )
    }

    pub fn num_frames_decoded(&self) -> u64 {
        self.backend.num_frames_decoded()
    }

    /// Signals end of input to the feature pipeline.
    pub fn finalize(&mut self) {
        self.backend.decode(&[], true);
    }

    /// Snapshots adaptation state and replaces left context with this
    /// segment's 1-best words. Called once per finalized segment.
    pub fn end_segment(&mut self) {
        self.adaptation_state = self.backend.adaptation_state();
        self.left_context = self
            .backend
            .n_best_aligned(1)
            .into_iter()
            .next()
            .unwrap_or_default();
    }

    pub fn get_best_hypothesis(&self, end_of_utt: bool) -> String {
        self.backend.best_hypothesis_text(end_of_utt)
    }

    /// Computes up to `max_alt` alternatives; alternative 0 carries
    /// word-level timings (after formatting and, if requested, automatic
    /// punctuation). Punctuation is applied only to alternative 0 and only
    /// when `end_of_utt` (§4.4 step 5).
    pub fn get_results(&self, max_alt: u32, end_of_utt: bool, punctuate: bool) -> Results {
        let max_alt = normalize_max_alternatives(max_alt);
        let n_best = self.backend.n_best_aligned(max_alt);

        let mut best_aligned = n_best.first().cloned().unwrap_or_default();
        if let Some(formatter) = &self.formatter {
            best_aligned = formatter.format(&best_aligned);
        }

        if punctuate && end_of_utt {
            if let Some(punctuator) = &self.punctuator {
                let symbols: Vec<String> =
                    best_aligned.iter().map(|w| w.symbol.clone()).collect();
                let left_context_symbols: Vec<String> =
                    self.left_context.iter().map(|w| w.symbol.clone()).collect();
                let punctuated =
                    punctuator.punctuate_with_context(&symbols, &left_context_symbols, true);
                for (word, new_symbol) in best_aligned.iter_mut().zip(punctuated) {
                    word.symbol = new_symbol;
                }
            }
        }

        let mut alternatives = Vec::with_capacity(n_best.len());
        for (i, words) in n_best.iter().enumerate() {
            let words_for_alt = if i == 0 { &best_aligned } else { words };
            let transcript = words_for_alt
                .iter()
                .map(|w| w.symbol.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            alternatives.push(Alternative {
                transcript,
                confidence: 0.0,
                words: if i == 0 {
                    Some(best_aligned.clone())
                } else {
                    None
                },
                speaker_tags: None,
            });
        }

        Results {
            best_aligned,
            alternatives,
        }
    }

    pub fn get_left_context(&self) -> &[AlignedWord] {
        &self.left_context
    }

    pub fn get_adaptation_state(&self) -> AdaptationState {
        self.adaptation_state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::test_support::ToyBackend;

    struct ToyModel {
        rules: Vec<EndpointRule>,
    }

    impl Model for ToyModel {
        fn language_code(&self) -> &str {
            "is-IS"
        }
        fn feature_sample_rate_hz(&self) -> u32 {
            16_000
        }
        fn frame_shift_ms(&self) -> f64 {
            10.0
        }
        fn frame_subsampling_factor(&self) -> u32 {
            1
        }
        fn endpoint_rules(&self) -> &[EndpointRule] {
            &self.rules
        }
        fn new_backend(
            &self,
            _adaptation: AdaptationState,
            _left_context: &[AlignedWord],
        ) -> Box<dyn DecodingBackend> {
            Box::new(ToyBackend::new(1000))
        }
    }

    fn tone_chunk(n: usize) -> Vec<i16> {
        vec![20_000; n]
    }

    fn silence_chunk(n: usize) -> Vec<i16> {
        vec![0; n]
    }

    #[test]
    fn decode_accumulates_words_and_endpoint_fires_after_silence() {
        let model = Arc::new(ToyModel {
            rules: vec![EndpointRule {
                min_trailing_silence_frames: 3,
                min_utterance_frames: 1,
                relative_cost_max: 1.0,
            }],
        });
        let mut rec = Recognizer::new(model, AdaptationState::default(), Vec::new(), None, None);
        rec.decode(&tone_chunk(320), false);
        assert!(!rec.has_endpoint(false));
        rec.decode(&silence_chunk(320), false);
        rec.decode(&silence_chunk(320), false);
        assert!(!rec.has_endpoint(false));
        rec.decode(&silence_chunk(320), false);
        assert!(rec.has_endpoint(false));
    }

    #[test]
    fn end_segment_carries_left_context_and_adaptation_forward() {
        let model = Arc::new(ToyModel { rules: vec![] });
        let mut rec = Recognizer::new(model, AdaptationState::default(), Vec::new(), None, None);
        rec.decode(&tone_chunk(320), false);
        rec.finalize();
        rec.end_segment();
        assert!(!rec.get_left_context().is_empty());
        assert_ne!(rec.get_adaptation_state(), AdaptationState::default());
    }

    /// Testable property 2 (partial): within one segment's results, word
    /// i+1's start_time >= word i's start_time.
    #[test]
    fn results_words_are_monotonically_ordered() {
        let model = Arc::new(ToyModel { rules: vec![] });
        let mut rec = Recognizer::new(model, AdaptationState::default(), Vec::new(), None, None);
        rec.decode(&tone_chunk(320), false);
        rec.decode(&tone_chunk(320), false);
        rec.decode(&tone_chunk(320), false);
        let results = rec.get_results(1, true, false);
        for pair in results.best_aligned.windows(2) {
            assert!(pair[1].start_time_ms >= pair[0].start_time_ms);
        }
    }

    #[test]
    fn alternatives_beyond_first_have_no_word_timings() {
        let model = Arc::new(ToyModel { rules: vec![] });
        let mut rec = Recognizer::new(model, AdaptationState::default(), Vec::new(), None, None);
        rec.decode(&tone_chunk(320), false);
        let results = rec.get_results(3, true, false);
        assert!(results.alternatives[0].words.is_some());
        for alt in &results.alternatives[1..] {
            assert!(alt.words.is_none());
        }
    }
}
