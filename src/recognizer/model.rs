//! The acoustic/decoding-graph model and its frame-incremental decoding
//! backend: both are external collaborators per the purpose & scope
//! statement ("loaded from disk; treated as external collaborators"), so
//! this module defines the seam rather than a concrete model format.
//!
//! Grounded on `original_source/src/recognizer.h/.cc`'s operation set.

use crate::recognizer::endpoint::EndpointRule;
use crate::types::AlignedWord;

/// An opaque snapshot of speaker/channel adaptation statistics, carried
/// across segments. Treated as an owned value the orchestrator passes
/// into the next `Recognizer`'s constructor; never shared mutably (§9).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdaptationState(pub Vec<f32>);

/// A registered model: acoustic scorer, decoding graph, and the
/// configuration that drives endpointing and frame/ms conversion. Shared
/// by reference across concurrently-running calls; never mutated after
/// registration (§3 Ownership).
pub trait Model: Send + Sync {
    fn language_code(&self) -> &str;

    /// The rate features are extracted at; the Orchestrator resamples
    /// incoming audio to this rate if it differs.
    fn feature_sample_rate_hz(&self) -> u32;

    fn frame_shift_ms(&self) -> f64;

    fn frame_subsampling_factor(&self) -> u32;

    fn endpoint_rules(&self) -> &[EndpointRule];

    /// Builds a fresh per-call decoding backend seeded with `adaptation`
    /// and `left_context`.
    fn new_backend(
        &self,
        adaptation: AdaptationState,
        left_context: &[AlignedWord],
    ) -> Box<dyn DecodingBackend>;
}

/// Per-segment decoder state: feature pipeline + lattice decoder. One
/// instance is owned by exactly one `Recognizer` at a time.
pub trait DecodingBackend: Send {
    /// Feeds one chunk of mono PCM at the model's feature rate into the
    /// feature pipeline and advances decoding. `flush` signals end of
    /// input to the feature pipeline (segment end or stream end).
    fn decode(&mut self, pcm_chunk: &[i16], flush: bool);

    fn num_frames_decoded(&self) -> u64;

    /// Frames of trailing silence observed since the last non-silent
    /// frame, for endpoint rule evaluation.
    fn trailing_silence_frames(&self) -> u64;

    /// Current best-path score relative to the best hypothesis ever seen
    /// (0.0 == at the best).
    fn relative_cost(&self) -> f64;

    /// Cheap best-hypothesis text, for interim updates. Timings relative
    /// to segment start.
    fn best_hypothesis_text(&self, end_of_utt: bool) -> String;

    /// Up to `max_alt` word-aligned hypotheses, best first, timings
    /// relative to segment start. Only the first (1-best) carries
    /// trustworthy word alignment in every backend; callers should not
    /// assume alternatives 1..k-1 have populated `words`.
    fn n_best_aligned(&self, max_alt: u32) -> Vec<Vec<AlignedWord>>;

    fn adaptation_state(&self) -> AdaptationState;
}

#[cfg(test)]
pub(crate) mod test_support {
    //! A deterministic backend double used by the recognizer's own unit
    //! tests and by orchestrator tests, grounded on the teacher's
    //! `DummyBackend` test double (`scribble.rs`'s test module): it turns
    //! silence-bounded tone bursts into fixed-duration words without any
    //! real acoustic scoring.

    use super::*;

    /// Treats any chunk whose RMS exceeds `voice_threshold` as one word of
    /// speech lasting the whole chunk; accumulates trailing silence frames
    /// otherwise. One "frame" is one decode() call for simplicity.
    pub struct ToyBackend {
        pub voice_threshold: i32,
        pub words_emitted: Vec<AlignedWord>,
        pub frames_decoded: u64,
        pub trailing_silence: u64,
        pub next_word_index: usize,
    }

    impl ToyBackend {
        pub fn new(voice_threshold: i32) -> Self {
            ToyBackend {
                voice_threshold,
                words_emitted: Vec::new(),
                frames_decoded: 0,
                trailing_silence: 0,
                next_word_index: 0,
            }
        }
    }

    impl DecodingBackend for ToyBackend {
        fn decode(&mut self, pcm_chunk: &[i16], _flush: bool) {
            self.frames_decoded += 1;
            let rms = if pcm_chunk.is_empty() {
                0
            } else {
                let sum: i64 = pcm_chunk.iter().map(|&s| (s as i64).abs()).sum();
                (sum / pcm_chunk.len() as i64) as i32
            };
            let chunk_ms = (pcm_chunk.len() as i64 * 1000)
                / 16_000i64.max(1);
            if rms >= self.voice_threshold {
                self.trailing_silence = 0;
                let start = self
                    .words_emitted
                    .last()
                    .map(|w| w.end_time_ms())
                    .unwrap_or(0);
                self.words_emitted.push(AlignedWord {
                    start_time_ms: start,
                    duration_ms: chunk_ms.max(1),
                    symbol: format!("word{}", self.next_word_index),
                });
                self.next_word_index += 1;
            } else {
                self.trailing_silence += 1;
            }
        }

        fn num_frames_decoded(&self) -> u64 {
            self.frames_decoded
        }

        fn trailing_silence_frames(&self) -> u64 {
            self.trailing_silence
        }

        fn relative_cost(&self) -> f64 {
            0.0
        }

        fn best_hypothesis_text(&self, _end_of_utt: bool) -> String {
            self.words_emitted
                .iter()
                .map(|w| w.symbol.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        }

        fn n_best_aligned(&self, max_alt: u32) -> Vec<Vec<AlignedWord>> {
            let mut alts = vec![self.words_emitted.clone()];
            for _ in 1..max_alt {
                alts.push(self.words_emitted.clone());
            }
            alts
        }

        fn adaptation_state(&self) -> AdaptationState {
            AdaptationState(vec![self.frames_decoded as f32])
        }
    }
}
