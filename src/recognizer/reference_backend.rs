//! A reference [`Model`]/[`DecodingBackend`] pair with no real acoustic
//! scoring: an energy gate turns voiced chunks into placeholder words.
//!
//! The acoustic model and decoding graph are external collaborators per
//! the purpose statement — nothing in this crate's corpus bundles an
//! ASR decoder the way `itsmontoya-scribble` bundles `whisper-rs`. This
//! backend exists so the binaries have something to run end to end
//! against a bare `main.conf` with no model artifacts, the same role
//! [`crate::punctuator::NoopClassifier`] plays for punctuation. Register a
//! real [`ModelFactory`](crate::model_registry::ModelFactory) in its place
//! once an acoustic model format is chosen.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::endpoint::EndpointRule;
use super::model::{AdaptationState, DecodingBackend, Model};
use crate::error::Result;
use crate::model_registry::ModelFactory;
use crate::types::AlignedWord;

const DEFAULT_FEATURE_SAMPLE_RATE_HZ: u32 = 16_000;
const DEFAULT_FRAME_SHIFT_MS: f64 = 10.0;
const DEFAULT_VOICE_THRESHOLD: i32 = 500;

pub struct EnergyGateModel {
    language_code: String,
    feature_sample_rate_hz: u32,
    frame_shift_ms: f64,
    voice_threshold: i32,
    rules: Vec<EndpointRule>,
}

impl Model for EnergyGateModel {
    fn language_code(&self) -> &str {
        &self.language_code
    }

    fn feature_sample_rate_hz(&self) -> u32 {
        self.feature_sample_rate_hz
    }

    fn frame_shift_ms(&self) -> f64 {
        self.frame_shift_ms
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
        let frame_len = ((self.feature_sample_rate_hz as f64 * self.frame_shift_ms / 1000.0)
            .round() as usize)
            .max(1);
        Box::new(EnergyGateBackend::new(
            frame_len,
            self.voice_threshold,
            self.frame_shift_ms,
        ))
    }
}

/// Buckets incoming samples into fixed-length frames and calls a chunk of
/// consecutive voiced frames one word, the way a real decoder would call
/// one word per acoustic-evidence run but without any lexicon or language
/// model behind it.
struct EnergyGateBackend {
    frame_len: usize,
    voice_threshold: i32,
    carry: Vec<i16>,
    frames_decoded: u64,
    trailing_silence: u64,
    in_word: bool,
    word_start_frame: u64,
    words: Vec<AlignedWord>,
    frame_shift_ms: f64,
}

impl EnergyGateBackend {
    fn new(frame_len: usize, voice_threshold: i32, frame_shift_ms: f64) -> Self {
        EnergyGateBackend {
            frame_len,
            voice_threshold,
            carry: Vec::new(),
            frames_decoded: 0,
            trailing_silence: 0,
            in_word: false,
            word_start_frame: 0,
            words: Vec::new(),
            frame_shift_ms,
        }
    }

    fn rms(frame: &[i16]) -> i32 {
        if frame.is_empty() {
            return 0;
        }
        let sum: i64 = frame.iter().map(|&s| (s as i64).abs()).sum();
        (sum / frame.len() as i64) as i32
    }

    fn observe_frame(&mut self, frame: &[i16]) {
        let voiced = Self::rms(frame) >= self.voice_threshold;
        if voiced {
            self.trailing_silence = 0;
            if !self.in_word {
                self.in_word = true;
                self.word_start_frame = self.frames_decoded;
            }
        } else {
            self.trailing_silence += 1;
            if self.in_word {
                self.close_word();
            }
        }
        self.frames_decoded += 1;
    }

    fn close_word(&mut self) {
        self.in_word = false;
        let start_ms =
            super::endpoint::frames_to_ms(self.word_start_frame, self.frame_shift_ms, 1);
        let end_ms = super::endpoint::frames_to_ms(self.frames_decoded, self.frame_shift_ms, 1);
        self.words.push(AlignedWord {
            start_time_ms: start_ms,
            duration_ms: (end_ms - start_ms).max(1),
            symbol: format!("word{}", self.words.len()),
        });
    }
}

impl DecodingBackend for EnergyGateBackend {
    fn decode(&mut self, pcm_chunk: &[i16], flush: bool) {
        self.carry.extend_from_slice(pcm_chunk);
        let mut offset = 0;
        while self.carry.len() - offset >= self.frame_len {
            let frame = self.carry[offset..offset + self.frame_len].to_vec();
            self.observe_frame(&frame);
            offset += self.frame_len;
        }
        self.carry.drain(..offset);

        if flush {
            if !self.carry.is_empty() {
                let frame = std::mem::take(&mut self.carry);
                self.observe_frame(&frame);
            }
            if self.in_word {
                self.close_word();
            }
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
        self.words
            .iter()
            .map(|w| w.symbol.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn n_best_aligned(&self, max_alt: u32) -> Vec<Vec<AlignedWord>> {
        let mut alts = vec![self.words.clone()];
        for _ in 1..max_alt {
            alts.push(self.words.clone());
        }
        alts
    }

    fn adaptation_state(&self) -> AdaptationState {
        AdaptationState(vec![self.frames_decoded as f32])
    }
}

/// Builds an [`EnergyGateModel`] from `main.conf`, reading
/// `feature-sample-rate-hz`, `frame-shift-ms`, and `voice-threshold` when
/// present and falling back to sane defaults otherwise.
pub struct EnergyGateModelFactory;

impl ModelFactory for EnergyGateModelFactory {
    fn build(&self, _model_dir: &Path, main_conf: &HashMap<String, String>) -> Result<Arc<dyn Model>> {
        let language_code = main_conf
            .get("language-code")
            .cloned()
            .unwrap_or_default();
        let feature_sample_rate_hz = main_conf
            .get("feature-sample-rate-hz")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_FEATURE_SAMPLE_RATE_HZ);
        let frame_shift_ms = main_conf
            .get("frame-shift-ms")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_FRAME_SHIFT_MS);
        let voice_threshold = main_conf
            .get("voice-threshold")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_VOICE_THRESHOLD);

        Ok(Arc::new(EnergyGateModel {
            language_code,
            feature_sample_rate_hz,
            frame_shift_ms,
            voice_threshold,
            rules: vec![EndpointRule {
                min_trailing_silence_frames: 50,
                min_utterance_frames: 1,
                relative_cost_max: f64::INFINITY,
            }],
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(n: usize) -> Vec<i16> {
        vec![20_000; n]
    }
    fn silence(n: usize) -> Vec<i16> {
        vec![0; n]
    }

    #[test]
    fn factory_falls_back_to_defaults_when_fields_absent() {
        let model = EnergyGateModelFactory
            .build(Path::new("/unused"), &HashMap::new())
            .unwrap();
        assert_eq!(model.feature_sample_rate_hz(), DEFAULT_FEATURE_SAMPLE_RATE_HZ);
        assert_eq!(model.frame_shift_ms(), DEFAULT_FRAME_SHIFT_MS);
    }

    #[test]
    fn backend_closes_word_on_silence_and_flush() {
        let model = EnergyGateModelFactory
            .build(Path::new("/unused"), &HashMap::new())
            .unwrap();
        let mut backend = model.new_backend(AdaptationState::default(), &[]);
        backend.decode(&tone(1600), false);
        backend.decode(&silence(1600), false);
        backend.decode(&[], true);
        let words = backend.n_best_aligned(1);
        assert_eq!(words[0].len(), 1);
    }
}
