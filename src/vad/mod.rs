//! VAD Gate: a fixed-rate, frame-based voice activity detector used only
//! to skip leading silence at the start of a segment.
//!
//! Grounded on `original_source/src/vad.h/.cc`'s `Vad::HasSpeech` contract
//! (true if *any* frame within the input is classified voiced; frames are
//! 10/20/30 ms at 8/16/32/48 kHz) rather than the teacher's neural
//! (Silero) VAD — an energy threshold is used instead so this component
//! has no model-file dependency, consistent with the recognizer/diarizer
//! embedding extractors also being trait-based external collaborators.

use crate::error::{Error, Result};

/// Frame lengths the gate accepts, matching the WebRTC-style contract the
/// reference VAD documents.
const VALID_FRAME_MS: [u32; 3] = [10, 20, 30];
const VALID_RATES_HZ: [u32; 4] = [8_000, 16_000, 32_000, 48_000];

/// Energy-threshold frame classifier. `threshold` is compared against the
/// root-mean-square amplitude of each frame, normalized to `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub struct VadGate {
    sample_rate_hz: u32,
    frame_ms: u32,
    threshold: f32,
}

impl VadGate {
    pub fn new(sample_rate_hz: u32, frame_ms: u32, threshold: f32) -> Result<Self> {
        if !VALID_RATES_HZ.contains(&sample_rate_hz) {
            return Err(Error::internal(format!(
                "unsupported VAD sample rate: {sample_rate_hz}"
            )));
        }
        if !VALID_FRAME_MS.contains(&frame_ms) {
            return Err(Error::internal(format!(
                "unsupported VAD frame length: {frame_ms}ms"
            )));
        }
        Ok(VadGate {
            sample_rate_hz,
            frame_ms,
            threshold,
        })
    }

    fn frame_len_samples(&self) -> usize {
        (self.sample_rate_hz as u64 * self.frame_ms as u64 / 1000) as usize
    }

    /// True if at least one frame within `pcm` is voiced.
    pub fn has_speech(&self, pcm: &[i16]) -> bool {
        let frame_len = self.frame_len_samples().max(1);
        pcm.chunks(frame_len).any(|frame| self.frame_is_voiced(frame))
    }

    fn frame_is_voiced(&self, frame: &[i16]) -> bool {
        if frame.is_empty() {
            return false;
        }
        let sum_sq: f64 = frame.iter().map(|&s| (s as f64).powi(2)).sum();
        let rms = (sum_sq / frame.len() as f64).sqrt();
        let normalized = (rms / i16::MAX as f64) as f32;
        normalized >= self.threshold
    }
}

/// Latches `speech_started` on for the remainder of a segment once voice
/// is first detected; tracks the accumulated pre-speech duration as
/// `vad_offset` for later timestamp adjustment (§4.3, §4.8).
///
/// Testable property 4: once latched, subsequent `observe` calls never
/// re-run the gate.
#[derive(Debug)]
pub struct SegmentVadLatch {
    gate: VadGate,
    speech_started: bool,
    vad_offset_ms: i64,
}

impl SegmentVadLatch {
    pub fn new(gate: VadGate) -> Self {
        SegmentVadLatch {
            gate,
            speech_started: false,
            vad_offset_ms: 0,
        }
    }

    pub fn speech_started(&self) -> bool {
        self.speech_started
    }

    pub fn vad_offset_ms(&self) -> i64 {
        self.vad_offset_ms
    }

    /// Observes one chunk of audio with its duration in milliseconds. If
    /// speech has already latched, this is a no-op (the gate is not
    /// re-consulted). Otherwise it runs the gate once; on the first voiced
    /// chunk it latches, leaving `chunk_time_ms` un-counted as silence, and
    /// on a silent chunk it accumulates `chunk_time_ms` into `vad_offset`.
    pub fn observe(&mut self, pcm: &[i16], chunk_time_ms: i64) {
        if self.speech_started {
            return;
        }
        if self.gate.has_speech(pcm) {
            self.speech_started = true;
        } else {
            self.vad_offset_ms += chunk_time_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silence(n: usize) -> Vec<i16> {
        vec![0; n]
    }

    fn tone(n: usize) -> Vec<i16> {
        (0..n)
            .map(|i| ((i as f32 * 0.3).sin() * i16::MAX as f32 * 0.8) as i16)
            .collect()
    }

    #[test]
    fn rejects_invalid_frame_length() {
        assert!(VadGate::new(16_000, 15, 0.1).is_err());
    }

    #[test]
    fn rejects_invalid_sample_rate() {
        assert!(VadGate::new(11_025, 20, 0.1).is_err());
    }

    #[test]
    fn silence_never_voiced() {
        let gate = VadGate::new(16_000, 20, 0.05).unwrap();
        assert!(!gate.has_speech(&silence(320 * 5)));
    }

    #[test]
    fn loud_tone_is_voiced() {
        let gate = VadGate::new(16_000, 20, 0.05).unwrap();
        assert!(gate.has_speech(&tone(320)));
    }

    #[test]
    fn latch_accumulates_offset_until_first_voiced_chunk() {
        let gate = VadGate::new(16_000, 20, 0.2).unwrap();
        let mut latch = SegmentVadLatch::new(gate);

        latch.observe(&silence(320), 20);
        latch.observe(&silence(320), 20);
        assert!(!latch.speech_started());
        assert_eq!(latch.vad_offset_ms(), 40);

        latch.observe(&tone(320), 20);
        assert!(latch.speech_started());
        // Offset is not incremented once voice is detected.
        assert_eq!(latch.vad_offset_ms(), 40);
    }

    #[test]
    fn latch_skips_gate_once_latched() {
        let gate = VadGate::new(16_000, 20, 0.01).unwrap();
        let mut latch = SegmentVadLatch::new(gate);
        latch.observe(&tone(320), 20);
        assert!(latch.speech_started());

        // Even pure silence afterward must not un-latch or change offset.
        latch.observe(&silence(320), 20);
        assert!(latch.speech_started());
        assert_eq!(latch.vad_offset_ms(), 0);
    }
}
