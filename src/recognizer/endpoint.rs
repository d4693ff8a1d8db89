//! Endpoint rules: ordered, multi-condition triggers for "the speaker has
//! finished an utterance," per the data model's Endpoint rules paragraph.

/// One ordered rule. A rule fires when ALL three conditions hold
/// simultaneously; `has_endpoint` returns true as soon as any rule fires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndpointRule {
    pub min_trailing_silence_frames: u64,
    pub min_utterance_frames: u64,
    pub relative_cost_max: f64,
}

impl EndpointRule {
    fn fires(&self, frames_decoded: u64, trailing_silence_frames: u64, relative_cost: f64) -> bool {
        trailing_silence_frames >= self.min_trailing_silence_frames
            && frames_decoded >= self.min_utterance_frames
            && relative_cost <= self.relative_cost_max
    }
}

/// True when at least one of `rules` fires against the current traceback.
pub fn has_endpoint(
    rules: &[EndpointRule],
    frames_decoded: u64,
    trailing_silence_frames: u64,
    relative_cost: f64,
) -> bool {
    rules
        .iter()
        .any(|r| r.fires(frames_decoded, trailing_silence_frames, relative_cost))
}

/// Converts a frame count to milliseconds: `frames * frame_shift_s * 1000
/// * frame_subsampling_factor`.
pub fn frames_to_ms(frames: u64, frame_shift_ms: f64, frame_subsampling_factor: u32) -> i64 {
    (frames as f64 * frame_shift_ms * frame_subsampling_factor as f64).round() as i64
}

/// The extra single-utterance rule: fires after 10s of leading silence
/// with no speech detected yet, regardless of the model's configured
/// rules. The orchestrator appends this only when `single_utterance` is
/// set (§3, §4.8).
pub fn single_utterance_leading_silence_rule(frame_shift_ms: f64) -> EndpointRule {
    let frames_for_10s = (10_000.0 / frame_shift_ms).ceil() as u64;
    EndpointRule {
        min_trailing_silence_frames: frames_for_10s,
        min_utterance_frames: 0,
        relative_cost_max: f64::INFINITY,
    }
}
