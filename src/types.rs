//! Core data model shared by every stage of the recognition pipeline.

use serde::{Deserialize, Serialize};

/// How the caller's audio is encoded. `Guess` means "probe the container."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Encoding {
    EncodingUnspecified,
    Linear16,
    Mp3,
    Flac,
    Guess,
}

/// Describes a PCM stream. The canonical internal format everywhere after
/// the codec stage is `Linear16` at the model's feature rate, mono.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub encoding: Encoding,
    pub sample_rate_hz: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub const CHANNELS_MONO: u16 = 1;

    pub fn linear16(sample_rate_hz: u32) -> Self {
        AudioFormat {
            encoding: Encoding::Linear16,
            sample_rate_hz,
            channels: Self::CHANNELS_MONO,
        }
    }
}

/// A single word with its position on the global audio timeline.
///
/// Invariants: `duration_ms >= 0`; concatenating every word's `symbol` with
/// a single inserted U+0020 separator reproduces the transcript;
/// `start_time_ms` is relative to the start of the whole streaming call,
/// not the start of the segment that produced the word.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlignedWord {
    pub start_time_ms: i64,
    pub duration_ms: i64,
    pub symbol: String,
}

impl AlignedWord {
    pub fn end_time_ms(&self) -> i64 {
        self.start_time_ms + self.duration_ms
    }

    pub fn mid_time_ms(&self) -> i64 {
        self.start_time_ms + self.duration_ms / 2
    }
}

/// One hypothesis for a recognized utterance. Only alternative 0 of a
/// result may carry word-level timings; the rest carry text only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Alternative {
    pub transcript: String,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub words: Option<Vec<AlignedWord>>,
    /// One speaker tag per entry in `words`, present only when diarization
    /// ran for this result (§4.7, non-streaming only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_tags: Option<Vec<Option<u32>>>,
}

/// The result of recognizing one utterance: an ordered list of
/// alternatives, best first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub alternatives: Vec<Alternative>,
    pub is_final: bool,
}

pub const MAX_ALTERNATIVES_DEFAULT: u32 = 1;
pub const MAX_ALTERNATIVES_LIMIT: u32 = 30;

/// Normalizes a requested `max_alternatives` per §3: `0` means "use the
/// default," and the result is clamped to `[1, 30]`.
pub fn normalize_max_alternatives(requested: u32) -> u32 {
    let requested = if requested == 0 {
        MAX_ALTERNATIVES_DEFAULT
    } else {
        requested
    };
    requested.clamp(1, MAX_ALTERNATIVES_LIMIT)
}

/// One speaker-homogeneous span of feature frames, produced by the
/// diarizer. Frames have a fixed duration of `frame_shift_ms` (typically
/// 10 ms).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiarizationSegment {
    pub speaker_id: u32,
    pub start_frame: u32,
    pub end_frame: u32,
}

impl DiarizationSegment {
    pub fn new(speaker_id: u32, start_frame: u32, end_frame: u32) -> Self {
        debug_assert!(speaker_id >= 1, "speaker_id is 1-based");
        debug_assert!(start_frame < end_frame, "segment must be non-empty");
        DiarizationSegment {
            speaker_id,
            start_frame,
            end_frame,
        }
    }

    /// Whether the frame time window `[start_frame, end_frame)` (converted
    /// to milliseconds via `frame_shift_ms`) contains `time_ms`.
    pub fn contains_time_ms(&self, time_ms: i64, frame_shift_ms: i64) -> bool {
        let start_ms = self.start_frame as i64 * frame_shift_ms;
        let end_ms = self.end_frame as i64 * frame_shift_ms;
        time_ms >= start_ms && time_ms < end_ms
    }
}

/// Attaches `speaker_tag` to each word whose mid-time falls inside a
/// diarization segment. Words with no matching segment are left untagged.
/// Segments are tried in order; the first match wins (§4.7).
pub fn attach_speaker_tags(
    words: &[AlignedWord],
    segments: &[DiarizationSegment],
    frame_shift_ms: i64,
) -> Vec<Option<u32>> {
    words
        .iter()
        .map(|w| {
            let t = w.mid_time_ms();
            segments
                .iter()
                .find(|seg| seg.contains_time_ms(t, frame_shift_ms))
                .map(|seg| seg.speaker_id)
        })
        .collect()
}
