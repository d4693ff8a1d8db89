//! The per-segment decode loop run by the Processor task, and the pure
//! byte/chunk bookkeeping it needs. Kept free of transport and queue
//! plumbing so it can be driven directly in tests.
//!
//! Grounded on §4.8's segment loop (steps 1-6) of the streaming design;
//! the two-concurrent-task shape itself lives in `orchestrator::mod`.

use std::time::Duration;

use tokio::time::Instant;

use crate::codec::resample::LinearResampler;
use crate::error::Result;
use crate::recognizer::Recognizer;
use crate::types::{AlignedWord, Alternative};
use crate::vad::{SegmentVadLatch, VadGate};

pub const INTERIM_THROTTLE_MS: u64 = 350;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpeechEventType {
    None,
    EndOfSingleUtterance,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StreamingResponse {
    pub alternatives: Vec<Alternative>,
    pub is_final: bool,
    pub speech_event_type: SpeechEventType,
}

/// What the Processor's segment loop needs to hand back to the outer loop:
/// whether to start another segment, and how much wall-clock time this
/// segment consumed (for `processed_time` accounting, §4.8 step 6).
pub struct SegmentOutcome {
    pub more_data: bool,
    pub segment_time_ms: i64,
}

/// Pulls the next audio chunk for a segment. `None` means clean end of
/// stream (the reader observed an empty payload, the `"END"` sentinel, or
/// channel closure).
pub trait ChunkQueue: Send {
    fn recv(&mut self) -> impl std::future::Future<Output = Option<Vec<u8>>> + Send;
}

fn bytes_to_pcm(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

/// Resamples one chunk of LINEAR16 PCM if the source rate differs from the
/// model's feature rate. A `None` resampler means the rates already match.
fn resample_chunk(resampler: &mut Option<LinearResampler>, pcm: &[i16]) -> Result<Vec<i16>> {
    let Some(resampler) = resampler else {
        return Ok(pcm.to_vec());
    };
    let input_f32: Vec<f32> = pcm.iter().map(|&s| s as f32 / i16::MAX as f32).collect();
    let mut out_f32 = Vec::new();
    resampler.process(&input_f32, &mut out_f32)?;
    Ok(out_f32
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
        .collect())
}

fn shift_words(words: &mut [AlignedWord], offset_ms: i64) {
    for w in words {
        w.start_time_ms += offset_ms;
    }
}

fn shift_alternatives(alternatives: &mut [Alternative], offset_ms: i64) {
    if let Some(first) = alternatives.first_mut() {
        if let Some(words) = first.words.as_mut() {
            shift_words(words, offset_ms);
        }
    }
}

/// Runs one segment to completion: feeds chunks into `recognizer` until an
/// endpoint fires or the queue reaches end of stream, emitting interim
/// updates (if enabled) and exactly one final response through `emit`.
/// `emit` is awaited in place for each response, so a caller wired to a
/// real transport delivers interim results as they happen instead of
/// buffering them until the segment ends. Returns whether more data
/// remains on the stream (`false` at clean EOF).
pub async fn run_segment<Q, F>(
    recognizer: &mut Recognizer,
    vad: &VadGate,
    queue: &mut Q,
    resampler: &mut Option<LinearResampler>,
    sample_rate_hz: u32,
    processed_time_ms: i64,
    interim_results: bool,
    single_utterance: bool,
    mut emit: F,
) -> Result<SegmentOutcome>
where
    Q: ChunkQueue,
    F: AsyncFnMut(StreamingResponse) -> Result<()>,
{
    let mut vad_latch = SegmentVadLatch::new(*vad);
    let mut segment_time_ms: i64 = 0;
    let mut last_interim_at = Instant::now();
    let mut last_interim_text = String::new();
    let mut more_data = true;

    loop {
        let Some(bytes) = queue.recv().await else {
            more_data = false;
            break;
        };

        let pcm = resample_chunk(resampler, &bytes_to_pcm(&bytes))?;
        let chunk_time_ms = (1000i64 * pcm.len() as i64) / sample_rate_hz.max(1) as i64;
        segment_time_ms += chunk_time_ms;

        if !vad_latch.speech_started() {
            vad_latch.observe(&pcm, chunk_time_ms);
            if !vad_latch.speech_started() {
                continue;
            }
        }

        recognizer.decode(&pcm, false);
        if recognizer.has_endpoint(single_utterance) {
            break;
        }

        if interim_results
            && last_interim_at.elapsed() >= Duration::from_millis(INTERIM_THROTTLE_MS)
        {
            let text = recognizer.get_best_hypothesis(false);
            if text != last_interim_text {
                emit(StreamingResponse {
                    alternatives: vec![Alternative {
                        transcript: text.clone(),
                        confidence: 0.0,
                        words: None,
                        speaker_tags: None,
                    }],
                    is_final: false,
                    speech_event_type: SpeechEventType::None,
                })
                .await?;
                last_interim_text = text;
                last_interim_at = Instant::now();
            }
        }
    }

    recognizer.finalize();
    if recognizer.num_frames_decoded() > 0 {
        let results = recognizer.get_results(1, true, true);
        let offset_ms = vad_latch.vad_offset_ms() + processed_time_ms;
        let mut alternatives = results.alternatives;
        shift_alternatives(&mut alternatives, offset_ms);
        emit(StreamingResponse {
            alternatives,
            is_final: true,
            speech_event_type: SpeechEventType::None,
        })
        .await?;

        if single_utterance {
            emit(StreamingResponse {
                alternatives: Vec::new(),
                is_final: false,
                speech_event_type: SpeechEventType::EndOfSingleUtterance,
            })
            .await?;
            more_data = false;
        }
    }
    recognizer.end_segment();

    Ok(SegmentOutcome {
        more_data,
        segment_time_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::model::test_support::ToyBackend;
    use crate::recognizer::model::{AdaptationState, DecodingBackend, Model};
    use crate::recognizer::endpoint::EndpointRule;
    use std::collections::VecDeque;
    use std::sync::Arc;

    struct ToyModel;
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
            static RULES: [EndpointRule; 1] = [EndpointRule {
                min_trailing_silence_frames: 2,
                min_utterance_frames: 1,
                relative_cost_max: 1.0,
            }];
            &RULES
        }
        fn new_backend(
            &self,
            _adaptation: AdaptationState,
            _left_context: &[AlignedWord],
        ) -> Box<dyn DecodingBackend> {
            Box::new(ToyBackend::new(1000))
        }
    }

    struct VecQueue(VecDeque<Vec<u8>>);
    impl ChunkQueue for VecQueue {
        async fn recv(&mut self) -> Option<Vec<u8>> {
            self.0.pop_front()
        }
    }

    fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[tokio::test]
    async fn segment_ends_on_endpoint_and_emits_one_final() {
        let mut recognizer = Recognizer::new(
            Arc::new(ToyModel),
            AdaptationState::default(),
            Vec::new(),
            None,
            None,
        );
        let vad = VadGate::new(16_000, 20, 0.01).unwrap();
        let mut queue = VecQueue(VecDeque::from(vec![
            pcm_bytes(&[20_000; 320]),
            pcm_bytes(&[0; 320]),
            pcm_bytes(&[0; 320]),
        ]));
        let mut resampler = None;
        let mut responses = Vec::new();
        let outcome = run_segment(
            &mut recognizer,
            &vad,
            &mut queue,
            &mut resampler,
            16_000,
            0,
            false,
            false,
            |r| {
                responses.push(r);
                std::future::ready(Ok(()))
            },
        )
        .await
        .unwrap();

        assert!(outcome.more_data);
        assert_eq!(responses.len(), 1);
        assert!(responses[0].is_final);
    }

    #[tokio::test]
    async fn clean_eof_with_no_speech_emits_no_final() {
        let mut recognizer = Recognizer::new(
            Arc::new(ToyModel),
            AdaptationState::default(),
            Vec::new(),
            None,
            None,
        );
        let vad = VadGate::new(16_000, 20, 0.01).unwrap();
        let mut queue = VecQueue(VecDeque::new());
        let mut resampler = None;
        let mut responses = Vec::new();
        let outcome = run_segment(
            &mut recognizer,
            &vad,
            &mut queue,
            &mut resampler,
            16_000,
            0,
            false,
            false,
            |r| {
                responses.push(r);
                std::future::ready(Ok(()))
            },
        )
        .await
        .unwrap();

        assert!(!outcome.more_data);
        assert!(responses.is_empty());
    }

    #[tokio::test]
    async fn single_utterance_appends_end_of_single_utterance_after_final() {
        let mut recognizer = Recognizer::new(
            Arc::new(ToyModel),
            AdaptationState::default(),
            Vec::new(),
            None,
            None,
        );
        let vad = VadGate::new(16_000, 20, 0.01).unwrap();
        let mut queue = VecQueue(VecDeque::from(vec![
            pcm_bytes(&[20_000; 320]),
            pcm_bytes(&[0; 320]),
            pcm_bytes(&[0; 320]),
        ]));
        let mut resampler = None;
        let mut responses = Vec::new();
        let outcome = run_segment(
            &mut recognizer,
            &vad,
            &mut queue,
            &mut resampler,
            16_000,
            0,
            false,
            true,
            |r| {
                responses.push(r);
                std::future::ready(Ok(()))
            },
        )
        .await
        .unwrap();

        assert!(!outcome.more_data);
        assert_eq!(responses.len(), 2);
        assert!(responses[0].is_final);
        assert_eq!(responses[1].speech_event_type, SpeechEventType::EndOfSingleUtterance);
    }

    /// Testable property: `emit`'s returned future is awaited and its error
    /// propagated immediately, not swallowed until the segment buffers
    /// everything and hands it off afterward.
    #[tokio::test]
    async fn emit_failure_aborts_the_segment_immediately() {
        let mut recognizer = Recognizer::new(
            Arc::new(ToyModel),
            AdaptationState::default(),
            Vec::new(),
            None,
            None,
        );
        let vad = VadGate::new(16_000, 20, 0.01).unwrap();
        let mut queue = VecQueue(VecDeque::from(vec![
            pcm_bytes(&[20_000; 320]),
            pcm_bytes(&[0; 320]),
            pcm_bytes(&[0; 320]),
        ]));
        let mut resampler = None;
        let result = run_segment(
            &mut recognizer,
            &vad,
            &mut queue,
            &mut resampler,
            16_000,
            0,
            false,
            false,
            |_r| std::future::ready(Err(crate::error::Error::Cancelled)),
        )
        .await;

        assert!(matches!(result, Err(crate::error::Error::Cancelled)));
    }

    /// Testable property: final word timestamps are shifted by
    /// vad_offset + processed_time, never left relative to segment start.
    #[tokio::test]
    async fn final_words_are_shifted_by_global_offset() {
        let mut recognizer = Recognizer::new(
            Arc::new(ToyModel),
            AdaptationState::default(),
            Vec::new(),
            None,
            None,
        );
        let vad = VadGate::new(16_000, 20, 0.01).unwrap();
        // Leading silence accumulates vad_offset before speech starts.
        let mut queue = VecQueue(VecDeque::from(vec![
            pcm_bytes(&[0; 320]),
            pcm_bytes(&[20_000; 320]),
            pcm_bytes(&[0; 320]),
            pcm_bytes(&[0; 320]),
        ]));
        let mut resampler = None;
        let mut responses = Vec::new();
        run_segment(
            &mut recognizer,
            &vad,
            &mut queue,
            &mut resampler,
            16_000,
            1000,
            false,
            false,
            |r| {
                responses.push(r);
                std::future::ready(Ok(()))
            },
        )
        .await
        .unwrap();

        let words = responses[0].alternatives[0].words.as_ref().unwrap();
        // vad_offset (20ms from the leading silence chunk) + processed_time (1000ms)
        assert!(words[0].start_time_ms >= 1000);
    }
}
