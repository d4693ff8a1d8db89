//! Streaming Orchestrator: the reader/processor task pair, bounded queue,
//! and cancellation plumbing that drives the segment loop in
//! [`streaming::run_segment`] against a live bidirectional stream.
//!
//! Grounded on §4.8 directly; the two-task-plus-bounded-channel shape is
//! generalized from `examples/itsmontoya-scribble/src/scribble.rs`'s
//! decode thread + `mpsc::sync_channel` pattern, moved onto `tokio::sync
//! ::mpsc` (async, for the axum WS transport) with `tokio_util`'s
//! `CancellationToken` standing in for the teacher's implicit
//! channel-drop-based shutdown.

pub mod streaming;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::formatter::Formatter;
use crate::punctuator::Punctuator;
use crate::recognizer::model::{AdaptationState, Model};
use crate::recognizer::Recognizer;
use crate::types::AlignedWord;
use crate::vad::VadGate;
use streaming::{run_segment, ChunkQueue, StreamingResponse};

const QUEUE_CAPACITY: usize = 64;
const BACKOFF_BASE_MS: u64 = 200;
const MAX_BACKOFF_ATTEMPTS: u32 = 50;

/// A request carrying raw `audio_content` bytes, or the client hanging up.
/// Sentinel end-of-stream (empty payload, or the literal `"END"`) is
/// recognized by [`is_end_sentinel`] before it reaches the queue.
pub trait RequestSource: Send {
    fn next_audio(&mut self) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
}

pub trait ResponseSink: Send {
    fn send(&mut self, response: StreamingResponse) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub fn is_end_sentinel(bytes: &[u8]) -> bool {
    bytes.is_empty() || bytes == b"END"
}

/// §4.8 step 1: the first message must carry config and no audio; every
/// later message must carry audio (or the end sentinel) and no config.
pub fn validate_first_message(has_config: bool, has_audio: bool) -> Result<()> {
    if !has_config {
        return Err(Error::validation(
            "streaming_config",
            "first streaming message must carry a streaming config",
        ));
    }
    if has_audio {
        return Err(Error::validation(
            "audio_content",
            "first streaming message must not carry audio",
        ));
    }
    Ok(())
}

pub fn validate_subsequent_message(has_config: bool) -> Result<()> {
    if has_config {
        return Err(Error::validation(
            "streaming_config",
            "streaming config may only appear in the first message",
        ));
    }
    Ok(())
}

struct MpscChunkQueue<'a>(&'a mut mpsc::Receiver<Vec<u8>>);

impl ChunkQueue for MpscChunkQueue<'_> {
    async fn recv(&mut self) -> Option<Vec<u8>> {
        self.0.recv().await
    }
}

/// Reads the client's audio stream and feeds it onto the bounded queue,
/// applying geometric back-off on a full queue and honoring cancellation.
async fn run_reader<R: RequestSource>(
    mut source: R,
    tx: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let chunk = source.next_audio().await?;
        if is_end_sentinel(&chunk) {
            return Ok(());
        }

        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match tx.try_send(chunk.clone()) {
                Ok(()) => break,
                Err(mpsc::error::TrySendError::Closed(_)) => return Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    attempt += 1;
                    if attempt > MAX_BACKOFF_ATTEMPTS {
                        cancel.cancel();
                        return Err(Error::internal(
                            "streaming queue stayed full after max back-off attempts",
                        ));
                    }
                    tokio::time::sleep(Duration::from_millis(BACKOFF_BASE_MS * attempt as u64))
                        .await;
                }
            }
        }
    }
}

/// Runs the segment loop (§4.8 steps 3-6) until the queue reaches clean
/// end of stream or a single-utterance call cuts itself short.
#[allow(clippy::too_many_arguments)]
async fn run_processor<W: ResponseSink>(
    model: Arc<dyn Model>,
    formatter: Option<Arc<dyn Formatter>>,
    punctuator: Option<Arc<Punctuator>>,
    vad: VadGate,
    mut rx: mpsc::Receiver<Vec<u8>>,
    mut sink: W,
    sample_rate_hz: u32,
    interim_results: bool,
    single_utterance: bool,
    cancel: CancellationToken,
) -> Result<()> {
    let mut adaptation_state = AdaptationState::default();
    let mut left_context: Vec<AlignedWord> = Vec::new();
    let mut processed_time_ms: i64 = 0;
    let feature_rate = model.feature_sample_rate_hz();
    let mut resampler = if sample_rate_hz == feature_rate {
        None
    } else {
        Some(crate::codec::resample::LinearResampler::new(
            sample_rate_hz,
            feature_rate,
        )?)
    };

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut recognizer = Recognizer::new(
            model.clone(),
            adaptation_state.clone(),
            left_context.clone(),
            formatter.clone(),
            punctuator.clone(),
        );
        let mut queue = MpscChunkQueue(&mut rx);
        let emit_cancel = cancel.clone();
        let outcome = run_segment(
            &mut recognizer,
            &vad,
            &mut queue,
            &mut resampler,
            sample_rate_hz,
            processed_time_ms,
            interim_results,
            single_utterance,
            async |r| {
                if sink.send(r).await.is_err() {
                    emit_cancel.cancel();
                    return Err(Error::Cancelled);
                }
                Ok(())
            },
        )
        .await?;

        adaptation_state = recognizer.get_adaptation_state();
        left_context = recognizer.get_left_context().to_vec();
        processed_time_ms += outcome.segment_time_ms;

        if !outcome.more_data {
            return Ok(());
        }
    }
}

/// Drives one streaming call end to end: spawns the reader and processor,
/// joins both, and returns the first non-OK status observed (§4.8 step 7).
#[allow(clippy::too_many_arguments)]
pub async fn run_streaming_call<R, W>(
    model: Arc<dyn Model>,
    formatter: Option<Arc<dyn Formatter>>,
    punctuator: Option<Arc<Punctuator>>,
    vad: VadGate,
    source: R,
    sink: W,
    sample_rate_hz: u32,
    interim_results: bool,
    single_utterance: bool,
) -> Result<()>
where
    R: RequestSource + 'static,
    W: ResponseSink + 'static,
{
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    let cancel = CancellationToken::new();

    let reader_cancel = cancel.clone();
    let reader = tokio::spawn(run_reader(source, tx, reader_cancel));

    let processor = run_processor(
        model,
        formatter,
        punctuator,
        vad,
        rx,
        sink,
        sample_rate_hz,
        interim_results,
        single_utterance,
        cancel.clone(),
    )
    .await;

    cancel.cancel();
    let reader_result = reader.await.map_err(|e| Error::internal(e.to_string()))?;

    match (processor, reader_result) {
        (Err(e), _) => Err(e),
        (Ok(()), Err(e)) => Err(e),
        (Ok(()), Ok(())) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::endpoint::EndpointRule;
    use crate::recognizer::model::test_support::ToyBackend;
    use crate::recognizer::model::DecodingBackend;
    use std::sync::Mutex;

    #[test]
    fn end_sentinel_matches_empty_and_literal_end() {
        assert!(is_end_sentinel(b""));
        assert!(is_end_sentinel(b"END"));
        assert!(!is_end_sentinel(b"hello"));
    }

    #[test]
    fn first_message_must_carry_config_and_no_audio() {
        assert!(validate_first_message(true, false).is_ok());
        assert!(validate_first_message(false, false).is_err());
        assert!(validate_first_message(true, true).is_err());
    }

    #[test]
    fn subsequent_message_must_not_carry_config() {
        assert!(validate_subsequent_message(false).is_ok());
        assert!(validate_subsequent_message(true).is_err());
    }

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

    struct VecSource {
        chunks: std::collections::VecDeque<Vec<u8>>,
    }
    impl RequestSource for VecSource {
        async fn next_audio(&mut self) -> Result<Vec<u8>> {
            Ok(self.chunks.pop_front().unwrap_or_default())
        }
    }

    struct CollectingSink(Arc<Mutex<Vec<StreamingResponse>>>);
    impl ResponseSink for CollectingSink {
        async fn send(&mut self, response: StreamingResponse) -> Result<()> {
            self.0.lock().unwrap().push(response);
            Ok(())
        }
    }

    fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[tokio::test]
    async fn full_call_emits_a_final_response_then_completes() {
        let collected = Arc::new(Mutex::new(Vec::new()));
        let source = VecSource {
            chunks: std::collections::VecDeque::from(vec![
                pcm_bytes(&[20_000; 320]),
                pcm_bytes(&[0; 320]),
                pcm_bytes(&[0; 320]),
            ]),
        };
        let sink = CollectingSink(collected.clone());
        let vad = VadGate::new(16_000, 20, 0.01).unwrap();

        run_streaming_call(
            Arc::new(ToyModel),
            None,
            None,
            vad,
            source,
            sink,
            16_000,
            false,
            false,
        )
        .await
        .unwrap();

        let responses = collected.lock().unwrap();
        assert!(responses.iter().any(|r| r.is_final));
    }

    struct FailingSink;
    impl ResponseSink for FailingSink {
        async fn send(&mut self, _response: StreamingResponse) -> Result<()> {
            Err(Error::internal("client gone"))
        }
    }

    /// A sink that fails on the first response cancels the call right
    /// away, instead of the failure only surfacing once the whole segment
    /// has been buffered and is handed off at segment end.
    #[tokio::test]
    async fn sink_failure_cancels_the_call() {
        let source = VecSource {
            chunks: std::collections::VecDeque::from(vec![
                pcm_bytes(&[20_000; 320]),
                pcm_bytes(&[0; 320]),
                pcm_bytes(&[0; 320]),
            ]),
        };
        let vad = VadGate::new(16_000, 20, 0.01).unwrap();

        let result = run_streaming_call(
            Arc::new(ToyModel),
            None,
            None,
            vad,
            source,
            FailingSink,
            16_000,
            false,
            false,
        )
        .await;

        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
