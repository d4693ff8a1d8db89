//! Integration coverage for the streaming call driver (S3, S4, S5):
//! drives `run_streaming_call` against the real `EnergyGateModel`, the
//! way `sonorec-server`'s WS route does, through the public API only.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use sonorec::error::{Error, Result};
use sonorec::model_registry::ModelRegistry;
use sonorec::orchestrator::streaming::{SpeechEventType, StreamingResponse};
use sonorec::orchestrator::{RequestSource, ResponseSink, run_streaming_call};
use sonorec::recognizer::reference_backend::EnergyGateModelFactory;
use sonorec::vad::VadGate;

fn model() -> Arc<dyn sonorec::recognizer::model::Model> {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main.conf"), "language-code=is-IS\n").unwrap();
    let registry = ModelRegistry::load(&[dir.path()], &EnergyGateModelFactory).unwrap();
    registry.get("is-IS", None).unwrap()
}

fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

fn tone_chunk(samples: usize) -> Vec<u8> {
    pcm_bytes(&vec![20_000i16; samples])
}

fn silence_chunk(samples: usize) -> Vec<u8> {
    pcm_bytes(&vec![0i16; samples])
}

struct VecSource(VecDeque<Result<Vec<u8>>>);
impl RequestSource for VecSource {
    async fn next_audio(&mut self) -> Result<Vec<u8>> {
        self.0.pop_front().unwrap_or(Ok(Vec::new()))
    }
}

struct CollectingSink(Arc<Mutex<Vec<StreamingResponse>>>);
impl ResponseSink for CollectingSink {
    async fn send(&mut self, response: StreamingResponse) -> Result<()> {
        self.0.lock().unwrap().push(response);
        Ok(())
    }
}

/// One voiced chunk (100ms) followed by enough silence (500ms, the
/// energy-gate model's endpoint threshold) to trigger an endpoint.
fn speech_then_silence() -> VecDeque<Result<Vec<u8>>> {
    VecDeque::from(vec![
        Ok(tone_chunk(1600)),
        Ok(silence_chunk(1600)),
        Ok(silence_chunk(1600)),
        Ok(silence_chunk(1600)),
        Ok(silence_chunk(1600)),
        Ok(silence_chunk(1600)),
    ])
}

/// S3: at least one interim (`is_final=false`) response is emitted before
/// the first final.
#[tokio::test]
async fn s3_interim_results_precede_the_first_final() {
    let collected = Arc::new(Mutex::new(Vec::new()));
    let source = VecSource(speech_then_silence());
    let sink = CollectingSink(collected.clone());
    let vad = VadGate::new(16_000, 20, 0.01).unwrap();

    run_streaming_call(model(), None, None, vad, source, sink, 16_000, true, false)
        .await
        .unwrap();

    let responses = collected.lock().unwrap();
    let first_final = responses.iter().position(|r| r.is_final).expect("a final response");
    assert!(
        responses[..first_final].iter().any(|r| !r.is_final),
        "expected at least one interim response before the first final"
    );
}

/// S4: with `single_utterance`, exactly one `END_OF_SINGLE_UTTERANCE`
/// event follows the first final, and the call then ends cleanly.
#[tokio::test]
async fn s4_single_utterance_ends_after_one_final_and_event() {
    let collected = Arc::new(Mutex::new(Vec::new()));
    let source = VecSource(speech_then_silence());
    let sink = CollectingSink(collected.clone());
    let vad = VadGate::new(16_000, 20, 0.01).unwrap();

    run_streaming_call(model(), None, None, vad, source, sink, 16_000, false, true)
        .await
        .unwrap();

    let responses = collected.lock().unwrap();
    let final_count = responses.iter().filter(|r| r.is_final).count();
    assert_eq!(final_count, 1);
    assert_eq!(
        responses.last().unwrap().speech_event_type,
        SpeechEventType::EndOfSingleUtterance
    );
}

/// S5: a client disconnect mid-stream surfaces as `Error::Cancelled`, and
/// nothing is emitted before the disconnect since no speech was seen.
#[tokio::test]
async fn s5_client_disconnect_mid_stream_is_cancelled() {
    let collected = Arc::new(Mutex::new(Vec::new()));
    let mut chunks = VecDeque::new();
    chunks.push_back(Ok(silence_chunk(320)));
    chunks.push_back(Err(Error::Cancelled));
    let source = VecSource(chunks);
    let sink = CollectingSink(collected.clone());
    let vad = VadGate::new(16_000, 20, 0.01).unwrap();

    let result = run_streaming_call(model(), None, None, vad, source, sink, 16_000, false, false).await;

    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(collected.lock().unwrap().is_empty());
}
