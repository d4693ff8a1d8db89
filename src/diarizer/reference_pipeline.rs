//! A reference feature-extraction/VAD/embedding stack wired to [`Diarizer`]
//! so [`crate::service::DiarizationPipeline`] has something to run end to
//! end against raw PCM, the same role [`crate::recognizer::reference_backend`]
//! plays for the acoustic model and [`crate::punctuator::NoopClassifier`]
//! plays for punctuation.
//!
//! `WaveformToMfcc` (MFCC) and `ComputeVadEnergy` (energy VAD) in
//! `original_source/src/diarization.cc` are themselves thin wrappers around
//! Kaldi feature code with no equivalent in this crate's corpus; this
//! stands in with a two-dimensional log-energy/zero-crossing-rate feature
//! and a global mean subtraction (`SlidingWindowCmn` narrowed to one
//! whole-call window) in its place. Swap in a real MFCC+CMN front end and
//! x-vector network by replacing [`EnergyFeatures`] and
//! [`MeanEmbeddingExtractor`] once those formats are chosen.

use ndarray::{Array1, Array2, ArrayView2};

use super::plda::Plda;
use super::{Diarizer, EmbeddingExtractor};
use crate::service::DiarizationPipeline;
use crate::types::DiarizationSegment;

const FEATURE_DIM: usize = 2;

/// Per-frame log-energy and zero-crossing rate, mean-normalized across the
/// whole call. Stands in for MFCC+CMN (`WaveformToMfcc` +
/// `SlidingWindowCmn`).
fn extract_features(pcm: &[i16], frame_len: usize) -> Array2<f32> {
    let num_frames = pcm.len() / frame_len.max(1);
    let mut feats = Array2::<f32>::zeros((num_frames.max(1), FEATURE_DIM));
    if num_frames == 0 {
        return feats;
    }

    for (i, frame) in pcm.chunks_exact(frame_len).take(num_frames).enumerate() {
        let energy: f64 = frame.iter().map(|&s| (s as f64).powi(2)).sum::<f64>() / frame_len as f64;
        let log_energy = (energy + 1.0).ln() as f32;

        let zero_crossings = frame
            .windows(2)
            .filter(|w| (w[0] >= 0) != (w[1] >= 0))
            .count();
        let zcr = zero_crossings as f32 / frame_len as f32;

        feats[[i, 0]] = log_energy;
        feats[[i, 1]] = zcr;
    }

    let mean = feats.mean_axis(ndarray::Axis(0)).unwrap_or_else(|| Array1::zeros(FEATURE_DIM));
    feats - &mean
}

/// Marks a frame voiced when its (pre-CMN) log-energy clears `threshold`,
/// standing in for `ComputeVadEnergy`.
fn energy_vad(pcm: &[i16], frame_len: usize, threshold: f32) -> Vec<bool> {
    let num_frames = pcm.len() / frame_len.max(1);
    pcm.chunks_exact(frame_len)
        .take(num_frames)
        .map(|frame| {
            let energy: f64 = frame.iter().map(|&s| (s as f64).powi(2)).sum::<f64>() / frame_len as f64;
            ((energy + 1.0).ln() as f32) >= threshold
        })
        .collect()
}

/// Averages the two-dimensional feature vector across its chunk, standing
/// in for `XvectorNnet`.
pub struct MeanEmbeddingExtractor;

impl EmbeddingExtractor for MeanEmbeddingExtractor {
    fn dim(&self) -> usize {
        FEATURE_DIM
    }

    fn extract(&self, feats: ArrayView2<f32>) -> Array1<f32> {
        feats.mean_axis(ndarray::Axis(0)).unwrap_or_else(|| Array1::zeros(FEATURE_DIM))
    }
}

/// Ties [`extract_features`]/[`energy_vad`]/[`MeanEmbeddingExtractor`]/
/// [`Diarizer`] together behind [`DiarizationPipeline`], the seam
/// `RecognizeService` drives diarization through.
pub struct ReferenceDiarizationPipeline {
    diarizer: Diarizer<MeanEmbeddingExtractor>,
    frame_shift_ms: f64,
    vad_threshold: f32,
}

impl ReferenceDiarizationPipeline {
    pub fn new(frame_shift_ms: f64, vad_threshold: f32, silence_proportion: f32) -> Self {
        ReferenceDiarizationPipeline {
            diarizer: Diarizer::new(MeanEmbeddingExtractor, Plda::identity(FEATURE_DIM), silence_proportion),
            frame_shift_ms,
            vad_threshold,
        }
    }
}

impl DiarizationPipeline for ReferenceDiarizationPipeline {
    fn diarize(&self, pcm: &[i16], sample_rate_hz: u32, num_speakers: usize) -> Vec<DiarizationSegment> {
        let frame_len = ((sample_rate_hz as f64 * self.frame_shift_ms / 1000.0).round() as usize).max(1);
        let feats = extract_features(pcm, frame_len);
        let voiced = energy_vad(pcm, frame_len, self.vad_threshold);
        if feats.nrows() != voiced.len() {
            return Vec::new();
        }
        self.diarizer.diarize(feats.view(), &voiced, num_speakers)
    }
}
