//! Speaker diarization: segments a call's feature frames by voice activity,
//! extracts one embedding per segment, scores every pair with PLDA, and
//! agglomeratively clusters segments down to exactly `num_speakers`
//! speakers, per §4.7.
//!
//! Grounded on `original_source/src/diarization.h`: `SegmentByVad`,
//! `XvectorNnet::Compute` (the embedding extractor, here a trait since no
//! neural-network runtime exists in this crate's corpus — same external-
//! collaborator treatment as the acoustic model and punctuation
//! classifier), and `ComputeXvectorDiarization`'s PLDA-then-cluster shape.

pub mod plda;
pub mod reference_pipeline;

use ndarray::{Array1, Array2, ArrayView2};
use plda::Plda;

use crate::types::DiarizationSegment;

/// Stands in for `XvectorNnet`: produces one fixed-dimension embedding from
/// a segment's feature frames (rows = frames, cols = feature dim).
pub trait EmbeddingExtractor: Send + Sync {
    fn dim(&self) -> usize;
    fn extract(&self, feats: ArrayView2<f32>) -> Array1<f32>;
}

/// Groups frames into contiguous voiced segments, per `SegmentByVad`.
/// Silence runs shorter than `silence_proportion` of the segment built so
/// far are bridged (treated as part of the same segment); longer ones end
/// it. Leading silence before the first voiced frame is dropped.
pub fn segment_by_vad(voiced: &[bool], silence_proportion: f32) -> Vec<(u32, u32)> {
    let mut segments = Vec::new();
    let mut seg_start: Option<usize> = None;
    let mut silence_run = 0usize;

    for (i, &is_voiced) in voiced.iter().enumerate() {
        match seg_start {
            None => {
                if is_voiced {
                    seg_start = Some(i);
                }
            }
            Some(start) => {
                if is_voiced {
                    silence_run = 0;
                } else {
                    silence_run += 1;
                    let seg_len_so_far = i - start;
                    if seg_len_so_far > 0
                        && silence_run as f32 > silence_proportion * seg_len_so_far as f32
                    {
                        let end = i - silence_run + 1;
                        segments.push((start as u32, end as u32));
                        seg_start = None;
                        silence_run = 0;
                    }
                }
            }
        }
    }
    if let Some(start) = seg_start {
        let end = voiced.len() - silence_run;
        if end > start {
            segments.push((start as u32, end as u32));
        }
    }
    segments
}

/// Merges the two closest clusters by average-linkage PLDA score until
/// exactly `num_speakers` clusters remain, then assigns speaker ids 1..=k
/// in order of each cluster's earliest segment. Grounded on
/// `ComputeXvectorDiarization`'s signature (embeddings + PLDA in, per-frame
/// speaker ids out); Kaldi's own AHC implementation is not in this corpus,
/// so the merge rule here is average-linkage, the standard choice for
/// score-matrix clustering.
///
/// `max_spk_fraction` caps how large any one cluster may grow, as a
/// fraction of `n` segments (Kaldi's `AgglomerativeCluster` takes the same
/// parameter; `ComputeXvectorDiarization` passes `1.0`, i.e. no cap, unless
/// `1.0 / num_speakers` would already exceed it). A merge that would push a
/// cluster past the cap is skipped in favor of the next-best pair; if every
/// remaining pair would exceed it, clustering stops early, possibly short
/// of `num_speakers`.
fn agglomerative_cluster(
    scores: &Array2<f32>,
    num_speakers: usize,
    max_spk_fraction: f32,
) -> Vec<usize> {
    let n = scores.nrows();
    assert!(num_speakers >= 1 && num_speakers <= n.max(1));
    assert!(max_spk_fraction > 0.0 && max_spk_fraction <= 1.0);

    let max_cluster_size = ((max_spk_fraction * n as f32).ceil() as usize).max(1);
    let mut clusters: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();

    while clusters.len() > num_speakers {
        let mut best = (0usize, 1usize, f32::NEG_INFINITY);
        let mut found = false;
        for i in 0..clusters.len() {
            for j in (i + 1)..clusters.len() {
                if clusters[i].len() + clusters[j].len() > max_cluster_size {
                    continue;
                }
                let mut sum = 0.0f32;
                let mut count = 0usize;
                for &a in &clusters[i] {
                    for &b in &clusters[j] {
                        sum += scores[[a, b]];
                        count += 1;
                    }
                }
                let avg = if count > 0 { sum / count as f32 } else { f32::NEG_INFINITY };
                if avg > best.2 {
                    best = (i, j, avg);
                    found = true;
                }
            }
        }
        if !found {
            break;
        }
        let (i, j, _) = best;
        let merged = {
            let mut m = clusters[i].clone();
            m.extend(clusters[j].iter().copied());
            m
        };
        // remove j first since j > i
        clusters.remove(j);
        clusters.remove(i);
        clusters.push(merged);
    }

    // Assign speaker ids by each cluster's earliest original segment index,
    // so speaker 1 is whoever speaks first.
    let mut with_first: Vec<(usize, &Vec<usize>)> = clusters
        .iter()
        .map(|c| (*c.iter().min().unwrap(), c))
        .collect();
    with_first.sort_by_key(|(first, _)| *first);

    let mut speaker_of = vec![0usize; n];
    for (speaker_id, (_, members)) in with_first.into_iter().enumerate() {
        for &idx in members {
            speaker_of[idx] = speaker_id + 1;
        }
    }
    speaker_of
}

/// `XvectorNnet::Compute`'s `window_seconds` default (1.5s) at a 10ms frame
/// shift: the frame span handed to the extractor per chunk before its
/// output is averaged back down to one embedding per segment.
pub const DEFAULT_EMBEDDING_CHUNK_FRAMES: usize = 150;

/// `ComputeXvectorDiarization`'s own `max_spk_fraction`: no cap on how much
/// of a call a single speaker's cluster may cover.
pub const DEFAULT_MAX_SPK_FRACTION: f32 = 1.0;

pub struct Diarizer<E: EmbeddingExtractor> {
    extractor: E,
    plda: Plda,
    silence_proportion: f32,
    embedding_chunk_frames: usize,
    max_spk_fraction: f32,
}

impl<E: EmbeddingExtractor> Diarizer<E> {
    pub fn new(extractor: E, plda: Plda, silence_proportion: f32) -> Self {
        Diarizer {
            extractor,
            plda,
            silence_proportion,
            embedding_chunk_frames: DEFAULT_EMBEDDING_CHUNK_FRAMES,
            max_spk_fraction: DEFAULT_MAX_SPK_FRACTION,
        }
    }

    /// Overrides the chunk size used by [`Self::extract_segment_embedding`]
    /// and the cluster-size cap used by [`agglomerative_cluster`]. Both
    /// default to the values `ComputeXvectorDiarization` uses.
    pub fn with_clustering_params(mut self, embedding_chunk_frames: usize, max_spk_fraction: f32) -> Self {
        self.embedding_chunk_frames = embedding_chunk_frames.max(1);
        self.max_spk_fraction = max_spk_fraction;
        self
    }

    /// Extracts one embedding per `embedding_chunk_frames`-sized chunk of
    /// the segment and averages them weighted by each chunk's frame count,
    /// per `XvectorNnet::Compute`: a long segment is chunked because the
    /// real embedding network has a fixed receptive field, and the
    /// frame-count weighting keeps a short trailing chunk from pulling the
    /// average as hard as a full-size one.
    fn extract_segment_embedding(&self, feats: ArrayView2<f32>) -> Array1<f32> {
        let num_rows = feats.nrows();
        let chunk_frames = self.embedding_chunk_frames.min(num_rows).max(1);

        let mut total = Array1::<f32>::zeros(self.extractor.dim());
        let mut total_weight = 0.0f32;
        let mut start = 0usize;
        while start < num_rows {
            let end = (start + chunk_frames).min(num_rows);
            let weight = (end - start) as f32;
            let embedding = self.extractor.extract(feats.slice(ndarray::s![start..end, ..]));
            total = total + embedding * weight;
            total_weight += weight;
            start = end;
        }

        if total_weight > 0.0 {
            total / total_weight
        } else {
            total
        }
    }

    /// `feats` has one row per frame; `voiced` has the same length, one
    /// VAD decision per frame. Returns one [`DiarizationSegment`] per
    /// voiced run, each tagged with a speaker id in `1..=num_speakers`.
    pub fn diarize(
        &self,
        feats: ArrayView2<f32>,
        voiced: &[bool],
        num_speakers: usize,
    ) -> Vec<DiarizationSegment> {
        assert_eq!(feats.nrows(), voiced.len());
        let frame_ranges = segment_by_vad(voiced, self.silence_proportion);
        if frame_ranges.is_empty() {
            return Vec::new();
        }

        let embeddings: Vec<Array1<f32>> = frame_ranges
            .iter()
            .map(|&(start, end)| {
                self.extract_segment_embedding(feats.slice(ndarray::s![start as usize..end as usize, ..]))
            })
            .collect();

        let n = embeddings.len();
        let effective_k = num_speakers.min(n);
        let mut scores = Array2::<f32>::zeros((n, n));
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    scores[[i, j]] = self.plda.log_likelihood_ratio(&embeddings[i], &embeddings[j]);
                }
            }
        }
        let speaker_of = agglomerative_cluster(&scores, effective_k, self.max_spk_fraction);

        frame_ranges
            .into_iter()
            .zip(speaker_of)
            .map(|((start, end), speaker_id)| DiarizationSegment::new(speaker_id as u32, start, end))
            .collect()
    }
}
