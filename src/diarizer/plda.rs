//! PLDA (Probabilistic Linear Discriminant Analysis) scoring in a
//! diagonalized space, per `original_source/src/diarization.h`'s
//! `kaldi::Plda`/`XvectorDiarizationDecoderInfo` (`plda`, `centering_vector`,
//! `whitening_matrix`) and `plda-scoring-utils.cc`'s `ScorePlda`.
//!
//! Centering, whitening, and the PLDA model's own within/between-class
//! diagonalizing transform are three separate affine steps in the original;
//! here they are folded into one `transform`/`offset` pair, since composing
//! affine maps is lossless. `ScorePlda` also length-normalizes each
//! i-vector between whitening and the PLDA transform
//! (`IvectorNormalizeLength`) so every vector has the norm its expected
//! squared length under unit within-class covariance would predict; that
//! rescale is not affine (it divides by a per-vector norm) and so cannot be
//! folded into `transform`/`offset` — it is applied as its own step in
//! [`Plda::transform_vector`]. What remains is the per-dimension
//! between-class variance `psi` driving scoring, exactly as Kaldi's
//! `Plda::LogLikelihoodRatio` does for a single enrollment example.

use ndarray::{Array1, Array2};

/// Rescales `v` so its L2 norm equals `sqrt(v.len())`, the norm an i-vector
/// would have in expectation under unit within-class covariance, per
/// `IvectorNormalizeLength(scaleup=true)`. A zero vector is left alone.
fn length_normalize(v: Array1<f32>) -> Array1<f32> {
    let norm = v.dot(&v).sqrt();
    if norm == 0.0 {
        return v;
    }
    let ratio = norm / (v.len() as f32).sqrt();
    v / ratio
}

pub struct Plda {
    /// Combined centering ∘ whitening ∘ PLDA transform, dims x dims.
    transform: Array2<f32>,
    /// Combined offset from the same composition, length dims.
    offset: Array1<f32>,
    /// Per-dimension between-class variance; within-class variance is 1
    /// in this diagonalized space by construction.
    psi: Array1<f32>,
}

impl Plda {
    pub fn new(transform: Array2<f32>, offset: Array1<f32>, psi: Array1<f32>) -> Self {
        assert_eq!(transform.nrows(), transform.ncols());
        assert_eq!(transform.nrows(), offset.len());
        assert_eq!(transform.nrows(), psi.len());
        Plda {
            transform,
            offset,
            psi,
        }
    }

    /// An identity PLDA model over `dim` dimensions: no centering/whitening,
    /// unit between-class variance. Useful for tests and as a safe default
    /// when no PLDA artifact is registered for a model.
    pub fn identity(dim: usize) -> Self {
        Plda {
            transform: Array2::eye(dim),
            offset: Array1::zeros(dim),
            psi: Array1::ones(dim),
        }
    }

    pub fn dim(&self) -> usize {
        self.psi.len()
    }

    fn transform_vector(&self, raw: &Array1<f32>) -> Array1<f32> {
        let transformed = self.transform.dot(raw) + &self.offset;
        length_normalize(transformed)
    }

    /// Log-likelihood ratio that `test` and `enroll` share a speaker versus
    /// that they come from independent speakers, for single-example (n=1)
    /// enrollment and test vectors — exactly Kaldi's
    /// `Plda::LogLikelihoodRatio` specialized to n_enroll=1.
    pub fn log_likelihood_ratio(&self, enroll_raw: &Array1<f32>, test_raw: &Array1<f32>) -> f32 {
        let enroll = self.transform_vector(enroll_raw);
        let test = self.transform_vector(test_raw);

        let mut given_class = 0.0f32;
        let mut without_class = 0.0f32;
        for i in 0..self.psi.len() {
            let psi = self.psi[i];
            // posterior mean/variance of the class given one enrollment example
            let mean = psi / (psi + 1.0) * enroll[i];
            let variance = 1.0 + psi / (psi + 1.0);
            let diff = test[i] - mean;
            given_class += -0.5 * (2.0 * std::f32::consts::PI * variance).ln()
                - 0.5 * diff * diff / variance;

            let variance0 = psi + 1.0;
            without_class += -0.5 * (2.0 * std::f32::consts::PI * variance0).ln()
                - 0.5 * test[i] * test[i] / variance0;
        }
        given_class - without_class
    }
}
