//! The non-streaming `Recognize` call: validate the request, pick a model,
//! pull the whole `AudioSource` through one `Recognizer`, and optionally
//! diarize in parallel, per §4 and §6's field table.
//!
//! Grounded on `spec.md` §6's recognition-config field table and §7's
//! error taxonomy; `examples/itsmontoya-scribble/src/scribble.rs`'s
//! top-level `transcribe` function for the "wire the stages together, one
//! call, one result" shape, generalized from a single Whisper pass to the
//! Codec→Source→Recognizer→Formatter→Punctuator pipeline plus an optional
//! parallel Diarizer.

use std::sync::Arc;

use crate::config::{RecognitionConfig, UriSchemeAllowList};
use crate::error::{Error, FieldViolation, Result};
use crate::formatter::Formatter;
use crate::model_registry::ModelRegistry;
use crate::punctuator::Punctuator;
use crate::recognizer::Recognizer;
use crate::recognizer::model::AdaptationState;
use crate::source::{AudioSource, ContentSource, UrlMaterialisedSource};
use crate::types::{AlignedWord, DiarizationSegment, Encoding, RecognitionResult, attach_speaker_tags};

/// Either inline bytes or a URL to fetch them from, mirroring
/// `RecognizeRequest.audio`'s oneof.
pub enum AudioInput {
    Content(Vec<u8>),
    Uri(String),
}

/// Stands in for the Diarizer's concrete `EmbeddingExtractor`/PLDA wiring
/// (an `ndarray`-shaped API), so this module can drive diarization without
/// depending on those types directly — another external-collaborator seam,
/// this time at the module boundary rather than the trait-object boundary.
pub trait DiarizationPipeline: Send + Sync {
    fn diarize(
        &self,
        pcm: &[i16],
        sample_rate_hz: u32,
        num_speakers: usize,
    ) -> Vec<DiarizationSegment>;
}

/// Fetches the bytes behind a `uri` for [`AudioInput::Uri`]. Injected so
/// the service stays testable without live network access, the same
/// discipline `UrlMaterialisedSource::new` already applies one layer down.
pub trait UrlFetcher: Send + Sync {
    fn fetch(&self, uri: &str) -> Result<Vec<u8>>;
}

pub struct RecognizeService {
    models: Arc<ModelRegistry>,
    uri_schemes: UriSchemeAllowList,
    diarizer: Option<Arc<dyn DiarizationPipeline>>,
}

impl RecognizeService {
    pub fn new(models: Arc<ModelRegistry>, uri_schemes: UriSchemeAllowList) -> Self {
        RecognizeService {
            models,
            uri_schemes,
            diarizer: None,
        }
    }

    pub fn with_diarizer(mut self, diarizer: Arc<dyn DiarizationPipeline>) -> Self {
        self.diarizer = Some(diarizer);
        self
    }

    /// Collects every simultaneous violation rather than failing fast on
    /// the first, per §8 S6.
    fn validate(&self, config: &RecognitionConfig, audio: &AudioInput) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        if config.encoding == Encoding::EncodingUnspecified {
            violations.push(FieldViolation {
                field: "encoding".into(),
                message: "must not be ENCODING_UNSPECIFIED".into(),
            });
        }
        if config.language_code.is_empty() {
            violations.push(FieldViolation {
                field: "language_code".into(),
                message: "required".into(),
            });
        }
        if let AudioInput::Uri(uri) = audio {
            let scheme = uri.split_once("://").map(|(scheme, _)| scheme);
            match scheme {
                Some(scheme) if self.uri_schemes.is_allowed(scheme) => {}
                _ => violations.push(FieldViolation {
                    field: "audio.uri".into(),
                    message: format!("unsupported or missing URI scheme in '{uri}'"),
                }),
            }
        }
        violations
    }

    fn violations_to_error(mut violations: Vec<FieldViolation>) -> Error {
        if violations.len() == 1 {
            let only = violations.remove(0);
            Error::validation(only.field, only.message)
        } else {
            Error::ValidationMulti(violations)
        }
    }

    fn open_source(
        &self,
        audio: AudioInput,
        encoding: Encoding,
        out_sample_rate: u32,
        fetcher: &dyn UrlFetcher,
    ) -> Result<Box<dyn AudioSource>> {
        match audio {
            AudioInput::Content(bytes) => {
                Ok(Box::new(ContentSource::new(bytes, encoding, out_sample_rate)?))
            }
            AudioInput::Uri(uri) => {
                let source = UrlMaterialisedSource::new(
                    || fetcher.fetch(&uri),
                    encoding,
                    out_sample_rate,
                )?;
                Ok(Box::new(source))
            }
        }
    }

    /// Runs the full non-streaming pipeline and returns one result with up
    /// to `config.max_alternatives` alternatives. `fetcher` is only
    /// consulted for `AudioInput::Uri`.
    pub fn recognize(
        &self,
        config: &RecognitionConfig,
        audio: AudioInput,
        formatter: Option<Arc<dyn Formatter>>,
        punctuator: Option<Arc<Punctuator>>,
        fetcher: &dyn UrlFetcher,
    ) -> Result<RecognitionResult> {
        let violations = self.validate(config, &audio);
        if !violations.is_empty() {
            return Err(Self::violations_to_error(violations));
        }

        let model = self
            .models
            .get(&config.language_code, None)
            .ok_or_else(|| {
                Error::validation(
                    "language_code",
                    format!("no model registered for '{}'", config.language_code),
                )
            })?;

        let feature_rate = model.feature_sample_rate_hz();
        let mut source = self.open_source(audio, config.encoding, feature_rate, fetcher)?;
        source.open()?;
        let pcm = source.full()?;

        let mut recognizer = Recognizer::new(
            model.clone(),
            AdaptationState::default(),
            Vec::new(),
            formatter,
            punctuator,
        );
        recognizer.decode(&pcm, false);
        recognizer.finalize();

        let results = recognizer.get_results(
            config.max_alternatives,
            true,
            config.enable_automatic_punctuation,
        );

        let mut alternatives = results.alternatives;
        if let Some(first) = alternatives.first_mut() {
            if !config.enable_word_time_offsets {
                first.words = None;
            }
        }

        let diarization_segments = match (&self.diarizer, &config.diarization) {
            (Some(diarizer), Some(diarization_config))
                if diarization_config.enable_speaker_diarization =>
            {
                Some(diarizer.diarize(
                    &pcm,
                    feature_rate,
                    diarization_config.speaker_count() as usize,
                ))
            }
            _ => None,
        };

        if let (Some(segments), Some(first)) = (&diarization_segments, alternatives.first_mut()) {
            if let Some(words) = &first.words {
                let frame_shift_ms = model.frame_shift_ms().round() as i64;
                first.speaker_tags = Some(attach_speaker_tags(words, segments, frame_shift_ms));
            }
        }

        Ok(RecognitionResult {
            alternatives,
            is_final: true,
        })
    }
}
