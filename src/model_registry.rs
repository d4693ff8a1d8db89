//! Model directory loading: a process-wide map from `(language_code,
//! model_name)` to a registered [`Model`](crate::recognizer::model::Model),
//! populated once at startup and shared read-only by reference thereafter
//! (§5 Shared-resource policy).
//!
//! Grounded on `original_source/src/kaldi-model.h`'s `ModelId`/
//! `KaldiModelMap` and `KaldiModel::Read`'s `main.conf` contract: each
//! model directory must contain a `main.conf` key/value file naming its
//! other artifacts; the process fails fast if it is absent (§6).

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::recognizer::model::Model;

pub const DEFAULT_MODEL_NAME: &str = "generic";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelId {
    pub language_code: String,
    pub model_name: String,
}

impl ModelId {
    pub fn new(language_code: impl Into<String>, model_name: impl Into<String>) -> Self {
        ModelId {
            language_code: language_code.into(),
            model_name: model_name.into(),
        }
    }
}

/// Builds a concrete [`Model`] from a directory's parsed `main.conf` and
/// the directory path itself (so the factory can resolve the other
/// relative paths `main.conf` names). The acoustic/decoding-graph loader
/// is an external collaborator per the purpose statement; this is its
/// construction seam.
pub trait ModelFactory: Send + Sync {
    fn build(&self, model_dir: &Path, main_conf: &HashMap<String, String>) -> Result<Arc<dyn Model>>;
}

/// Parses a `key=value` (or `key value`) file, one entry per line, `#`
/// starting a comment. Matches the simple flat config format
/// `KaldiModelConfig::Register`'s option names imply.
pub fn parse_main_conf(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let (key, value) = line
                .split_once('=')
                .or_else(|| line.split_once(char::is_whitespace))?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

pub struct ModelRegistry {
    models: HashMap<ModelId, Arc<dyn Model>>,
}

impl ModelRegistry {
    /// Loads every directory in `model_dirs`, failing the whole call if
    /// any directory is missing `main.conf` or the `language-code` key.
    pub fn load<P: AsRef<Path>>(model_dirs: &[P], factory: &dyn ModelFactory) -> Result<Self> {
        let mut models = HashMap::new();
        for dir in model_dirs {
            let dir = dir.as_ref();
            let conf_path = dir.join("main.conf");
            let contents = std::fs::read_to_string(&conf_path).map_err(|_| {
                Error::internal(format!(
                    "model directory {} is missing main.conf",
                    dir.display()
                ))
            })?;
            let main_conf = parse_main_conf(&contents);
            let language_code = main_conf.get("language-code").cloned().ok_or_else(|| {
                Error::internal(format!(
                    "model directory {}'s main.conf has no language-code",
                    dir.display()
                ))
            })?;
            let model_name = main_conf
                .get("model-name")
                .cloned()
                .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string());

            let model = factory.build(dir, &main_conf)?;
            models.insert(ModelId::new(language_code, model_name), model);
        }
        Ok(ModelRegistry { models })
    }

    /// Looks up a model by language code, falling back to
    /// [`DEFAULT_MODEL_NAME`] ("generic") when no variant is requested, per
    /// §6's `{language_code, "generic"}` selection rule.
    pub fn get(&self, language_code: &str, model_name: Option<&str>) -> Option<Arc<dyn Model>> {
        let name = model_name.unwrap_or(DEFAULT_MODEL_NAME);
        self.models
            .get(&ModelId::new(language_code, name))
            .cloned()
    }

    /// Every registered `(language_code, model_name)` pair, for the
    /// `/v1/models` listing endpoint.
    pub fn model_ids(&self) -> Vec<ModelId> {
        self.models.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::endpoint::EndpointRule;
    use crate::recognizer::model::test_support::ToyBackend;
    use crate::recognizer::model::DecodingBackend;
    use crate::types::AlignedWord;
    use std::fs;

    struct ToyModel {
        language_code: String,
    }
    impl Model for ToyModel {
        fn language_code(&self) -> &str {
            &self.language_code
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
            &[]
        }
        fn new_backend(
            &self,
            _adaptation: crate::recognizer::model::AdaptationState,
            _left_context: &[AlignedWord],
        ) -> Box<dyn DecodingBackend> {
            Box::new(ToyBackend::new(1000))
        }
    }

    struct ToyFactory;
    impl ModelFactory for ToyFactory {
        fn build(&self, _model_dir: &Path, main_conf: &HashMap<String, String>) -> Result<Arc<dyn Model>> {
            Ok(Arc::new(ToyModel {
                language_code: main_conf["language-code"].clone(),
            }))
        }
    }

    #[test]
    fn parse_main_conf_skips_blanks_and_comments() {
        let parsed = parse_main_conf(
            "# a comment\nlanguage-code=is-IS\n\nnnet3-rxfilename = final.raw\n",
        );
        assert_eq!(parsed.get("language-code").unwrap(), "is-IS");
        assert_eq!(parsed.get("nnet3-rxfilename").unwrap(), "final.raw");
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn load_fails_fast_when_main_conf_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let result = ModelRegistry::load(&[dir.path()], &ToyFactory);
        assert!(result.is_err());
    }

    #[test]
    fn load_registers_models_lookup_by_language_and_default_variant() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.conf"), "language-code=is-IS\n").unwrap();

        let registry = ModelRegistry::load(&[dir.path()], &ToyFactory).unwrap();
        assert_eq!(registry.len(), 1);
        let model = registry.get("is-IS", None).expect("model registered");
        assert_eq!(model.language_code(), "is-IS");
        assert!(registry.get("en-US", None).is_none());
        assert_eq!(
            registry.model_ids(),
            vec![ModelId::new("is-IS", DEFAULT_MODEL_NAME)]
        );
    }
}
