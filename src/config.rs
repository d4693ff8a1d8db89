//! Process-level configuration: the CLI flags in the external interfaces
//! design, plus the recognition-config fields recognized per request.
//!
//! Grounded on `original_source`'s `SpeechServerOptions` field set, wired
//! here with `clap` the way the teacher's `scribble-server::Params` does.

use crate::logging::LogLevel;
use crate::types::Encoding;

/// Top-level server configuration, built from CLI flags.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "cli", derive(clap::Parser))]
#[cfg_attr(feature = "cli", command(name = "sonorec-server", version))]
pub struct ServerConfig {
    /// Address the HTTP/WS listener binds to.
    #[cfg_attr(feature = "cli", arg(long, default_value = "127.0.0.1:8080"))]
    pub listen_address: String,

    /// Comma-separated list of model directory paths. Each directory must
    /// contain a `main.conf` file (see `model_registry`).
    #[cfg_attr(feature = "cli", arg(long, value_delimiter = ',', required = true))]
    pub models: Vec<String>,

    #[cfg_attr(feature = "cli", arg(long, default_value_t = false))]
    pub use_tls: bool,

    #[cfg_attr(feature = "cli", arg(long))]
    pub tls_server_cert: Option<String>,

    #[cfg_attr(feature = "cli", arg(long))]
    pub tls_server_key: Option<String>,

    #[cfg_attr(feature = "cli", arg(long))]
    pub tls_ca_cert: Option<String>,

    #[cfg_attr(feature = "cli", arg(long, default_value_t = false))]
    pub tls_require_client_cert: bool,

    #[cfg_attr(feature = "cli", arg(long, value_enum, default_value_t = LogLevel::Error))]
    pub log_level: LogLevel,
}

impl ServerConfig {
    /// Checks the cross-field invariants a TLS setup must satisfy. This is
    /// a startup-time fatal-error check (§7): a process that is told to use
    /// TLS without a cert/key pair should refuse to start rather than bind
    /// a plaintext listener silently.
    pub fn validate(&self) -> Result<(), String> {
        if self.models.is_empty() {
            return Err("at least one --kaldi-models path is required".into());
        }
        if self.use_tls && (self.tls_server_cert.is_none() || self.tls_server_key.is_none()) {
            return Err("--use-tls requires --tls-server-cert and --tls-server-key".into());
        }
        if self.tls_require_client_cert && self.tls_ca_cert.is_none() {
            return Err("--tls-require-client-cert requires --tls-ca-cert".into());
        }
        Ok(())
    }
}

/// The allow-list of URI schemes accepted for `audio.uri` requests. `file`
/// is opt-in via `with_file_scheme` since it exposes the local filesystem
/// to callers that can name any URI.
#[derive(Debug, Clone)]
pub struct UriSchemeAllowList {
    schemes: Vec<&'static str>,
}

impl Default for UriSchemeAllowList {
    fn default() -> Self {
        UriSchemeAllowList {
            schemes: vec!["http", "https"],
        }
    }
}

impl UriSchemeAllowList {
    pub fn with_file_scheme(mut self) -> Self {
        self.schemes.push("file");
        self
    }

    pub fn is_allowed(&self, scheme: &str) -> bool {
        self.schemes.iter().any(|s| s.eq_ignore_ascii_case(scheme))
    }
}

/// Recognition config carried on a request, per the fields table in the
/// external interfaces design.
#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    pub encoding: Encoding,
    pub sample_rate_hertz: u32,
    pub language_code: String,
    pub max_alternatives: u32,
    pub enable_word_time_offsets: bool,
    pub enable_automatic_punctuation: bool,
    pub diarization: Option<DiarizationConfig>,
    pub interim_results: bool,
    pub single_utterance: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct DiarizationConfig {
    pub enable_speaker_diarization: bool,
    pub min_speaker_count: u32,
}

impl DiarizationConfig {
    /// `K = max(2, min_speaker_count)`.
    pub fn speaker_count(&self) -> u32 {
        self.min_speaker_count.max(2)
    }
}
