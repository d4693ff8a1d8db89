//! Structured JSON logging, feature-gated so library consumers never need
//! `tracing-subscriber` unless they opt into the `logging` feature.

/// Log level as named on the `--log-level` CLI flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[serde(alias = "WARN")]
    Warning,
    Error,
}

impl LogLevel {
    fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Error
    }
}

/// Initialize structured JSON logging at the default level (`ERROR`)
/// unless overridden by `SONOREC_LOG`.
#[cfg(feature = "logging")]
pub fn init() {
    init_with_level(LogLevel::Error);
}

/// Initialize structured JSON logging at `level` unless overridden by
/// `SONOREC_LOG`.
#[cfg(feature = "logging")]
pub fn init_with_level(level: LogLevel) {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let default_directive = level.as_filter_str().parse().unwrap_or_else(|_| {
        tracing::level_filters::LevelFilter::ERROR.into()
    });

    let filter = EnvFilter::builder()
        .with_env_var("SONOREC_LOG")
        .with_default_directive(default_directive)
        .from_env_lossy();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true),
        )
        .try_init();
}

/// No-op when the `logging` feature is disabled, so library consumers can
/// always call `sonorec::logging::init()`.
#[cfg(not(feature = "logging"))]
pub fn init() {}

#[cfg(not(feature = "logging"))]
pub fn init_with_level(_level: LogLevel) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init_with_level(LogLevel::Debug);
    }

    #[test]
    fn default_level_is_error() {
        assert_eq!(LogLevel::default(), LogLevel::Error);
    }
}
