use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::{Level, error, info};

mod metrics;

use sonorec::config::{DiarizationConfig, RecognitionConfig, ServerConfig, UriSchemeAllowList};
use sonorec::diarizer::reference_pipeline::ReferenceDiarizationPipeline;
use sonorec::error::Error;
use sonorec::formatter::{Formatter, LexiconRewriteFormatter};
use sonorec::model_registry::ModelRegistry;
use sonorec::orchestrator::{RequestSource, ResponseSink, run_streaming_call};
use sonorec::orchestrator::streaming::StreamingResponse;
use sonorec::punctuator::{NoopClassifier, Punctuator, wordpiece::WordPieceTokenizer};
use sonorec::recognizer::reference_backend::EnergyGateModelFactory;
use sonorec::service::{AudioInput, DiarizationPipeline, RecognizeService, UrlFetcher};
use sonorec::types::{Encoding, RecognitionResult};
use sonorec::vad::VadGate;

#[derive(Clone)]
struct AppState {
    registry: Arc<ModelRegistry>,
    service: Arc<RecognizeService>,
    punctuator: Option<Arc<Punctuator>>,
    formatter: Option<Arc<dyn Formatter>>,
}

/// A `reqwest`-backed [`UrlFetcher`] for `audio.uri` requests, gated behind
/// the server binary's `reqwest` dependency (not pulled into the library
/// crate proper — §9's "external collaborator loaded at the RPC
/// boundary").
struct ReqwestFetcher;

impl UrlFetcher for ReqwestFetcher {
    fn fetch(&self, uri: &str) -> sonorec::error::Result<Vec<u8>> {
        let response = reqwest::blocking::get(uri)
            .map_err(|err| Error::AudioDecode(format!("fetch failed: {err}")))?;
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|err| Error::AudioDecode(format!("fetch failed: {err}")))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum WireEncoding {
    EncodingUnspecified,
    Linear16,
    Mp3,
    Flac,
}

impl From<WireEncoding> for Encoding {
    fn from(value: WireEncoding) -> Self {
        match value {
            WireEncoding::EncodingUnspecified => Encoding::EncodingUnspecified,
            WireEncoding::Linear16 => Encoding::Linear16,
            WireEncoding::Mp3 => Encoding::Mp3,
            WireEncoding::Flac => Encoding::Flac,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireDiarizationConfig {
    #[serde(default)]
    enable_speaker_diarization: bool,
    #[serde(default)]
    min_speaker_count: u32,
}

#[derive(Debug, Deserialize)]
struct WireRecognitionConfig {
    encoding: WireEncoding,
    #[serde(default)]
    sample_rate_hertz: u32,
    #[serde(default)]
    language_code: String,
    #[serde(default)]
    max_alternatives: u32,
    #[serde(default)]
    enable_word_time_offsets: bool,
    #[serde(default)]
    enable_automatic_punctuation: bool,
    #[serde(default)]
    diarization_config: Option<WireDiarizationConfig>,
    #[serde(default)]
    interim_results: bool,
    #[serde(default)]
    single_utterance: bool,
}

impl From<WireRecognitionConfig> for RecognitionConfig {
    fn from(value: WireRecognitionConfig) -> Self {
        RecognitionConfig {
            encoding: value.encoding.into(),
            sample_rate_hertz: value.sample_rate_hertz,
            language_code: value.language_code,
            max_alternatives: value.max_alternatives,
            enable_word_time_offsets: value.enable_word_time_offsets,
            enable_automatic_punctuation: value.enable_automatic_punctuation,
            diarization: value.diarization_config.map(|d| DiarizationConfig {
                enable_speaker_diarization: d.enable_speaker_diarization,
                min_speaker_count: d.min_speaker_count,
            }),
            interim_results: value.interim_results,
            single_utterance: value.single_utterance,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    field_violations: Vec<FieldViolationBody>,
}

#[derive(Serialize)]
struct FieldViolationBody {
    field: String,
    message: String,
}

struct AppError(Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation { .. } | Error::ValidationMulti(_) | Error::UriUnsupported { .. } => {
                StatusCode::BAD_REQUEST
            }
            Error::AudioDecode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Cancelled => StatusCode::from_u16(499).unwrap(),
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorBody {
            error: self.0.to_string(),
            field_violations: self
                .0
                .field_violations()
                .into_iter()
                .map(|v| FieldViolationBody {
                    field: v.field,
                    message: v.message,
                })
                .collect(),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

#[derive(Serialize)]
struct ModelsResponse {
    models: Vec<ModelEntry>,
}

#[derive(Serialize)]
struct ModelEntry {
    language_code: String,
    model_name: String,
}

#[tokio::main]
async fn main() {
    sonorec::logging::init();

    if let Err(err) = run().await {
        error!(error = ?err, "sonorec-server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = ServerConfig::parse();
    config.validate().map_err(anyhow::Error::msg)?;
    if config.use_tls {
        bail!(
            "--use-tls was set, but this binary does not bundle a TLS listener; \
             terminate TLS at a reverse proxy instead"
        );
    }
    sonorec::logging::init_with_level(config.log_level);

    if let Err(err) = metrics::init() {
        tracing::warn!(error = ?err, "metrics disabled (init failed)");
    }

    let addr: SocketAddr = config
        .listen_address
        .parse()
        .context("invalid --listen-address")?;

    let registry = Arc::new(
        ModelRegistry::load(&config.models, &EnergyGateModelFactory)
            .context("failed to load model directories")?,
    );
    let diarizer: Arc<dyn DiarizationPipeline> =
        Arc::new(ReferenceDiarizationPipeline::new(10.0, 5.0, 0.2));
    let service = Arc::new(
        RecognizeService::new(registry.clone(), UriSchemeAllowList::default())
            .with_diarizer(diarizer),
    );
    let punctuator = Arc::new(Punctuator::new(
        WordPieceTokenizer::new(vec!["[UNK]".to_string()], "[UNK]", 100),
        Box::new(NoopClassifier),
    ));
    let formatter: Arc<dyn Formatter> = Arc::new(LexiconRewriteFormatter::identity());

    let state = AppState {
        registry,
        service,
        punctuator: Some(punctuator),
        formatter: Some(formatter),
    };

    let app = Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics::prometheus_metrics))
        .route("/v1/models", get(models))
        .route("/v1/recognize", post(recognize))
        .route("/v1/speech:streamingrecognize", get(streaming_recognize))
        .route_layer(axum::middleware::from_fn(metrics::track_http_metrics))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .level(Level::INFO)
                        .include_headers(false),
                )
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        );

    let listener = TcpListener::bind(addr).await.context("bind failed")?;
    info!(%addr, "listening");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

async fn root() -> &'static str {
    "sonorec-server: POST /v1/recognize, GET /v1/speech:streamingrecognize"
}

async fn healthz() -> &'static str {
    "ok"
}

async fn models(State(state): State<AppState>) -> axum::Json<ModelsResponse> {
    axum::Json(ModelsResponse {
        models: state
            .registry
            .model_ids()
            .into_iter()
            .map(|id| ModelEntry {
                language_code: id.language_code,
                model_name: id.model_name,
            })
            .collect(),
    })
}

/// Accepts `multipart/form-data` with a JSON `config` field and either an
/// `audio` binary field or a `uri` text field, mirroring the RPC
/// `RecognizeRequest`'s `{config, audio}` shape without requiring a
/// base64 dependency this corpus doesn't otherwise need (§6).
async fn recognize(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> std::result::Result<axum::Json<RecognitionResult>, AppError> {
    let mut config: Option<WireRecognitionConfig> = None;
    let mut audio_bytes: Option<Vec<u8>> = None;
    let mut audio_uri: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| Error::validation("multipart", err.to_string()))?
    {
        match field.name().unwrap_or_default() {
            "config" => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| Error::validation("config", err.to_string()))?;
                config = Some(
                    serde_json::from_str(&text)
                        .map_err(|err| Error::validation("config", err.to_string()))?,
                );
            }
            "audio" => {
                audio_bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|err| Error::validation("audio", err.to_string()))?
                        .to_vec(),
                );
            }
            "uri" => {
                audio_uri = Some(
                    field
                        .text()
                        .await
                        .map_err(|err| Error::validation("audio.uri", err.to_string()))?,
                );
            }
            _ => {}
        }
    }

    let config: RecognitionConfig = config
        .ok_or_else(|| Error::validation("config", "multipart request must include a 'config' field"))?
        .into();

    let audio = match (audio_bytes, audio_uri) {
        (Some(bytes), _) => AudioInput::Content(bytes),
        (None, Some(uri)) => AudioInput::Uri(uri),
        (None, None) => {
            return Err(Error::validation("audio", "request must include 'audio' or 'uri'").into());
        }
    };

    let punctuator = if config.enable_automatic_punctuation {
        state.punctuator.clone()
    } else {
        None
    };

    let formatter = state.formatter.clone();
    let service = state.service.clone();
    let result = tokio::task::spawn_blocking(move || {
        service.recognize(&config, audio, formatter, punctuator, &ReqwestFetcher)
    })
    .await
    .map_err(|err| Error::internal(err.to_string()))??;
    Ok(axum::Json(result))
}

async fn streaming_recognize(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_streaming_socket(socket, state))
}

#[derive(Debug, Deserialize)]
struct WireStreamingFirstMessage {
    config: WireRecognitionConfig,
    #[serde(default)]
    interim_results: bool,
    #[serde(default)]
    single_utterance: bool,
}

struct WsRequestSource {
    receiver: futures_util::stream::SplitStream<WebSocket>,
}

impl RequestSource for WsRequestSource {
    async fn next_audio(&mut self) -> sonorec::error::Result<Vec<u8>> {
        loop {
            return match self.receiver.next().await {
                Some(Ok(Message::Binary(bytes))) => Ok(bytes.to_vec()),
                Some(Ok(Message::Text(text))) if &*text == "END" => Ok(Vec::new()),
                Some(Ok(Message::Close(_))) | None => Ok(Vec::new()),
                Some(Ok(_)) => continue,
                Some(Err(_)) => Err(Error::Cancelled),
            };
        }
    }
}

struct WsResponseSink {
    sender: futures_util::stream::SplitSink<WebSocket, Message>,
}

impl ResponseSink for WsResponseSink {
    async fn send(&mut self, response: StreamingResponse) -> sonorec::error::Result<()> {
        let text = serde_json::to_string(&response)?;
        self.sender
            .send(Message::Text(text.into()))
            .await
            .map_err(|_| Error::Cancelled)
    }
}

async fn handle_streaming_socket(socket: WebSocket, state: AppState) {
    let (sender, mut receiver) = socket.split();

    let first = match receiver.next().await {
        Some(Ok(Message::Text(text))) => text,
        _ => return,
    };
    let first: WireStreamingFirstMessage = match serde_json::from_str(&first) {
        Ok(v) => v,
        Err(err) => {
            error!(error = %err, "invalid first streaming message");
            return;
        }
    };

    let model = match state
        .registry
        .get(&first.config.language_code, None)
    {
        Some(model) => model,
        None => {
            error!(language_code = %first.config.language_code, "no model registered");
            return;
        }
    };

    let sample_rate_hz = if first.config.sample_rate_hertz == 0 {
        model.feature_sample_rate_hz()
    } else {
        first.config.sample_rate_hertz
    };
    let vad = match VadGate::new(model.feature_sample_rate_hz(), 20, 0.01) {
        Ok(vad) => vad,
        Err(err) => {
            error!(error = ?err, "failed to build VAD gate");
            return;
        }
    };

    let punctuator = if first.config.enable_automatic_punctuation {
        state.punctuator.clone()
    } else {
        None
    };

    let source = WsRequestSource { receiver };
    let sink = WsResponseSink { sender };

    if let Err(err) = run_streaming_call(
        model,
        state.formatter.clone(),
        punctuator,
        vad,
        source,
        sink,
        sample_rate_hz,
        first.interim_results,
        first.single_utterance,
    )
    .await
    {
        if !matches!(err, Error::Cancelled) {
            error!(error = ?err, "streaming call ended with an error");
        }
    }
}
