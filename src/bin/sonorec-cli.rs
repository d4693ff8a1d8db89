// src/bin/sonorec-cli.rs

use std::io::{self, Read, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use sonorec::config::{DiarizationConfig, UriSchemeAllowList};
use sonorec::diarizer::reference_pipeline::ReferenceDiarizationPipeline;
use sonorec::error::Error;
use sonorec::formatter::LexiconRewriteFormatter;
use sonorec::model_registry::ModelRegistry;
use sonorec::punctuator::{NoopClassifier, Punctuator, wordpiece::WordPieceTokenizer};
use sonorec::recognizer::reference_backend::EnergyGateModelFactory;
use sonorec::service::{AudioInput, DiarizationPipeline, RecognizeService, UrlFetcher};
use sonorec::types::Encoding;

#[derive(Parser, Debug)]
#[command(name = "sonorec-cli")]
#[command(about = "One-shot speech recognition over a local file or stdin")]
struct Params {
    /// Comma-separated model directory paths; each must contain `main.conf`.
    #[arg(short = 'm', long = "models", required = true, value_delimiter = ',')]
    models: Vec<String>,

    /// Input audio path, or "-" to read from stdin.
    #[arg(short = 'i', long = "input", required = true)]
    input: String,

    /// BCP-47 language code to select the registered model.
    #[arg(short = 'l', long = "language", required = true)]
    language: String,

    /// Input container: LINEAR16, MP3, FLAC, or GUESS.
    #[arg(long = "encoding", default_value = "GUESS")]
    encoding: String,

    #[arg(long = "max-alternatives", default_value_t = 1)]
    max_alternatives: u32,

    #[arg(long = "word-time-offsets", default_value_t = true)]
    word_time_offsets: bool,

    #[arg(long = "punctuation", default_value_t = false)]
    punctuation: bool,

    /// Label words with a speaker id via the diarization pipeline.
    #[arg(long = "diarize", default_value_t = false)]
    diarize: bool,

    /// Minimum number of distinct speakers to look for when `--diarize` is set.
    #[arg(long = "speaker-count", default_value_t = 2)]
    speaker_count: u32,

    /// Emit the result as JSON instead of a plain transcript.
    #[arg(long = "json", default_value_t = false)]
    json: bool,
}

struct UnsupportedFetcher;
impl UrlFetcher for UnsupportedFetcher {
    fn fetch(&self, uri: &str) -> sonorec::error::Result<Vec<u8>> {
        Err(Error::internal(format!(
            "sonorec-cli only recognizes local input; got a URI '{uri}'"
        )))
    }
}

fn parse_encoding(raw: &str) -> Result<Encoding> {
    match raw.to_ascii_uppercase().as_str() {
        "LINEAR16" => Ok(Encoding::Linear16),
        "MP3" => Ok(Encoding::Mp3),
        "FLAC" => Ok(Encoding::Flac),
        "GUESS" => Ok(Encoding::Guess),
        other => anyhow::bail!("unknown encoding '{other}' (expected LINEAR16, MP3, FLAC, GUESS)"),
    }
}

fn read_input(path: &str) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    if path == "-" {
        io::stdin()
            .read_to_end(&mut bytes)
            .context("failed to read audio from stdin")?;
    } else {
        std::fs::File::open(path)
            .with_context(|| format!("failed to open input file: {path}"))?
            .read_to_end(&mut bytes)
            .with_context(|| format!("failed to read input file: {path}"))?;
    }
    Ok(bytes)
}

fn main() -> Result<()> {
    sonorec::logging::init();

    let params = Params::parse();
    let encoding = parse_encoding(&params.encoding)?;
    let audio = read_input(&params.input)?;

    let registry = ModelRegistry::load(&params.models, &EnergyGateModelFactory)
        .context("failed to load model directories")?;
    let diarizer: Arc<dyn DiarizationPipeline> =
        Arc::new(ReferenceDiarizationPipeline::new(10.0, 5.0, 0.2));
    let service = RecognizeService::new(Arc::new(registry), UriSchemeAllowList::default())
        .with_diarizer(diarizer);

    let config = sonorec::config::RecognitionConfig {
        encoding,
        sample_rate_hertz: 16_000,
        language_code: params.language,
        max_alternatives: params.max_alternatives,
        enable_word_time_offsets: params.word_time_offsets,
        enable_automatic_punctuation: params.punctuation,
        diarization: params.diarize.then_some(DiarizationConfig {
            enable_speaker_diarization: true,
            min_speaker_count: params.speaker_count,
        }),
        interim_results: false,
        single_utterance: false,
    };

    let formatter = Arc::new(LexiconRewriteFormatter::identity());
    let punctuator = if params.punctuation {
        Some(Arc::new(Punctuator::new(
            WordPieceTokenizer::new(vec!["[UNK]".to_string()], "[UNK]", 100),
            Box::new(NoopClassifier),
        )))
    } else {
        None
    };

    let result = service
        .recognize(&config, AudioInput::Content(audio), Some(formatter), punctuator, &UnsupportedFetcher)
        .map_err(|err| anyhow::anyhow!("{err}"))?;

    let mut stdout = io::stdout();
    if params.json {
        serde_json::to_writer_pretty(&mut stdout, &result)?;
        writeln!(stdout)?;
    } else {
        for alt in &result.alternatives {
            writeln!(stdout, "{}", alt.transcript)?;
        }
    }
    Ok(())
}
