//! `sonorec` — a network speech-recognition service library: decode and
//! resample incoming audio, gate it past leading silence, recognize it
//! against a registered acoustic model, rewrite the result through an
//! inverse-text-normalization formatter and punctuator, optionally
//! diarize it by speaker, and stream interim/final results back to a
//! caller over HTTP or WebSocket.
//!
//! This crate provides:
//! - Container decode + resample + mono downmix (`codec`)
//! - Pluggable audio sources: inline content, materialized or streamed URLs (`source`)
//! - Energy-threshold voice activity gating (`vad`)
//! - The per-call decoder state machine and endpoint rules (`recognizer`)
//! - Timing-preserving inverse text normalization (`formatter`)
//! - Punctuation and capitalization restoration (`punctuator`)
//! - Speaker diarization via embeddings + PLDA + clustering (`diarizer`)
//! - The two-task streaming call driver (`orchestrator`)
//! - Model directory loading (`model_registry`) and call wiring (`service`)

pub mod codec;
pub mod config;
pub mod diarizer;
pub mod error;
pub mod formatter;
pub mod logging;
pub mod model_registry;
pub mod orchestrator;
pub mod punctuator;
pub mod recognizer;
pub mod service;
pub mod source;
pub mod types;
pub mod vad;
