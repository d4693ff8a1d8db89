//! Codec / resample stage: wraps a media container decoder and presents a
//! byte stream of canonical PCM (LINEAR16 @ the model's feature rate,
//! mono) regardless of the input container.
//!
//! Grounded on the teacher's `demux.rs`/`decode.rs`/`decoder.rs`/
//! `audio_pipeline.rs` quartet (probe → packet loop → decode → pipeline),
//! restructured around the pull-style `partial_decode`/`flush` contract
//! this component's design calls for instead of the teacher's
//! push-to-sink callback contract.

pub mod resample;

use std::time::Duration;

use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder as SymphoniaDecoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{Error, Result};
use crate::types::Encoding;
use resample::{LinearResampler, downmix_channel0};

/// Outcome of one `partial_decode` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStep {
    /// At least one packet was consumed; more may remain.
    More,
    /// The underlying container is exhausted.
    Eof,
}

/// Hint for which container/codec to expect. `Guess` (the default) probes
/// the stream.
pub fn hint_for_encoding(encoding: Encoding) -> Hint {
    let mut hint = Hint::new();
    match encoding {
        Encoding::Mp3 => {
            hint.with_extension("mp3");
        }
        Encoding::Flac => {
            hint.with_extension("flac");
        }
        _ => {}
    }
    hint
}

const PROBE_BUFFER_LEN: usize = 256 * 1024;

/// Decodes an arbitrary container into canonical mono PCM at
/// `out_sample_rate`, sample by sample, via repeated calls to
/// `partial_decode`.
pub struct Decoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn SymphoniaDecoder>,
    track_id: u32,
    src_channels: usize,
    resampler: LinearResampler,
    sample_buf: Option<SampleBuffer<f32>>,
    output: Vec<i16>,
    eof: bool,
}

impl Decoder {
    /// `codec_hint == Encoding::Guess` probes the container format.
    pub fn new<R>(reader: R, codec_hint: Encoding, out_sample_rate: u32) -> Result<Self>
    where
        R: std::io::Read + Send + Sync + 'static,
    {
        let mss = MediaSourceStream::new(
            Box::new(ReadOnlySource::new(reader)),
            symphonia::core::io::MediaSourceStreamOptions {
                buffer_len: PROBE_BUFFER_LEN,
            },
        );
        let hint = hint_for_encoding(codec_hint);
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::AudioDecode(format!("unrecognized container: {e}")))?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| {
                t.codec_params.codec != CODEC_TYPE_NULL
                    && t.codec_params.sample_rate.is_some()
            })
            .ok_or_else(|| Error::AudioDecode("no decodable audio track found".into()))?;
        let track_id = track.id;
        let src_channels = track
            .codec_params
            .channels
            .map(|c| c.count())
            .unwrap_or(1);
        let src_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| Error::AudioDecode("track has unknown sample rate".into()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::AudioDecode(format!("unsupported codec: {e}")))?;

        Ok(Decoder {
            format,
            decoder,
            track_id,
            src_channels,
            resampler: LinearResampler::new(src_rate, out_sample_rate)?,
            sample_buf: None,
            output: Vec::new(),
            eof: false,
        })
    }

    /// Known only for seekable sources with a declared duration.
    pub fn duration(&self) -> Option<Duration> {
        let track = self.format.tracks().iter().find(|t| t.id == self.track_id)?;
        let n_frames = track.codec_params.n_frames?;
        let rate = track.codec_params.sample_rate? as f64;
        Some(Duration::from_secs_f64(n_frames as f64 / rate))
    }

    /// Reads at most one packet of input and appends any resulting PCM
    /// samples to the internal output buffer (drain with `take_output`).
    pub fn partial_decode(&mut self) -> Result<DecodeStep> {
        if self.eof {
            return Ok(DecodeStep::Eof);
        }
        let packet = match self.format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(_)) => {
                self.eof = true;
                self.flush()?;
                return Ok(DecodeStep::Eof);
            }
            Err(e) => return Err(Error::AudioDecode(e.to_string())),
        };
        if packet.track_id() != self.track_id {
            return Ok(DecodeStep::More);
        }
        match self.decoder.decode(&packet) {
            Ok(decoded) => push_decoded(
                decoded,
                &mut self.sample_buf,
                self.src_channels,
                &mut self.resampler,
                &mut self.output,
            )?,
            Err(SymphoniaError::DecodeError(_)) => {
                // Per the failure contract: skip malformed packets rather
                // than aborting the whole decode.
            }
            Err(SymphoniaError::IoError(_)) => {
                self.eof = true;
                self.flush()?;
                return Ok(DecodeStep::Eof);
            }
            Err(e) => return Err(Error::AudioDecode(e.to_string())),
        }
        Ok(DecodeStep::More)
    }

    /// Drains the decoder and resampler. Idempotent. Omitting this call
    /// before treating a stream as finished truncates trailing audio still
    /// sitting in the resampler's delay line.
    pub fn flush(&mut self) -> Result<()> {
        let mut out = Vec::new();
        self.resampler.finish(&mut out)?;
        self.output.extend(out.into_iter().map(f32_to_i16));
        Ok(())
    }

    /// Removes and returns all canonical PCM bytes (little-endian signed
    /// 16-bit) produced so far.
    pub fn take_output_bytes(&mut self) -> Vec<u8> {
        let samples = std::mem::take(&mut self.output);
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        bytes
    }

    /// Removes and returns all canonical PCM samples produced so far.
    pub fn take_output_samples(&mut self) -> Vec<i16> {
        std::mem::take(&mut self.output)
    }

}

fn push_decoded(
    decoded: AudioBufferRef<'_>,
    sample_buf: &mut Option<SampleBuffer<f32>>,
    src_channels: usize,
    resampler: &mut LinearResampler,
    output: &mut Vec<i16>,
) -> Result<()> {
    let spec = *decoded.spec();
    let buf =
        sample_buf.get_or_insert_with(|| SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
    buf.copy_interleaved_ref(decoded);
    let interleaved = buf.samples();
    let mono = downmix_channel0(interleaved, src_channels);

    let mut resampled = Vec::new();
    resampler.process(&mono, &mut resampled)?;
    output.extend(resampled.into_iter().map(f32_to_i16));
    Ok(())
}

fn f32_to_i16(s: f32) -> i16 {
    (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Fully decodes `reader` to canonical PCM samples in one call. Used by
/// the Content audio source, which decodes its whole blob up front.
pub fn decode_all<R>(reader: R, codec_hint: Encoding, out_sample_rate: u32) -> Result<Vec<i16>>
where
    R: std::io::Read + Send + Sync + 'static,
{
    let mut decoder = Decoder::new(reader, codec_hint, out_sample_rate)?;
    loop {
        if decoder.partial_decode()? == DecodeStep::Eof {
            break;
        }
    }
    Ok(decoder.take_output_samples())
}
