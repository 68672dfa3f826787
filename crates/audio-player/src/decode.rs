//! Symphonia probe and decode loop used by the decoder element.

use std::io;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, CodecRegistry, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia_adapter_libopus::OpusDecoder;

use crate::element::AudioInfo;
use crate::queue::SharedAudio;

/// Symphonia's built-in codecs plus libopus for Opus, which symphonia lacks.
fn codecs() -> &'static CodecRegistry {
    static CODECS: OnceLock<CodecRegistry> = OnceLock::new();
    CODECS.get_or_init(|| {
        let mut registry = CodecRegistry::new();
        symphonia::default::register_enabled_codecs(&mut registry);
        registry.register_all::<OpusDecoder>();
        registry
    })
}

/// A probed container positioned at its first packet, with its codec ready.
pub struct ProbedStream {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    info: AudioInfo,
}

impl ProbedStream {
    pub fn info(&self) -> &AudioInfo {
        &self.info
    }
}

/// How a decode run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeOutcome {
    EndOfStream,
    Cancelled,
}

/// Probe `source`, using `extension` as a format hint when given.
///
/// Fails when the container or its codec is unsupported, so nothing is reported
/// downstream for a track that cannot decode.
pub fn probe(source: Box<dyn MediaSource>, extension: Option<&str>) -> Result<ProbedStream> {
    let mss = MediaSourceStream::new(source, Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("probe container")?;
    let format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("no default audio track"))?;
    let codec_params = track.codec_params.clone();
    let track_id = track.id;
    let decoder = codecs()
        .make(&codec_params, &DecoderOptions::default())
        .context("create codec")?;

    let channels = codec_params
        .channels
        .ok_or_else(|| anyhow!("unknown channel layout"))?
        .count();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("unknown sample rate"))?;

    let info = AudioInfo {
        sample_rate,
        channels: u16::try_from(channels).unwrap_or(u16::MAX),
        bits: codec_params
            .bits_per_sample
            .or(codec_params.bits_per_coded_sample)
            .and_then(|v| u16::try_from(v).ok())
            .unwrap_or(0),
        duration_ms: duration_ms_from_codec_params(&codec_params),
        codec: codec_name_from_params(&codec_params),
    };

    Ok(ProbedStream {
        format,
        decoder,
        track_id,
        info,
    })
}

/// Decode every packet of the default track into `out` until end of stream,
/// cancellation, or a fatal error. Corrupt packets are skipped.
pub fn decode_into(
    stream: ProbedStream,
    out: &SharedAudio,
    cancel: &AtomicBool,
) -> Result<DecodeOutcome> {
    let ProbedStream {
        mut format,
        mut decoder,
        track_id,
        ..
    } = stream;
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Ok(DecodeOutcome::Cancelled);
        }

        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Ok(DecodeOutcome::EndOfStream);
            }
            Err(SymphoniaError::ResetRequired) => return Ok(DecodeOutcome::EndOfStream),
            Err(e) => return Err(anyhow!("read packet: {e}")),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(msg)) => {
                tracing::debug!("skipping corrupt packet: {msg}");
                continue;
            }
            Err(e) => return Err(anyhow!("decode packet: {e}")),
        };

        let spec = *decoded.spec();
        let needed = decoded.frames() * spec.channels.count();
        if sample_buf.as_ref().is_none_or(|b| b.capacity() < needed) {
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }
        let Some(buf) = sample_buf.as_mut() else {
            continue;
        };
        buf.copy_interleaved_ref(decoded);

        if !out.push_blocking(buf.samples()) {
            return Ok(DecodeOutcome::Cancelled);
        }
    }
}

fn duration_ms_from_codec_params(codec_params: &CodecParameters) -> Option<u64> {
    let frames = codec_params.n_frames?;
    let rate = codec_params.sample_rate? as u64;
    if rate == 0 {
        return None;
    }
    Some(frames.saturating_mul(1000) / rate)
}

/// Codec label shown in the now-playing readout.
fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_OPUS => "OPUS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}
