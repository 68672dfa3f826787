//! Playlist-driven audio playback engine.
//!
//! A [`pipeline::Pipeline`] links a file source, one decoder per supported format and
//! a cpal output sink. The [`engine`] thread owns the pipeline and the active
//! [`playlist::Playlist`], relinking decoders as the format of the current track changes.

pub mod channel;
pub mod config;
pub mod decode;
pub mod device;
pub mod element;
pub mod engine;
pub mod extension;
pub mod path_stack;
pub mod pipeline;
pub mod playback;
pub mod playlist;
pub mod queue;
pub mod registry;
pub mod resample;
pub mod scan;
pub mod status;

#[cfg(test)]
mod test_support;

use anyhow::Result;

use crate::config::PlaybackConfig;
use crate::element::Element;
use crate::element::decoder::SymphoniaDecoder;
use crate::element::sink::CpalSink;
use crate::element::source::FileSource;
use crate::pipeline::Pipeline;
use crate::registry::DecoderRegistry;

/// Build the file -> symphonia -> cpal pipeline with one decoder per supported format.
pub fn build_pipeline(playback: &PlaybackConfig) -> Result<Pipeline> {
    let buffer_seconds = playback.buffer_seconds;
    let registry = DecoderRegistry::new(|class| {
        let decoder = SymphoniaDecoder::new(class, buffer_seconds)?;
        Ok(Box::new(decoder) as Box<dyn Element>)
    })?;
    tracing::debug!(
        decoders = crate::extension::ExtensionClass::SUPPORTED.len(),
        "decoder registry ready"
    );
    Ok(Pipeline::new(
        Box::new(FileSource::new()),
        registry,
        Box::new(CpalSink::new(playback.clone())),
    ))
}
