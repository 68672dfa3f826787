//! cpal output stream and its real-time callback.
//!
//! The callback refills a small local buffer from the queue without blocking, maps
//! channels (mono/stereo, best-effort otherwise) and converts to the device format.
//! Underruns are filled with silence.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use crate::queue::{PopStrategy, SharedAudio};

/// Knobs shared between the sink element and its output callback.
#[derive(Clone, Debug)]
pub struct CallbackConfig {
    /// Maximum frames pulled from the queue per refill.
    pub refill_max_frames: usize,
    /// While set the callback emits silence and leaves the queue untouched.
    pub paused: Arc<AtomicBool>,
    /// Incremented by every frame written to the device.
    pub played_frames: Arc<AtomicU64>,
}

/// Build (but do not start) an output stream draining `queue`.
///
/// `queue` must already be at the device sample rate.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    queue: &Arc<SharedAudio>,
    cfg: CallbackConfig,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, queue, cfg),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, queue, cfg),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, queue, cfg),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, queue, cfg),
        other => Err(anyhow!("unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<SharedAudio>,
    cfg: CallbackConfig,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let dst_channels = usize::from(config.channels).max(1);
    let mut local = LocalBuffer {
        pos: 0,
        src_channels: queue.channels(),
        src: Vec::new(),
    };
    let queue = queue.clone();
    let refill = cfg.refill_max_frames.max(1);
    let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            if cfg.paused.load(Ordering::Relaxed) {
                data.fill(silence);
                return;
            }

            let mut written = 0u64;
            for frame in data.chunks_mut(dst_channels) {
                if local.exhausted() {
                    match queue.pop(PopStrategy::NonBlocking { max_frames: refill }) {
                        Some(v) => local.refill(v),
                        None => {
                            frame.fill(silence);
                            continue;
                        }
                    }
                }
                for (ch, out) in frame.iter_mut().enumerate() {
                    *out = <T as cpal::Sample>::from_sample::<f32>(local.sample(dst_channels, ch));
                }
                local.advance();
                written += 1;
            }
            if written > 0 {
                cfg.played_frames.fetch_add(written, Ordering::Relaxed);
            }
        },
        |err| tracing::warn!("output stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

/// Interleaved samples already taken from the queue, owned by the callback.
struct LocalBuffer {
    pos: usize,
    src_channels: usize,
    src: Vec<f32>,
}

impl LocalBuffer {
    fn exhausted(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn refill(&mut self, samples: Vec<f32>) {
        self.src = samples;
        self.pos = 0;
    }

    fn advance(&mut self) {
        self.pos += self.src_channels;
    }

    /// Sample for output channel `dst_ch` of the current frame.
    ///
    /// mono->stereo duplicates, stereo->mono averages, other layouts clamp to the
    /// last available source channel.
    fn sample(&self, dst_channels: usize, dst_ch: usize) -> f32 {
        let get = |ch: usize| -> f32 {
            if ch < self.src_channels {
                self.src.get(self.pos + ch).copied().unwrap_or(0.0)
            } else {
                0.0
            }
        };
        match (self.src_channels, dst_channels) {
            (2, 1) => 0.5 * (get(0) + get(1)),
            (1, _) => get(0),
            (src, _) => get(dst_ch.min(src.saturating_sub(1))),
        }
    }
}
