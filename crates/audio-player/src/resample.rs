//! Sample-rate conversion between the decoder queue and the output device.
//!
//! The sink inserts this stage only when the device cannot run at the decoded rate.
//! It runs on its own thread and closes its output once the input is drained.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::queue::{PopStrategy, SharedAudio};

#[derive(Clone, Copy, Debug)]
pub struct ResampleConfig {
    /// Input chunk size in frames for the steady-state loop.
    pub chunk_frames: usize,
    /// Buffering target (seconds) for the output queue.
    pub buffer_seconds: f32,
}

/// Spawn a resampler converting `srcq` from `src_rate` to `dst_rate`.
///
/// Returns the output queue and the worker handle.
pub fn start_resampler(
    srcq: Arc<SharedAudio>,
    src_rate: u32,
    dst_rate: u32,
    cfg: ResampleConfig,
) -> Result<(Arc<SharedAudio>, JoinHandle<()>)> {
    if src_rate == 0 || dst_rate == 0 {
        return Err(anyhow!("invalid resample rates {src_rate} -> {dst_rate}"));
    }
    let channels = srcq.channels();
    let dstq = Arc::new(SharedAudio::for_stream(dst_rate, channels, cfg.buffer_seconds));
    let chunk = cfg.chunk_frames.max(1);

    let sinc_len = 128;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window,
    };
    let resampler = Async::<f32>::new_sinc(
        dst_rate as f64 / src_rate as f64,
        1.1,
        &params,
        chunk,
        channels,
        FixedAsync::Input,
    )
    .map_err(|e| anyhow!("resampler init: {e}"))?;

    let out = dstq.clone();
    let handle = thread::Builder::new()
        .name("resampler".into())
        .spawn(move || {
            let mut stage = Stage {
                resampler: Box::new(resampler),
                channels,
                scratch: vec![0.0f32; channels * chunk * 3],
            };
            if let Err(e) = stage.run(&srcq, &out, chunk) {
                tracing::error!("resampler stopped: {e:#}");
                srcq.close();
            }
            out.close();
        })
        .context("spawn resampler thread")?;

    tracing::info!(from_hz = src_rate, to_hz = dst_rate, "resampling");
    Ok((dstq, handle))
}

struct Stage {
    resampler: Box<dyn Resampler<f32>>,
    channels: usize,
    scratch: Vec<f32>,
}

impl Stage {
    fn run(&mut self, srcq: &SharedAudio, dstq: &SharedAudio, chunk: usize) -> Result<()> {
        while let Some(input) = srcq.pop(PopStrategy::BlockingExact { frames: chunk }) {
            if !self.process(&input, None, dstq)? {
                return Ok(());
            }
        }
        // Closed with less than a full chunk left: flush it as partial chunks.
        while let Some(tail) = srcq.pop(PopStrategy::BlockingUpTo { max_frames: chunk }) {
            let frames = tail.len() / self.channels;
            if frames > 0 && !self.process(&tail, Some(frames), dstq)? {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Returns `false` once the output queue has been closed downstream.
    fn process(&mut self, input: &[f32], partial: Option<usize>, dstq: &SharedAudio) -> Result<bool> {
        let frames = input.len() / self.channels;
        let input = InterleavedSlice::new(input, self.channels, frames)
            .map_err(|e| anyhow!("input adapter: {e}"))?;
        let capacity = self.scratch.len() / self.channels;
        let mut output = InterleavedSlice::new_mut(&mut self.scratch, self.channels, capacity)
            .map_err(|e| anyhow!("output adapter: {e}"))?;
        let indexing = Indexing {
            input_offset: 0,
            output_offset: 0,
            active_channels_mask: None,
            partial_len: partial,
        };
        let (_consumed, produced) = self
            .resampler
            .process_into_buffer(&input, &mut output, Some(&indexing))
            .map_err(|e| anyhow!("resample: {e}"))?;

        let samples = produced * self.channels;
        if samples == 0 {
            return Ok(true);
        }
        Ok(dstq.push_blocking(&self.scratch[..samples]))
    }
}
