//! Output element backed by cpal.
//!
//! The sink opens the device only once it knows the stream format, so `run` merely
//! arms it and [`Element::set_info`] starts the output session. The session thread owns
//! the cpal stream (which is not `Send` on every host), inserts a resampler when the
//! device rate differs, and reports `Finished` once the queue is closed and drained.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use cpal::traits::StreamTrait;
use crossbeam_channel::Sender;

use super::{
    AudioInfo, Element, ElementEvent, ElementId, ElementState, Emitter, EventKind, Port,
    SamplePort, StateCell,
};
use crate::config::PlaybackConfig;
use crate::device;
use crate::playback::{self, CallbackConfig};
use crate::queue::SharedAudio;
use crate::resample::{self, ResampleConfig};

pub struct CpalSink {
    config: PlaybackConfig,
    emitter: Emitter,
    state: StateCell,
    info: AudioInfo,
    input: Option<SamplePort>,
    paused: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    played_frames: Arc<AtomicU64>,
    /// Decoded queue of the active session; closed on stop to unblock the decoder.
    queue: Arc<Mutex<Option<Arc<SharedAudio>>>>,
    session: Option<JoinHandle<()>>,
}

impl CpalSink {
    pub fn new(config: PlaybackConfig) -> Self {
        Self {
            config,
            emitter: Emitter::new(ElementId::next()),
            state: StateCell::default(),
            info: AudioInfo::default(),
            input: None,
            paused: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            played_frames: Arc::new(AtomicU64::new(0)),
            queue: Arc::new(Mutex::new(None)),
            session: None,
        }
    }

    fn start_session(&mut self) -> Result<()> {
        if self.session.is_some() || self.info.sample_rate == 0 {
            return Ok(());
        }
        let queue = self
            .input
            .as_ref()
            .and_then(SamplePort::take)
            .ok_or_else(|| anyhow!("sink has no decoded stream to play"))?;
        if let Ok(mut g) = self.queue.lock() {
            *g = Some(queue.clone());
        }

        let session = Session {
            queue,
            src_rate: self.info.sample_rate,
            config: self.config.clone(),
            callback: CallbackConfig {
                refill_max_frames: self.config.refill_max_frames,
                paused: self.paused.clone(),
                played_frames: self.played_frames.clone(),
            },
            cancel: self.cancel.clone(),
            emitter: self.emitter.pinned(),
            state: self.state.clone(),
        };
        let handle = thread::Builder::new()
            .name("output-session".into())
            .spawn(move || session.run())
            .context("spawn output session thread")?;
        self.session = Some(handle);
        Ok(())
    }

    fn transition(&self, state: ElementState) {
        self.state.set(state);
        self.emitter.emit(EventKind::Status(state));
    }
}

struct Session {
    queue: Arc<SharedAudio>,
    src_rate: u32,
    config: PlaybackConfig,
    callback: CallbackConfig,
    cancel: Arc<AtomicBool>,
    emitter: Emitter,
    state: StateCell,
}

impl Session {
    fn run(self) {
        match self.play() {
            Ok(true) => {
                tracing::info!(
                    frames = self.callback.played_frames.load(Ordering::Relaxed),
                    "output drained"
                );
                self.state.set(ElementState::Finished);
                self.emitter.emit(EventKind::Status(ElementState::Finished));
            }
            Ok(false) => tracing::debug!("output session cancelled"),
            Err(e) => {
                tracing::error!("output session failed: {e:#}");
                self.queue.close();
                self.state.set(ElementState::Error);
                self.emitter.emit(EventKind::Error(format!("{e:#}")));
            }
        }
    }

    /// Returns `true` when the track played to the end, `false` when cancelled.
    fn play(&self) -> Result<bool> {
        let host = cpal::default_host();
        let device = device::pick_device(&host, self.config.device.as_deref())?;
        let supported = device::pick_output_config(&device, self.src_rate)?;
        let mut stream_config: cpal::StreamConfig = supported.clone().into();
        if let Some(buf) = device::pick_buffer_size(&supported) {
            stream_config.buffer_size = buf;
        }

        let dst_rate = stream_config.sample_rate;
        let (playq, resampler) = if dst_rate == self.src_rate {
            tracing::info!(rate_hz = dst_rate, "resample skipped");
            (self.queue.clone(), None)
        } else {
            let (q, handle) = resample::start_resampler(
                self.queue.clone(),
                self.src_rate,
                dst_rate,
                ResampleConfig {
                    chunk_frames: self.config.chunk_frames,
                    buffer_seconds: self.config.buffer_seconds,
                },
            )?;
            (q, Some(handle))
        };

        let stream = playback::build_output_stream(
            &device,
            &stream_config,
            supported.sample_format(),
            &playq,
            self.callback.clone(),
        )?;
        stream.play().context("start output stream")?;

        let drained = playq.wait_drained_or_cancel(&self.cancel);
        if drained {
            // Let the device play out what it already pulled.
            thread::sleep(Duration::from_millis(100));
        } else {
            self.callback.paused.store(true, Ordering::Relaxed);
            self.queue.close();
            playq.close();
        }
        drop(stream);
        if let Some(handle) = resampler {
            let _ = handle.join();
        }
        Ok(drained)
    }
}

impl Element for CpalSink {
    fn id(&self) -> ElementId {
        self.emitter.id()
    }

    fn tag(&self) -> &str {
        "cpal-sink"
    }

    fn set_input(&mut self, port: Option<Port>) {
        self.input = match port {
            Some(Port::Samples(p)) => Some(p),
            Some(other) => {
                tracing::warn!(?other, "sink input must be a sample link");
                None
            }
            None => None,
        };
    }

    fn set_output(&mut self, _port: Option<Port>) {}

    fn set_listener(&mut self, listener: Option<Sender<ElementEvent>>) {
        self.emitter.attach(listener);
    }

    fn set_generation(&mut self, generation: u64) {
        self.emitter.set_generation(generation);
    }

    fn run(&mut self) -> Result<()> {
        if self.input.is_none() {
            return Err(anyhow!("sink is not linked"));
        }
        self.paused.store(false, Ordering::Relaxed);
        self.transition(ElementState::Running);
        self.start_session()
    }

    fn pause(&mut self) -> Result<()> {
        self.paused.store(true, Ordering::Relaxed);
        self.transition(ElementState::Paused);
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.paused.store(false, Ordering::Relaxed);
        self.transition(ElementState::Running);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.cancel.store(true, Ordering::Relaxed);
        if let Ok(g) = self.queue.lock() {
            if let Some(q) = g.as_ref() {
                q.close();
            }
        }
        Ok(())
    }

    fn wait_for_stop(&mut self) -> Result<()> {
        if let Some(handle) = self.session.take() {
            handle
                .join()
                .map_err(|_| anyhow!("output session panicked"))?;
        }
        if self.state.get() != ElementState::Error {
            self.state.set(ElementState::Stopped);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.cancel = Arc::new(AtomicBool::new(false));
        self.queue = Arc::new(Mutex::new(None));
        self.paused.store(false, Ordering::Relaxed);
        self.played_frames.store(0, Ordering::Relaxed);
        self.info = AudioInfo::default();
        self.state.set(ElementState::Init);
    }

    fn state(&self) -> ElementState {
        self.state.get()
    }

    fn info(&self) -> AudioInfo {
        self.info.clone()
    }

    fn set_info(&mut self, info: &AudioInfo) -> Result<()> {
        if info.sample_rate == 0 || info.channels == 0 {
            return Err(anyhow!(
                "invalid stream format: {} Hz, {} channels",
                info.sample_rate,
                info.channels
            ));
        }
        self.info = info.clone();
        match self.state.get() {
            ElementState::Running | ElementState::Paused => self.start_session(),
            _ => Ok(()),
        }
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        let _ = self.terminate();
    }
}
