//! Decoder element backed by symphonia.
//!
//! One instance exists per [`ExtensionClass`]; the class only selects the probe hint.
//! Each run spawns a worker that probes the stream handed over by the source, publishes
//! the sample queue to the sink link, reports `MusicInfo`, then decodes until EOF.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::Sender;

use super::{
    AudioInfo, Element, ElementEvent, ElementId, ElementState, Emitter, EventKind, Port,
    SamplePort, StateCell, StreamPort,
};
use crate::decode::{self, DecodeOutcome};
use crate::extension::ExtensionClass;
use crate::queue::SharedAudio;

pub struct SymphoniaDecoder {
    class: ExtensionClass,
    tag: String,
    buffer_seconds: f32,
    emitter: Emitter,
    state: StateCell,
    info: Arc<Mutex<AudioInfo>>,
    input: Option<StreamPort>,
    output: Option<SamplePort>,
    cancel: Arc<AtomicBool>,
    /// Queue of the running track, so `stop` can unblock the worker.
    queue: Arc<Mutex<Option<Arc<SharedAudio>>>>,
    worker: Option<JoinHandle<()>>,
}

impl SymphoniaDecoder {
    pub fn new(class: ExtensionClass, buffer_seconds: f32) -> Result<Self> {
        if !class.is_known() {
            return Err(anyhow!("no decoder for {class} files"));
        }
        Ok(Self {
            class,
            tag: format!("{class}-decoder"),
            buffer_seconds,
            emitter: Emitter::new(ElementId::next()),
            state: StateCell::default(),
            info: Arc::new(Mutex::new(AudioInfo::default())),
            input: None,
            output: None,
            cancel: Arc::new(AtomicBool::new(false)),
            queue: Arc::new(Mutex::new(None)),
            worker: None,
        })
    }
}

struct Worker {
    hint: Option<&'static str>,
    buffer_seconds: f32,
    input: StreamPort,
    output: SamplePort,
    emitter: Emitter,
    state: StateCell,
    info: Arc<Mutex<AudioInfo>>,
    cancel: Arc<AtomicBool>,
    queue: Arc<Mutex<Option<Arc<SharedAudio>>>>,
}

impl Worker {
    fn run(self) {
        match self.decode() {
            Ok(DecodeOutcome::EndOfStream) => {
                self.close_queue();
                self.state.set(ElementState::Finished);
                self.emitter.emit(EventKind::Status(ElementState::Finished));
            }
            Ok(DecodeOutcome::Cancelled) => {
                self.close_queue();
                tracing::debug!("decode cancelled");
            }
            Err(e) => {
                // Report before closing: the sink drains a closed queue and reports
                // Finished, which must reach the engine after this error.
                tracing::error!("decoder failed: {e:#}");
                self.state.set(ElementState::Error);
                self.emitter.emit(EventKind::Error(format!("{e:#}")));
                self.close_queue();
            }
        }
    }

    fn close_queue(&self) {
        if let Ok(mut g) = self.queue.lock() {
            if let Some(q) = g.take() {
                q.close();
            }
        }
    }

    fn decode(&self) -> Result<DecodeOutcome> {
        let source = self
            .input
            .take()
            .ok_or_else(|| anyhow!("source handed over no stream"))?;
        let stream = decode::probe(source, self.hint)?;
        let info = stream.info().clone();

        let q = Arc::new(SharedAudio::for_stream(
            info.sample_rate,
            usize::from(info.channels),
            self.buffer_seconds,
        ));
        if let Ok(mut g) = self.queue.lock() {
            *g = Some(q.clone());
        }
        if self.cancel.load(Ordering::Relaxed) {
            return Ok(DecodeOutcome::Cancelled);
        }
        self.output.put(q.clone());
        if let Ok(mut g) = self.info.lock() {
            *g = info.clone();
        }
        tracing::info!(
            rate_hz = info.sample_rate,
            channels = info.channels,
            codec = info.codec.as_deref().unwrap_or("unknown"),
            buffer_frames = q.capacity_frames(),
            "stream probed"
        );
        self.emitter.emit(EventKind::MusicInfo(info));

        decode::decode_into(stream, &q, &self.cancel)
    }
}

impl Element for SymphoniaDecoder {
    fn id(&self) -> ElementId {
        self.emitter.id()
    }

    fn tag(&self) -> &str {
        &self.tag
    }

    fn set_input(&mut self, port: Option<Port>) {
        self.input = match port {
            Some(Port::Stream(p)) => Some(p),
            Some(other) => {
                tracing::warn!(?other, tag = %self.tag, "decoder input must be a byte stream");
                None
            }
            None => None,
        };
    }

    fn set_output(&mut self, port: Option<Port>) {
        self.output = match port {
            Some(Port::Samples(p)) => Some(p),
            Some(other) => {
                tracing::warn!(?other, tag = %self.tag, "decoder output must be a sample link");
                None
            }
            None => None,
        };
    }

    fn set_listener(&mut self, listener: Option<Sender<ElementEvent>>) {
        self.emitter.attach(listener);
    }

    fn set_generation(&mut self, generation: u64) {
        self.emitter.set_generation(generation);
    }

    fn run(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(anyhow!("{} is already running", self.tag));
        }
        let (Some(input), Some(output)) = (self.input.clone(), self.output.clone()) else {
            return Err(anyhow!("{} is not linked", self.tag));
        };

        let worker = Worker {
            hint: self.class.probe_hint(),
            buffer_seconds: self.buffer_seconds,
            input,
            output,
            emitter: self.emitter.pinned(),
            state: self.state.clone(),
            info: self.info.clone(),
            cancel: self.cancel.clone(),
            queue: self.queue.clone(),
        };
        self.state.set(ElementState::Running);
        self.emitter.emit(EventKind::Status(ElementState::Running));
        let handle = thread::Builder::new()
            .name(self.tag.clone())
            .spawn(move || worker.run())
            .context("spawn decoder thread")?;
        self.worker = Some(handle);
        Ok(())
    }

    // Decoding needs no pause of its own: a paused sink stops draining and the
    // full queue blocks the worker.
    fn pause(&mut self) -> Result<()> {
        self.state.set(ElementState::Paused);
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.state.set(ElementState::Running);
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
        if let Some(handle) = self.worker.take() {
            handle
                .join()
                .map_err(|_| anyhow!("{} worker panicked", self.tag))?;
        }
        if self.state.get() != ElementState::Error {
            self.state.set(ElementState::Stopped);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.cancel = Arc::new(AtomicBool::new(false));
        self.queue = Arc::new(Mutex::new(None));
        if let Ok(mut g) = self.info.lock() {
            *g = AudioInfo::default();
        }
        self.state.set(ElementState::Init);
    }

    fn state(&self) -> ElementState {
        self.state.get()
    }

    fn info(&self) -> AudioInfo {
        self.info.lock().map(|g| g.clone()).unwrap_or_default()
    }

    fn set_info(&mut self, info: &AudioInfo) -> Result<()> {
        if let Ok(mut g) = self.info.lock() {
            *g = info.clone();
        }
        Ok(())
    }
}

impl Drop for SymphoniaDecoder {
    fn drop(&mut self) {
        let _ = self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::tests::wav_bytes;
    use crate::queue::PopStrategy;
    use std::io::Cursor;
    use std::time::Duration;

    #[test]
    fn rejects_unknown_class() {
        assert!(SymphoniaDecoder::new(ExtensionClass::Unknown, 1.0).is_err());
    }

    #[test]
    fn run_requires_links() {
        let mut dec = SymphoniaDecoder::new(ExtensionClass::Wav, 1.0).unwrap();
        assert!(dec.run().is_err());
    }

    #[test]
    fn decodes_stream_and_reports_music_info() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let input = StreamPort::new();
        let output = SamplePort::new();
        input.put(Box::new(Cursor::new(wav_bytes(16_000, 1, 1_600))));

        let mut dec = SymphoniaDecoder::new(ExtensionClass::Wav, 1.0).unwrap();
        dec.set_listener(Some(tx));
        dec.set_input(Some(Port::Stream(input)));
        dec.set_output(Some(Port::Samples(output.clone())));
        dec.run().unwrap();

        let mut info = None;
        while info.is_none() {
            let ev = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_eq!(ev.source, dec.id());
            if let EventKind::MusicInfo(i) = ev.kind {
                info = Some(i);
            }
        }
        let info = info.unwrap();
        assert_eq!(info.sample_rate, 16_000);
        assert_eq!(info.channels, 1);

        let q = output.take().unwrap();
        let mut frames = 0;
        while let Some(chunk) = q.pop(PopStrategy::BlockingUpTo { max_frames: 512 }) {
            frames += chunk.len();
        }
        assert_eq!(frames, 1_600);

        dec.wait_for_stop().unwrap();
        let finished = rx
            .try_iter()
            .any(|ev| ev.kind == EventKind::Status(ElementState::Finished));
        assert!(finished);
    }

    #[test]
    fn corrupt_input_reports_error() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let input = StreamPort::new();
        input.put(Box::new(Cursor::new(vec![0u8; 64])));

        let mut dec = SymphoniaDecoder::new(ExtensionClass::Flac, 1.0).unwrap();
        dec.set_listener(Some(tx));
        dec.set_input(Some(Port::Stream(input)));
        dec.set_output(Some(Port::Samples(SamplePort::new())));
        dec.run().unwrap();
        dec.wait_for_stop().unwrap();

        assert_eq!(dec.state(), ElementState::Error);
        assert!(rx.try_iter().any(|ev| matches!(ev.kind, EventKind::Error(_))));
    }
}
