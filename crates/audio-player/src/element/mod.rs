//! Streaming pipeline elements.
//!
//! An element is one stage of the `source -> decoder -> sink` graph. Elements are
//! long-lived: the pipeline re-points, resets and re-runs them for every track
//! instead of constructing new ones. Stages hand data to each other through
//! [`Port`]s the pipeline recreates on every load, and report progress through
//! [`ElementEvent`]s sent to whichever listener is currently attached.

pub mod decoder;
pub mod sink;
pub mod source;

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use crossbeam_channel::Sender;
use symphonia::core::io::MediaSource;

use crate::queue::SharedAudio;

/// Process-unique identity of an element, used to tag its events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ElementId(u32);

impl ElementId {
    pub fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        ElementId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "el#{}", self.0)
    }
}

/// Lifecycle state of a single element.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ElementState {
    #[default]
    Init,
    Running,
    Paused,
    Stopped,
    Finished,
    Error,
}

/// Stream parameters reported by a decoder and consumed by the sink.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AudioInfo {
    pub sample_rate: u32,
    pub channels: u16,
    /// Source bit depth; `0` when the codec does not report one.
    pub bits: u16,
    pub duration_ms: Option<u64>,
    pub codec: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum EventKind {
    Status(ElementState),
    MusicInfo(AudioInfo),
    Error(String),
}

/// Asynchronous notification from an element.
#[derive(Clone, Debug, PartialEq)]
pub struct ElementEvent {
    pub source: ElementId,
    /// Pipeline load the emitting worker was started for.
    pub generation: u64,
    pub kind: EventKind,
}

/// One-shot handoff slot between two linked elements.
///
/// The producer `put`s a value when it starts, the consumer `take`s it. The pipeline
/// creates fresh slots on every load, so nothing from a previous track leaks over.
pub struct Handoff<T>(Arc<Mutex<Option<T>>>);

impl<T> Handoff<T> {
    pub fn new() -> Self {
        Handoff(Arc::new(Mutex::new(None)))
    }

    pub fn put(&self, value: T) {
        if let Ok(mut slot) = self.0.lock() {
            *slot = Some(value);
        }
    }

    pub fn take(&self) -> Option<T> {
        self.0.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl<T> Clone for Handoff<T> {
    fn clone(&self) -> Self {
        Handoff(self.0.clone())
    }
}

impl<T> Default for Handoff<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Opened byte stream travelling from source to decoder.
pub type StreamPort = Handoff<Box<dyn MediaSource>>;
/// Decoded sample queue travelling from decoder to sink.
pub type SamplePort = Handoff<Arc<SharedAudio>>;

#[derive(Clone)]
pub enum Port {
    Stream(StreamPort),
    Samples(SamplePort),
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Stream(_) => f.write_str("Port::Stream"),
            Port::Samples(_) => f.write_str("Port::Samples"),
        }
    }
}

/// Event sender shared between an element and its worker threads.
///
/// Detaching swaps the listener out under the lock, so a worker that outlives its
/// link can no longer reach the engine. Every event carries the load generation;
/// workers take a [`pinned`](Emitter::pinned) copy so events they send after a
/// newer load still name the load they belong to.
#[derive(Clone)]
pub struct Emitter {
    source: ElementId,
    listener: Arc<Mutex<Option<Sender<ElementEvent>>>>,
    generation: Arc<AtomicU64>,
}

impl Emitter {
    pub fn new(source: ElementId) -> Self {
        Self {
            source,
            listener: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set_generation(&self, generation: u64) {
        self.generation.store(generation, Ordering::Relaxed);
    }

    /// Copy that shares the listener but keeps the current generation forever.
    pub fn pinned(&self) -> Self {
        Self {
            source: self.source,
            listener: self.listener.clone(),
            generation: Arc::new(AtomicU64::new(self.generation.load(Ordering::Relaxed))),
        }
    }

    pub fn id(&self) -> ElementId {
        self.source
    }

    pub fn attach(&self, listener: Option<Sender<ElementEvent>>) {
        if let Ok(mut g) = self.listener.lock() {
            *g = listener;
        }
    }

    pub fn emit(&self, kind: EventKind) {
        let Ok(g) = self.listener.lock() else {
            return;
        };
        if let Some(tx) = g.as_ref() {
            let _ = tx.send(ElementEvent {
                source: self.source,
                generation: self.generation.load(Ordering::Relaxed),
                kind,
            });
        }
    }
}

/// Element state shared with worker threads.
#[derive(Clone, Debug, Default)]
pub struct StateCell(Arc<Mutex<ElementState>>);

impl StateCell {
    pub fn get(&self) -> ElementState {
        self.0.lock().map(|g| *g).unwrap_or(ElementState::Error)
    }

    pub fn set(&self, state: ElementState) {
        if let Ok(mut g) = self.0.lock() {
            *g = state;
        }
    }
}

/// A stage of the playback pipeline.
///
/// `stop` only requests a stop; `wait_for_stop` blocks until worker threads are gone.
/// `reset` returns the element to [`ElementState::Init`] so it can be run again.
pub trait Element: Send {
    fn id(&self) -> ElementId;

    /// Short human-readable role name used in logs.
    fn tag(&self) -> &str;

    fn set_uri(&mut self, _uri: &str) {}

    fn set_input(&mut self, port: Option<Port>);

    fn set_output(&mut self, port: Option<Port>);

    fn set_listener(&mut self, listener: Option<Sender<ElementEvent>>);

    /// Load generation stamped on events from the next run.
    fn set_generation(&mut self, generation: u64);

    fn run(&mut self) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn resume(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    fn wait_for_stop(&mut self) -> Result<()>;

    fn terminate(&mut self) -> Result<()> {
        self.stop()?;
        self.wait_for_stop()
    }

    fn reset(&mut self);

    fn state(&self) -> ElementState;

    fn info(&self) -> AudioInfo;

    fn set_info(&mut self, info: &AudioInfo) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_ids_are_unique() {
        let a = ElementId::next();
        let b = ElementId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn handoff_is_taken_once() {
        let port: Handoff<u32> = Handoff::new();
        let consumer = port.clone();
        port.put(7);
        assert_eq!(consumer.take(), Some(7));
        assert_eq!(consumer.take(), None);
    }

    #[test]
    fn emitter_stops_sending_after_detach() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let emitter = Emitter::new(ElementId::next());
        let worker_copy = emitter.clone();

        emitter.attach(Some(tx));
        worker_copy.emit(EventKind::Status(ElementState::Running));
        emitter.attach(None);
        worker_copy.emit(EventKind::Status(ElementState::Finished));

        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].source, emitter.id());
        assert_eq!(got[0].kind, EventKind::Status(ElementState::Running));
    }

    #[test]
    fn pinned_emitter_keeps_its_generation() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let emitter = Emitter::new(ElementId::next());
        emitter.attach(Some(tx));
        emitter.set_generation(3);
        let worker_copy = emitter.pinned();
        emitter.set_generation(4);

        worker_copy.emit(EventKind::Status(ElementState::Finished));
        emitter.emit(EventKind::Status(ElementState::Running));

        let got: Vec<_> = rx.try_iter().map(|ev| ev.generation).collect();
        assert_eq!(got, [3, 4]);
    }

    #[test]
    fn state_cell_is_shared_between_clones() {
        let cell = StateCell::default();
        let other = cell.clone();
        other.set(ElementState::Paused);
        assert_eq!(cell.get(), ElementState::Paused);
    }
}
