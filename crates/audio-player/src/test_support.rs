//! Scripted elements for exercising the controller and engine without audio hardware.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use crossbeam_channel::Sender;

use crate::element::{
    AudioInfo, Element, ElementEvent, ElementId, ElementState, Emitter, EventKind, Port, StateCell,
};
use crate::extension::ExtensionClass;
use crate::pipeline::Pipeline;
use crate::playlist::{MemoryPlaylist, Playlist};
use crate::registry::DecoderRegistry;

#[derive(Debug, Default)]
pub(crate) struct MockCounters {
    pub runs: AtomicUsize,
    pub stops: AtomicUsize,
    pub pauses: AtomicUsize,
    pub resumes: AtomicUsize,
    pub resets: AtomicUsize,
    pub set_infos: AtomicUsize,
    pub listener_attaches: AtomicUsize,
    pub listener_detaches: AtomicUsize,
}

#[derive(Debug, Default)]
struct Script {
    uris: Vec<String>,
    last_info: Option<AudioInfo>,
    fail_next_run: bool,
}

/// Test-side view of a [`MockElement`] that lives inside a pipeline.
pub(crate) struct MockView {
    pub id: ElementId,
    pub counters: Arc<MockCounters>,
    emitter: Emitter,
    state: StateCell,
    script: Arc<Mutex<Script>>,
}

impl MockView {
    /// Send an event as if the element's worker produced it.
    pub fn emit(&self, kind: EventKind) {
        self.emitter.emit(kind);
    }

    pub fn uris(&self) -> Vec<String> {
        self.script.lock().unwrap().uris.clone()
    }

    pub fn last_info(&self) -> Option<AudioInfo> {
        self.script.lock().unwrap().last_info.clone()
    }

    pub fn force_state(&self, state: ElementState) {
        self.state.set(state);
    }

    pub fn fail_next_run(&self) {
        self.script.lock().unwrap().fail_next_run = true;
    }
}

struct MockElement {
    tag: String,
    emitter: Emitter,
    state: StateCell,
    counters: Arc<MockCounters>,
    script: Arc<Mutex<Script>>,
}

pub(crate) fn mock_element(tag: &str) -> (Box<dyn Element>, MockView) {
    let emitter = Emitter::new(ElementId::next());
    let state = StateCell::default();
    let counters = Arc::new(MockCounters::default());
    let script = Arc::new(Mutex::new(Script::default()));
    let view = MockView {
        id: emitter.id(),
        counters: counters.clone(),
        emitter: emitter.clone(),
        state: state.clone(),
        script: script.clone(),
    };
    let element = MockElement {
        tag: tag.to_string(),
        emitter,
        state,
        counters,
        script,
    };
    (Box::new(element), view)
}

impl Element for MockElement {
    fn id(&self) -> ElementId {
        self.emitter.id()
    }

    fn tag(&self) -> &str {
        &self.tag
    }

    fn set_uri(&mut self, uri: &str) {
        self.script.lock().unwrap().uris.push(uri.to_string());
    }

    fn set_input(&mut self, _port: Option<Port>) {}

    fn set_output(&mut self, _port: Option<Port>) {}

    fn set_listener(&mut self, listener: Option<Sender<ElementEvent>>) {
        let counter = if listener.is_some() {
            &self.counters.listener_attaches
        } else {
            &self.counters.listener_detaches
        };
        counter.fetch_add(1, Ordering::SeqCst);
        self.emitter.attach(listener);
    }

    fn set_generation(&mut self, generation: u64) {
        self.emitter.set_generation(generation);
    }

    fn run(&mut self) -> Result<()> {
        self.counters.runs.fetch_add(1, Ordering::SeqCst);
        let fail = std::mem::take(&mut self.script.lock().unwrap().fail_next_run);
        if fail {
            self.state.set(ElementState::Error);
            return Err(anyhow!("scripted failure"));
        }
        self.state.set(ElementState::Running);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.counters.pauses.fetch_add(1, Ordering::SeqCst);
        self.state.set(ElementState::Paused);
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.counters.resumes.fetch_add(1, Ordering::SeqCst);
        self.state.set(ElementState::Running);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn wait_for_stop(&mut self) -> Result<()> {
        self.state.set(ElementState::Stopped);
        Ok(())
    }

    fn reset(&mut self) {
        self.counters.resets.fetch_add(1, Ordering::SeqCst);
        self.state.set(ElementState::Init);
    }

    fn state(&self) -> ElementState {
        self.state.get()
    }

    fn info(&self) -> AudioInfo {
        self.script.lock().unwrap().last_info.clone().unwrap_or_default()
    }

    fn set_info(&mut self, info: &AudioInfo) -> Result<()> {
        self.counters.set_infos.fetch_add(1, Ordering::SeqCst);
        self.script.lock().unwrap().last_info = Some(info.clone());
        Ok(())
    }
}

/// A pipeline built from mock elements plus probes into each of them.
pub(crate) struct MockRig {
    pub pipeline: Pipeline,
    pub source: MockView,
    pub sink: MockView,
    pub decoders: Vec<(ExtensionClass, MockView)>,
}

impl MockRig {
    pub fn new() -> Self {
        let (source, source_view) = mock_element("mock-source");
        let (sink, sink_view) = mock_element("mock-sink");
        let mut decoders = Vec::new();
        let registry = DecoderRegistry::new(|class| {
            let (el, view) = mock_element(&format!("mock-{class}"));
            decoders.push((class, view));
            Ok(el)
        })
        .unwrap();
        Self {
            pipeline: Pipeline::new(source, registry, sink),
            source: source_view,
            sink: sink_view,
            decoders,
        }
    }

    pub fn decoder(&self, class: ExtensionClass) -> &MockView {
        self.decoders
            .iter()
            .find(|(c, _)| *c == class)
            .map(|(_, p)| p)
            .unwrap()
    }
}

/// Playlist wrapper that records how it was released.
pub(crate) struct TrackedPlaylist {
    inner: MemoryPlaylist,
    pub destroys: Arc<AtomicUsize>,
    pub drops: Arc<AtomicUsize>,
}

impl TrackedPlaylist {
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: MemoryPlaylist::from_urls(urls),
            destroys: Arc::new(AtomicUsize::new(0)),
            drops: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Playlist for TrackedPlaylist {
    fn choose(&mut self, index: usize) -> Option<&str> {
        self.inner.choose(index)
    }

    fn next(&mut self, step: isize) -> Option<&str> {
        self.inner.next(step)
    }

    fn current(&mut self) -> Option<&str> {
        self.inner.current()
    }

    fn count(&self) -> usize {
        self.inner.count()
    }

    fn append(&mut self, url: &str) -> Result<()> {
        self.inner.append(url)
    }

    fn destroy(self: Box<Self>) {
        self.destroys.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for TrackedPlaylist {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}
