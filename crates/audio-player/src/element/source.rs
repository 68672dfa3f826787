//! File source element: opens the track and hands the byte stream to the decoder.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::Sender;

use super::{
    AudioInfo, Element, ElementEvent, ElementId, ElementState, Emitter, EventKind, Port,
    StateCell, StreamPort,
};

pub struct FileSource {
    emitter: Emitter,
    state: StateCell,
    uri: Option<String>,
    output: Option<StreamPort>,
}

impl FileSource {
    pub fn new() -> Self {
        Self {
            emitter: Emitter::new(ElementId::next()),
            state: StateCell::default(),
            uri: None,
            output: None,
        }
    }

    fn open(&self) -> Result<File> {
        let uri = self.uri.as_deref().ok_or_else(|| anyhow!("no uri set"))?;
        let path = Path::new(uri.strip_prefix("file://").unwrap_or(uri));
        File::open(path).with_context(|| format!("open {}", path.display()))
    }

    fn transition(&self, state: ElementState) {
        self.state.set(state);
        self.emitter.emit(EventKind::Status(state));
    }
}

impl Default for FileSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Element for FileSource {
    fn id(&self) -> ElementId {
        self.emitter.id()
    }

    fn tag(&self) -> &str {
        "file"
    }

    fn set_uri(&mut self, uri: &str) {
        self.uri = Some(uri.to_string());
    }

    fn set_input(&mut self, _port: Option<Port>) {}

    fn set_output(&mut self, port: Option<Port>) {
        self.output = match port {
            Some(Port::Stream(p)) => Some(p),
            Some(other) => {
                tracing::warn!(?other, "file source only produces a byte stream");
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
        let output = self
            .output
            .clone()
            .ok_or_else(|| anyhow!("file source has no output link"))?;
        match self.open() {
            Ok(file) => {
                output.put(Box::new(file));
                self.transition(ElementState::Running);
                Ok(())
            }
            Err(e) => {
                self.state.set(ElementState::Error);
                self.emitter.emit(EventKind::Error(format!("{e:#}")));
                Err(e)
            }
        }
    }

    fn pause(&mut self) -> Result<()> {
        self.transition(ElementState::Paused);
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.transition(ElementState::Running);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.state.set(ElementState::Stopped);
        Ok(())
    }

    fn wait_for_stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self) {
        self.state.set(ElementState::Init);
    }

    fn state(&self) -> ElementState {
        self.state.get()
    }

    fn info(&self) -> AudioInfo {
        AudioInfo::default()
    }

    fn set_info(&mut self, _info: &AudioInfo) -> Result<()> {
        Ok(())
    }
}
