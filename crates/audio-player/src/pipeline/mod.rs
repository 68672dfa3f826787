//! Pipeline controller: a fixed `source -> decoder -> sink` graph whose decoder slot
//! is re-pointed at the registry entry matching each track's format.

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};
use player_types::PlaybackState;
use thiserror::Error;

use crate::element::{
    AudioInfo, Element, ElementEvent, ElementId, ElementState, Port, SamplePort, StreamPort,
};
use crate::extension::ExtensionClass;
use crate::registry::{DecoderRegistry, DecoderSlot};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no decoder for {url}")]
    NoDecoder { url: String },
    #[error("play/pause has no effect in state {0:?}")]
    InvalidTransition(ElementState),
    #[error("nothing loaded")]
    NothingLoaded,
    #[error("{tag}: {message}")]
    Element { tag: String, message: String },
}

impl PipelineError {
    fn element(el: &dyn Element, err: anyhow::Error) -> Self {
        PipelineError::Element {
            tag: el.tag().to_string(),
            message: format!("{err:#}"),
        }
    }
}

pub struct Pipeline {
    source: Box<dyn Element>,
    decoders: DecoderRegistry,
    sink: Box<dyn Element>,
    linked: Option<DecoderSlot>,
    loaded: Option<String>,
    relinks: u64,
    /// Bumped on every load; events stamped with an older value are stale.
    generation: u64,
    events_tx: Sender<ElementEvent>,
    events_rx: Receiver<ElementEvent>,
}

impl Pipeline {
    /// Wire source and sink to the event channel. No decoder is linked until the
    /// first [`load`](Pipeline::load).
    pub fn new(
        mut source: Box<dyn Element>,
        decoders: DecoderRegistry,
        mut sink: Box<dyn Element>,
    ) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        source.set_listener(Some(events_tx.clone()));
        sink.set_listener(Some(events_tx.clone()));
        Self {
            source,
            decoders,
            sink,
            linked: None,
            loaded: None,
            relinks: 0,
            generation: 0,
            events_tx,
            events_rx,
        }
    }

    /// Switch playback to `url`.
    ///
    /// Stops the current track, re-points the decoder slot only when the format
    /// family changes, gives every link fresh buffers and starts all three stages.
    pub fn load(&mut self, url: &str) -> Result<ExtensionClass, PipelineError> {
        self.stop()?;
        self.source.set_uri(url);

        let class = ExtensionClass::classify(url);
        let Some(slot) = self.decoders.select(class) else {
            self.loaded = None;
            return Err(PipelineError::NoDecoder {
                url: url.to_string(),
            });
        };
        if self.linked != Some(slot) {
            self.relink(slot);
        }

        self.reset_links(slot);
        self.generation += 1;
        let generation = self.generation;
        for el in self.linked_mut() {
            el.set_generation(generation);
        }
        self.loaded = Some(url.to_string());
        tracing::info!(
            %url,
            %class,
            generation,
            decoder = self.decoders.element(slot).tag(),
            "loading"
        );

        let mut failed = None;
        for el in self.linked_mut() {
            if let Err(e) = el.run() {
                failed = Some(PipelineError::element(el, e));
                break;
            }
        }
        if let Some(err) = failed {
            self.halt();
            self.loaded = None;
            return Err(err);
        }
        Ok(class)
    }

    /// Toggle the sink between running and paused, or restart a loaded track that
    /// was stopped.
    pub fn play_pause(&mut self) -> Result<PlaybackState, PipelineError> {
        match self.sink.state() {
            ElementState::Running => {
                self.each_linked(|el| el.pause())?;
                Ok(PlaybackState::Paused)
            }
            ElementState::Paused => {
                self.each_linked(|el| el.resume())?;
                Ok(PlaybackState::Running)
            }
            ElementState::Init | ElementState::Stopped => {
                let url = self.loaded.clone().ok_or(PipelineError::NothingLoaded)?;
                self.load(&url)?;
                Ok(PlaybackState::Running)
            }
            other => Err(PipelineError::InvalidTransition(other)),
        }
    }

    /// Hand the decoder's stream format to the sink.
    pub fn on_metadata(&mut self, info: &AudioInfo) -> Result<(), PipelineError> {
        tracing::debug!(
            rate_hz = info.sample_rate,
            channels = info.channels,
            bits = info.bits,
            "forwarding stream format to sink"
        );
        self.sink
            .set_info(info)
            .map_err(|e| PipelineError::element(self.sink.as_ref(), e))
    }

    /// Stop every linked element and wait until their workers are gone.
    pub fn stop(&mut self) -> Result<(), PipelineError> {
        if !self.any_active() {
            return Ok(());
        }
        self.each_linked(|el| el.stop())?;
        self.each_linked(|el| el.wait_for_stop())
    }

    /// Forget the loaded track, so play/pause has nothing to restart.
    pub fn unload(&mut self) {
        self.loaded = None;
    }

    /// Shut down every element, linked or not.
    pub fn terminate(&mut self) {
        let mut elements: Vec<&mut dyn Element> = vec![self.source.as_mut()];
        elements.extend(self.decoders.elements_mut());
        elements.push(self.sink.as_mut());
        for el in elements {
            if let Err(e) = el.terminate() {
                tracing::warn!("terminate failed: {}: {e:#}", el.tag());
            }
        }
        self.loaded = None;
    }

    /// Playback state as reflected by the sink.
    pub fn state(&self) -> PlaybackState {
        match self.sink.state() {
            ElementState::Running => PlaybackState::Running,
            ElementState::Paused => PlaybackState::Paused,
            ElementState::Finished | ElementState::Error => PlaybackState::Finished,
            ElementState::Init | ElementState::Stopped => PlaybackState::Init,
        }
    }

    pub fn loaded_url(&self) -> Option<&str> {
        self.loaded.as_deref()
    }

    pub fn linked_decoder(&self) -> Option<ElementId> {
        self.linked.map(|slot| self.decoders.element(slot).id())
    }

    pub fn linked_class(&self) -> Option<ExtensionClass> {
        self.linked.map(|slot| self.decoders.class_of(slot))
    }

    /// How many times the decoder slot has been re-pointed.
    pub fn relink_count(&self) -> u64 {
        self.relinks
    }

    pub fn is_sink(&self, id: ElementId) -> bool {
        self.sink.id() == id
    }

    pub fn is_source(&self, id: ElementId) -> bool {
        self.source.id() == id
    }

    pub fn is_linked_decoder(&self, id: ElementId) -> bool {
        self.linked_decoder() == Some(id)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether `event` was sent for the most recent load.
    pub fn is_current(&self, event: &ElementEvent) -> bool {
        event.generation == self.generation
    }

    pub fn events(&self) -> &Receiver<ElementEvent> {
        &self.events_rx
    }

    #[cfg(test)]
    pub(crate) fn event_sender(&self) -> Sender<ElementEvent> {
        self.events_tx.clone()
    }

    fn relink(&mut self, slot: DecoderSlot) {
        if let Some(old) = self.linked.take() {
            let el = self.decoders.element_mut(old);
            el.set_listener(None);
            el.set_input(None);
            el.set_output(None);
            tracing::debug!(decoder = el.tag(), "decoder unlinked");
        }
        let el = self.decoders.element_mut(slot);
        el.set_listener(Some(self.events_tx.clone()));
        tracing::debug!(decoder = el.tag(), "decoder linked");
        self.linked = Some(slot);
        self.relinks += 1;
    }

    /// Fresh link buffers and `Init` state for the three linked stages.
    fn reset_links(&mut self, slot: DecoderSlot) {
        let stream = StreamPort::new();
        let samples = SamplePort::new();

        self.source.reset();
        self.source.set_output(Some(Port::Stream(stream.clone())));

        let decoder = self.decoders.element_mut(slot);
        decoder.reset();
        decoder.set_input(Some(Port::Stream(stream)));
        decoder.set_output(Some(Port::Samples(samples.clone())));

        self.sink.reset();
        self.sink.set_input(Some(Port::Samples(samples)));
    }

    /// Best-effort stop after a failed start; the original error is what matters.
    fn halt(&mut self) {
        for el in self.linked_mut() {
            let _ = el.stop();
            let _ = el.wait_for_stop();
        }
    }

    /// Whether any linked element may still own a worker.
    fn any_active(&self) -> bool {
        let settled = |s: ElementState| matches!(s, ElementState::Init | ElementState::Stopped);
        !settled(self.source.state())
            || !settled(self.sink.state())
            || self
                .linked
                .is_some_and(|slot| !settled(self.decoders.element(slot).state()))
    }

    fn each_linked<F>(&mut self, mut f: F) -> Result<(), PipelineError>
    where
        F: FnMut(&mut dyn Element) -> Result<()>,
    {
        for el in self.linked_mut() {
            f(&mut *el).map_err(|e| PipelineError::element(el, e))?;
        }
        Ok(())
    }

    /// Linked elements in data-flow order.
    fn linked_mut(&mut self) -> Vec<&mut dyn Element> {
        let mut out: Vec<&mut dyn Element> = vec![self.source.as_mut()];
        if let Some(slot) = self.linked {
            out.push(self.decoders.element_mut(slot));
        }
        out.push(self.sink.as_mut());
        out
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::EventKind;
    use crate::test_support::MockRig;
    use std::sync::atomic::Ordering;

    #[test]
    fn first_load_links_matching_decoder() {
        let mut rig = MockRig::new();
        let class = rig.pipeline.load("/music/a.mp3").unwrap();
        assert_eq!(class, ExtensionClass::Mp3);
        assert_eq!(rig.pipeline.relink_count(), 1);
        assert_eq!(rig.pipeline.linked_class(), Some(ExtensionClass::Mp3));
        assert_eq!(rig.source.uris(), vec!["/music/a.mp3".to_string()]);
        assert_eq!(rig.pipeline.state(), PlaybackState::Running);
        assert_eq!(rig.decoder(ExtensionClass::Mp3).counters.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn same_class_loads_do_not_relink() {
        let mut rig = MockRig::new();
        rig.pipeline.load("a.mp3").unwrap();
        rig.pipeline.load("b.MP3").unwrap();
        rig.pipeline.load("c.mp3").unwrap();
        assert_eq!(rig.pipeline.relink_count(), 1);
        let mp3 = rig.decoder(ExtensionClass::Mp3);
        assert_eq!(mp3.counters.listener_attaches.load(Ordering::SeqCst), 1);
        assert_eq!(mp3.counters.runs.load(Ordering::SeqCst), 3);
        // Every reload stops the previous track first.
        assert_eq!(mp3.counters.stops.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn class_change_relinks_exactly_once() {
        let mut rig = MockRig::new();
        rig.pipeline.load("a.mp3").unwrap();
        rig.pipeline.load("b.flac").unwrap();
        assert_eq!(rig.pipeline.relink_count(), 2);
        assert_eq!(rig.pipeline.linked_class(), Some(ExtensionClass::Flac));
        let mp3 = rig.decoder(ExtensionClass::Mp3);
        assert_eq!(mp3.counters.listener_detaches.load(Ordering::SeqCst), 1);
        let flac = rig.decoder(ExtensionClass::Flac);
        assert_eq!(flac.counters.listener_attaches.load(Ordering::SeqCst), 1);
        assert!(rig.pipeline.is_linked_decoder(flac.id));
        assert!(!rig.pipeline.is_linked_decoder(mp3.id));
    }

    #[test]
    fn unknown_class_leaves_pipeline_stopped() {
        let mut rig = MockRig::new();
        rig.pipeline.load("a.mp3").unwrap();
        let err = rig.pipeline.load("notes.txt").unwrap_err();
        assert!(matches!(err, PipelineError::NoDecoder { .. }));
        assert_eq!(rig.pipeline.state(), PlaybackState::Init);
        assert!(rig.pipeline.loaded_url().is_none());
        assert_eq!(rig.pipeline.relink_count(), 1);
    }

    #[test]
    fn play_pause_cycles_through_states() {
        let mut rig = MockRig::new();
        assert!(matches!(
            rig.pipeline.play_pause(),
            Err(PipelineError::NothingLoaded)
        ));

        rig.pipeline.load("a.wav").unwrap();
        assert_eq!(rig.pipeline.play_pause().unwrap(), PlaybackState::Paused);
        assert_eq!(rig.pipeline.state(), PlaybackState::Paused);
        assert_eq!(rig.pipeline.play_pause().unwrap(), PlaybackState::Running);

        rig.sink.force_state(ElementState::Finished);
        assert!(matches!(
            rig.pipeline.play_pause(),
            Err(PipelineError::InvalidTransition(ElementState::Finished))
        ));
    }

    #[test]
    fn play_after_stop_restarts_loaded_track() {
        let mut rig = MockRig::new();
        rig.pipeline.load("a.wav").unwrap();
        rig.pipeline.stop().unwrap();
        assert_eq!(rig.pipeline.state(), PlaybackState::Init);
        assert_eq!(rig.pipeline.play_pause().unwrap(), PlaybackState::Running);
        assert_eq!(rig.source.uris(), vec!["a.wav".to_string(), "a.wav".to_string()]);
    }

    #[test]
    fn failing_start_is_reported_and_halts() {
        let mut rig = MockRig::new();
        rig.source.fail_next_run();
        let err = rig.pipeline.load("a.ogg").unwrap_err();
        assert!(matches!(err, PipelineError::Element { .. }));
        assert_ne!(rig.pipeline.state(), PlaybackState::Running);
    }

    #[test]
    fn metadata_reaches_the_sink() {
        let mut rig = MockRig::new();
        rig.pipeline.load("a.flac").unwrap();
        let info = AudioInfo {
            sample_rate: 44_100,
            channels: 2,
            bits: 16,
            ..AudioInfo::default()
        };
        rig.pipeline.on_metadata(&info).unwrap();
        assert_eq!(rig.sink.counters.set_infos.load(Ordering::SeqCst), 1);
        assert_eq!(rig.sink.last_info(), Some(info));
    }

    #[test]
    fn events_carry_their_origin() {
        let mut rig = MockRig::new();
        rig.pipeline.load("a.mp3").unwrap();
        rig.sink.emit(EventKind::Status(ElementState::Finished));
        let ev = rig.pipeline.events().try_recv().unwrap();
        assert!(rig.pipeline.is_sink(ev.source));
        assert!(rig.pipeline.is_current(&ev));
    }

    #[test]
    fn each_load_starts_a_new_generation() {
        let mut rig = MockRig::new();
        rig.pipeline.load("a.mp3").unwrap();
        rig.sink.emit(EventKind::Status(ElementState::Finished));
        let first = rig.pipeline.events().try_recv().unwrap();

        rig.pipeline.load("b.mp3").unwrap();
        assert_eq!(rig.pipeline.generation(), first.generation + 1);
        assert!(!rig.pipeline.is_current(&first));

        rig.decoder(ExtensionClass::Mp3).emit(EventKind::Status(ElementState::Finished));
        let second = rig.pipeline.events().try_recv().unwrap();
        assert!(rig.pipeline.is_current(&second));
    }

    #[test]
    fn unload_leaves_nothing_to_restart() {
        let mut rig = MockRig::new();
        rig.pipeline.load("a.wav").unwrap();
        rig.pipeline.stop().unwrap();
        rig.pipeline.unload();
        assert!(matches!(
            rig.pipeline.play_pause(),
            Err(PipelineError::NothingLoaded)
        ));
        assert_eq!(rig.source.uris(), vec!["a.wav".to_string()]);
    }

    #[test]
    fn terminate_reaches_unlinked_decoders() {
        let mut rig = MockRig::new();
        rig.pipeline.load("a.mp3").unwrap();
        rig.pipeline.terminate();
        for (class, view) in &rig.decoders {
            assert!(
                view.counters.stops.load(Ordering::SeqCst) >= 1,
                "{class} decoder was not terminated"
            );
        }
        assert!(rig.pipeline.loaded_url().is_none());
    }
}
