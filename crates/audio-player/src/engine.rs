//! Playback engine: the single thread that owns the pipeline and the active playlist.
//!
//! Each turn first drains every queued control message, then blocks on whichever
//! of the control channel or the pipeline event channel becomes ready. Commands that
//! pick a new track only move the playlist cursor and leave a pending load behind;
//! the load runs once at the end of the drain, so a burst of `Next` presses costs a
//! single pipeline reconfiguration.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, TryRecvError};
use player_types::{NowPlaying, PlaybackEndReason, PlaybackState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::channel::{ControlError, ControlMessage, ControlSender, control_channel};
use crate::config::EngineConfig;
use crate::element::{ElementEvent, ElementState, EventKind};
use crate::pipeline::{Pipeline, PipelineError};
use crate::playlist::Playlist;
use crate::status::{PlayerStatusState, SharedStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Everything the engine thread mutates. Only that thread ever touches it.
pub struct EngineContext {
    pipeline: Pipeline,
    events: Receiver<ElementEvent>,
    playlist: Option<Box<dyn Playlist>>,
    shuffle: bool,
    rng: StdRng,
    status: SharedStatus,
    pending: Option<String>,
    /// Consecutive tracks that failed to load or decode.
    failures: usize,
}

impl EngineContext {
    pub fn new(pipeline: Pipeline, config: &EngineConfig, status: SharedStatus) -> Self {
        let rng = match config.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let events = pipeline.events().clone();
        let ctx = Self {
            pipeline,
            events,
            playlist: None,
            shuffle: config.shuffle,
            rng,
            status,
            pending: None,
            failures: 0,
        };
        ctx.publish(|s| s.shuffle = ctx.shuffle);
        ctx
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    /// Apply every queued control message, then run the pending load (if any).
    pub fn drain_controls(&mut self, control: &Receiver<ControlMessage>) -> Flow {
        loop {
            match control.try_recv() {
                Ok(msg) => {
                    if self.apply(msg) == Flow::Exit {
                        return Flow::Exit;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    tracing::info!("all control senders dropped");
                    return Flow::Exit;
                }
            }
        }
        self.flush_pending();
        Flow::Continue
    }

    /// Block until a control message or a pipeline event arrives and handle it.
    ///
    /// A control message only updates the pending state; the caller's next
    /// [`drain_controls`](Self::drain_controls) picks up the rest of the burst.
    pub fn wait_once(&mut self, control: &Receiver<ControlMessage>) -> Flow {
        let events = self.events.clone();
        crossbeam_channel::select! {
            recv(control) -> msg => match msg {
                Ok(msg) => self.apply(msg),
                Err(_) => Flow::Exit,
            },
            recv(events) -> ev => {
                if let Ok(ev) = ev {
                    self.handle_event(ev);
                }
                Flow::Continue
            }
        }
    }

    pub fn apply(&mut self, msg: ControlMessage) -> Flow {
        tracing::debug!(?msg, "control message");
        match msg {
            ControlMessage::NewPlaylist(playlist) => self.replace_playlist(playlist),
            ControlMessage::PlayPause => {
                self.flush_pending();
                if self.playlist.as_ref().is_none_or(|p| p.count() == 0) {
                    tracing::warn!("play/pause ignored: no playable playlist");
                    return Flow::Continue;
                }
                match self.pipeline.play_pause() {
                    Ok(state) => {
                        tracing::info!(?state, "play/pause");
                        // Play after Stop restarts the loaded track.
                        let url = self.pipeline.loaded_url().map(str::to_owned);
                        self.publish(|s| {
                            s.state = state;
                            if s.url.is_none() {
                                s.url = url;
                            }
                        });
                    }
                    Err(e) => tracing::warn!("play/pause ignored: {e}"),
                }
            }
            ControlMessage::Next => self.queue_advance(1),
            ControlMessage::Previous => self.queue_advance(-1),
            ControlMessage::SetShuffle(on) => self.set_shuffle(on),
            ControlMessage::ToggleShuffle => self.set_shuffle(!self.shuffle),
            ControlMessage::Stop => {
                self.pending = None;
                self.stop_playback(PlaybackEndReason::Stopped);
            }
            ControlMessage::Shutdown => return Flow::Exit,
        }
        Flow::Continue
    }

    pub fn handle_event(&mut self, ev: ElementEvent) {
        if !self.pipeline.is_current(&ev) {
            tracing::debug!(
                source = %ev.source,
                generation = ev.generation,
                kind = ?ev.kind,
                "ignoring event from an earlier load"
            );
            return;
        }
        if self.pipeline.loaded_url().is_none() {
            tracing::debug!(source = %ev.source, kind = ?ev.kind, "ignoring event; nothing loaded");
            return;
        }
        if self.pipeline.is_sink(ev.source) {
            self.handle_sink_event(ev.kind);
        } else if self.pipeline.is_linked_decoder(ev.source) {
            self.handle_decoder_event(ev.kind);
        } else if self.pipeline.is_source(ev.source) {
            // Source failures surface synchronously from `load`.
            tracing::debug!(kind = ?ev.kind, "source event");
        } else {
            tracing::debug!(source = %ev.source, kind = ?ev.kind, "ignoring event from unlinked element");
        }
    }

    /// Stop playback and release the playlist.
    pub fn shutdown(&mut self) {
        self.pending = None;
        self.pipeline.terminate();
        if let Some(playlist) = self.playlist.take() {
            playlist.destroy();
        }
        self.publish(|s| s.clear_playback(PlaybackEndReason::Stopped));
        tracing::info!("engine stopped");
    }

    fn handle_sink_event(&mut self, kind: EventKind) {
        match kind {
            EventKind::Status(ElementState::Finished) => {
                tracing::info!("track finished");
                self.failures = 0;
                self.publish(|s| {
                    s.state = PlaybackState::Finished;
                    s.end_reason = Some(PlaybackEndReason::Eof);
                });
                if let Some(url) = self.advance(1) {
                    self.load(url);
                }
            }
            EventKind::Status(state @ (ElementState::Running | ElementState::Paused)) => {
                let state = if state == ElementState::Running {
                    PlaybackState::Running
                } else {
                    PlaybackState::Paused
                };
                self.publish(|s| s.state = state);
            }
            EventKind::Status(_) | EventKind::MusicInfo(_) => {}
            EventKind::Error(msg) => {
                tracing::warn!("output failed: {msg}");
                self.skip_failed();
            }
        }
    }

    fn handle_decoder_event(&mut self, kind: EventKind) {
        match kind {
            EventKind::MusicInfo(info) => {
                if let Err(e) = self.pipeline.on_metadata(&info) {
                    tracing::warn!("cannot start output: {e}");
                    self.skip_failed();
                    return;
                }
                self.publish(|s| s.stream = Some(info));
            }
            EventKind::Error(msg) => {
                tracing::warn!("decode failed: {msg}");
                self.skip_failed();
            }
            EventKind::Status(state) => tracing::trace!(?state, "decoder status"),
        }
    }

    fn replace_playlist(&mut self, playlist: Box<dyn Playlist>) {
        if let Some(old) = self.playlist.take() {
            old.destroy();
        }
        let count = playlist.count();
        self.playlist = Some(playlist);
        self.failures = 0;
        self.publish(|s| s.playlist_len = count);

        if count == 0 {
            tracing::warn!("empty playlist; playback not started");
            self.pending = None;
            self.stop_playback(PlaybackEndReason::Stopped);
            self.pipeline.unload();
            return;
        }
        tracing::info!(tracks = count, shuffle = self.shuffle, "new playlist");
        self.pending = self.initial_pick();
    }

    fn set_shuffle(&mut self, on: bool) {
        tracing::info!(shuffle = on, "shuffle mode");
        self.shuffle = on;
        self.publish(|s| s.shuffle = on);
    }

    fn queue_advance(&mut self, step: isize) {
        if self.playlist.is_none() {
            tracing::debug!("no playlist; ignoring skip");
            return;
        }
        self.failures = 0;
        self.pending = self.advance(step);
    }

    fn initial_pick(&mut self) -> Option<String> {
        let playlist = self.playlist.as_mut()?;
        let url = if self.shuffle {
            let index = self.rng.gen_range(0..playlist.count());
            playlist.choose(index)
        } else {
            playlist.current()
        };
        url.map(str::to_owned)
    }

    /// Move the cursor `step` entries (or to a random entry when shuffling) and
    /// return an owned copy of the new URL.
    fn advance(&mut self, step: isize) -> Option<String> {
        let playlist = self.playlist.as_mut()?;
        let count = playlist.count();
        if count == 0 {
            return None;
        }
        let url = if self.shuffle {
            let index = self.rng.gen_range(0..count);
            playlist.choose(index)
        } else {
            playlist.next(step)
        };
        url.map(str::to_owned)
    }

    fn flush_pending(&mut self) {
        if let Some(url) = self.pending.take() {
            self.load(url);
        }
    }

    /// Load `url`, skipping forward over tracks that cannot be started.
    fn load(&mut self, mut url: String) {
        loop {
            match self.pipeline.load(&url) {
                Ok(class) => {
                    tracing::info!(%url, %class, "now playing");
                    self.publish(|s| s.begin_track(&url));
                    return;
                }
                Err(e) => {
                    match &e {
                        PipelineError::NoDecoder { .. } => tracing::warn!("skipping: {e}"),
                        _ => tracing::warn!(%url, "load failed: {e}"),
                    }
                    match self.next_after_failure() {
                        Some(next) => url = next,
                        None => return,
                    }
                }
            }
        }
    }

    fn skip_failed(&mut self) {
        if let Some(url) = self.next_after_failure() {
            self.load(url);
        }
    }

    /// Next URL to try after a failure, or `None` once every entry has failed in a row.
    fn next_after_failure(&mut self) -> Option<String> {
        self.failures += 1;
        let count = self.playlist.as_ref().map_or(0, |p| p.count());
        if self.failures >= count {
            tracing::error!(failures = self.failures, "no playable track in playlist; stopping");
            self.failures = 0;
            self.stop_playback(PlaybackEndReason::Error);
            self.pipeline.unload();
            return None;
        }
        self.advance(1)
    }

    fn stop_playback(&mut self, reason: PlaybackEndReason) {
        if let Err(e) = self.pipeline.stop() {
            tracing::warn!("stop failed: {e}");
        }
        self.publish(|s| s.clear_playback(reason));
    }

    fn publish(&self, f: impl FnOnce(&mut PlayerStatusState)) {
        if let Ok(mut s) = self.status.lock() {
            f(&mut s);
        }
    }
}

/// Run the engine loop until `Shutdown` arrives or every sender is dropped.
pub fn run(ctx: &mut EngineContext, control: &Receiver<ControlMessage>) {
    tracing::info!("engine started");
    loop {
        if ctx.drain_controls(control) == Flow::Exit {
            break;
        }
        if ctx.wait_once(control) == Flow::Exit {
            break;
        }
    }
    ctx.shutdown();
}

/// Front-end handle to a running engine thread.
pub struct EngineHandle {
    control: ControlSender,
    status: SharedStatus,
    thread: Option<JoinHandle<()>>,
}

/// Start the engine thread over `pipeline`.
pub fn spawn_engine(pipeline: Pipeline, config: &EngineConfig) -> Result<EngineHandle> {
    let status = PlayerStatusState::shared();
    let (control, rx) = control_channel(config.control_capacity);
    let mut ctx = EngineContext::new(pipeline, config, status.clone());
    let thread = thread::Builder::new()
        .name("player-engine".into())
        .spawn(move || run(&mut ctx, &rx))
        .context("spawn engine thread")?;
    Ok(EngineHandle {
        control,
        status,
        thread: Some(thread),
    })
}

impl EngineHandle {
    /// Hand a playlist to the engine, waiting up to `timeout` for channel room.
    /// On failure the playlist comes back inside the error.
    pub fn submit_playlist(
        &self,
        playlist: Box<dyn Playlist>,
        timeout: Duration,
    ) -> Result<(), ControlError> {
        self.control
            .send_timeout(ControlMessage::NewPlaylist(playlist), timeout)
    }

    pub fn toggle_play_pause(&self) -> Result<(), ControlError> {
        self.control.try_send(ControlMessage::PlayPause)
    }

    pub fn skip_next(&self) -> Result<(), ControlError> {
        self.control.try_send(ControlMessage::Next)
    }

    pub fn skip_previous(&self) -> Result<(), ControlError> {
        self.control.try_send(ControlMessage::Previous)
    }

    pub fn set_shuffle(&self, on: bool) -> Result<(), ControlError> {
        self.control.try_send(ControlMessage::SetShuffle(on))
    }

    /// Flip shuffle mode relative to whatever the engine has applied by then.
    pub fn toggle_shuffle(&self) -> Result<(), ControlError> {
        self.control.try_send(ControlMessage::ToggleShuffle)
    }

    /// Shuffle mode as last applied by the engine.
    pub fn get_shuffle(&self) -> bool {
        self.status.lock().map(|s| s.shuffle).unwrap_or(false)
    }

    pub fn stop(&self) -> Result<(), ControlError> {
        self.control.try_send(ControlMessage::Stop)
    }

    pub fn current_title(&self) -> Option<String> {
        self.status.lock().ok().and_then(|s| s.title())
    }

    pub fn snapshot(&self) -> NowPlaying {
        self.status
            .lock()
            .map(|s| s.snapshot())
            .unwrap_or_default()
    }

    /// Stop playback, terminate the pipeline and join the engine thread.
    pub fn shutdown(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        // A send error means the engine already exited.
        let _ = self.control.send(ControlMessage::Shutdown);
        thread
            .join()
            .map_err(|_| anyhow!("engine thread panicked"))
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!("engine shutdown: {e:#}");
        }
    }
}
