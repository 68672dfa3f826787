use std::path::Path;
use std::sync::{Arc, Mutex};

use player_types::{NowPlaying, PlaybackEndReason, PlaybackState};

use crate::element::AudioInfo;

/// Now-playing state written by the engine thread and read by front-ends.
#[derive(Debug, Default)]
pub struct PlayerStatusState {
    /// URL of the loaded track.
    pub url: Option<String>,
    pub state: PlaybackState,
    pub shuffle: bool,
    pub playlist_len: usize,
    /// Stream format reported by the decoder for the current track.
    pub stream: Option<AudioInfo>,
    /// How the previous track ended.
    pub end_reason: Option<PlaybackEndReason>,
}

pub type SharedStatus = Arc<Mutex<PlayerStatusState>>;

impl PlayerStatusState {
    pub fn shared() -> SharedStatus {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Display title: the file name of the current URL.
    pub fn title(&self) -> Option<String> {
        self.url.as_deref().map(title_from_url)
    }

    pub fn snapshot(&self) -> NowPlaying {
        let stream = self.stream.as_ref();
        NowPlaying {
            title: self.title(),
            url: self.url.clone(),
            state: self.state,
            shuffle: self.shuffle,
            playlist_len: self.playlist_len,
            codec: stream.and_then(|s| s.codec.clone()),
            sample_rate: stream.map(|s| s.sample_rate),
            channels: stream.map(|s| s.channels),
            bit_depth: stream.map(|s| s.bits).filter(|b| *b > 0),
            duration_ms: stream.and_then(|s| s.duration_ms),
            end_reason: self.end_reason,
        }
    }

    /// Start tracking a freshly loaded track.
    pub fn begin_track(&mut self, url: &str) {
        self.url = Some(url.to_string());
        self.state = PlaybackState::Running;
        self.stream = None;
    }

    /// Clear track-specific fields when playback ends.
    pub fn clear_playback(&mut self, reason: PlaybackEndReason) {
        self.url = None;
        self.stream = None;
        self.state = PlaybackState::Init;
        self.end_reason = Some(reason);
    }
}

fn title_from_url(url: &str) -> String {
    let path = url.strip_prefix("file://").unwrap_or(url);
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_file_name() {
        let mut state = PlayerStatusState::default();
        assert!(state.title().is_none());
        state.begin_track("file:///sdcard/music/Blue Train.flac");
        assert_eq!(state.title().as_deref(), Some("Blue Train.flac"));
        assert_eq!(title_from_url("plain"), "plain");
    }

    #[test]
    fn snapshot_reports_stream_details() {
        let mut state = PlayerStatusState::default();
        state.begin_track("/m/a.mp3");
        state.shuffle = true;
        state.playlist_len = 12;
        state.stream = Some(AudioInfo {
            sample_rate: 44_100,
            channels: 2,
            bits: 0,
            duration_ms: Some(180_000),
            codec: Some("MP3".into()),
        });

        let snap = state.snapshot();
        assert_eq!(snap.state, PlaybackState::Running);
        assert_eq!(snap.sample_rate, Some(44_100));
        assert_eq!(snap.bit_depth, None);
        assert_eq!(snap.codec.as_deref(), Some("MP3"));
        assert_eq!(snap.playlist_len, 12);
        assert!(snap.shuffle);
    }

    #[test]
    fn clear_playback_keeps_session_fields() {
        let mut state = PlayerStatusState::default();
        state.begin_track("a.wav");
        state.shuffle = true;
        state.playlist_len = 3;
        state.clear_playback(PlaybackEndReason::Stopped);

        assert!(state.url.is_none());
        assert_eq!(state.state, PlaybackState::Init);
        assert_eq!(state.end_reason, Some(PlaybackEndReason::Stopped));
        assert!(state.shuffle);
        assert_eq!(state.playlist_len, 3);
    }
}
