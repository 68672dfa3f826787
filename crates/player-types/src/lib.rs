use serde::{Deserialize, Serialize};

/// Playback state of the output stage, as seen by front-ends.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Nothing has been started since the last load.
    #[default]
    Init,
    /// Audio is streaming to the output device.
    Running,
    /// Output is held; buffered audio is kept.
    Paused,
    /// The output drained the last sample of the current track.
    Finished,
}

impl PlaybackState {
    /// `true` while the output holds a track (running or paused).
    pub fn is_active(self) -> bool {
        matches!(self, PlaybackState::Running | PlaybackState::Paused)
    }
}

/// Reason why playback of a track ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    /// Natural end of stream/file.
    Eof,
    /// Decoder or output error interrupted playback.
    Error,
    /// Playback was explicitly stopped or replaced by a command.
    Stopped,
}

/// Now-playing readout published by the playback engine.
///
/// Readers get a copy; fields can be stale by the time they are rendered.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NowPlaying {
    /// Display title (file name of the current URL).
    pub title: Option<String>,
    /// URL handed to the source element.
    pub url: Option<String>,
    /// Output state.
    pub state: PlaybackState,
    /// Whether "next" draws a random track.
    pub shuffle: bool,
    /// Number of entries in the active playlist.
    pub playlist_len: usize,
    /// Source codec label (for example `FLAC`, `MP3`).
    pub codec: Option<String>,
    /// Source sample rate (Hz).
    pub sample_rate: Option<u32>,
    /// Source channel count.
    pub channels: Option<u16>,
    /// Source bit depth, if known.
    pub bit_depth: Option<u16>,
    /// Total duration in milliseconds, if the container reports it.
    pub duration_ms: Option<u64>,
    /// How the previous track ended.
    pub end_reason: Option<PlaybackEndReason>,
}
