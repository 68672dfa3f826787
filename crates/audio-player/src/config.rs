/// Tuning for the decode, resample and output stages.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Resampler chunk size in frames.
    pub chunk_frames: usize,
    /// Max frames pulled per output callback refill.
    pub refill_max_frames: usize,
    /// Target buffer duration for queue sizing.
    pub buffer_seconds: f32,
    /// Output device name filter; `None` uses the host default.
    pub device: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            chunk_frames: 1024,
            refill_max_frames: 4096,
            buffer_seconds: 2.0,
            device: None,
        }
    }
}

/// Settings for the engine thread.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Bounded capacity of the control channel.
    pub control_capacity: usize,
    /// Initial shuffle mode.
    pub shuffle: bool,
    /// Fixed RNG seed for reproducible shuffle order; `None` seeds from the OS.
    pub shuffle_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            control_capacity: 8,
            shuffle: false,
            shuffle_seed: None,
        }
    }
}
