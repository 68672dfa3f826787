use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "player-cli", version = VERSION)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// TOML config file; command-line flags override its values
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub tuning: Tuning,
}

/// Playback tuning flags shared by every subcommand.
#[derive(ClapArgs, Debug, Default, Clone)]
pub struct Tuning {
    /// Use a specific output device by substring match
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// Resampler input chunk size in frames (higher => more latency, lower => more overhead)
    #[arg(long, global = true)]
    pub chunk_frames: Option<usize>,

    /// Playback callback refill cap (frames)
    #[arg(long, global = true)]
    pub refill_max_frames: Option<usize>,

    /// Queue buffer target in seconds (per stage)
    #[arg(long, global = true)]
    pub buffer_seconds: Option<f32>,

    /// Pending control messages the engine accepts before senders see "full"
    #[arg(long, global = true)]
    pub control_capacity: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a directory tree, a single file or a saved playlist
    Play {
        /// Directory or file to play (defaults to `music_dir` from the config)
        path: Option<PathBuf>,

        /// Replay a playlist written by `scan`
        #[arg(long, conflicts_with = "path")]
        playlist: Option<PathBuf>,

        /// Start in shuffle mode
        #[arg(long)]
        shuffle: bool,

        /// Fixed shuffle seed (reproducible order)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Scan a directory into a playlist file
    Scan {
        /// Directory to scan (defaults to `music_dir` from the config)
        dir: Option<PathBuf>,

        /// Playlist file to (re)write (defaults to `playlist_file` from the config)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// List output devices and exit
    ListDevices,
}
