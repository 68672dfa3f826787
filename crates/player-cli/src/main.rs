//! Player CLI: plays a music directory (or a saved playlist) through the
//! `audio-player` engine and takes transport keys from stdin.
//!
//! ## Commands
//! - `play`: scan a directory (or open a playlist file) and play it.
//! - `scan`: write every playable file under a directory to a playlist file.
//! - `list-devices`: print output device names.

mod cli;
mod config;
mod runtime;

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::{PlayerConfig, Settings};

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,audio_player=info,player_cli=info")
        }))
        .init();

    let file = match &args.config {
        Some(path) => PlayerConfig::load(path)?,
        None => PlayerConfig::default(),
    };
    let mut settings = Settings::resolve(file, &args.tuning);

    match args.cmd {
        cli::Command::ListDevices => runtime::list_devices(),
        cli::Command::Scan { dir, output } => {
            let dir = dir
                .or_else(|| settings.music_dir.clone())
                .ok_or_else(|| anyhow!("scan needs a directory or music_dir in the config"))?;
            let output = output
                .or_else(|| settings.playlist_file.clone())
                .ok_or_else(|| anyhow!("scan needs --output or playlist_file in the config"))?;
            runtime::run_scan(&dir, &output)
        }
        cli::Command::Play {
            path,
            playlist,
            shuffle,
            seed,
        } => {
            settings.engine.shuffle |= shuffle;
            settings.engine.shuffle_seed = seed;
            let source = runtime::PlaySource::pick(path, playlist, &settings)?;
            tracing::info!(?source, shuffle = settings.engine.shuffle, "starting player");
            runtime::run_play(&settings, source)
        }
    }
}
