//! Player runtime: playlist assembly, the keyboard input thread and shutdown.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use audio_player::channel::ControlError;
use audio_player::engine::{EngineHandle, spawn_engine};
use audio_player::playlist::{DiskPlaylist, Playlist};
use audio_player::{build_pipeline, device, scan};
use crossbeam_channel::{Receiver, Sender};

use crate::config::Settings;

const SUBMIT_TIMEOUT: Duration = Duration::from_secs(2);

const HELP: &str = "keys: p=play/pause n=next b=previous s=shuffle x=stop i=status q=quit";

/// Where `play` takes its tracks from.
#[derive(Debug)]
pub enum PlaySource {
    Path(PathBuf),
    Saved(PathBuf),
}

impl PlaySource {
    /// Explicit flags first, then the config's playlist file, then its music dir.
    pub fn pick(
        path: Option<PathBuf>,
        playlist: Option<PathBuf>,
        settings: &Settings,
    ) -> Result<Self> {
        if let Some(p) = playlist {
            return Ok(Self::Saved(p));
        }
        if let Some(p) = path {
            return Ok(Self::Path(p));
        }
        if let Some(p) = settings.playlist_file.as_ref().filter(|p| p.exists()) {
            return Ok(Self::Saved(p.clone()));
        }
        settings
            .music_dir
            .clone()
            .map(Self::Path)
            .ok_or_else(|| anyhow!("nothing to play: pass a path or set music_dir in the config"))
    }
}

/// Print output devices to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    for name in device::list_devices(&host)? {
        println!("{name}");
    }
    Ok(())
}

/// Rewrite `output` with every playable file under `dir`.
pub fn run_scan(dir: &Path, output: &Path) -> Result<()> {
    let mut playlist = DiskPlaylist::open(output)?;
    playlist.clear()?;
    let summary = scan::scan_into(dir, &mut playlist)
        .with_context(|| format!("scan {:?} into {:?}", dir, output))?;
    tracing::info!(
        tracks = summary.tracks,
        skipped = summary.skipped_files,
        unreadable_dirs = summary.unreadable_dirs,
        playlist = %output.display(),
        "scan complete"
    );
    Box::new(playlist).destroy();
    Ok(())
}

fn open_playlist(source: &PlaySource) -> Result<Box<dyn Playlist>> {
    match source {
        PlaySource::Saved(path) => Ok(Box::new(DiskPlaylist::open(path)?)),
        PlaySource::Path(path) if path.is_file() => Ok(Box::new(scan::single_file(path)?)),
        PlaySource::Path(path) => Ok(Box::new(scan::build_playlist(path)?)),
    }
}

/// Start the engine on `source` and drive it from stdin until quit or Ctrl-C.
pub fn run_play(settings: &Settings, source: PlaySource) -> Result<()> {
    let playlist = open_playlist(&source)?;
    if playlist.count() == 0 {
        tracing::warn!(?source, "no playable tracks found");
    }

    let pipeline = build_pipeline(&settings.playback)?;
    let handle = spawn_engine(pipeline, &settings.engine)?;
    handle
        .submit_playlist(playlist, SUBMIT_TIMEOUT)
        .map_err(|e| anyhow!("submit playlist: {e}"))?;

    let (key_tx, key_rx) = crossbeam_channel::bounded::<Key>(16);
    let ctrlc_tx = key_tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.try_send(Key::Quit);
    })
    .context("install Ctrl-C handler")?;
    spawn_input_thread(key_tx)?;

    eprintln!("{HELP}");
    drive(&handle, &key_rx);
    handle.shutdown()
}

fn spawn_input_thread(keys: Sender<Key>) -> Result<()> {
    std::thread::Builder::new()
        .name("player-input".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                match parse_key(&line) {
                    Some(key) => {
                        if keys.send(key).is_err() {
                            return;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => eprintln!("{HELP}"),
                }
            }
            let _ = keys.send(Key::Quit);
        })
        .context("spawn input thread")?;
    Ok(())
}

fn drive(handle: &EngineHandle, keys: &Receiver<Key>) {
    while let Ok(key) = keys.recv() {
        let sent = match key {
            Key::PlayPause => handle.toggle_play_pause(),
            Key::Next => handle.skip_next(),
            Key::Previous => handle.skip_previous(),
            Key::Shuffle => handle.toggle_shuffle(),
            Key::Stop => handle.stop(),
            Key::Status => {
                print_status(handle);
                Ok(())
            }
            Key::Quit => return,
        };
        match sent {
            Ok(()) => {}
            Err(e @ ControlError::Full(_)) => tracing::warn!("{e}; command dropped"),
            Err(e @ ControlError::Disconnected(_)) => {
                tracing::error!("{e}");
                return;
            }
        }
    }
}

fn print_status(handle: &EngineHandle) {
    match serde_json::to_string_pretty(&handle.snapshot()) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::warn!("status encode failed: {e}"),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Key {
    PlayPause,
    Next,
    Previous,
    Shuffle,
    Stop,
    Status,
    Quit,
}

fn parse_key(line: &str) -> Option<Key> {
    match line.trim() {
        "p" | "play" | "pause" => Some(Key::PlayPause),
        "n" | "next" => Some(Key::Next),
        "b" | "prev" | "previous" => Some(Key::Previous),
        "s" | "shuffle" => Some(Key::Shuffle),
        "x" | "stop" => Some(Key::Stop),
        "i" | "status" => Some(Key::Status),
        "q" | "quit" => Some(Key::Quit),
        _ => None,
    }
}
