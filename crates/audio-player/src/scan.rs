//! Directory playlist builder.
//!
//! Walks a directory tree with an explicit pending stack (no recursion, so tree
//! depth never grows the call stack) and appends every file with a recognised
//! extension. Entries come out in traversal order; they are not sorted.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::extension::ExtensionClass;
use crate::path_stack::PathStack;
use crate::playlist::{MemoryPlaylist, Playlist};

/// Counters reported by a directory walk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Files appended to the playlist.
    pub tracks: usize,
    /// Regular files skipped because their extension is not playable.
    pub skipped_files: usize,
    /// Directories that could not be listed (the subtree was skipped).
    pub unreadable_dirs: usize,
}

/// Build an in-memory playlist from every playable file under `root`.
pub fn build_playlist(root: &Path) -> Result<MemoryPlaylist> {
    let mut playlist = MemoryPlaylist::new();
    scan_into(root, &mut playlist)?;
    Ok(playlist)
}

/// Build a playlist rooted at the user's current browse position.
pub fn build_from_cursor(cursor: &PathStack) -> Result<MemoryPlaylist> {
    if cursor.is_empty() {
        return Err(anyhow!("browse cursor is empty"));
    }
    build_playlist(&cursor.to_path())
}

/// One-entry playlist for a single selected file.
pub fn single_file(path: &Path) -> Result<MemoryPlaylist> {
    let url = path_to_url(path);
    if !ExtensionClass::classify(&url).is_known() {
        return Err(anyhow!("not a playable file: {}", path.display()));
    }
    Ok(MemoryPlaylist::from_urls([url]))
}

/// Append every playable file under `root` to `playlist`.
///
/// Unreadable directories are logged and skipped. A failing `append` aborts the walk:
/// a partially written playlist would play the wrong set of tracks.
pub fn scan_into(root: &Path, playlist: &mut dyn Playlist) -> Result<ScanSummary> {
    tracing::info!(root = %root.display(), "scanning for tracks");

    let mut summary = ScanSummary::default();
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), "skipping unreadable directory: {e}");
                summary.unreadable_dirs += 1;
                continue;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), "directory entry error: {e}");
                    continue;
                }
            };
            // DirEntry::file_type does not follow symlinks, so linked directories are
            // never descended into and cycles cannot occur.
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), "file type error: {e}");
                    continue;
                }
            };
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }

            let url = path_to_url(&path);
            if !ExtensionClass::classify(&url).is_known() {
                summary.skipped_files += 1;
                continue;
            }
            playlist
                .append(&url)
                .with_context(|| format!("append {url} to playlist"))?;
            summary.tracks += 1;
        }
    }

    tracing::info!(
        root = %root.display(),
        tracks = summary.tracks,
        skipped = summary.skipped_files,
        unreadable_dirs = summary.unreadable_dirs,
        "scan complete"
    );
    Ok(summary)
}

fn path_to_url(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn counts_only_recognised_files_at_any_depth() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a.mp3"));
        touch(&root.join("notes.txt"));
        touch(&root.join("x/b.FLAC"));
        touch(&root.join("x/cover.jpg"));
        touch(&root.join("x/y/z/c.ogg"));
        touch(&root.join("x/y/z/README"));
        touch(&root.join("x/y/z/w/.hidden"));
        touch(&root.join("q/d.m4a"));

        let mut pl = MemoryPlaylist::new();
        let summary = scan_into(root, &mut pl).unwrap();
        assert_eq!(pl.count(), 4);
        assert_eq!(summary.tracks, 4);
        assert_eq!(summary.skipped_files, 4);
        assert_eq!(summary.unreadable_dirs, 0);

        let mut urls: Vec<_> = pl.urls().to_vec();
        urls.sort();
        assert!(urls.iter().any(|u| u.ends_with("c.ogg")));
    }

    #[test]
    fn deep_tree_does_not_recurse() {
        let dir = tempfile::tempdir().unwrap();
        let mut deep = dir.path().to_path_buf();
        for i in 0..64 {
            deep.push(format!("d{i}"));
        }
        touch(&deep.join("bottom.wav"));
        touch(&dir.path().join("top.opus"));

        let pl = build_playlist(dir.path()).unwrap();
        assert_eq!(pl.count(), 2);
    }

    #[test]
    fn missing_root_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut pl = MemoryPlaylist::new();
        let summary = scan_into(&dir.path().join("nope"), &mut pl).unwrap();
        assert_eq!(summary.unreadable_dirs, 1);
        assert_eq!(pl.count(), 0);
    }

    #[test]
    fn single_file_requires_known_extension() {
        let pl = single_file(Path::new("/sd/track.mp3")).unwrap();
        assert_eq!(pl.urls(), ["/sd/track.mp3".to_string()]);
        assert!(single_file(Path::new("/sd/track")).is_err());
    }

    #[test]
    fn cursor_roots_the_walk() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("rock/a.mp3"));
        touch(&dir.path().join("jazz/b.mp3"));

        let mut cursor = PathStack::new();
        cursor.reset_to(dir.path());
        cursor.push("rock");
        let pl = build_from_cursor(&cursor).unwrap();
        assert_eq!(pl.count(), 1);
        assert!(pl.urls()[0].ends_with("a.mp3"));

        assert!(build_from_cursor(&PathStack::new()).is_err());
    }

    #[test]
    fn scans_into_disk_playlist() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("music/a.mp3"));
        touch(&dir.path().join("music/b/c.flac"));
        let mut pl = crate::playlist::DiskPlaylist::open(dir.path().join("list.m3u")).unwrap();
        let summary = scan_into(&dir.path().join("music"), &mut pl).unwrap();
        assert_eq!(summary.tracks, 2);
        assert_eq!(pl.count(), 2);
    }
}
