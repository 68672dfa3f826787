use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::{Playlist, wrap_position};

/// Playlist persisted as an append-only, newline-delimited log of URLs.
///
/// Only an offset index lives in memory; each lookup reads one entry back from
/// the file into an internal buffer that the returned `&str` borrows.
#[derive(Debug)]
pub struct DiskPlaylist {
    path: PathBuf,
    file: File,
    entries: Vec<Entry>,
    end: u64,
    pos: usize,
    buf: String,
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    offset: u64,
    len: usize,
}

impl DiskPlaylist {
    /// Open (or create) the log at `path` and index the URLs already stored in it.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create playlist dir {:?}", parent))?;
        }
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .with_context(|| format!("open playlist {:?}", path))?;

        let (entries, end) = index_entries(&file).with_context(|| format!("index playlist {:?}", path))?;
        tracing::debug!(path = %path.display(), entries = entries.len(), "disk playlist opened");

        Ok(Self {
            path,
            file,
            entries,
            end,
            pos: 0,
            buf: String::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop every stored URL and truncate the log.
    pub fn clear(&mut self) -> Result<()> {
        self.file
            .set_len(0)
            .with_context(|| format!("truncate playlist {:?}", self.path))?;
        self.entries.clear();
        self.end = 0;
        self.pos = 0;
        self.buf.clear();
        Ok(())
    }

    fn load(&mut self, index: usize) -> Option<&str> {
        let entry = *self.entries.get(index)?;
        match read_entry(&mut self.file, entry, &mut self.buf) {
            Ok(()) => Some(self.buf.as_str()),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), index, "playlist read failed: {e:#}");
                None
            }
        }
    }
}

impl Playlist for DiskPlaylist {
    fn choose(&mut self, index: usize) -> Option<&str> {
        if index >= self.entries.len() {
            return None;
        }
        self.pos = index;
        self.load(index)
    }

    fn next(&mut self, step: isize) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        self.pos = wrap_position(self.pos, step, self.entries.len());
        self.load(self.pos)
    }

    fn current(&mut self) -> Option<&str> {
        self.load(self.pos)
    }

    fn count(&self) -> usize {
        self.entries.len()
    }

    fn append(&mut self, url: &str) -> Result<()> {
        if url.contains('\n') {
            return Err(anyhow!("playlist url contains a newline: {url:?}"));
        }
        let mut line = Vec::with_capacity(url.len() + 1);
        line.extend_from_slice(url.as_bytes());
        line.push(b'\n');
        self.file
            .write_all(&line)
            .with_context(|| format!("append to playlist {:?}", self.path))?;
        self.entries.push(Entry {
            offset: self.end,
            len: url.len(),
        });
        self.end += line.len() as u64;
        Ok(())
    }

    fn destroy(self: Box<Self>) {
        if let Err(e) = self.file.sync_all() {
            tracing::warn!(path = %self.path.display(), "playlist sync failed: {e}");
        }
    }
}

/// Scan the log once and record where each non-empty line starts.
fn index_entries(file: &File) -> Result<(Vec<Entry>, u64)> {
    let mut reader = BufReader::new(file);
    reader.seek(SeekFrom::Start(0))?;
    let mut entries = Vec::new();
    let mut offset = 0u64;
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line)?;
        if n == 0 {
            break;
        }
        let len = line.strip_suffix(b"\n").map_or(line.len(), <[u8]>::len);
        if len > 0 {
            entries.push(Entry { offset, len });
        }
        offset += n as u64;
    }
    Ok((entries, offset))
}

fn read_entry(file: &mut File, entry: Entry, buf: &mut String) -> Result<()> {
    let mut bytes = vec![0u8; entry.len];
    file.seek(SeekFrom::Start(entry.offset))?;
    file.read_exact(&mut bytes)?;
    buf.clear();
    buf.push_str(&String::from_utf8(bytes).context("playlist entry is not utf-8")?);
    Ok(())
}
