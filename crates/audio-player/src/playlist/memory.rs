use anyhow::Result;

use super::{Playlist, wrap_position};

/// Transient playlist held entirely in memory (directory scans, single files).
#[derive(Clone, Debug, Default)]
pub struct MemoryPlaylist {
    urls: Vec<String>,
    pos: usize,
}

impl MemoryPlaylist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            pos: 0,
        }
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }
}

impl Playlist for MemoryPlaylist {
    fn choose(&mut self, index: usize) -> Option<&str> {
        if index >= self.urls.len() {
            return None;
        }
        self.pos = index;
        Some(&self.urls[index])
    }

    fn next(&mut self, step: isize) -> Option<&str> {
        if self.urls.is_empty() {
            return None;
        }
        self.pos = wrap_position(self.pos, step, self.urls.len());
        Some(&self.urls[self.pos])
    }

    fn current(&mut self) -> Option<&str> {
        self.urls.get(self.pos).map(String::as_str)
    }

    fn count(&self) -> usize {
        self.urls.len()
    }

    fn append(&mut self, url: &str) -> Result<()> {
        self.urls.push(url.to_string());
        Ok(())
    }
}
