//! Arena-backed stack of path segments.
//!
//! Segments are stored back to back in a single `String` with an end offset per
//! segment, so pushing a directory name never allocates per segment and popping is
//! just dropping an offset. Used as the browse cursor for directory playlists.

use std::path::{Path, PathBuf};

/// Ordered stack of path segments (bottom = root).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathStack {
    buf: String,
    ends: Vec<usize>,
}

impl PathStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a stack whose bottom segment is `root`.
    pub fn with_root(root: impl AsRef<str>) -> Self {
        let mut s = Self::new();
        s.push(root);
        s
    }

    pub fn depth(&self) -> usize {
        self.ends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    pub fn push(&mut self, segment: impl AsRef<str>) {
        self.buf.push_str(segment.as_ref());
        self.ends.push(self.buf.len());
    }

    /// Remove the top segment. Popping an empty stack is a no-op.
    pub fn pop(&mut self) -> Option<String> {
        let end = self.ends.pop()?;
        let start = self.ends.last().copied().unwrap_or(0);
        let seg = self.buf[start..end].to_string();
        self.buf.truncate(start);
        Some(seg)
    }

    /// Segment on top of the stack.
    pub fn top(&self) -> Option<&str> {
        self.from_top(0)
    }

    /// Segment `depth` positions below the top (`0` is the top).
    pub fn from_top(&self, depth: usize) -> Option<&str> {
        let len = self.ends.len();
        if depth >= len {
            return None;
        }
        self.from_bottom(len - 1 - depth)
    }

    /// Segment at `position` counted from the bottom (`0` is the root).
    pub fn from_bottom(&self, position: usize) -> Option<&str> {
        let end = *self.ends.get(position)?;
        let start = if position == 0 { 0 } else { self.ends[position - 1] };
        Some(&self.buf[start..end])
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        (0..self.depth()).filter_map(move |i| self.from_bottom(i))
    }

    /// Join all segments, root first, into a filesystem path.
    pub fn to_path(&self) -> PathBuf {
        let mut path = PathBuf::new();
        for seg in self.iter() {
            path.push(seg);
        }
        path
    }

    /// Replace the contents with the components of `path`.
    pub fn reset_to(&mut self, path: &Path) {
        self.buf.clear();
        self.ends.clear();
        for component in path.components() {
            self.push(component.as_os_str().to_string_lossy());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_is_lifo() {
        let mut s = PathStack::new();
        s.push("/sdcard");
        s.push("albums");
        s.push("live");
        assert_eq!(s.depth(), 3);
        assert_eq!(s.top(), Some("live"));
        assert_eq!(s.pop().as_deref(), Some("live"));
        assert_eq!(s.top(), Some("albums"));
        assert_eq!(s.depth(), 2);
    }

    #[test]
    fn pop_on_empty_is_noop() {
        let mut s = PathStack::new();
        assert!(s.pop().is_none());
        assert!(s.top().is_none());
        assert!(s.is_empty());
    }

    #[test]
    fn peek_from_top_and_bottom() {
        let mut s = PathStack::with_root("root");
        s.push("a");
        s.push("b");
        assert_eq!(s.from_top(0), Some("b"));
        assert_eq!(s.from_top(2), Some("root"));
        assert_eq!(s.from_top(3), None);
        assert_eq!(s.from_bottom(0), Some("root"));
        assert_eq!(s.from_bottom(1), Some("a"));
        assert_eq!(s.from_bottom(3), None);
    }

    #[test]
    fn to_path_joins_segments() {
        let mut s = PathStack::with_root("/sdcard");
        s.push("rock");
        s.push("70s");
        assert_eq!(s.to_path(), PathBuf::from("/sdcard/rock/70s"));
    }

    #[test]
    fn deep_stacks_grow_without_limit() {
        let mut s = PathStack::new();
        for i in 0..500 {
            s.push(format!("d{i}"));
        }
        assert_eq!(s.depth(), 500);
        assert_eq!(s.top(), Some("d499"));
        for _ in 0..499 {
            s.pop();
        }
        assert_eq!(s.top(), Some("d0"));
    }

    #[test]
    fn reset_to_splits_components() {
        let mut s = PathStack::with_root("x");
        s.reset_to(Path::new("/music/jazz"));
        assert_eq!(s.depth(), 3);
        assert_eq!(s.top(), Some("jazz"));
        assert_eq!(s.to_path(), PathBuf::from("/music/jazz"));
    }
}
