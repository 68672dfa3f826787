//! Playlist capability set.
//!
//! The engine only sees [`Playlist`] trait objects, so a list built by a directory
//! scan and a list persisted on disk are interchangeable at runtime.

mod disk;
mod memory;

pub use disk::DiskPlaylist;
pub use memory::MemoryPlaylist;

use anyhow::Result;

/// Ordered, wrap-around sequence of media URLs with a current position.
///
/// Returned `&str` values borrow the playlist and are invalidated by the next
/// mutable call; copy them if they must outlive it.
pub trait Playlist: Send {
    /// Make entry `index` current and return it.
    ///
    /// `index` must be below [`count`](Playlist::count); out-of-range indexes return
    /// `None` and leave the position unchanged.
    fn choose(&mut self, index: usize) -> Option<&str>;

    /// Move the current position by `step` (negative moves backwards), wrapping
    /// around the ends, and return the new current entry.
    fn next(&mut self, step: isize) -> Option<&str>;

    fn current(&mut self) -> Option<&str>;

    fn count(&self) -> usize;

    /// Append a URL to the end of the list.
    fn append(&mut self, url: &str) -> Result<()>;

    /// Release backing storage. The handle is consumed.
    fn destroy(self: Box<Self>) {}
}

/// Position reached from `pos` after moving `step` entries in a list of `count`.
pub(crate) fn wrap_position(pos: usize, step: isize, count: usize) -> usize {
    debug_assert!(count > 0);
    let count = count as i128;
    (pos as i128 + step as i128).rem_euclid(count) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_position_handles_both_directions() {
        assert_eq!(wrap_position(0, 1, 3), 1);
        assert_eq!(wrap_position(2, 1, 3), 0);
        assert_eq!(wrap_position(0, -1, 3), 2);
        assert_eq!(wrap_position(1, 7, 3), 2);
        assert_eq!(wrap_position(1, -7, 3), 0);
    }

    #[test]
    fn variants_share_the_contract() {
        let dir = tempfile::tempdir().unwrap();
        let mut lists: Vec<Box<dyn Playlist>> = vec![
            Box::new(MemoryPlaylist::new()),
            Box::new(DiskPlaylist::open(dir.path().join("list.m3u")).unwrap()),
        ];
        for list in lists.iter_mut() {
            list.append("a.mp3").unwrap();
            list.append("b.flac").unwrap();
            list.append("c.ogg").unwrap();
            assert_eq!(list.count(), 3);
            assert_eq!(list.current(), Some("a.mp3"));
            assert_eq!(list.next(1), Some("b.flac"));
            assert_eq!(list.next(2), Some("a.mp3"));
            assert_eq!(list.next(-1), Some("c.ogg"));
            assert_eq!(list.choose(1), Some("b.flac"));
            assert_eq!(list.choose(3), None);
            assert_eq!(list.current(), Some("b.flac"));
        }
        for list in lists {
            list.destroy();
        }
    }
}
