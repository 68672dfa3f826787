//! Bounded queue of interleaved `f32` samples linking the decoder to the sink.
//!
//! The decoder worker pushes (blocking when full), the resampler re-queues at the
//! device rate, and the cpal callback drains without blocking. `close()` is the single
//! shutdown signal: it wakes blocked producers and lets consumers drain what is left.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Thread-safe bounded sample queue.
///
/// Samples are interleaved (`frame0[ch0], frame0[ch1], frame1[ch0], ...`). The channel
/// count is fixed when the decoder creates the queue after probing the stream.
pub struct SharedAudio {
    channels: usize,
    inner: Mutex<Inner>,
    cv: Condvar,
    max_samples: usize,
    low_watermark_ms: AtomicU64,
}

struct Inner {
    queue: VecDeque<f32>,
    done: bool,
}

/// How a consumer takes frames out of the queue.
pub enum PopStrategy {
    /// Block until exactly `frames` are available; `None` if closed first.
    BlockingExact { frames: usize },
    /// Block until at least one frame is available, then take up to `max_frames`.
    BlockingUpTo { max_frames: usize },
    /// Take up to `max_frames` immediately; `None` if empty.
    NonBlocking { max_frames: usize },
}

/// Queue capacity in samples holding `buffer_seconds` of audio.
///
/// Non-finite or non-positive durations fall back to two seconds.
pub fn calc_max_buffered_samples(rate_hz: u32, channels: usize, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        2.0
    };
    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels)
}

impl SharedAudio {
    pub fn new(channels: usize, max_samples: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                done: false,
            }),
            cv: Condvar::new(),
            max_samples: max_samples.max(channels),
            low_watermark_ms: AtomicU64::new(0),
        }
    }

    /// Queue sized for `buffer_seconds` of a `rate_hz`/`channels` stream.
    pub fn for_stream(rate_hz: u32, channels: usize, buffer_seconds: f32) -> Self {
        Self::new(
            channels,
            calc_max_buffered_samples(rate_hz, channels.max(1), buffer_seconds),
        )
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn capacity_frames(&self) -> usize {
        self.max_samples / self.channels
    }

    /// Frames currently buffered (stale as soon as it returns).
    pub fn len_frames(&self) -> usize {
        self.inner.lock().unwrap().queue.len() / self.channels
    }

    pub fn is_done(&self) -> bool {
        self.inner.lock().unwrap().done
    }

    /// Mark the producer side finished and wake every waiter. Idempotent.
    pub fn close(&self) {
        self.inner.lock().unwrap().done = true;
        self.cv.notify_all();
    }

    /// Push samples, blocking while the queue is full.
    ///
    /// Returns `false` if the queue was closed before every sample was accepted; the
    /// rest are dropped.
    pub fn push_blocking(&self, samples: &[f32]) -> bool {
        let mut offset = 0;
        while offset < samples.len() {
            let mut g = self.inner.lock().unwrap();
            while g.queue.len() >= self.max_samples && !g.done {
                g = self.cv.wait(g).unwrap();
            }
            if g.done {
                return false;
            }

            let room = self.max_samples - g.queue.len();
            let take = room.min(samples.len() - offset);
            g.queue.extend(&samples[offset..offset + take]);
            offset += take;

            drop(g);
            self.cv.notify_all();
        }
        true
    }

    /// Pop frames according to `strategy`.
    ///
    /// Returns `None` when nothing can satisfy the request (empty, or closed before
    /// enough data arrived for `BlockingExact`).
    pub fn pop(&self, strategy: PopStrategy) -> Option<Vec<f32>> {
        let mut g = self.inner.lock().unwrap();
        let take_samples = match strategy {
            PopStrategy::BlockingExact { frames } => {
                let want = frames * self.channels;
                while g.queue.len() < want && !g.done {
                    g = self.cv.wait(g).unwrap();
                }
                if g.queue.len() < want {
                    return None;
                }
                want
            }
            PopStrategy::BlockingUpTo { max_frames } => {
                while g.queue.is_empty() && !g.done {
                    g = self.cv.wait(g).unwrap();
                }
                (g.queue.len() / self.channels).min(max_frames) * self.channels
            }
            PopStrategy::NonBlocking { max_frames } => {
                (g.queue.len() / self.channels).min(max_frames) * self.channels
            }
        };
        if take_samples == 0 {
            return None;
        }

        let out: Vec<f32> = g.queue.drain(..take_samples).collect();
        let remaining = g.queue.len();
        drop(g);
        self.cv.notify_all();
        self.note_low_watermark(remaining);
        Some(out)
    }

    /// Block until the queue is closed and drained, or `cancel` is raised.
    ///
    /// Returns `true` on a normal drain, `false` when cancelled.
    pub fn wait_drained_or_cancel(&self, cancel: &AtomicBool) -> bool {
        let mut g = self.inner.lock().unwrap();
        loop {
            if cancel.load(Ordering::Relaxed) {
                return false;
            }
            if g.done && g.queue.is_empty() {
                return true;
            }
            let (next, _timeout) = self.cv.wait_timeout(g, Duration::from_millis(50)).unwrap();
            g = next;
        }
    }

    fn note_low_watermark(&self, queued: usize) {
        let threshold = (self.max_samples / 8).max(self.channels * 16);
        if queued == 0 || queued >= threshold {
            return;
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let last = self.low_watermark_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) > 1000 {
            self.low_watermark_ms.store(now, Ordering::Relaxed);
            tracing::debug!(
                queued_samples = queued,
                threshold_samples = threshold,
                "sample queue low watermark"
            );
        }
    }
}
