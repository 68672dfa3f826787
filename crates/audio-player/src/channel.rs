//! Bounded control channel from input threads to the engine.

use std::fmt;
use std::time::Duration;

use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TrySendError};
use thiserror::Error;

use crate::playlist::Playlist;

/// Commands accepted by the engine thread.
pub enum ControlMessage {
    /// Replace the active playlist; the previous one is destroyed.
    NewPlaylist(Box<dyn Playlist>),
    PlayPause,
    Next,
    Previous,
    SetShuffle(bool),
    ToggleShuffle,
    Stop,
    Shutdown,
}

impl fmt::Debug for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMessage::NewPlaylist(pl) => {
                f.debug_tuple("NewPlaylist").field(&pl.count()).finish()
            }
            ControlMessage::PlayPause => f.write_str("PlayPause"),
            ControlMessage::Next => f.write_str("Next"),
            ControlMessage::Previous => f.write_str("Previous"),
            ControlMessage::SetShuffle(on) => f.debug_tuple("SetShuffle").field(on).finish(),
            ControlMessage::ToggleShuffle => f.write_str("ToggleShuffle"),
            ControlMessage::Stop => f.write_str("Stop"),
            ControlMessage::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// A message the engine did not accept. The message is handed back to the caller.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("control channel is full")]
    Full(ControlMessage),
    #[error("engine is not running")]
    Disconnected(ControlMessage),
}

impl ControlError {
    pub fn into_message(self) -> ControlMessage {
        match self {
            ControlError::Full(m) | ControlError::Disconnected(m) => m,
        }
    }
}

/// Cloneable sending side of the control channel.
#[derive(Clone, Debug)]
pub struct ControlSender {
    tx: Sender<ControlMessage>,
}

impl ControlSender {
    /// Enqueue without waiting.
    pub fn try_send(&self, msg: ControlMessage) -> Result<(), ControlError> {
        self.tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(m) => ControlError::Full(m),
            TrySendError::Disconnected(m) => ControlError::Disconnected(m),
        })
    }

    /// Enqueue, waiting up to `timeout` for room.
    pub fn send_timeout(&self, msg: ControlMessage, timeout: Duration) -> Result<(), ControlError> {
        self.tx.send_timeout(msg, timeout).map_err(|e| match e {
            SendTimeoutError::Timeout(m) => ControlError::Full(m),
            SendTimeoutError::Disconnected(m) => ControlError::Disconnected(m),
        })
    }

    /// Enqueue, waiting as long as it takes. Only fails once the engine is gone.
    pub fn send(&self, msg: ControlMessage) -> Result<(), ControlError> {
        self.tx
            .send(msg)
            .map_err(|e| ControlError::Disconnected(e.into_inner()))
    }
}

/// Create a control channel holding at most `capacity` pending messages (minimum 1).
pub fn control_channel(capacity: usize) -> (ControlSender, Receiver<ControlMessage>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (ControlSender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::MemoryPlaylist;

    #[test]
    fn full_channel_returns_the_message() {
        let (tx, rx) = control_channel(1);
        tx.try_send(ControlMessage::Next).unwrap();

        let pl = MemoryPlaylist::from_urls(["a.mp3", "b.mp3"]);
        let err = tx
            .try_send(ControlMessage::NewPlaylist(Box::new(pl)))
            .unwrap_err();
        assert!(matches!(err, ControlError::Full(_)));
        match err.into_message() {
            ControlMessage::NewPlaylist(pl) => assert_eq!(pl.count(), 2),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(rx.try_recv(), Ok(ControlMessage::Next)));
    }

    #[test]
    fn send_timeout_gives_up_when_saturated() {
        let (tx, _rx) = control_channel(1);
        tx.try_send(ControlMessage::PlayPause).unwrap();
        let err = tx
            .send_timeout(ControlMessage::Next, Duration::from_millis(10))
            .unwrap_err();
        assert!(matches!(err, ControlError::Full(ControlMessage::Next)));
    }

    #[test]
    fn dropped_engine_is_reported() {
        let (tx, rx) = control_channel(4);
        drop(rx);
        let err = tx.try_send(ControlMessage::Stop).unwrap_err();
        assert!(matches!(err, ControlError::Disconnected(ControlMessage::Stop)));
        assert!(tx.send(ControlMessage::Stop).is_err());
    }

    #[test]
    fn zero_capacity_still_buffers_one() {
        let (tx, rx) = control_channel(0);
        tx.try_send(ControlMessage::SetShuffle(true)).unwrap();
        assert!(matches!(rx.try_recv(), Ok(ControlMessage::SetShuffle(true))));
    }
}
