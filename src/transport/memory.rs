// In-process transport over crossbeam channels

use std::time::Duration;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use crate::common::error::{Error, Result};
use crate::transport::SendCapability;

/// Sending half of an in-process message channel
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: Sender<Vec<u8>>,
    messages_sent: u64,
}

/// Receiving half of an in-process message channel
#[derive(Debug, Clone)]
pub struct ChannelReceiver {
    rx: Receiver<Vec<u8>>,
}

/// Create a connected pair. `capacity` of `None` means unbounded.
pub fn channel_pair(capacity: Option<usize>) -> (ChannelSender, ChannelReceiver) {
    let (tx, rx) = match capacity {
        Some(cap) => crossbeam_channel::bounded(cap),
        None => crossbeam_channel::unbounded(),
    };
    (ChannelSender { tx, messages_sent: 0 }, ChannelReceiver { rx })
}

impl ChannelSender {
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent
    }
}

impl SendCapability for ChannelSender {
    fn send(&mut self, message: Vec<u8>) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| Error::SendFailure("in-process channel closed".to_string()))?;
        self.messages_sent += 1;
        Ok(())
    }
}

impl ChannelReceiver {
    /// Block until a message arrives; `None` once every sender is gone
    pub fn recv(&self) -> Option<Vec<u8>> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        match self.rx.recv_timeout(timeout) {
            Ok(message) => Ok(Some(message)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::ConnectionClosed),
        }
    }

    pub fn try_recv(&self) -> Result<Option<Vec<u8>>> {
        match self.rx.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Error::ConnectionClosed),
        }
    }

    /// Iterate until the channel closes
    pub fn iter(&self) -> impl Iterator<Item = Vec<u8>> + '_ {
        self.rx.iter()
    }
}
