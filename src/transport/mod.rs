// Transport seams between the chunk core and the connection owner
//
// The core never touches sockets. A transport adapter hands inbound
// messages to the receiver and exposes a `SendCapability` to the sender.

pub mod framing;
pub mod memory;
pub mod tcp;

use crate::chunking::table::CompletedFile;
use crate::common::error::{Error, Result};

pub use framing::FrameDecoder;
pub use memory::{channel_pair, ChannelReceiver, ChannelSender};
pub use tcp::{TcpMessageListener, TcpMessageReader, TcpSender};

/// Capability to hand one encoded message to the connection.
///
/// An error means the channel is unavailable; callers abort the transfer.
pub trait SendCapability {
    fn send(&mut self, message: Vec<u8>) -> Result<()>;
}

impl<S: SendCapability + ?Sized> SendCapability for &mut S {
    fn send(&mut self, message: Vec<u8>) -> Result<()> {
        (**self).send(message)
    }
}

impl<S: SendCapability + ?Sized> SendCapability for Box<S> {
    fn send(&mut self, message: Vec<u8>) -> Result<()> {
        (**self).send(message)
    }
}

/// Callbacks through which the core reports transfer progress
pub trait ProgressSink {
    /// Fraction of a transfer done, in `[0, 1]`
    fn on_progress(&mut self, file_id: &str, fraction: f64);

    /// A file finished reassembling
    fn on_completed(&mut self, file: &CompletedFile);

    /// A transfer was abandoned
    fn on_failed(&mut self, _file_id: &str, _error: &Error) {}
}

/// Sink that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_progress(&mut self, _file_id: &str, _fraction: f64) {}

    fn on_completed(&mut self, _file: &CompletedFile) {}
}

/// Sink that forwards every event to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn on_progress(&mut self, file_id: &str, fraction: f64) {
        log::debug!("{}: {:.1}%", file_id, fraction * 100.0);
    }

    fn on_completed(&mut self, file: &CompletedFile) {
        log::info!("{}: completed '{}' ({} bytes)", file.file_id, file.name, file.len());
    }

    fn on_failed(&mut self, file_id: &str, error: &Error) {
        log::error!("{}: failed: {}", file_id, error);
    }
}
