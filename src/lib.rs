//! Chunked file relay.
//!
//! Files are split into fixed-size chunks, each sent as one self-describing
//! message, and reassembled on the receiving side once every chunk has
//! arrived, in whatever order they came.

pub mod chunking;
pub mod client;
pub mod common;
pub mod protocol;
pub mod server;
pub mod transport;

pub use crate::chunking::{
    begin_send, ApplyResult, CompletedFile, ReassemblyTable, RejectReason, SenderJob,
    TransferProgress,
};
pub use crate::client::FileReceiver;
pub use crate::common::{Error, Result, TransferConfig, TransferKey, TransportConfig, WireFormat};
pub use crate::protocol::{decode, encode, Chunk};
pub use crate::server::{DataSender, SendReport};
pub use crate::transport::{ProgressSink, SendCapability};
