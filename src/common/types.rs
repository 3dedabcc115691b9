// Common type definitions and constants

use serde::{Serialize, Deserialize};

pub type FileId = String;
pub type ChunkIndex = u32;

/// Key identifying one in-flight transfer on the receiver.
///
/// The optional session (room) keeps two senders that pick the same
/// file id from writing into one reassembly slot array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferKey {
    pub session: Option<String>,
    pub file_id: FileId,
}

impl TransferKey {
    pub fn new(session: Option<String>, file_id: impl Into<FileId>) -> Self {
        Self {
            session,
            file_id: file_id.into(),
        }
    }
}

impl std::fmt::Display for TransferKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.session {
            Some(session) => write!(f, "{}/{}", session, self.file_id),
            None => write!(f, "{}", self.file_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireFormat {
    /// Reference JSON message, payload as an array of byte values
    Json,
    /// Length-prefixed JSON header followed by the raw payload
    Binary,
}

impl std::str::FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(WireFormat::Json),
            "binary" | "bin" => Ok(WireFormat::Binary),
            other => Err(format!("unknown wire format '{}'", other)),
        }
    }
}

// Constants
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024; // 64KB
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024; // 16MB
pub const MIN_CHUNK_SIZE: usize = 1;
pub const MAX_TOTAL_CHUNKS: u32 = 1 << 24;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;
pub const DEFAULT_TERMINAL_MEMORY: usize = 256;
pub const DEFAULT_PORT: u16 = 4455;
pub const MAX_FRAME_SIZE: usize = MAX_CHUNK_SIZE * 5; // JSON byte arrays inflate up to ~4x
pub const MESSAGE_TYPE_FILECHUNK: &str = "filechunk";
