// Error types and error handling

use std::io;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    MalformedChunk(String),
    TotalChunksMismatch { file_id: String, expected: u32, actual: u32 },
    UnknownFileId(String),
    SendFailure(String),
    ConnectionClosed,
    InvalidChunkSize,
    SerializationError(String),
    DeserializationError(String),
    ConfigError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::MalformedChunk(e) => write!(f, "Malformed chunk: {}", e),
            Error::TotalChunksMismatch { file_id, expected, actual } => write!(
                f,
                "Total chunks mismatch for {}: expected {}, got {}",
                file_id, expected, actual
            ),
            Error::UnknownFileId(id) => write!(f, "Unknown file id {}", id),
            Error::SendFailure(e) => write!(f, "Send failure: {}", e),
            Error::ConnectionClosed => write!(f, "Connection closed"),
            Error::InvalidChunkSize => write!(f, "Invalid chunk size"),
            Error::SerializationError(e) => write!(f, "Serialization error: {}", e),
            Error::DeserializationError(e) => write!(f, "Deserialization error: {}", e),
            Error::ConfigError(e) => write!(f, "Configuration error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::DeserializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
