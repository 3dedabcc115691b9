// Configuration types and parsing

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use crate::common::error::{Error, Result};
use crate::common::types::{
    WireFormat, DEFAULT_CHUNK_SIZE, DEFAULT_PORT, DEFAULT_MAX_IN_FLIGHT,
    DEFAULT_TERMINAL_MEMORY, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE,
};

#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub chunk_size: usize,
    pub wire_format: WireFormat,
    pub max_in_flight: usize,
    pub terminal_memory: usize,
    pub output_dir: PathBuf,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            wire_format: WireFormat::Binary,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            terminal_memory: DEFAULT_TERMINAL_MEMORY,
            output_dir: PathBuf::from("./received"),
        }
    }
}

impl TransferConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(mut self, size: usize) -> Result<Self> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&size) {
            return Err(Error::ConfigError(format!(
                "Chunk size must be between {} and {}",
                MIN_CHUNK_SIZE,
                MAX_CHUNK_SIZE
            )));
        }
        self.chunk_size = size;
        Ok(self)
    }

    pub fn with_wire_format(mut self, format: WireFormat) -> Self {
        self.wire_format = format;
        self
    }

    /// Cap on concurrently reassembling transfers before the least
    /// recently touched one is evicted.
    pub fn with_max_in_flight(mut self, max: usize) -> Result<Self> {
        if max == 0 {
            return Err(Error::ConfigError("max_in_flight must be at least 1".to_string()));
        }
        self.max_in_flight = max;
        Ok(self)
    }

    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }
}

/// Connection parameters handed to a transport adapter at construction.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub endpoint: SocketAddr,
    pub room: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            room: None,
        }
    }
}

impl TransportConfig {
    pub fn new(endpoint: SocketAddr) -> Self {
        Self {
            endpoint,
            ..Default::default()
        }
    }

    pub fn with_room(mut self, room: impl Into<String>) -> Result<Self> {
        let room = room.into();
        if room.is_empty() {
            return Err(Error::ConfigError("room must not be empty".to_string()));
        }
        self.room = Some(room);
        Ok(self)
    }
}
