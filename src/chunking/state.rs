// Receiver-side reassembly state for one file in flight
use std::collections::HashMap;
use bytes::Bytes;
use crate::common::error::{Error, Result};
use crate::common::types::{ChunkIndex, TransferKey};
use crate::protocol::chunk::Chunk;

/// Outcome of storing one chunk into its slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotUpdate {
    /// The slot was empty; `received_count` went up by one
    Filled,
    /// The slot already held a payload and was overwritten in place
    Overwritten,
}

/// Slot map for one transfer.
///
/// Slots are keyed by chunk index, so arrival order never matters. Only
/// received chunks occupy memory, whatever `total_chunks` the peer declares.
/// `received_count` always equals the number of filled slots, and once
/// the state is marked terminal it refuses all further chunks.
pub struct TransferState {
    key: TransferKey,
    name: String,
    mime_type: String,
    total_chunks: u32,
    slots: HashMap<ChunkIndex, Bytes>,
    received_count: u32,
    bytes_received: u64,
    terminal: bool,
}

impl TransferState {
    /// Seed a new state from the first chunk seen for its key
    pub fn from_first_chunk(chunk: &Chunk) -> Self {
        Self {
            key: chunk.key(),
            name: chunk.name().to_string(),
            mime_type: chunk.mime_type().to_string(),
            total_chunks: chunk.total_chunks(),
            slots: HashMap::new(),
            received_count: 0,
            bytes_received: 0,
            terminal: false,
        }
    }

    /// Store a chunk's payload at its index
    ///
    /// A chunk whose `total_chunks` disagrees with the established value is
    /// rejected without touching any slot.
    pub fn apply(&mut self, chunk: &Chunk) -> Result<SlotUpdate> {
        if self.terminal {
            return Err(Error::UnknownFileId(self.key.to_string()));
        }
        if chunk.total_chunks() != self.total_chunks {
            return Err(Error::TotalChunksMismatch {
                file_id: self.key.to_string(),
                expected: self.total_chunks,
                actual: chunk.total_chunks(),
            });
        }

        let payload = chunk.payload().clone();
        let new_len = payload.len() as u64;

        match self.slots.insert(chunk.chunk_index(), payload) {
            Some(previous) => {
                self.bytes_received = self.bytes_received - previous.len() as u64 + new_len;
                Ok(SlotUpdate::Overwritten)
            }
            None => {
                self.received_count += 1;
                self.bytes_received += new_len;
                Ok(SlotUpdate::Filled)
            }
        }
    }

    /// Concatenate all slots in index order
    ///
    /// Returns `None` while any slot is still empty.
    pub fn assemble(&self) -> Option<Vec<u8>> {
        if !self.is_complete() {
            return None;
        }

        let mut data = Vec::with_capacity(self.bytes_received as usize);
        for index in 0..self.total_chunks {
            data.extend_from_slice(self.slots.get(&index)?);
        }
        Some(data)
    }

    /// Mark the transfer finished and release the slot buffers
    pub fn mark_terminal(&mut self) {
        self.terminal = true;
        self.slots = HashMap::new();
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn is_complete(&self) -> bool {
        self.received_count == self.total_chunks
    }

    /// Fraction of chunks received, clamped to `[0, 1]`
    pub fn progress(&self) -> f64 {
        (self.received_count as f64 / self.total_chunks as f64).clamp(0.0, 1.0)
    }

    /// Indices that have not arrived yet
    pub fn missing_chunks(&self) -> Vec<ChunkIndex> {
        if self.terminal {
            return Vec::new();
        }
        (0..self.total_chunks)
            .filter(|index| !self.slots.contains_key(index))
            .collect()
    }

    pub fn key(&self) -> &TransferKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    pub fn received_count(&self) -> u32 {
        self.received_count
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }
}

impl std::fmt::Debug for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferState")
            .field("key", &self.key)
            .field("name", &self.name)
            .field("total_chunks", &self.total_chunks)
            .field("received_count", &self.received_count)
            .field("bytes_received", &self.bytes_received)
            .field("terminal", &self.terminal)
            .field("progress", &format!("{:.2}%", self.progress() * 100.0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: u32, total: u32, data: &[u8]) -> Chunk {
        Chunk::new("f1", "notes.txt", "text/plain", index, total, data.to_vec()).unwrap()
    }

    #[test]
    fn test_fill_and_assemble_out_of_order() {
        let mut state = TransferState::from_first_chunk(&chunk(2, 3, b"!"));

        assert_eq!(state.apply(&chunk(2, 3, b"!")).unwrap(), SlotUpdate::Filled);
        assert_eq!(state.apply(&chunk(0, 3, b"hello")).unwrap(), SlotUpdate::Filled);
        assert!(state.assemble().is_none());
        assert_eq!(state.missing_chunks(), vec![1]);

        state.apply(&chunk(1, 3, b" world")).unwrap();
        assert!(state.is_complete());
        assert_eq!(state.assemble().unwrap(), b"hello world!");
        assert_eq!(state.bytes_received(), 12);
    }

    #[test]
    fn test_duplicate_does_not_double_count() {
        let mut state = TransferState::from_first_chunk(&chunk(0, 2, b"aa"));
        state.apply(&chunk(0, 2, b"aa")).unwrap();

        assert_eq!(state.apply(&chunk(0, 2, b"aa")).unwrap(), SlotUpdate::Overwritten);
        assert_eq!(state.received_count(), 1);
        assert_eq!(state.bytes_received(), 2);
        assert_eq!(state.progress(), 0.5);
    }

    #[test]
    fn test_total_mismatch_leaves_state_untouched() {
        let mut state = TransferState::from_first_chunk(&chunk(0, 2, b"aa"));
        state.apply(&chunk(0, 2, b"aa")).unwrap();

        let err = state.apply(&chunk(1, 5, b"bb")).unwrap_err();
        assert!(matches!(err, Error::TotalChunksMismatch { expected: 2, actual: 5, .. }));
        assert_eq!(state.received_count(), 1);
        assert_eq!(state.missing_chunks(), vec![1]);
    }

    #[test]
    fn test_large_declared_total_allocates_lazily() {
        let total = crate::common::types::MAX_TOTAL_CHUNKS;
        let mut state = TransferState::from_first_chunk(&chunk(total - 1, total, b"z"));

        state.apply(&chunk(total - 1, total, b"z")).unwrap();
        state.apply(&chunk(0, total, b"a")).unwrap();
        assert_eq!(state.received_count(), 2);
        assert_eq!(state.bytes_received(), 2);
        assert!(state.assemble().is_none());
    }

    #[test]
    fn test_terminal_refuses_chunks() {
        let mut state = TransferState::from_first_chunk(&chunk(0, 1, b"x"));
        state.apply(&chunk(0, 1, b"x")).unwrap();
        state.mark_terminal();

        assert!(state.is_terminal());
        assert!(state.apply(&chunk(0, 1, b"x")).is_err());
        assert_eq!(state.received_count(), 1);
    }
}
