// Reassembly table: process-wide map from transfer key to in-flight state
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use lru::LruCache;
use serde::Serialize;
use crate::chunking::state::{SlotUpdate, TransferState};
use crate::common::config::TransferConfig;
use crate::common::error::Error;
use crate::common::types::{ChunkIndex, TransferKey};
use crate::protocol::chunk::{self, Chunk};

/// A fully reassembled file, handed to the collaborator exactly once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFile {
    pub file_id: String,
    pub session: Option<String>,
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl CompletedFile {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn key(&self) -> TransferKey {
        TransferKey::new(self.session.clone(), self.file_id.clone())
    }
}

/// Why a single inbound message was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The message could not be decoded into a valid chunk
    MalformedChunk(String),
    /// The chunk's declared total disagrees with the established one
    TotalChunksMismatch {
        key: TransferKey,
        expected: u32,
        actual: u32,
    },
}

impl From<RejectReason> for Error {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::MalformedChunk(msg) => Error::MalformedChunk(msg),
            RejectReason::TotalChunksMismatch { key, expected, actual } => {
                Error::TotalChunksMismatch {
                    file_id: key.to_string(),
                    expected,
                    actual,
                }
            }
        }
    }
}

/// Result of applying one inbound chunk
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyResult {
    /// Stored; the transfer is still missing chunks
    Progressed { key: TransferKey, fraction: f64 },
    /// Stored; this chunk completed the transfer
    Completed(CompletedFile),
    /// Refused; no state was changed
    Rejected(RejectReason),
    /// Chunk for a transfer that already completed; accepted as a no-op
    Ignored(TransferKey),
}

/// Point-in-time view of one in-flight transfer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferProgress {
    pub file_id: String,
    pub session: Option<String>,
    pub name: String,
    pub received_chunks: u32,
    pub total_chunks: u32,
    pub bytes_received: u64,
    pub fraction: f64,
    pub missing: Vec<ChunkIndex>,
}

type Entry = Arc<Mutex<TransferState>>;

struct TableInner {
    /// In-flight transfers, least recently touched evicted first
    live: LruCache<TransferKey, Entry>,
    /// Recently completed keys, so late duplicates stay no-ops
    finished: LruCache<TransferKey, ()>,
    evicted: u64,
}

/// Receiver-side reassembly table.
///
/// The key-to-entry map sits behind one coarse lock that is only held for
/// lookup and insertion. Each entry has its own lock, so chunks for
/// different transfers can be applied concurrently.
pub struct ReassemblyTable {
    inner: Mutex<TableInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // a panic mid-apply cannot leave a slot half-written, so poisoned state is usable
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ReassemblyTable {
    /// Create a table holding at most `max_in_flight` live transfers and
    /// remembering the last `terminal_memory` completed keys
    pub fn new(max_in_flight: NonZeroUsize, terminal_memory: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(TableInner {
                live: LruCache::new(max_in_flight),
                finished: LruCache::new(terminal_memory),
                evicted: 0,
            }),
        }
    }

    pub fn from_config(config: &TransferConfig) -> Self {
        let max_in_flight = NonZeroUsize::new(config.max_in_flight).unwrap_or(NonZeroUsize::MIN);
        let terminal_memory =
            NonZeroUsize::new(config.terminal_memory).unwrap_or(NonZeroUsize::MIN);
        Self::new(max_in_flight, terminal_memory)
    }

    /// Decode a raw inbound message and apply it
    pub fn apply_message(&self, raw: &[u8]) -> ApplyResult {
        match chunk::decode(raw) {
            Ok(chunk) => self.apply_chunk(&chunk),
            Err(e) => {
                log::warn!("Dropping malformed chunk message ({} bytes): {}", raw.len(), e);
                ApplyResult::Rejected(RejectReason::MalformedChunk(e.to_string()))
            }
        }
    }

    /// Apply one chunk to the state for its transfer
    pub fn apply_chunk(&self, chunk: &Chunk) -> ApplyResult {
        let key = chunk.key();

        let entry = match self.lookup_or_insert(&key, chunk) {
            Some(entry) => entry,
            None => {
                log::debug!(
                    "Late chunk {} for completed transfer {}, ignoring",
                    chunk.chunk_index(),
                    key
                );
                return ApplyResult::Ignored(key);
            }
        };

        let mut state = lock(&entry);
        if state.is_terminal() {
            // completed by another caller between lookup and lock
            return ApplyResult::Ignored(key);
        }

        match state.apply(chunk) {
            Ok(SlotUpdate::Overwritten) => {
                log::debug!("Duplicate chunk {} for {}, overwritten", chunk.chunk_index(), key);
            }
            Ok(SlotUpdate::Filled) => {
                log::debug!(
                    "Stored chunk {}/{} for {} ({} bytes)",
                    chunk.chunk_index() + 1,
                    state.total_chunks(),
                    key,
                    chunk.payload().len()
                );
            }
            Err(Error::TotalChunksMismatch { expected, actual, .. }) => {
                log::warn!(
                    "Rejecting chunk {} for {}: totalChunks {} != established {} (possible file id collision)",
                    chunk.chunk_index(),
                    key,
                    actual,
                    expected
                );
                return ApplyResult::Rejected(RejectReason::TotalChunksMismatch {
                    key,
                    expected,
                    actual,
                });
            }
            Err(e) => {
                log::debug!("Chunk for {} not applied: {}", key, e);
                return ApplyResult::Ignored(key);
            }
        }

        if !state.is_complete() {
            return ApplyResult::Progressed {
                key,
                fraction: state.progress(),
            };
        }

        let data = match state.assemble() {
            Some(data) => data,
            None => {
                return ApplyResult::Progressed {
                    key,
                    fraction: state.progress(),
                }
            }
        };
        let completed = CompletedFile {
            file_id: key.file_id.clone(),
            session: key.session.clone(),
            name: state.name().to_string(),
            mime_type: state.mime_type().to_string(),
            data,
        };
        state.mark_terminal();
        drop(state);

        self.retire(&key, &entry);
        log::info!(
            "Reassembled {} '{}' ({} bytes)",
            key,
            completed.name,
            completed.len()
        );
        ApplyResult::Completed(completed)
    }

    /// Find the entry for `key`, creating it from `chunk` if absent.
    /// Returns `None` when the key belongs to a completed transfer.
    fn lookup_or_insert(&self, key: &TransferKey, chunk: &Chunk) -> Option<Entry> {
        let mut inner = lock(&self.inner);

        if inner.finished.contains(key) {
            return None;
        }
        if let Some(entry) = inner.live.get(key) {
            return Some(Arc::clone(entry));
        }

        let entry = Arc::new(Mutex::new(TransferState::from_first_chunk(chunk)));
        if let Some((evicted_key, evicted)) = inner.live.push(key.clone(), Arc::clone(&entry)) {
            inner.evicted += 1;
            let evicted = lock(&evicted);
            log::warn!(
                "Evicting stalled transfer {} ({}/{} chunks) to admit {}",
                evicted_key,
                evicted.received_count(),
                evicted.total_chunks(),
                key
            );
        }
        Some(entry)
    }

    /// Drop the completed `entry` from the live map and remember its key.
    ///
    /// If `entry` was evicted and a newer transfer now holds `key`, the newer
    /// one is left running.
    fn retire(&self, key: &TransferKey, entry: &Entry) {
        let mut inner = lock(&self.inner);
        let current = inner.live.peek(key).map(|live| Arc::ptr_eq(live, entry));
        match current {
            Some(true) => {
                inner.live.pop(key);
                inner.finished.put(key.clone(), ());
            }
            Some(false) => {
                log::debug!("Evicted entry for {} completed; newer transfer kept", key);
            }
            None => {
                inner.finished.put(key.clone(), ());
            }
        }
    }

    /// Drop an in-flight transfer. Returns whether it existed.
    pub fn evict(&self, key: &TransferKey) -> bool {
        let mut inner = lock(&self.inner);
        match inner.live.pop(key) {
            Some(_) => {
                inner.evicted += 1;
                log::info!("Evicted transfer {}", key);
                true
            }
            None => false,
        }
    }

    /// Progress of one in-flight transfer
    pub fn progress(&self, key: &TransferKey) -> Option<TransferProgress> {
        let entry = {
            let inner = lock(&self.inner);
            inner.live.peek(key).map(Arc::clone)
        }?;
        let state = lock(&entry);
        Some(Self::describe(&state))
    }

    /// Progress of all in-flight transfers, most recently touched first
    pub fn snapshot(&self) -> Vec<TransferProgress> {
        let entries: Vec<Entry> = {
            let inner = lock(&self.inner);
            inner.live.iter().map(|(_, entry)| Arc::clone(entry)).collect()
        };
        entries
            .iter()
            .map(|entry| Self::describe(&lock(entry)))
            .collect()
    }

    fn describe(state: &TransferState) -> TransferProgress {
        TransferProgress {
            file_id: state.key().file_id.clone(),
            session: state.key().session.clone(),
            name: state.name().to_string(),
            received_chunks: state.received_count(),
            total_chunks: state.total_chunks(),
            bytes_received: state.bytes_received(),
            fraction: state.progress(),
            missing: state.missing_chunks(),
        }
    }

    /// Number of in-flight transfers
    pub fn in_flight(&self) -> usize {
        lock(&self.inner).live.len()
    }

    /// Whether `key` completed recently enough to still be remembered
    pub fn is_finished(&self, key: &TransferKey) -> bool {
        lock(&self.inner).finished.contains(key)
    }

    /// Transfers dropped before completion, by eviction or cancellation
    pub fn evicted_count(&self) -> u64 {
        lock(&self.inner).evicted
    }
}

impl Default for ReassemblyTable {
    fn default() -> Self {
        Self::from_config(&TransferConfig::default())
    }
}

impl std::fmt::Debug for ReassemblyTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("ReassemblyTable")
            .field("in_flight", &inner.live.len())
            .field("capacity", &inner.live.cap())
            .field("finished", &inner.finished.len())
            .field("evicted", &inner.evicted)
            .finish()
    }
}
