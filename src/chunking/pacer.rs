// Sender pacer: slices a source buffer into an ordered chunk sequence
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use bytes::Bytes;
use ring::rand::{SecureRandom, SystemRandom};
use crate::common::error::{Error, Result};
use crate::common::types::{ChunkIndex, FileId, MAX_CHUNK_SIZE, MAX_TOTAL_CHUNKS};
use crate::protocol::chunk::Chunk;

static FILE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Progress callback, invoked with `(file_id, next_index / total_chunks)`
pub type ProgressFn = Box<dyn FnMut(&str, f64) + Send>;

/// Sender-side cursor over one outgoing file.
///
/// Chunks come out strictly in index order. A job cannot be rewound;
/// a failed send restarts as a new job with a fresh file id.
pub struct SenderJob {
    file_id: FileId,
    session: Option<String>,
    name: String,
    mime_type: String,
    total_chunks: u32,
    chunk_size: usize,
    next_index: ChunkIndex,
    source: Bytes,
    on_progress: Option<ProgressFn>,
}

/// Number of chunks for a source of `len` bytes.
///
/// A zero-length source still produces one (empty) chunk.
pub fn total_chunks_for(len: usize, chunk_size: usize) -> Result<u32> {
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(Error::InvalidChunkSize);
    }
    let total = len.div_ceil(chunk_size).max(1);
    match u32::try_from(total) {
        Ok(total) if total <= MAX_TOTAL_CHUNKS => Ok(total),
        _ => Err(Error::ConfigError(format!(
            "{} bytes at chunk size {} needs {} chunks, more than {} allowed",
            len, chunk_size, total, MAX_TOTAL_CHUNKS
        ))),
    }
}

/// Generate a file id unique across concurrent sends from this process:
/// `<name>-<unix nanos>-<counter>-<random hex>`
pub fn generate_file_id(name: &str) -> Result<FileId> {
    let mut random = [0u8; 8];
    SystemRandom::new()
        .fill(&mut random)
        .map_err(|_| Error::ConfigError("system random source unavailable".to_string()))?;

    let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
    let counter = FILE_ID_COUNTER.fetch_add(1, Ordering::Relaxed);

    Ok(format!("{}-{}-{}-{}", name, nanos, counter, hex::encode(random)))
}

/// Start sending `source` as a new transfer
///
/// # Arguments
/// * `source` - The complete file contents
/// * `name` - Display name carried in every chunk
/// * `mime_type` - Advisory content type
/// * `chunk_size` - Maximum payload bytes per chunk
pub fn begin_send(
    source: impl Into<Bytes>,
    name: impl Into<String>,
    mime_type: impl Into<String>,
    chunk_size: usize,
) -> Result<SenderJob> {
    let source = source.into();
    let name = name.into();
    let total_chunks = total_chunks_for(source.len(), chunk_size)?;
    let file_id = generate_file_id(&name)?;

    log::debug!(
        "Prepared {} ({} bytes, {} chunks of {} bytes)",
        file_id,
        source.len(),
        total_chunks,
        chunk_size
    );

    Ok(SenderJob {
        file_id,
        session: None,
        name,
        mime_type: mime_type.into(),
        total_chunks,
        chunk_size,
        next_index: 0,
        source,
        on_progress: None,
    })
}

impl SenderJob {
    /// Read a file from disk and start a job for it
    pub fn from_path(path: &Path, mime_type: impl Into<String>, chunk_size: usize) -> Result<Self> {
        let data = std::fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unnamed")
            .to_string();
        begin_send(data, name, mime_type, chunk_size)
    }

    /// Tag every emitted chunk with a session (room) identifier
    pub fn with_session(mut self, session: Option<String>) -> Self {
        self.session = session;
        self
    }

    /// Register a progress callback, invoked after each `advance`
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&str, f64) + Send + 'static,
    {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Build the next chunk in sequence
    ///
    /// Returns the chunk and whether it is the last one, or `None` once
    /// every chunk has been produced.
    pub fn advance(&mut self) -> Result<Option<(Chunk, bool)>> {
        if self.is_finished() {
            return Ok(None);
        }

        let (start, end) = self.slice_bounds(self.next_index);
        let chunk = Chunk::new(
            self.file_id.clone(),
            self.name.clone(),
            self.mime_type.clone(),
            self.next_index,
            self.total_chunks,
            self.source.slice(start..end),
        )?
        .with_session(self.session.clone());

        self.next_index += 1;
        let is_last = self.is_finished();

        let fraction = self.progress();
        if let Some(callback) = self.on_progress.as_mut() {
            callback(&self.file_id, fraction);
        }

        Ok(Some((chunk, is_last)))
    }

    fn slice_bounds(&self, index: ChunkIndex) -> (usize, usize) {
        let start = (index as usize * self.chunk_size).min(self.source.len());
        let end = (start + self.chunk_size).min(self.source.len());
        (start, end)
    }

    pub fn file_id(&self) -> &str {
        &self.file_id
    }

    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
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

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn next_index(&self) -> ChunkIndex {
        self.next_index
    }

    pub fn source_len(&self) -> usize {
        self.source.len()
    }

    /// Payload bytes handed out so far
    pub fn bytes_sent(&self) -> usize {
        self.slice_bounds(self.next_index).0
    }

    /// Fraction of chunks produced (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        self.next_index as f64 / self.total_chunks as f64
    }

    pub fn is_finished(&self) -> bool {
        self.next_index >= self.total_chunks
    }
}

impl Iterator for SenderJob {
    type Item = Result<(Chunk, bool)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}

impl std::fmt::Debug for SenderJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderJob")
            .field("file_id", &self.file_id)
            .field("session", &self.session)
            .field("name", &self.name)
            .field("total_chunks", &self.total_chunks)
            .field("chunk_size", &self.chunk_size)
            .field("next_index", &self.next_index)
            .field("source_len", &self.source.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_total_chunks() {
        assert_eq!(total_chunks_for(150_000, 65_536).unwrap(), 3);
        assert_eq!(total_chunks_for(131_072, 65_536).unwrap(), 2);
        assert_eq!(total_chunks_for(1, 65_536).unwrap(), 1);
        assert_eq!(total_chunks_for(0, 65_536).unwrap(), 1);
        assert!(matches!(total_chunks_for(10, 0), Err(Error::InvalidChunkSize)));
        let limit = MAX_TOTAL_CHUNKS as usize;
        assert_eq!(total_chunks_for(limit, 1).unwrap(), MAX_TOTAL_CHUNKS);
        assert!(matches!(total_chunks_for(limit + 1, 1), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_slices_in_order() {
        let source: Vec<u8> = (0..150_000u32).map(|i| (i % 251) as u8).collect();
        let mut job = begin_send(source.clone(), "big.bin", "application/octet-stream", 65_536)
            .unwrap();

        let sizes: Vec<usize> = std::iter::from_fn(|| job.advance().unwrap())
            .map(|(chunk, _)| chunk.payload().len())
            .collect();
        assert_eq!(sizes, vec![65_536, 65_536, 18_928]);
        assert!(job.is_finished());
        assert_eq!(job.bytes_sent(), 150_000);
        assert!(job.advance().unwrap().is_none());
    }

    #[test]
    fn test_last_flag_and_indices() {
        let job = begin_send(vec![7u8; 10], "a", "text/plain", 4).unwrap();
        let chunks: Vec<(Chunk, bool)> = job.map(|r| r.unwrap()).collect();

        assert_eq!(chunks.len(), 3);
        for (i, (chunk, is_last)) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index() as usize, i);
            assert_eq!(chunk.total_chunks(), 3);
            assert_eq!(*is_last, i == 2);
        }
    }

    #[test]
    fn test_empty_source_single_chunk() {
        let mut job = begin_send(Vec::<u8>::new(), "empty", "text/plain", 1024).unwrap();
        assert_eq!(job.total_chunks(), 1);

        let (chunk, is_last) = job.advance().unwrap().unwrap();
        assert!(is_last);
        assert!(chunk.payload().is_empty());
        assert!(job.advance().unwrap().is_none());
    }

    #[test]
    fn test_progress_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut job = begin_send(vec![0u8; 100], "p", "x", 25)
            .unwrap()
            .on_progress(move |_, fraction| sink.lock().unwrap().push(fraction));

        while job.advance().unwrap().is_some() {}
        assert_eq!(*seen.lock().unwrap(), vec![0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_file_ids_unique() {
        let a = generate_file_id("same.txt").unwrap();
        let b = generate_file_id("same.txt").unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("same.txt-"));
    }

    #[test]
    fn test_session_tagging() {
        let mut job = begin_send(vec![1u8; 3], "s", "x", 8)
            .unwrap()
            .with_session(Some("room-9".to_string()));
        let (chunk, _) = job.advance().unwrap().unwrap();
        assert_eq!(chunk.session(), Some("room-9"));
    }

    #[test]
    fn test_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&[0xAB; 1000]).unwrap();
        file.flush().unwrap();

        let job = SenderJob::from_path(file.path(), "application/octet-stream", 300).unwrap();
        assert_eq!(job.total_chunks(), 4);
        assert_eq!(job.source_len(), 1000);
    }
}
