// Chunk type and the wire codec
use bytes::Bytes;
use crate::common::error::{Error, Result};
use crate::common::types::{
    ChunkIndex, FileId, TransferKey, WireFormat, MAX_CHUNK_SIZE, MAX_TOTAL_CHUNKS,
    MESSAGE_TYPE_FILECHUNK,
};
use crate::protocol::messages::{self, WireHeader};

/// One wire unit of a file transfer.
///
/// A chunk is validated on construction (`0 <= index < total`,
/// `0 < total <= MAX_TOTAL_CHUNKS`, payload at most `MAX_CHUNK_SIZE`) and cannot be mutated afterwards; the payload is a shared `Bytes`
/// so cloning a chunk does not copy its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    file_id: FileId,
    session: Option<String>,
    name: String,
    mime_type: String,
    chunk_index: ChunkIndex,
    total_chunks: u32,
    payload: Bytes,
}

impl Chunk {
    /// Create a new chunk
    ///
    /// # Arguments
    /// * `file_id` - Identifier shared by every chunk of one transfer attempt
    /// * `name` - Display name of the file
    /// * `mime_type` - Advisory content type
    /// * `chunk_index` - Zero-based position of this chunk
    /// * `total_chunks` - Number of chunks in the transfer, 1 to `MAX_TOTAL_CHUNKS`
    /// * `payload` - The chunk bytes, at most `MAX_CHUNK_SIZE`
    pub fn new(
        file_id: impl Into<FileId>,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        chunk_index: ChunkIndex,
        total_chunks: u32,
        payload: impl Into<Bytes>,
    ) -> Result<Self> {
        let file_id = file_id.into();
        if file_id.is_empty() {
            return Err(Error::MalformedChunk("empty fileId".to_string()));
        }
        if total_chunks == 0 {
            return Err(Error::MalformedChunk("totalChunks must be at least 1".to_string()));
        }
        if total_chunks > MAX_TOTAL_CHUNKS {
            return Err(Error::MalformedChunk(format!(
                "totalChunks {} exceeds limit {}",
                total_chunks, MAX_TOTAL_CHUNKS
            )));
        }
        if chunk_index >= total_chunks {
            return Err(Error::MalformedChunk(format!(
                "chunkIndex {} out of range for totalChunks {}",
                chunk_index, total_chunks
            )));
        }
        let payload = payload.into();
        if payload.len() > MAX_CHUNK_SIZE {
            return Err(Error::MalformedChunk(format!(
                "payload of {} bytes exceeds limit {}",
                payload.len(),
                MAX_CHUNK_SIZE
            )));
        }

        Ok(Self {
            file_id,
            session: None,
            name: name.into(),
            mime_type: mime_type.into(),
            chunk_index,
            total_chunks,
            payload,
        })
    }

    /// Tag the chunk with the sender's session (room) identifier
    pub fn with_session(mut self, session: Option<String>) -> Self {
        self.session = session;
        self
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

    pub fn chunk_index(&self) -> ChunkIndex {
        self.chunk_index
    }

    pub fn total_chunks(&self) -> u32 {
        self.total_chunks
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn is_last(&self) -> bool {
        self.chunk_index + 1 == self.total_chunks
    }

    /// Reassembly key for this chunk
    pub fn key(&self) -> TransferKey {
        TransferKey::new(self.session.clone(), self.file_id.clone())
    }

    fn header(&self) -> WireHeader {
        WireHeader {
            message_type: MESSAGE_TYPE_FILECHUNK.to_string(),
            file_id: self.file_id.clone(),
            session: self.session.clone(),
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            chunk_index: i64::from(self.chunk_index),
            total_chunks: i64::from(self.total_chunks),
        }
    }

    fn from_wire(header: WireHeader, payload: Bytes) -> Result<Self> {
        messages::expect_filechunk(&header)?;

        if header.total_chunks <= 0 {
            return Err(Error::MalformedChunk(format!(
                "totalChunks must be positive, got {}",
                header.total_chunks
            )));
        }
        if header.chunk_index < 0 {
            return Err(Error::MalformedChunk(format!(
                "chunkIndex must not be negative, got {}",
                header.chunk_index
            )));
        }
        let total_chunks = u32::try_from(header.total_chunks).map_err(|_| {
            Error::MalformedChunk(format!("totalChunks {} too large", header.total_chunks))
        })?;
        let chunk_index = u32::try_from(header.chunk_index).map_err(|_| {
            Error::MalformedChunk(format!("chunkIndex {} too large", header.chunk_index))
        })?;

        Ok(Chunk::new(
            header.file_id,
            header.name,
            header.mime_type,
            chunk_index,
            total_chunks,
            payload,
        )?
        .with_session(header.session))
    }
}

/// Encode a chunk into a self-describing wire message
pub fn encode(chunk: &Chunk, format: WireFormat) -> Result<Vec<u8>> {
    let header = chunk.header();
    match format {
        WireFormat::Json => messages::write_json(&header, &chunk.payload),
        WireFormat::Binary => messages::write_binary(&header, &chunk.payload),
    }
}

/// Decode a wire message of either framing into a validated chunk
///
/// Fails with `Error::MalformedChunk` when required fields are missing,
/// `totalChunks` is outside `1..=MAX_TOTAL_CHUNKS`, `chunkIndex` is outside
/// `0..totalChunks`, or the payload is not a byte sequence or is larger
/// than `MAX_CHUNK_SIZE`.
pub fn decode(raw: &[u8]) -> Result<Chunk> {
    let (header, payload) = messages::read_message(raw)?;
    Chunk::from_wire(header, payload)
}
