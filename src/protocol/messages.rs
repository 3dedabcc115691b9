// Wire message envelopes for file chunks
//
// Two framings share one header shape:
//   Json:   {"type":"filechunk", ..., "payload":[b0, b1, ...]}
//   Binary: MAGIC | VERSION | u32 header_len (BE) | header JSON | raw payload

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use crate::common::error::{Error, Result};
use crate::common::types::MESSAGE_TYPE_FILECHUNK;

/// Magic prefix of the binary framing
pub const BINARY_MAGIC: &[u8; 4] = b"CRLY";
/// Binary framing version
pub const BINARY_VERSION: u8 = 1;
/// magic + version + header length
pub const BINARY_PREFIX_LEN: usize = 4 + 1 + 4;

/// Chunk metadata as it appears on the wire.
///
/// Index and total are signed so that negative values from a misbehaving
/// peer surface as validation errors instead of opaque parse failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireHeader {
    #[serde(rename = "type")]
    pub message_type: String,
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    pub name: String,
    pub mime_type: String,
    pub chunk_index: i64,
    pub total_chunks: i64,
}

/// The reference JSON message: header fields plus the payload as an
/// array of unsigned byte values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonChunkMessage {
    #[serde(flatten)]
    pub header: WireHeader,
    pub payload: Vec<u8>,
}

/// Framing detected on an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Json,
    Binary,
}

/// Sniff the framing of a raw message without parsing it
pub fn detect_framing(raw: &[u8]) -> Option<Framing> {
    if raw.starts_with(BINARY_MAGIC) {
        return Some(Framing::Binary);
    }
    match raw.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') => Some(Framing::Json),
        _ => None,
    }
}

/// Serialize a JSON chunk message
pub fn write_json(header: &WireHeader, payload: &[u8]) -> Result<Vec<u8>> {
    let message = JsonChunkMessage {
        header: header.clone(),
        payload: payload.to_vec(),
    };
    serde_json::to_vec(&message)
        .map_err(|e| Error::SerializationError(format!("Failed to encode chunk message: {}", e)))
}

/// Parse a JSON chunk message
pub fn read_json(raw: &[u8]) -> Result<(WireHeader, Bytes)> {
    let message: JsonChunkMessage = serde_json::from_slice(raw)
        .map_err(|e| Error::MalformedChunk(format!("invalid JSON chunk message: {}", e)))?;
    Ok((message.header, Bytes::from(message.payload)))
}

/// Serialize a binary-framed chunk message
pub fn write_binary(header: &WireHeader, payload: &[u8]) -> Result<Vec<u8>> {
    let header_json = serde_json::to_vec(header)
        .map_err(|e| Error::SerializationError(format!("Failed to encode chunk header: {}", e)))?;
    let header_len = u32::try_from(header_json.len())
        .map_err(|_| Error::SerializationError("chunk header too large".to_string()))?;

    let mut buf = BytesMut::with_capacity(BINARY_PREFIX_LEN + header_json.len() + payload.len());
    buf.put_slice(BINARY_MAGIC);
    buf.put_u8(BINARY_VERSION);
    buf.put_u32(header_len);
    buf.put_slice(&header_json);
    buf.put_slice(payload);
    Ok(buf.to_vec())
}

/// Parse a binary-framed chunk message
pub fn read_binary(raw: &[u8]) -> Result<(WireHeader, Bytes)> {
    if raw.len() < BINARY_PREFIX_LEN {
        return Err(Error::MalformedChunk(format!(
            "binary frame too short: {} bytes",
            raw.len()
        )));
    }

    let mut buf = Bytes::copy_from_slice(raw);
    let mut magic = [0u8; 4];
    buf.copy_to_slice(&mut magic);
    if &magic != BINARY_MAGIC {
        return Err(Error::MalformedChunk("bad binary frame magic".to_string()));
    }

    let version = buf.get_u8();
    if version != BINARY_VERSION {
        return Err(Error::MalformedChunk(format!(
            "unsupported binary frame version {}",
            version
        )));
    }

    let header_len = buf.get_u32() as usize;
    if header_len > buf.remaining() {
        return Err(Error::MalformedChunk(format!(
            "header length {} exceeds frame ({} bytes left)",
            header_len,
            buf.remaining()
        )));
    }

    let header_bytes = buf.split_to(header_len);
    let header: WireHeader = serde_json::from_slice(&header_bytes)
        .map_err(|e| Error::MalformedChunk(format!("invalid chunk header: {}", e)))?;

    Ok((header, buf))
}

/// Parse either framing
pub fn read_message(raw: &[u8]) -> Result<(WireHeader, Bytes)> {
    match detect_framing(raw) {
        Some(Framing::Binary) => read_binary(raw),
        Some(Framing::Json) => read_json(raw),
        None => Err(Error::MalformedChunk("unrecognised message framing".to_string())),
    }
}

/// Check that a parsed header is a file chunk message
pub fn expect_filechunk(header: &WireHeader) -> Result<()> {
    if header.message_type != MESSAGE_TYPE_FILECHUNK {
        return Err(Error::MalformedChunk(format!(
            "unexpected message type '{}'",
            header.message_type
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> WireHeader {
        WireHeader {
            message_type: MESSAGE_TYPE_FILECHUNK.to_string(),
            file_id: "report.pdf-1".to_string(),
            session: None,
            name: "report.pdf".to_string(),
            mime_type: "application/pdf".to_string(),
            chunk_index: 1,
            total_chunks: 3,
        }
    }

    #[test]
    fn test_json_uses_reference_field_names() {
        let raw = write_json(&header(), &[1, 2, 255]).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();

        assert_eq!(value["type"], "filechunk");
        assert_eq!(value["fileId"], "report.pdf-1");
        assert_eq!(value["mimeType"], "application/pdf");
        assert_eq!(value["chunkIndex"], 1);
        assert_eq!(value["totalChunks"], 3);
        assert_eq!(value["payload"], serde_json::json!([1, 2, 255]));
        assert!(value.get("session").is_none());
    }

    #[test]
    fn test_binary_frame_layout() {
        let raw = write_binary(&header(), b"abc").unwrap();
        assert!(raw.starts_with(BINARY_MAGIC));
        assert_eq!(raw[4], BINARY_VERSION);
        assert!(raw.ends_with(b"abc"));

        let (parsed, payload) = read_binary(&raw).unwrap();
        assert_eq!(parsed, header());
        assert_eq!(&payload[..], b"abc");
    }

    #[test]
    fn test_detect_framing() {
        assert_eq!(detect_framing(b"  {\"type\":1}"), Some(Framing::Json));
        assert_eq!(detect_framing(b"CRLY\x01"), Some(Framing::Binary));
        assert_eq!(detect_framing(b"hello"), None);
        assert_eq!(detect_framing(b""), None);
    }

    #[test]
    fn test_truncated_binary_header() {
        let mut raw = write_binary(&header(), b"abc").unwrap();
        // claim a header far longer than the frame
        raw[5..9].copy_from_slice(&10_000u32.to_be_bytes());
        assert!(matches!(read_binary(&raw), Err(Error::MalformedChunk(_))));
    }

    #[test]
    fn test_payload_value_out_of_byte_range() {
        let raw = br#"{"type":"filechunk","fileId":"a","name":"a","mimeType":"x","chunkIndex":0,"totalChunks":1,"payload":[1,256]}"#;
        assert!(matches!(read_json(raw), Err(Error::MalformedChunk(_))));
    }
}
