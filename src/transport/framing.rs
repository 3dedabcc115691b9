// Length-prefixed message framing for stream transports
//
// Frame layout: u32 big-endian length | message bytes

use std::collections::VecDeque;
use bytes::{Buf, BufMut, BytesMut};
use crate::common::error::{Error, Result};
use crate::common::types::MAX_FRAME_SIZE;

/// Length prefix size
pub const FRAME_HEADER_LEN: usize = 4;

/// Prefix `message` with its length
pub fn encode_frame(message: &[u8]) -> Result<BytesMut> {
    if message.len() > MAX_FRAME_SIZE {
        return Err(Error::SerializationError(format!(
            "Message too large for a frame: {} bytes",
            message.len()
        )));
    }
    let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + message.len());
    frame.put_u32(message.len() as u32);
    frame.put_slice(message);
    Ok(frame)
}

/// Incremental decoder that reassembles frames from arbitrary reads
pub struct FrameDecoder {
    /// Bytes not yet forming a complete frame
    recv_buffer: BytesMut,
    /// Frames decoded but not yet taken
    frames: VecDeque<Vec<u8>>,
    /// Total bytes fed in
    bytes_received: usize,
    max_frame_size: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            recv_buffer: BytesMut::new(),
            frames: VecDeque::new(),
            bytes_received: 0,
            max_frame_size,
        }
    }

    /// Feed raw bytes from the stream
    ///
    /// # Returns
    /// Number of complete frames decoded by this call
    pub fn process_data(&mut self, data: &[u8]) -> Result<usize> {
        self.recv_buffer.extend_from_slice(data);
        self.bytes_received += data.len();

        let mut parsed = 0;
        while self.recv_buffer.len() >= FRAME_HEADER_LEN {
            let len = u32::from_be_bytes([
                self.recv_buffer[0],
                self.recv_buffer[1],
                self.recv_buffer[2],
                self.recv_buffer[3],
            ]) as usize;

            if len > self.max_frame_size {
                return Err(Error::DeserializationError(format!(
                    "Frame too large: {} bytes (limit {})",
                    len, self.max_frame_size
                )));
            }
            if self.recv_buffer.len() < FRAME_HEADER_LEN + len {
                break;
            }

            self.recv_buffer.advance(FRAME_HEADER_LEN);
            let frame = self.recv_buffer.split_to(len);
            self.frames.push_back(frame.to_vec());
            parsed += 1;
        }

        Ok(parsed)
    }

    /// Take the next decoded frame
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        self.frames.pop_front()
    }

    pub fn has_frames(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Bytes buffered towards an incomplete frame
    pub fn pending_bytes(&self) -> usize {
        self.recv_buffer.len()
    }

    pub fn bytes_received(&self) -> usize {
        self.bytes_received
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_across_reads() {
        let mut wire = encode_frame(b"first").unwrap().to_vec();
        wire.extend_from_slice(&encode_frame(b"second").unwrap());

        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.process_data(&wire[..3]).unwrap(), 0);
        assert_eq!(decoder.process_data(&wire[3..12]).unwrap(), 1);
        assert_eq!(decoder.process_data(&wire[12..]).unwrap(), 1);

        assert_eq!(decoder.next_frame().unwrap(), b"first");
        assert_eq!(decoder.next_frame().unwrap(), b"second");
        assert!(!decoder.has_frames());
        assert_eq!(decoder.pending_bytes(), 0);
        assert_eq!(decoder.bytes_received(), wire.len());
    }

    #[test]
    fn test_empty_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.process_data(&encode_frame(b"").unwrap()).unwrap();
        assert_eq!(decoder.next_frame().unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut decoder = FrameDecoder::with_max_frame_size(8);
        let result = decoder.process_data(&100u32.to_be_bytes());
        assert!(result.is_err());
    }
}
