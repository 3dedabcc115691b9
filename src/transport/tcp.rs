// TCP transport: length-prefixed messages over a plain stream

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use crate::common::config::TransportConfig;
use crate::common::error::{Error, Result};
use crate::transport::framing::{encode_frame, FrameDecoder};
use crate::transport::SendCapability;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Outbound side of a TCP connection
pub struct TcpSender {
    stream: TcpStream,
    peer: SocketAddr,
    bytes_sent: u64,
}

impl TcpSender {
    /// Connect to the endpoint named in `config`
    pub fn connect(config: &TransportConfig) -> Result<Self> {
        let stream = TcpStream::connect(config.endpoint)?;
        stream.set_nodelay(true)?;
        log::info!(
            "Connected to {} (room: {})",
            config.endpoint,
            config.room.as_deref().unwrap_or("-")
        );
        Ok(Self {
            stream,
            peer: config.endpoint,
            bytes_sent: 0,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Flush and close the write half
    pub fn finish(mut self) -> Result<()> {
        self.stream.flush()?;
        self.stream.shutdown(std::net::Shutdown::Write)?;
        Ok(())
    }
}

impl SendCapability for TcpSender {
    fn send(&mut self, message: Vec<u8>) -> Result<()> {
        let frame = encode_frame(&message)?;
        self.stream
            .write_all(&frame)
            .map_err(|e| Error::SendFailure(format!("write to {} failed: {}", self.peer, e)))?;
        self.bytes_sent += frame.len() as u64;
        Ok(())
    }
}

/// Listening socket that yields one reader per inbound connection
pub struct TcpMessageListener {
    listener: TcpListener,
}

impl TcpMessageListener {
    pub fn bind(config: &TransportConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.endpoint)?;
        log::info!("Listening on {}", listener.local_addr()?);
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Block until a peer connects
    pub fn accept(&self) -> Result<TcpMessageReader> {
        let (stream, peer) = self.listener.accept()?;
        log::info!("Accepted connection from {}", peer);
        Ok(TcpMessageReader::new(stream, peer))
    }
}

/// Inbound side of a TCP connection, yielding whole messages
pub struct TcpMessageReader {
    stream: TcpStream,
    peer: SocketAddr,
    decoder: FrameDecoder,
    buf: Vec<u8>,
}

impl TcpMessageReader {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            decoder: FrameDecoder::new(),
            buf: vec![0u8; READ_BUFFER_SIZE],
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Next message, or `None` once the peer closes cleanly
    pub fn next_message(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(frame) = self.decoder.next_frame() {
                return Ok(Some(frame));
            }

            let read = match self.stream.read(&mut self.buf) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if read == 0 {
                if self.decoder.pending_bytes() > 0 {
                    log::warn!(
                        "{} closed mid-frame, dropping {} buffered bytes",
                        self.peer,
                        self.decoder.pending_bytes()
                    );
                    return Err(Error::ConnectionClosed);
                }
                return Ok(None);
            }
            self.decoder.process_data(&self.buf[..read])?;
        }
    }
}

impl Iterator for TcpMessageReader {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_message().transpose()
    }
}
