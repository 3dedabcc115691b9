// Sender side: drives a SenderJob through a transport

use crate::chunking::pacer::{begin_send, SenderJob};
use crate::common::config::TransferConfig;
use crate::common::error::{Error, Result};
use crate::common::types::WireFormat;
use crate::protocol::chunk;
use crate::transport::{ProgressSink, SendCapability};

/// Summary of a finished send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub file_id: String,
    pub chunks_sent: u32,
    pub bytes_sent: usize,
}

/// Encodes chunks and hands them to a send capability, one at a time
pub struct DataSender {
    format: WireFormat,
    chunk_size: usize,
    session: Option<String>,
    total_bytes_sent: usize,
    files_sent: u64,
}

impl DataSender {
    /// Create a new data sender
    pub fn new(config: &TransferConfig) -> Self {
        Self {
            format: config.wire_format,
            chunk_size: config.chunk_size,
            session: None,
            total_bytes_sent: 0,
            files_sent: 0,
        }
    }

    /// Session (room) id stamped on jobs that carry none
    pub fn with_session(mut self, session: Option<String>) -> Self {
        self.session = session;
        self
    }

    /// Split `data` into chunks and send it as a new transfer
    pub fn send_bytes<S, P>(
        &mut self,
        data: Vec<u8>,
        name: &str,
        mime_type: &str,
        transport: &mut S,
        sink: &mut P,
    ) -> Result<SendReport>
    where
        S: SendCapability + ?Sized,
        P: ProgressSink + ?Sized,
    {
        let job = begin_send(data, name, mime_type, self.chunk_size)?;
        self.send_job(job, transport, sink)
    }

    /// Send every chunk of `job` in index order
    ///
    /// # Arguments
    /// * `job` - The job to drain; consumed whether or not the send succeeds
    /// * `transport` - Capability the encoded chunks are handed to
    /// * `sink` - Receives progress after each chunk and the failure, if any
    ///
    /// # Returns
    /// A report on success. On the first error the remaining chunks are
    /// abandoned; transport errors surface as `Error::SendFailure`, anything
    /// else keeps its own kind.
    pub fn send_job<S, P>(
        &mut self,
        job: SenderJob,
        transport: &mut S,
        sink: &mut P,
    ) -> Result<SendReport>
    where
        S: SendCapability + ?Sized,
        P: ProgressSink + ?Sized,
    {
        let mut job = if job.session().is_none() {
            job.with_session(self.session.clone())
        } else {
            job
        };
        let file_id = job.file_id().to_string();

        log::info!(
            "Sending '{}' as {} ({} bytes, {} chunks)",
            job.name(),
            file_id,
            job.source_len(),
            job.total_chunks()
        );

        match self.pump(&mut job, transport, sink) {
            Ok(report) => {
                self.files_sent += 1;
                log::info!(
                    "Sent {}: {} chunks, {} bytes",
                    report.file_id,
                    report.chunks_sent,
                    report.bytes_sent
                );
                Ok(report)
            }
            Err(e) => {
                log::error!(
                    "Aborting {} after {}/{} chunks: {}",
                    file_id,
                    job.next_index().saturating_sub(1),
                    job.total_chunks(),
                    e
                );
                sink.on_failed(&file_id, &e);
                Err(e)
            }
        }
    }

    fn pump<S, P>(&mut self, job: &mut SenderJob, transport: &mut S, sink: &mut P) -> Result<SendReport>
    where
        S: SendCapability + ?Sized,
        P: ProgressSink + ?Sized,
    {
        let mut chunks_sent = 0;
        let mut bytes_sent = 0;

        while let Some((chunk, is_last)) = job.advance()? {
            let message = chunk::encode(&chunk, self.format)?;
            transport.send(message).map_err(|e| match e {
                Error::SendFailure(_) => e,
                other => Error::SendFailure(other.to_string()),
            })?;

            chunks_sent += 1;
            bytes_sent += chunk.payload().len();
            self.total_bytes_sent += chunk.payload().len();
            sink.on_progress(job.file_id(), job.progress());

            log::debug!(
                "Sent chunk {}/{} of {} ({} bytes){}",
                chunk.chunk_index() + 1,
                chunk.total_chunks(),
                job.file_id(),
                chunk.payload().len(),
                if is_last { " [last]" } else { "" }
            );
        }

        Ok(SendReport {
            file_id: job.file_id().to_string(),
            chunks_sent,
            bytes_sent,
        })
    }

    /// Get the total number of payload bytes sent
    pub fn total_bytes_sent(&self) -> usize {
        self.total_bytes_sent
    }

    pub fn files_sent(&self) -> u64 {
        self.files_sent
    }

    /// Reset the byte counter
    pub fn reset_counter(&mut self) {
        self.total_bytes_sent = 0;
    }
}

impl Default for DataSender {
    fn default() -> Self {
        Self::new(&TransferConfig::default())
    }
}
