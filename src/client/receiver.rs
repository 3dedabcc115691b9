// Receiver side: feeds inbound messages into the reassembly table

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use crate::chunking::table::{ApplyResult, CompletedFile, ReassemblyTable, RejectReason};
use crate::common::error::{Error, Result};
use crate::transport::ProgressSink;

/// Per-connection receiver.
///
/// Messages from one connection are applied one at a time; the table
/// itself may be shared with receivers for other connections.
pub struct FileReceiver {
    table: Arc<ReassemblyTable>,
    output_dir: Option<PathBuf>,
    stats: ReceiverStats,
}

/// Statistics about a receiving connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    pub messages: u64,
    pub files_completed: u64,
    pub bytes_completed: u64,
    pub malformed: u64,
    pub mismatched: u64,
    pub ignored: u64,
}

impl FileReceiver {
    /// Create a receiver that only reports completed files to its sink
    pub fn new(table: Arc<ReassemblyTable>) -> Self {
        Self {
            table,
            output_dir: None,
            stats: ReceiverStats::default(),
        }
    }

    /// Also write each completed file into `dir`
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Entry point for every message the transport delivers
    pub fn on_inbound_message<P>(&mut self, raw: &[u8], sink: &mut P) -> ApplyResult
    where
        P: ProgressSink + ?Sized,
    {
        self.stats.messages += 1;
        let result = self.table.apply_message(raw);

        match &result {
            ApplyResult::Progressed { key, fraction } => {
                sink.on_progress(&key.file_id, *fraction);
            }
            ApplyResult::Completed(file) => {
                self.stats.files_completed += 1;
                self.stats.bytes_completed += file.len() as u64;
                sink.on_progress(&file.file_id, 1.0);

                if let Some(dir) = &self.output_dir {
                    match persist(dir, file) {
                        Ok(path) => log::info!("Saved {} to {}", file.file_id, path.display()),
                        Err(e) => {
                            log::error!("Failed to save {}: {}", file.file_id, e);
                            sink.on_failed(&file.file_id, &e);
                        }
                    }
                }
                sink.on_completed(file);
            }
            ApplyResult::Rejected(RejectReason::MalformedChunk(_)) => {
                self.stats.malformed += 1;
            }
            ApplyResult::Rejected(RejectReason::TotalChunksMismatch { .. }) => {
                self.stats.mismatched += 1;
            }
            ApplyResult::Ignored(_) => {
                self.stats.ignored += 1;
            }
        }

        result
    }

    /// Apply messages until the source runs dry
    ///
    /// # Returns
    /// Every file completed along the way, in completion order
    pub fn run<I, P>(&mut self, messages: I, sink: &mut P) -> Vec<CompletedFile>
    where
        I: IntoIterator<Item = Vec<u8>>,
        P: ProgressSink + ?Sized,
    {
        messages
            .into_iter()
            .filter_map(|raw| match self.on_inbound_message(&raw, sink) {
                ApplyResult::Completed(file) => Some(file),
                _ => None,
            })
            .collect()
    }

    pub fn table(&self) -> &Arc<ReassemblyTable> {
        &self.table
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }
}

/// Reduce a peer-supplied display name to a safe single path component
pub fn sanitize_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_control() || c == ':' { '_' } else { c })
        .collect();
    let trimmed = cleaned.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Pick a path in `dir` for `name` that does not exist yet
fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    (1u32..)
        .map(|n| match ext {
            Some(ext) => dir.join(format!("{} ({}).{}", stem, n, ext)),
            None => dir.join(format!("{} ({})", stem, n)),
        })
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

/// Write a completed file into `dir` via a `.part` file and atomic rename
pub fn persist(dir: &Path, file: &CompletedFile) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;

    let final_path = unique_path(dir, &sanitize_name(&file.name));
    let file_name = final_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::ConfigError(format!("bad output path {}", final_path.display())))?;
    let part_path = dir.join(format!("{}.part", file_name));

    let mut part = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&part_path)?;
    part.write_all(&file.data)?;
    part.flush()?;
    part.sync_all()?;
    drop(part);

    fs::rename(&part_path, &final_path)?;
    Ok(final_path)
}
