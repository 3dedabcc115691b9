pub mod pacer;
pub mod state;
pub mod table;

pub use pacer::{begin_send, generate_file_id, total_chunks_for, SenderJob};
pub use state::{SlotUpdate, TransferState};
pub use table::{ApplyResult, CompletedFile, ReassemblyTable, RejectReason, TransferProgress};
