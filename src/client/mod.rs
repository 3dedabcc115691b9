// Client module - receiving side of a transfer

mod receiver;

pub use receiver::{persist, sanitize_name, FileReceiver, ReceiverStats};
