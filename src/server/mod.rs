// Server module - sending side of a transfer

mod sender;

pub use sender::{DataSender, SendReport};
