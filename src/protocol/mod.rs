// Protocol module - chunk codec and wire message framing

pub mod chunk;
pub mod messages;

pub use chunk::{decode, encode, Chunk};
pub use messages::{detect_framing, Framing, WireHeader};
