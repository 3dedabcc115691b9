// Common utilities and shared code

pub mod error;
pub mod config;
pub mod types;

pub use error::{Error, Result};
pub use config::{TransferConfig, TransportConfig};
pub use types::*;
