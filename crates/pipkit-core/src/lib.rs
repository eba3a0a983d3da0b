pub mod config;
pub mod errors;
pub mod types;

pub use config::{OverlayConfig, PipOptions};
pub use errors::PipError;
pub use types::*;
