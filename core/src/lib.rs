//! Image Extender Core - Foundational Types
//!
//! Error taxonomy, configuration values, certificate classification,
//! log relay types and step events shared by the runtime and the CLI.

pub mod certs;
pub mod config;
pub mod error;
pub mod event;
pub mod log;

// Re-export commonly used types
pub use certs::{CertConfig, CertContents};
pub use config::{CertConventions, ExtendConfig, LogLevel};
pub use error::{ExtendError, GraftError, Result};
pub use event::{EventEmitter, EventKind, ExtendEvent};
pub use log::{LogOptions, RelayMode, StreamKind};

/// Image Extender version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
