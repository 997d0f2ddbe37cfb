//! Container log relay types.
//!
//! Non-interactive containers deliver stdout and stderr over one stream,
//! split into frames: `[stream: u8] [0, 0, 0] [length: u32 BE] [payload]`.
//! Interactive (TTY) containers deliver a single raw byte stream.

use serde::{Deserialize, Serialize};

/// Size of a multiplexed frame header in bytes.
pub const FRAME_HEADER_LEN: usize = 8;

/// How a container's log stream is relayed to the caller's sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelayMode {
    /// Raw stream copied verbatim to one combined sink.
    Interactive,
    /// Frame-multiplexed stream split into stdout and stderr.
    Demux,
}

impl Default for RelayMode {
    fn default() -> Self {
        Self::Demux
    }
}

impl RelayMode {
    pub fn from_interactive(interactive: bool) -> Self {
        if interactive {
            Self::Interactive
        } else {
            Self::Demux
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::Interactive)
    }
}

/// Channel a multiplexed frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdin,
    Stdout,
    Stderr,
    /// Engine-side error message about the stream itself.
    System,
}

impl StreamKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Stdin),
            1 => Some(Self::Stdout),
            2 => Some(Self::Stderr),
            3 => Some(Self::System),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            Self::Stdin => 0,
            Self::Stdout => 1,
            Self::Stderr => 2,
            Self::System => 3,
        }
    }
}

/// Options for requesting a container's log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    pub stdout: bool,
    pub stderr: bool,
    /// Keep the stream open until the container exits.
    pub follow: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            stdout: true,
            stderr: true,
            follow: true,
        }
    }
}

/// Encode one multiplexed frame header for `len` payload bytes.
pub fn frame_header(kind: StreamKind, len: u32) -> [u8; FRAME_HEADER_LEN] {
    let size = len.to_be_bytes();
    [kind.as_byte(), 0, 0, 0, size[0], size[1], size[2], size[3]]
}
