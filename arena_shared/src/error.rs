//! Error types surfaced to the connection layer.
//!
//! Unknown entities, unbound keys and snapshot tuples for unknown players
//! are recovered locally and never show up here. What remains is fatal to a
//! session.

use std::fmt;

use thiserror::Error;

/// Which transport path a failure happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Ordered, lossless (TCP).
    Reliable,
    /// Unordered, best effort (UDP).
    Unreliable,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Reliable => f.write_str("reliable"),
            Channel::Unreliable => f.write_str("unreliable"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("{channel} transport failed: {source}")]
    Transport {
        channel: Channel,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed packet: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("protocol mismatch: expected {expected}, got {got}")]
    ProtocolMismatch { expected: u32, got: u32 },

    #[error("session disconnected: {0}")]
    Disconnected(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl ArenaError {
    pub fn transport(channel: Channel, source: std::io::Error) -> Self {
        ArenaError::Transport { channel, source }
    }

    /// Whether the session can keep going after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ArenaError::Codec(_))
    }
}

pub type Result<T> = std::result::Result<T, ArenaError>;
