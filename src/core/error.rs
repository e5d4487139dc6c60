//! Custom error types for the coordination engine.
//!
//! This module defines all error types using `thiserror` for proper error
//! handling throughout the crate. No `.unwrap()` or `.expect()` calls should
//! be used in production code; instead, errors should be propagated using
//! `?`. Only bind failure (fatal to the peer) and the error kinds below
//! are represented as `Err` values — causal gaps, missing history,
//! election timeouts and phase-king aborts are protocol-normal control
//! flow handled inline by the relevant handler, not bubbled up.

use super::config::ConfigError;
use std::io;

/// Main error type for the coordination engine.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Network I/O error occurred
    #[error("Network error: {0}")]
    Network(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Packet exceeded the 1024-byte wire cap
    #[error("Packet of {0} bytes exceeds the {MAX} byte wire cap", MAX = super::packet::MAX_PACKET_BYTES)]
    PacketTooLarge(usize),

    /// Failed to bind to a network address
    #[error("Failed to bind to {address}: {source}")]
    BindError { address: String, source: io::Error },

    /// Failed to join multicast group
    #[error("Failed to join multicast group {group}: {source}")]
    MulticastJoinError { group: String, source: io::Error },

    /// A peer identifier was presented that the leader has no port for
    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    /// Channel send error
    #[error("Channel send error: channel closed")]
    ChannelSendError,

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Convenience type alias for Results using our custom error type.
pub type Result<T> = std::result::Result<T, CoreError>;

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for CoreError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        CoreError::ChannelSendError
    }
}

impl From<ConfigError> for CoreError {
    fn from(e: ConfigError) -> Self {
        CoreError::ConfigError(e.to_string())
    }
}
