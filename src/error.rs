//! Error taxonomy for the OSC transport, command façade and state engine
//!
//! Recoverable failures (`RequestTimeout`, `Protocol`) are handled by the caller
//! with a fallback value; `NotConnected` aborts the calling operation only.

use thiserror::Error;

/// Errors produced by the transport, the command façade and the state managers
#[derive(Debug, Error)]
pub enum LiveError {
    /// No reply arrived within the deadline
    #[error("OSC request timeout: {address} (after {timeout_ms}ms)")]
    RequestTimeout { address: String, timeout_ms: u64 },

    /// A reply arrived but had the wrong shape
    #[error("malformed reply on {address}: {reason}")]
    Protocol { address: String, reason: String },

    /// Attempted to send while the transport is down
    #[error("OSC client not connected")]
    NotConnected,

    /// Parameter name not present in the research cache
    #[error("parameter '{name}' is not mapped for {entity_id}")]
    UnmappedParameter { entity_id: String, name: String },

    /// Socket level failure
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// OSC packet could not be encoded
    #[error("failed to encode OSC packet: {0}")]
    Encode(String),
}

impl LiveError {
    pub fn protocol(address: &str, reason: impl Into<String>) -> Self {
        LiveError::Protocol {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    /// Timeouts and malformed replies are recoverable: callers substitute a default
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LiveError::RequestTimeout { .. } | LiveError::Protocol { .. }
        )
    }
}

pub type LiveResult<T> = Result<T, LiveError>;
