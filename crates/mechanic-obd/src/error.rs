//! OBD-II protocol error types.

use thiserror::Error;

/// Errors that can occur while talking to an ECU.
#[derive(Debug, Error)]
pub enum ObdError {
    #[error("transport rejected frame 0x{id:03X} (busy or full)")]
    Send { id: u32 },

    #[error("Response timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("multi-frame reassembly error: {0}")]
    Reassembly(String),

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("response decode error: {0}")]
    Decode(String),

    #[error("invalid format template: {0}")]
    InvalidFormat(String),

    #[error("CAN interface error: {0}")]
    Interface(String),
}

impl ObdError {
    pub(crate) fn timeout(timeout: std::time::Duration) -> Self {
        ObdError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}

/// Convenience alias for OBD-II results.
pub type ObdResult<T> = Result<T, ObdError>;
