//! Probe error types.

use thiserror::Error;

/// Errors raised while loading the probe configuration.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("config read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Convenience alias for probe results.
pub type ProbeResult<T> = Result<T, ProbeError>;
