//! OBD-II over CAN: diagnostic message codec, request/response exchange
//! engine and multi-frame ("long PID") reassembly.
//!
//! - `ObdMessage`: fixed-shape diagnostic frame with canonical text rendering
//! - `Transport` trait for non-blocking CAN I/O (mockable in tests)
//! - `ObdInterface`: exchange engine, reassembler and Mode 01 value queries
//! - `MockTransport` for testing without a bus, `SocketCanTransport` on Linux

pub mod config;
pub mod error;
pub mod exchange;
pub mod message;
pub mod mock;
pub mod multiframe;
pub mod query;
pub mod transport;
pub mod types;

// Re-exports for convenience.
pub use config::{BusSpeed, InterfaceConfig};
pub use error::{ObdError, ObdResult};
pub use exchange::ObdInterface;
pub use message::ObdMessage;
pub use mock::MockTransport;
pub use multiframe::{MultiframeSession, Progress, SessionState};
pub use query::format_reading;
#[cfg(target_os = "linux")]
pub use transport::SocketCanTransport;
pub use transport::Transport;
pub use types::CanFrame;
