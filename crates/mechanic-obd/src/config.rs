//! Interface configuration, passed to the transport and the engine at
//! construction time.

use std::time::Duration;

use serde::Deserialize;

/// The two bus speeds supported for OBD-II on CAN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum BusSpeed {
    #[serde(rename = "250k")]
    Kbps250,
    #[default]
    #[serde(rename = "500k")]
    Kbps500,
}

impl BusSpeed {
    /// Nominal bitrate in bits per second.
    pub fn bitrate(self) -> u32 {
        match self {
            BusSpeed::Kbps250 => 250_000,
            BusSpeed::Kbps500 => 500_000,
        }
    }
}

/// CAN interface settings, loadable from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InterfaceConfig {
    /// Bus speed class.
    #[serde(default)]
    pub speed: BusSpeed,
    /// Send outgoing frames with 29-bit identifiers. Some cars expect this.
    #[serde(default)]
    pub extended: bool,
    /// Echo sent frames back to this socket and to other local sockets.
    ///
    /// SocketCAN still puts every frame on the bus; silencing the node needs
    /// the interface itself in loopback mode (`ip link set can0 type can
    /// loopback on`).
    #[serde(default)]
    pub loopback: bool,
    /// Accept every frame instead of only the OBD-II response range.
    #[serde(default)]
    pub no_filter: bool,
    /// Dump all outgoing and incoming messages at info level.
    #[serde(default)]
    pub debug: bool,
    /// Sleep between two polls of the transport.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Timeout used by the diagnostic value queries.
    #[serde(default = "default_query_timeout")]
    pub query_timeout_ms: u64,
}

fn default_poll_interval() -> u64 {
    1
}

fn default_query_timeout() -> u64 {
    1000
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            speed: BusSpeed::default(),
            extended: false,
            loopback: false,
            no_filter: false,
            debug: false,
            poll_interval_ms: default_poll_interval(),
            query_timeout_ms: default_query_timeout(),
        }
    }
}

impl InterfaceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}
