//! CAN transport abstraction.
//!
//! `Transport` exposes non-blocking send/receive of raw frames. Two impls:
//! - `SocketCanTransport`: Linux-only, wraps a non-blocking `socketcan::CanSocket`
//! - `MockTransport`: all platforms, scripted frames (in `mock.rs`)

use crate::types::CanFrame;

/// A CAN-like channel with non-blocking send and receive.
///
/// Absence of data is not an error and a busy channel is reported as
/// `false`; the caller decides whether to retry. Frames come out of
/// `try_receive` in the order the bus delivered them.
pub trait Transport: Send {
    /// Try to queue `frame` for transmission. Returns `false` if the channel
    /// is busy or full.
    fn try_send(&mut self, frame: &CanFrame) -> bool;

    /// Take the next inbound frame, if one is waiting.
    fn try_receive(&mut self) -> Option<CanFrame>;
}

// ── SocketCAN (Linux-only) ──────────────────────────────────────

#[cfg(target_os = "linux")]
pub use socket::SocketCanTransport;

#[cfg(target_os = "linux")]
mod socket {
    use std::io::ErrorKind;

    use socketcan::{
        CanFilter, CanSocket, EmbeddedFrame, ExtendedId, Id, Socket, SocketOptions, StandardId,
    };

    use super::Transport;
    use crate::config::InterfaceConfig;
    use crate::error::{ObdError, ObdResult};
    use crate::types::{CanFrame, OBD_RESPONSE_ID_MIN};

    /// Kernel filter mask selecting the 0x7E8–0x7EF response range.
    const OBD_RESPONSE_MASK: u32 = 0x7F8;

    /// SocketCAN transport for Linux hosts.
    pub struct SocketCanTransport {
        socket: CanSocket,
        interface_name: String,
    }

    impl SocketCanTransport {
        /// Open `interface_name` (e.g. "can0") and apply `config`.
        ///
        /// The bitrate is a property of the network interface and must be set
        /// with `ip link` before the socket is opened.
        pub fn open(interface_name: &str, config: &InterfaceConfig) -> ObdResult<Self> {
            let interface_err =
                |e: std::io::Error| ObdError::Interface(format!("{interface_name}: {e}"));

            let socket = CanSocket::open(interface_name).map_err(interface_err)?;
            socket.set_nonblocking(true).map_err(interface_err)?;
            socket.set_loopback(config.loopback).map_err(interface_err)?;
            socket
                .set_recv_own_msgs(config.loopback)
                .map_err(interface_err)?;

            if config.no_filter {
                socket.set_filter_accept_all().map_err(interface_err)?;
            } else {
                socket
                    .set_filters(&[CanFilter::new(OBD_RESPONSE_ID_MIN, OBD_RESPONSE_MASK)])
                    .map_err(interface_err)?;
            }

            tracing::info!(
                interface = interface_name,
                bitrate = config.speed.bitrate(),
                extended = config.extended,
                loopback = config.loopback,
                no_filter = config.no_filter,
                "CAN interface opened"
            );

            Ok(Self {
                socket,
                interface_name: interface_name.to_string(),
            })
        }
    }

    fn to_socketcan(frame: &CanFrame) -> Option<socketcan::CanFrame> {
        let id: Id = if frame.extended {
            ExtendedId::new(frame.id)?.into()
        } else {
            StandardId::new(u16::try_from(frame.id).ok()?)?.into()
        };
        socketcan::CanFrame::new(id, &frame.data)
    }

    fn from_socketcan(frame: &socketcan::CanFrame) -> Option<CanFrame> {
        let socketcan::CanFrame::Data(data_frame) = frame else {
            return None;
        };
        let data = data_frame.data().to_vec();
        Some(match data_frame.id() {
            Id::Standard(id) => CanFrame::new(u32::from(id.as_raw()), data),
            Id::Extended(id) => CanFrame::extended(id.as_raw(), data),
        })
    }

    impl Transport for SocketCanTransport {
        fn try_send(&mut self, frame: &CanFrame) -> bool {
            let Some(raw) = to_socketcan(frame) else {
                tracing::warn!(id = frame.id, len = frame.data.len(), "frame not representable on CAN");
                return false;
            };
            match self.socket.write_frame(&raw) {
                Ok(()) => true,
                Err(e) if e.kind() == ErrorKind::WouldBlock => false,
                Err(e) => {
                    tracing::warn!(error = %e, interface = %self.interface_name, "CAN write failed");
                    false
                }
            }
        }

        fn try_receive(&mut self) -> Option<CanFrame> {
            match self.socket.read_frame() {
                Ok(raw) => from_socketcan(&raw),
                Err(e) if e.kind() == ErrorKind::WouldBlock => None,
                Err(e) => {
                    tracing::warn!(error = %e, interface = %self.interface_name, "CAN read failed");
                    None
                }
            }
        }
    }
}
