//! Raw CAN frame type and OBD-II / ISO-TP constants.

// ── OBD-II addressing ───────────────────────────────────────────

/// Standard OBD-II broadcast request address.
pub const OBD_BROADCAST_ADDRESS: u16 = 0x7DF;

/// First OBD-II response CAN ID (ECU #1).
pub const OBD_RESPONSE_ID_MIN: u32 = 0x7E8;

/// Last OBD-II response CAN ID (ECU #8).
pub const OBD_RESPONSE_ID_MAX: u32 = 0x7EF;

/// Offset from a physical request address (0x7E0..0x7E7) to the address
/// the addressed ECU answers from.
pub const PHYSICAL_RESPONSE_OFFSET: u16 = 0x08;

// ── OBD-II modes ────────────────────────────────────────────────

/// Mode 01: Show current data (live PIDs).
pub const MODE_CURRENT_DATA: u8 = 0x01;

/// Mode 09: Request vehicle information (VIN, etc.).
pub const MODE_VEHICLE_INFO: u8 = 0x09;

// ── ISO-TP frame type nibbles (upper nibble of byte 0) ────────

/// Single Frame.
pub const ISOTP_SF: u8 = 0x0;
/// First Frame.
pub const ISOTP_FF: u8 = 0x1;
/// Consecutive Frame.
pub const ISOTP_CF: u8 = 0x2;
/// Flow Control.
pub const ISOTP_FC: u8 = 0x3;

/// Maximum payload of a classic CAN frame.
pub const CAN_MAX_DLC: usize = 8;

// ── CAN Frame ───────────────────────────────────────────────────

/// A raw CAN 2.0 frame as handed to and from a [`Transport`](crate::Transport).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    /// CAN arbitration ID (11-bit standard or 29-bit extended).
    pub id: u32,
    /// Data payload (0–8 bytes).
    pub data: Vec<u8>,
    /// Whether `id` is a 29-bit extended identifier.
    pub extended: bool,
}

impl CanFrame {
    /// Build a standard (11-bit) frame.
    pub fn new(id: u32, data: Vec<u8>) -> Self {
        Self {
            id,
            data,
            extended: false,
        }
    }

    /// Build an extended (29-bit) frame.
    pub fn extended(id: u32, data: Vec<u8>) -> Self {
        Self {
            id,
            data,
            extended: true,
        }
    }

    /// ISO-TP frame type from the upper nibble of the first byte.
    pub fn pci_type(&self) -> Option<u8> {
        self.data.first().map(|b| (b >> 4) & 0x0F)
    }
}

/// Check if a CAN ID is an OBD-II response (0x7E8–0x7EF).
pub fn is_obd_response(id: u32) -> bool {
    (OBD_RESPONSE_ID_MIN..=OBD_RESPONSE_ID_MAX).contains(&id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn obd_response_id_range() {
        assert!(is_obd_response(0x7E8));
        assert!(is_obd_response(0x7EF));
        assert!(!is_obd_response(0x7E7));
        assert!(!is_obd_response(0x7F0));
        assert!(!is_obd_response(0x7DF)); // request ID, not response
    }

    #[test]
    fn pci_type_nibble() {
        assert_eq!(CanFrame::new(0x7E8, vec![0x10, 0x14]).pci_type(), Some(ISOTP_FF));
        assert_eq!(CanFrame::new(0x7E8, vec![0x21]).pci_type(), Some(ISOTP_CF));
        assert_eq!(CanFrame::new(0x7E8, vec![]).pci_type(), None);
    }

    #[test]
    fn extended_constructor_sets_flag() {
        assert!(CanFrame::extended(0x18DB33F1, vec![]).extended);
        assert!(!CanFrame::new(0x7DF, vec![]).extended);
    }
}
