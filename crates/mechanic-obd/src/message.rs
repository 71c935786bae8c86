//! The OBD-II diagnostic message: a beautified view of a single CAN frame.
//!
//! Wire layout of the frame payload: `[length, mode, pid, v0 .. v3, padding]`
//! where `length` counts mode + pid + value bytes.

use std::fmt;

use crate::error::{ObdError, ObdResult};
use crate::types::{
    CAN_MAX_DLC, CanFrame, MODE_CURRENT_DATA, OBD_BROADCAST_ADDRESS, PHYSICAL_RESPONSE_OFFSET,
    is_obd_response,
};

/// Number of value bytes a single-frame message can carry.
pub const MAX_VALUES: usize = 4;

/// Smallest valid `length`: mode + pid.
pub const MIN_LENGTH: u8 = 2;

/// Largest valid `length`: mode + pid + four value bytes.
pub const MAX_LENGTH: u8 = 2 + MAX_VALUES as u8;

/// A message going through the OBD interface.
///
/// Only the first `length - 2` entries of `values` are meaningful; equality
/// ignores the rest.
#[derive(Debug, Clone, Copy, Eq)]
pub struct ObdMessage {
    /// Address of the ECU we are talking to.
    pub address: u16,
    /// Length of the message including the two bytes for mode and PID.
    pub length: u8,
    /// Request/response mode.
    pub mode: u8,
    /// Parameter ID.
    pub pid: u8,
    /// Value payload.
    pub values: [u8; MAX_VALUES],
}

impl Default for ObdMessage {
    fn default() -> Self {
        Self {
            address: OBD_BROADCAST_ADDRESS,
            length: 0,
            mode: MODE_CURRENT_DATA,
            pid: 0,
            values: [0; MAX_VALUES],
        }
    }
}

impl PartialEq for ObdMessage {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
            && self.length == other.length
            && self.mode == other.mode
            && self.pid == other.pid
            && self.data() == other.data()
    }
}

impl ObdMessage {
    /// A broadcast request for `mode`/`pid` with no value bytes.
    pub fn request(mode: u8, pid: u8) -> Self {
        Self {
            length: MIN_LENGTH,
            mode,
            pid,
            ..Self::default()
        }
    }

    /// Reset every field to its default so the message can be reused.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Number of defined value bytes.
    pub fn value_count(&self) -> usize {
        usize::from(self.length.saturating_sub(MIN_LENGTH)).min(MAX_VALUES)
    }

    /// The defined value bytes.
    pub fn data(&self) -> &[u8] {
        &self.values[..self.value_count()]
    }

    /// Whether a frame from `address` answers this request.
    ///
    /// A broadcast request is answered by any ECU in the response range; a
    /// physical request only by the addressed ECU. Mode and PID are not
    /// compared.
    pub fn is_response_address(&self, address: u16) -> bool {
        if self.address == OBD_BROADCAST_ADDRESS {
            is_obd_response(u32::from(address))
        } else {
            address == self.address.wrapping_add(PHYSICAL_RESPONSE_OFFSET)
        }
    }

    /// Canonical text form: `ADDR L MO PI V0 V1 V2 V3`, all hex.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Map the first value byte linearly from `[0, 255]` onto `[min, max]`.
    pub fn decode_linear(&self, min: f32, max: f32) -> f32 {
        min + (max - min) * f32::from(self.values[0]) / 255.0
    }

    /// Encode into a padded 8-byte CAN frame.
    pub fn encode(&self, extended: bool) -> CanFrame {
        let mut data = vec![0u8; CAN_MAX_DLC];
        data[0] = self.length;
        data[1] = self.mode;
        data[2] = self.pid;
        let n = self.value_count();
        data[3..3 + n].copy_from_slice(&self.values[..n]);

        if extended {
            CanFrame::extended(u32::from(self.address), data)
        } else {
            CanFrame::new(u32::from(self.address), data)
        }
    }

    /// Decode a CAN frame, rejecting anything that is not a single-frame
    /// OBD-II message.
    pub fn decode(frame: &CanFrame) -> ObdResult<Self> {
        let address = u16::try_from(frame.id).map_err(|_| {
            ObdError::MalformedFrame(format!("id 0x{:X} exceeds 16 bits", frame.id))
        })?;

        let Some(&length) = frame.data.first() else {
            return Err(ObdError::MalformedFrame("empty payload".into()));
        };
        if !(MIN_LENGTH..=MAX_LENGTH).contains(&length) {
            return Err(ObdError::MalformedFrame(format!(
                "length byte 0x{length:02X} outside {MIN_LENGTH}..={MAX_LENGTH}"
            )));
        }
        if frame.data.len() < 1 + usize::from(length) {
            return Err(ObdError::MalformedFrame(format!(
                "length byte {length} but only {} payload bytes",
                frame.data.len()
            )));
        }

        let n = usize::from(length - MIN_LENGTH);
        let mut values = [0u8; MAX_VALUES];
        values[..n].copy_from_slice(&frame.data[3..3 + n]);

        Ok(Self {
            address,
            length,
            mode: frame.data[1],
            pid: frame.data[2],
            values,
        })
    }
}

impl fmt::Display for ObdMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:X} {:X} {:X} {:X}",
            self.address, self.length, self.mode, self.pid
        )?;
        for value in self.data() {
            write!(f, " {value:X}")?;
        }
        Ok(())
    }
}
