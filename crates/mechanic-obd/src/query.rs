//! Mode 01 value queries built on [`ObdInterface::exchange`].

use crate::error::{ObdError, ObdResult};
use crate::exchange::ObdInterface;
use crate::message::ObdMessage;
use crate::transport::Transport;
use crate::types::MODE_CURRENT_DATA;

/// PIDs 0x01–0x20 supported (bitmask).
pub const PID_SUPPORTED_01_20: u8 = 0x00;
/// Calculated engine load, 0–100 %.
pub const PID_ENGINE_LOAD: u8 = 0x04;
/// Engine coolant temperature, -40–215 °C.
pub const PID_COOLANT_TEMPERATURE: u8 = 0x05;
/// Engine RPM, two bytes in quarter revolutions.
pub const PID_ENGINE_RPM: u8 = 0x0C;
/// Vehicle speed, 0–255 km/h.
pub const PID_VEHICLE_SPEED: u8 = 0x0D;

/// Largest `N` accepted in a `{:.N}` placeholder.
pub const MAX_PRECISION: usize = 16;

impl<T: Transport> ObdInterface<T> {
    async fn query(&mut self, pid: u8) -> ObdResult<ObdMessage> {
        let timeout = self.config().query_timeout();
        self.exchange(&ObdMessage::request(MODE_CURRENT_DATA, pid), timeout)
            .await
    }

    /// Check the vehicle's support bitmask for `pid`.
    ///
    /// PID 0x00 is always supported. For any other PID this asks the
    /// bitmask PID of its block (0x00, 0x20, 0x40, ...).
    pub async fn is_pid_supported(&mut self, pid: u8) -> ObdResult<bool> {
        if pid == PID_SUPPORTED_01_20 {
            return Ok(true);
        }

        let offset = pid - 1;
        let block = offset & !0x1F;
        let response = self.query(block).await?;
        let data = response.data();
        if data.len() < 4 {
            return Err(ObdError::Decode(format!(
                "support bitmask for PID 0x{block:02X}: need 4 bytes, got {}",
                data.len()
            )));
        }

        let mask = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let bit = 31 - u32::from(offset - block);
        Ok(mask & (1 << bit) != 0)
    }

    /// Read `pid` as an unsigned integer: one byte as is, two or more as a
    /// big-endian word of the first two.
    pub async fn query_integer(&mut self, pid: u8) -> ObdResult<u16> {
        let response = self.query(pid).await?;
        match *response.data() {
            [] => Err(ObdError::Decode(format!("PID 0x{pid:02X}: no value bytes"))),
            [b] => Ok(u16::from(b)),
            [hi, lo, ..] => Ok(u16::from_be_bytes([hi, lo])),
        }
    }

    /// Read `pid` and map its first byte linearly onto `[min, max]`.
    pub async fn query_float(&mut self, pid: u8, min: f32, max: f32) -> ObdResult<f32> {
        let response = self.query(pid).await?;
        if response.data().is_empty() {
            return Err(ObdError::Decode(format!("PID 0x{pid:02X}: no value bytes")));
        }
        Ok(response.decode_linear(min, max))
    }

    /// [`query_float`](Self::query_float), rendered through `format`.
    pub async fn query_formatted_string(
        &mut self,
        pid: u8,
        min: f32,
        max: f32,
        format: &str,
    ) -> ObdResult<String> {
        let value = self.query_float(pid, min, max).await?;
        format_reading(format, value)
    }

    pub async fn engine_load(&mut self) -> ObdResult<f32> {
        self.query_float(PID_ENGINE_LOAD, 0.0, 100.0).await
    }

    pub async fn coolant_temperature(&mut self) -> ObdResult<f32> {
        self.query_float(PID_COOLANT_TEMPERATURE, -40.0, 215.0).await
    }

    pub async fn engine_rpm(&mut self) -> ObdResult<f32> {
        let quarters = self.query_integer(PID_ENGINE_RPM).await?;
        Ok(f32::from(quarters) / 4.0)
    }

    pub async fn vehicle_speed(&mut self) -> ObdResult<f32> {
        self.query_float(PID_VEHICLE_SPEED, 0.0, 255.0).await
    }
}

/// Substitute `value` into a template.
///
/// Placeholders are `{}` and `{:.N}` (N decimals, at most
/// [`MAX_PRECISION`]); `{{` and `}}` are literal braces.
pub fn format_reading(template: &str, value: f32) -> ObdResult<String> {
    let mut out = String::with_capacity(template.len() + 8);
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut placeholder = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => placeholder.push(ch),
                        None => {
                            return Err(ObdError::InvalidFormat(format!(
                                "unclosed placeholder in {template:?}"
                            )));
                        }
                    }
                }
                if placeholder.is_empty() {
                    out.push_str(&value.to_string());
                } else if let Some(precision) = placeholder.strip_prefix(":.") {
                    let precision: usize = precision
                        .parse()
                        .ok()
                        .filter(|p| *p <= MAX_PRECISION)
                        .ok_or_else(|| {
                            ObdError::InvalidFormat(format!(
                                "bad precision in {{{placeholder}}} (0..={MAX_PRECISION})"
                            ))
                        })?;
                    out.push_str(&format!("{value:.precision$}"));
                } else {
                    return Err(ObdError::InvalidFormat(format!(
                        "unsupported placeholder {{{placeholder}}}"
                    )));
                }
            }
            '}' => {
                return Err(ObdError::InvalidFormat(format!(
                    "unmatched '}}' in {template:?}"
                )));
            }
            c => out.push(c),
        }
    }
    Ok(out)
}
