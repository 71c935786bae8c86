//! ISO-TP style multi-frame ("long PID") reassembly.
//!
//! ```text
//! AwaitingFirstFrame ──FF──▶ AwaitingConsecutiveFrame(1) ──CF..──▶ Complete
//!         │ SF ─────────────────────────────────────────────────▶ Complete
//!         └── anything else / bad sequence / timeout ───────────▶ Failed
//! ```
//!
//! `MultiframeSession` is the pure state machine; `ObdInterface::exchange_multiframe`
//! drives it with the engine's send and receive primitives.

use std::time::Duration;

use crate::error::{ObdError, ObdResult};
use crate::exchange::ObdInterface;
use crate::message::ObdMessage;
use crate::transport::Transport;
use crate::types::{
    CanFrame, ISOTP_CF, ISOTP_FF, ISOTP_SF, MODE_VEHICLE_INFO, PHYSICAL_RESPONSE_OFFSET,
};

/// ISO-TP Flow Control frame: ContinueToSend, block_size=0, separation_time=0.
const FLOW_CONTROL_CTS: [u8; 8] = [0x30, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

/// Mode 09 PID carrying the vehicle identification number.
pub const PID_VIN: u8 = 0x02;

/// Characters in a VIN.
pub const VIN_LEN: usize = 17;

/// Where a reassembly session stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingFirstFrame,
    /// Waiting for the consecutive frame with this sequence number (0–15).
    AwaitingConsecutiveFrame(u8),
    Complete,
    Failed,
}

/// What the driver has to do after a frame was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// First frame taken; send flow control, then keep receiving.
    FlowControl,
    /// Keep receiving.
    Continue,
    /// Payload is complete.
    Complete,
}

/// State of one multi-frame response.
#[derive(Debug)]
pub struct MultiframeSession {
    mode: u8,
    pid: u8,
    state: SessionState,
    expected_len: usize,
    buffer: Vec<u8>,
}

impl MultiframeSession {
    pub fn new(mode: u8, pid: u8) -> Self {
        Self {
            mode,
            pid,
            state: SessionState::AwaitingFirstFrame,
            expected_len: 0,
            buffer: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Total length declared by the first frame.
    pub fn expected_len(&self) -> usize {
        self.expected_len
    }

    /// Bytes written so far.
    pub fn received(&self) -> usize {
        self.buffer.len()
    }

    /// Feed the next frame from the responding ECU.
    pub fn accept(&mut self, frame: &CanFrame) -> ObdResult<Progress> {
        match self.state {
            SessionState::AwaitingFirstFrame => self.accept_first(frame),
            SessionState::AwaitingConsecutiveFrame(seq) => self.accept_consecutive(frame, seq),
            SessionState::Complete | SessionState::Failed => {
                Err(ObdError::Reassembly("session already finished".into()))
            }
        }
    }

    /// The reassembled payload. Only available once the session is complete.
    pub fn into_payload(self) -> ObdResult<Vec<u8>> {
        match self.state {
            SessionState::Complete => Ok(self.buffer),
            state => Err(ObdError::Reassembly(format!(
                "payload requested in state {state:?}"
            ))),
        }
    }

    /// Abort the session, discarding partial data.
    pub fn fail(&mut self, reason: impl Into<String>) -> ObdError {
        self.state = SessionState::Failed;
        self.buffer.clear();
        ObdError::Reassembly(reason.into())
    }

    fn accept_first(&mut self, frame: &CanFrame) -> ObdResult<Progress> {
        match frame.pci_type() {
            Some(ISOTP_SF) => {
                let len = usize::from(frame.data[0] & 0x0F);
                if len == 0 || len + 1 > frame.data.len() {
                    return Err(self.fail(format!("invalid single frame length {len}")));
                }
                self.expected_len = len;
                self.buffer = frame.data[1..1 + len].to_vec();
                self.state = SessionState::Complete;
                Ok(Progress::Complete)
            }
            Some(ISOTP_FF) if frame.data.len() >= 2 => {
                let total = (usize::from(frame.data[0] & 0x0F) << 8) | usize::from(frame.data[1]);
                if total == 0 {
                    return Err(self.fail("first frame declares zero length"));
                }
                self.expected_len = total;
                self.buffer = Vec::with_capacity(total);
                let end = frame.data.len().min(2 + total);
                self.buffer.extend_from_slice(&frame.data[2..end]);

                tracing::debug!(
                    mode = self.mode,
                    pid = self.pid,
                    total,
                    first_chunk = self.buffer.len(),
                    "multi-frame response started"
                );

                if self.buffer.len() == total {
                    self.state = SessionState::Complete;
                    Ok(Progress::Complete)
                } else {
                    self.state = SessionState::AwaitingConsecutiveFrame(1);
                    Ok(Progress::FlowControl)
                }
            }
            other => Err(self.fail(format!(
                "expected first frame, got frame type {}",
                describe_pci(other)
            ))),
        }
    }

    fn accept_consecutive(&mut self, frame: &CanFrame, seq: u8) -> ObdResult<Progress> {
        let pci = frame.pci_type();
        if pci != Some(ISOTP_CF) {
            return Err(self.fail(format!(
                "expected consecutive frame {seq}, got frame type {}",
                describe_pci(pci)
            )));
        }

        let got = frame.data[0] & 0x0F;
        if got != seq {
            return Err(self.fail(format!("sequence mismatch: expected {seq}, got {got}")));
        }

        let remaining = self.expected_len - self.buffer.len();
        let end = frame.data.len().min(1 + remaining);
        if end <= 1 {
            return Err(self.fail(format!("consecutive frame {seq} carries no data")));
        }
        self.buffer.extend_from_slice(&frame.data[1..end]);

        if self.buffer.len() == self.expected_len {
            tracing::debug!(
                mode = self.mode,
                pid = self.pid,
                len = self.buffer.len(),
                "multi-frame response complete"
            );
            self.state = SessionState::Complete;
            Ok(Progress::Complete)
        } else {
            self.state = SessionState::AwaitingConsecutiveFrame((seq + 1) & 0x0F);
            Ok(Progress::Continue)
        }
    }
}

fn describe_pci(pci: Option<u8>) -> String {
    match pci {
        Some(t) => format!("0x{t:X}"),
        None => "empty".into(),
    }
}

impl<T: Transport> ObdInterface<T> {
    /// Send `request` and reassemble a response that may span several frames.
    ///
    /// `timeout` applies to each awaited frame. Timing out before the first
    /// frame is [`ObdError::Timeout`]; any failure after it is
    /// [`ObdError::Reassembly`] and no partial data is returned.
    pub async fn exchange_multiframe(
        &mut self,
        request: &ObdMessage,
        timeout: Duration,
    ) -> ObdResult<Vec<u8>> {
        let request = *request;
        self.send(&request)?;

        let mut session = MultiframeSession::new(request.mode, request.pid);
        let first = self
            .await_frame(timeout, |frame| {
                u16::try_from(frame.id).is_ok_and(|id| request.is_response_address(id))
            })
            .await?;
        let responder = first.id;

        let mut progress = session.accept(&first)?;
        loop {
            match progress {
                Progress::Complete => return session.into_payload(),
                Progress::FlowControl => {
                    let fc_id = responder.wrapping_sub(u32::from(PHYSICAL_RESPONSE_OFFSET));
                    let fc = if self.config().extended {
                        CanFrame::extended(fc_id, FLOW_CONTROL_CTS.to_vec())
                    } else {
                        CanFrame::new(fc_id, FLOW_CONTROL_CTS.to_vec())
                    };
                    if let Err(e) = self.send_frame(&fc) {
                        return Err(session.fail(format!("flow control not sent: {e}")));
                    }
                    tracing::debug!(fc_id, "flow control sent");
                }
                Progress::Continue => {}
            }

            let frame = match self.await_frame(timeout, |frame| frame.id == responder).await {
                Ok(frame) => frame,
                Err(e) => {
                    let reason = format!(
                        "{e} while awaiting {:?} ({} of {} bytes)",
                        session.state(),
                        session.received(),
                        session.expected_len()
                    );
                    return Err(session.fail(reason));
                }
            };
            progress = session.accept(&frame)?;
        }
    }

    /// Request `mode`/`pid` from the broadcast address and reassemble the
    /// response, including its SID and PID echo.
    pub async fn get_multiframe_pid(&mut self, mode: u8, pid: u8) -> ObdResult<Vec<u8>> {
        let timeout = self.config().query_timeout();
        self.exchange_multiframe(&ObdMessage::request(mode, pid), timeout)
            .await
    }

    /// Read the 17-character VIN via Mode 0x09 PID 0x02.
    pub async fn read_vin(&mut self) -> ObdResult<String> {
        let payload = self.get_multiframe_pid(MODE_VEHICLE_INFO, PID_VIN).await?;

        // [SID(0x49), PID(0x02), count(0x01)?, ...17 VIN chars]
        if payload.len() < 2 + VIN_LEN {
            return Err(ObdError::Decode(format!(
                "VIN response too short: {} bytes",
                payload.len()
            )));
        }
        let vin = &payload[payload.len() - VIN_LEN..];
        String::from_utf8(vin.to_vec())
            .map_err(|e| ObdError::Decode(format!("VIN not valid UTF-8: {e}")))
    }
}
