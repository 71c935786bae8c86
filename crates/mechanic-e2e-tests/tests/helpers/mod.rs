//! Shared test harness: a simulated ECU on top of `MockTransport`.
//!
//! The ECU answers Mode 01 requests from a PID table as single frames and
//! Mode 09 PID 02 with a multi-frame VIN, sending its consecutive frames
//! only after flow control arrives. Optional bus noise is injected before
//! every reply.

#![allow(dead_code)]

use std::collections::HashMap;

use mechanic_obd::{CanFrame, InterfaceConfig, MockTransport, ObdInterface};

pub const ECU_RESPONSE_ID: u32 = 0x7E8;
pub const ECU_REQUEST_ID: u32 = 0x7E0;

/// Builder for a simulated engine ECU.
#[derive(Clone, Default)]
pub struct SimulatedEcu {
    pids: HashMap<u8, Vec<u8>>,
    vin: Option<String>,
    noise: Vec<CanFrame>,
    /// Sequence numbers to use for the consecutive frames instead of 1, 2, ...
    sequence_override: Option<Vec<u8>>,
}

impl SimulatedEcu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer Mode 01 `pid` with `data`.
    pub fn with_pid(mut self, pid: u8, data: &[u8]) -> Self {
        self.pids.insert(pid, data.to_vec());
        self
    }

    pub fn with_vin(mut self, vin: &str) -> Self {
        self.vin = Some(vin.to_string());
        self
    }

    /// Frames put on the bus before every reply.
    pub fn with_noise(mut self, frames: Vec<CanFrame>) -> Self {
        self.noise = frames;
        self
    }

    pub fn with_sequence_numbers(mut self, seqs: Vec<u8>) -> Self {
        self.sequence_override = Some(seqs);
        self
    }

    pub fn into_transport(self) -> MockTransport {
        let mut pending_cfs: Vec<CanFrame> = Vec::new();
        let ecu = self;

        MockTransport::with_responder(move |frame| {
            let mut out = ecu.noise.clone();

            // Flow control to our physical address releases the queued CFs.
            if frame.id == ECU_REQUEST_ID && frame.data.first() == Some(&0x30) {
                out.append(&mut pending_cfs);
                return out;
            }

            if frame.id != 0x7DF && frame.id != ECU_REQUEST_ID {
                return out;
            }
            let (mode, pid) = (frame.data[1], frame.data[2]);

            match (mode, pid) {
                (0x01, pid) => {
                    if let Some(data) = ecu.pids.get(&pid) {
                        let mut payload = vec![2 + data.len() as u8, 0x41, pid];
                        payload.extend_from_slice(data);
                        payload.resize(8, 0);
                        out.push(CanFrame::new(ECU_RESPONSE_ID, payload));
                    }
                }
                (0x09, 0x02) => {
                    if let Some(vin) = &ecu.vin {
                        let mut payload = vec![0x49, 0x02, 0x01];
                        payload.extend_from_slice(vin.as_bytes());
                        let (first, rest) = isotp_segments(&payload, ecu.sequence_override.as_deref());
                        out.push(first);
                        pending_cfs = rest;
                    }
                }
                _ => {}
            }
            out
        })
    }

    pub fn into_interface(self, config: InterfaceConfig) -> ObdInterface<MockTransport> {
        ObdInterface::new(self.into_transport(), config)
    }
}

/// Split `payload` into a first frame and consecutive frames.
pub fn isotp_segments(payload: &[u8], seqs: Option<&[u8]>) -> (CanFrame, Vec<CanFrame>) {
    let len = payload.len();
    let mut ff = vec![0x10 | ((len >> 8) as u8 & 0x0F), len as u8];
    ff.extend_from_slice(&payload[..6.min(len)]);
    let first = CanFrame::new(ECU_RESPONSE_ID, ff);

    let mut rest = Vec::new();
    for (i, chunk) in payload[6.min(len)..].chunks(7).enumerate() {
        let seq = match seqs {
            Some(s) => s[i],
            None => ((i + 1) & 0x0F) as u8,
        };
        let mut data = vec![0x20 | seq];
        data.extend_from_slice(chunk);
        rest.push(CanFrame::new(ECU_RESPONSE_ID, data));
    }
    (first, rest)
}

/// Config with a short query timeout so failing paths finish quickly.
pub fn fast_config() -> InterfaceConfig {
    InterfaceConfig {
        query_timeout_ms: 100,
        ..InterfaceConfig::default()
    }
}

/// Unrelated bus traffic: another node and a foreign broadcast request.
pub fn bus_noise() -> Vec<CanFrame> {
    vec![
        CanFrame::new(0x700, vec![0x03, 0x41, 0x0D, 0x01, 0, 0, 0, 0]),
        CanFrame::new(0x7DF, vec![0x02, 0x01, 0x0D, 0, 0, 0, 0, 0]),
    ]
}
