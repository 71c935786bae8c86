//! Mock CAN transport for testing.
//!
//! Supports scripted inbound queues, delayed frames on the tokio clock, a
//! responder closure that plays the ECU, busy simulation, loopback and frame
//! recording. All tests use this instead of real CAN hardware so the suite
//! runs in CI on any platform.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::transport::Transport;
use crate::types::CanFrame;

/// Produces the frames an ECU would answer to one sent frame.
pub type Responder = Box<dyn FnMut(&CanFrame) -> Vec<CanFrame> + Send>;

/// Mock CAN transport with scripted frames and frame recording.
#[derive(Default)]
pub struct MockTransport {
    /// Frames returned by `try_receive` (FIFO order).
    inbound: VecDeque<CanFrame>,
    /// Frames that become receivable once the tokio clock reaches their instant.
    scheduled: Vec<(Instant, CanFrame)>,
    /// All frames accepted by `try_send` (for test assertions).
    sent: Vec<CanFrame>,
    /// Number of upcoming sends to reject as busy.
    busy_sends: usize,
    /// Reflect every sent frame back into the inbound queue.
    loopback: bool,
    responder: Option<Responder>,
}

impl MockTransport {
    /// Create a new mock with no queued frames.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock pre-loaded with inbound frames.
    pub fn with_frames(frames: Vec<CanFrame>) -> Self {
        Self {
            inbound: frames.into(),
            ..Self::default()
        }
    }

    /// Create a mock that answers every sent frame through `responder`.
    pub fn with_responder(
        responder: impl FnMut(&CanFrame) -> Vec<CanFrame> + Send + 'static,
    ) -> Self {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::default()
        }
    }

    /// Create a mock that reflects sent frames, like a controller in loopback mode.
    pub fn loopback() -> Self {
        Self {
            loopback: true,
            ..Self::default()
        }
    }

    /// Queue an additional inbound frame.
    pub fn queue_frame(&mut self, frame: CanFrame) {
        self.inbound.push_back(frame);
    }

    /// Make `frame` receivable `delay` from now on the tokio clock.
    pub fn queue_frame_after(&mut self, delay: Duration, frame: CanFrame) {
        self.scheduled.push((Instant::now() + delay, frame));
    }

    /// Reject the next `count` sends as busy.
    pub fn reject_sends(&mut self, count: usize) {
        self.busy_sends = count;
    }

    /// Copies of all frames that were sent.
    pub fn sent_frames(&self) -> Vec<CanFrame> {
        self.sent.clone()
    }

    /// The last sent frame, if any.
    pub fn last_sent(&self) -> Option<CanFrame> {
        self.sent.last().cloned()
    }

    /// Inbound frames not yet received.
    pub fn pending(&self) -> usize {
        self.inbound.len() + self.scheduled.len()
    }

    fn release_due(&mut self) {
        if self.scheduled.is_empty() {
            return;
        }
        let now = Instant::now();
        let (due, later): (Vec<_>, Vec<_>) =
            self.scheduled.drain(..).partition(|(at, _)| *at <= now);
        self.scheduled = later;

        let mut due = due;
        due.sort_by_key(|(at, _)| *at);
        self.inbound.extend(due.into_iter().map(|(_, frame)| frame));
    }
}

impl Transport for MockTransport {
    fn try_send(&mut self, frame: &CanFrame) -> bool {
        if self.busy_sends > 0 {
            self.busy_sends -= 1;
            return false;
        }

        self.sent.push(frame.clone());
        if self.loopback {
            self.inbound.push_back(frame.clone());
        }
        if let Some(responder) = self.responder.as_mut() {
            let replies = responder(frame);
            self.inbound.extend(replies);
        }
        true
    }

    fn try_receive(&mut self) -> Option<CanFrame> {
        self.release_due();
        self.inbound.pop_front()
    }
}
