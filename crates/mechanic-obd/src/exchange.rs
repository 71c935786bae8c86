//! Exchange engine: pairs an outgoing request with its response.
//!
//! `ObdInterface` owns its transport, so holding `&mut` to it is what allows
//! one exchange at a time per transport. The poll loop sleeps on the tokio
//! clock whenever the transport is empty, and yields to the runtime after
//! every few unrelated frames read back to back.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::InterfaceConfig;
use crate::error::{ObdError, ObdResult};
use crate::message::ObdMessage;
use crate::transport::Transport;
use crate::types::CanFrame;

/// Unrelated frames discarded in a row before the poll loop yields.
const DISCARDS_PER_YIELD: u32 = 16;

/// Talks OBD-II to the car through a [`Transport`].
pub struct ObdInterface<T: Transport> {
    transport: T,
    config: InterfaceConfig,
}

impl<T: Transport> ObdInterface<T> {
    pub fn new(transport: T, config: InterfaceConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &InterfaceConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Encode `message` into one frame and hand it to the transport.
    ///
    /// Single attempt: a busy transport is reported as [`ObdError::Send`].
    pub fn send(&mut self, message: &ObdMessage) -> ObdResult<()> {
        self.echo("send", message);
        let frame = message.encode(self.config.extended);
        self.send_frame(&frame)
    }

    /// Hand a raw frame to the transport, single attempt.
    pub fn send_frame(&mut self, frame: &CanFrame) -> ObdResult<()> {
        if self.transport.try_send(frame) {
            Ok(())
        } else {
            tracing::debug!(id = frame.id, "transport busy, frame not sent");
            Err(ObdError::Send { id: frame.id })
        }
    }

    /// Poll the transport once for a raw frame.
    pub fn receive_frame(&mut self) -> Option<CanFrame> {
        self.transport.try_receive()
    }

    /// Poll the transport once and decode whatever arrived.
    ///
    /// Frames that are not single-frame OBD-II messages are dropped here.
    pub fn receive_any(&mut self) -> Option<ObdMessage> {
        let frame = self.receive_frame()?;
        match ObdMessage::decode(&frame) {
            Ok(message) => {
                self.echo("recv", &message);
                Some(message)
            }
            Err(e) => {
                tracing::trace!(id = frame.id, error = %e, "dropping frame");
                None
            }
        }
    }

    /// Send `request` and wait for the message that answers it.
    ///
    /// Any message from a response address is the match, whatever its mode
    /// or PID. Everything else seen while waiting is discarded. Fails with
    /// [`ObdError::Timeout`] once more than `timeout` has elapsed.
    pub async fn exchange(
        &mut self,
        request: &ObdMessage,
        timeout: Duration,
    ) -> ObdResult<ObdMessage> {
        let request = *request;
        self.send(&request)?;

        let start = Instant::now();
        let mut discarded = 0;
        loop {
            if let Some(message) = self.receive_any() {
                if request.is_response_address(message.address) {
                    return Ok(message);
                }
                tracing::trace!(address = message.address, "skipping unrelated message");
                after_discard(start, timeout, &mut discarded).await?;
                continue;
            }
            if start.elapsed() > timeout {
                return Err(ObdError::timeout(timeout));
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    /// Wait for the next raw frame accepted by `accept`, discarding others.
    pub(crate) async fn await_frame(
        &mut self,
        timeout: Duration,
        accept: impl Fn(&CanFrame) -> bool,
    ) -> ObdResult<CanFrame> {
        let start = Instant::now();
        let mut discarded = 0;
        loop {
            if let Some(frame) = self.receive_frame() {
                if accept(&frame) {
                    return Ok(frame);
                }
                tracing::trace!(id = frame.id, "skipping unrelated frame");
                after_discard(start, timeout, &mut discarded).await?;
                continue;
            }
            if start.elapsed() > timeout {
                return Err(ObdError::timeout(timeout));
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    fn echo(&self, direction: &str, message: &ObdMessage) {
        if self.config.debug {
            tracing::info!(direction, message = %message, "obd traffic");
        } else {
            tracing::trace!(direction, message = %message, "obd traffic");
        }
    }
}

/// Deadline check and pacing after a frame was thrown away.
async fn after_discard(start: Instant, timeout: Duration, discarded: &mut u32) -> ObdResult<()> {
    if start.elapsed() > timeout {
        return Err(ObdError::timeout(timeout));
    }
    *discarded += 1;
    if *discarded % DISCARDS_PER_YIELD == 0 {
        tokio::task::yield_now().await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    fn physical_request(pid: u8) -> ObdMessage {
        let mut msg = ObdMessage::request(0x01, pid);
        msg.address = 0x7E0;
        msg
    }

    fn interface(mock: MockTransport) -> ObdInterface<MockTransport> {
        ObdInterface::new(mock, InterfaceConfig::default())
    }

    #[test]
    fn send_encodes_message() {
        let mut iface = interface(MockTransport::new());
        iface.send(&ObdMessage::request(0x01, 0x0C)).unwrap();

        let sent = iface.transport().last_sent().unwrap();
        assert_eq!(sent.id, 0x7DF);
        assert_eq!(sent.data, vec![0x02, 0x01, 0x0C, 0, 0, 0, 0, 0]);
        assert!(!sent.extended);
    }

    #[test]
    fn send_uses_extended_ids_when_configured() {
        let config = InterfaceConfig {
            extended: true,
            ..InterfaceConfig::default()
        };
        let mut iface = ObdInterface::new(MockTransport::new(), config);
        iface.send(&ObdMessage::request(0x01, 0x0C)).unwrap();
        assert!(iface.transport().last_sent().unwrap().extended);
    }

    #[test]
    fn send_reports_busy_transport() {
        let mut mock = MockTransport::new();
        mock.reject_sends(1);
        let mut iface = interface(mock);

        let result = iface.send(&ObdMessage::request(0x01, 0x0C));
        assert!(matches!(result, Err(ObdError::Send { id: 0x7DF })));
        assert!(iface.transport().sent_frames().is_empty());
    }

    #[test]
    fn receive_any_decodes_one_frame() {
        let mock = MockTransport::with_frames(vec![CanFrame::new(
            0x7E8,
            vec![0x03, 0x41, 0x0D, 0x3C, 0, 0, 0, 0],
        )]);
        let mut iface = interface(mock);

        let msg = iface.receive_any().unwrap();
        assert_eq!(msg.address, 0x7E8);
        assert_eq!(msg.mode, 0x41);
        assert_eq!(msg.pid, 0x0D);
        assert_eq!(msg.data(), &[0x3C]);
        assert!(iface.receive_any().is_none());
    }

    #[test]
    fn receive_any_drops_malformed() {
        let mock = MockTransport::with_frames(vec![CanFrame::new(0x7E8, vec![0x21, 0x41])]);
        let mut iface = interface(mock);
        assert!(iface.receive_any().is_none());
        assert_eq!(iface.transport().pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exchange_skips_unrelated_traffic() {
        let mock = MockTransport::with_frames(vec![
            CanFrame::new(0x700, vec![0x03, 0x41, 0x0D, 0x01, 0, 0, 0, 0]),
            CanFrame::new(0x7DF, vec![0x02, 0x01, 0x0D, 0, 0, 0, 0, 0]),
            CanFrame::new(0x7E8, vec![0x03, 0x41, 0x0D, 0x3C, 0, 0, 0, 0]),
        ]);
        let mut iface = interface(mock);

        let response = iface
            .exchange(&physical_request(0x0D), Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(response.address, 0x7E8);
        assert_eq!(response.data(), &[0x3C]);
        assert_eq!(iface.transport().pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exchange_skips_malformed_frames() {
        let mock = MockTransport::with_frames(vec![
            CanFrame::new(0x7E8, vec![0x10, 0x14, 0x49, 0x02, 0x01, 0x57, 0x44, 0x42]),
            CanFrame::new(0x7E8, vec![0x03, 0x41, 0x0D, 0x3C, 0, 0, 0, 0]),
        ]);
        let mut iface = interface(mock);

        let response = iface
            .exchange(&physical_request(0x0D), Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(response.pid, 0x0D);
    }

    #[tokio::test(start_paused = true)]
    async fn exchange_accepts_any_mode_and_pid_from_response_address() {
        let mock = MockTransport::with_frames(vec![CanFrame::new(
            0x7E8,
            vec![0x03, 0x7F, 0x01, 0x12, 0, 0, 0, 0],
        )]);
        let mut iface = interface(mock);

        let response = iface
            .exchange(&physical_request(0x0D), Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(response.mode, 0x7F);
        assert_eq!(response.pid, 0x01);
    }

    #[tokio::test(start_paused = true)]
    async fn exchange_waits_for_late_response() {
        let mut mock = MockTransport::new();
        mock.queue_frame_after(
            Duration::from_millis(40),
            CanFrame::new(0x7E8, vec![0x03, 0x41, 0x0D, 0x3C, 0, 0, 0, 0]),
        );
        let mut iface = interface(mock);

        let start = Instant::now();
        let response = iface
            .exchange(&physical_request(0x0D), Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(response.data(), &[0x3C]);
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn exchange_times_out() {
        let mut mock = MockTransport::with_frames(vec![CanFrame::new(
            0x7E9,
            vec![0x03, 0x41, 0x0D, 0x3C, 0, 0, 0, 0],
        )]);
        mock.queue_frame_after(
            Duration::from_millis(500),
            CanFrame::new(0x7E8, vec![0x03, 0x41, 0x0D, 0x3C, 0, 0, 0, 0]),
        );
        let mut iface = interface(mock);

        let result = iface
            .exchange(&physical_request(0x0D), Duration::from_millis(100))
            .await;
        assert!(matches!(result, Err(ObdError::Timeout { timeout_ms: 100 })));
    }

    #[tokio::test(start_paused = true)]
    async fn exchange_fails_fast_when_send_rejected() {
        let mut mock = MockTransport::with_frames(vec![CanFrame::new(
            0x7E8,
            vec![0x03, 0x41, 0x0D, 0x3C, 0, 0, 0, 0],
        )]);
        mock.reject_sends(1);
        let mut iface = interface(mock);

        let result = iface
            .exchange(&physical_request(0x0D), Duration::from_millis(100))
            .await;
        assert!(matches!(result, Err(ObdError::Send { .. })));
        assert_eq!(iface.transport().pending(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exchange_into_same_message() {
        let frames = || {
            vec![
                CanFrame::new(0x7DF, vec![0x02, 0x01, 0x0D, 0, 0, 0, 0, 0]),
                CanFrame::new(0x7E8, vec![0x03, 0x41, 0x0D, 0x3C, 0, 0, 0, 0]),
            ]
        };
        let timeout = Duration::from_millis(100);

        let mut separate = interface(MockTransport::with_frames(frames()));
        let request = physical_request(0x0D);
        let expected = separate.exchange(&request, timeout).await.unwrap();

        let mut shared = interface(MockTransport::with_frames(frames()));
        let mut msg = physical_request(0x0D);
        msg = shared.exchange(&msg, timeout).await.unwrap();

        assert_eq!(msg, expected);
        assert_eq!(
            separate.transport().sent_frames(),
            shared.transport().sent_frames()
        );
    }

    /// Bus that always has another frame from 0x700, with the ECU answer
    /// only after `answer_after` polls. Each poll takes 1ms of wall time.
    struct BusyBus {
        polls: u32,
        answer_after: u32,
    }

    impl Transport for BusyBus {
        fn try_send(&mut self, _frame: &CanFrame) -> bool {
            true
        }

        fn try_receive(&mut self) -> Option<CanFrame> {
            std::thread::sleep(Duration::from_millis(1));
            self.polls += 1;
            let id = if self.polls > self.answer_after { 0x7E8 } else { 0x700 };
            Some(CanFrame::new(id, vec![0x03, 0x41, 0x0D, 0x3C, 0, 0, 0, 0]))
        }
    }

    #[tokio::test]
    async fn exchange_times_out_on_busy_bus() {
        let bus = BusyBus {
            polls: 0,
            answer_after: 199,
        };
        let mut iface = ObdInterface::new(bus, InterfaceConfig::default());

        let start = Instant::now();
        let result = iface
            .exchange(&physical_request(0x0D), Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(ObdError::Timeout { timeout_ms: 20 })));
        assert!(start.elapsed() < Duration::from_millis(150));
        assert!(iface.transport().polls < 199);
    }

    #[tokio::test]
    async fn await_frame_times_out_on_busy_bus() {
        let bus = BusyBus {
            polls: 0,
            answer_after: u32::MAX,
        };
        let mut iface = ObdInterface::new(bus, InterfaceConfig::default());

        let result = iface
            .await_frame(Duration::from_millis(20), |frame| frame.id == 0x7E8)
            .await;
        assert!(matches!(result, Err(ObdError::Timeout { timeout_ms: 20 })));
    }

    #[tokio::test]
    async fn busy_bus_lets_other_tasks_run() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicBool, Ordering};

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        tokio::spawn(async move { flag.store(true, Ordering::SeqCst) });

        let bus = BusyBus {
            polls: 0,
            answer_after: u32::MAX,
        };
        let mut iface = ObdInterface::new(bus, InterfaceConfig::default());
        let result = iface
            .exchange(&physical_request(0x0D), Duration::from_millis(50))
            .await;

        assert!(result.is_err());
        // the busy loop never sleeps, so only its yields let the task run
        assert!(ran.load(Ordering::SeqCst));
    }
}
