//! Tests for the async link service.
//!
//! The runtime clock is paused so poll ticks and reply deadlines advance
//! instantly and deterministically.

use std::time::Duration;
use vmlink_controller::{ControllerConfig, LinkEvent, LinkService};
use vmlink_core::{ControlState, Error};
use vmlink_hardware::{MockTransport, MockTransportHandle, Transport};

/// Mock line whose blocking waits really sleep, like the serial transport.
struct SleepyTransport {
    inner: MockTransport,
    wait: Duration,
}

impl Transport for SleepyTransport {
    fn write(&mut self, bytes: &[u8]) -> vmlink_hardware::Result<()> {
        self.inner.write(bytes)
    }

    fn bytes_available(&mut self) -> vmlink_hardware::Result<usize> {
        self.inner.bytes_available()
    }

    fn read_all(&mut self) -> vmlink_hardware::Result<Vec<u8>> {
        self.inner.read_all()
    }

    fn clear(&mut self) -> vmlink_hardware::Result<()> {
        self.inner.clear()
    }

    fn wait_for_ready_read(&mut self, timeout: Duration) -> vmlink_hardware::Result<bool> {
        std::thread::sleep(self.wait);
        self.inner.wait_for_ready_read(timeout)
    }
}

fn spawn() -> (vmlink_controller::LinkHandle<MockTransport>, MockTransportHandle) {
    let (transport, board) = MockTransport::new();
    let link = LinkService::spawn(transport, ControllerConfig::default()).unwrap();
    (link, board)
}

#[tokio::test(start_paused = true)]
async fn test_firmware_reply_delivered() {
    let (mut link, board) = spawn();

    link.get_firmware_info().await.unwrap();
    assert_eq!(link.state().await.unwrap(), ControlState::WaitFirmwareInfo);
    assert_eq!(board.writes(), vec![b"VMIF\n".to_vec()]);

    board.inject(b"VMIF2.1.0");

    assert_eq!(
        link.recv().await,
        Some(LinkEvent::FirmwareInfo("VMIF2.1.0".into()))
    );
    assert_eq!(link.state().await.unwrap(), ControlState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_operation_rejected_while_waiting() {
    let (link, board) = spawn();

    link.get_temperature_status().await.unwrap();
    let err = link.set_compressor(true).await.unwrap_err();

    assert!(matches!(
        err,
        Error::Rejected {
            state: ControlState::WaitTemperatureInfo
        }
    ));
    assert_eq!(board.write_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_firmware_timeout_after_retries() {
    let (mut link, board) = spawn();

    link.get_firmware_info().await.unwrap();

    let event = link.recv().await.unwrap();
    assert_eq!(
        event,
        LinkEvent::Timeout {
            message: "Timeout: ".into(),
            state: ControlState::WaitFirmwareInfo,
        }
    );
    assert_eq!(board.write_count(), 11);

    let status = link.status().await.unwrap();
    assert_eq!(status.state, ControlState::ErrorTimeout);
    assert_eq!(status.firmware_retry_count, 10);
    assert_eq!(status.expected_response_len, None);
}

#[tokio::test(start_paused = true)]
async fn test_late_firmware_reply_after_retry() {
    let (mut link, board) = spawn();

    link.get_firmware_info().await.unwrap();
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(board.write_count(), 2);

    board.inject(b"VMIF1.0.0");
    assert_eq!(
        link.recv().await,
        Some(LinkEvent::FirmwareInfo("VMIF1.0.0".into()))
    );
}

#[tokio::test(start_paused = true)]
async fn test_dispense_sequence_and_fault_recovery() {
    let (mut link, board) = spawn();

    link.dispense_single(3, 4).await.unwrap();
    board.inject(b"CH34OK");
    assert_eq!(
        link.recv().await,
        Some(LinkEvent::DispensePhase {
            success: true,
            state: ControlState::WaitDispenseOperating,
        })
    );

    board.inject(b"CH34EE02");
    let event = link.recv().await.unwrap();
    assert_eq!(event.resulting_state(), ControlState::ErrorDrop);
    assert!(event.is_final());

    assert!(link.get_firmware_info().await.unwrap_err().is_rejected());
    link.clear_fault().await.unwrap();
    assert_eq!(link.state().await.unwrap(), ControlState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_blocking_compressor_through_service() {
    let (mut link, board) = spawn();
    board.script(b"CPOFOK");

    assert!(link.set_compressor_blocking(false).await.unwrap());
    assert_eq!(link.recv().await, Some(LinkEvent::CompressorAck(true)));
}

#[tokio::test]
async fn test_blocking_compressor_keeps_runtime_responsive() {
    let (inner, board) = MockTransport::new();
    let transport = SleepyTransport {
        inner,
        wait: Duration::from_millis(300),
    };
    let mut link = LinkService::spawn(transport, ControllerConfig::default()).unwrap();
    board.script(b"CPONOK");

    let mut exchange = Box::pin(link.set_compressor_blocking(true));

    // On this current-thread runtime the timer can only fire first if the
    // exchange is not sleeping on the runtime thread.
    let timer_first = tokio::select! {
        biased;
        result = &mut exchange => {
            result.unwrap();
            false
        }
        () = tokio::time::sleep(Duration::from_millis(50)) => true,
    };
    assert!(timer_first);

    assert!(exchange.await.unwrap());
    assert_eq!(link.recv().await, Some(LinkEvent::CompressorAck(true)));
    assert_eq!(link.state().await.unwrap(), ControlState::Idle);

    assert_eq!(board.writes(), vec![b"CPON\n".to_vec()]);
}

#[tokio::test(start_paused = true)]
async fn test_set_receive_timeout() {
    let (mut link, _board) = spawn();

    assert!(matches!(
        link.set_receive_timeout(Duration::ZERO).await,
        Err(Error::InvalidArgument(_))
    ));
    link.set_receive_timeout(Duration::from_secs(1)).await.unwrap();

    link.set_compressor(true).await.unwrap();
    let started = tokio::time::Instant::now();
    let event = link.recv().await.unwrap();

    assert!(matches!(event, LinkEvent::Timeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_oversized_receive_timeout_keeps_link_alive() {
    let (mut link, board) = spawn();

    assert!(matches!(
        link.set_receive_timeout(Duration::MAX).await,
        Err(Error::InvalidArgument(_))
    ));
    link.set_receive_timeout(vmlink_controller::MAX_TIMEOUT)
        .await
        .unwrap();

    link.get_firmware_info().await.unwrap();
    board.inject(b"VMIF2.1.0");
    assert_eq!(
        link.recv().await,
        Some(LinkEvent::FirmwareInfo("VMIF2.1.0".into()))
    );
    assert_eq!(link.state().await.unwrap(), ControlState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_full_event_buffer_keeps_outcome_in_status() {
    let (transport, board) = MockTransport::new();
    let mut config = ControllerConfig::default();
    config.service.event_capacity = 1;
    let mut link = LinkService::spawn(transport, config).unwrap();

    link.dispense_single(3, 4).await.unwrap();
    board.inject(b"CH34OK");
    tokio::time::sleep(Duration::from_millis(50)).await;
    board.inject(b"CH34EE02");
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The failure did not fit behind the unread phase event.
    let status = link.status().await.unwrap();
    assert_eq!(status.state, ControlState::ErrorDrop);
    assert_eq!(
        link.try_recv(),
        Some(LinkEvent::DispensePhase {
            success: true,
            state: ControlState::WaitDispenseOperating,
        })
    );
    assert_eq!(link.try_recv(), None);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_returns_transport() {
    let (link, board) = spawn();
    link.set_door(1, true).await.unwrap();

    let transport = link.shutdown().await.unwrap();

    drop(transport);
    assert_eq!(board.writes(), vec![b"C1ON\n".to_vec()]);
}

#[tokio::test]
async fn test_spawn_rejects_invalid_config() {
    let (transport, _board) = MockTransport::new();
    let mut config = ControllerConfig::default();
    config.service.event_capacity = 0;

    assert!(matches!(
        LinkService::spawn(transport, config),
        Err(Error::Config(_))
    ));
}
