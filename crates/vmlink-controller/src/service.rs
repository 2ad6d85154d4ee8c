//! Async runner for the link controller.
//!
//! [`LinkService`] moves a [`Controller`] onto a tokio task and drives it.
//! Callers talk to the task through a [`LinkHandle`]: operations go over a
//! request channel and are answered with an immediate accept/reject, outcome
//! events come back on a bounded event channel.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  Request + oneshot   ┌──────────────────────────┐
//! │ LinkHandle │─────────────────────►│ link task                │
//! │            │                      │  select! {               │
//! │            │      LinkEvent       │    request               │
//! │   recv()   │◄─────────────────────│    poll tick → read      │
//! └────────────┘    (bounded mpsc)    │    deadline  → timeout   │
//!                                     │  }                       │
//!                                     └──────────────────────────┘
//! ```
//!
//! Each loop iteration runs exactly one branch, so a reply and a deadline
//! falling due together are never both handled for the same exchange.
//!
//! The blocking compressor exchange sleeps between transport polls, so the
//! task hands the controller to [`tokio::task::spawn_blocking`] for its
//! duration. This works on both runtime flavors; requests arriving meanwhile
//! queue up and are served once the exchange returns.
//!
//! # Examples
//!
//! ```no_run
//! use vmlink_controller::{ControllerConfig, LinkService};
//! use vmlink_hardware::{SerialSettings, SerialTransport};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let transport = SerialTransport::open(&SerialSettings::new("/dev/ttyUSB0"))?;
//!     let mut link = LinkService::spawn(transport, ControllerConfig::default())?;
//!
//!     link.get_firmware_info().await?;
//!     if let Some(event) = link.recv().await {
//!         println!("{event:?}");
//!     }
//!
//!     link.shutdown().await?;
//!     Ok(())
//! }
//! ```

use crate::config::ControllerConfig;
use crate::controller::Controller;
use crate::events::LinkEvent;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use vmlink_core::{ControlState, Error, Result};
use vmlink_hardware::Transport;
use vmlink_protocol::Operation;

type Reply<T> = oneshot::Sender<Result<T>>;
type LinkController<T> = Controller<T, mpsc::Sender<LinkEvent>>;

/// Request sent from a [`LinkHandle`] to the link task.
#[derive(Debug)]
enum Request {
    Issue { op: Operation, reply: Reply<()> },
    CompressorBlocking { on: bool, reply: Reply<bool> },
    ClearFault { reply: Reply<()> },
    SetReceiveTimeout { timeout: Duration, reply: Reply<()> },
    Status { reply: oneshot::Sender<LinkStatus> },
}

/// Snapshot of the controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatus {
    pub state: ControlState,
    pub expected_response_len: Option<usize>,
    pub firmware_retry_count: u32,
    pub dispense_retry_count: u32,
}

/// Spawns the link task.
pub struct LinkService;

impl LinkService {
    /// Start driving a controller over `transport` on a tokio task.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration does not validate.
    pub fn spawn<T>(transport: T, config: ControllerConfig) -> Result<LinkHandle<T>>
    where
        T: Transport + 'static,
    {
        config.validate()?;
        let service = config.service.clone();
        let (event_tx, event_rx) = mpsc::channel(service.event_capacity);
        let (request_tx, request_rx) = mpsc::channel(service.request_capacity);

        let controller = Controller::with_config(transport, event_tx, config)?;
        let task = tokio::spawn(Self::run(controller, request_rx, service.poll_interval));
        info!(
            poll_interval_ms = service.poll_interval.as_millis() as u64,
            "Link service started"
        );

        Ok(LinkHandle {
            requests: request_tx,
            events: event_rx,
            task,
        })
    }

    async fn run<T: Transport + 'static>(
        mut controller: LinkController<T>,
        mut requests: mpsc::Receiver<Request>,
        poll_interval: Duration,
    ) -> Option<T> {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = controller.next_deadline();

            tokio::select! {
                biased;

                request = requests.recv() => match request {
                    Some(request) => controller = Self::dispatch(controller, request).await?,
                    None => break,
                },

                _ = ticker.tick() => {
                    if let Err(e) = controller.on_ready_read() {
                        warn!(error = %e, "Failed to read from transport");
                    }
                }

                () = wait_until(deadline) => {
                    if let Err(e) = controller.poll_timeout() {
                        warn!(error = %e, "Failed to handle reply timeout");
                    }
                }
            }
        }

        debug!(state = %controller.state(), "Link service stopped");
        Some(controller.into_parts().0)
    }

    /// Run the blocking exchange on the blocking thread pool.
    ///
    /// Returns `None` if the exchange panicked and took the controller with it.
    async fn compressor_blocking<T: Transport + 'static>(
        mut controller: LinkController<T>,
        on: bool,
        reply: Reply<bool>,
    ) -> Option<LinkController<T>> {
        let joined = tokio::task::spawn_blocking(move || {
            let result = controller.set_compressor_blocking(on);
            (controller, result)
        })
        .await;

        match joined {
            Ok((controller, result)) => {
                let _ = reply.send(result);
                Some(controller)
            }
            Err(e) => {
                error!(error = %e, "Blocking compressor exchange failed, stopping link");
                None
            }
        }
    }

    async fn dispatch<T: Transport + 'static>(
        mut controller: LinkController<T>,
        request: Request,
    ) -> Option<LinkController<T>> {
        // A dropped reply receiver only means the caller stopped waiting.
        match request {
            Request::Issue { op, reply } => {
                let _ = reply.send(controller.issue(op));
            }
            Request::CompressorBlocking { on, reply } => {
                return Self::compressor_blocking(controller, on, reply).await;
            }
            Request::ClearFault { reply } => {
                let _ = reply.send(controller.clear_fault());
            }
            Request::SetReceiveTimeout { timeout, reply } => {
                let _ = reply.send(controller.set_receive_timeout(timeout));
            }
            Request::Status { reply } => {
                let _ = reply.send(LinkStatus {
                    state: controller.state(),
                    expected_response_len: controller.expected_response_len(),
                    firmware_retry_count: controller.firmware_retry_count(),
                    dispense_retry_count: controller.dispense_retry_count(),
                });
            }
        }
        Some(controller)
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Handle for talking to a running link task.
///
/// Operations return as soon as the controller accepted or rejected them;
/// their outcomes arrive through [`LinkHandle::recv`].
pub struct LinkHandle<T> {
    requests: mpsc::Sender<Request>,
    events: mpsc::Receiver<LinkEvent>,
    task: JoinHandle<Option<T>>,
}

impl<T> LinkHandle<T> {
    /// Receive the next outcome event.
    ///
    /// Events are buffered up to `event_capacity`. While the buffer is full
    /// new events are dropped with a warning, final ones included, so a
    /// reader that falls behind should confirm the outcome with
    /// [`LinkHandle::status`] before acting on a missing event.
    ///
    /// Returns `None` once the link task has stopped.
    pub async fn recv(&mut self) -> Option<LinkEvent> {
        self.events.recv().await
    }

    /// Receive an event if one is ready.
    pub fn try_recv(&mut self) -> Option<LinkEvent> {
        self.events.try_recv().ok()
    }

    pub async fn get_firmware_info(&self) -> Result<()> {
        self.issue(Operation::FirmwareInfo).await
    }

    pub async fn get_temperature_status(&self) -> Result<()> {
        self.issue(Operation::TemperatureStatus).await
    }

    pub async fn set_compressor(&self, on: bool) -> Result<()> {
        self.issue(Operation::Compressor { on }).await
    }

    pub async fn set_door(&self, index: u8, on: bool) -> Result<()> {
        self.issue(Operation::Door { index, on }).await
    }

    pub async fn dispense_single(&self, row: u8, col: u8) -> Result<()> {
        self.issue(Operation::DispenseSingle { row, col }).await
    }

    pub async fn dispense_combo(&self, row1: u8, col1: u8, row2: u8, col2: u8) -> Result<()> {
        self.issue(Operation::DispenseCombo {
            row1,
            col1,
            row2,
            col2,
        })
        .await
    }

    pub async fn dispense_retry(&self) -> Result<()> {
        self.issue(Operation::DispenseRetry).await
    }

    pub async fn check_cargo(&self) -> Result<()> {
        self.issue(Operation::CargoCheck).await
    }

    pub async fn check_door(&self) -> Result<()> {
        self.issue(Operation::DoorCheck).await
    }

    /// Issue any operation.
    pub async fn issue(&self, op: Operation) -> Result<()> {
        self.call(|reply| Request::Issue { op, reply }).await?
    }

    /// Switch the compressor with the blocking exchange.
    ///
    /// The exchange runs on the blocking thread pool and takes up to the
    /// first wait plus the poll budget (about 6 s with the defaults). Other
    /// requests wait until it returns; the runtime itself stays responsive.
    pub async fn set_compressor_blocking(&self, on: bool) -> Result<bool> {
        self.call(|reply| Request::CompressorBlocking { on, reply })
            .await?
    }

    pub async fn clear_fault(&self) -> Result<()> {
        self.call(|reply| Request::ClearFault { reply }).await?
    }

    pub async fn set_receive_timeout(&self, timeout: Duration) -> Result<()> {
        self.call(|reply| Request::SetReceiveTimeout { timeout, reply })
            .await?
    }

    /// Current controller status.
    pub async fn status(&self) -> Result<LinkStatus> {
        self.call(|reply| Request::Status { reply }).await
    }

    /// Current control state.
    pub async fn state(&self) -> Result<ControlState> {
        Ok(self.status().await?.state)
    }

    /// Stop the link task and take the transport back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceStopped`] if the task did not end cleanly.
    pub async fn shutdown(self) -> Result<T> {
        let Self {
            requests,
            events,
            task,
        } = self;
        drop(requests);
        drop(events);

        match task.await {
            Ok(Some(transport)) => Ok(transport),
            Ok(None) => Err(Error::ServiceStopped),
            Err(e) => {
                warn!(error = %e, "Link task ended abnormally");
                Err(Error::ServiceStopped)
            }
        }
    }

    async fn call<R>(&self, request: impl FnOnce(oneshot::Sender<R>) -> Request) -> Result<R> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(request(reply_tx))
            .await
            .map_err(|_| Error::ServiceStopped)?;
        reply_rx.await.map_err(|_| Error::ServiceStopped)
    }
}
