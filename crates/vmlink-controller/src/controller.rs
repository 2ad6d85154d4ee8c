//! Hardware link controller.
//!
//! This module provides [`Controller`], the state machine that drives the
//! controller board over a [`Transport`]. It writes commands, waits for fixed
//! length replies under a deadline, classifies them and reports outcomes to an
//! [`EventSink`].
//!
//! # Driving the Controller
//!
//! The controller has no threads and no timers of its own. Its owner calls:
//!
//! - an operation ([`Controller::get_firmware_info`], [`Controller::dispense_single`], ...)
//!   to start an exchange; it is accepted or rejected immediately,
//! - [`Controller::on_ready_read`] whenever the transport may have new bytes,
//! - [`Controller::poll_timeout`] once [`Controller::next_deadline`] has passed.
//!
//! [`LinkService`](crate::LinkService) does this on a tokio task.
//!
//! # States
//!
//! ```text
//! Idle ── issue ──► Wait* ── reply ──► Idle
//!                     │
//!                     └── deadline ──► ErrorTimeout
//!
//! WaitDispenseOk → WaitDispenseOperating → WaitDispenseDone
//!     → WaitCargoCheck → WaitDoorCheck → Idle
//! ```
//!
//! Error and warning states are terminal. Only a dispense retry is accepted
//! there; anything else is rejected until [`Controller::clear_fault`].
//!
//! # Examples
//!
//! ```
//! use vmlink_controller::{Controller, LinkEvent};
//! use vmlink_core::ControlState;
//! use vmlink_hardware::MockTransport;
//!
//! let (transport, board) = MockTransport::new();
//! let mut controller = Controller::new(transport, Vec::new());
//!
//! controller.get_firmware_info().unwrap();
//! assert_eq!(controller.state(), ControlState::WaitFirmwareInfo);
//! assert_eq!(board.writes(), vec![b"VMIF\n".to_vec()]);
//!
//! board.inject(b"VMIF1.0.2");
//! controller.on_ready_read().unwrap();
//!
//! assert_eq!(controller.state(), ControlState::Idle);
//! assert_eq!(controller.sink(), &vec![LinkEvent::FirmwareInfo("VMIF1.0.2".into())]);
//! ```

use crate::config::{ControllerConfig, MAX_TIMEOUT};
use crate::events::{EventSink, LinkEvent};
use crate::exchange::PendingExchange;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};
use vmlink_core::{ControlState, Error, Result};
use vmlink_hardware::Transport;
use vmlink_protocol::{DeadlineAction, Operation, Outcome, classify};

/// Maximum number of state transitions kept for diagnostics.
///
/// A full dispense takes six transitions, so this covers the last dozen or
/// so operations.
const MAX_HISTORY_SIZE: usize = 100;

/// A single state transition with timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: ControlState,
    pub to: ControlState,
    pub timestamp: Instant,
}

/// State machine driving the controller board.
///
/// The controller owns the control state and the exchange in flight; the
/// transport and the sink are supplied by the caller and handed back by
/// [`Controller::into_parts`].
pub struct Controller<T, S> {
    transport: T,
    sink: S,
    config: ControllerConfig,
    state: ControlState,
    exchange: Option<PendingExchange>,
    firmware_retry_count: u32,
    dispense_retry_count: u32,
    notifications_enabled: bool,
    history: VecDeque<StateTransition>,
}

impl<T: Transport, S: EventSink> Controller<T, S> {
    /// Create a controller with the board's default timeouts.
    pub fn new(transport: T, sink: S) -> Self {
        Self::build(transport, sink, ControllerConfig::default())
    }

    /// Create a controller with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration does not validate.
    pub fn with_config(transport: T, sink: S, config: ControllerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(transport, sink, config))
    }

    fn build(transport: T, sink: S, config: ControllerConfig) -> Self {
        Self {
            transport,
            sink,
            config,
            state: ControlState::Idle,
            exchange: None,
            firmware_retry_count: 0,
            dispense_retry_count: 0,
            notifications_enabled: true,
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
        }
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    /// Exchange in flight, if the controller is waiting.
    pub fn pending(&self) -> Option<&PendingExchange> {
        self.exchange.as_ref()
    }

    /// Length of the awaited reply, if the controller is waiting.
    pub fn expected_response_len(&self) -> Option<usize> {
        self.exchange.as_ref().map(PendingExchange::expected_len)
    }

    /// Silent firmware information retries since the last request.
    pub fn firmware_retry_count(&self) -> u32 {
        self.firmware_retry_count
    }

    /// Dispense retries issued since the last dispense started.
    pub fn dispense_retry_count(&self) -> u32 {
        self.dispense_retry_count
    }

    /// Returns `false` while a blocking exchange holds the line.
    pub fn notifications_enabled(&self) -> bool {
        self.notifications_enabled
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Default reply timeout.
    pub fn receive_timeout(&self) -> Duration {
        self.config.timeouts.default_timeout
    }

    /// Override the default reply timeout.
    ///
    /// Applies to deadlines armed from now on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `timeout` is zero or longer
    /// than [`MAX_TIMEOUT`].
    pub fn set_receive_timeout(&mut self, timeout: Duration) -> Result<()> {
        if timeout.is_zero() {
            return Err(Error::InvalidArgument(
                "receive timeout must be positive".into(),
            ));
        }
        if timeout > MAX_TIMEOUT {
            return Err(Error::InvalidArgument(format!(
                "receive timeout must not exceed {}s",
                MAX_TIMEOUT.as_secs()
            )));
        }
        debug!(timeout_ms = timeout.as_millis() as u64, "Receive timeout changed");
        self.config.timeouts.default_timeout = timeout;
        Ok(())
    }

    /// Recent state transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Release the transport and the sink.
    pub fn into_parts(self) -> (T, S) {
        (self.transport, self.sink)
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Request firmware information (`VMIF`).
    pub fn get_firmware_info(&mut self) -> Result<()> {
        self.issue(Operation::FirmwareInfo)
    }

    /// Request the temperature panel (`TPAL`).
    pub fn get_temperature_status(&mut self) -> Result<()> {
        self.issue(Operation::TemperatureStatus)
    }

    /// Switch the compressor.
    pub fn set_compressor(&mut self, on: bool) -> Result<()> {
        self.issue(Operation::Compressor { on })
    }

    /// Switch a door valve.
    pub fn set_door(&mut self, index: u8, on: bool) -> Result<()> {
        self.issue(Operation::Door { index, on })
    }

    /// Dispense from a single slot.
    pub fn dispense_single(&mut self, row: u8, col: u8) -> Result<()> {
        self.issue(Operation::DispenseSingle { row, col })
    }

    /// Dispense from two slots at once.
    pub fn dispense_combo(&mut self, row1: u8, col1: u8, row2: u8, col2: u8) -> Result<()> {
        self.issue(Operation::DispenseCombo {
            row1,
            col1,
            row2,
            col2,
        })
    }

    /// Retry the last dispense. Also accepted from a terminal state.
    pub fn dispense_retry(&mut self) -> Result<()> {
        self.issue(Operation::DispenseRetry)
    }

    /// Ask the board whether the cargo reached the pickup bay.
    pub fn check_cargo(&mut self) -> Result<()> {
        self.issue(Operation::CargoCheck)
    }

    /// Ask the board whether the pickup door is closed.
    pub fn check_door(&mut self) -> Result<()> {
        self.issue(Operation::DoorCheck)
    }

    /// Write an operation and start waiting for its reply.
    ///
    /// # Errors
    ///
    /// - [`Error::Rejected`] if the current state does not accept `op`;
    ///   nothing is written.
    /// - [`Error::Transport`] if the write fails; the state is unchanged.
    pub fn issue(&mut self, op: Operation) -> Result<()> {
        self.ensure_accepted(op)?;

        let command = op.encode();
        self.transport.clear()?;
        self.transport.write(&command)?;
        debug!(op = %op, tx = %String::from_utf8_lossy(&command).trim_end(), "TX data");

        match op {
            Operation::FirmwareInfo => self.firmware_retry_count = 0,
            Operation::DispenseSingle { .. } | Operation::DispenseCombo { .. } => {
                self.dispense_retry_count = 0;
            }
            Operation::DispenseRetry => self.dispense_retry_count += 1,
            _ => {}
        }

        let now = Instant::now();
        let mut exchange = PendingExchange::new(op, command, now);
        exchange.arm(now + self.config.timeouts.duration(op.timeout_class()));
        self.exchange = Some(exchange);
        self.transition(op.waiting_state());
        Ok(())
    }

    /// Leave a terminal state.
    ///
    /// Does nothing when already idle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Rejected`] while an exchange is in flight.
    pub fn clear_fault(&mut self) -> Result<()> {
        if self.state.is_waiting() {
            warn!(state = %self.state, "Cannot clear fault while waiting");
            return Err(Error::Rejected { state: self.state });
        }
        if self.state.is_terminal() {
            info!(state = %self.state, "Fault cleared");
            self.enter(ControlState::Idle, DeadlineAction::Disarm);
        }
        Ok(())
    }

    fn ensure_accepted(&self, op: Operation) -> Result<()> {
        if op.accepted_in(self.state) {
            return Ok(());
        }
        warn!(op = %op, state = %self.state, "Operation rejected");
        Err(Error::Rejected { state: self.state })
    }

    // ------------------------------------------------------------------
    // Receive path
    // ------------------------------------------------------------------

    /// Handle new bytes on the transport.
    ///
    /// Nothing is read until the awaited reply is complete, so a partial
    /// frame is never classified. Bytes arriving while nothing is awaited
    /// are discarded. Does nothing while notifications are suppressed.
    pub fn on_ready_read(&mut self) -> Result<()> {
        if !self.notifications_enabled {
            return Ok(());
        }

        let available = self.transport.bytes_available()?;
        if available == 0 {
            return Ok(());
        }

        let Some(exchange) = self.exchange.as_ref() else {
            trace!(len = available, state = %self.state, "Discarding unsolicited bytes");
            self.transport.clear()?;
            return Ok(());
        };
        if !exchange.is_complete(available) {
            trace!(
                len = available,
                expected = exchange.expected_len(),
                "Waiting for complete frame"
            );
            return Ok(());
        }

        let frame = self.transport.read_all()?;
        self.handle_frame(&frame);
        self.transport.clear()?;
        Ok(())
    }

    fn handle_frame(&mut self, frame: &[u8]) -> Outcome {
        let state = self.state;
        let single_channel = self
            .exchange
            .as_ref()
            .is_none_or(PendingExchange::single_channel);
        debug!(rx = %String::from_utf8_lossy(frame), len = frame.len(), state = %state, "RX data");

        let verdict = classify(state, single_channel, frame);
        self.enter(verdict.next, verdict.deadline);

        let event = match &verdict.outcome {
            Outcome::FirmwareInfo(info) => Some(LinkEvent::FirmwareInfo(info.clone())),
            Outcome::TemperatureStatus(panel) => Some(LinkEvent::TemperatureStatus(panel.clone())),
            Outcome::CompressorAck(ok) => Some(LinkEvent::CompressorAck(*ok)),
            Outcome::DoorAck(ok) => Some(LinkEvent::DoorAck(*ok)),
            Outcome::Dispense { success } => {
                if *success {
                    info!(from = %state, to = %verdict.next, "Dispense phase complete");
                } else {
                    warn!(from = %state, to = %verdict.next, "Dispense phase failed");
                }
                Some(LinkEvent::DispensePhase {
                    success: *success,
                    state: verdict.next,
                })
            }
            Outcome::Pending => {
                debug!(state = %state, "Board busy, deadline re-armed");
                None
            }
            Outcome::Unsolicited => None,
        };

        if let Some(event) = event {
            self.sink.emit(event);
        }
        verdict.outcome
    }

    // ------------------------------------------------------------------
    // Deadlines
    // ------------------------------------------------------------------

    /// Deadline of the exchange in flight, if one is armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.exchange.as_ref().and_then(PendingExchange::deadline)
    }

    /// Fire the deadline if it has passed.
    ///
    /// Returns `true` if a deadline was handled.
    pub fn poll_timeout(&mut self) -> Result<bool> {
        self.poll_timeout_at(Instant::now())
    }

    /// Fire the deadline if it has passed at `now`.
    ///
    /// A firmware information request is silently rewritten while its retry
    /// budget lasts. Any other expiry reports [`LinkEvent::Timeout`] with the
    /// bytes buffered so far and ends in `ErrorTimeout`.
    pub fn poll_timeout_at(&mut self, now: Instant) -> Result<bool> {
        if !self.exchange.as_ref().is_some_and(|e| e.is_expired(now)) {
            return Ok(false);
        }
        self.on_timeout(now)?;
        Ok(true)
    }

    fn on_timeout(&mut self, now: Instant) -> Result<()> {
        let state = self.state;
        let timeouts = &self.config.timeouts;

        if state == ControlState::WaitFirmwareInfo
            && self.firmware_retry_count < timeouts.firmware_max_retries
            && let Some(exchange) = self.exchange.as_mut()
        {
            self.firmware_retry_count += 1;
            exchange.arm(now + timeouts.default_timeout);
            debug!(retry = self.firmware_retry_count, "Firmware info timeout, retrying");
            self.transport.write(exchange.command())?;
            return Ok(());
        }

        let buffered = match self.transport.read_all() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Failed to read buffered bytes");
                Vec::new()
            }
        };
        let message = format!("Timeout: {}", String::from_utf8_lossy(&buffered));
        warn!(state = %state, buffered = buffered.len(), "Reply timeout");

        self.enter(ControlState::ErrorTimeout, DeadlineAction::Disarm);
        self.sink.emit(LinkEvent::Timeout { message, state });
        self.transport.clear()?;
        Ok(())
    }

    fn arm_default_deadline(&mut self) {
        let deadline = Instant::now() + self.config.timeouts.default_timeout;
        if let Some(exchange) = self.exchange.as_mut() {
            exchange.arm(deadline);
        }
    }

    // ------------------------------------------------------------------
    // State bookkeeping
    // ------------------------------------------------------------------

    fn enter(&mut self, next: ControlState, deadline: DeadlineAction) {
        if next.is_waiting() {
            let now = Instant::now();
            let timeouts = &self.config.timeouts;
            if let Some(exchange) = self.exchange.as_mut() {
                exchange.expect(next);
                match deadline {
                    DeadlineAction::Arm(class) => exchange.arm(now + timeouts.duration(class)),
                    DeadlineAction::Disarm => exchange.disarm(),
                }
            }
        } else {
            self.exchange = None;
        }
        self.transition(next);
    }

    fn transition(&mut self, next: ControlState) {
        if next == self.state {
            return;
        }
        trace!(from = %self.state, to = %next, "State transition");

        if self.history.len() >= MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        self.history.push_back(StateTransition {
            from: self.state,
            to: next,
            timestamp: Instant::now(),
        });
        self.state = next;
    }

    // ------------------------------------------------------------------
    // Blocking exchange
    // ------------------------------------------------------------------

    /// Suppress [`Controller::on_ready_read`] until the guard is dropped.
    pub fn suppress_notifications(&mut self) -> NotificationGuard<'_, T, S> {
        let previous = self.notifications_enabled;
        self.notifications_enabled = false;
        NotificationGuard {
            controller: self,
            previous,
        }
    }

    /// Switch the compressor and block until the acknowledgement arrives.
    ///
    /// Waits up to the configured first wait for the reply to start, then
    /// polls at the configured interval until the full 6-byte reply is in or
    /// the poll budget runs out. Asynchronous handling is suppressed for the
    /// duration and restored on every exit.
    ///
    /// Returns the acknowledgement flag, which is also emitted as
    /// [`LinkEvent::CompressorAck`].
    ///
    /// # Errors
    ///
    /// - [`Error::Rejected`] if the controller is not idle.
    /// - [`Error::InvalidResponse`] if the reply length is not exactly
    ///   6 bytes once the budget is spent. The bytes read so far are dropped
    ///   and the exchange stays pending with the default deadline, so it ends
    ///   through the normal timeout path.
    pub fn set_compressor_blocking(&mut self, on: bool) -> Result<bool> {
        let op = Operation::Compressor { on };
        self.ensure_accepted(op)?;

        let expected = op.expected_response_len();
        let mut link = self.suppress_notifications();

        match link.exchange_blocking(op) {
            Ok(frame) if frame.len() == expected => {
                let outcome = link.handle_frame(&frame);
                link.transport.clear()?;
                Ok(matches!(outcome, Outcome::CompressorAck(true)))
            }
            Ok(frame) => {
                warn!(len = frame.len(), expected, "Blocking exchange length mismatch");
                link.arm_default_deadline();
                Err(Error::InvalidResponse(format!(
                    "expected {expected} bytes, got {}",
                    frame.len()
                )))
            }
            Err(e) => {
                link.arm_default_deadline();
                Err(e)
            }
        }
    }

    fn exchange_blocking(&mut self, op: Operation) -> Result<Vec<u8>> {
        let sync = self.config.sync_exchange.clone();
        let expected = op.expected_response_len();

        let command = op.encode();
        self.transport.clear()?;
        self.transport.write(&command)?;
        debug!(op = %op, "TX data (blocking)");

        self.exchange = Some(PendingExchange::new(op, command, Instant::now()));
        self.transition(op.waiting_state());

        let mut rx = Vec::with_capacity(expected);
        if self.transport.wait_for_ready_read(sync.first_wait)? {
            rx.extend(self.transport.read_all()?);
        }

        let mut polls = 0;
        while rx.len() < expected && polls < sync.poll_budget {
            polls += 1;
            if self.transport.wait_for_ready_read(sync.poll_interval)? {
                rx.extend(self.transport.read_all()?);
            }
        }

        trace!(len = rx.len(), polls, "Blocking exchange finished");
        Ok(rx)
    }
}

/// Scoped suppression of asynchronous reply handling.
///
/// Created by [`Controller::suppress_notifications`]. Dropping the guard
/// restores the previous setting, whichever way the scope is left.
pub struct NotificationGuard<'a, T, S> {
    controller: &'a mut Controller<T, S>,
    previous: bool,
}

impl<T, S> Deref for NotificationGuard<'_, T, S> {
    type Target = Controller<T, S>;

    fn deref(&self) -> &Self::Target {
        self.controller
    }
}

impl<T, S> DerefMut for NotificationGuard<'_, T, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.controller
    }
}

impl<T, S> Drop for NotificationGuard<'_, T, S> {
    fn drop(&mut self) {
        self.controller.notifications_enabled = self.previous;
    }
}
