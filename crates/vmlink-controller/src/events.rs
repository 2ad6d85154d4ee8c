//! Outcome events and the sinks that receive them.
//!
//! The controller reports every outcome synchronously, from inside the call
//! that produced it, to an [`EventSink`] supplied at construction. Sinks must
//! not block: the controller is in the middle of a transition when it emits.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;
use vmlink_core::ControlState;

/// Asynchronous outcome of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkEvent {
    /// No complete reply arrived in time. `state` is the waiting state that
    /// expired and `message` carries whatever bytes were buffered.
    Timeout { message: String, state: ControlState },

    /// Firmware information reply.
    FirmwareInfo(String),

    /// Temperature panel reply.
    TemperatureStatus(String),

    /// Compressor switch acknowledgement.
    CompressorAck(bool),

    /// Door switch acknowledgement.
    DoorAck(bool),

    /// A dispense phase finished; `state` is the state it led to.
    DispensePhase { success: bool, state: ControlState },
}

impl LinkEvent {
    /// State the controller is in right after emitting this event.
    pub fn resulting_state(&self) -> ControlState {
        match self {
            Self::Timeout { .. } => ControlState::ErrorTimeout,
            Self::DispensePhase { state, .. } => *state,
            _ => ControlState::Idle,
        }
    }

    /// Returns `true` if the operation needs no further replies.
    pub fn is_final(&self) -> bool {
        !self.resulting_state().is_waiting()
    }
}

/// Receiver of controller events.
pub trait EventSink {
    fn emit(&mut self, event: LinkEvent);
}

/// Collects events in memory.
impl EventSink for Vec<LinkEvent> {
    fn emit(&mut self, event: LinkEvent) {
        self.push(event);
    }
}

impl EventSink for mpsc::UnboundedSender<LinkEvent> {
    fn emit(&mut self, event: LinkEvent) {
        if self.send(event).is_err() {
            warn!("Event receiver dropped");
        }
    }
}

/// Bounded channel sink. An event that does not fit is dropped with a warning.
///
/// This includes final events, so a slow reader can miss the outcome of an
/// operation. The controller state still reflects it.
impl EventSink for mpsc::Sender<LinkEvent> {
    fn emit(&mut self, event: LinkEvent) {
        match self.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(?event, "Event channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Event receiver dropped");
            }
        }
    }
}

/// Discards every event.
impl EventSink for () {
    fn emit(&mut self, _event: LinkEvent) {}
}

/// Sink that forwards events to a closure.
///
/// ```
/// use vmlink_controller::{EventSink, FnSink, LinkEvent};
///
/// let mut count = 0;
/// let mut sink = FnSink(|_event: LinkEvent| count += 1);
/// sink.emit(LinkEvent::CompressorAck(true));
/// drop(sink);
/// assert_eq!(count, 1);
/// ```
pub struct FnSink<F>(pub F);

impl<F: FnMut(LinkEvent)> EventSink for FnSink<F> {
    fn emit(&mut self, event: LinkEvent) {
        (self.0)(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn emit(&mut self, event: LinkEvent) {
        (**self).emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resulting_state() {
        let event = LinkEvent::Timeout {
            message: "Timeout: ".into(),
            state: ControlState::WaitFirmwareInfo,
        };
        assert_eq!(event.resulting_state(), ControlState::ErrorTimeout);
        assert!(event.is_final());

        let event = LinkEvent::DispensePhase {
            success: true,
            state: ControlState::WaitDispenseOperating,
        };
        assert!(!event.is_final());

        assert!(LinkEvent::FirmwareInfo("VMIF1.0.0".into()).is_final());
    }

    #[tokio::test]
    async fn test_bounded_sink_drops_when_full() {
        let (mut tx, mut rx) = mpsc::channel(1);

        tx.emit(LinkEvent::DoorAck(true));
        tx.emit(LinkEvent::DoorAck(false));

        assert_eq!(rx.recv().await, Some(LinkEvent::DoorAck(true)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_channel_does_not_panic() {
        let (mut tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        tx.emit(LinkEvent::CompressorAck(true));
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&LinkEvent::DispensePhase {
            success: false,
            state: ControlState::ErrorCargo,
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"dispense_phase":{"success":false,"state":"error_cargo"}}"#
        );
    }
}
