use crate::constants::{
    EVENT_ERR_CARGO, EVENT_ERR_DOOR, EVENT_ERR_DROP, RX_LEN_CARGO_CHECK, RX_LEN_COMPRESSOR,
    RX_LEN_DISPENSE_COMBO, RX_LEN_DISPENSE_DONE, RX_LEN_DISPENSE_OPERATING, RX_LEN_DISPENSE_RETRY,
    RX_LEN_DISPENSE_SINGLE, RX_LEN_DOOR, RX_LEN_DOOR_CHECK, RX_LEN_FIRMWARE_INFO,
    RX_LEN_TEMPERATURE,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Control state of the hardware link.
///
/// Exactly one state is active at any time. States fall into three kinds:
///
/// - **Idle/terminal**: `Idle` accepts new commands; the error and warning
///   states are terminal outcomes that are never advanced automatically.
/// - **Single response**: one request, one reply, then back to `Idle`.
/// - **Dispense sequence**:
///
/// ```text
/// WaitDispenseOk → WaitDispenseOperating → WaitDispenseDone
///     → WaitCargoCheck → WaitDoorCheck → Idle
///
/// WaitDispenseRetry → WaitCargoCheck
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    /// Ready to accept a new command.
    #[default]
    Idle,

    /// A reply did not arrive in time, or the board refused a dispense.
    ErrorTimeout,

    /// The dispense motor failed to drop the item.
    ErrorDrop,

    /// The cargo sensor reported a failure.
    ErrorCargo,

    /// The pickup door reported a failure.
    ErrorDoor,

    /// The item was not picked up from the bay.
    WarningNotPickedUp,

    /// Waiting for the firmware information reply.
    WaitFirmwareInfo,

    /// Waiting for the temperature panel reply.
    WaitTemperatureInfo,

    /// Waiting for the compressor switch acknowledgement.
    WaitCompressorAck,

    /// Waiting for the door switch acknowledgement.
    WaitDoorAck,

    /// Waiting for the board to accept a dispense request.
    WaitDispenseOk,

    /// Waiting for the dispense motor to report it is operating.
    WaitDispenseOperating,

    /// Waiting for the dispense to finish.
    WaitDispenseDone,

    /// Waiting for the outcome of a dispense retry.
    WaitDispenseRetry,

    /// Waiting for the cargo sensor report.
    WaitCargoCheck,

    /// Waiting for the door sensor report.
    WaitDoorCheck,
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            ControlState::Idle => "Idle",
            ControlState::ErrorTimeout => "ErrorTimeout",
            ControlState::ErrorDrop => "ErrorDrop",
            ControlState::ErrorCargo => "ErrorCargo",
            ControlState::ErrorDoor => "ErrorDoor",
            ControlState::WarningNotPickedUp => "WarningNotPickedUp",
            ControlState::WaitFirmwareInfo => "WaitFirmwareInfo",
            ControlState::WaitTemperatureInfo => "WaitTemperatureInfo",
            ControlState::WaitCompressorAck => "WaitCompressorAck",
            ControlState::WaitDoorAck => "WaitDoorAck",
            ControlState::WaitDispenseOk => "WaitDispenseOk",
            ControlState::WaitDispenseOperating => "WaitDispenseOperating",
            ControlState::WaitDispenseDone => "WaitDispenseDone",
            ControlState::WaitDispenseRetry => "WaitDispenseRetry",
            ControlState::WaitCargoCheck => "WaitCargoCheck",
            ControlState::WaitDoorCheck => "WaitDoorCheck",
        };
        write!(f, "{}", state_str)
    }
}

impl ControlState {
    /// Every state, in declaration order.
    pub const ALL: [ControlState; 16] = [
        ControlState::Idle,
        ControlState::ErrorTimeout,
        ControlState::ErrorDrop,
        ControlState::ErrorCargo,
        ControlState::ErrorDoor,
        ControlState::WarningNotPickedUp,
        ControlState::WaitFirmwareInfo,
        ControlState::WaitTemperatureInfo,
        ControlState::WaitCompressorAck,
        ControlState::WaitDoorAck,
        ControlState::WaitDispenseOk,
        ControlState::WaitDispenseOperating,
        ControlState::WaitDispenseDone,
        ControlState::WaitDispenseRetry,
        ControlState::WaitCargoCheck,
        ControlState::WaitDoorCheck,
    ];

    /// Returns `true` if state is Idle.
    #[inline]
    #[must_use]
    pub fn is_idle(self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns `true` for the error and warning outcomes.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::ErrorTimeout
                | Self::ErrorDrop
                | Self::ErrorCargo
                | Self::ErrorDoor
                | Self::WarningNotPickedUp
        )
    }

    /// Returns `true` while a reply is awaited.
    #[inline]
    #[must_use]
    pub fn is_waiting(self) -> bool {
        !self.is_idle() && !self.is_terminal()
    }

    /// Returns `true` for the states of the dispense sequence.
    #[must_use]
    pub fn is_dispense_phase(self) -> bool {
        matches!(
            self,
            Self::WaitDispenseOk
                | Self::WaitDispenseOperating
                | Self::WaitDispenseDone
                | Self::WaitDispenseRetry
                | Self::WaitCargoCheck
                | Self::WaitDoorCheck
        )
    }

    /// Number of bytes that make up a complete reply in this state.
    ///
    /// Only the first dispense acknowledgement depends on whether a single
    /// slot or a combined pair was requested. Returns `None` outside the
    /// waiting states.
    ///
    /// # Examples
    ///
    /// ```
    /// use vmlink_core::ControlState;
    ///
    /// assert_eq!(ControlState::WaitFirmwareInfo.expected_response_len(true), Some(9));
    /// assert_eq!(ControlState::WaitDispenseOk.expected_response_len(true), Some(6));
    /// assert_eq!(ControlState::WaitDispenseOk.expected_response_len(false), Some(7));
    /// assert_eq!(ControlState::Idle.expected_response_len(true), None);
    /// ```
    #[must_use]
    pub fn expected_response_len(self, single_channel: bool) -> Option<usize> {
        let len = match self {
            Self::WaitFirmwareInfo => RX_LEN_FIRMWARE_INFO,
            Self::WaitTemperatureInfo => RX_LEN_TEMPERATURE,
            Self::WaitCompressorAck => RX_LEN_COMPRESSOR,
            Self::WaitDoorAck => RX_LEN_DOOR,
            Self::WaitDispenseOk if single_channel => RX_LEN_DISPENSE_SINGLE,
            Self::WaitDispenseOk => RX_LEN_DISPENSE_COMBO,
            Self::WaitDispenseOperating => RX_LEN_DISPENSE_OPERATING,
            Self::WaitDispenseDone => RX_LEN_DISPENSE_DONE,
            Self::WaitDispenseRetry => RX_LEN_DISPENSE_RETRY,
            Self::WaitCargoCheck => RX_LEN_CARGO_CHECK,
            Self::WaitDoorCheck => RX_LEN_DOOR_CHECK,
            _ => return None,
        };
        Some(len)
    }

    /// Upstream event code reported to the management service for a fault.
    ///
    /// # Examples
    ///
    /// ```
    /// use vmlink_core::ControlState;
    ///
    /// assert_eq!(ControlState::ErrorDrop.fault_event_code(), Some("08"));
    /// assert_eq!(ControlState::Idle.fault_event_code(), None);
    /// ```
    #[must_use]
    pub fn fault_event_code(self) -> Option<&'static str> {
        match self {
            Self::ErrorDrop => Some(EVENT_ERR_DROP),
            Self::ErrorCargo => Some(EVENT_ERR_CARGO),
            Self::ErrorDoor => Some(EVENT_ERR_DOOR),
            _ => None,
        }
    }
}
