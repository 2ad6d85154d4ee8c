//! Command encoder for the controller board.
//!
//! Every request the host can send is an [`Operation`]. Encoding is pure: it
//! only produces the bytes to put on the wire, all I/O is left to the caller.
//!
//! # Wire Format
//!
//! Requests are short ASCII mnemonics terminated by a newline:
//!
//! | Operation | Wire command | Reply length |
//! |---|---|---|
//! | Firmware info | `VMIF\n` | 9 |
//! | Temperature panel | `TPAL\n` | 81 |
//! | Compressor on/off | `CPON\n` / `CPOF\n` | 6 |
//! | Door on/off | `C{n}ON\n` / `C{n}OF\n` | 6 |
//! | Dispense single slot | `CH{row}{col}\n` | 6 |
//! | Dispense combo | `D{r1}{c1}{r2}{c2}\n` | 7 |
//! | Dispense retry | `CHRT\n` | 6 |
//! | Cargo check | `CARS\n` | 6 |
//! | Door check | `CDOS\n` | 6 |
//!
//! Numeric parameters are written in plain decimal without padding.
//!
//! # Examples
//!
//! ```
//! use vmlink_protocol::Operation;
//! use vmlink_core::ControlState;
//!
//! let op = Operation::DispenseSingle { row: 1, col: 2 };
//! assert_eq!(op.encode(), b"CH12\n");
//! assert_eq!(op.waiting_state(), ControlState::WaitDispenseOk);
//! assert_eq!(op.expected_response_len(), 6);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use vmlink_core::ControlState;
use vmlink_core::constants::{
    CMD_CARGO_CHECK, CMD_COMPRESSOR_OFF, CMD_COMPRESSOR_ON, CMD_DISPENSE_COMBO_PREFIX,
    CMD_DISPENSE_RETRY, CMD_DISPENSE_SINGLE_PREFIX, CMD_DOOR_CHECK, CMD_DOOR_PREFIX,
    CMD_FIRMWARE_INFO, CMD_TEMPERATURE, COMMAND_TERMINATOR,
};

/// Which deadline a waiting state is armed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutClass {
    /// Single-shot replies (configurable, 3 seconds by default).
    Default,

    /// Mechanical dispense phases (120 seconds).
    Dispense,

    /// Explicitly requested cargo and door checks (30 seconds).
    Check,
}

/// A request the host can send to the controller board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum Operation {
    /// Read firmware information.
    FirmwareInfo,

    /// Read the temperature panel.
    TemperatureStatus,

    /// Switch the compressor.
    Compressor { on: bool },

    /// Switch a door valve.
    Door { index: u8, on: bool },

    /// Dispense from a single slot.
    DispenseSingle { row: u8, col: u8 },

    /// Dispense from two slots at once.
    DispenseCombo { row1: u8, col1: u8, row2: u8, col2: u8 },

    /// Retry the last dispense after a failure.
    DispenseRetry,

    /// Ask whether the cargo reached the pickup bay.
    CargoCheck,

    /// Ask whether the pickup door is closed.
    DoorCheck,
}

impl Operation {
    /// Encode the request as wire bytes, terminator included.
    ///
    /// # Examples
    ///
    /// ```
    /// use vmlink_protocol::Operation;
    ///
    /// assert_eq!(Operation::FirmwareInfo.encode(), b"VMIF\n");
    /// assert_eq!(Operation::Door { index: 2, on: false }.encode(), b"C2OF\n");
    /// assert_eq!(
    ///     Operation::DispenseCombo { row1: 1, col1: 2, row2: 3, col2: 4 }.encode(),
    ///     b"D1234\n"
    /// );
    /// ```
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut tx = match self {
            Self::FirmwareInfo => CMD_FIRMWARE_INFO.to_string(),
            Self::TemperatureStatus => CMD_TEMPERATURE.to_string(),
            Self::Compressor { on: true } => CMD_COMPRESSOR_ON.to_string(),
            Self::Compressor { on: false } => CMD_COMPRESSOR_OFF.to_string(),
            Self::Door { index, on } => {
                format!("{CMD_DOOR_PREFIX}{index}{}", if *on { "ON" } else { "OF" })
            }
            Self::DispenseSingle { row, col } => format!("{CMD_DISPENSE_SINGLE_PREFIX}{row}{col}"),
            Self::DispenseCombo {
                row1,
                col1,
                row2,
                col2,
            } => format!("{CMD_DISPENSE_COMBO_PREFIX}{row1}{col1}{row2}{col2}"),
            Self::DispenseRetry => CMD_DISPENSE_RETRY.to_string(),
            Self::CargoCheck => CMD_CARGO_CHECK.to_string(),
            Self::DoorCheck => CMD_DOOR_CHECK.to_string(),
        }
        .into_bytes();

        tx.push(COMMAND_TERMINATOR);
        tx
    }

    /// State the controller enters once the request is on the wire.
    #[must_use]
    pub fn waiting_state(&self) -> ControlState {
        match self {
            Self::FirmwareInfo => ControlState::WaitFirmwareInfo,
            Self::TemperatureStatus => ControlState::WaitTemperatureInfo,
            Self::Compressor { .. } => ControlState::WaitCompressorAck,
            Self::Door { .. } => ControlState::WaitDoorAck,
            Self::DispenseSingle { .. } | Self::DispenseCombo { .. } => {
                ControlState::WaitDispenseOk
            }
            Self::DispenseRetry => ControlState::WaitDispenseRetry,
            Self::CargoCheck => ControlState::WaitCargoCheck,
            Self::DoorCheck => ControlState::WaitDoorCheck,
        }
    }

    /// Whether the request addresses a single channel.
    ///
    /// Only a combined dispense clears the flag; it selects the offset of
    /// board error codes in the dispense frames that follow.
    #[must_use]
    pub fn single_channel(&self) -> bool {
        !matches!(self, Self::DispenseCombo { .. })
    }

    /// Length of the first reply to this request.
    #[must_use]
    pub fn expected_response_len(&self) -> usize {
        self.waiting_state()
            .expected_response_len(self.single_channel())
            .unwrap_or_default()
    }

    /// Deadline armed when the request is sent.
    #[must_use]
    pub fn timeout_class(&self) -> TimeoutClass {
        match self {
            Self::DispenseSingle { .. } | Self::DispenseCombo { .. } | Self::DispenseRetry => {
                TimeoutClass::Dispense
            }
            Self::CargoCheck | Self::DoorCheck => TimeoutClass::Check,
            _ => TimeoutClass::Default,
        }
    }

    /// Returns `true` if a dispense retry may be issued from `state`.
    ///
    /// A retry answers a failed dispense, so besides `Idle` it is accepted
    /// from the terminal outcomes.
    #[must_use]
    pub fn accepted_in(&self, state: ControlState) -> bool {
        match self {
            Self::DispenseRetry => state.is_idle() || state.is_terminal(),
            _ => state.is_idle(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirmwareInfo => write!(f, "firmware info"),
            Self::TemperatureStatus => write!(f, "temperature status"),
            Self::Compressor { on } => {
                write!(f, "compressor {}", if *on { "on" } else { "off" })
            }
            Self::Door { index, on } => {
                write!(f, "door {index} {}", if *on { "on" } else { "off" })
            }
            Self::DispenseSingle { row, col } => write!(f, "dispense slot {row}{col}"),
            Self::DispenseCombo {
                row1,
                col1,
                row2,
                col2,
            } => write!(f, "dispense slots {row1}{col1}+{row2}{col2}"),
            Self::DispenseRetry => write!(f, "dispense retry"),
            Self::CargoCheck => write!(f, "cargo check"),
            Self::DoorCheck => write!(f, "door check"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Operation::FirmwareInfo, b"VMIF\n".as_slice(), 9)]
    #[case(Operation::TemperatureStatus, b"TPAL\n".as_slice(), 81)]
    #[case(Operation::Compressor { on: true }, b"CPON\n".as_slice(), 6)]
    #[case(Operation::Compressor { on: false }, b"CPOF\n".as_slice(), 6)]
    #[case(Operation::Door { index: 1, on: true }, b"C1ON\n".as_slice(), 6)]
    #[case(Operation::Door { index: 12, on: false }, b"C12OF\n".as_slice(), 6)]
    #[case(Operation::DispenseSingle { row: 3, col: 7 }, b"CH37\n".as_slice(), 6)]
    #[case(Operation::DispenseCombo { row1: 1, col1: 1, row2: 2, col2: 2 }, b"D1122\n".as_slice(), 7)]
    #[case(Operation::DispenseRetry, b"CHRT\n".as_slice(), 6)]
    #[case(Operation::CargoCheck, b"CARS\n".as_slice(), 6)]
    #[case(Operation::DoorCheck, b"CDOS\n".as_slice(), 6)]
    fn test_encode_and_reply_length(
        #[case] op: Operation,
        #[case] wire: &[u8],
        #[case] reply_len: usize,
    ) {
        assert_eq!(op.encode(), wire);
        assert_eq!(op.expected_response_len(), reply_len);
    }

    #[test]
    fn test_encoding_is_ascii_and_newline_terminated() {
        let ops = [
            Operation::FirmwareInfo,
            Operation::Door { index: 255, on: true },
            Operation::DispenseCombo {
                row1: 10,
                col1: 0,
                row2: 9,
                col2: 99,
            },
        ];

        for op in ops {
            let tx = op.encode();
            assert!(tx.is_ascii());
            assert_eq!(tx.last(), Some(&b'\n'));
            assert_eq!(tx.iter().filter(|b| **b == b'\n').count(), 1);
        }
    }

    #[test]
    fn test_multi_digit_parameters_are_not_padded() {
        let op = Operation::DispenseSingle { row: 10, col: 5 };
        assert_eq!(op.encode(), b"CH105\n");
    }

    #[test]
    fn test_single_channel_flag() {
        assert!(Operation::DispenseSingle { row: 1, col: 1 }.single_channel());
        assert!(
            !Operation::DispenseCombo {
                row1: 1,
                col1: 1,
                row2: 1,
                col2: 2
            }
            .single_channel()
        );
    }

    #[rstest]
    #[case(Operation::FirmwareInfo, TimeoutClass::Default)]
    #[case(Operation::Compressor { on: true }, TimeoutClass::Default)]
    #[case(Operation::DispenseSingle { row: 1, col: 1 }, TimeoutClass::Dispense)]
    #[case(Operation::DispenseRetry, TimeoutClass::Dispense)]
    #[case(Operation::CargoCheck, TimeoutClass::Check)]
    #[case(Operation::DoorCheck, TimeoutClass::Check)]
    fn test_timeout_class(#[case] op: Operation, #[case] class: TimeoutClass) {
        assert_eq!(op.timeout_class(), class);
    }

    #[test]
    fn test_retry_accepted_after_fault() {
        assert!(Operation::DispenseRetry.accepted_in(ControlState::ErrorDrop));
        assert!(Operation::DispenseRetry.accepted_in(ControlState::Idle));
        assert!(!Operation::DispenseRetry.accepted_in(ControlState::WaitDispenseDone));
        assert!(!Operation::CargoCheck.accepted_in(ControlState::ErrorDrop));
        assert!(!Operation::FirmwareInfo.accepted_in(ControlState::WaitFirmwareInfo));
    }
}
