//! Response classifier.
//!
//! [`classify`] interprets one complete reply frame against the active
//! [`ControlState`] and returns a [`Verdict`]: the next state, the outcome to
//! report and what to do with the reply deadline. It is pure; the controller
//! decides when a frame is complete (by length) and performs the I/O.
//!
//! The board's replies carry no structure beyond fixed lengths, so the rules
//! below only look for literal markers anywhere in the frame, exact frames,
//! or error codes at a fixed offset:
//!
//! | State | Success marker | Failure codes |
//! |---|---|---|
//! | `WaitDispenseOk` | `OK` | any other frame is `ErrorTimeout` |
//! | `WaitDispenseOperating` | `OP` | `DOOREE`, `EE02`, `EE03` |
//! | `WaitDispenseDone` | `DO` | `EE01`, `EE04` |
//! | `WaitDispenseRetry` | `DO` (`CHRT\r\n` = still busy) | `EE`, `NO` |
//! | `WaitCargoCheck` | `CAGOOK` (`CARSOK` = still busy) | anything else |
//! | `WaitDoorCheck` | anything but `DOOREE` (`CDOSOK` = still busy) | `DOOREE` |

use crate::commands::TimeoutClass;
use serde::{Deserialize, Serialize};
use vmlink_core::ControlState;
use vmlink_core::constants::{
    CODE_CARGO_FAILURE, CODE_DOOR_FAILURE, CODE_DROP_FAILURE, CODE_NOT_PICKED_UP,
    CODE_RETRY_DOOR_FAILURE, CODE_RETRY_NOT_PICKED_UP, ERROR_CODE_OFFSET_COMBO,
    ERROR_CODE_OFFSET_RETRY, ERROR_CODE_OFFSET_SINGLE, FRAME_CARGO_PENDING, FRAME_DOOR_PENDING,
    FRAME_RETRY_PENDING, MARK_CARGO_OK, MARK_DONE, MARK_DOOR_FAULT, MARK_OK, MARK_OPERATING,
};

/// What a complete reply means for the operation in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Firmware information, forwarded verbatim.
    FirmwareInfo(String),

    /// Temperature panel, forwarded verbatim.
    TemperatureStatus(String),

    /// Compressor switch acknowledgement.
    CompressorAck(bool),

    /// Door switch acknowledgement.
    DoorAck(bool),

    /// A dispense phase finished, successfully or not.
    Dispense { success: bool },

    /// The board is still working; keep waiting.
    Pending,

    /// Bytes arrived while nothing was awaited.
    Unsolicited,
}

/// What to do with the reply deadline after a frame was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineAction {
    /// Leave the deadline disarmed.
    Disarm,

    /// Arm a fresh deadline of the given class.
    Arm(TimeoutClass),
}

/// Result of classifying one complete frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub next: ControlState,
    pub outcome: Outcome,
    pub deadline: DeadlineAction,
}

impl Verdict {
    fn done(next: ControlState, outcome: Outcome) -> Self {
        Self {
            next,
            outcome,
            deadline: DeadlineAction::Disarm,
        }
    }

    fn dispense(next: ControlState, success: bool) -> Self {
        Self::done(next, Outcome::Dispense { success })
    }

    fn advance(next: ControlState) -> Self {
        Self {
            next,
            outcome: Outcome::Dispense { success: true },
            deadline: DeadlineAction::Arm(TimeoutClass::Dispense),
        }
    }

    fn pending(state: ControlState) -> Self {
        Self {
            next: state,
            outcome: Outcome::Pending,
            deadline: DeadlineAction::Arm(TimeoutClass::Dispense),
        }
    }

    /// Returns `true` if the verdict reports a failed dispense phase.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Dispense { success: false })
    }
}

/// Classify a complete reply frame received in `state`.
///
/// `single_channel` selects the error code offset of the dispense frames
/// (4 for a single slot, 5 for a combined pair).
///
/// # Examples
///
/// ```
/// use vmlink_core::ControlState;
/// use vmlink_protocol::{classify, Outcome};
///
/// let verdict = classify(ControlState::WaitCargoCheck, true, b"CAGOOK");
/// assert_eq!(verdict.next, ControlState::WaitDoorCheck);
/// assert_eq!(verdict.outcome, Outcome::Dispense { success: true });
/// ```
#[must_use]
pub fn classify(state: ControlState, single_channel: bool, frame: &[u8]) -> Verdict {
    let code_offset = if single_channel {
        ERROR_CODE_OFFSET_SINGLE
    } else {
        ERROR_CODE_OFFSET_COMBO
    };

    match state {
        ControlState::WaitFirmwareInfo => {
            Verdict::done(ControlState::Idle, Outcome::FirmwareInfo(text(frame)))
        }
        ControlState::WaitTemperatureInfo => {
            Verdict::done(ControlState::Idle, Outcome::TemperatureStatus(text(frame)))
        }
        ControlState::WaitCompressorAck => Verdict::done(
            ControlState::Idle,
            Outcome::CompressorAck(contains(frame, MARK_OK)),
        ),
        ControlState::WaitDoorAck => {
            Verdict::done(ControlState::Idle, Outcome::DoorAck(contains(frame, MARK_OK)))
        }

        ControlState::WaitDispenseOk => {
            if contains(frame, MARK_OK) {
                Verdict::advance(ControlState::WaitDispenseOperating)
            } else {
                Verdict::dispense(ControlState::ErrorTimeout, false)
            }
        }

        ControlState::WaitDispenseOperating => {
            if contains(frame, MARK_OPERATING) {
                return Verdict::advance(ControlState::WaitDispenseDone);
            }
            let next = if contains(frame, MARK_DOOR_FAULT) {
                ControlState::ErrorDoor
            } else if code_at(frame, code_offset, CODE_DROP_FAILURE) {
                ControlState::ErrorDrop
            } else if code_at(frame, code_offset, CODE_CARGO_FAILURE) {
                ControlState::ErrorCargo
            } else {
                ControlState::ErrorTimeout
            };
            Verdict::dispense(next, false)
        }

        // Cargo check is entered passively: the board reports on its own.
        ControlState::WaitDispenseDone => {
            if contains(frame, MARK_DONE) {
                return Verdict::dispense(ControlState::WaitCargoCheck, true);
            }
            let next = if code_at(frame, code_offset, CODE_NOT_PICKED_UP) {
                ControlState::WarningNotPickedUp
            } else if code_at(frame, code_offset, CODE_DOOR_FAILURE) {
                ControlState::ErrorDoor
            } else {
                ControlState::ErrorTimeout
            };
            Verdict::dispense(next, false)
        }

        ControlState::WaitDispenseRetry => {
            if frame == FRAME_RETRY_PENDING {
                return Verdict::pending(state);
            }
            if contains(frame, MARK_DONE) {
                return Verdict::dispense(ControlState::WaitCargoCheck, true);
            }
            let next = if code_at(frame, ERROR_CODE_OFFSET_RETRY, CODE_RETRY_NOT_PICKED_UP) {
                ControlState::WarningNotPickedUp
            } else if code_at(frame, ERROR_CODE_OFFSET_RETRY, CODE_RETRY_DOOR_FAILURE) {
                ControlState::ErrorDoor
            } else {
                ControlState::ErrorTimeout
            };
            Verdict::dispense(next, false)
        }

        ControlState::WaitCargoCheck => {
            if frame == FRAME_CARGO_PENDING {
                Verdict::pending(state)
            } else if contains(frame, MARK_CARGO_OK) {
                Verdict::dispense(ControlState::WaitDoorCheck, true)
            } else {
                Verdict::dispense(ControlState::WarningNotPickedUp, false)
            }
        }

        ControlState::WaitDoorCheck => {
            if frame == FRAME_DOOR_PENDING {
                Verdict::pending(state)
            } else if contains(frame, MARK_DOOR_FAULT) {
                Verdict::dispense(ControlState::ErrorDoor, false)
            } else {
                Verdict::dispense(ControlState::Idle, true)
            }
        }

        ControlState::Idle
        | ControlState::ErrorTimeout
        | ControlState::ErrorDrop
        | ControlState::ErrorCargo
        | ControlState::ErrorDoor
        | ControlState::WarningNotPickedUp => Verdict::done(state, Outcome::Unsolicited),
    }
}

fn text(frame: &[u8]) -> String {
    String::from_utf8_lossy(frame).into_owned()
}

fn contains(frame: &[u8], marker: &str) -> bool {
    let marker = marker.as_bytes();
    frame.windows(marker.len()).any(|w| w == marker)
}

fn code_at(frame: &[u8], offset: usize, code: &str) -> bool {
    frame
        .get(offset..)
        .is_some_and(|tail| tail.starts_with(code.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ControlState::WaitFirmwareInfo, b"VMIF1.2.3".as_slice())]
    #[case(ControlState::WaitTemperatureInfo, b"TPAL +04.5".as_slice())]
    fn test_info_replies_forwarded_verbatim(#[case] state: ControlState, #[case] frame: &[u8]) {
        let verdict = classify(state, true, frame);
        assert_eq!(verdict.next, ControlState::Idle);
        assert_eq!(verdict.deadline, DeadlineAction::Disarm);

        let forwarded = match verdict.outcome {
            Outcome::FirmwareInfo(s) | Outcome::TemperatureStatus(s) => s,
            other => panic!("unexpected outcome {other:?}"),
        };
        assert_eq!(forwarded.as_bytes(), frame);
    }

    #[rstest]
    #[case(b"CPONOK".as_slice(), true)]
    #[case(b"OKCPON".as_slice(), true)]
    #[case(b"CPONNG".as_slice(), false)]
    fn test_compressor_ack(#[case] frame: &[u8], #[case] ok: bool) {
        let verdict = classify(ControlState::WaitCompressorAck, true, frame);
        assert_eq!(verdict.next, ControlState::Idle);
        assert_eq!(verdict.outcome, Outcome::CompressorAck(ok));
    }

    #[test]
    fn test_door_ack() {
        let verdict = classify(ControlState::WaitDoorAck, true, b"C1ONOK");
        assert_eq!(verdict.outcome, Outcome::DoorAck(true));

        let verdict = classify(ControlState::WaitDoorAck, true, b"C1ONER");
        assert_eq!(verdict.outcome, Outcome::DoorAck(false));
    }

    #[test]
    fn test_dispense_success_path() {
        let verdict = classify(ControlState::WaitDispenseOk, true, b"CH12OK");
        assert_eq!(verdict.next, ControlState::WaitDispenseOperating);
        assert_eq!(verdict.outcome, Outcome::Dispense { success: true });
        assert_eq!(verdict.deadline, DeadlineAction::Arm(TimeoutClass::Dispense));

        let verdict = classify(ControlState::WaitDispenseOperating, true, b"CH12OP");
        assert_eq!(verdict.next, ControlState::WaitDispenseDone);
        assert_eq!(verdict.deadline, DeadlineAction::Arm(TimeoutClass::Dispense));

        let verdict = classify(ControlState::WaitDispenseDone, true, b"CH12DO\r\n");
        assert_eq!(verdict.next, ControlState::WaitCargoCheck);
        assert_eq!(verdict.outcome, Outcome::Dispense { success: true });
        assert_eq!(verdict.deadline, DeadlineAction::Disarm);
    }

    #[test]
    fn test_dispense_refused() {
        let verdict = classify(ControlState::WaitDispenseOk, true, b"CH12NG");
        assert_eq!(verdict.next, ControlState::ErrorTimeout);
        assert!(verdict.is_failure());
    }

    #[rstest]
    #[case(true, b"CH12EE02".as_slice(), ControlState::ErrorDrop)]
    #[case(true, b"CH12EE03".as_slice(), ControlState::ErrorCargo)]
    #[case(false, b"D1122EE02".as_slice(), ControlState::ErrorDrop)]
    #[case(false, b"D1122EE03".as_slice(), ControlState::ErrorCargo)]
    #[case(true, b"DOOREE".as_slice(), ControlState::ErrorDoor)]
    #[case(false, b"xDOOREE".as_slice(), ControlState::ErrorDoor)]
    #[case(true, b"CH12XX".as_slice(), ControlState::ErrorTimeout)]
    fn test_operating_failure_codes(
        #[case] single_channel: bool,
        #[case] frame: &[u8],
        #[case] expected: ControlState,
    ) {
        let verdict = classify(ControlState::WaitDispenseOperating, single_channel, frame);
        assert_eq!(verdict.next, expected);
        assert!(verdict.is_failure());
        assert_eq!(verdict.deadline, DeadlineAction::Disarm);
    }

    #[test]
    fn test_error_code_offset_follows_channel_mode() {
        // At offset 4 a combo frame reads "2EE03", which is no known code.
        let verdict = classify(ControlState::WaitDispenseOperating, true, b"D1122EE03");
        assert_eq!(verdict.next, ControlState::ErrorTimeout);

        let verdict = classify(ControlState::WaitDispenseOperating, false, b"D1122EE03");
        assert_eq!(verdict.next, ControlState::ErrorCargo);
    }

    #[test]
    fn test_error_code_tolerates_trailing_bytes() {
        let verdict = classify(ControlState::WaitDispenseOperating, true, b"CH12EE02\r\n");
        assert_eq!(verdict.next, ControlState::ErrorDrop);
    }

    #[rstest]
    #[case(true, b"CH12EE01".as_slice(), ControlState::WarningNotPickedUp)]
    #[case(true, b"CH12EE04".as_slice(), ControlState::ErrorDoor)]
    #[case(false, b"D1122EE01".as_slice(), ControlState::WarningNotPickedUp)]
    #[case(true, b"CH12EE09".as_slice(), ControlState::ErrorTimeout)]
    fn test_done_failure_codes(
        #[case] single_channel: bool,
        #[case] frame: &[u8],
        #[case] expected: ControlState,
    ) {
        let verdict = classify(ControlState::WaitDispenseDone, single_channel, frame);
        assert_eq!(verdict.next, expected);
        assert!(verdict.is_failure());
    }

    #[test]
    fn test_done_marker_wins_over_door_fault() {
        // "DOOREE" contains the done marker and is accepted in this phase.
        let verdict = classify(ControlState::WaitDispenseDone, true, b"xxDOOREE");
        assert_eq!(verdict.next, ControlState::WaitCargoCheck);
    }

    #[rstest]
    #[case(b"CHRTDO".as_slice(), ControlState::WaitCargoCheck, true)]
    #[case(b"CHRTEE".as_slice(), ControlState::WarningNotPickedUp, false)]
    #[case(b"CHRTNO".as_slice(), ControlState::ErrorDoor, false)]
    #[case(b"CHRTXX".as_slice(), ControlState::ErrorTimeout, false)]
    fn test_retry_outcomes(
        #[case] frame: &[u8],
        #[case] expected: ControlState,
        #[case] success: bool,
    ) {
        let verdict = classify(ControlState::WaitDispenseRetry, true, frame);
        assert_eq!(verdict.next, expected);
        assert_eq!(verdict.outcome, Outcome::Dispense { success });
    }

    #[rstest]
    #[case(ControlState::WaitDispenseRetry, b"CHRT\r\n".as_slice())]
    #[case(ControlState::WaitCargoCheck, b"CARSOK".as_slice())]
    #[case(ControlState::WaitDoorCheck, b"CDOSOK".as_slice())]
    fn test_pending_frames_rearm(#[case] state: ControlState, #[case] frame: &[u8]) {
        let verdict = classify(state, true, frame);
        assert_eq!(verdict.next, state);
        assert_eq!(verdict.outcome, Outcome::Pending);
        assert_eq!(verdict.deadline, DeadlineAction::Arm(TimeoutClass::Dispense));
    }

    #[test]
    fn test_pending_frames_must_match_exactly() {
        let verdict = classify(ControlState::WaitCargoCheck, true, b"CARSOK\r\n");
        assert_eq!(verdict.next, ControlState::WarningNotPickedUp);
    }

    #[test]
    fn test_cargo_and_door_checks() {
        let verdict = classify(ControlState::WaitCargoCheck, true, b"CAGOOK");
        assert_eq!(verdict.next, ControlState::WaitDoorCheck);
        assert_eq!(verdict.deadline, DeadlineAction::Disarm);

        let verdict = classify(ControlState::WaitCargoCheck, true, b"CAGONG");
        assert_eq!(verdict.next, ControlState::WarningNotPickedUp);
        assert!(verdict.is_failure());

        let verdict = classify(ControlState::WaitDoorCheck, true, b"DOOREE");
        assert_eq!(verdict.next, ControlState::ErrorDoor);
        assert!(verdict.is_failure());

        let verdict = classify(ControlState::WaitDoorCheck, true, b"CDOSCL");
        assert_eq!(verdict.next, ControlState::Idle);
        assert_eq!(verdict.outcome, Outcome::Dispense { success: true });
    }

    #[rstest]
    #[case(ControlState::Idle)]
    #[case(ControlState::ErrorDrop)]
    #[case(ControlState::WarningNotPickedUp)]
    fn test_unsolicited_bytes_leave_state(#[case] state: ControlState) {
        let verdict = classify(state, true, b"CH12OK");
        assert_eq!(verdict.next, state);
        assert_eq!(verdict.outcome, Outcome::Unsolicited);
    }

    #[test]
    fn test_short_frame_has_no_code() {
        assert!(!code_at(b"CH1", 4, "EE02"));
        assert!(!contains(b"", "OK"));
    }
}
