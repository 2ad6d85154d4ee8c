//! Wire-level constants for the vending machine controller board.
//!
//! The board speaks a fixed-format ASCII protocol over a serial line. Every
//! request is a short mnemonic terminated by a newline and every reply has a
//! fixed length that the host uses to decide when a frame is complete:
//!
//! ```text
//! host  -> board   VMIF\n
//! board -> host    <9 bytes of firmware information>
//! ```
//!
//! Replies carry no terminator the host can rely on, so the reply lengths
//! below are part of the wire contract and must not change.
//!
//! # Usage
//!
//! ```
//! use vmlink_core::constants::*;
//! use std::time::Duration;
//!
//! assert_eq!(CMD_FIRMWARE_INFO, "VMIF");
//! assert_eq!(RX_LEN_TEMPERATURE, 81);
//!
//! let timeout = Duration::from_millis(DEFAULT_RECEIVE_TIMEOUT_MS);
//! assert_eq!(timeout.as_secs(), 3);
//! ```

// ============================================================================
// Command Mnemonics
// ============================================================================

/// Command terminator appended to every request.
pub const COMMAND_TERMINATOR: u8 = b'\n';

/// Read firmware information.
pub const CMD_FIRMWARE_INFO: &str = "VMIF";

/// Read the temperature panel (eight probes plus compressor, fan and door flags).
pub const CMD_TEMPERATURE: &str = "TPAL";

/// Switch the compressor on.
pub const CMD_COMPRESSOR_ON: &str = "CPON";

/// Switch the compressor off.
pub const CMD_COMPRESSOR_OFF: &str = "CPOF";

/// Retry the last dispense.
pub const CMD_DISPENSE_RETRY: &str = "CHRT";

/// Check whether the dispensed cargo dropped into the pickup bay.
pub const CMD_CARGO_CHECK: &str = "CARS";

/// Check whether the pickup door has been closed again.
pub const CMD_DOOR_CHECK: &str = "CDOS";

/// Prefix of a single-slot dispense request (`CH{row}{col}`).
pub const CMD_DISPENSE_SINGLE_PREFIX: &str = "CH";

/// Prefix of a combined two-slot dispense request (`D{r1}{c1}{r2}{c2}`).
pub const CMD_DISPENSE_COMBO_PREFIX: &str = "D";

/// Prefix of a door valve request (`C{n}ON` / `C{n}OF`).
pub const CMD_DOOR_PREFIX: &str = "C";

// ============================================================================
// Reply Lengths
// ============================================================================

/// Firmware information reply length.
pub const RX_LEN_FIRMWARE_INFO: usize = 9;

/// Temperature panel reply length.
pub const RX_LEN_TEMPERATURE: usize = 81;

/// Compressor switch acknowledgement length.
pub const RX_LEN_COMPRESSOR: usize = 6;

/// Door switch acknowledgement length.
pub const RX_LEN_DOOR: usize = 6;

/// First acknowledgement of a single-slot dispense.
pub const RX_LEN_DISPENSE_SINGLE: usize = 6;

/// First acknowledgement of a combined dispense.
pub const RX_LEN_DISPENSE_COMBO: usize = 7;

/// "Motor operating" frame of a dispense.
pub const RX_LEN_DISPENSE_OPERATING: usize = 6;

/// "Dispense done" frame of a dispense.
pub const RX_LEN_DISPENSE_DONE: usize = 8;

/// Dispense retry acknowledgement length.
pub const RX_LEN_DISPENSE_RETRY: usize = 6;

/// Cargo check reply length.
pub const RX_LEN_CARGO_CHECK: usize = 6;

/// Door check reply length.
pub const RX_LEN_DOOR_CHECK: usize = 6;

// ============================================================================
// Board Reply Markers
// ============================================================================

/// Positive acknowledgement marker.
pub const MARK_OK: &str = "OK";

/// Dispense motor is operating.
pub const MARK_OPERATING: &str = "OP";

/// Dispense finished.
pub const MARK_DONE: &str = "DO";

/// Pickup door fault marker.
pub const MARK_DOOR_FAULT: &str = "DOOREE";

/// Cargo reached the pickup bay.
pub const MARK_CARGO_OK: &str = "CAGOOK";

/// Board is still waiting on the cargo sensor.
pub const FRAME_CARGO_PENDING: &[u8] = b"CARSOK";

/// Board is still waiting on the door sensor.
pub const FRAME_DOOR_PENDING: &[u8] = b"CDOSOK";

/// Board is still working on a dispense retry.
pub const FRAME_RETRY_PENDING: &[u8] = b"CHRT\r\n";

/// Motor drop failure reported while operating.
pub const CODE_DROP_FAILURE: &str = "EE02";

/// Cargo sensor failure reported while operating.
pub const CODE_CARGO_FAILURE: &str = "EE03";

/// Cargo left in the pickup bay after dispense.
pub const CODE_NOT_PICKED_UP: &str = "EE01";

/// Pickup door fault after dispense.
pub const CODE_DOOR_FAILURE: &str = "EE04";

/// Cargo left in the pickup bay after a retry.
pub const CODE_RETRY_NOT_PICKED_UP: &str = "EE";

/// Pickup door fault after a retry.
pub const CODE_RETRY_DOOR_FAILURE: &str = "NO";

/// Offset of the error code in a single-slot dispense frame.
pub const ERROR_CODE_OFFSET_SINGLE: usize = 4;

/// Offset of the error code in a combined dispense frame.
pub const ERROR_CODE_OFFSET_COMBO: usize = 5;

/// Offset of the error code in a retry frame.
pub const ERROR_CODE_OFFSET_RETRY: usize = 4;

// ============================================================================
// Timeout Configuration
// ============================================================================

/// Default reply timeout for single-shot requests (milliseconds).
///
/// # Value: 3000ms (3 seconds)
pub const DEFAULT_RECEIVE_TIMEOUT_MS: u64 = 3000;

/// Timeout while the board completes a mechanical dispense phase (milliseconds).
///
/// # Value: 120000ms (2 minutes)
pub const DISPENSE_TIMEOUT_MS: u64 = 120_000;

/// Timeout for explicitly requested cargo and door checks (milliseconds).
///
/// # Value: 30000ms (30 seconds)
pub const CHECK_TIMEOUT_MS: u64 = 30_000;

/// Upper bound for any configured timeout (milliseconds).
///
/// # Value: 86400000ms (24 hours)
pub const MAX_TIMEOUT_MS: u64 = 86_400_000;

/// Number of silent firmware information retries before reporting a timeout.
pub const FIRMWARE_MAX_RETRIES: u32 = 10;

// ============================================================================
// Synchronous Exchange
// ============================================================================

/// First wait of a blocking exchange (milliseconds).
pub const SYNC_FIRST_WAIT_MS: u64 = 3000;

/// Interval between follow-up polls of a blocking exchange (milliseconds).
pub const SYNC_POLL_INTERVAL_MS: u64 = 100;

/// Number of follow-up polls of a blocking exchange.
pub const SYNC_POLL_BUDGET: u32 = 30;

// ============================================================================
// Serial Line
// ============================================================================

/// Baud rate of the controller board.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

// ============================================================================
// Upstream Event Codes
// ============================================================================

/// Dispense motor drop failure.
pub const EVENT_ERR_DROP: &str = "08";

/// Cargo sensor failure.
pub const EVENT_ERR_CARGO: &str = "09";

/// Pickup door failure.
pub const EVENT_ERR_DOOR: &str = "10";
