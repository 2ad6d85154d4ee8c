//! Transport layer for the vending machine controller board.
//!
//! This crate provides the byte-stream boundary the link controller drives:
//! the [`Transport`] trait, a native serial implementation and a mock for
//! tests and development.
//!
//! # Transports
//!
//! ## Serial
//!
//! [`SerialTransport`] opens the board's UART with the fixed line settings
//! (115200 8N1, no flow control, RTS asserted):
//!
//! ```no_run
//! use vmlink_hardware::{SerialSettings, SerialTransport, Transport};
//!
//! # fn main() -> vmlink_hardware::Result<()> {
//! let mut transport = SerialTransport::open(&SerialSettings::new("/dev/ttyUSB0"))?;
//! transport.write(b"VMIF\n")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Mock
//!
//! [`MockTransport`] pairs with a [`MockTransportHandle`] that plays the board:
//! it injects replies, scripts chunks for blocking waits and records writes.
//!
//! # Error Handling
//!
//! All operations return [`Result<T>`][error::Result] which uses the
//! [`HardwareError`] error type. A [`HardwareError`] converts into
//! `vmlink_core::Error::Transport` so the controller can propagate it with `?`.

pub mod error;
pub mod mock;
pub mod serial;
pub mod traits;

pub use error::{HardwareError, Result};
pub use mock::{MockTransport, MockTransportHandle};
pub use serial::{SerialSettings, SerialTransport, available_ports};
pub use traits::Transport;
