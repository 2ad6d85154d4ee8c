//! Transport trait definition.
//!
//! The controller never owns a serial port directly. It drives a
//! [`Transport`]: an open, bidirectional byte stream that can report how many
//! bytes are buffered. Real hardware goes through
//! [`SerialTransport`](crate::serial::SerialTransport); tests use
//! [`MockTransport`](crate::mock::MockTransport).
//!
//! The trait is synchronous on purpose: every method returns promptly except
//! [`Transport::wait_for_ready_read`], which is only used by the blocking
//! exchange and blocks for at most the given duration.

use crate::error::Result;
use std::time::Duration;

/// Byte-stream transport to the controller board.
///
/// The board frames nothing, so implementations must not buffer by line or
/// strip terminators; bytes are delivered exactly as received.
pub trait Transport: Send {
    /// Write the bytes and flush them to the line.
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Number of received bytes waiting to be read.
    fn bytes_available(&mut self) -> Result<usize>;

    /// Read every buffered byte.
    fn read_all(&mut self) -> Result<Vec<u8>>;

    /// Discard both receive and transmit buffers.
    fn clear(&mut self) -> Result<()>;

    /// Block until at least one byte is buffered or `timeout` elapses.
    ///
    /// Returns `true` if data is available.
    fn wait_for_ready_read(&mut self, timeout: Duration) -> Result<bool>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes)
    }

    fn bytes_available(&mut self) -> Result<usize> {
        (**self).bytes_available()
    }

    fn read_all(&mut self) -> Result<Vec<u8>> {
        (**self).read_all()
    }

    fn clear(&mut self) -> Result<()> {
        (**self).clear()
    }

    fn wait_for_ready_read(&mut self, timeout: Duration) -> Result<bool> {
        (**self).wait_for_ready_read(timeout)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes)
    }

    fn bytes_available(&mut self) -> Result<usize> {
        (**self).bytes_available()
    }

    fn read_all(&mut self) -> Result<Vec<u8>> {
        (**self).read_all()
    }

    fn clear(&mut self) -> Result<()> {
        (**self).clear()
    }

    fn wait_for_ready_read(&mut self, timeout: Duration) -> Result<bool> {
        (**self).wait_for_ready_read(timeout)
    }
}
