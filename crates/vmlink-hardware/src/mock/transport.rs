//! Mock transport implementation for testing and development.
//!
//! This module provides a simulated controller board line that can be driven
//! programmatically: tests inject reply bytes, script chunks that arrive one
//! per blocking wait, and inspect everything the host wrote.

use crate::error::{HardwareError, Result};
use crate::traits::Transport;
use bytes::BytesMut;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct MockLine {
    rx: BytesMut,
    scripted: VecDeque<Vec<u8>>,
    writes: Vec<Vec<u8>>,
    clears: usize,
    waits: usize,
    fail_writes: bool,
    disconnected: bool,
}

/// Mock transport for testing and development.
///
/// Received bytes are held in a shared buffer that the paired
/// [`MockTransportHandle`] fills. A blocking wait delivers the next scripted
/// chunk, so blocking exchanges run instantly and deterministically.
///
/// # Examples
///
/// ```
/// use vmlink_hardware::mock::MockTransport;
/// use vmlink_hardware::traits::Transport;
///
/// let (mut transport, handle) = MockTransport::new();
///
/// transport.write(b"VMIF\n").unwrap();
/// handle.inject(b"VMIF1.0.0");
///
/// assert_eq!(handle.writes(), vec![b"VMIF\n".to_vec()]);
/// assert_eq!(transport.bytes_available().unwrap(), 9);
/// assert_eq!(transport.read_all().unwrap(), b"VMIF1.0.0");
/// ```
#[derive(Debug)]
pub struct MockTransport {
    line: Arc<Mutex<MockLine>>,
}

impl MockTransport {
    /// Create a new mock transport.
    ///
    /// Returns a tuple of (MockTransport, MockTransportHandle) where the
    /// handle plays the board side of the line.
    pub fn new() -> (Self, MockTransportHandle) {
        let line = Arc::new(Mutex::new(MockLine::default()));
        let handle = MockTransportHandle {
            line: Arc::clone(&line),
        };
        (Self { line }, handle)
    }

    fn line(&self) -> Result<MutexGuard<'_, MockLine>> {
        lock(&self.line)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new().0
    }
}

impl Transport for MockTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let mut line = self.line()?;
        if line.disconnected {
            return Err(HardwareError::disconnected("mock line"));
        }
        if line.fail_writes {
            return Err(HardwareError::communication("mock write failure"));
        }
        line.writes.push(bytes.to_vec());
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize> {
        Ok(self.line()?.rx.len())
    }

    fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut line = self.line()?;
        let len = line.rx.len();
        Ok(line.rx.split_to(len).to_vec())
    }

    fn clear(&mut self) -> Result<()> {
        let mut line = self.line()?;
        line.rx.clear();
        line.clears += 1;
        Ok(())
    }

    fn wait_for_ready_read(&mut self, _timeout: Duration) -> Result<bool> {
        let mut line = self.line()?;
        line.waits += 1;
        if let Some(chunk) = line.scripted.pop_front() {
            line.rx.extend_from_slice(&chunk);
        }
        Ok(!line.rx.is_empty())
    }
}

/// Handle for controlling a mock transport.
///
/// This handle plays the board side of the line. It can be cloned and shared
/// across tasks.
#[derive(Debug, Clone)]
pub struct MockTransportHandle {
    line: Arc<Mutex<MockLine>>,
}

impl MockTransportHandle {
    /// Make bytes available to the host immediately.
    pub fn inject(&self, bytes: &[u8]) {
        self.with_line(|line| line.rx.extend_from_slice(bytes));
    }

    /// Queue a chunk delivered by the next blocking wait.
    ///
    /// An empty chunk models a wait that times out with nothing received.
    pub fn script(&self, chunk: &[u8]) {
        self.with_line(|line| line.scripted.push_back(chunk.to_vec()));
    }

    /// Every write the host made, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.with_line(|line| line.writes.clone())
    }

    /// Number of writes the host made.
    pub fn write_count(&self) -> usize {
        self.with_line(|line| line.writes.len())
    }

    /// Number of times the host discarded the line buffers.
    pub fn clear_count(&self) -> usize {
        self.with_line(|line| line.clears)
    }

    /// Number of blocking waits the host performed.
    pub fn wait_count(&self) -> usize {
        self.with_line(|line| line.waits)
    }

    /// Bytes received but not yet read by the host.
    pub fn pending_rx(&self) -> usize {
        self.with_line(|line| line.rx.len())
    }

    /// Make every following write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.with_line(|line| line.fail_writes = fail);
    }

    /// Simulate the port being unplugged.
    pub fn disconnect(&self) {
        self.with_line(|line| line.disconnected = true);
    }

    fn with_line<R>(&self, f: impl FnOnce(&mut MockLine) -> R) -> R {
        let mut line = match self.line.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut line)
    }
}

fn lock(line: &Mutex<MockLine>) -> Result<MutexGuard<'_, MockLine>> {
    line.lock()
        .map_err(|_| HardwareError::other("mock line lock poisoned"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_recorded() {
        let (mut transport, handle) = MockTransport::new();

        transport.write(b"CPON\n").unwrap();
        transport.write(b"CPOF\n").unwrap();

        assert_eq!(handle.write_count(), 2);
        assert_eq!(handle.writes()[1], b"CPOF\n");
    }

    #[test]
    fn test_read_all_drains_buffer() {
        let (mut transport, handle) = MockTransport::new();

        handle.inject(b"CP");
        handle.inject(b"ONOK");

        assert_eq!(transport.bytes_available().unwrap(), 6);
        assert_eq!(transport.read_all().unwrap(), b"CPONOK");
        assert_eq!(transport.bytes_available().unwrap(), 0);
        assert!(transport.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_clear_discards_rx() {
        let (mut transport, handle) = MockTransport::new();

        handle.inject(b"stale");
        transport.clear().unwrap();

        assert_eq!(handle.pending_rx(), 0);
        assert_eq!(handle.clear_count(), 1);
    }

    #[test]
    fn test_scripted_chunks_arrive_per_wait() {
        let (mut transport, handle) = MockTransport::new();

        handle.script(b"CPO");
        handle.script(b"");
        handle.script(b"NOK");

        assert!(transport.wait_for_ready_read(Duration::from_secs(3)).unwrap());
        assert_eq!(transport.read_all().unwrap(), b"CPO");
        assert!(!transport.wait_for_ready_read(Duration::from_millis(100)).unwrap());
        assert!(transport.wait_for_ready_read(Duration::from_millis(100)).unwrap());
        assert_eq!(transport.read_all().unwrap(), b"NOK");
        assert!(!transport.wait_for_ready_read(Duration::from_millis(100)).unwrap());

        assert_eq!(handle.wait_count(), 4);
    }

    #[test]
    fn test_write_failures() {
        let (mut transport, handle) = MockTransport::new();

        handle.fail_writes(true);
        assert!(matches!(
            transport.write(b"VMIF\n"),
            Err(HardwareError::CommunicationError { .. })
        ));

        handle.fail_writes(false);
        handle.disconnect();
        assert!(matches!(
            transport.write(b"VMIF\n"),
            Err(HardwareError::Disconnected { .. })
        ));
        assert_eq!(handle.write_count(), 0);
    }
}
