//! Serial port transport.
//!
//! The controller board sits on a plain UART: 115200 baud, 8 data bits, no
//! parity, one stop bit and no flow control. RTS is asserted after opening
//! and stale bytes left over from a previous session are discarded.

use crate::error::{HardwareError, Result};
use crate::traits::Transport;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};
use vmlink_core::constants::DEFAULT_BAUD_RATE;

/// Interval at which [`SerialTransport::wait_for_ready_read`] checks the driver.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Serial line settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Device path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub path: String,

    /// Line speed.
    pub baud_rate: u32,

    /// Driver read timeout (milliseconds). Reads only ever ask for bytes
    /// the driver already reported, so this only bounds a misbehaving driver.
    pub read_timeout_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            path: "/dev/ttyUSB0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: 100,
        }
    }
}

impl SerialSettings {
    /// Settings for the given device path with the board's defaults.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Check the settings before opening the port.
    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(HardwareError::configuration("serial port path is empty"));
        }
        if self.baud_rate == 0 {
            return Err(HardwareError::configuration("baud rate must be positive"));
        }
        if self.read_timeout_ms == 0 {
            return Err(HardwareError::configuration(
                "read timeout must be positive",
            ));
        }
        Ok(())
    }
}

/// Names of the serial ports present on this machine.
pub fn available_ports() -> Result<Vec<String>> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|p| p.port_name)
        .collect())
}

/// [`Transport`] over a native serial port.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
    path: String,
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SerialTransport {
    /// Open the port with the board's line settings.
    pub fn open(settings: &SerialSettings) -> Result<Self> {
        settings.validate()?;
        info!(
            path = %settings.path,
            baud = settings.baud_rate,
            "Opening controller serial port"
        );

        let mut port = serialport::new(&settings.path, settings.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(settings.read_timeout_ms))
            .open()?;

        port.write_request_to_send(true)?;
        port.clear(serialport::ClearBuffer::All)?;
        debug!(path = %settings.path, "Serial port ready");

        Ok(Self {
            port,
            path: settings.path.clone(),
        })
    }

    /// Device path this transport was opened on.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        trace!(len = bytes.len(), "TX flushed");
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read_all(&mut self) -> Result<Vec<u8>> {
        let available = self.bytes_available()?;
        let mut buf = vec![0u8; available];
        if available > 0 {
            self.port.read_exact(&mut buf)?;
        }
        Ok(buf)
    }

    fn clear(&mut self) -> Result<()> {
        self.port.clear(serialport::ClearBuffer::All)?;
        Ok(())
    }

    fn wait_for_ready_read(&mut self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.bytes_available()? > 0 {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            std::thread::sleep(READY_POLL_INTERVAL.min(deadline - now));
        }
    }
}
