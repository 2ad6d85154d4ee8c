//! Temperature panel decoding.
//!
//! The `TPAL` reply is an 81-byte fixed-layout record. Eight probe readings
//! of five characters each sit nine bytes apart starting at offset 4, followed
//! by single-character compressor, fan and door flags:
//!
//! ```text
//! offset  0    4        13       22   ...  67       74  77  80
//!         TPAL [probe1] [probe2] [probe3]  [probe8] cp  fn  door
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use vmlink_core::constants::RX_LEN_TEMPERATURE;
use vmlink_core::{Error, Result};

/// Number of temperature probes on the panel.
pub const PROBE_COUNT: usize = 8;

const PROBE_OFFSET: usize = 4;
const PROBE_STRIDE: usize = 9;
const PROBE_WIDTH: usize = 5;
const COMPRESSOR_OFFSET: usize = 74;
const FAN_OFFSET: usize = 77;
const DOOR_OFFSET: usize = 80;

/// Decoded temperature panel.
///
/// Readings are kept as the board formats them; the board pads and signs
/// them itself and consumers forward them as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemperaturePanel {
    pub probes: [String; PROBE_COUNT],
    pub compressor: String,
    pub fan: String,
    pub door: String,
}

impl TemperaturePanel {
    /// Decode a complete `TPAL` reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidResponse`] if the frame is shorter than the
    /// 81-byte panel record.
    pub fn parse(frame: &[u8]) -> Result<Self> {
        if frame.len() < RX_LEN_TEMPERATURE {
            return Err(Error::InvalidResponse(format!(
                "temperature panel needs {RX_LEN_TEMPERATURE} bytes, got {}",
                frame.len()
            )));
        }

        let probes = std::array::from_fn(|i| {
            let start = PROBE_OFFSET + i * PROBE_STRIDE;
            field(frame, start, PROBE_WIDTH)
        });

        Ok(Self {
            probes,
            compressor: field(frame, COMPRESSOR_OFFSET, 1),
            fan: field(frame, FAN_OFFSET, 1),
            door: field(frame, DOOR_OFFSET, 1),
        })
    }

    /// Key/value pairs in the layout the monitoring service expects.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields: Vec<(String, String)> = self
            .probes
            .iter()
            .enumerate()
            .map(|(i, probe)| (format!("temperature_{}", i + 1), probe.clone()))
            .collect();

        fields.push(("cp".to_string(), self.compressor.clone()));
        fields.push(("fn".to_string(), self.fan.clone()));
        fields.push(("door".to_string(), self.door.clone()));
        fields
    }
}

impl fmt::Display for TemperaturePanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, probe) in self.probes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "TP{:02} {}", i + 1, probe)?;
        }
        Ok(())
    }
}

fn field(frame: &[u8], start: usize, width: usize) -> String {
    String::from_utf8_lossy(&frame[start..start + width]).into_owned()
}
