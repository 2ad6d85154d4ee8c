use anyhow::{Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use vmlink_core::constants::DEFAULT_BAUD_RATE;
use vmlink_protocol::{Operation, RemoteCommand};

#[derive(Parser, Debug)]
#[command(name = "vmlink", version, about = "Drive a vending machine controller board")]
pub struct Args {
    /// Serial port path (e.g. /dev/ttyUSB0)
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    pub port: String,

    /// Line speed
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,

    /// Controller configuration (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Give up waiting for the outcome after this many seconds
    #[arg(long, default_value_t = 300)]
    pub max_wait: u64,

    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Log protocol traffic
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait)
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List serial ports
    Ports,
    /// Read the firmware information
    Firmware,
    /// Read the temperature panel
    Temperature,
    /// Switch the compressor
    Compressor {
        state: Switch,
        /// Wait for the acknowledgement in place
        #[arg(long)]
        blocking: bool,
    },
    /// Switch a door valve
    Door { index: u8, state: Switch },
    /// Dispense from one slot, or from two slots at once
    Dispense {
        row: u8,
        col: u8,
        row2: Option<u8>,
        col2: Option<u8>,
    },
    /// Retry the last dispense
    Retry,
    /// Ask whether the cargo reached the pickup bay
    Cargo,
    /// Ask whether the pickup door is closed
    DoorCheck,
    /// Run a management service command code
    Remote { code: String },
    /// Print the temperature panel periodically until Ctrl-C
    Monitor {
        /// Seconds between temperature reads
        #[arg(short, long, default_value_t = 60)]
        interval: u64,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

/// What the command asks the link to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ListPorts,
    Issue(Operation),
    CompressorBlocking(bool),
    Monitor(Duration),
}

impl Command {
    pub fn action(&self) -> Result<Action> {
        let op = match *self {
            Self::Ports => return Ok(Action::ListPorts),
            Self::Monitor { interval } => {
                if interval == 0 {
                    bail!("monitor interval must be positive");
                }
                return Ok(Action::Monitor(Duration::from_secs(interval)));
            }
            Self::Compressor {
                state,
                blocking: true,
            } => return Ok(Action::CompressorBlocking(state.is_on())),

            Self::Firmware => Operation::FirmwareInfo,
            Self::Temperature => Operation::TemperatureStatus,
            Self::Compressor { state, .. } => Operation::Compressor { on: state.is_on() },
            Self::Door { index, state } => Operation::Door {
                index,
                on: state.is_on(),
            },
            Self::Dispense {
                row,
                col,
                row2,
                col2,
            } => match (row2, col2) {
                (None, None) => Operation::DispenseSingle { row, col },
                (Some(row2), Some(col2)) => Operation::DispenseCombo {
                    row1: row,
                    col1: col,
                    row2,
                    col2,
                },
                _ => bail!("a combined dispense needs both ROW2 and COL2"),
            },
            Self::Retry => Operation::DispenseRetry,
            Self::Cargo => Operation::CargoCheck,
            Self::DoorCheck => Operation::DoorCheck,
            Self::Remote { ref code } => {
                let command = RemoteCommand::parse(code)?;
                match command.operation() {
                    Some(op) => op,
                    None => bail!("remote command {command} has no controller operation"),
                }
            }
        };
        Ok(Action::Issue(op))
    }
}
