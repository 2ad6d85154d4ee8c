//! Remote command codes of the management service.
//!
//! The service queues two-digit command codes for the machine. Only a few
//! of them map onto controller operations; the rest are handled by the host
//! (software version, machine init, payment terminal, reboot).

use crate::commands::Operation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use vmlink_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteCommand {
    ReadSoftwareVersion,
    ReadFirmwareVersion,
    CompressorOn,
    CompressorOff,
    DoorValveOn,
    DoorValveOff,
    MachineInit,
    MasterUpdateStart,
    MasterUpdateSuccess,
    MasterUpdateFailed,
    PaymentSettle,
    Reboot,
    PaymentTerminalReboot,
}

impl RemoteCommand {
    /// Parse a two-digit command code.
    ///
    /// # Examples
    ///
    /// ```
    /// use vmlink_protocol::RemoteCommand;
    ///
    /// assert_eq!(RemoteCommand::parse("20").unwrap(), RemoteCommand::CompressorOn);
    /// assert!(RemoteCommand::parse("77").is_err());
    /// ```
    pub fn parse(code: &str) -> Result<Self, Error> {
        match code.trim() {
            "10" => Ok(Self::ReadSoftwareVersion),
            "11" => Ok(Self::ReadFirmwareVersion),
            "20" => Ok(Self::CompressorOn),
            "21" => Ok(Self::CompressorOff),
            "22" => Ok(Self::DoorValveOn),
            "23" => Ok(Self::DoorValveOff),
            "30" => Ok(Self::MachineInit),
            "31" => Ok(Self::MasterUpdateStart),
            "32" => Ok(Self::MasterUpdateSuccess),
            "33" => Ok(Self::MasterUpdateFailed),
            "50" => Ok(Self::PaymentSettle),
            "88" => Ok(Self::Reboot),
            "99" => Ok(Self::PaymentTerminalReboot),
            other => Err(Error::UnknownRemoteCommand {
                code: other.to_string(),
            }),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::ReadSoftwareVersion => "10",
            Self::ReadFirmwareVersion => "11",
            Self::CompressorOn => "20",
            Self::CompressorOff => "21",
            Self::DoorValveOn => "22",
            Self::DoorValveOff => "23",
            Self::MachineInit => "30",
            Self::MasterUpdateStart => "31",
            Self::MasterUpdateSuccess => "32",
            Self::MasterUpdateFailed => "33",
            Self::PaymentSettle => "50",
            Self::Reboot => "88",
            Self::PaymentTerminalReboot => "99",
        }
    }

    /// Controller operation that carries out this command, if any.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::ReadFirmwareVersion => Some(Operation::FirmwareInfo),
            Self::CompressorOn => Some(Operation::Compressor { on: true }),
            Self::CompressorOff => Some(Operation::Compressor { on: false }),
            _ => None,
        }
    }
}

impl FromStr for RemoteCommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
