//! Operator commands pushed down to devices.
//!
//! Each command is a fixed ASCII instruction wrapped in a command frame
//! with server-flag zero. The device answers asynchronously with a
//! response frame; the push itself is fire-and-forget.

use std::fmt;
use tracklock_core::constants::{CMD_LOCATE, CMD_RING, CMD_UNLOCK};
use tracklock_core::{Error, Result};

use crate::frame::Frame;

/// Commands an operator can push to a connected device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Release the lock.
    Unlock,
    /// Request an immediate location report.
    Locate,
    /// Make the device ring so it can be found.
    Ring,
}

impl DeviceCommand {
    /// The ASCII instruction text sent to the device.
    pub fn instruction(&self) -> &'static str {
        match self {
            DeviceCommand::Unlock => CMD_UNLOCK,
            DeviceCommand::Locate => CMD_LOCATE,
            DeviceCommand::Ring => CMD_RING,
        }
    }

    /// Build the command frame stamped with `serial`.
    pub fn frame(&self, serial: u16) -> Frame {
        Frame::command(self.instruction(), serial)
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceCommand::Unlock => write!(f, "unlock"),
            DeviceCommand::Locate => write!(f, "locate"),
            DeviceCommand::Ring => write!(f, "ring"),
        }
    }
}

impl std::str::FromStr for DeviceCommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unlock" => Ok(DeviceCommand::Unlock),
            "locate" => Ok(DeviceCommand::Locate),
            "ring" => Ok(DeviceCommand::Ring),
            other => Err(Error::Config(format!("unknown command: {other}"))),
        }
    }
}
