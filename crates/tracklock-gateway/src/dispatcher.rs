//! Routes operator commands to live device sessions.
//!
//! Dispatch is fire-and-forget at the protocol level: the command is
//! queued onto the owning connection, which stamps it with the session's
//! next serial and writes it out. The device's eventual response frame
//! only echoes that serial loosely; the gateway logs the serial at send
//! time but does not block waiting for a confirmation.

use thiserror::Error;
use tracing::info;
use tracklock_core::Imei;
use tracklock_protocol::DeviceCommand;

use crate::registry::DeviceRegistry;

/// Errors surfaced by command dispatch.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The named device has no live connection. A normal negative
    /// outcome, reported to the operator rather than treated as a fault.
    #[error("device {0} is not connected")]
    NotFound(Imei),
}

/// Builds and routes outbound command frames.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    registry: DeviceRegistry,
}

impl CommandDispatcher {
    pub fn new(registry: DeviceRegistry) -> Self {
        CommandDispatcher { registry }
    }

    /// Queue a command for the device with the given identity.
    ///
    /// # Errors
    /// Returns [`DispatchError::NotFound`] when the identity has no live
    /// connection, including the window where a connection died after
    /// lookup.
    pub fn dispatch(&self, imei: &Imei, command: DeviceCommand) -> Result<(), DispatchError> {
        let handle = self
            .registry
            .lookup(imei)
            .ok_or_else(|| DispatchError::NotFound(imei.clone()))?;

        if !handle.send(command) {
            return Err(DispatchError::NotFound(imei.clone()));
        }

        info!(device_id = %imei, command = %command, "command dispatched");
        Ok(())
    }
}
