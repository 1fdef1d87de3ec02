//! Per-connection session state machine.
//!
//! One session exists per device connection and is owned exclusively by
//! that connection's task. It tracks two things: the device identity
//! (assigned by the first successful login) and the outbound serial
//! counter. For each inbound frame it decides the reply to send back and
//! the event to forward, following the protocol's acknowledgement rules:
//!
//! | Inbound | Reply | Event |
//! |---|---|---|
//! | login | login ack (current UTC time) | logged-in |
//! | heartbeat | empty heartbeat ack | telemetry |
//! | location | empty location ack | location |
//! | alarm | empty alarm ack | location |
//! | information | single-zero-byte ack | — |
//! | response | — (logged) | — |
//! | unknown | — (logged) | — |
//!
//! Ordering is deliberately not enforced: a device that sends data
//! frames before logging in is still acknowledged, its events simply
//! carry no identity. The serial counter starts at zero, is bumped once
//! per outbound frame, and is never reset — not even by a re-login.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use tracklock_core::Imei;
use tracklock_protocol::{Frame, Payload, ProtocolType};

use crate::events::DeviceEvent;

/// What a session decided to do with one inbound frame.
#[derive(Debug, Default)]
pub struct Turn {
    /// Reply frame to write back, if the protocol calls for one.
    pub reply: Option<Frame>,

    /// Event to forward to the collector, if any.
    pub event: Option<DeviceEvent>,
}

/// State for one live device connection.
#[derive(Debug, Default)]
pub struct Session {
    identity: Option<Imei>,
    serial: u16,
}

impl Session {
    /// Create a fresh, unauthenticated session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity assigned by the last login frame, if any.
    pub fn identity(&self) -> Option<&Imei> {
        self.identity.as_ref()
    }

    /// Last serial number stamped onto an outbound frame.
    pub fn serial(&self) -> u16 {
        self.serial
    }

    /// Bump and return the serial for the next outbound frame.
    pub fn next_serial(&mut self) -> u16 {
        self.serial = self.serial.wrapping_add(1);
        self.serial
    }

    /// Process one inbound frame, producing the reply and event.
    pub fn handle(&mut self, frame: &Frame, now: DateTime<Utc>) -> Turn {
        match (&frame.protocol, &frame.payload) {
            (ProtocolType::Login, Payload::Login(login)) => {
                info!(device_id = %login.imei, model = login.model, "device login");
                self.identity = Some(login.imei.clone());
                Turn {
                    reply: Some(Frame::login_ack(now, self.next_serial())),
                    event: Some(DeviceEvent::LoggedIn {
                        device_id: self.identity.clone(),
                    }),
                }
            }
            (ProtocolType::Heartbeat, Payload::Heartbeat(heartbeat)) => {
                debug!(
                    device_id = ?self.identity,
                    voltage = heartbeat.voltage,
                    locked = heartbeat.status.locked,
                    "heartbeat"
                );
                Turn {
                    reply: Some(Frame::heartbeat_ack(self.next_serial())),
                    event: Some(DeviceEvent::Telemetry {
                        device_id: self.identity.clone(),
                        battery_voltage: heartbeat.voltage,
                    }),
                }
            }
            (ProtocolType::Location, Payload::Location(location)) => Turn {
                reply: Some(Frame::location_ack(self.next_serial())),
                event: Some(self.location_event(location)),
            },
            (ProtocolType::Alarm, Payload::Location(location)) => Turn {
                reply: Some(Frame::alarm_ack(self.next_serial())),
                event: Some(self.location_event(location)),
            },
            (ProtocolType::Information, Payload::Information(records)) => {
                debug!(device_id = ?self.identity, records = records.len(), "information");
                Turn {
                    reply: Some(Frame::information_ack(self.next_serial())),
                    event: None,
                }
            }
            (ProtocolType::Response, Payload::Response(response)) => {
                // Reply from the device to an earlier command push; the
                // serial loosely echoes the push. Observed, not answered.
                info!(
                    device_id = ?self.identity,
                    serial = frame.serial,
                    content = %String::from_utf8_lossy(&response.content),
                    "command response"
                );
                Turn::default()
            }
            (protocol, Payload::Unknown(bytes)) => {
                info!(
                    device_id = ?self.identity,
                    protocol = %protocol,
                    len = bytes.len(),
                    "unrecognized frame observed"
                );
                Turn::default()
            }
            (protocol, payload) => {
                // Unreachable from the decoder, which pairs payloads with
                // their protocol type.
                warn!(protocol = %protocol, payload = ?payload, "mismatched frame ignored");
                Turn::default()
            }
        }
    }

    fn location_event(&self, location: &tracklock_protocol::LocationData) -> DeviceEvent {
        DeviceEvent::Location {
            device_id: self.identity.clone(),
            lat: location.gps.as_ref().map(|gps| gps.latitude),
            lng: location.gps.as_ref().map(|gps| gps.longitude),
        }
    }
}
