//! Byte-level frame codec for the tracker/lock wire protocol.
//!
//! A [`Frame`] is one complete message between a device and the gateway:
//!
//! ```text
//! ┌───────┬────────┬──────────┬─────────┬────────┬──────────┬───────┐
//! │ start │ length │ protocol │ payload │ serial │ checksum │  end  │
//! │ 2 B   │ 1|2 B  │   1 B    │   N B   │  2 B   │   2 B    │  2 B  │
//! └───────┴────────┴──────────┴─────────┴────────┴──────────┴───────┘
//! ```
//!
//! The start marker fixes the width of the length field: `0x7878` uses a
//! one-byte length, `0x7979` a two-byte big-endian length. The length
//! counts the protocol byte, payload, serial and checksum. The checksum
//! is computed over the length field through the serial, and the frame
//! ends with a fixed `0x0D0A` terminator.
//!
//! Decoding either yields a fully typed frame or a specific error; a
//! frame with a bad checksum, bad framing or an inconsistent length is
//! rejected, never repaired. Encoding derives the length field from the
//! serialized payload instead of trusting the caller.
//!
//! # Examples
//!
//! ```
//! use tracklock_protocol::{Frame, ProtocolType};
//!
//! let cmd = Frame::command("UNLOCK#", 3);
//! let bytes = cmd.encode().unwrap();
//! let decoded = Frame::decode(&bytes).unwrap();
//! assert_eq!(decoded.protocol, ProtocolType::Command);
//! assert_eq!(decoded.serial, 3);
//! ```

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, Utc};
use std::fmt;
use tracklock_core::constants::*;
use tracklock_core::{Error, Result};

use crate::checksum;
use crate::payload::{CommandData, DeviceTime, LoginAck, Payload};

/// Start marker of a frame, which also selects the length-field width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMarker {
    /// `0x7878`, one-byte length field.
    Short,
    /// `0x7979`, two-byte big-endian length field.
    Long,
}

impl StartMarker {
    /// Width of the length field in bytes.
    pub fn length_width(&self) -> usize {
        match self {
            StartMarker::Short => 1,
            StartMarker::Long => 2,
        }
    }

    /// The two marker bytes.
    pub fn bytes(&self) -> [u8; 2] {
        match self {
            StartMarker::Short => START_SHORT,
            StartMarker::Long => START_LONG,
        }
    }

    fn from_bytes(bytes: [u8; 2]) -> Result<Self> {
        match bytes {
            START_SHORT => Ok(StartMarker::Short),
            START_LONG => Ok(StartMarker::Long),
            other => Err(Error::UnknownStart(u16::from_be_bytes(other))),
        }
    }
}

/// Protocol discriminator byte.
///
/// Unlisted codes are carried in the `Unknown` variant so well-framed
/// traffic from unrecognized firmware still round-trips for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolType {
    Login,
    Response,
    Heartbeat,
    Location,
    Alarm,
    Command,
    Information,
    Unknown(u8),
}

impl ProtocolType {
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            PROTO_LOGIN => Self::Login,
            PROTO_RESPONSE => Self::Response,
            PROTO_HEARTBEAT => Self::Heartbeat,
            PROTO_LOCATION => Self::Location,
            PROTO_ALARM => Self::Alarm,
            PROTO_COMMAND => Self::Command,
            PROTO_INFORMATION => Self::Information,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Login => PROTO_LOGIN,
            Self::Response => PROTO_RESPONSE,
            Self::Heartbeat => PROTO_HEARTBEAT,
            Self::Location => PROTO_LOCATION,
            Self::Alarm => PROTO_ALARM,
            Self::Command => PROTO_COMMAND,
            Self::Information => PROTO_INFORMATION,
            Self::Unknown(other) => *other,
        }
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login => write!(f, "login"),
            Self::Response => write!(f, "response"),
            Self::Heartbeat => write!(f, "heartbeat"),
            Self::Location => write!(f, "location"),
            Self::Alarm => write!(f, "alarm"),
            Self::Command => write!(f, "command"),
            Self::Information => write!(f, "information"),
            Self::Unknown(code) => write!(f, "unknown(0x{code:02X})"),
        }
    }
}

/// One complete, typed protocol message.
///
/// The length and checksum fields are derived during encoding and
/// validated during decoding; they are not stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub start: StartMarker,
    pub protocol: ProtocolType,
    pub payload: Payload,
    pub serial: u16,
}

impl Frame {
    /// Decode a complete frame with the stock checksum seed.
    pub fn decode(bytes: &[u8]) -> Result<Frame> {
        Self::decode_with_secret(bytes, DEFAULT_CRC_SECRET)
    }

    /// Decode a complete frame, validating markers, length and checksum.
    ///
    /// # Errors
    ///
    /// - `UnknownStart` when the first two bytes are neither marker
    /// - `FramingError` when the end marker is wrong
    /// - `ChecksumMismatch` when the trailing checksum does not match
    /// - `TruncatedPayload` when the length field disagrees with the
    ///   bytes present, or a payload sub-structure is short
    /// - `MalformedArrayLength` when a location array span does not
    ///   divide evenly by its entry size
    pub fn decode_with_secret(bytes: &[u8], secret: u16) -> Result<Frame> {
        if bytes.len() < 2 {
            return Err(Error::TruncatedPayload(format!(
                "frame of {} bytes is shorter than the start marker",
                bytes.len()
            )));
        }
        let start = StartMarker::from_bytes([bytes[0], bytes[1]])?;
        let width = start.length_width();

        let total = bytes.len();
        if total < 2 + width + LENGTH_OVERHEAD + END_MARKER.len() {
            return Err(Error::TruncatedPayload(format!(
                "frame of {total} bytes cannot hold the fixed fields"
            )));
        }
        if bytes[total - 2..] != END_MARKER {
            return Err(Error::FramingError(format!(
                "bad end marker 0x{:02X}{:02X}",
                bytes[total - 2],
                bytes[total - 1]
            )));
        }

        // The checksum seals the span from the length field through the
        // serial, so it is validated before the length field is trusted.
        let span = &bytes[2..total - 4];
        let expected = checksum::crc16(span, secret);
        let actual = u16::from_be_bytes([bytes[total - 4], bytes[total - 3]]);
        if expected != actual {
            return Err(Error::ChecksumMismatch { expected, actual });
        }

        // The length field must agree with the frame's actual extent.
        let length = match start {
            StartMarker::Short => bytes[2] as usize,
            StartMarker::Long => u16::from_be_bytes([bytes[2], bytes[3]]) as usize,
        };
        if length != total - 2 - width - END_MARKER.len() {
            return Err(Error::TruncatedPayload(format!(
                "declared length {length} does not match the {} bytes present",
                total - 2 - width - END_MARKER.len()
            )));
        }

        let protocol = ProtocolType::from_u8(bytes[2 + width]);
        let payload_bytes = &bytes[2 + width + 1..total - 6];
        let serial = u16::from_be_bytes([bytes[total - 6], bytes[total - 5]]);
        let payload = Payload::parse(protocol, payload_bytes)?;

        Ok(Frame {
            start,
            protocol,
            payload,
            serial,
        })
    }

    /// Encode the frame with the stock checksum seed.
    pub fn encode(&self) -> Result<BytesMut> {
        self.encode_with_secret(DEFAULT_CRC_SECRET)
    }

    /// Serialize the frame, deriving length and checksum.
    ///
    /// # Errors
    /// Returns `PayloadMismatch` when the payload variant is illegal for
    /// the protocol type, and `FrameTooLarge` when the payload does not
    /// fit the length field selected by the start marker.
    pub fn encode_with_secret(&self, secret: u16) -> Result<BytesMut> {
        let payload = self.payload.encode_for(self.protocol)?;
        let length = payload.len() + LENGTH_OVERHEAD;

        let max = match self.start {
            StartMarker::Short => u8::MAX as usize,
            StartMarker::Long => u16::MAX as usize,
        };
        if length > max {
            return Err(Error::FrameTooLarge { size: length, max });
        }

        let mut buf = BytesMut::with_capacity(2 + 2 + length + END_MARKER.len());
        buf.put_slice(&self.start.bytes());
        match self.start {
            StartMarker::Short => buf.put_u8(length as u8),
            StartMarker::Long => buf.put_u16(length as u16),
        }
        buf.put_u8(self.protocol.as_u8());
        buf.put_slice(&payload);
        buf.put_u16(self.serial);

        let crc = checksum::crc16(&buf[2..], secret);
        buf.put_u16(crc);
        buf.put_slice(&END_MARKER);
        Ok(buf)
    }

    // ------------------------------------------------------------------
    // Outbound builders
    //
    // Reply start markers are fixed per protocol type by convention:
    // short for login and heartbeat, long for location, alarm,
    // information and command frames.
    // ------------------------------------------------------------------

    /// Login acknowledgement carrying the current UTC time.
    pub fn login_ack(now: DateTime<Utc>, serial: u16) -> Frame {
        Frame {
            start: StartMarker::Short,
            protocol: ProtocolType::Login,
            payload: Payload::LoginAck(LoginAck {
                datetime: DeviceTime::from_utc(now),
            }),
            serial,
        }
    }

    /// Empty heartbeat acknowledgement.
    pub fn heartbeat_ack(serial: u16) -> Frame {
        Frame {
            start: StartMarker::Short,
            protocol: ProtocolType::Heartbeat,
            payload: Payload::Ack,
            serial,
        }
    }

    /// Empty location acknowledgement.
    pub fn location_ack(serial: u16) -> Frame {
        Frame {
            start: StartMarker::Long,
            protocol: ProtocolType::Location,
            payload: Payload::Ack,
            serial,
        }
    }

    /// Empty alarm acknowledgement.
    pub fn alarm_ack(serial: u16) -> Frame {
        Frame {
            start: StartMarker::Long,
            protocol: ProtocolType::Alarm,
            payload: Payload::Ack,
            serial,
        }
    }

    /// Information acknowledgement (a single zero byte).
    pub fn information_ack(serial: u16) -> Frame {
        Frame {
            start: StartMarker::Long,
            protocol: ProtocolType::Information,
            payload: Payload::InfoAck,
            serial,
        }
    }

    /// Server command push wrapping an ASCII instruction.
    pub fn command(instruction: &str, serial: u16) -> Frame {
        Frame {
            start: StartMarker::Long,
            protocol: ProtocolType::Command,
            payload: Payload::Command(CommandData::instruction(instruction)),
            serial,
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame[{}](serial={}, start={:?})",
            self.protocol, self.serial, self.start
        )
    }
}
