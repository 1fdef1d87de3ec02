//! Core constants for the tracker/lock wire protocol.
//!
//! This module defines the protocol-level constants shared by the codec and
//! the gateway. The devices speak a length-prefixed binary protocol framed
//! by fixed start and end markers:
//!
//! ```text
//! ┌───────┬────────┬──────────┬─────────┬────────┬──────────┬───────┐
//! │ start │ length │ protocol │ payload │ serial │ checksum │  end  │
//! │ 2 B   │ 1|2 B  │   1 B    │   N B   │  2 B   │   2 B    │  2 B  │
//! └───────┴────────┴──────────┴─────────┴────────┴──────────┴───────┘
//! ```
//!
//! The start marker selects the width of the length field: `0x7878` carries
//! a one-byte length, `0x7979` a two-byte big-endian length. The length
//! field counts everything from the protocol byte through the checksum.
//! Modifying these values breaks compatibility with deployed hardware.

// ============================================================================
// Frame delimiters
// ============================================================================

/// Start marker for short-form frames (one-byte length field).
pub const START_SHORT: [u8; 2] = [0x78, 0x78];

/// Start marker for long-form frames (two-byte big-endian length field).
pub const START_LONG: [u8; 2] = [0x79, 0x79];

/// Fixed frame terminator (CR LF).
pub const END_MARKER: [u8; 2] = [0x0D, 0x0A];

/// Bytes counted by the length field besides the payload:
/// protocol (1) + serial (2) + checksum (2).
pub const LENGTH_OVERHEAD: usize = 5;

// ============================================================================
// Protocol type codes
// ============================================================================

/// Device login / credential announcement.
pub const PROTO_LOGIN: u8 = 0x01;

/// Device reply to a previously pushed server command.
pub const PROTO_RESPONSE: u8 = 0x21;

/// Periodic status heartbeat.
pub const PROTO_HEARTBEAT: u8 = 0x23;

/// Location report (GPS / cell / Wi-Fi).
pub const PROTO_LOCATION: u8 = 0x32;

/// Alarm report; shares the location payload layout.
pub const PROTO_ALARM: u8 = 0x33;

/// Server-issued command push.
pub const PROTO_COMMAND: u8 = 0x80;

/// Device information records (IMEI, ICCID, firmware, ...).
pub const PROTO_INFORMATION: u8 = 0x98;

// ============================================================================
// Checksum
// ============================================================================

/// Default initial value for the frame CRC.
///
/// Some firmware builds are provisioned with a non-standard seed; the
/// gateway accepts an override through its configuration.
pub const DEFAULT_CRC_SECRET: u16 = 0xFFFF;

// ============================================================================
// Location sub-block sizes
// ============================================================================

/// Exact sub-length that marks the GPS block as present.
pub const GPS_BLOCK_LEN: u8 = 12;

/// Exact sub-length that marks the primary cell-tower block as present.
pub const MAIN_CELL_BLOCK_LEN: u8 = 9;

/// Size of one secondary cell-tower entry.
pub const CELL_ENTRY_LEN: u8 = 6;

/// Size of one Wi-Fi access-point sighting.
pub const WIFI_ENTRY_LEN: u8 = 7;

/// Exact sub-length that marks the reserved tail block as present.
pub const RESERVED_BLOCK_LEN: u8 = 3;

// ============================================================================
// Command instructions
// ============================================================================

/// Instruction text that releases the lock.
pub const CMD_UNLOCK: &str = "UNLOCK#";

/// Instruction text that requests an immediate location report.
pub const CMD_LOCATE: &str = "LJDW#";

/// Instruction text that makes the device ring (find-me).
pub const CMD_RING: &str = "SDFIND,ON,3,15,1#";
