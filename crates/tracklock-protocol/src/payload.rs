//! Typed payload model for every protocol variant.
//!
//! The payload is a tagged union selected by the frame's protocol byte.
//! Parsing is strict: every declared length must be consistent with the
//! bytes actually present, conditional sub-blocks are gated on *exact*
//! sub-length equality, and array spans must divide evenly by their entry
//! size. A payload that violates any of these rules is rejected as a
//! whole; no partial or repaired payloads are ever produced.
//!
//! Discriminator bytes inside payloads (signal strength, language, text
//! encoding, information type) keep unrecognized values in an explicit
//! catch-all variant so well-framed traffic from newer firmware still
//! round-trips.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Datelike, Timelike, Utc};
use tracklock_core::constants::*;
use tracklock_core::{Error, Imei, Result};

use crate::frame::ProtocolType;

/// Check that `buf` still holds at least `n` bytes before a fixed read.
fn ensure(buf: &impl Buf, n: usize, what: &str) -> Result<()> {
    if buf.remaining() < n {
        return Err(Error::TruncatedPayload(format!(
            "{what}: need {n} bytes, have {}",
            buf.remaining()
        )));
    }
    Ok(())
}

/// Reject payloads with bytes left over after their variant is consumed.
fn ensure_consumed(buf: &impl Buf, what: &str) -> Result<()> {
    if buf.has_remaining() {
        return Err(Error::TruncatedPayload(format!(
            "{what}: {} unconsumed trailing bytes",
            buf.remaining()
        )));
    }
    Ok(())
}

// ============================================================================
// Discriminator enums
// ============================================================================

/// Cellular signal strength reported in heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalStrength {
    NoSignal,
    ExtremelyWeak,
    Weak,
    Good,
    Strong,
    Unknown(u8),
}

impl SignalStrength {
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0x00 => Self::NoSignal,
            0x01 => Self::ExtremelyWeak,
            0x02 => Self::Weak,
            0x03 => Self::Good,
            0x04 => Self::Strong,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Self::NoSignal => 0x00,
            Self::ExtremelyWeak => 0x01,
            Self::Weak => 0x02,
            Self::Good => 0x03,
            Self::Strong => 0x04,
            Self::Unknown(other) => *other,
        }
    }
}

/// Device UI language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Chinese,
    English,
    Unknown(u8),
}

impl Language {
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0x01 => Self::Chinese,
            0x02 => Self::English,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Chinese => 0x01,
            Self::English => 0x02,
            Self::Unknown(other) => *other,
        }
    }
}

/// Text encoding of a command response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Ascii,
    Utf16Be,
    Unknown(u8),
}

impl TextEncoding {
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0x01 => Self::Ascii,
            0x02 => Self::Utf16Be,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Ascii => 0x01,
            Self::Utf16Be => 0x02,
            Self::Unknown(other) => *other,
        }
    }
}

/// Record type inside an information frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoKind {
    Imei,
    Imsi,
    Iccid,
    ChipId,
    BluetoothMac,
    UnlockKey,
    FirmwareVersion,
    Unrecognized(u8),
}

impl InfoKind {
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0x00 => Self::Imei,
            0x01 => Self::Imsi,
            0x02 => Self::Iccid,
            0x03 => Self::ChipId,
            0x04 => Self::BluetoothMac,
            0x05 => Self::UnlockKey,
            0x07 => Self::FirmwareVersion,
            other => Self::Unrecognized(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Imei => 0x00,
            Self::Imsi => 0x01,
            Self::Iccid => 0x02,
            Self::ChipId => 0x03,
            Self::BluetoothMac => 0x04,
            Self::UnlockKey => 0x05,
            Self::FirmwareVersion => 0x07,
            Self::Unrecognized(other) => *other,
        }
    }
}

/// Timezone hemisphere flag carried in the login record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    Eastern,
    Western,
}

/// GPS fix mode bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpsFixMode {
    Realtime,
    Differential,
}

/// East/west longitude flag in the GPS course record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LonHemisphere {
    East,
    West,
}

/// North/south latitude flag in the GPS course record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatHemisphere {
    South,
    North,
}

// ============================================================================
// Login
// ============================================================================

/// Bit-packed timezone and language record (2 bytes).
///
/// Layout, most significant bit first: 12-bit zone offset, 1-bit
/// hemisphere flag, 1 padding bit, 2-bit language code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimezoneLanguage {
    pub offset: u16,
    pub hemisphere: Hemisphere,
    pub language: u8,
}

impl TimezoneLanguage {
    fn parse(raw: u16) -> Self {
        TimezoneLanguage {
            offset: raw >> 4,
            hemisphere: if raw & 0x0008 != 0 {
                Hemisphere::Western
            } else {
                Hemisphere::Eastern
            },
            language: (raw & 0x0003) as u8,
        }
    }

    fn to_raw(self) -> u16 {
        let hemi = match self.hemisphere {
            Hemisphere::Eastern => 0,
            Hemisphere::Western => 1,
        };
        ((self.offset & 0x0FFF) << 4) | (hemi << 3) | u16::from(self.language & 0x03)
    }
}

/// Login announcement: device identity, model code and timezone record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginData {
    pub imei: Imei,
    pub model: u16,
    pub timezone: TimezoneLanguage,
}

impl LoginData {
    fn parse(mut buf: &[u8]) -> Result<Self> {
        ensure(&buf, 12, "login")?;
        let mut imei = [0u8; Imei::WIRE_LEN];
        buf.copy_to_slice(&mut imei);
        let model = buf.get_u16();
        let timezone = TimezoneLanguage::parse(buf.get_u16());
        ensure_consumed(&buf, "login")?;
        Ok(LoginData {
            imei: Imei::from_wire(&imei),
            model,
            timezone,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.imei.to_wire());
        buf.put_u16(self.model);
        buf.put_u16(self.timezone.to_raw());
    }
}

// ============================================================================
// Heartbeat
// ============================================================================

/// Bit-packed device status flags from a heartbeat (1 byte).
///
/// Bit 6 carries the GPS-fix flag, bit 2 the charging flag and bit 0 the
/// lock-engaged flag; the remaining bits are padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceStatus {
    pub gps_fixed: bool,
    pub charging: bool,
    pub locked: bool,
}

impl DeviceStatus {
    fn parse(raw: u8) -> Self {
        DeviceStatus {
            gps_fixed: raw & 0x40 != 0,
            charging: raw & 0x04 != 0,
            locked: raw & 0x01 != 0,
        }
    }

    fn to_raw(self) -> u8 {
        (u8::from(self.gps_fixed) << 6) | (u8::from(self.charging) << 2) | u8::from(self.locked)
    }
}

/// Periodic heartbeat: status flags, battery voltage and signal quality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatData {
    pub status: DeviceStatus,
    /// Raw battery voltage reading; no unit conversion is applied here.
    pub voltage: u16,
    pub signal: SignalStrength,
    pub external_port: u8,
    pub language: Language,
}

impl HeartbeatData {
    fn parse(mut buf: &[u8]) -> Result<Self> {
        ensure(&buf, 6, "heartbeat")?;
        let status = DeviceStatus::parse(buf.get_u8());
        let voltage = buf.get_u16();
        let signal = SignalStrength::from_u8(buf.get_u8());
        let external_port = buf.get_u8();
        let language = Language::from_u8(buf.get_u8());
        ensure_consumed(&buf, "heartbeat")?;
        Ok(HeartbeatData {
            status,
            voltage,
            signal,
            external_port,
            language,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.status.to_raw());
        buf.put_u16(self.voltage);
        buf.put_u8(self.signal.as_u8());
        buf.put_u8(self.external_port);
        buf.put_u8(self.language.as_u8());
    }
}

// ============================================================================
// Response
// ============================================================================

/// Device reply to a previously pushed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseData {
    /// Content length as declared by the device; carried verbatim.
    pub declared_len: u32,
    pub encoding: TextEncoding,
    pub content: Bytes,
}

impl ResponseData {
    fn parse(mut buf: &[u8]) -> Result<Self> {
        ensure(&buf, 5, "response")?;
        let declared_len = buf.get_u32();
        let encoding = TextEncoding::from_u8(buf.get_u8());
        let content = Bytes::copy_from_slice(buf);
        Ok(ResponseData {
            declared_len,
            encoding,
            content,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.declared_len);
        buf.put_u8(self.encoding.as_u8());
        buf.put_slice(&self.content);
    }
}

// ============================================================================
// Location / alarm
// ============================================================================

/// Six-byte wire timestamp: two-digit year, month, day, hour, minute, second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceTime {
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DeviceTime {
    /// Build a wire timestamp from a UTC instant.
    pub fn from_utc(now: DateTime<Utc>) -> Self {
        DeviceTime {
            year: (now.year() % 100) as u8,
            month: now.month() as u8,
            day: now.day() as u8,
            hour: now.hour() as u8,
            minute: now.minute() as u8,
            second: now.second() as u8,
        }
    }

    fn parse(buf: &mut impl Buf) -> Self {
        DeviceTime {
            year: buf.get_u8(),
            month: buf.get_u8(),
            day: buf.get_u8(),
            hour: buf.get_u8(),
            minute: buf.get_u8(),
            second: buf.get_u8(),
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.year);
        buf.put_u8(self.month);
        buf.put_u8(self.day);
        buf.put_u8(self.hour);
        buf.put_u8(self.minute);
        buf.put_u8(self.second);
    }
}

/// Bit-packed course/status record of a GPS fix (2 bytes).
///
/// Layout, most significant bit first: 2 padding bits, fix mode, the
/// positioning flag, longitude and latitude hemisphere flags, and a
/// 10-bit course.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CourseStatus {
    pub fix_mode: GpsFixMode,
    pub positioned: bool,
    pub longitude: LonHemisphere,
    pub latitude: LatHemisphere,
    pub course: u16,
}

impl CourseStatus {
    fn parse(raw: u16) -> Self {
        CourseStatus {
            fix_mode: if raw & 0x2000 != 0 {
                GpsFixMode::Differential
            } else {
                GpsFixMode::Realtime
            },
            positioned: raw & 0x1000 != 0,
            longitude: if raw & 0x0800 != 0 {
                LonHemisphere::West
            } else {
                LonHemisphere::East
            },
            latitude: if raw & 0x0400 != 0 {
                LatHemisphere::North
            } else {
                LatHemisphere::South
            },
            course: raw & 0x03FF,
        }
    }

    fn to_raw(self) -> u16 {
        let mode = match self.fix_mode {
            GpsFixMode::Realtime => 0,
            GpsFixMode::Differential => 1,
        };
        let lon = match self.longitude {
            LonHemisphere::East => 0,
            LonHemisphere::West => 1,
        };
        let lat = match self.latitude {
            LatHemisphere::South => 0,
            LatHemisphere::North => 1,
        };
        (mode << 13)
            | (u16::from(self.positioned) << 12)
            | (lon << 11)
            | (lat << 10)
            | (self.course & 0x03FF)
    }
}

/// GPS block of a location report (present only when its sub-length is 12).
///
/// Latitude and longitude are carried as the device's raw fixed-point
/// words; conversion to decimal degrees is left to the collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpsFix {
    pub satellites: u8,
    pub latitude: u32,
    pub longitude: u32,
    pub speed: u8,
    pub course: CourseStatus,
}

impl GpsFix {
    fn parse(buf: &mut impl Buf) -> Self {
        GpsFix {
            satellites: buf.get_u8(),
            latitude: buf.get_u32(),
            longitude: buf.get_u32(),
            speed: buf.get_u8(),
            course: CourseStatus::parse(buf.get_u16()),
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.satellites);
        buf.put_u32(self.latitude);
        buf.put_u32(self.longitude);
        buf.put_u8(self.speed);
        buf.put_u16(self.course.to_raw());
    }
}

/// Primary cell tower block (present only when its sub-length is 9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellTower {
    pub mcc: u16,
    pub mnc: u8,
    pub lac: u16,
    pub cell_id: u32,
    pub rssi: u8,
}

impl CellTower {
    fn parse(buf: &mut impl Buf) -> Self {
        CellTower {
            mcc: buf.get_u16(),
            mnc: buf.get_u8(),
            lac: buf.get_u16(),
            cell_id: buf.get_uint(3) as u32,
            rssi: buf.get_u8(),
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.mcc);
        buf.put_u8(self.mnc);
        buf.put_u16(self.lac);
        buf.put_uint(u64::from(self.cell_id), 3);
        buf.put_u8(self.rssi);
    }
}

/// Secondary cell tower sighting (6 bytes each).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellNeighbor {
    pub lac: u16,
    pub cell_id: u32,
    pub rssi: u8,
}

impl CellNeighbor {
    fn parse(buf: &mut impl Buf) -> Self {
        CellNeighbor {
            lac: buf.get_u16(),
            cell_id: buf.get_uint(3) as u32,
            rssi: buf.get_u8(),
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.lac);
        buf.put_uint(u64::from(self.cell_id), 3);
        buf.put_u8(self.rssi);
    }
}

/// Wi-Fi access point sighting (7 bytes each).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WifiAp {
    pub mac: [u8; 6],
    pub strength: u8,
}

impl WifiAp {
    fn parse(buf: &mut impl Buf) -> Self {
        let mut mac = [0u8; 6];
        buf.copy_to_slice(&mut mac);
        WifiAp {
            mac,
            strength: buf.get_u8(),
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.mac);
        buf.put_u8(self.strength);
    }
}

/// Trailing reserved block (present only when its sub-length is 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservedTail {
    pub bluetooth_flag: u16,
    pub reupload: bool,
}

impl ReservedTail {
    fn parse(buf: &mut impl Buf) -> Self {
        ReservedTail {
            bluetooth_flag: buf.get_u16(),
            reupload: buf.get_u8() != 0,
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.bluetooth_flag);
        buf.put_u8(u8::from(self.reupload));
    }
}

/// Location (or alarm) report.
///
/// Each optional block is announced by a sub-length byte; the block is
/// present only when the sub-length equals the block's exact size, and
/// any other value means "absent" without consuming bytes. The two array
/// spans derive their entry count from an integer division, and a span
/// that does not divide evenly is a malformed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationData {
    pub timestamp: DeviceTime,
    pub gps: Option<GpsFix>,
    pub main_cell: Option<CellTower>,
    pub cells: Vec<CellNeighbor>,
    pub wifi: Vec<WifiAp>,
    pub status: u8,
    pub reserved: Option<ReservedTail>,
}

impl LocationData {
    fn parse(mut buf: &[u8]) -> Result<Self> {
        ensure(&buf, 6, "location timestamp")?;
        let timestamp = DeviceTime::parse(&mut buf);

        ensure(&buf, 1, "gps sub-length")?;
        let gps_len = buf.get_u8();
        let gps = if gps_len == GPS_BLOCK_LEN {
            ensure(&buf, GPS_BLOCK_LEN as usize, "gps block")?;
            Some(GpsFix::parse(&mut buf))
        } else {
            None
        };

        ensure(&buf, 1, "main cell sub-length")?;
        let main_len = buf.get_u8();
        let main_cell = if main_len == MAIN_CELL_BLOCK_LEN {
            ensure(&buf, MAIN_CELL_BLOCK_LEN as usize, "main cell block")?;
            Some(CellTower::parse(&mut buf))
        } else {
            None
        };

        ensure(&buf, 1, "cell array sub-length")?;
        let cells_len = buf.get_u8();
        if cells_len % CELL_ENTRY_LEN != 0 {
            return Err(Error::MalformedArrayLength {
                span: cells_len,
                entry: CELL_ENTRY_LEN,
            });
        }
        ensure(&buf, cells_len as usize, "cell array")?;
        let mut cells = Vec::with_capacity((cells_len / CELL_ENTRY_LEN) as usize);
        for _ in 0..cells_len / CELL_ENTRY_LEN {
            cells.push(CellNeighbor::parse(&mut buf));
        }

        ensure(&buf, 1, "wifi array sub-length")?;
        let wifi_len = buf.get_u8();
        if wifi_len % WIFI_ENTRY_LEN != 0 {
            return Err(Error::MalformedArrayLength {
                span: wifi_len,
                entry: WIFI_ENTRY_LEN,
            });
        }
        ensure(&buf, wifi_len as usize, "wifi array")?;
        let mut wifi = Vec::with_capacity((wifi_len / WIFI_ENTRY_LEN) as usize);
        for _ in 0..wifi_len / WIFI_ENTRY_LEN {
            wifi.push(WifiAp::parse(&mut buf));
        }

        ensure(&buf, 2, "status and reserved sub-length")?;
        let status = buf.get_u8();
        let reserved_len = buf.get_u8();
        let reserved = if reserved_len == RESERVED_BLOCK_LEN {
            ensure(&buf, RESERVED_BLOCK_LEN as usize, "reserved block")?;
            Some(ReservedTail::parse(&mut buf))
        } else {
            None
        };

        ensure_consumed(&buf, "location")?;
        Ok(LocationData {
            timestamp,
            gps,
            main_cell,
            cells,
            wifi,
            status,
            reserved,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.timestamp.encode(buf);

        match &self.gps {
            Some(gps) => {
                buf.put_u8(GPS_BLOCK_LEN);
                gps.encode(buf);
            }
            None => buf.put_u8(0),
        }

        match &self.main_cell {
            Some(cell) => {
                buf.put_u8(MAIN_CELL_BLOCK_LEN);
                cell.encode(buf);
            }
            None => buf.put_u8(0),
        }

        buf.put_u8(self.cells.len() as u8 * CELL_ENTRY_LEN);
        for cell in &self.cells {
            cell.encode(buf);
        }

        buf.put_u8(self.wifi.len() as u8 * WIFI_ENTRY_LEN);
        for ap in &self.wifi {
            ap.encode(buf);
        }

        buf.put_u8(self.status);
        match &self.reserved {
            Some(tail) => {
                buf.put_u8(RESERVED_BLOCK_LEN);
                tail.encode(buf);
            }
            None => buf.put_u8(0),
        }
    }
}

// ============================================================================
// Information
// ============================================================================

/// One `(type, length, content)` record of an information frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoRecord {
    pub kind: InfoKind,
    pub content: Bytes,
}

fn parse_information(mut buf: &[u8]) -> Result<Vec<InfoRecord>> {
    let mut records = Vec::new();
    while buf.has_remaining() {
        ensure(&buf, 3, "information record header")?;
        let kind = InfoKind::from_u8(buf.get_u8());
        let len = buf.get_u16() as usize;
        ensure(&buf, len, "information record content")?;
        let content = Bytes::copy_from_slice(&buf[..len]);
        buf.advance(len);
        records.push(InfoRecord { kind, content });
    }
    Ok(records)
}

fn encode_information(records: &[InfoRecord], buf: &mut BytesMut) -> Result<()> {
    for record in records {
        if record.content.len() > u16::MAX as usize {
            return Err(Error::FrameTooLarge {
                size: record.content.len(),
                max: u16::MAX as usize,
            });
        }
        buf.put_u8(record.kind.as_u8());
        buf.put_u16(record.content.len() as u16);
        buf.put_slice(&record.content);
    }
    Ok(())
}

// ============================================================================
// Command
// ============================================================================

/// Server-issued command push: a flag byte followed by the instruction text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandData {
    pub server_flag: u8,
    pub content: Bytes,
}

impl CommandData {
    /// Wrap an ASCII instruction with server-flag zero.
    pub fn instruction(text: &str) -> Self {
        CommandData {
            server_flag: 0,
            content: Bytes::copy_from_slice(text.as_bytes()),
        }
    }

    fn parse(mut buf: &[u8]) -> Result<Self> {
        ensure(&buf, 1, "command")?;
        let server_flag = buf.get_u8();
        let content = Bytes::copy_from_slice(buf);
        Ok(CommandData {
            server_flag,
            content,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.server_flag);
        buf.put_slice(&self.content);
    }
}

// ============================================================================
// The payload union
// ============================================================================

/// Login acknowledgement body: current UTC time plus an empty reserved block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginAck {
    pub datetime: DeviceTime,
}

/// Tagged payload union, selected by the frame's protocol byte.
///
/// The `LoginAck`, `Ack` and `InfoAck` variants exist on the outbound
/// side only; inbound frames always decode into the device-originated
/// layouts for their protocol type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Login(LoginData),
    Heartbeat(HeartbeatData),
    Response(ResponseData),
    Location(LocationData),
    Information(Vec<InfoRecord>),
    Command(CommandData),
    /// Outbound login acknowledgement.
    LoginAck(LoginAck),
    /// Outbound empty acknowledgement (heartbeat, location, alarm).
    Ack,
    /// Outbound information acknowledgement (a single zero byte).
    InfoAck,
    /// Well-framed traffic with an unrecognized protocol byte.
    Unknown(Bytes),
}

impl Payload {
    /// Parse payload bytes according to the frame's protocol type.
    pub fn parse(protocol: ProtocolType, bytes: &[u8]) -> Result<Self> {
        match protocol {
            ProtocolType::Login => Ok(Payload::Login(LoginData::parse(bytes)?)),
            ProtocolType::Heartbeat => Ok(Payload::Heartbeat(HeartbeatData::parse(bytes)?)),
            ProtocolType::Response => Ok(Payload::Response(ResponseData::parse(bytes)?)),
            ProtocolType::Location | ProtocolType::Alarm => {
                Ok(Payload::Location(LocationData::parse(bytes)?))
            }
            ProtocolType::Information => Ok(Payload::Information(parse_information(bytes)?)),
            ProtocolType::Command => Ok(Payload::Command(CommandData::parse(bytes)?)),
            ProtocolType::Unknown(_) => Ok(Payload::Unknown(Bytes::copy_from_slice(bytes))),
        }
    }

    /// Serialize the payload, checking it is legal for `protocol`.
    ///
    /// # Errors
    /// Returns `Error::PayloadMismatch` when the variant cannot appear
    /// under the given protocol byte; this is a caller bug surfaced
    /// eagerly rather than a silently miscoded frame.
    pub fn encode_for(&self, protocol: ProtocolType) -> Result<BytesMut> {
        if !self.matches(protocol) {
            return Err(Error::PayloadMismatch(format!("{protocol}")));
        }
        let mut buf = BytesMut::new();
        match self {
            Payload::Login(data) => data.encode(&mut buf),
            Payload::Heartbeat(data) => data.encode(&mut buf),
            Payload::Response(data) => data.encode(&mut buf),
            Payload::Location(data) => data.encode(&mut buf),
            Payload::Information(records) => encode_information(records, &mut buf)?,
            Payload::Command(data) => data.encode(&mut buf),
            Payload::LoginAck(ack) => {
                ack.datetime.encode(&mut buf);
                // Reserved extension block, always empty.
                buf.put_u8(0);
            }
            Payload::Ack => {}
            Payload::InfoAck => buf.put_u8(0),
            Payload::Unknown(bytes) => buf.put_slice(bytes),
        }
        Ok(buf)
    }

    fn matches(&self, protocol: ProtocolType) -> bool {
        matches!(
            (protocol, self),
            (ProtocolType::Login, Payload::Login(_) | Payload::LoginAck(_))
                | (ProtocolType::Heartbeat, Payload::Heartbeat(_) | Payload::Ack)
                | (
                    ProtocolType::Location | ProtocolType::Alarm,
                    Payload::Location(_) | Payload::Ack
                )
                | (ProtocolType::Response, Payload::Response(_))
                | (
                    ProtocolType::Information,
                    Payload::Information(_) | Payload::InfoAck
                )
                | (ProtocolType::Command, Payload::Command(_))
                | (ProtocolType::Unknown(_), Payload::Unknown(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timezone_language_bit_layout() {
        // offset 0x120, western, language 2
        let raw = (0x120 << 4) | (1 << 3) | 2;
        let tz = TimezoneLanguage::parse(raw);
        assert_eq!(tz.offset, 0x120);
        assert_eq!(tz.hemisphere, Hemisphere::Western);
        assert_eq!(tz.language, 2);
        assert_eq!(tz.to_raw(), raw);
    }

    #[test]
    fn test_device_status_bits() {
        let status = DeviceStatus::parse(0b0100_0101);
        assert!(status.gps_fixed);
        assert!(status.charging);
        assert!(status.locked);
        assert_eq!(status.to_raw(), 0b0100_0101);

        let idle = DeviceStatus::parse(0b1011_1010);
        assert!(!idle.gps_fixed);
        assert!(!idle.charging);
        assert!(!idle.locked);
        // Padding bits are not preserved.
        assert_eq!(idle.to_raw(), 0);
    }

    #[test]
    fn test_course_status_bit_layout() {
        let raw = (1 << 13) | (1 << 12) | (1 << 10) | 0x155;
        let cs = CourseStatus::parse(raw);
        assert_eq!(cs.fix_mode, GpsFixMode::Differential);
        assert!(cs.positioned);
        assert_eq!(cs.longitude, LonHemisphere::East);
        assert_eq!(cs.latitude, LatHemisphere::North);
        assert_eq!(cs.course, 0x155);
        assert_eq!(cs.to_raw(), raw);
    }

    #[test]
    fn test_login_parse() {
        let mut bytes = vec![0x00, 0x00, 0x00, 0x00, 0x12, 0x34, 0x56, 0x78];
        bytes.extend_from_slice(&[0x00, 0x01]); // model
        bytes.extend_from_slice(&[0x1E, 0x02]); // tz 0x1E0, eastern, lang 2
        let data = LoginData::parse(&bytes).unwrap();
        assert_eq!(data.imei.as_str(), "12345678");
        assert_eq!(data.model, 0x0001);
        assert_eq!(data.timezone.offset, 0x1E0);
        assert_eq!(data.timezone.hemisphere, Hemisphere::Eastern);
    }

    #[test]
    fn test_login_parse_truncated() {
        let result = LoginData::parse(&[0x12, 0x34]);
        assert!(matches!(result, Err(Error::TruncatedPayload(_))));
    }

    #[test]
    fn test_login_rejects_trailing_bytes() {
        let bytes = [0u8; 13];
        let result = LoginData::parse(&bytes);
        assert!(matches!(result, Err(Error::TruncatedPayload(_))));
    }

    #[test]
    fn test_heartbeat_parse() {
        let bytes = [0x45, 0x01, 0x9A, 0x03, 0x00, 0x02];
        let data = HeartbeatData::parse(&bytes).unwrap();
        assert!(data.status.gps_fixed);
        assert_eq!(data.voltage, 0x019A);
        assert_eq!(data.signal, SignalStrength::Good);
        assert_eq!(data.language, Language::English);
    }

    #[test]
    fn test_heartbeat_unknown_discriminators_pass_through() {
        let bytes = [0x00, 0x00, 0x00, 0x7F, 0x00, 0x09];
        let data = HeartbeatData::parse(&bytes).unwrap();
        assert_eq!(data.signal, SignalStrength::Unknown(0x7F));
        assert_eq!(data.language, Language::Unknown(0x09));
    }

    fn location_bytes(gps_len: u8, cells_len: u8, wifi_len: u8) -> Vec<u8> {
        let mut bytes = vec![25, 7, 1, 12, 30, 0]; // timestamp
        bytes.push(gps_len);
        if gps_len == GPS_BLOCK_LEN {
            bytes.extend_from_slice(&[9, 0, 1, 2, 3, 4, 5, 6, 7, 8, 0x14, 0x55]);
        }
        bytes.push(0); // main cell absent
        bytes.push(cells_len);
        bytes.extend(std::iter::repeat_n(0xAA, cells_len as usize));
        bytes.push(wifi_len);
        bytes.extend(std::iter::repeat_n(0xBB, wifi_len as usize));
        bytes.push(0x01); // status
        bytes.push(0); // reserved absent
        bytes
    }

    #[test]
    fn test_location_gps_present_only_on_exact_sub_length() {
        let with_gps = LocationData::parse(&location_bytes(12, 0, 0)).unwrap();
        assert!(with_gps.gps.is_some());

        // Sub-length 11 means "absent", not "11 bytes of block".
        let without_gps = LocationData::parse(&location_bytes(11, 0, 0)).unwrap();
        assert!(without_gps.gps.is_none());

        let zero = LocationData::parse(&location_bytes(0, 0, 0)).unwrap();
        assert!(zero.gps.is_none());
    }

    #[test]
    fn test_location_array_counts() {
        let data = LocationData::parse(&location_bytes(0, 12, 14)).unwrap();
        assert_eq!(data.cells.len(), 2);
        assert_eq!(data.wifi.len(), 2);
    }

    #[test]
    fn test_location_malformed_array_lengths() {
        let result = LocationData::parse(&location_bytes(0, 7, 0));
        assert!(matches!(
            result,
            Err(Error::MalformedArrayLength { span: 7, entry: 6 })
        ));

        let result = LocationData::parse(&location_bytes(0, 0, 13));
        assert!(matches!(
            result,
            Err(Error::MalformedArrayLength { span: 13, entry: 7 })
        ));
    }

    #[test]
    fn test_location_reserved_block() {
        let mut bytes = location_bytes(0, 0, 0);
        *bytes.last_mut().unwrap() = 3;
        bytes.extend_from_slice(&[0x00, 0x01, 0x01]);
        let data = LocationData::parse(&bytes).unwrap();
        let tail = data.reserved.unwrap();
        assert_eq!(tail.bluetooth_flag, 0x0001);
        assert!(tail.reupload);
    }

    #[test]
    fn test_information_records() {
        let mut bytes = vec![0x00, 0x00, 0x04];
        bytes.extend_from_slice(b"imei");
        bytes.extend_from_slice(&[0x07, 0x00, 0x02]);
        bytes.extend_from_slice(b"v1");
        bytes.extend_from_slice(&[0x06, 0x00, 0x00]);

        let records = parse_information(&bytes).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].kind, InfoKind::Imei);
        assert_eq!(records[0].content.as_ref(), b"imei");
        assert_eq!(records[1].kind, InfoKind::FirmwareVersion);
        assert_eq!(records[2].kind, InfoKind::Unrecognized(0x06));
    }

    #[test]
    fn test_information_truncated_record() {
        let bytes = [0x00, 0x00, 0x09, b'x'];
        assert!(matches!(
            parse_information(&bytes),
            Err(Error::TruncatedPayload(_))
        ));
    }

    #[test]
    fn test_command_instruction() {
        let cmd = CommandData::instruction("UNLOCK#");
        assert_eq!(cmd.server_flag, 0);
        assert_eq!(cmd.content.as_ref(), b"UNLOCK#");
    }

    #[test]
    fn test_payload_mismatch_fails_fast() {
        let payload = Payload::Ack;
        assert!(matches!(
            payload.encode_for(ProtocolType::Response),
            Err(Error::PayloadMismatch(_))
        ));
    }

    #[test]
    fn test_info_ack_is_single_zero_byte() {
        let bytes = Payload::InfoAck
            .encode_for(ProtocolType::Information)
            .unwrap();
        assert_eq!(bytes.as_ref(), &[0x00]);
    }

    #[test]
    fn test_login_ack_layout() {
        let ack = Payload::LoginAck(LoginAck {
            datetime: DeviceTime {
                year: 25,
                month: 8,
                day: 4,
                hour: 10,
                minute: 20,
                second: 30,
            },
        });
        let bytes = ack.encode_for(ProtocolType::Login).unwrap();
        assert_eq!(bytes.as_ref(), &[25, 8, 4, 10, 20, 30, 0]);
    }
}
