pub mod checksum;
pub mod codec;
pub mod commands;
pub mod frame;
pub mod payload;

pub use codec::TrackerCodec;
pub use commands::DeviceCommand;
pub use frame::{Frame, ProtocolType, StartMarker};
pub use payload::{
    CellNeighbor, CellTower, CommandData, CourseStatus, DeviceStatus, DeviceTime, GpsFix,
    GpsFixMode, HeartbeatData, Hemisphere, InfoKind, InfoRecord, Language, LatHemisphere,
    LocationData, LoginAck, LoginData, LonHemisphere, Payload, ReservedTail, ResponseData,
    SignalStrength, TextEncoding, TimezoneLanguage, WifiAp,
};
