//! Gateway runtime for tracker/lock field devices.
//!
//! This crate wires the protocol codec into a running service: a TCP
//! listener that owns one session per device connection, a registry
//! routing operator commands to live sessions, an event sink forwarding
//! derived events to an external collector, and an HTTP control surface.
//!
//! # Components
//!
//! - [`session::Session`]: per-connection reply and event state machine
//! - [`registry::DeviceRegistry`]: identity → live connection map
//! - [`dispatcher::CommandDispatcher`]: operator command routing
//! - [`events::EventSink`]: best-effort HTTP event forwarding
//! - [`server::DeviceServer`]: TCP accept loop for device traffic
//! - [`control`]: HTTP control surface
//! - [`config::GatewayConfig`]: environment-based configuration

pub mod config;
pub mod control;
pub mod dispatcher;
pub mod events;
pub mod registry;
pub mod server;
pub mod session;

pub use config::GatewayConfig;
pub use control::ControlState;
pub use dispatcher::{CommandDispatcher, DispatchError};
pub use events::{DeviceEvent, EventSink};
pub use registry::{ConnectionInfo, DeviceHandle, DeviceRegistry};
pub use server::DeviceServer;
pub use session::{Session, Turn};
