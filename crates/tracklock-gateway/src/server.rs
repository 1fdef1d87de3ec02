//! TCP listener for device traffic.
//!
//! One task per accepted connection. Each task exclusively owns its
//! [`Session`] and its framed stream, multiplexing between inbound
//! frames from the device and operator commands queued through the
//! registry handle:
//!
//! ```text
//! device ──> TrackerCodec ──> Session ──┬──> reply frame ──> device
//!                                       └──> event ──> EventSink
//! operator ──> DeviceRegistry ──> command queue ──> Session serial ──> device
//! ```
//!
//! Decode errors discard the offending frame and keep the connection
//! alive; only a transport-level close ends the task. On close the task
//! unregisters its identity, unless a newer connection has already
//! superseded it.

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};
use tracklock_core::{Error, Result};
use tracklock_protocol::{ProtocolType, TrackerCodec};

use crate::events::EventSink;
use crate::registry::{DeviceHandle, DeviceRegistry};
use crate::session::Session;

/// Listener for device connections.
pub struct DeviceServer {
    listener: TcpListener,
    registry: DeviceRegistry,
    sink: EventSink,
    secret: u16,
}

impl DeviceServer {
    /// Bind the device listener.
    pub async fn bind(
        addr: &str,
        registry: DeviceRegistry,
        sink: EventSink,
        secret: u16,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("listening for device traffic on {}", listener.local_addr()?);
        Ok(DeviceServer {
            listener,
            registry,
            sink,
            secret,
        })
    }

    /// Local address the listener is bound to.
    ///
    /// Useful for tests binding port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Error::from)
    }

    /// Accept connections forever, spawning one task per device.
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            debug!(peer = %addr, "accepted device connection");

            if let Err(e) = stream.set_nodelay(true) {
                warn!(peer = %addr, error = %e, "failed to set TCP_NODELAY");
            }

            let registry = self.registry.clone();
            let sink = self.sink.clone();
            let secret = self.secret;
            tokio::spawn(async move {
                handle_connection(stream, addr, registry, sink, secret).await;
            });
        }
    }
}

/// Serve one device connection until it closes.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: DeviceRegistry,
    sink: EventSink,
    secret: u16,
) {
    let conn_id = registry.next_conn_id();
    let mut framed = Framed::new(stream, TrackerCodec::with_secret(secret));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut session = Session::new();

    loop {
        tokio::select! {
            inbound = framed.next() => match inbound {
                Some(Ok(frame)) => {
                    debug!(peer = %addr, frame = %frame, "frame received");
                    let is_login = frame.protocol == ProtocolType::Login;
                    let turn = session.handle(&frame, Utc::now());

                    // The device-facing reply always goes out before (and
                    // independently of) event forwarding.
                    if let Some(reply) = turn.reply {
                        if let Err(e) = framed.send(reply).await {
                            warn!(peer = %addr, error = %e, "failed to write reply");
                            break;
                        }
                    }

                    if is_login {
                        if let Some(imei) = session.identity() {
                            registry.register(
                                imei.clone(),
                                DeviceHandle::new(conn_id, addr, tx.clone()),
                            );
                        }
                    }

                    if let Some(event) = turn.event {
                        sink.publish(event);
                    }
                }
                Some(Err(e)) => {
                    // Bad frame: log and keep reading. The codec has
                    // already discarded the offending bytes.
                    warn!(peer = %addr, error = %e, "discarding invalid frame");
                }
                None => break,
            },
            outbound = rx.recv() => {
                let Some(command) = outbound else { break };
                let serial = session.next_serial();
                info!(
                    device_id = ?session.identity(),
                    command = %command,
                    serial,
                    "pushing command to device"
                );
                if let Err(e) = framed.send(command.frame(serial)).await {
                    warn!(peer = %addr, error = %e, "failed to write command");
                    break;
                }
            }
        }
    }

    if let Some(imei) = session.identity() {
        registry.unregister(imei, conn_id);
    }
    info!(peer = %addr, "device connection closed");
}
