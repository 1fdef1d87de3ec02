//! Process-wide registry of connected devices.
//!
//! The registry maps a device identity to a handle for its live
//! connection so operator commands can be routed to the right session.
//! It is the only piece of state shared between connection tasks and the
//! control surface, and it sits behind a lock with short critical
//! sections; a lookup racing a disconnect observes either the pre- or
//! post-unregister state, never a torn one.
//!
//! At most one handle exists per identity. A device that logs in again
//! over a new connection replaces the previous entry without closing the
//! superseded connection. To keep a superseded connection's eventual
//! disconnect from evicting its successor, every entry records the
//! connection id it came from and `unregister` only removes a matching
//! entry.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracklock_core::Imei;
use tracklock_protocol::DeviceCommand;

/// Handle to one live device connection.
///
/// Cloning is cheap; the handle carries a sender into the connection
/// task's command queue plus connection metadata.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    conn_id: u64,
    remote_addr: SocketAddr,
    connected_at: DateTime<Utc>,
    tx: mpsc::UnboundedSender<DeviceCommand>,
}

impl DeviceHandle {
    /// Create a handle for a connection's command queue.
    pub fn new(conn_id: u64, remote_addr: SocketAddr, tx: mpsc::UnboundedSender<DeviceCommand>) -> Self {
        DeviceHandle {
            conn_id,
            remote_addr,
            connected_at: Utc::now(),
            tx,
        }
    }

    /// Id of the connection that registered this handle.
    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// Remote peer address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// When the connection registered.
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Queue a command onto the owning connection.
    ///
    /// Returns `false` when the connection task is already gone.
    pub fn send(&self, command: DeviceCommand) -> bool {
        self.tx.send(command).is_ok()
    }
}

/// Connection metadata snapshot for the control surface.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub device_id: Imei,
    pub remote_addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
}

/// Concurrency-safe identity → connection map.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    devices: RwLock<HashMap<Imei, DeviceHandle>>,
    next_conn_id: AtomicU64,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh connection id.
    pub fn next_conn_id(&self) -> u64 {
        self.inner.next_conn_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Insert or replace the handle for an identity.
    ///
    /// Replacement is intentional: the newest login wins and the
    /// superseded connection is left open.
    pub fn register(&self, imei: Imei, handle: DeviceHandle) {
        let replaced = self.inner.devices.write().insert(imei.clone(), handle);
        match replaced {
            Some(old) => info!(
                device_id = %imei,
                superseded_conn = old.conn_id(),
                "re-login superseded an existing registration"
            ),
            None => info!(device_id = %imei, "device registered"),
        }
    }

    /// Look up the live handle for an identity.
    ///
    /// A miss is a normal negative (the device is simply not connected),
    /// not a fault.
    pub fn lookup(&self, imei: &Imei) -> Option<DeviceHandle> {
        self.inner.devices.read().get(imei).cloned()
    }

    /// Remove the mapping for an identity, but only if it still belongs
    /// to the given connection. Returns whether an entry was removed.
    pub fn unregister(&self, imei: &Imei, conn_id: u64) -> bool {
        let mut devices = self.inner.devices.write();
        if devices.get(imei).is_some_and(|h| h.conn_id() == conn_id) {
            devices.remove(imei);
            debug!(device_id = %imei, conn_id, "device unregistered");
            true
        } else {
            false
        }
    }

    /// Identities of all currently registered devices.
    pub fn identities(&self) -> Vec<Imei> {
        self.inner.devices.read().keys().cloned().collect()
    }

    /// Metadata snapshot for one registered device.
    pub fn info(&self, imei: &Imei) -> Option<ConnectionInfo> {
        self.inner.devices.read().get(imei).map(|handle| ConnectionInfo {
            device_id: imei.clone(),
            remote_addr: handle.remote_addr(),
            connected_at: handle.connected_at(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(conn_id: u64) -> (DeviceHandle, mpsc::UnboundedReceiver<DeviceCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            DeviceHandle::new(conn_id, "127.0.0.1:4000".parse().unwrap(), tx),
            rx,
        )
    }

    fn imei() -> Imei {
        Imei::new("12345678").unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = DeviceRegistry::new();
        let (h, _rx) = handle(1);

        registry.register(imei(), h);
        assert!(registry.lookup(&imei()).is_some());
        assert!(registry.lookup(&Imei::new("99").unwrap()).is_none());
    }

    #[test]
    fn test_relogin_supersedes() {
        let registry = DeviceRegistry::new();
        let (h1, _rx1) = handle(1);
        let (h2, _rx2) = handle(2);

        registry.register(imei(), h1);
        registry.register(imei(), h2);

        assert_eq!(registry.lookup(&imei()).unwrap().conn_id(), 2);
        assert_eq!(registry.identities().len(), 1);
    }

    #[test]
    fn test_unregister_requires_matching_connection() {
        let registry = DeviceRegistry::new();
        let (h1, _rx1) = handle(1);
        let (h2, _rx2) = handle(2);

        registry.register(imei(), h1);
        registry.register(imei(), h2);

        // The superseded connection closing must not evict the new one.
        assert!(!registry.unregister(&imei(), 1));
        assert!(registry.lookup(&imei()).is_some());

        assert!(registry.unregister(&imei(), 2));
        assert!(registry.lookup(&imei()).is_none());
    }

    #[test]
    fn test_unregister_absent_is_noop() {
        let registry = DeviceRegistry::new();
        assert!(!registry.unregister(&imei(), 1));
    }

    #[test]
    fn test_identities() {
        let registry = DeviceRegistry::new();
        let (h1, _rx1) = handle(1);
        let (h2, _rx2) = handle(2);

        registry.register(Imei::new("11").unwrap(), h1);
        registry.register(Imei::new("22").unwrap(), h2);

        let mut ids: Vec<String> = registry
            .identities()
            .iter()
            .map(|i| i.to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["11", "22"]);
    }

    #[test]
    fn test_handle_send_after_receiver_dropped() {
        let (h, rx) = handle(1);
        drop(rx);
        assert!(!h.send(DeviceCommand::Unlock));
    }

    #[test]
    fn test_conn_ids_are_unique() {
        let registry = DeviceRegistry::new();
        let a = registry.next_conn_id();
        let b = registry.next_conn_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_info_snapshot() {
        let registry = DeviceRegistry::new();
        let (h, _rx) = handle(7);
        registry.register(imei(), h);

        let info = registry.info(&imei()).unwrap();
        assert_eq!(info.device_id, imei());
        assert_eq!(info.remote_addr.port(), 4000);
    }
}
