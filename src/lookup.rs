use crate::connection::Connection;
use crate::image_data::{EndUser, ListenerKey};
use rustc_hash::FxHashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;
#[cfg(test)] use mockall::automock;

/// A connection shared between the registry and whoever is processing a message for it. The
///  lock serializes message processing per connection.
pub type ConnectionHandle = Arc<tokio::sync::Mutex<Connection>>;

/// Finds the connection an inbound message belongs to. Port based lookups match on the local
///  port; matching the remote port requires the connection's state and is done by the caller
///  once it holds the connection's lock.
#[cfg_attr(test, automock)]
pub trait ConnectionLookup: Send + Sync + 'static {
    /// the listening connection for a validated connect request
    fn find_listener(&self, destination: &EndUser) -> Option<ConnectionHandle>;

    /// `local_port` is the message's destination port
    fn find_by_ports(&self, local_port: u16, remote_port: u16) -> Option<ConnectionHandle>;

    /// A connect-init that came back as undeliverable still has our own ports in it, i.e.
    ///  `src_port` is the local port.
    fn find_by_returned_header(&self, dst_port: u16, src_port: u16) -> Option<ConnectionHandle>;
}

#[derive(Default)]
struct TableInner {
    by_port: FxHashMap<u16, ConnectionHandle>,
    listeners: FxHashMap<ListenerKey, ConnectionHandle>,
    wildcard_listener: Option<ConnectionHandle>,
}

/// In-memory [ConnectionLookup]. Reads take a shared lock that is held only for the hash
///  lookup.
#[derive(Default)]
pub struct ConnectionTable {
    inner: RwLock<TableInner>,
}

impl ConnectionTable {
    pub fn new() -> ConnectionTable {
        Default::default()
    }

    fn read<T>(&self, f: impl FnOnce(&TableInner) -> T) -> T {
        let inner = self.inner.read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&inner)
    }

    fn write<T>(&self, f: impl FnOnce(&mut TableInner) -> T) -> T {
        let mut inner = self.inner.write()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut inner)
    }

    pub fn insert(&self, local_port: u16, conn: ConnectionHandle) {
        debug!("registering connection on port {}", local_port);
        self.write(|inner| inner.by_port.insert(local_port, conn));
    }

    pub fn remove(&self, local_port: u16) -> Option<ConnectionHandle> {
        self.write(|inner| inner.by_port.remove(&local_port))
    }

    pub fn bind_listener(&self, key: ListenerKey, conn: ConnectionHandle) {
        debug!("registering listener for {:?}", key);
        self.write(|inner| inner.listeners.insert(key, conn));
    }

    pub fn unbind_listener(&self, key: &ListenerKey) -> Option<ConnectionHandle> {
        self.write(|inner| inner.listeners.remove(key))
    }

    /// the listener for connect requests that match no other listener
    pub fn set_wildcard_listener(&self, conn: Option<ConnectionHandle>) {
        self.write(|inner| inner.wildcard_listener = conn);
    }
}

impl ConnectionLookup for ConnectionTable {
    fn find_listener(&self, destination: &EndUser) -> Option<ConnectionHandle> {
        let key = destination.listener_key();
        self.read(|inner| {
            inner.listeners.get(&key)
                .or(inner.wildcard_listener.as_ref())
                .cloned()
        })
    }

    fn find_by_ports(&self, local_port: u16, _remote_port: u16) -> Option<ConnectionHandle> {
        self.read(|inner| inner.by_port.get(&local_port).cloned())
    }

    fn find_by_returned_header(&self, _dst_port: u16, src_port: u16) -> Option<ConnectionHandle> {
        self.read(|inner| inner.by_port.get(&src_port).cloned())
    }
}
