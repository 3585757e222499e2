use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::SendTimeoutError, Receiver, Sender};

use crate::error::{registry_error, Error, RegistryErrorKind};
use crate::message::Envelope;

pub use events::UserId;

pub const DEFAULT_MAX_CONNECTIONS_PER_DEVICE: usize = 3;
pub const DEFAULT_CONNECTION_BUFFER_SIZE: usize = 64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique sequence id of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ConnectionId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse client category used for per-class connection limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Mobile,
    Web,
    Desktop,
}

#[derive(Debug, PartialEq, Eq)]
pub struct DeviceClassParseError(pub String);

impl fmt::Display for DeviceClassParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unknown device class '{}'", self.0)
    }
}

impl std::error::Error for DeviceClassParseError {}

impl FromStr for DeviceClass {
    type Err = DeviceClassParseError;
    fn from_str(value: &str) -> Result<DeviceClass, Self::Err> {
        match value.to_lowercase().as_str() {
            "mobile" => Ok(DeviceClass::Mobile),
            "web" => Ok(DeviceClass::Web),
            "desktop" => Ok(DeviceClass::Desktop),
            _ => Err(DeviceClassParseError(value.to_string())),
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeviceClass::Mobile => write!(f, "mobile"),
            DeviceClass::Web => write!(f, "web"),
            DeviceClass::Desktop => write!(f, "desktop"),
        }
    }
}

/// Transport write failures. These are handled locally by the router and
/// never escalate past it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WriteError {
    #[error("connection closed")]
    Closed,
    #[error("write timed out")]
    TimedOut,
}

/// One live duplex channel owned by the registry.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    user_id: UserId,
    device_class: DeviceClass,
    created_at: DateTime<Utc>,
    sender: Sender<Envelope>,
    /// `Some` while the offline backlog is being replayed; holds live
    /// envelopes routed meanwhile so they arrive after the backlog.
    held: Arc<Mutex<Option<Vec<Envelope>>>>,
}

impl ConnectionHandle {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn device_class(&self) -> DeviceClass {
        self.device_class
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Write an envelope to the connection's outbound buffer, giving up after
    /// `timeout` so a stalled client cannot hold up the caller.
    pub async fn write(&self, envelope: Envelope, timeout: Duration) -> Result<(), WriteError> {
        self.sender
            .send_timeout(envelope, timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => WriteError::TimedOut,
                SendTimeoutError::Closed(_) => WriteError::Closed,
            })
    }

    pub fn is_replaying(&self) -> bool {
        self.held_slot().is_some()
    }

    /// Keep `envelope` back if the handle is still replaying its backlog.
    /// Returns it unchanged when the handle is live.
    pub fn hold(&self, envelope: Envelope) -> Option<Envelope> {
        match self.held_slot().as_mut() {
            Some(held) => {
                held.push(envelope);
                None
            }
            None => Some(envelope),
        }
    }

    /// Take the envelopes held so far. When none are left the handle turns
    /// live in the same step and `None` is returned, so nothing can be held
    /// after the last take.
    pub fn take_held(&self) -> Option<Vec<Envelope>> {
        let mut slot = self.held_slot();
        match slot.as_mut() {
            Some(held) if !held.is_empty() => Some(std::mem::take(held)),
            _ => {
                *slot = None;
                None
            }
        }
    }

    /// Turn live unconditionally, returning whatever was still held.
    pub fn end_replay(&self) -> Vec<Envelope> {
        self.held_slot().take().unwrap_or_default()
    }

    fn held_slot(&self) -> MutexGuard<'_, Option<Vec<Envelope>>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A freshly attached connection together with the receiving end of its
/// outbound buffer, which the transport layer drains onto the wire.
#[derive(Debug)]
pub struct Attached {
    pub handle: ConnectionHandle,
    pub receiver: Receiver<Envelope>,
}

/// Live connections of a single user, grouped by device class in attach order.
#[derive(Debug, Default)]
struct UserConnections {
    by_device: HashMap<DeviceClass, Vec<ConnectionHandle>>,
}

impl UserConnections {
    fn count(&self, device_class: DeviceClass) -> usize {
        self.by_device.get(&device_class).map_or(0, Vec::len)
    }

    fn remove(&mut self, device_class: DeviceClass, id: ConnectionId) {
        if let Some(handles) = self.by_device.get_mut(&device_class) {
            handles.retain(|h| h.id != id);
            if handles.is_empty() {
                self.by_device.remove(&device_class);
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.by_device.is_empty()
    }

    fn snapshot(&self) -> Vec<ConnectionHandle> {
        self.by_device.values().flatten().cloned().collect()
    }
}

/// Connection registry with dual indices.
///
/// All mutation goes through `attach`/`detach`. Locking is scoped to the
/// DashMap shard holding a user's entry, so one user's churn never blocks
/// unrelated users, and readers never see a handle half removed.
pub struct ConnectionRegistry {
    max_per_device: usize,
    buffer_size: usize,

    /// Primary storage: lookup by connection id - O(1)
    connections: DashMap<ConnectionId, ConnectionHandle>,

    /// Secondary index: per-user, per-device-class handles for routing - O(1)
    user_index: DashMap<UserId, UserConnections>,
}

impl ConnectionRegistry {
    pub fn new(max_per_device: usize, buffer_size: usize) -> Self {
        Self {
            max_per_device,
            buffer_size: buffer_size.max(1),
            connections: DashMap::new(),
            user_index: DashMap::new(),
        }
    }

    /// Register a new connection for `user_id` on `device_class`.
    ///
    /// Fails with `CapacityExceeded` when the user already holds the maximum
    /// number of connections for that device class; existing handles are left
    /// untouched and the caller must refuse the underlying connection.
    pub fn attach(&self, user_id: &str, device_class: DeviceClass) -> Result<Attached, Error> {
        self.attach_with(user_id, device_class, false)
    }

    /// Like [`attach`](Self::attach), but the handle starts out replaying:
    /// routed envelopes are held until `Router::catch_up` has delivered the
    /// user's offline backlog to it.
    pub fn attach_replaying(
        &self,
        user_id: &str,
        device_class: DeviceClass,
    ) -> Result<Attached, Error> {
        self.attach_with(user_id, device_class, true)
    }

    fn attach_with(
        &self,
        user_id: &str,
        device_class: DeviceClass,
        replaying: bool,
    ) -> Result<Attached, Error> {
        let mut entry = self.user_index.entry(user_id.to_string()).or_default();

        if entry.count(device_class) >= self.max_per_device {
            let empty = entry.is_empty();
            drop(entry);
            if empty {
                self.user_index.remove_if(user_id, |_, e| e.is_empty());
            }
            warn!(
                "Refusing {} connection for user {}: limit of {} reached",
                device_class, user_id, self.max_per_device
            );
            return Err(registry_error(
                RegistryErrorKind::CapacityExceeded,
                &format!("{device_class} connection limit reached for user {user_id}"),
            ));
        }

        let (sender, receiver) = mpsc::channel(self.buffer_size);
        let handle = ConnectionHandle {
            id: ConnectionId::next(),
            user_id: user_id.to_string(),
            device_class,
            created_at: Utc::now(),
            sender,
            held: Arc::new(Mutex::new(replaying.then(Vec::new))),
        };

        entry
            .by_device
            .entry(device_class)
            .or_default()
            .push(handle.clone());
        self.connections.insert(handle.id, handle.clone());
        drop(entry);

        debug!(
            "Attached connection {} for user {} ({})",
            handle.id, user_id, device_class
        );

        Ok(Attached { handle, receiver })
    }

    /// Remove a handle. Returns `false` when it was already gone; calling this
    /// twice is not an error.
    pub fn detach(&self, handle: &ConnectionHandle) -> bool {
        if self.connections.remove(&handle.id).is_none() {
            return false;
        }

        if let Some(mut entry) = self.user_index.get_mut(&handle.user_id) {
            entry.remove(handle.device_class, handle.id);

            // Clean up empty user entries
            if entry.is_empty() {
                drop(entry); // Release lock before removal
                self.user_index
                    .remove_if(&handle.user_id, |_, e| e.is_empty());
            }
        }

        debug!(
            "Detached connection {} for user {} ({})",
            handle.id, handle.user_id, handle.device_class
        );
        true
    }

    /// Invoke `f` once per handle attached to `user_id`, over a snapshot taken
    /// before the first call: attaches and detaches that happen meanwhile are
    /// not observed.
    pub fn for_each<F>(&self, user_id: &str, mut f: F)
    where
        F: FnMut(&ConnectionHandle),
    {
        for handle in self.snapshot(user_id).iter() {
            f(handle);
        }
    }

    /// Copy of every handle currently attached for `user_id`.
    pub fn snapshot(&self, user_id: &str) -> Vec<ConnectionHandle> {
        self.user_index
            .get(user_id)
            .map(|entry| entry.snapshot())
            .unwrap_or_default()
    }

    /// O(1) presence check.
    pub fn has_any(&self, user_id: &str) -> bool {
        self.user_index
            .get(user_id)
            .is_some_and(|entry| !entry.is_empty())
    }

    pub fn count(&self, user_id: &str, device_class: DeviceClass) -> usize {
        self.user_index
            .get(user_id)
            .map_or(0, |entry| entry.count(device_class))
    }

    pub fn get(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.connections.get(&id).map(|h| h.clone())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn user_count(&self) -> usize {
        self.user_index.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_CONNECTIONS_PER_DEVICE,
            DEFAULT_CONNECTION_BUFFER_SIZE,
        )
    }
}
