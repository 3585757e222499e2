use futures::future::join_all;
use futures::{pin_mut, StreamExt};
use log::*;
use serde_json::json;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::connection::{ConnectionHandle, ConnectionRegistry, UserId, WriteError};
use crate::error::Error;
use crate::message::{Envelope, EventKind};
use crate::queue::QueueBridge;
use crate::seal::Sealer;

pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// What happened to a routed envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The user had live connections. `failed` handles were detached.
    Live { delivered: usize, failed: usize },
    /// The user had no usable connection and the envelope went to the
    /// offline queue.
    Queued,
    /// Nothing was sent: the user was offline for a best-effort event, or the
    /// envelope was a system account's own echo.
    Dropped,
}

/// Decides, per envelope, between live fan-out and the offline queue.
pub struct Router {
    registry: Arc<ConnectionRegistry>,
    queue: QueueBridge,
    sealer: Option<Sealer>,
    write_timeout: Duration,
    system_user_ids: HashSet<UserId>,
}

impl Router {
    pub fn new(registry: Arc<ConnectionRegistry>, queue: QueueBridge) -> Self {
        Self {
            registry,
            queue,
            sealer: None,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            system_user_ids: HashSet::new(),
        }
    }

    /// Seal payloads before live delivery. The queue bridge seals its own
    /// copies at rest.
    pub fn with_sealer(mut self, sealer: Option<Sealer>) -> Self {
        self.sealer = sealer;
        self
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    pub fn with_system_users<I>(mut self, user_ids: I) -> Self
    where
        I: IntoIterator<Item = UserId>,
    {
        self.system_user_ids = user_ids.into_iter().collect();
        self
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn queue(&self) -> &QueueBridge {
        &self.queue
    }

    pub fn is_system_user(&self, user_id: &str) -> bool {
        self.system_user_ids.contains(user_id)
    }

    /// Route `envelope` to its target, writing to each live connection's
    /// outbound buffer.
    pub async fn route(&self, envelope: Envelope, push_offline: bool) -> Result<Delivery, Error> {
        let timeout = self.write_timeout;
        self.route_with(envelope, push_offline, move |handle, envelope| async move {
            handle.write(envelope, timeout).await
        })
        .await
    }

    /// Route `envelope` using `deliver` for every live handle.
    ///
    /// Handles are written concurrently and each write is bounded by the
    /// configured timeout. A failed write is logged and that handle detached;
    /// it never aborts delivery to the user's other handles. Handles still
    /// replaying their offline backlog hold the envelope until the replay
    /// ends. An error is returned only when the envelope had to be queued and
    /// the publish failed, or when sealing failed.
    pub async fn route_with<D, Fut>(
        &self,
        mut envelope: Envelope,
        push_offline: bool,
        deliver: D,
    ) -> Result<Delivery, Error>
    where
        D: Fn(ConnectionHandle, Envelope) -> Fut + Send + Sync,
        Fut: Future<Output = Result<(), WriteError>> + Send,
    {
        envelope.kind = envelope.effective_kind();
        let target = envelope.target_user_id.clone();

        if self.is_system_user(&target) && envelope.sender_id.as_deref() == Some(target.as_str())
        {
            trace!("Suppressing self echo for system user {}", target);
            return Ok(Delivery::Dropped);
        }

        let handles = self.registry.snapshot(&target);

        if handles.is_empty() {
            if !push_offline {
                trace!(
                    "User {} offline, dropping {:?} envelope",
                    target,
                    envelope.kind
                );
                return Ok(Delivery::Dropped);
            }
            let queued = self.enqueue(&target, envelope).await?;
            // The user may have attached and finished replaying while the
            // publish was in flight.
            if self.registry.has_any(&target) {
                self.redeliver(&target, &deliver).await;
            }
            return Ok(queued);
        }

        let (delivered, failed) = self.fan_out(&envelope, handles, &deliver).await?;

        if delivered == 0 && failed > 0 && push_offline {
            debug!(
                "Every connection of user {} failed, falling back to offline queue",
                target
            );
            return self.enqueue(&target, envelope).await;
        }

        Ok(Delivery::Live { delivered, failed })
    }

    /// Tell the user's other devices that `handle` came online or went away.
    /// Best effort: nothing is queued when no other device is attached.
    pub async fn announce_presence(
        &self,
        handle: &ConnectionHandle,
        online: bool,
    ) -> Result<Delivery, Error> {
        let envelope = Envelope::new(
            handle.user_id(),
            EventKind::Presence,
            json!({
                "connection_id": handle.id(),
                "device": handle.device_class(),
                "online": online,
            }),
        )
        .from_sender(handle.user_id())
        .from_connection(Some(handle.id()));

        self.route(envelope, false).await
    }

    /// Write one envelope to a single handle through the live path. Returns
    /// `false` (after detaching the handle) when the write fails.
    pub async fn deliver_to(&self, handle: &ConnectionHandle, envelope: Envelope) -> bool {
        let mut live = match self.seal(envelope) {
            Ok(live) => live,
            Err(e) => {
                error!("Failed to seal envelope for {}: {}", handle.user_id(), e);
                return false;
            }
        };
        live.connection_id = Some(handle.id());

        match handle.write(live, self.write_timeout).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Failed to write to connection {} of user {}: {}. Detaching it.",
                    handle.id(),
                    handle.user_id(),
                    e
                );
                self.registry.detach(handle);
                false
            }
        }
    }

    /// Replay the user's offline queue onto a freshly attached handle, then
    /// release whatever was routed to it live in the meantime, and turn it
    /// live.
    ///
    /// If the handle fails mid-way it is detached and every envelope it did
    /// not receive goes back on the queue for the next attach.
    pub async fn catch_up(&self, handle: &ConnectionHandle) -> Result<usize, Error> {
        let mut replayed = 0;
        let mut drain_error = None;
        let mut alive = true;

        while alive {
            if drain_error.is_none() {
                match self.replay_queue(handle, &mut replayed).await {
                    Ok(still_alive) => alive = still_alive,
                    Err(e) => drain_error = Some(e),
                }
            }
            if !alive {
                break;
            }
            match handle.take_held() {
                Some(held) => alive = self.deliver_held(handle, held).await,
                None => break,
            }
        }

        if !alive {
            self.requeue(handle.user_id(), handle.end_replay()).await;
        }

        if replayed > 0 {
            info!(
                "Replayed {} offline envelope(s) to connection {} of user {}",
                replayed,
                handle.id(),
                handle.user_id()
            );
        }

        match drain_error {
            Some(e) => Err(e),
            None => Ok(replayed),
        }
    }

    /// Drain the queue onto `handle`. Returns `false` once a write failed;
    /// that envelope is already back on the queue.
    async fn replay_queue(
        &self,
        handle: &ConnectionHandle,
        replayed: &mut usize,
    ) -> Result<bool, Error> {
        let pending = self.queue.drain(handle.user_id());
        pin_mut!(pending);

        while let Some(envelope) = pending.next().await {
            let envelope = envelope?;
            if !self.deliver_to(handle, envelope.clone()).await {
                self.queue.enqueue(handle.user_id(), envelope).await?;
                return Ok(false);
            }
            *replayed += 1;
        }
        Ok(true)
    }

    async fn deliver_held(&self, handle: &ConnectionHandle, held: Vec<Envelope>) -> bool {
        let mut pending = held.into_iter();
        while let Some(envelope) = pending.next() {
            if !self.deliver_to(handle, envelope.clone()).await {
                self.requeue(handle.user_id(), std::iter::once(envelope).chain(pending))
                    .await;
                return false;
            }
        }
        true
    }

    /// Move whatever is queued for `target` onto their current handles.
    async fn redeliver<D, Fut>(&self, target: &str, deliver: &D)
    where
        D: Fn(ConnectionHandle, Envelope) -> Fut + Send + Sync,
        Fut: Future<Output = Result<(), WriteError>> + Send,
    {
        let pending = self.queue.drain(target);
        pin_mut!(pending);

        while let Some(envelope) = pending.next().await {
            let envelope = match envelope {
                Ok(envelope) => envelope,
                Err(e) => {
                    error!("Failed to redeliver queued envelopes to {}: {}", target, e);
                    return;
                }
            };

            let handles = self.registry.snapshot(target);
            let delivered = match self.fan_out(&envelope, handles, deliver).await {
                Ok((delivered, _)) => delivered,
                Err(e) => {
                    error!("Failed to redeliver envelope to {}: {}", target, e);
                    0
                }
            };
            if delivered == 0 {
                // offline again; the next attach picks it up
                let _ = self.enqueue(target, envelope).await;
                return;
            }
        }
        debug!("Redelivered queued envelopes to {} after a late enqueue", target);
    }

    /// Write `envelope` to every handle except its origin. Returns the
    /// delivered and failed counts; failed handles are detached.
    async fn fan_out<D, Fut>(
        &self,
        envelope: &Envelope,
        handles: Vec<ConnectionHandle>,
        deliver: &D,
    ) -> Result<(usize, usize), Error>
    where
        D: Fn(ConnectionHandle, Envelope) -> Fut + Send + Sync,
        Fut: Future<Output = Result<(), WriteError>> + Send,
    {
        let target = &envelope.target_user_id;
        let live = self.seal(envelope.clone())?;

        let writes = handles
            .into_iter()
            .filter(|handle| Some(handle.id()) != envelope.origin_connection)
            .map(|handle| {
                let mut copy = live.clone();
                copy.connection_id = Some(handle.id());
                let write = handle.hold(copy).map(|copy| {
                    tokio::time::timeout(self.write_timeout, deliver(handle.clone(), copy))
                });
                async move {
                    let result = match write {
                        // released by catch_up after the backlog
                        None => Ok(()),
                        Some(write) => write.await.unwrap_or(Err(WriteError::TimedOut)),
                    };
                    (handle, result)
                }
            });

        let mut delivered = 0;
        let mut failed = 0;
        for (handle, result) in join_all(writes).await {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    warn!(
                        "Failed to write to connection {} of user {}: {}. Detaching it.",
                        handle.id(),
                        target,
                        e
                    );
                    self.registry.detach(&handle);
                }
            }
        }

        Ok((delivered, failed))
    }

    async fn requeue<I>(&self, user_id: &str, envelopes: I)
    where
        I: IntoIterator<Item = Envelope>,
    {
        for envelope in envelopes {
            let _ = self.enqueue(user_id, envelope).await;
        }
    }

    fn seal(&self, envelope: Envelope) -> Result<Envelope, Error> {
        match &self.sealer {
            Some(sealer) => Ok(sealer.seal(envelope)?),
            None => Ok(envelope),
        }
    }

    async fn enqueue(&self, target: &str, envelope: Envelope) -> Result<Delivery, Error> {
        match self.queue.enqueue(target, envelope).await {
            Ok(()) => Ok(Delivery::Queued),
            Err(e) => {
                error!("Failed to queue envelope for offline user {}: {}", target, e);
                Err(e)
            }
        }
    }
}
