//! Real-time delivery core.
//!
//! Decides, for each outbound event addressed to a user, whether to push it
//! over that user's live connections or hand it to the user's offline queue,
//! optionally sealing the payload on the way.
//!
//! # Architecture
//!
//! - **Dual-index registry**: O(1) lookups by connection id and by user, with
//!   per-user, per-device-class capacity limits. Locking is scoped to a
//!   user's shard, never global.
//! - **Router**: fans an envelope out to every live handle of the target
//!   concurrently, each write bounded by a timeout. Dead handles are detached.
//!   Offline users get a queued copy when the caller asks for one.
//! - **Queue bridge**: one logical queue per user on a [`broker::Broker`],
//!   drained lazily on the next attach and deleted once empty.
//! - **Sealing**: AES-256-GCM with per-user derived keys; sealed payloads are
//!   tagged so consumers can tell them apart from plaintext.
//!
//! # Message Flow
//!
//! 1. The transport attaches a connection via [`ConnectionRegistry::attach`]
//!    and replays the offline queue with [`Router::catch_up`]
//! 2. A workflow commits and publishes a `DomainEvent`
//! 3. [`DeliveryEventHandler`] builds one envelope per recipient and calls
//!    [`Router::route`]
//! 4. The router writes to live handles or queues the envelope
//! 5. The transport streams the connection's buffer to the client and
//!    detaches on disconnect
//!
//! # Modules
//!
//! - `connection`: ConnectionRegistry, ConnectionHandle, DeviceClass
//! - `router`: live/offline routing decisions and fan-out
//! - `queue`: per-user offline queue bridge
//! - `broker`: broker primitives and an in-process broker
//! - `seal`: payload sealing
//! - `message`: Envelope, EventKind and Payload definitions

pub mod broker;
pub mod connection;
pub mod domain_event_handler;
pub mod error;
pub mod message;
pub mod queue;
pub mod router;
pub mod seal;

pub use connection::{Attached, ConnectionHandle, ConnectionId, ConnectionRegistry, DeviceClass};
pub use domain_event_handler::DeliveryEventHandler;
pub use error::Error;
pub use message::{Envelope, EventKind, Payload};
pub use queue::QueueBridge;
pub use router::{Delivery, Router};
pub use seal::Sealer;
