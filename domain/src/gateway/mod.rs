//! Narrow interfaces to the relation, group, dialog and message services.
//!
//! Implementations live with the service clients; the domain layer only
//! sees these traits. Every call may fail remotely. Mutating calls come in
//! do/undo pairs so they can be used as saga steps and their compensations.

pub mod dialog;
pub mod error;
pub mod group;
pub mod message;
pub mod relation;

pub use dialog::DialogGateway;
pub use error::{gateway_error, Error, GatewayErrorKind};
pub use group::GroupGateway;
pub use message::MessageGateway;
pub use relation::RelationGateway;
