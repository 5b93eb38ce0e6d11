//! Connection-agnostic, event-sourced in-memory replica of a
//! WhatsApp-Web-style account.
//!
//! Events flow in over a [`miroir_shared::events::EventBus`]; [`bind`]
//! attaches a [`Replica`] to a bus and the projection rules in
//! [`projector`] fold every event into the queryable collections. State
//! can be persisted to and restored from a single JSON snapshot.

pub mod error;
pub mod keys;
pub mod ordered;
pub mod projector;
pub mod repo;
pub mod replica;
pub mod snapshot;
pub mod socket;

pub use error::{Result, StoreError};
pub use ordered::{InsertMode, OrderedDictionary};
pub use projector::SideEffect;
pub use replica::{bind, shared, MessageCursor, Replica, ReplicaConfig, SharedReplica};
pub use repo::ObjectRepository;
pub use snapshot::Snapshot;
pub use socket::Socket;
