//! On-demand fetch capability of the upstream socket.
//!
//! The replica only ever calls these two methods; everything else the
//! socket does reaches the replica through the event bus. Implementations
//! log their own failures and surface them as `None` — a failed fetch must
//! never mutate replica state.

use async_trait::async_trait;

use miroir_shared::models::GroupMetadata;

#[async_trait]
pub trait Socket: Send + Sync {
    /// Current profile picture URL for a user or group, if any.
    async fn profile_picture_url(&self, jid: &str) -> Option<String>;

    /// Full group metadata, if the socket can resolve it.
    async fn group_metadata(&self, jid: &str) -> Option<GroupMetadata>;
}
