//! Typed events emitted by the upstream socket, and the broadcast bus that
//! carries them to whoever binds a replica.
//!
//! Event names mirror the upstream wire names verbatim so a recorded stream
//! can be replayed from JSON.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::constants::EVENT_BUS_CAPACITY;
use crate::models::{
    Chat, ChatPresences, ConnectionState, Contact, GroupMetadata, GroupPatch, Label,
    LabelAssociation, Message, MessageKey, MessagePatch, Reaction, UserReceipt,
};

/// How a batch of upserted messages is positioned in the chat sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertKind {
    Append,
    Prepend,
    /// Live message pushed by the server; appends, and synthesizes the chat
    /// if it does not exist yet.
    Notify,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesUpsert {
    pub messages: Vec<Message>,
    #[serde(rename = "type")]
    pub kind: UpsertKind,
}

/// Either a targeted delete of individual messages or a wipe of one chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessagesDelete {
    ByKeys { keys: Vec<MessageKey> },
    AllInChat { all: bool, jid: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageUpdate {
    pub key: MessageKey,
    pub update: MessagePatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptUpdate {
    pub key: MessageKey,
    pub receipt: UserReceipt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionUpdate {
    pub key: MessageKey,
    pub reaction: Reaction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceUpdate {
    pub id: String,
    pub presences: ChatPresences,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySyncType {
    InitialBootstrap,
    Full,
    Recent,
    PushName,
    /// Requested slice of older history; never folded into the replica.
    OnDemand,
}

/// Bulk state pushed by the server when a session (re)connects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySync {
    #[serde(default)]
    pub chats: Vec<Chat>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<Message>,
    /// True when this set supersedes everything already projected.
    #[serde(default)]
    pub is_latest: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_type: Option<HistorySyncType>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantAction {
    Add,
    Remove,
    Promote,
    Demote,
    Other,
}

// Unknown actions fold into `Other` instead of failing the whole event.
impl<'de> Deserialize<'de> for ParticipantAction {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "add" => Self::Add,
            "remove" => Self::Remove,
            "promote" => Self::Promote,
            "demote" => Self::Demote,
            _ => Self::Other,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupParticipantsUpdate {
    pub id: String,
    #[serde(default)]
    pub author: String,
    pub participants: Vec<String>,
    pub action: ParticipantAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssociationKind {
    Add,
    Remove,
    Other,
}

impl<'de> Deserialize<'de> for AssociationKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "add" => Self::Add,
            "remove" => Self::Remove,
            _ => Self::Other,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelAssociationUpdate {
    #[serde(rename = "type")]
    pub kind: AssociationKind,
    pub association: LabelAssociation,
}

/// Every event kind the replica consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum Event {
    #[serde(rename = "connection.update")]
    ConnectionUpdate(ConnectionState),
    #[serde(rename = "messaging-history.set")]
    MessagingHistorySet(HistorySync),
    #[serde(rename = "contacts.upsert")]
    ContactsUpsert(Vec<Contact>),
    #[serde(rename = "contacts.update")]
    ContactsUpdate(Vec<Contact>),
    #[serde(rename = "chats.upsert")]
    ChatsUpsert(Vec<Chat>),
    #[serde(rename = "chats.update")]
    ChatsUpdate(Vec<Chat>),
    #[serde(rename = "chats.delete")]
    ChatsDelete(Vec<String>),
    #[serde(rename = "messages.upsert")]
    MessagesUpsert(MessagesUpsert),
    #[serde(rename = "messages.update")]
    MessagesUpdate(Vec<MessageUpdate>),
    #[serde(rename = "messages.delete")]
    MessagesDelete(MessagesDelete),
    #[serde(rename = "message-receipt.update")]
    MessageReceiptUpdate(Vec<ReceiptUpdate>),
    #[serde(rename = "messages.reaction")]
    MessagesReaction(Vec<ReactionUpdate>),
    #[serde(rename = "presence.update")]
    PresenceUpdate(PresenceUpdate),
    #[serde(rename = "groups.upsert")]
    GroupsUpsert(Vec<GroupMetadata>),
    #[serde(rename = "groups.update")]
    GroupsUpdate(Vec<GroupPatch>),
    #[serde(rename = "group-participants.update")]
    GroupParticipantsUpdate(GroupParticipantsUpdate),
    #[serde(rename = "labels.edit")]
    LabelsEdit(Label),
    #[serde(rename = "labels.association")]
    LabelsAssociation(LabelAssociationUpdate),
}

static NEXT_BUS_ID: AtomicU64 = AtomicU64::new(1);

/// Broadcast channel carrying [`Event`]s from one producer (the socket
/// adapter) to any number of replicas. Cloning shares the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    id: u64,
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            id: NEXT_BUS_ID.fetch_add(1, Ordering::Relaxed),
            tx,
        }
    }

    /// Stable identity of this bus, shared by all clones. Lets a replica
    /// make `bind` idempotent per source.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers. A bus with no subscribers drops
    /// the event, which is fine.
    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
