//! Domain records projected from the upstream event stream.
//!
//! Every struct here doubles as its own partial: all fields except the id
//! are optional, and updates arrive as the same type with only the changed
//! fields set. The `merge_assign` helpers copy `Some` fields over, which is
//! the shallow newer-value-wins merge the projector rules build on.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A conversation endpoint, identified by an opaque JID string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<i64>,
    /// Seconds since the epoch of the last conversation activity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_timestamp: Option<i64>,
    /// Pin rank; present means pinned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mute_end_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
}

impl Chat {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Shallow merge: every `Some` field of `patch` replaces the stored one.
    ///
    /// The unread-count accumulation rule lives in the projector, not here;
    /// this is the plain merge used by upserts and history sync.
    pub fn merge_assign(&mut self, patch: &Chat) {
        if let Some(name) = &patch.name {
            self.name = Some(name.clone());
        }
        if let Some(n) = patch.unread_count {
            self.unread_count = Some(n);
        }
        if let Some(ts) = patch.conversation_timestamp {
            self.conversation_timestamp = Some(ts);
        }
        if let Some(p) = patch.pinned {
            self.pinned = Some(p);
        }
        if let Some(a) = patch.archived {
            self.archived = Some(a);
        }
        if let Some(m) = patch.mute_end_time {
            self.mute_end_time = Some(m);
        }
        if let Some(r) = patch.read_only {
            self.read_only = Some(r);
        }
    }
}

/// An address-book entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Push name the peer broadcasts about themselves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_profile: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img_url: Option<String>,
}

impl Contact {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn merge_assign(&mut self, patch: &Contact) {
        if let Some(name) = &patch.name {
            self.name = Some(name.clone());
        }
        if let Some(notify) = &patch.notify {
            self.notify = Some(notify.clone());
        }
        if let Some(v) = &patch.verified_name {
            self.verified_name = Some(v.clone());
        }
        if let Some(b) = &patch.business_profile {
            self.business_profile = Some(b.clone());
        }
        if let Some(s) = &patch.status {
            self.status = Some(s.clone());
        }
        if let Some(url) = &patch.img_url {
            self.img_url = Some(url.clone());
        }
    }
}

/// Identity triple of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    pub remote_jid: String,
    pub id: String,
    #[serde(default)]
    pub from_me: bool,
}

impl MessageKey {
    pub fn new(remote_jid: impl Into<String>, id: impl Into<String>, from_me: bool) -> Self {
        Self {
            remote_jid: remote_jid.into(),
            id: id.into(),
            from_me,
        }
    }
}

/// Delivery status ordinal. Only ever advances (monotonic).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum MessageStatus {
    Error = 0,
    Pending = 1,
    ServerAck = 2,
    DeliveryAck = 3,
    Read = 4,
    Played = 5,
}

impl MessageStatus {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Error),
            1 => Some(Self::Pending),
            2 => Some(Self::ServerAck),
            3 => Some(Self::DeliveryAck),
            4 => Some(Self::Read),
            5 => Some(Self::Played),
            _ => None,
        }
    }
}

impl Serialize for MessageStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for MessageStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let b = u8::deserialize(deserializer)?;
        MessageStatus::from_byte(b)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid message status {b}")))
    }
}

/// A per-user delivery/read receipt grafted onto a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserReceipt {
    pub user_jid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub played_timestamp: Option<i64>,
}

/// A reaction grafted onto a message. An empty `text` is a retraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    /// JID of the reacting user.
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_timestamp_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub key: MessageKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_timestamp: Option<i64>,
    /// Opaque message payload as produced by the upstream socket.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starred: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_receipt: Vec<UserReceipt>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<Reaction>,
}

impl Message {
    pub fn new(key: MessageKey) -> Self {
        Self {
            key,
            ..Default::default()
        }
    }
}

/// Partial update applied to a stored message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MessageStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starred: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
}

impl Message {
    /// Applies every `Some` field of the patch. The monotonic-status guard
    /// is the projector's job; by the time a patch reaches here its status
    /// field has already been vetted.
    pub fn merge_assign(&mut self, patch: &MessagePatch) {
        if let Some(ts) = patch.message_timestamp {
            self.message_timestamp = Some(ts);
        }
        if let Some(c) = &patch.content {
            self.content = Some(c.clone());
        }
        if let Some(s) = patch.status {
            self.status = Some(s);
        }
        if let Some(s) = patch.starred {
            self.starred = Some(s);
        }
        if let Some(p) = &patch.push_name {
            self.push_name = Some(p.clone());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupParticipant {
    pub id: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_super_admin: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMetadata {
    pub id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Group creation time, seconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Only admins may send messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announce: Option<bool>,
    /// Only admins may edit group info.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restrict: Option<bool>,
    #[serde(default)]
    pub participants: Vec<GroupParticipant>,
}

/// Partial update to group metadata. Participants move through the
/// dedicated participant events, never through this patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPatch {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announce: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restrict: Option<bool>,
}

impl GroupMetadata {
    pub fn merge_assign(&mut self, patch: &GroupPatch) {
        if let Some(s) = &patch.subject {
            self.subject = s.clone();
        }
        if let Some(o) = &patch.owner {
            self.owner = Some(o.clone());
        }
        if let Some(d) = &patch.description {
            self.description = Some(d.clone());
        }
        if let Some(a) = patch.announce {
            self.announce = Some(a);
        }
        if let Some(r) = patch.restrict {
            self.restrict = Some(r);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: i32,
    #[serde(default)]
    pub deleted: bool,
}

/// Binds a label to a chat or to a single message within a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LabelAssociation {
    #[serde(rename_all = "camelCase")]
    Chat { chat_id: String, label_id: String },
    #[serde(rename_all = "camelCase")]
    Message {
        chat_id: String,
        message_id: String,
        label_id: String,
    },
}

impl LabelAssociation {
    pub fn label_id(&self) -> &str {
        match self {
            Self::Chat { label_id, .. } | Self::Message { label_id, .. } => label_id,
        }
    }

    pub fn chat_id(&self) -> &str {
        match self {
            Self::Chat { chat_id, .. } | Self::Message { chat_id, .. } => chat_id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    #[default]
    Unavailable,
    Available,
    Composing,
    Recording,
    Paused,
}

/// Transient presence of one participant inside one chat. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceData {
    pub last_known_presence: Presence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<i64>,
}

pub type ChatPresences = HashMap<String, PresenceData>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Open,
    Connecting,
    Close,
}

/// Partial connection record. Updates merge field-wise; a field the
/// partial omits keeps its previous value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_disconnect: Option<serde_json::Value>,
}

impl ConnectionState {
    pub fn merge_assign(&mut self, patch: &ConnectionState) {
        if let Some(c) = patch.connection {
            self.connection = Some(c);
        }
        if let Some(qr) = &patch.qr {
            self.qr = Some(qr.clone());
        }
        if let Some(o) = patch.is_online {
            self.is_online = Some(o);
        }
        if let Some(d) = &patch.last_disconnect {
            self.last_disconnect = Some(d.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_merge_keeps_unset_fields() {
        let mut chat = Chat {
            id: "a@s.whatsapp.net".into(),
            name: Some("Alice".into()),
            unread_count: Some(2),
            ..Default::default()
        };

        chat.merge_assign(&Chat {
            id: "a@s.whatsapp.net".into(),
            archived: Some(true),
            ..Default::default()
        });

        assert_eq!(chat.name.as_deref(), Some("Alice"));
        assert_eq!(chat.unread_count, Some(2));
        assert_eq!(chat.archived, Some(true));
    }

    #[test]
    fn message_status_ordering() {
        assert!(MessageStatus::Read > MessageStatus::ServerAck);
        assert!(MessageStatus::Error < MessageStatus::Pending);
        assert_eq!(MessageStatus::from_byte(9), None);
    }

    #[test]
    fn message_status_serde_as_integer() {
        let json = serde_json::to_string(&MessageStatus::Read).unwrap();
        assert_eq!(json, "4");
        let back: MessageStatus = serde_json::from_str("4").unwrap();
        assert_eq!(back, MessageStatus::Read);
        assert!(serde_json::from_str::<MessageStatus>("42").is_err());
    }

    #[test]
    fn connection_state_merge_never_clears() {
        let mut state = ConnectionState {
            connection: Some(ConnectionStatus::Connecting),
            qr: Some("qr-blob".into()),
            ..Default::default()
        };

        state.merge_assign(&ConnectionState {
            connection: Some(ConnectionStatus::Open),
            ..Default::default()
        });

        assert_eq!(state.connection, Some(ConnectionStatus::Open));
        assert_eq!(state.qr.as_deref(), Some("qr-blob"));
    }

    #[test]
    fn label_association_serde_tagging() {
        let assoc = LabelAssociation::Message {
            chat_id: "c".into(),
            message_id: "m".into(),
            label_id: "l".into(),
        };
        let json = serde_json::to_value(&assoc).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["messageId"], "m");

        let back: LabelAssociation = serde_json::from_value(json).unwrap();
        assert_eq!(back, assoc);
    }
}
