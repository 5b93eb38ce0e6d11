//! Snapshot persistence: the whole projected state as a single JSON
//! artifact, written pretty-printed and read back tolerantly — missing
//! top-level fields are treated as empty, unknown ones are ignored.
//!
//! Presences and the connection record are transient and never persisted.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use miroir_shared::models::{Chat, Contact, Label, LabelAssociation, Message};

use crate::error::Result;
use crate::ordered::InsertMode;
use crate::replica::{message_dictionary, Replica};

/// Label collection as found on disk. Older snapshots carried a plain
/// array; the map form is what we emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelsField {
    Map(HashMap<String, Label>),
    List(Vec<Label>),
}

impl Default for LabelsField {
    fn default() -> Self {
        Self::Map(HashMap::new())
    }
}

impl LabelsField {
    fn into_labels(self) -> Vec<Label> {
        match self {
            Self::Map(map) => map.into_values().collect(),
            Self::List(list) => list,
        }
    }
}

/// Serialized replica state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Snapshot {
    /// ISO 8601 timestamp of when the snapshot was taken.
    pub created_at: String,
    /// Crate version that produced the snapshot.
    pub version: String,
    pub chats: Vec<Chat>,
    pub contacts: HashMap<String, Contact>,
    pub messages: HashMap<String, Vec<Message>>,
    pub labels: LabelsField,
    pub label_associations: Vec<LabelAssociation>,
}

impl Replica {
    pub fn to_snapshot(&self) -> Snapshot {
        let messages = self
            .messages
            .iter()
            .map(|(jid, dict)| (jid.clone(), dict.values().to_vec()))
            .collect();

        Snapshot {
            created_at: chrono::Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            chats: self.chats.values().to_vec(),
            contacts: self.contacts.clone(),
            messages,
            labels: LabelsField::Map(self.labels.as_map().clone()),
            label_associations: self.label_associations.values().to_vec(),
        }
    }

    /// Replace the projected collections with the snapshot's contents,
    /// preserving the stored order of every sequence.
    pub fn load_snapshot(&mut self, snapshot: Snapshot) {
        self.chats.load(snapshot.chats);
        self.contacts = snapshot.contacts;

        self.messages.clear();
        for (jid, list) in snapshot.messages {
            let mut dict = message_dictionary();
            dict.load(list);
            self.messages.insert(jid, dict);
        }

        self.labels.clear();
        for label in snapshot.labels.into_labels() {
            self.labels.upsert_by_id(&label.id, &label);
        }

        self.label_associations.clear();
        for assoc in snapshot.label_associations {
            self.label_associations.upsert(assoc, InsertMode::Append);
        }
    }

    /// Write the snapshot to `path` as pretty-printed JSON.
    pub async fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.to_snapshot())?;
        tokio::fs::write(path, json.as_bytes()).await?;
        info!(path = %path.display(), "snapshot written");
        Ok(())
    }

    /// Load a snapshot from `path`. A missing file is a no-op; any other
    /// I/O or parse failure propagates.
    pub async fn read_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = match tokio::fs::read_to_string(path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no snapshot to read");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let snapshot: Snapshot = serde_json::from_str(&json)?;
        self.load_snapshot(snapshot);
        info!(path = %path.display(), "snapshot restored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miroir_shared::events::{
        AssociationKind, Event, LabelAssociationUpdate, MessagesUpsert, UpsertKind,
    };
    use miroir_shared::models::MessageKey;

    fn populated() -> Replica {
        let mut r = Replica::default();
        let mut chat = Chat::new("A");
        chat.unread_count = Some(3);
        chat.conversation_timestamp = Some(1_700_000_000);
        r.apply(Event::ChatsUpsert(vec![chat, Chat::new("B")]));

        let mut contact = Contact::new("A");
        contact.name = Some("Alice".into());
        r.apply(Event::ContactsUpsert(vec![contact]));

        r.apply(Event::MessagesUpsert(MessagesUpsert {
            messages: vec![
                Message::new(MessageKey::new("A", "m1", false)),
                Message::new(MessageKey::new("A", "m2", true)),
            ],
            kind: UpsertKind::Append,
        }));

        r.apply(Event::LabelsEdit(Label {
            id: "l1".into(),
            name: "Work".into(),
            color: 2,
            deleted: false,
        }));
        r.apply(Event::LabelsAssociation(LabelAssociationUpdate {
            kind: AssociationKind::Add,
            association: LabelAssociation::Chat {
                chat_id: "A".into(),
                label_id: "l1".into(),
            },
        }));
        r
    }

    /// Snapshots compare equal modulo the taken-at metadata.
    fn strip_meta(mut s: Snapshot) -> Snapshot {
        s.created_at = String::new();
        s.version = String::new();
        s
    }

    #[test]
    fn snapshot_round_trip_preserves_state() {
        let original = populated();
        let snapshot = original.to_snapshot();

        let mut restored = Replica::default();
        restored.load_snapshot(snapshot.clone());

        assert_eq!(
            strip_meta(restored.to_snapshot()),
            strip_meta(snapshot)
        );
        assert_eq!(restored.chat("A").unwrap().unread_count, Some(3));
        assert_eq!(
            restored.load_messages("A", 10, None).len(),
            original.load_messages("A", 10, None).len()
        );
        assert_eq!(restored.get_chat_labels("A").len(), 1);
    }

    #[test]
    fn snapshot_emits_the_map_label_form() {
        let json = serde_json::to_value(populated().to_snapshot()).unwrap();
        assert!(json["labels"].is_object());
        assert_eq!(json["labels"]["l1"]["name"], "Work");
    }

    #[test]
    fn snapshot_accepts_label_array_form() {
        let snapshot: Snapshot = serde_json::from_value(serde_json::json!({
            "chats": [],
            "labels": [{"id": "l1", "name": "Old", "color": 0, "deleted": false}]
        }))
        .unwrap();

        let mut r = Replica::default();
        r.load_snapshot(snapshot);
        assert_eq!(r.get_label("l1").unwrap().name, "Old");
    }

    #[test]
    fn snapshot_tolerates_missing_and_unknown_fields() {
        let snapshot: Snapshot = serde_json::from_value(serde_json::json!({
            "chats": [{"id": "A"}],
            "somethingNew": {"ignored": true}
        }))
        .unwrap();

        let mut r = Replica::default();
        r.load_snapshot(snapshot);
        assert!(r.chat("A").is_some());
        assert!(r.get_labels().is_empty());
    }

    #[tokio::test]
    async fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica.json");

        let original = populated();
        original.write_to_file(&path).await.unwrap();

        let mut restored = Replica::default();
        restored.read_from_file(&path).await.unwrap();

        assert_eq!(
            strip_meta(restored.to_snapshot()),
            strip_meta(original.to_snapshot())
        );
    }

    #[tokio::test]
    async fn reading_a_missing_path_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = populated();
        r.read_from_file(dir.path().join("absent.json")).await.unwrap();
        assert!(r.chat("A").is_some());
    }

    #[tokio::test]
    async fn corrupt_snapshot_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let mut r = Replica::default();
        assert!(r.read_from_file(&path).await.is_err());
    }
}
