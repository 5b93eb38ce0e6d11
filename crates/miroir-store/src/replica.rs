//! The in-memory replica: owns every projected collection and exposes the
//! query surface. All mutation funnels through [`Replica::apply`]; the
//! [`bind`] pump is the single writer once a replica is attached to a bus.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use miroir_shared::events::EventBus;
use miroir_shared::models::{
    Chat, ChatPresences, ConnectionState, Contact, GroupMetadata, Label, LabelAssociation,
    Message, MessageKey, UserReceipt,
};

use crate::keys::{association_key, chat_sort_key};
use crate::ordered::OrderedDictionary;
use crate::projector::{self, SideEffect};
use crate::repo::ObjectRepository;
use crate::socket::Socket;

/// Construction-time options of a replica.
#[derive(Clone)]
pub struct ReplicaConfig {
    /// When false, pin state is left out of the chat sort key and pinned
    /// chats order like everyone else.
    pub pin_aware_sort: bool,
    /// Socket used for the asynchronous profile-image refresh path. With
    /// no socket configured, a changed image simply clears the cached URL.
    pub socket: Option<Arc<dyn Socket>>,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            pin_aware_sort: true,
            socket: None,
        }
    }
}

impl fmt::Debug for ReplicaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicaConfig")
            .field("pin_aware_sort", &self.pin_aware_sort)
            .field("socket", &self.socket.is_some())
            .finish()
    }
}

/// Cursor for [`Replica::load_messages`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageCursor {
    /// Messages strictly before this one in insertion order.
    Before(MessageKey),
    /// Messages strictly after this one. Matches the upstream behavior of
    /// returning nothing.
    After(MessageKey),
}

pub struct Replica {
    pub(crate) config: ReplicaConfig,
    pub(crate) connection: ConnectionState,
    pub(crate) chats: OrderedDictionary<Chat>,
    pub(crate) contacts: HashMap<String, Contact>,
    pub(crate) messages: HashMap<String, OrderedDictionary<Message>>,
    pub(crate) groups: HashMap<String, GroupMetadata>,
    pub(crate) presences: HashMap<String, ChatPresences>,
    pub(crate) labels: ObjectRepository<Label>,
    pub(crate) label_associations: OrderedDictionary<LabelAssociation>,
    bound_buses: HashSet<u64>,
}

/// A per-chat message sequence: keyed by message id, insertion-ordered.
pub(crate) fn message_dictionary() -> OrderedDictionary<Message> {
    OrderedDictionary::new(|m: &Message| m.key.id.clone())
}

impl Replica {
    pub fn new(config: ReplicaConfig) -> Self {
        let pin_aware = config.pin_aware_sort;
        Self {
            config,
            connection: ConnectionState::default(),
            chats: OrderedDictionary::with_sort_key(
                |c: &Chat| c.id.clone(),
                move |c| chat_sort_key(c, pin_aware),
            ),
            contacts: HashMap::new(),
            messages: HashMap::new(),
            groups: HashMap::new(),
            presences: HashMap::new(),
            labels: ObjectRepository::new(),
            label_associations: OrderedDictionary::with_sort_key(
                |a: &LabelAssociation| association_key(a),
                |a| association_key(a),
            ),
            bound_buses: HashSet::new(),
        }
    }

    /// Fold one event into the replica. Total: never fails, never panics;
    /// anything malformed is logged and dropped. Returned side effects are
    /// the caller's to run — the fold itself never suspends.
    pub fn apply(&mut self, event: miroir_shared::events::Event) -> Vec<SideEffect> {
        projector::project(self, event)
    }

    pub fn connection_state(&self) -> &ConnectionState {
        &self.connection
    }

    pub fn chats(&self) -> &[Chat] {
        self.chats.values()
    }

    pub fn chat(&self, jid: &str) -> Option<&Chat> {
        self.chats.get(jid)
    }

    pub fn contact(&self, jid: &str) -> Option<&Contact> {
        self.contacts.get(jid)
    }

    pub fn presences(&self, chat_jid: &str) -> Option<&ChatPresences> {
        self.presences.get(chat_jid)
    }

    /// Up to `count` messages of a chat, optionally relative to a cursor.
    pub fn load_messages(
        &self,
        jid: &str,
        count: usize,
        cursor: Option<&MessageCursor>,
    ) -> Vec<Message> {
        let Some(dict) = self.messages.get(jid) else {
            return Vec::new();
        };

        match cursor {
            None => dict.values().iter().take(count).cloned().collect(),
            Some(MessageCursor::Before(key)) => {
                let Some(pos) = dict.position(&key.id) else {
                    return Vec::new();
                };
                let start = pos.saturating_sub(count);
                dict.values()[start..pos].to_vec()
            }
            Some(MessageCursor::After(key)) => {
                if dict.position(&key.id).is_none() {
                    return Vec::new();
                }
                Vec::new()
            }
        }
    }

    pub fn load_message(&self, jid: &str, id: &str) -> Option<&Message> {
        self.messages.get(jid)?.get(id)
    }

    pub fn most_recent_message(&self, jid: &str) -> Option<&Message> {
        self.messages.get(jid)?.last()
    }

    pub fn fetch_message_receipts(&self, key: &MessageKey) -> Option<&[UserReceipt]> {
        self.load_message(&key.remote_jid, &key.id)
            .map(|m| m.user_receipt.as_slice())
    }

    /// Cached profile image URL, falling back to the socket. A fetched URL
    /// is cached on an existing contact; an unknown contact is not
    /// synthesized for it.
    pub async fn fetch_image_url(
        &mut self,
        jid: &str,
        socket: Option<&dyn Socket>,
    ) -> Option<String> {
        match self.contacts.get(jid) {
            Some(contact) => {
                if let Some(url) = &contact.img_url {
                    return Some(url.clone());
                }
                let url = match socket {
                    Some(socket) => socket.profile_picture_url(jid).await,
                    None => None,
                };
                if let (Some(url), Some(contact)) = (&url, self.contacts.get_mut(jid)) {
                    contact.img_url = Some(url.clone());
                }
                url
            }
            None => match socket {
                Some(socket) => socket.profile_picture_url(jid).await,
                None => None,
            },
        }
    }

    /// Cached group metadata, falling back to the socket and caching the
    /// result.
    pub async fn fetch_group_metadata(
        &mut self,
        jid: &str,
        socket: Option<&dyn Socket>,
    ) -> Option<GroupMetadata> {
        if let Some(meta) = self.groups.get(jid) {
            return Some(meta.clone());
        }
        let meta = match socket {
            Some(socket) => socket.group_metadata(jid).await,
            None => None,
        };
        if let Some(meta) = &meta {
            self.groups.insert(jid.to_string(), meta.clone());
        }
        meta
    }

    pub fn group_metadata(&self, jid: &str) -> Option<&GroupMetadata> {
        self.groups.get(jid)
    }

    pub fn get_labels(&self) -> Vec<&Label> {
        self.labels.find_all().collect()
    }

    pub fn get_label(&self, id: &str) -> Option<&Label> {
        self.labels.find_by_id(id)
    }

    /// Labels attached to a chat through chat associations.
    pub fn get_chat_labels(&self, chat_id: &str) -> Vec<&Label> {
        self.label_associations
            .iter()
            .filter_map(|assoc| match assoc {
                LabelAssociation::Chat {
                    chat_id: cid,
                    label_id,
                } if cid == chat_id => self.labels.find_by_id(label_id),
                _ => None,
            })
            .collect()
    }

    /// Labels attached to a message through message associations.
    pub fn get_message_labels(&self, message_id: &str) -> Vec<&Label> {
        self.label_associations
            .iter()
            .filter_map(|assoc| match assoc {
                LabelAssociation::Message {
                    message_id: mid,
                    label_id,
                    ..
                } if mid == message_id => self.labels.find_by_id(label_id),
                _ => None,
            })
            .collect()
    }

    pub fn label_associations(&self) -> &[LabelAssociation] {
        self.label_associations.values()
    }

    fn mark_bound(&mut self, bus_id: u64) -> bool {
        self.bound_buses.insert(bus_id)
    }
}

impl Default for Replica {
    fn default() -> Self {
        Self::new(ReplicaConfig::default())
    }
}

impl fmt::Debug for Replica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replica")
            .field("chats", &self.chats.len())
            .field("contacts", &self.contacts.len())
            .field("message_chats", &self.messages.len())
            .field("groups", &self.groups.len())
            .field("labels", &self.labels.count())
            .finish()
    }
}

pub type SharedReplica = Arc<RwLock<Replica>>;

pub fn shared(replica: Replica) -> SharedReplica {
    Arc::new(RwLock::new(replica))
}

/// Attach the replica to an event bus: spawns the single-writer pump that
/// drains the bus and projects each event under the write lock. Idempotent
/// per bus — a second bind to the same bus is a no-op and returns false.
pub async fn bind(replica: &SharedReplica, bus: &EventBus) -> bool {
    {
        let mut guard = replica.write().await;
        if !guard.mark_bound(bus.id()) {
            debug!(bus = bus.id(), "replica already bound to this bus");
            return false;
        }
    }

    let mut rx = bus.subscribe();
    let replica = replica.clone();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let effects = replica.write().await.apply(event);
                    for effect in effects {
                        let replica = replica.clone();
                        tokio::spawn(async move {
                            run_side_effect(replica, effect).await;
                        });
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event pump lagged behind the bus");
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("event pump stopped");
    });
    true
}

/// Run one deferred effect of a projection. The write-back merges a single
/// field and leaves everything that evolved in the meantime alone.
async fn run_side_effect(replica: SharedReplica, effect: SideEffect) {
    match effect {
        SideEffect::FetchProfilePicture { contact_id } => {
            let socket = replica.read().await.config.socket.clone();
            let Some(socket) = socket else {
                return;
            };
            let Some(url) = socket.profile_picture_url(&contact_id).await else {
                debug!(contact = %contact_id, "profile picture fetch produced nothing");
                return;
            };
            let mut guard = replica.write().await;
            match guard.contacts.get_mut(&contact_id) {
                Some(contact) => contact.img_url = Some(url),
                None => debug!(contact = %contact_id, "contact vanished before image write-back"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use miroir_shared::events::{Event, MessagesUpsert, UpsertKind};
    use miroir_shared::models::GroupParticipant;
    use std::time::Duration;

    struct FakeSocket {
        picture: Option<String>,
        group_subject: Option<String>,
    }

    #[async_trait]
    impl Socket for FakeSocket {
        async fn profile_picture_url(&self, _jid: &str) -> Option<String> {
            self.picture.clone()
        }

        async fn group_metadata(&self, jid: &str) -> Option<GroupMetadata> {
            self.group_subject.as_ref().map(|subject| GroupMetadata {
                id: jid.to_string(),
                subject: subject.clone(),
                ..Default::default()
            })
        }
    }

    fn msg(jid: &str, id: &str) -> Message {
        Message::new(MessageKey::new(jid, id, false))
    }

    fn with_messages(ids: &[&str]) -> Replica {
        let mut r = Replica::default();
        r.apply(Event::MessagesUpsert(MessagesUpsert {
            messages: ids.iter().map(|id| msg("A", id)).collect(),
            kind: UpsertKind::Append,
        }));
        r
    }

    #[test]
    fn load_messages_without_cursor_is_a_prefix() {
        let r = with_messages(&["m1", "m2", "m3", "m4"]);
        let loaded = r.load_messages("A", 2, None);
        let ids: Vec<&str> = loaded.iter().map(|m| m.key.id.as_str()).collect();
        assert_eq!(ids, ["m1", "m2"]);
    }

    #[test]
    fn load_messages_before_cursor() {
        let r = with_messages(&["m1", "m2", "m3", "m4"]);
        let cursor = MessageCursor::Before(MessageKey::new("A", "m4", false));
        let loaded = r.load_messages("A", 2, Some(&cursor));
        let ids: Vec<&str> = loaded.iter().map(|m| m.key.id.as_str()).collect();
        assert_eq!(ids, ["m2", "m3"]);
    }

    #[test]
    fn load_messages_missing_cursor_is_empty() {
        let r = with_messages(&["m1"]);
        let cursor = MessageCursor::Before(MessageKey::new("A", "ghost", false));
        assert!(r.load_messages("A", 5, Some(&cursor)).is_empty());
    }

    #[test]
    fn load_messages_after_cursor_is_empty() {
        let r = with_messages(&["m1", "m2"]);
        let cursor = MessageCursor::After(MessageKey::new("A", "m1", false));
        assert!(r.load_messages("A", 5, Some(&cursor)).is_empty());
    }

    #[test]
    fn load_messages_unknown_chat_is_empty() {
        let r = Replica::default();
        assert!(r.load_messages("nochat", 5, None).is_empty());
    }

    #[test]
    fn most_recent_message_is_the_tail() {
        let r = with_messages(&["m1", "m2"]);
        assert_eq!(r.most_recent_message("A").unwrap().key.id, "m2");
        assert!(r.most_recent_message("B").is_none());
    }

    #[test]
    fn pinned_chats_order_first() {
        let mut r = Replica::default();
        let mut active = Chat::new("active");
        active.conversation_timestamp = Some(2_000);
        let mut pinned = Chat::new("pinned");
        pinned.pinned = Some(1);
        pinned.conversation_timestamp = Some(1_000);
        r.apply(Event::ChatsUpsert(vec![active, pinned]));

        let ids: Vec<&str> = r.chats().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["pinned", "active"]);
    }

    #[tokio::test]
    async fn fetch_image_url_caches_on_the_contact() {
        let mut r = Replica::default();
        r.apply(Event::ContactsUpsert(vec![Contact::new("c1")]));

        let socket = FakeSocket {
            picture: Some("https://pic".into()),
            group_subject: None,
        };
        let url = r.fetch_image_url("c1", Some(&socket)).await;
        assert_eq!(url.as_deref(), Some("https://pic"));
        assert_eq!(r.contact("c1").unwrap().img_url.as_deref(), Some("https://pic"));

        // Cached now; a dead socket no longer matters.
        let dead = FakeSocket {
            picture: None,
            group_subject: None,
        };
        let url = r.fetch_image_url("c1", Some(&dead)).await;
        assert_eq!(url.as_deref(), Some("https://pic"));
    }

    #[tokio::test]
    async fn fetch_image_url_unknown_contact_is_not_synthesized() {
        let mut r = Replica::default();
        let socket = FakeSocket {
            picture: Some("https://pic".into()),
            group_subject: None,
        };
        let url = r.fetch_image_url("ghost", Some(&socket)).await;
        assert_eq!(url.as_deref(), Some("https://pic"));
        assert!(r.contact("ghost").is_none());
    }

    #[tokio::test]
    async fn fetch_group_metadata_caches() {
        let mut r = Replica::default();
        let socket = FakeSocket {
            picture: None,
            group_subject: Some("Friends".into()),
        };

        let meta = r.fetch_group_metadata("g@g.us", Some(&socket)).await.unwrap();
        assert_eq!(meta.subject, "Friends");
        assert_eq!(r.group_metadata("g@g.us").unwrap().subject, "Friends");

        let cached = r.fetch_group_metadata("g@g.us", None).await.unwrap();
        assert_eq!(cached.subject, "Friends");
    }

    #[tokio::test]
    async fn bound_replica_projects_bus_events() {
        let bus = miroir_shared::events::EventBus::with_capacity(16);
        let replica = shared(Replica::default());
        assert!(bind(&replica, &bus).await);

        bus.emit(Event::ChatsUpsert(vec![Chat::new("A")]));
        bus.emit(Event::MessagesUpsert(MessagesUpsert {
            messages: vec![msg("A", "m1")],
            kind: UpsertKind::Notify,
        }));

        // Give the pump a moment to drain.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let guard = replica.read().await;
        assert!(guard.chat("A").is_some());
        assert!(guard.load_message("A", "m1").is_some());
    }

    #[tokio::test]
    async fn bind_is_idempotent_per_bus() {
        let bus = miroir_shared::events::EventBus::new();
        let other = miroir_shared::events::EventBus::new();
        let replica = shared(Replica::default());

        assert!(bind(&replica, &bus).await);
        assert!(!bind(&replica, &bus).await);
        assert!(bind(&replica, &other).await);
    }

    #[tokio::test]
    async fn changed_image_refetches_through_the_socket() {
        let socket = Arc::new(FakeSocket {
            picture: Some("https://fresh".into()),
            group_subject: None,
        });
        let config = ReplicaConfig {
            pin_aware_sort: true,
            socket: Some(socket),
        };
        let bus = miroir_shared::events::EventBus::new();
        let replica = shared(Replica::new(config));
        bind(&replica, &bus).await;

        let mut contact = Contact::new("c1");
        contact.img_url = Some("https://stale".into());
        bus.emit(Event::ContactsUpsert(vec![contact]));

        let mut update = Contact::new("c1");
        update.img_url = Some(miroir_shared::constants::IMG_URL_CHANGED.into());
        bus.emit(Event::ContactsUpdate(vec![update]));

        tokio::time::sleep(Duration::from_millis(50)).await;

        let guard = replica.read().await;
        assert_eq!(
            guard.contact("c1").unwrap().img_url.as_deref(),
            Some("https://fresh")
        );
    }

    #[test]
    fn group_participants_survive_metadata_merge() {
        let mut r = Replica::default();
        r.apply(Event::GroupsUpsert(vec![GroupMetadata {
            id: "G".into(),
            subject: "Old".into(),
            participants: vec![GroupParticipant {
                id: "u1".into(),
                is_admin: true,
                is_super_admin: false,
            }],
            ..Default::default()
        }]));
        r.apply(Event::GroupsUpdate(vec![miroir_shared::models::GroupPatch {
            id: "G".into(),
            subject: Some("New".into()),
            ..Default::default()
        }]));

        let group = r.group_metadata("G").unwrap();
        assert_eq!(group.subject, "New");
        assert_eq!(group.participants.len(), 1);
    }
}
