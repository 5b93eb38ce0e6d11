//! The projection rules: one total fold per event kind.
//!
//! Projection never fails. An event either mutates the replica or is
//! dropped with a debug log; nothing here returns an error or panics on
//! malformed input. The one rule that needs the network (a changed
//! profile image) hands back a [`SideEffect`] instead of suspending, so
//! the fold stays synchronous.

use tracing::{debug, error};

use miroir_shared::constants::{IMG_URL_CHANGED, IMG_URL_REMOVED, MAX_ACTIVE_LABELS};
use miroir_shared::events::{
    AssociationKind, Event, GroupParticipantsUpdate, HistorySync, HistorySyncType,
    LabelAssociationUpdate, MessageUpdate, MessagesDelete, MessagesUpsert, ParticipantAction,
    PresenceUpdate, ReactionUpdate, ReceiptUpdate, UpsertKind,
};
use miroir_shared::models::{
    Chat, ConnectionState, Contact, GroupMetadata, GroupParticipant, GroupPatch, Label,
};

use crate::ordered::InsertMode;
use crate::replica::{message_dictionary, Replica};

/// Deferred work a projection rule could not do synchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    /// Re-fetch the profile picture of a contact and merge the URL back.
    FetchProfilePicture { contact_id: String },
}

pub(crate) fn project(replica: &mut Replica, event: Event) -> Vec<SideEffect> {
    let mut effects = Vec::new();
    match event {
        Event::ConnectionUpdate(partial) => connection_update(replica, &partial),
        Event::MessagingHistorySet(sync) => history_set(replica, sync),
        Event::ContactsUpsert(contacts) => contacts_upsert(replica, contacts),
        Event::ContactsUpdate(updates) => contacts_update(replica, updates, &mut effects),
        Event::ChatsUpsert(chats) => chats_upsert(replica, chats),
        Event::ChatsUpdate(updates) => chats_update(replica, updates),
        Event::ChatsDelete(ids) => chats_delete(replica, &ids),
        Event::MessagesUpsert(upsert) => messages_upsert(replica, upsert),
        Event::MessagesUpdate(updates) => messages_update(replica, updates),
        Event::MessagesDelete(delete) => messages_delete(replica, delete),
        Event::MessageReceiptUpdate(receipts) => receipt_update(replica, receipts),
        Event::MessagesReaction(reactions) => reaction_update(replica, reactions),
        Event::PresenceUpdate(update) => presence_update(replica, update),
        Event::GroupsUpsert(groups) => groups_upsert(replica, groups),
        Event::GroupsUpdate(patches) => groups_update(replica, patches),
        Event::GroupParticipantsUpdate(update) => group_participants_update(replica, update),
        Event::LabelsEdit(label) => labels_edit(replica, label),
        Event::LabelsAssociation(update) => labels_association(replica, update),
    }
    effects
}

fn connection_update(replica: &mut Replica, partial: &ConnectionState) {
    replica.connection.merge_assign(partial);
}

fn history_set(replica: &mut Replica, sync: HistorySync) {
    if sync.sync_type == Some(HistorySyncType::OnDemand) {
        debug!("ignoring on-demand history sync");
        return;
    }

    if sync.is_latest {
        replica.chats.clear();
        replica.contacts.clear();
        replica.messages.clear();
        debug!("latest history sync: cleared chats, contacts and messages");
    }

    let (chats, contacts, messages) = (sync.chats.len(), sync.contacts.len(), sync.messages.len());

    chats_upsert(replica, sync.chats);
    contacts_upsert(replica, sync.contacts);
    messages_upsert(
        replica,
        MessagesUpsert {
            messages: sync.messages,
            kind: UpsertKind::Append,
        },
    );

    debug!(chats, contacts, messages, "history sync applied");
}

fn contacts_upsert(replica: &mut Replica, contacts: Vec<Contact>) {
    for contact in contacts {
        match replica.contacts.get_mut(&contact.id) {
            Some(existing) => existing.merge_assign(&contact),
            None => {
                replica.contacts.insert(contact.id.clone(), contact);
            }
        }
    }
}

fn contacts_update(replica: &mut Replica, updates: Vec<Contact>, effects: &mut Vec<SideEffect>) {
    for update in updates {
        let Some(stored) = replica.contacts.get_mut(&update.id) else {
            // No hash-based fallback lookup; an unknown id is dropped.
            debug!(contact = %update.id, "contact update for unknown id");
            continue;
        };

        match update.img_url.as_deref() {
            Some(IMG_URL_REMOVED) => {
                let mut rest = update.clone();
                rest.img_url = None;
                stored.merge_assign(&rest);
                stored.img_url = None;
            }
            Some(IMG_URL_CHANGED) => {
                let mut rest = update.clone();
                rest.img_url = None;
                stored.merge_assign(&rest);
                if replica.config.socket.is_some() {
                    effects.push(SideEffect::FetchProfilePicture {
                        contact_id: update.id.clone(),
                    });
                } else {
                    stored.img_url = None;
                }
            }
            _ => stored.merge_assign(&update),
        }
    }
}

fn chats_upsert(replica: &mut Replica, chats: Vec<Chat>) {
    for chat in chats {
        let merged = replica
            .chats
            .update_assign(&chat.id, |existing| existing.merge_assign(&chat));
        if !merged {
            replica.chats.upsert(chat, InsertMode::Append);
        }
    }
}

fn chats_update(replica: &mut Replica, updates: Vec<Chat>) {
    for update in updates {
        let incoming_unread = update.unread_count;
        let applied = replica.chats.update_assign(&update.id, |chat| {
            let stored_unread = chat.unread_count;
            let mut rest = update.clone();
            rest.unread_count = None;
            chat.merge_assign(&rest);

            match incoming_unread {
                // Positive counts accumulate across updates.
                Some(n) if n > 0 => {
                    chat.unread_count = Some(stored_unread.unwrap_or(0).saturating_add(n));
                }
                // Zero and negative replace outright.
                Some(n) => chat.unread_count = Some(n),
                None => {}
            }
        });
        if !applied {
            debug!(chat = %update.id, "chat update for unknown id");
        }
    }
}

fn chats_delete(replica: &mut Replica, ids: &[String]) {
    for id in ids {
        if !replica.chats.remove(id) {
            debug!(chat = %id, "chat delete for unknown id");
        }
        // Messages for the chat are intentionally left behind.
    }
}

fn messages_upsert(replica: &mut Replica, upsert: MessagesUpsert) {
    let mode = match upsert.kind {
        UpsertKind::Prepend => InsertMode::Prepend,
        UpsertKind::Append | UpsertKind::Notify => InsertMode::Append,
    };

    for message in upsert.messages {
        let jid = message.key.remote_jid.clone();
        if jid.is_empty() {
            debug!("message upsert without a remote jid");
            continue;
        }

        if upsert.kind == UpsertKind::Notify && replica.chats.get(&jid).is_none() {
            let mut chat = Chat::new(jid.clone());
            chat.unread_count = Some(0);
            chat.conversation_timestamp = message.message_timestamp;
            replica.chats.upsert(chat, InsertMode::Append);
        }

        replica
            .messages
            .entry(jid)
            .or_insert_with(message_dictionary)
            .upsert(message, mode);
    }
}

fn messages_update(replica: &mut Replica, updates: Vec<MessageUpdate>) {
    for MessageUpdate { key, update } in updates {
        let Some(dict) = replica.messages.get_mut(&key.remote_jid) else {
            debug!(jid = %key.remote_jid, "message update for unknown chat");
            continue;
        };

        let applied = dict.update_assign(&key.id, |message| {
            let mut patch = update.clone();
            // Status only ever advances; a stale status is stripped and the
            // rest of the patch still lands.
            if let (Some(incoming), Some(stored)) = (patch.status, message.status) {
                if incoming <= stored {
                    patch.status = None;
                }
            }
            message.merge_assign(&patch);
        });
        if !applied {
            debug!(jid = %key.remote_jid, id = %key.id, "message update for unknown message");
        }
    }
}

fn messages_delete(replica: &mut Replica, delete: MessagesDelete) {
    match delete {
        MessagesDelete::ByKeys { keys } => {
            for key in keys {
                if let Some(dict) = replica.messages.get_mut(&key.remote_jid) {
                    dict.remove(&key.id);
                }
            }
        }
        MessagesDelete::AllInChat { all, jid } => {
            if !all {
                debug!(jid = %jid, "messages delete with all=false is a no-op");
                return;
            }
            // The empty dictionary is kept; queries treat missing and empty
            // chats identically.
            if let Some(dict) = replica.messages.get_mut(&jid) {
                dict.clear();
            }
        }
    }
}

fn receipt_update(replica: &mut Replica, receipts: Vec<ReceiptUpdate>) {
    for ReceiptUpdate { key, receipt } in receipts {
        let Some(dict) = replica.messages.get_mut(&key.remote_jid) else {
            debug!(jid = %key.remote_jid, "receipt for unknown chat");
            continue;
        };
        let applied = dict.update_assign(&key.id, |message| {
            match message
                .user_receipt
                .iter_mut()
                .find(|r| r.user_jid == receipt.user_jid)
            {
                Some(existing) => {
                    // Later receipts supersede field-wise.
                    if receipt.receipt_timestamp.is_some() {
                        existing.receipt_timestamp = receipt.receipt_timestamp;
                    }
                    if receipt.read_timestamp.is_some() {
                        existing.read_timestamp = receipt.read_timestamp;
                    }
                    if receipt.played_timestamp.is_some() {
                        existing.played_timestamp = receipt.played_timestamp;
                    }
                }
                None => message.user_receipt.push(receipt.clone()),
            }
        });
        if !applied {
            debug!(jid = %key.remote_jid, id = %key.id, "receipt for unknown message");
        }
    }
}

fn reaction_update(replica: &mut Replica, reactions: Vec<ReactionUpdate>) {
    for ReactionUpdate { key, reaction } in reactions {
        let Some(dict) = replica.messages.get_mut(&key.remote_jid) else {
            debug!(jid = %key.remote_jid, "reaction for unknown chat");
            continue;
        };
        let applied = dict.update_assign(&key.id, |message| {
            if reaction.text.is_empty() {
                // Empty text retracts the author's earlier reaction.
                message.reactions.retain(|r| r.author != reaction.author);
            } else {
                match message
                    .reactions
                    .iter_mut()
                    .find(|r| r.author == reaction.author)
                {
                    Some(existing) => *existing = reaction.clone(),
                    None => message.reactions.push(reaction.clone()),
                }
            }
        });
        if !applied {
            debug!(jid = %key.remote_jid, id = %key.id, "reaction for unknown message");
        }
    }
}

fn presence_update(replica: &mut Replica, update: PresenceUpdate) {
    let chat = replica.presences.entry(update.id).or_default();
    for (participant, data) in update.presences {
        chat.insert(participant, data);
    }
}

fn groups_upsert(replica: &mut Replica, groups: Vec<GroupMetadata>) {
    for group in groups {
        replica.groups.insert(group.id.clone(), group);
    }
}

fn groups_update(replica: &mut Replica, patches: Vec<GroupPatch>) {
    for patch in patches {
        match replica.groups.get_mut(&patch.id) {
            Some(group) => group.merge_assign(&patch),
            None => debug!(group = %patch.id, "group update for unknown id"),
        }
    }
}

fn group_participants_update(replica: &mut Replica, update: GroupParticipantsUpdate) {
    let Some(group) = replica.groups.get_mut(&update.id) else {
        debug!(group = %update.id, "participant update for unknown group");
        return;
    };

    match update.action {
        ParticipantAction::Add => {
            for id in &update.participants {
                if !group.participants.iter().any(|p| &p.id == id) {
                    group.participants.push(GroupParticipant {
                        id: id.clone(),
                        is_admin: false,
                        is_super_admin: false,
                    });
                }
            }
        }
        ParticipantAction::Remove => {
            group
                .participants
                .retain(|p| !update.participants.contains(&p.id));
        }
        ParticipantAction::Promote | ParticipantAction::Demote => {
            let promote = update.action == ParticipantAction::Promote;
            for participant in &mut group.participants {
                if update.participants.contains(&participant.id) {
                    participant.is_admin = promote;
                }
            }
        }
        ParticipantAction::Other => {
            debug!(group = %update.id, "unhandled participant action");
        }
    }
}

fn labels_edit(replica: &mut Replica, label: Label) {
    if label.deleted {
        replica.labels.delete_by_id(&label.id);
        return;
    }

    let exists = replica.labels.find_by_id(&label.id).is_some();
    if !exists {
        let active = replica.labels.find_all().filter(|l| !l.deleted).count();
        if active >= MAX_ACTIVE_LABELS {
            debug!(label = %label.id, "label cap reached, edit dropped");
            return;
        }
    }
    replica.labels.upsert_by_id(&label.id, &label);
}

fn labels_association(replica: &mut Replica, update: LabelAssociationUpdate) {
    match update.kind {
        AssociationKind::Add => {
            replica
                .label_associations
                .upsert(update.association, InsertMode::Append);
        }
        AssociationKind::Remove => {
            let key = crate::keys::association_key(&update.association);
            replica.label_associations.remove(&key);
        }
        AssociationKind::Other => {
            error!("unknown label association type");
        }
    }
}
