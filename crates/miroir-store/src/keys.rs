//! Derived string keys that order the chat list and the label
//! associations.
//!
//! Components are formatted to fixed widths so plain string comparison
//! matches the intended numeric ordering, and comparison is reversed:
//! higher keys sort earlier.

use std::cmp::Ordering;
use std::fmt::Write as _;

use miroir_shared::constants::{SORT_KEY_PIN_WIDTH, SORT_KEY_TIMESTAMP_WIDTH};
use miroir_shared::models::{Chat, LabelAssociation};

/// Reverse-lexicographic comparison shared by every derived key.
pub fn compare_desc(a: &str, b: &str) -> Ordering {
    b.cmp(a)
}

/// Sort key of a chat: pin rank (pin-aware mode only), archived flag,
/// conversation timestamp, then the id as tiebreaker.
///
/// In pin-blind mode two chats differing only in pin state produce the
/// same key.
pub fn chat_sort_key(chat: &Chat, pin_aware: bool) -> String {
    let mut key = String::new();

    if pin_aware {
        match chat.pinned {
            Some(rank) => {
                let _ = write!(key, "1{rank:0width$}", width = SORT_KEY_PIN_WIDTH);
            }
            None => {
                for _ in 0..=SORT_KEY_PIN_WIDTH {
                    key.push('0');
                }
            }
        }
    }

    key.push(if chat.archived.unwrap_or(false) { '0' } else { '1' });

    if let Some(ts) = chat.conversation_timestamp {
        let _ = write!(key, "{:0width$}", ts.max(0), width = SORT_KEY_TIMESTAMP_WIDTH);
    }

    key.push_str(&chat.id);
    key
}

/// Key of a label association: the chat id, the message id for message
/// associations, then the label id.
pub fn association_key(assoc: &LabelAssociation) -> String {
    match assoc {
        LabelAssociation::Chat { chat_id, label_id } => format!("{chat_id}{label_id}"),
        LabelAssociation::Message {
            chat_id,
            message_id,
            label_id,
        } => format!("{chat_id}{message_id}{label_id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(id: &str) -> Chat {
        Chat::new(id)
    }

    #[test]
    fn pinned_sorts_before_unpinned() {
        let mut pinned = chat("a");
        pinned.pinned = Some(1);
        let unpinned = chat("b");

        let kp = chat_sort_key(&pinned, true);
        let ku = chat_sort_key(&unpinned, true);
        assert_eq!(compare_desc(&kp, &ku), Ordering::Less);
    }

    #[test]
    fn pin_blind_mode_ignores_pin_state() {
        let mut pinned = chat("a");
        pinned.pinned = Some(3);
        let unpinned = chat("a");

        assert_eq!(
            chat_sort_key(&pinned, false),
            chat_sort_key(&unpinned, false)
        );
        assert_ne!(chat_sort_key(&pinned, true), chat_sort_key(&unpinned, true));
    }

    #[test]
    fn newer_activity_sorts_earlier() {
        let mut old = chat("a");
        old.conversation_timestamp = Some(1_000);
        let mut recent = chat("b");
        recent.conversation_timestamp = Some(2_000);

        let ko = chat_sort_key(&old, true);
        let kr = chat_sort_key(&recent, true);
        assert_eq!(compare_desc(&kr, &ko), Ordering::Less);
    }

    #[test]
    fn unarchived_sorts_before_archived() {
        let mut archived = chat("a");
        archived.archived = Some(true);
        archived.conversation_timestamp = Some(5_000);
        let mut active = chat("b");
        active.conversation_timestamp = Some(5_000);

        let ka = chat_sort_key(&archived, true);
        let kx = chat_sort_key(&active, true);
        assert_eq!(compare_desc(&kx, &ka), Ordering::Less);
    }

    #[test]
    fn missing_timestamp_still_yields_a_key() {
        let key = chat_sort_key(&chat("bare@s.whatsapp.net"), true);
        assert!(key.ends_with("bare@s.whatsapp.net"));
    }

    #[test]
    fn association_keys_concatenate_ids() {
        let chat_assoc = LabelAssociation::Chat {
            chat_id: "c1".into(),
            label_id: "l1".into(),
        };
        let msg_assoc = LabelAssociation::Message {
            chat_id: "c1".into(),
            message_id: "m1".into(),
            label_id: "l1".into(),
        };
        assert_eq!(association_key(&chat_assoc), "c1l1");
        assert_eq!(association_key(&msg_assoc), "c1m1l1");
    }
}
