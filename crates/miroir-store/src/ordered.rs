//! Insertion-ordered keyed sequence.
//!
//! The primitive behind the chat list, the per-chat message sequences and
//! the label associations: a `Vec` for order plus a position index for
//! keyed access. An optional sort-key deriver turns it into a sorted
//! sequence — new entries then go to their binary-search position instead
//! of an end, under reverse-lexicographic key order (higher keys first).

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::keys::compare_desc;

/// Where `upsert` places a new entry when no sort-key deriver is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    Append,
    Prepend,
}

type IdOf<V> = Box<dyn Fn(&V) -> String + Send + Sync>;
type SortKeyOf<V> = Box<dyn Fn(&V) -> String + Send + Sync>;

pub struct OrderedDictionary<V> {
    items: Vec<V>,
    index: HashMap<String, usize>,
    id_of: IdOf<V>,
    sort_key: Option<SortKeyOf<V>>,
}

impl<V> OrderedDictionary<V> {
    pub fn new(id_of: impl Fn(&V) -> String + Send + Sync + 'static) -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
            id_of: Box::new(id_of),
            sort_key: None,
        }
    }

    /// A dictionary that keeps itself ordered by the derived key instead of
    /// by insertion ends.
    pub fn with_sort_key(
        id_of: impl Fn(&V) -> String + Send + Sync + 'static,
        sort_key: impl Fn(&V) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
            id_of: Box::new(id_of),
            sort_key: Some(Box::new(sort_key)),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&V> {
        self.index.get(id).map(|&pos| &self.items[pos])
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn values(&self) -> &[V] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, V> {
        self.items.iter()
    }

    pub fn first(&self) -> Option<&V> {
        self.items.first()
    }

    pub fn last(&self) -> Option<&V> {
        self.items.last()
    }

    /// Insert or replace. An existing id is replaced in place, keeping its
    /// position; a new entry goes to its sorted position when a deriver is
    /// configured, otherwise to the end `mode` selects.
    pub fn upsert(&mut self, value: V, mode: InsertMode) {
        let id = (self.id_of)(&value);
        if let Some(&pos) = self.index.get(&id) {
            self.items[pos] = value;
            return;
        }

        let pos = match &self.sort_key {
            Some(derive) => {
                let key = derive(&value);
                self.items
                    .partition_point(|e| compare_desc(&derive(e), &key).is_lt())
            }
            None => match mode {
                InsertMode::Append => self.items.len(),
                InsertMode::Prepend => 0,
            },
        };
        self.insert_at(pos, id, value);
    }

    /// Replace an existing entry in place. Returns false if the id is
    /// absent.
    pub fn update(&mut self, value: V) -> bool {
        let id = (self.id_of)(&value);
        match self.index.get(&id) {
            Some(&pos) => {
                self.items[pos] = value;
                true
            }
            None => false,
        }
    }

    /// Mutate an existing entry in place (partial merge). Returns false if
    /// the id is absent. The position is preserved even if the mutation
    /// changes the derived sort key.
    pub fn update_assign(&mut self, id: &str, apply: impl FnOnce(&mut V)) -> bool {
        match self.index.get(id) {
            Some(&pos) => {
                apply(&mut self.items[pos]);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let Some(pos) = self.index.remove(id) else {
            return false;
        };
        self.items.remove(pos);
        for idx in self.index.values_mut() {
            if *idx > pos {
                *idx -= 1;
            }
        }
        true
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.index.clear();
    }

    /// Keep only entries the predicate accepts, preserving order.
    pub fn retain(&mut self, mut predicate: impl FnMut(&V) -> bool) {
        self.items.retain(|v| predicate(v));
        self.rebuild_index();
    }

    fn insert_at(&mut self, pos: usize, id: String, value: V) {
        self.items.insert(pos, value);
        for idx in self.index.values_mut() {
            if *idx >= pos {
                *idx += 1;
            }
        }
        self.index.insert(id, pos);
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (pos, item) in self.items.iter().enumerate() {
            self.index.insert((self.id_of)(item), pos);
        }
    }
}

impl<V: Serialize> OrderedDictionary<V> {
    /// Array form of the sequence, in order.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.items).unwrap_or(serde_json::Value::Array(Vec::new()))
    }
}

impl<V> OrderedDictionary<V> {
    /// Clear and reinsert in the given order, trusting it. Duplicated ids
    /// collapse onto the last occurrence.
    pub fn load(&mut self, items: Vec<V>) {
        self.clear();
        for value in items {
            let id = (self.id_of)(&value);
            match self.index.get(&id) {
                Some(&pos) => self.items[pos] = value,
                None => {
                    self.index.insert(id, self.items.len());
                    self.items.push(value);
                }
            }
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for OrderedDictionary<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedDictionary")
            .field("items", &self.items)
            .field("sorted", &self.sort_key.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict() -> OrderedDictionary<(String, u32)> {
        OrderedDictionary::new(|(id, _): &(String, u32)| id.clone())
    }

    fn entry(id: &str, n: u32) -> (String, u32) {
        (id.to_string(), n)
    }

    /// Structural invariants: index and array agree, every entry findable.
    fn check(d: &OrderedDictionary<(String, u32)>) {
        assert_eq!(d.len(), d.index.len());
        for item in d.values() {
            assert_eq!(d.get(&item.0), Some(item));
        }
    }

    #[test]
    fn append_and_prepend() {
        let mut d = dict();
        d.upsert(entry("b", 1), InsertMode::Append);
        d.upsert(entry("c", 2), InsertMode::Append);
        d.upsert(entry("a", 3), InsertMode::Prepend);

        let order: Vec<&str> = d.values().iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, ["a", "b", "c"]);
        check(&d);
    }

    #[test]
    fn upsert_existing_preserves_position() {
        let mut d = dict();
        d.upsert(entry("a", 1), InsertMode::Append);
        d.upsert(entry("b", 2), InsertMode::Append);
        d.upsert(entry("c", 3), InsertMode::Append);

        d.upsert(entry("b", 9), InsertMode::Prepend);

        assert_eq!(d.position("b"), Some(1));
        assert_eq!(d.get("b"), Some(&entry("b", 9)));
        check(&d);
    }

    #[test]
    fn update_fails_on_missing_id() {
        let mut d = dict();
        assert!(!d.update(entry("nope", 1)));
        d.upsert(entry("a", 1), InsertMode::Append);
        assert!(d.update(entry("a", 2)));
        assert_eq!(d.get("a"), Some(&entry("a", 2)));
    }

    #[test]
    fn update_assign_merges_in_place() {
        let mut d = dict();
        d.upsert(entry("a", 1), InsertMode::Append);
        assert!(d.update_assign("a", |v| v.1 += 10));
        assert!(!d.update_assign("x", |v| v.1 += 10));
        assert_eq!(d.get("a"), Some(&entry("a", 11)));
    }

    #[test]
    fn remove_shifts_index() {
        let mut d = dict();
        for id in ["a", "b", "c", "d"] {
            d.upsert(entry(id, 0), InsertMode::Append);
        }
        assert!(d.remove("b"));
        assert!(!d.remove("b"));
        assert_eq!(d.position("c"), Some(1));
        assert_eq!(d.position("d"), Some(2));
        check(&d);
    }

    #[test]
    fn retain_preserves_order_and_rebuilds_index() {
        let mut d = dict();
        for (id, n) in [("a", 1), ("b", 2), ("c", 3), ("d", 4)] {
            d.upsert(entry(id, n), InsertMode::Append);
        }
        d.retain(|(_, n)| n % 2 == 0);

        let order: Vec<&str> = d.values().iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, ["b", "d"]);
        check(&d);
    }

    #[test]
    fn clear_empties_both_sides() {
        let mut d = dict();
        d.upsert(entry("a", 1), InsertMode::Append);
        d.clear();
        assert!(d.is_empty());
        assert_eq!(d.get("a"), None);
    }

    #[test]
    fn load_replaces_contents_in_given_order() {
        let mut d = dict();
        d.upsert(entry("z", 0), InsertMode::Append);
        d.load(vec![entry("c", 1), entry("a", 2)]);

        let order: Vec<&str> = d.values().iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, ["c", "a"]);
        check(&d);
    }

    #[test]
    fn sorted_insert_follows_derived_key_descending() {
        // Key is the value formatted to fixed width; higher sorts first.
        let mut d = OrderedDictionary::with_sort_key(
            |(id, _): &(String, u32)| id.clone(),
            |(_, n)| format!("{n:05}"),
        );
        d.upsert(entry("mid", 50), InsertMode::Append);
        d.upsert(entry("low", 10), InsertMode::Append);
        d.upsert(entry("high", 90), InsertMode::Append);

        let order: Vec<&str> = d.values().iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, ["high", "mid", "low"]);
        check(&d);

        // Replacing an existing id does not move it, even with a new key.
        d.upsert(entry("mid", 99), InsertMode::Append);
        assert_eq!(d.position("mid"), Some(1));
    }

    #[test]
    fn to_json_is_the_ordered_array() {
        let mut d = dict();
        d.upsert(entry("a", 1), InsertMode::Append);
        d.upsert(entry("b", 2), InsertMode::Append);
        let json = d.to_json();
        assert_eq!(json.as_array().map(|a| a.len()), Some(2));
    }
}
