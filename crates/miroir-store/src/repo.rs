//! Unordered keyed map with copy-on-insert, used for labels.

use std::collections::HashMap;

use serde::Serialize;

#[derive(Debug, Clone, Default)]
pub struct ObjectRepository<V> {
    entities: HashMap<String, V>,
}

impl<V: Clone> ObjectRepository<V> {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
        }
    }

    /// Store a copy of `value` under `id`; later mutations to the caller's
    /// value do not reach the repository.
    pub fn upsert_by_id(&mut self, id: &str, value: &V) {
        self.entities.insert(id.to_string(), value.clone());
    }

    pub fn find_by_id(&self, id: &str) -> Option<&V> {
        self.entities.get(id)
    }

    pub fn find_all(&self) -> impl Iterator<Item = &V> {
        self.entities.values()
    }

    pub fn delete_by_id(&mut self, id: &str) -> bool {
        self.entities.remove(id).is_some()
    }

    pub fn count(&self) -> usize {
        self.entities.len()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }

    pub fn as_map(&self) -> &HashMap<String, V> {
        &self.entities
    }
}

impl<V: Clone + Serialize> ObjectRepository<V> {
    /// The value collection as an array.
    pub fn to_json(&self) -> serde_json::Value {
        let values: Vec<&V> = self.entities.values().collect();
        serde_json::to_value(values).unwrap_or(serde_json::Value::Array(Vec::new()))
    }
}
