//! String-keyed maps with insertion ordering

use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::iterator::{Arity, Collection, ValueIterator};
use super::{identity, Copies, Value, Visited};
use crate::errors::IteratorError;

type Entries = IndexMap<String, Value>;

/// Shared handle to a map value
#[derive(Debug, Clone, Default)]
pub struct MapRef(Arc<RwLock<Entries>>);

impl MapRef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Missing keys read as null
    pub fn get(&self, key: &str) -> Value {
        self.0.read().get(key).cloned().unwrap_or_default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.read().contains_key(key)
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.0.write().insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.0.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.read().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.read().keys().cloned().collect()
    }

    pub(crate) fn deep_copy(&self, copies: &mut Copies) -> MapRef {
        let id = identity(&self.0);
        if let Some(Value::Map(done)) = copies.get(&id) {
            return done.clone();
        }
        let entries = self.0.read().clone();
        let copy = MapRef::new();
        copies.insert(id, Value::Map(copy.clone()));
        for (key, value) in entries {
            let value = value.copy_with(copies);
            copy.insert(key, value);
        }
        copy
    }

    pub fn string_value(&self) -> String {
        self.render(&mut Visited::new())
    }

    pub(crate) fn render(&self, visited: &mut Visited) -> String {
        let id = identity(&self.0);
        if visited.contains(&id) {
            return "{...}".to_string();
        }
        let entries = self.0.read().clone();
        visited.push(id);
        let entries: Vec<String> = entries
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v.render(visited)))
            .collect();
        visited.pop();
        format!("{{{}}}", entries.join(", "))
    }
}

/// Maps compare by identity
impl PartialEq for MapRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Collection for MapRef {
    fn new_iterator(&self) -> Box<dyn ValueIterator> {
        Box::new(MapIterator::new(self))
    }
}

/// Iterator over a map's entries.
///
/// Keys are captured when the iterator is created. Values are read at visit
/// time, and a key removed or never present yields null.
#[derive(Debug)]
pub struct MapIterator {
    map: Weak<RwLock<Entries>>,
    keys: Vec<String>,
    cursor: usize,
}

impl MapIterator {
    pub fn new(map: &MapRef) -> Self {
        Self {
            map: Arc::downgrade(&map.0),
            keys: map.keys(),
            cursor: 0,
        }
    }
}

impl ValueIterator for MapIterator {
    fn has_next(&self) -> bool {
        self.cursor < self.keys.len() && self.map.strong_count() > 0
    }

    fn get_next(&mut self, arity: Arity) -> Result<Vec<Value>, IteratorError> {
        let key = self
            .keys
            .get(self.cursor)
            .cloned()
            .ok_or(IteratorError::Exhausted)?;
        let map = self.map.upgrade().ok_or(IteratorError::CollectionDropped)?;
        let value = map.read().get(&key).cloned().unwrap_or_default();
        self.cursor += 1;

        Ok(match arity {
            Arity::One => vec![value],
            Arity::Two => vec![Value::Str(key), value],
        })
    }
}
