//! In-process [`KeyedStore`] over a JSON tree.
//!
//! Follows the Realtime Database's data model: there are no empty objects or
//! stored nulls, so writing `null` or `{}` deletes a node and a node whose last
//! child is removed disappears too.

use super::push_id::PushIdGenerator;
use super::{into_children, now_millis, DatabasePath, KeyedStore, StoreError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct MemoryStore {
    root: Mutex<Value>,
    keys: Mutex<PushIdGenerator>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `data` at the root.
    pub fn with_data(data: Value) -> Self {
        Self {
            root: Mutex::new(normalized(data)),
            keys: Mutex::new(PushIdGenerator::new()),
        }
    }

    /// A copy of the node at `path`, or `None` if nothing is stored there.
    pub fn snapshot(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let path = DatabasePath::parse(path)?;
        let root = self.lock_root()?;
        Ok(node_at(&root, path.segments()).cloned())
    }

    fn lock_root(&self) -> Result<MutexGuard<'_, Value>, StoreError> {
        self.root
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".into()))
    }
}

fn node_at<'v>(node: &'v Value, segments: &[String]) -> Option<&'v Value> {
    match segments.split_first() {
        None if node.is_null() => None,
        None => Some(node),
        Some((head, rest)) => match node {
            Value::Object(map) => map.get(head).and_then(|child| node_at(child, rest)),
            Value::Array(items) => head
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index))
                .and_then(|child| node_at(child, rest)),
            _ => None,
        },
    }
}

/// Writes `value` at `segments` below `node`, creating parents and pruning
/// anything left empty.
fn write_at(node: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = value;
        return;
    };

    match node {
        Value::Object(_) => {}
        Value::Array(items) => {
            let map = std::mem::take(items)
                .into_iter()
                .enumerate()
                .filter(|(_, item)| !item.is_null())
                .map(|(index, item)| (index.to_string(), item))
                .collect();
            *node = Value::Object(map);
        }
        // Deleting below a leaf or a missing node changes nothing.
        _ if value.is_null() => return,
        _ => *node = Value::Object(Map::new()),
    }

    if let Value::Object(map) = node {
        let child = map.entry(head.clone()).or_insert(Value::Null);
        write_at(child, rest, value);
        if child.is_null() {
            map.remove(head);
        }
        if map.is_empty() {
            *node = Value::Null;
        }
    }
}

/// Strips nulls and empty containers the way the database does on write.
fn normalized(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let map: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, normalized(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if map.is_empty() {
                Value::Null
            } else {
                Value::Object(map)
            }
        }
        Value::Array(items) => {
            let items: Vec<Value> = items.into_iter().map(normalized).collect();
            if items.iter().all(Value::is_null) {
                Value::Null
            } else {
                Value::Array(items)
            }
        }
        other => other,
    }
}

#[async_trait]
impl KeyedStore for MemoryStore {
    async fn fetch_all(&self, path: &DatabasePath) -> Result<Option<Map<String, Value>>, StoreError> {
        let node = {
            let root = self.lock_root()?;
            node_at(&root, path.segments()).cloned()
        };
        match node {
            Some(value) => into_children(path, value),
            None => Ok(None),
        }
    }

    fn generate_key(&self, _path: &DatabasePath) -> Result<String, StoreError> {
        let mut keys = self
            .keys
            .lock()
            .map_err(|_| StoreError::Unavailable("push key generator poisoned".into()))?;
        Ok(keys.generate(now_millis()))
    }

    async fn write_full(&self, path: &DatabasePath, value: &Value) -> Result<(), StoreError> {
        let mut root = self.lock_root()?;
        write_at(&mut root, path.segments(), normalized(value.clone()));
        Ok(())
    }

    async fn write_partial(&self, path: &DatabasePath, fields: &Map<String, Value>) -> Result<(), StoreError> {
        let mut root = self.lock_root()?;
        for (field, value) in fields {
            let target = path.child(field)?;
            write_at(&mut root, target.segments(), normalized(value.clone()));
        }
        Ok(())
    }

    async fn delete_at(&self, path: &DatabasePath) -> Result<(), StoreError> {
        let mut root = self.lock_root()?;
        write_at(&mut root, path.segments(), Value::Null);
        Ok(())
    }
}
