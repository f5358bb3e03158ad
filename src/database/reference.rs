use super::{KeyedStore, StoreError};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

const FORBIDDEN_KEY_CHARS: &[char] = &['.', '#', '$', '[', ']'];

/// A validated slash-delimited location in the database, e.g. `products/-Nx3...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatabasePath {
    segments: Vec<String>,
}

impl DatabasePath {
    /// Parses a path. Leading and trailing slashes are ignored; empty
    /// segments and the characters `. # $ [ ]` are rejected.
    pub fn parse(path: &str) -> Result<Self, StoreError> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let segments = trimmed
            .split('/')
            .map(|segment| validate_key(segment, path).map(str::to_string))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { segments })
    }

    pub fn root() -> Self {
        Self { segments: Vec::new() }
    }

    pub fn child(&self, key: &str) -> Result<Self, StoreError> {
        let mut child = self.clone();
        for segment in DatabasePath::parse(key)?.segments {
            child.segments.push(segment);
        }
        Ok(child)
    }

    /// The last segment, or `None` for the root.
    pub fn key(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for DatabasePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}

fn validate_key<'s>(segment: &'s str, path: &str) -> Result<&'s str, StoreError> {
    if segment.is_empty() {
        return Err(StoreError::InvalidPath(format!("empty segment in '{}'", path)));
    }
    if segment.contains(FORBIDDEN_KEY_CHARS) || segment.chars().any(char::is_control) {
        return Err(StoreError::InvalidPath(format!(
            "'{}' contains a forbidden character",
            segment
        )));
    }
    Ok(segment)
}

/// A handle to one location in a [`KeyedStore`].
pub struct DatabaseReference<'a, S: KeyedStore + ?Sized> {
    pub(crate) store: &'a S,
    pub(crate) path: DatabasePath,
}

impl<S: KeyedStore + ?Sized> Clone for DatabaseReference<'_, S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store,
            path: self.path.clone(),
        }
    }
}

impl<'a, S: KeyedStore + ?Sized> DatabaseReference<'a, S> {
    pub fn new(store: &'a S, path: DatabasePath) -> Self {
        Self { store, path }
    }

    pub fn path(&self) -> &DatabasePath {
        &self.path
    }

    pub fn key(&self) -> Option<&str> {
        self.path.key()
    }

    pub fn child(&self, key: &str) -> Result<Self, StoreError> {
        Ok(Self {
            store: self.store,
            path: self.path.child(key)?,
        })
    }

    /// A reference to a new child under a store-generated key. Nothing is written.
    pub fn push(&self) -> Result<Self, StoreError> {
        let key = self.store.generate_key(&self.path)?;
        self.child(&key)
    }

    /// Reads every child of this location. `None` if nothing is stored here.
    pub async fn fetch_all(&self) -> Result<Option<Map<String, Value>>, StoreError> {
        self.store.fetch_all(&self.path).await
    }

    /// Replaces whatever is stored here with `value`.
    pub async fn set<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        self.store.write_full(&self.path, &value).await
    }

    /// Writes only the given fields, leaving siblings untouched.
    pub async fn update(&self, fields: &Map<String, Value>) -> Result<(), StoreError> {
        self.store.write_partial(&self.path, fields).await
    }

    pub async fn remove(&self) -> Result<(), StoreError> {
        self.store.delete_at(&self.path).await
    }
}
