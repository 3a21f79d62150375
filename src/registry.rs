//! Correspondence registry
//!
//! A per-session index from a base identifier to the entities that carry
//! it on each side. The source tree holds the base identifier as written;
//! the target tree holds it prefixed with the session's target marker.

use crate::tree::Side;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Base identifier shared by corresponding occurrences
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Recover the base identifier from the form stored in a tree.
    ///
    /// On the target side the marker prefix is stripped if present;
    /// identifiers without it are taken as written.
    pub fn from_marked(raw: &str, side: Side, marker: &str) -> Self {
        match side {
            Side::Target => Self(raw.strip_prefix(marker).unwrap_or(raw).to_string()),
            Side::Source => Self(raw.to_string()),
        }
    }

    /// The form stored in the tree of `side`
    pub fn marked(&self, side: Side, marker: &str) -> String {
        match side {
            Side::Source => self.0.clone(),
            Side::Target => format!("{marker}{}", self.0),
        }
    }

    /// Fresh identifier for content with no source counterpart
    pub fn synthesize() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The entities carrying one identifier, per side
#[derive(Debug, Clone)]
pub struct Correspondence<T> {
    pub source: Option<T>,
    pub target: Option<T>,
}

impl<T> Default for Correspondence<T> {
    fn default() -> Self {
        Self {
            source: None,
            target: None,
        }
    }
}

impl<T> Correspondence<T> {
    pub fn side(&self, side: Side) -> Option<&T> {
        match side {
            Side::Source => self.source.as_ref(),
            Side::Target => self.target.as_ref(),
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut Option<T> {
        match side {
            Side::Source => &mut self.source,
            Side::Target => &mut self.target,
        }
    }

    fn is_empty(&self) -> bool {
        self.source.is_none() && self.target.is_none()
    }
}

/// Bidirectional identifier index for one kind of entity
#[derive(Debug)]
pub struct Registry<T> {
    entries: DashMap<Identifier, Correspondence<T>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<T: Clone> Registry<T> {
    /// Register (or replace) the entity for one side
    pub fn register(&self, id: Identifier, side: Side, entity: T) {
        *self.entries.entry(id).or_default().side_mut(side) = Some(entity);
    }

    /// Entity for one side, if registered
    pub fn get(&self, id: &Identifier, side: Side) -> Option<T> {
        self.entries
            .get(id)
            .and_then(|entry| entry.side(side).cloned())
    }

    /// Both sides of one identifier
    pub fn correspondence(&self, id: &Identifier) -> Correspondence<T> {
        self.entries
            .get(id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Apply `f` to a registered entity, returning its result
    pub fn update<R>(&self, id: &Identifier, side: Side, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut entry = self.entries.get_mut(id)?;
        entry.side_mut(side).as_mut().map(f)
    }

    /// Unregister one side; the identifier is dropped once both sides are gone
    pub fn remove(&self, id: &Identifier, side: Side) -> Option<T> {
        let removed = self
            .entries
            .get_mut(id)
            .and_then(|mut entry| entry.side_mut(side).take());
        self.entries.remove_if(id, |_, entry| entry.is_empty());
        removed
    }

    pub fn contains(&self, id: &Identifier, side: Side) -> bool {
        self.entries
            .get(id)
            .is_some_and(|entry| entry.side(side).is_some())
    }

    /// Number of identifiers with at least one side registered
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> Vec<Identifier> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}
