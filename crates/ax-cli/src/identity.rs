//! Stable element identity
//!
//! An element id is the owning process id plus the content hash the platform
//! computes for the underlying UI object. Handles come and go per query; the
//! hash does not, so `pid:hash` can be printed by one invocation and resolved
//! by the next.

use crate::constants::MAX_LOOKUP_DEPTH;
use crate::errors::AxError;
use crate::store::{Attribute, CapabilityStore};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// `pid:hash` identifier of one UI element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId {
    pub pid: i32,
    pub hash: u64,
}

impl ElementId {
    pub fn new(pid: i32, hash: u64) -> Self {
        Self { pid, hash }
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.pid, self.hash)
    }
}

/// Malformed element id text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed element id '{0}'")]
pub struct ParseIdError(pub String);

impl FromStr for ElementId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (pid, hash) = s.split_once(':').ok_or_else(|| ParseIdError(s.to_string()))?;
        let pid = pid.parse().map_err(|_| ParseIdError(s.to_string()))?;
        let hash = hash.parse().map_err(|_| ParseIdError(s.to_string()))?;
        Ok(Self { pid, hash })
    }
}

impl Serialize for ElementId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Cache of element ids to the last handle seen for them
///
/// Lives for one invocation. Passed explicitly to whoever needs it.
pub struct ElementRegistry<H> {
    entries: Mutex<HashMap<ElementId, H>>,
}

impl<H: Clone> ElementRegistry<H> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, id: &ElementId) -> Option<H> {
        self.entries.lock().get(id).cloned()
    }

    pub fn insert(&self, id: ElementId, handle: H) {
        self.entries.lock().insert(id, handle);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<H: Clone> Default for ElementRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Mints ids for handles and resolves ids back to live handles
pub struct IdentityEngine<'a, S: CapabilityStore> {
    store: &'a S,
    registry: &'a ElementRegistry<S::Handle>,
}

impl<S: CapabilityStore> Clone for IdentityEngine<'_, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: CapabilityStore> Copy for IdentityEngine<'_, S> {}

impl<'a, S: CapabilityStore> IdentityEngine<'a, S> {
    pub fn new(store: &'a S, registry: &'a ElementRegistry<S::Handle>) -> Self {
        Self { store, registry }
    }

    pub fn store(&self) -> &'a S {
        self.store
    }

    /// Id of a handle; NotFound when the owning process cannot be read
    pub fn element_id(&self, handle: &S::Handle) -> Result<ElementId, AxError> {
        let pid = self
            .store
            .pid(handle)?
            .ok_or_else(|| AxError::not_found("element has no owning process"))?;
        Ok(ElementId::new(pid, self.store.content_hash(handle)))
    }

    /// Textual id of a handle
    pub fn make_id(&self, handle: &S::Handle) -> Result<String, AxError> {
        self.element_id(handle).map(|id| id.to_string())
    }

    /// Compute the id of a handle and remember the handle under it
    pub fn register(&self, handle: &S::Handle) -> Result<ElementId, AxError> {
        let id = self.element_id(handle)?;
        self.registry.insert(id, handle.clone());
        Ok(id)
    }

    /// Resolve textual id to a live handle
    pub fn lookup(&self, id: &str) -> Result<S::Handle, AxError> {
        let parsed: ElementId = id.parse().map_err(|_| AxError::element_not_found(id))?;
        self.lookup_id(&parsed)
    }

    pub fn lookup_id(&self, id: &ElementId) -> Result<S::Handle, AxError> {
        if let Some(handle) = self.registry.get(id) {
            tracing::debug!(%id, "element id served from registry");
            return Ok(handle);
        }

        let root = self.store.application(id.pid);
        let found = if self.store.content_hash(&root) == id.hash {
            Some(root)
        } else {
            self.search(&root, id.hash, 0)
        };

        match found {
            Some(handle) => {
                self.registry.insert(*id, handle.clone());
                Ok(handle)
            }
            None => {
                tracing::debug!(%id, depth = MAX_LOOKUP_DEPTH, "element id not found within search depth");
                Err(AxError::element_not_found(id))
            }
        }
    }

    /// Depth-first search over children, then windows, first match wins
    fn search(&self, node: &S::Handle, hash: u64, depth: usize) -> Option<S::Handle> {
        if depth >= MAX_LOOKUP_DEPTH {
            return None;
        }

        for relation in [Attribute::Children, Attribute::Windows] {
            let related = self.store.elements(node, relation).unwrap_or_default();
            for candidate in related {
                if self.store.content_hash(&candidate) == hash {
                    return Some(candidate);
                }
                if let Some(found) = self.search(&candidate, hash, depth + 1) {
                    return Some(found);
                }
            }
        }
        None
    }
}
