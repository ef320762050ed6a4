//! Actuators sharing one throttling decision.
//!
//! Entities are plain integer ids handed out by [`EntityAllocator`]; the
//! registry maps them to actuator handles. Registration is idempotent in both
//! directions so scene setup and teardown can race without double dispatch.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Stable identifier of a controlled entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u64);

impl EntityId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Hands out process-unique entity ids, starting at 1.
#[derive(Debug)]
pub struct EntityAllocator {
    next: AtomicU64,
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self) -> EntityId {
        EntityId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Unordered mapping from entity id to actuator handle.
///
/// Iteration order is unspecified; nothing may depend on it.
#[derive(Debug)]
pub struct ActuatorRegistry<H> {
    entries: HashMap<EntityId, H>,
}

impl<H> Default for ActuatorRegistry<H> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<H> ActuatorRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` under `id` unless the id is already taken.
    ///
    /// A duplicate add keeps the original handle and drops the new one.
    /// Returns whether the handle was inserted.
    pub fn add(&mut self, id: EntityId, handle: H) -> bool {
        if self.entries.contains_key(&id) {
            warn!("{} already registered, ignoring duplicate add", id);
            return false;
        }
        debug!("Registering actuator for {}", id);
        self.entries.insert(id, handle);
        true
    }

    /// Removes the handle under `id`, if any.
    pub fn remove(&mut self, id: EntityId) -> Option<H> {
        let removed = self.entries.remove(&id);
        if removed.is_some() {
            debug!("Removed actuator for {}", id);
        } else {
            debug!("Remove for unknown {}, nothing to do", id);
        }
        removed
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&H> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entries.keys().copied()
    }

    pub fn for_each<F>(&mut self, mut f: F)
    where
        F: FnMut(EntityId, &mut H),
    {
        for (id, handle) in self.entries.iter_mut() {
            f(*id, handle);
        }
    }

    /// Like [`for_each`](Self::for_each) but stops at the first error.
    pub fn try_for_each<F, E>(&mut self, mut f: F) -> Result<(), E>
    where
        F: FnMut(EntityId, &mut H) -> Result<(), E>,
    {
        for (id, handle) in self.entries.iter_mut() {
            f(*id, handle)?;
        }
        Ok(())
    }
}
