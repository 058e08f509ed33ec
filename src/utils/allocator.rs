use serde::{Deserialize, Serialize};
use std::collections::btree_map::{BTreeMap, Entry};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Unique identifier with generation tracking to prevent stale references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct GenerationalId {
    pub index: usize,
    pub generation: u32,
}

impl GenerationalId {
    pub fn new(index: usize, generation: u32) -> Self {
        Self { index, generation }
    }
}

/// Handle used for representations, collision representations and particle systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct EntityId(pub GenerationalId);

impl EntityId {
    pub fn new(index: usize, generation: u32) -> Self {
        Self(GenerationalId::new(index, generation))
    }

    pub fn from_index(index: u32) -> Self {
        Self::new(index as usize, 0)
    }

    pub fn index(&self) -> usize {
        self.0.index
    }

    pub fn generation(&self) -> u32 {
        self.0.generation
    }

    pub fn is_null(&self) -> bool {
        self.0.index == usize::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self(GenerationalId::new(usize::MAX, 0))
    }
}

/// Thread-safe source of handles that are never reused.
///
/// Handles are handed out before the item reaches its arena so that a caller on another
/// thread can refer to a component while its insertion is still pending.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: AtomicUsize,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self) -> EntityId {
        EntityId::new(self.next.fetch_add(1, Ordering::Relaxed), 0)
    }
}

/// Generational arena storing items under handles allocated by an [`IdAllocator`].
///
/// Slots are keyed by handle index and dropped on removal, so memory follows the live items
/// rather than every handle ever allocated. Iteration follows index order, which is
/// registration order for allocator handles.
#[derive(Debug, Clone)]
pub struct Arena<T> {
    slots: BTreeMap<usize, Slot<T>>,
}

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    item: T,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
        }
    }

    /// Stores `item` under a handle allocated elsewhere. Returns `false` if the slot is taken.
    pub fn insert_at(&mut self, id: EntityId, item: T) -> bool {
        if id.is_null() {
            return false;
        }
        match self.slots.entry(id.index()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Slot {
                    generation: id.generation(),
                    item,
                });
                true
            }
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.slots
            .get(&id.index())
            .filter(|slot| slot.generation == id.generation())
            .map(|slot| &slot.item)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.slots
            .get_mut(&id.index())
            .filter(|slot| slot.generation == id.generation())
            .map(|slot| &mut slot.item)
    }

    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        if self.get(id).is_none() {
            return None;
        }
        self.slots.remove(&id.index()).map(|slot| slot.item)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.slots
            .iter()
            .map(|(&index, slot)| (EntityId::new(index, slot.generation), &slot.item))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> + '_ {
        self.slots
            .iter_mut()
            .map(|(&index, slot)| (EntityId::new(index, slot.generation), &mut slot.item))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> + '_ {
        self.slots.values().map(|slot| &slot.item)
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.iter().map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
