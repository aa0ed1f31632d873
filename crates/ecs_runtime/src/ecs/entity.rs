//! Entity handles and the slot table behind them

use std::collections::BTreeSet;
use std::fmt;

use fixedbitset::FixedBitSet;

use super::component::ComponentTypeId;

/// Name given to entities created without one
pub const DEFAULT_ENTITY_NAME: &str = "Entity";

/// Entity identifier
///
/// A slot index paired with the generation the slot had when the handle was
/// issued. Destroying an entity bumps its slot's generation, so every
/// outstanding handle to it stops resolving even after the index is reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index in the entity table
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this handle was created
    pub const fn generation(self) -> u32 {
        self.generation
    }

    pub(crate) const fn slot(self) -> usize {
        self.index as usize
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// One row of the entity table
#[derive(Debug)]
pub(crate) struct EntitySlot {
    pub(crate) alive: bool,
    pub(crate) generation: u32,
    pub(crate) mask: FixedBitSet,
    pub(crate) name: String,
    pub(crate) enabled: bool,
    pub(crate) layer: u32,
}

impl EntitySlot {
    fn fresh() -> Self {
        Self {
            alive: true,
            generation: 0,
            mask: FixedBitSet::new(),
            name: DEFAULT_ENTITY_NAME.to_string(),
            enabled: true,
            layer: 0,
        }
    }

    pub(crate) fn has(&self, id: ComponentTypeId) -> bool {
        self.mask.contains(id.index())
    }

    pub(crate) fn insert(&mut self, id: ComponentTypeId) {
        if id.index() >= self.mask.len() {
            self.mask.grow(id.index() + 1);
        }
        self.mask.insert(id.index());
    }

    pub(crate) fn remove(&mut self, id: ComponentTypeId) {
        if id.index() < self.mask.len() {
            self.mask.set(id.index(), false);
        }
    }
}

/// Where a freshly allocated entity came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Allocation {
    Appended,
    Recycled,
}

/// Entity slots plus the set of dead indices awaiting reuse
#[derive(Debug, Default)]
pub(crate) struct EntityTable {
    slots: Vec<EntitySlot>,
    free: BTreeSet<u32>,
}

impl EntityTable {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: BTreeSet::new(),
        }
    }

    /// Number of slots, live or dead
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Claim the lowest dead slot, or append a new one
    pub(crate) fn allocate(&mut self) -> (Entity, Allocation) {
        if let Some(index) = self.free.pop_first() {
            let slot = &mut self.slots[index as usize];
            slot.alive = true;
            slot.name.clear();
            slot.name.push_str(DEFAULT_ENTITY_NAME);
            slot.enabled = true;
            slot.layer = 0;
            return (Entity::new(index, slot.generation), Allocation::Recycled);
        }

        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        assert!(index < u32::MAX, "entity table exhausted");
        self.slots.push(EntitySlot::fresh());
        (Entity::new(index, 0), Allocation::Appended)
    }

    /// Kill the slot behind `entity`, returning false for stale handles
    pub(crate) fn release(&mut self, entity: Entity) -> bool {
        let Some(slot) = self.get_mut(entity) else {
            return false;
        };

        slot.alive = false;
        slot.generation = slot.generation.wrapping_add(1);
        slot.mask.clear();
        self.free.insert(entity.index);
        true
    }

    /// Slot for a handle whose generation still matches
    pub(crate) fn get(&self, entity: Entity) -> Option<&EntitySlot> {
        self.slots
            .get(entity.slot())
            .filter(|slot| slot.alive && slot.generation == entity.generation)
    }

    pub(crate) fn get_mut(&mut self, entity: Entity) -> Option<&mut EntitySlot> {
        self.slots
            .get_mut(entity.slot())
            .filter(|slot| slot.alive && slot.generation == entity.generation)
    }

    pub(crate) fn contains(&self, entity: Entity) -> bool {
        self.get(entity).is_some()
    }

    /// Raw slot access by index, dead slots included
    pub(crate) fn slot(&self, index: usize) -> Option<&EntitySlot> {
        self.slots.get(index)
    }

    /// Current handle for a live slot
    pub(crate) fn handle_at(&self, index: usize) -> Option<Entity> {
        let slot = self.slots.get(index).filter(|slot| slot.alive)?;
        let index = u32::try_from(index).ok()?;
        Some(Entity::new(index, slot.generation))
    }

    /// Live entities in ascending index order
    pub(crate) fn iter_live(&self) -> impl Iterator<Item = (Entity, &EntitySlot)> + '_ {
        self.slots
            .iter()
            .zip(0u32..)
            .filter(|(slot, _)| slot.alive)
            .map(|(slot, index)| (Entity::new(index, slot.generation), slot))
    }
}
