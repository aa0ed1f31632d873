//! Component trait and the dense type-id registry

use std::any::{type_name, TypeId};
use std::collections::HashMap;

use super::{Entity, World};

/// Data attached to an entity
///
/// Stores construct components through `Default`, so every type must have
/// a sensible empty state. `on_destroy` runs whenever a live instance leaves
/// its entity: on removal, on entity destruction, and when the component is
/// added again (which resets it to a fresh default).
pub trait Component: 'static + Send + Sync + Default {
    /// Destruction hook
    fn on_destroy(&mut self) {}
}

/// Observer run after a component type is added to an entity
pub type ComponentAdded = fn(&mut World, Entity);

/// Observer run before a component type leaves an entity
pub type ComponentRemoved = fn(&World, Entity);

/// Dense identifier assigned to a component type on first use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentTypeId(u32);

impl ComponentTypeId {
    pub(crate) const fn new(index: u32) -> Self {
        Self(index)
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) const fn from_mask_bit(index: usize) -> Self {
        Self(index as u32)
    }

    /// Position of this type's store in the world
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

struct ComponentInfo {
    name: &'static str,
    added: Vec<ComponentAdded>,
    removed: Vec<ComponentRemoved>,
}

impl std::fmt::Debug for ComponentInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentInfo")
            .field("name", &self.name)
            .field("added", &self.added.len())
            .field("removed", &self.removed.len())
            .finish()
    }
}

/// Maps Rust types onto dense component ids
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    ids: HashMap<TypeId, ComponentTypeId>,
    infos: Vec<ComponentInfo>,
}

impl ComponentRegistry {
    /// Id of `T`, if it has been registered
    pub fn id_of<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.ids.get(&TypeId::of::<T>()).copied()
    }

    /// Register `T`, returning its id and whether it was new
    pub(crate) fn register<T: Component>(&mut self) -> (ComponentTypeId, bool) {
        if let Some(id) = self.id_of::<T>() {
            return (id, false);
        }

        let index = u32::try_from(self.infos.len()).unwrap_or(u32::MAX);
        assert!(index < u32::MAX, "component registry exhausted");

        let id = ComponentTypeId::new(index);
        self.ids.insert(TypeId::of::<T>(), id);
        self.infos.push(ComponentInfo {
            name: type_name::<T>(),
            added: Vec::new(),
            removed: Vec::new(),
        });
        (id, true)
    }

    /// Type name of a registered component
    pub fn name(&self, id: ComponentTypeId) -> &'static str {
        self.infos.get(id.index()).map_or("<unregistered>", |info| info.name)
    }

    pub(crate) fn observe_added(&mut self, id: ComponentTypeId, observer: ComponentAdded) {
        if let Some(info) = self.infos.get_mut(id.index()) {
            info.added.push(observer);
        }
    }

    pub(crate) fn observe_removed(&mut self, id: ComponentTypeId, observer: ComponentRemoved) {
        if let Some(info) = self.infos.get_mut(id.index()) {
            info.removed.push(observer);
        }
    }

    pub(crate) fn added_observers(&self, id: ComponentTypeId) -> Vec<ComponentAdded> {
        self.infos
            .get(id.index())
            .map(|info| info.added.clone())
            .unwrap_or_default()
    }

    pub(crate) fn removed_observers(&self, id: ComponentTypeId) -> Vec<ComponentRemoved> {
        self.infos
            .get(id.index())
            .map(|info| info.removed.clone())
            .unwrap_or_default()
    }

    /// Number of registered component types
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether no component type has been registered yet
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}
