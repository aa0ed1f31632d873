//! ECS World implementation
//!
//! The world owns the entity table and one [`ComponentStore`] per component
//! type. Every store is kept exactly as long as the entity table: appending a
//! slot appends a default cell to every store, and a store created late is
//! backfilled for every existing slot, dead ones included.
//!
//! Structural access goes through `&mut World`, so a single writer is
//! enforced by the borrow checker. Hosts that share a world across threads
//! wrap it in a [`SharedWorld`].

use std::any::type_name;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::behaviour::BehaviourEntry;
use super::component::{ComponentAdded, ComponentRegistry, ComponentRemoved, ComponentTypeId};
use super::entity::{Allocation, EntityTable};
use super::error::{panic_message, EcsError};
use super::hierarchy::{Transform, TransformGraph};
use super::storage::{AnyStore, ComponentStore};
use super::{Component, Entity};
use crate::config::RuntimeConfig;

/// ECS World containing all entities and components
pub struct World {
    pub(crate) entities: EntityTable,
    pub(crate) registry: ComponentRegistry,
    /// Indexed by `ComponentTypeId`; `None` while a store is detached for iteration
    pub(crate) stores: Vec<Option<Box<dyn AnyStore>>>,
    /// Parent links and cached world state of every transform
    pub(crate) graph: TransformGraph,
    pub(crate) behaviours: Vec<BehaviourEntry>,
    /// Behaviour instances currently moved out of their cells by a running hook
    pub(crate) borrowed: Vec<(ComponentTypeId, usize)>,
    pub(crate) topology_version: u64,
    destroy_queue: Vec<Entity>,
}

impl World {
    /// Create a new world
    pub fn new() -> Self {
        Self::with_config(&RuntimeConfig::default())
    }

    /// Create a world sized from runtime configuration
    pub fn with_config(config: &RuntimeConfig) -> Self {
        Self {
            entities: EntityTable::with_capacity(config.initial_entity_capacity),
            registry: ComponentRegistry::default(),
            stores: Vec::new(),
            graph: TransformGraph::default(),
            behaviours: Vec::new(),
            borrowed: Vec::new(),
            topology_version: 0,
            destroy_queue: Vec::new(),
        }
    }

    // ── Entities ──

    /// Create a new entity
    ///
    /// Reuses the lowest-index dead slot when one exists, otherwise appends a
    /// slot and a default cell to every component store.
    pub fn create_entity(&mut self) -> Entity {
        let (entity, allocation) = self.entities.allocate();

        if allocation == Allocation::Appended {
            let len = self.entities.len();
            for store in self.stores.iter_mut().flatten() {
                store.grow_to(len);
                debug_assert_eq!(store.len(), len, "component store out of step with entity table");
            }
            self.graph.grow_to(len);
        }

        self.mark_topology_changed();
        entity
    }

    /// Create a new entity with a name
    pub fn create_entity_named(&mut self, name: impl Into<String>) -> Entity {
        let entity = self.create_entity();
        self.set_entity_name(entity, name);
        entity
    }

    /// Destroy an entity, orphaning its transform children
    ///
    /// Stale or already destroyed handles are ignored. The slot stays in the
    /// table, dead, with its generation bumped.
    pub fn destroy_entity(&mut self, entity: Entity) {
        let Some(slot) = self.entities.get(entity) else {
            log::debug!("destroy_entity: {entity:?} is stale, ignoring");
            return;
        };

        let present: Vec<ComponentTypeId> =
            slot.mask.ones().map(ComponentTypeId::from_mask_bit).collect();

        for id in present {
            self.release_component(entity, id);
        }

        self.entities.release(entity);
        self.mark_topology_changed();
    }

    /// Destroy an entity and its whole transform subtree, children first
    pub fn destroy_entity_recursive(&mut self, entity: Entity) {
        if !self.is_valid_entity(entity) {
            return;
        }

        let mut doomed = self.descendants(entity);
        doomed.reverse();
        doomed.push(entity);

        for target in doomed {
            self.destroy_entity(target);
        }
    }

    /// Schedule a recursive destroy for the next [`World::flush_destroy_queue`]
    pub fn queue_destroy(&mut self, entity: Entity) {
        if self.is_valid_entity(entity) && !self.destroy_queue.contains(&entity) {
            self.destroy_queue.push(entity);
        }
    }

    /// Destroy everything queued with [`World::queue_destroy`], returning how many roots went
    pub fn flush_destroy_queue(&mut self) -> usize {
        let queued = std::mem::take(&mut self.destroy_queue);
        let mut destroyed = 0;

        for entity in queued {
            if self.is_valid_entity(entity) {
                self.destroy_entity_recursive(entity);
                destroyed += 1;
            }
        }

        destroyed
    }

    /// Entities waiting in the destroy queue
    pub fn pending_destroy_count(&self) -> usize {
        self.destroy_queue.len()
    }

    /// Whether the handle refers to a live entity
    pub fn is_valid_entity(&self, entity: Entity) -> bool {
        self.entities.contains(entity)
    }

    /// Live handle for a slot index, if that slot is alive
    pub fn find_entity(&self, index: u32) -> Option<Entity> {
        self.entities.handle_at(index as usize)
    }

    /// First live entity, in index order, called `name`
    ///
    /// Disabled entities are skipped unless `allow_disabled` is set.
    pub fn find_entity_by_name(&self, name: &str, allow_disabled: bool) -> Option<Entity> {
        self.entities
            .iter_live()
            .find(|(_, slot)| (allow_disabled || slot.enabled) && slot.name == name)
            .map(|(entity, _)| entity)
    }

    /// `T` on the entity [`World::find_entity_by_name`] picks, with that entity
    pub fn try_find_entity_component<T: Component>(
        &self,
        name: &str,
        allow_disabled: bool,
    ) -> Option<(Entity, &T)> {
        let entity = self.find_entity_by_name(name, allow_disabled)?;
        self.get_component::<T>(entity).map(|component| (entity, component))
    }

    /// Number of live entities
    pub fn entity_count(&self) -> usize {
        self.entities.live_count()
    }

    /// Number of entity slots, live or dead
    pub fn capacity(&self) -> usize {
        self.entities.len()
    }

    /// Live entities in ascending index order
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter_live().map(|(entity, _)| entity)
    }

    /// Name of a live entity
    pub fn entity_name(&self, entity: Entity) -> Option<&str> {
        self.entities.get(entity).map(|slot| slot.name.as_str())
    }

    /// Rename a live entity
    pub fn set_entity_name(&mut self, entity: Entity, name: impl Into<String>) {
        if let Some(slot) = self.entities.get_mut(entity) {
            slot.name = name.into();
        }
    }

    /// Enable or disable a live entity
    pub fn set_entity_enabled(&mut self, entity: Entity, enabled: bool) {
        if let Some(slot) = self.entities.get_mut(entity) {
            if slot.enabled != enabled {
                slot.enabled = enabled;
                self.mark_topology_changed();
            }
        }
    }

    /// Whether an entity is enabled, optionally requiring every transform ancestor to be enabled too
    pub fn is_entity_enabled(&self, entity: Entity, check_parents: bool) -> bool {
        let Some(slot) = self.entities.get(entity) else {
            return false;
        };

        if !slot.enabled {
            return false;
        }

        if !check_parents {
            return true;
        }

        let mut cursor = self.parent_of(entity);
        while let Some(parent) = cursor {
            if !self.entities.get(parent).is_some_and(|slot| slot.enabled) {
                return false;
            }
            cursor = self.parent_of(parent);
        }

        true
    }

    /// Layer of a live entity
    pub fn entity_layer(&self, entity: Entity) -> Option<u32> {
        self.entities.get(entity).map(|slot| slot.layer)
    }

    /// Move a live entity to another layer
    pub fn set_entity_layer(&mut self, entity: Entity, layer: u32) {
        if let Some(slot) = self.entities.get_mut(entity) {
            slot.layer = layer;
        }
    }

    /// Label used in diagnostics, e.g. `'ship' (3v1)`
    pub(crate) fn describe(&self, entity: Entity) -> String {
        match self.entities.get(entity) {
            Some(slot) => format!("'{}' ({entity})", slot.name),
            None => format!("<dead> ({entity})"),
        }
    }

    // ── Components ──

    /// Add a default-constructed component
    ///
    /// If the entity already has `T`, the existing instance's destruction
    /// hook runs and it is replaced by a fresh default. Returns `None` for
    /// stale handles.
    pub fn add_component<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.attach_component::<T>(entity, None)
    }

    /// Add a component and initialize it with `value`
    ///
    /// Follows the same reset rules as [`World::add_component`], with `value`
    /// taking the place of the fresh default.
    pub fn insert_component<T: Component>(&mut self, entity: Entity, value: T) -> Option<&mut T> {
        self.attach_component::<T>(entity, Some(value))
    }

    fn attach_component<T: Component>(&mut self, entity: Entity, value: Option<T>) -> Option<&mut T> {
        if !self.entities.contains(entity) {
            log::debug!("add_component<{}>: {entity:?} is stale, ignoring", std::any::type_name::<T>());
            return None;
        }

        let id = self.ensure_store::<T>();
        let index = entity.slot();

        let Some(store) = self.stores.get(id.index()).and_then(Option::as_ref) else {
            log::warn!(
                "add_component<{}>: store is detached for iteration",
                self.registry.name(id)
            );
            return None;
        };
        debug_assert_eq!(store.len(), self.entities.len());

        if self.entities.get(entity).is_some_and(|slot| slot.has(id)) {
            self.release_component(entity, id);
        }

        if let Some(store) = self.stores.get_mut(id.index()).and_then(Option::as_mut) {
            store.reset_cell(index);
        }
        if self.registry.id_of::<Transform>() == Some(id) {
            self.graph.reset(index);
        }
        if let Some(value) = value {
            if let Some(store) = self.typed_store_mut::<T>(id) {
                store.put(index, value);
            }
        }
        if let Some(slot) = self.entities.get_mut(entity) {
            slot.insert(id);
        }
        self.mark_topology_changed();

        if let Some(run) = self.behaviour_runner(id) {
            self.run_awake(run, entity);
        }
        self.notify_added(entity, id);

        self.get_component_mut::<T>(entity)
    }

    /// Remove a component from an entity, returning whether it was present
    ///
    /// The cell stays in the store; only the mask bit is cleared.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> bool {
        let Some(id) = self.registry.id_of::<T>() else {
            return false;
        };

        if !self.entities.get(entity).is_some_and(|slot| slot.has(id)) {
            return false;
        }

        self.release_component(entity, id);
        if let Some(slot) = self.entities.get_mut(entity) {
            slot.remove(id);
        }
        self.mark_topology_changed();
        true
    }

    /// Whether a live entity has `T`
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.registry
            .id_of::<T>()
            .is_some_and(|id| self.entities.get(entity).is_some_and(|slot| slot.has(id)))
    }

    /// Get a component from an entity
    ///
    /// An instance whose own lifecycle hook is running is moved out of its
    /// cell and reads as absent until the hook returns.
    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.try_get_component(entity).ok()
    }

    /// Get a component from an entity, saying why it is not there
    pub fn try_get_component<T: Component>(&self, entity: Entity) -> Result<&T, EcsError> {
        let slot = self.entities.get(entity).ok_or(EcsError::StaleHandle(entity))?;
        let name = type_name::<T>();
        let id = self
            .registry
            .id_of::<T>()
            .ok_or(EcsError::UnregisteredComponent(name))?;

        if !slot.has(id) {
            return Err(EcsError::MissingComponent {
                entity,
                component: name,
            });
        }
        if self.is_borrowed(id, entity.slot()) {
            return Err(EcsError::StoreBusy(name));
        }

        self.typed_store::<T>(id)
            .and_then(|store| store.get(entity.slot()))
            .ok_or(EcsError::StoreBusy(name))
    }

    /// Get a mutable component from an entity
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        let id = self.registry.id_of::<T>()?;
        if !self.entities.get(entity)?.has(id) || self.is_borrowed(id, entity.slot()) {
            return None;
        }
        self.typed_store_mut::<T>(id)?.get_mut(entity.slot())
    }

    /// Run `observer` after every add or insert of `T`
    ///
    /// Observers run in registration order, after the behaviour `awake`
    /// hook. A panicking observer is logged and the rest still run.
    pub fn on_component_added<T: Component>(&mut self, observer: ComponentAdded) {
        let id = self.ensure_store::<T>();
        self.registry.observe_added(id, observer);
    }

    /// Run `observer` whenever `T` leaves an entity
    ///
    /// Covers removal, entity destruction and the reset of a re-added
    /// component. The component is still attached and readable while the
    /// observer runs.
    pub fn on_component_removed<T: Component>(&mut self, observer: ComponentRemoved) {
        let id = self.ensure_store::<T>();
        self.registry.observe_removed(id, observer);
    }

    /// Number of live entities that have `T`
    pub fn count_entities<T: Component>(&self) -> usize {
        self.registry.id_of::<T>().map_or(0, |id| {
            self.entities.iter_live().filter(|(_, slot)| slot.has(id)).count()
        })
    }

    /// Type names of every component on a live entity
    pub fn component_names(&self, entity: Entity) -> Vec<&'static str> {
        self.entities.get(entity).map_or_else(Vec::new, |slot| {
            slot.mask
                .ones()
                .map(|index| self.registry.name(ComponentTypeId::from_mask_bit(index)))
                .collect()
        })
    }

    /// Store for `T`, if it has been registered
    pub fn component_store<T: Component>(&self) -> Option<&ComponentStore<T>> {
        self.typed_store::<T>(self.registry.id_of::<T>()?)
    }

    /// Component type registry
    pub const fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Nearest transform ancestor, excluding `entity`, that has `T`
    pub fn get_component_in_parent<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.component_entity_in_parent::<T>(entity)
            .and_then(|owner| self.get_component::<T>(owner))
    }

    /// Every `T` in the transform subtree below `entity`, depth-first pre-order
    pub fn get_components_in_children<T: Component>(
        &self,
        entity: Entity,
        include_self: bool,
    ) -> Vec<(Entity, &T)> {
        if !self.is_valid_entity(entity) {
            return Vec::new();
        }

        let mut found = Vec::new();
        if include_self {
            if let Some(component) = self.get_component::<T>(entity) {
                found.push((entity, component));
            }
        }

        for descendant in self.descendants(entity) {
            if let Some(component) = self.get_component::<T>(descendant) {
                found.push((descendant, component));
            }
        }

        found
    }

    pub(crate) fn component_entity_in_parent<T: Component>(&self, entity: Entity) -> Option<Entity> {
        let mut cursor = self.parent_of(entity);
        while let Some(parent) = cursor {
            if self.has_component::<T>(parent) {
                return Some(parent);
            }
            cursor = self.parent_of(parent);
        }
        None
    }

    // ── Topology ──

    /// Counter bumped by every structural change
    ///
    /// Caches such as [`EntityQuery`](super::EntityQuery) remember the version
    /// they were built at and rebuild when it moves.
    pub const fn topology_version(&self) -> u64 {
        self.topology_version
    }

    /// Signal that cached views of this world are out of date
    pub fn mark_topology_changed(&mut self) {
        self.topology_version = self.topology_version.wrapping_add(1);
    }

    // ── Store plumbing ──

    /// Register `T` and create its store if needed
    pub(crate) fn ensure_store<T: Component>(&mut self) -> ComponentTypeId {
        let (id, created) = self.registry.register::<T>();
        if created {
            debug_assert_eq!(id.index(), self.stores.len());
            self.stores.push(Some(Box::new(ComponentStore::<T>::with_len(self.entities.len()))));
            log::debug!(
                "Registered component store {} ({} slots backfilled)",
                self.registry.name(id),
                self.entities.len()
            );
        }
        id
    }

    pub(crate) fn typed_store<T: Component>(&self, id: ComponentTypeId) -> Option<&ComponentStore<T>> {
        self.stores
            .get(id.index())?
            .as_deref()?
            .as_any()
            .downcast_ref::<ComponentStore<T>>()
    }

    pub(crate) fn typed_store_mut<T: Component>(
        &mut self,
        id: ComponentTypeId,
    ) -> Option<&mut ComponentStore<T>> {
        self.stores
            .get_mut(id.index())?
            .as_deref_mut()?
            .as_any_mut()
            .downcast_mut::<ComponentStore<T>>()
    }

    /// Detach every listed store, or none of them
    pub(crate) fn detach_stores(&mut self, ids: &[ComponentTypeId]) -> Option<Vec<Box<dyn AnyStore>>> {
        let mut detached = Vec::with_capacity(ids.len());

        for (position, id) in ids.iter().enumerate() {
            match self.stores.get_mut(id.index()).and_then(Option::take) {
                Some(store) => detached.push(store),
                None => {
                    log::warn!("component store {} is already in use", self.registry.name(*id));
                    self.attach_stores(&ids[..position], detached);
                    return None;
                }
            }
        }

        Some(detached)
    }

    pub(crate) fn attach_stores(&mut self, ids: &[ComponentTypeId], stores: Vec<Box<dyn AnyStore>>) {
        let len = self.entities.len();
        for (id, mut store) in ids.iter().zip(stores) {
            store.grow_to(len);
            if let Some(cell) = self.stores.get_mut(id.index()) {
                *cell = Some(store);
            }
        }
    }

    pub(crate) fn is_borrowed(&self, id: ComponentTypeId, index: usize) -> bool {
        self.borrowed.contains(&(id, index))
    }

    fn notify_added(&mut self, entity: Entity, id: ComponentTypeId) {
        for observer in self.registry.added_observers(id) {
            let outcome = catch_unwind(AssertUnwindSafe(|| observer(self, entity)));
            if let Err(payload) = outcome {
                log::error!(
                    "{} added observer failed on {}: {}",
                    self.registry.name(id),
                    self.describe(entity),
                    panic_message(payload.as_ref())
                );
            }
        }
    }

    fn notify_removed(&self, entity: Entity, id: ComponentTypeId) {
        for observer in self.registry.removed_observers(id) {
            let outcome = catch_unwind(AssertUnwindSafe(|| observer(self, entity)));
            if let Err(payload) = outcome {
                log::error!(
                    "{} removed observer failed on {}: {}",
                    self.registry.name(id),
                    self.describe(entity),
                    panic_message(payload.as_ref())
                );
            }
        }
    }

    /// Unlink and run the destruction hook of one present component
    fn release_component(&mut self, entity: Entity, id: ComponentTypeId) {
        let index = entity.slot();
        self.notify_removed(entity, id);

        if self.registry.id_of::<Transform>() == Some(id) {
            self.hierarchy().detach_for_removal(entity);
        }

        if let Some(position) = self.borrowed.iter().position(|cell| *cell == (id, index)) {
            // The running hook owns the instance and destroys it when it returns
            self.borrowed.swap_remove(position);
            return;
        }

        if let Some(store) = self.stores.get_mut(id.index()).and_then(Option::as_mut) {
            store.destroy_cell(index);
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entities.live_count())
            .field("slots", &self.entities.len())
            .field("component_types", &self.registry.len())
            .field("topology_version", &self.topology_version)
            .finish_non_exhaustive()
    }
}

/// World shared across threads under a single-writer, many-reader lock
#[derive(Clone, Default)]
pub struct SharedWorld(Arc<RwLock<World>>);

impl SharedWorld {
    /// Wrap a world for sharing
    pub fn new(world: World) -> Self {
        Self(Arc::new(RwLock::new(world)))
    }

    /// Shared read access; blocks while a writer holds the world
    pub fn read(&self) -> RwLockReadGuard<'_, World> {
        self.0.read()
    }

    /// Exclusive access for structural mutation
    pub fn write(&self) -> RwLockWriteGuard<'_, World> {
        self.0.write()
    }

    /// Exclusive access without blocking
    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, World>> {
        self.0.try_write()
    }
}

impl std::fmt::Debug for SharedWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedWorld").finish_non_exhaustive()
    }
}
