//! Multi-component iteration
//!
//! `World::for_each` visits every live entity that has all of the requested
//! component types, in ascending slot order. The component set is inferred
//! from the callback's parameters:
//!
//! ```rust,no_run
//! # use ecs_runtime::prelude::*;
//! # #[derive(Default)] struct Position { x: f32 }
//! # impl Component for Position {}
//! # #[derive(Default)] struct Velocity { x: f32 }
//! # impl Component for Velocity {}
//! # let mut world = World::new();
//! world.for_each(|_: Entity, pos: &mut Position, vel: &mut Velocity| pos.x += vel.x);
//! ```

use std::any::type_name;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};

use fixedbitset::FixedBitSet;

use super::component::{ComponentRegistry, ComponentTypeId};
use super::error::panic_message;
use super::storage::{AnyStore, ComponentStore};
use super::{Component, Entity, World};

/// A tuple of component types iterated together
pub trait ComponentSet: 'static {
    /// Ids of every member, or `None` if any member has no store yet
    fn type_ids(registry: &ComponentRegistry) -> Option<Vec<ComponentTypeId>>;

    /// Type names of every member, for diagnostics
    fn type_names() -> Vec<&'static str>;
}

/// Callback shape accepted by [`World::for_each`] for a component set `Q`
pub trait ForEachFn<Q: ComponentSet> {
    #[doc(hidden)]
    fn invoke(&mut self, entity: Entity, index: usize, stores: &mut [Box<dyn AnyStore>]);
}

macro_rules! impl_component_set {
    ($(($ty:ident, $var:ident)),+) => {
        impl<$($ty: Component),+> ComponentSet for ($($ty,)+) {
            fn type_ids(registry: &ComponentRegistry) -> Option<Vec<ComponentTypeId>> {
                Some(vec![$(registry.id_of::<$ty>()?),+])
            }

            fn type_names() -> Vec<&'static str> {
                vec![$(type_name::<$ty>()),+]
            }
        }

        impl<Func, $($ty: Component),+> ForEachFn<($($ty,)+)> for Func
        where
            Func: FnMut(Entity, $(&mut $ty),+),
        {
            fn invoke(&mut self, entity: Entity, index: usize, stores: &mut [Box<dyn AnyStore>]) {
                let mut stores = stores.iter_mut();
                $(
                    let Some($var) = stores
                        .next()
                        .and_then(|store| store.as_any_mut().downcast_mut::<ComponentStore<$ty>>())
                        .and_then(|store| store.get_mut(index))
                    else {
                        return;
                    };
                )+
                self(entity, $($var),+);
            }
        }
    };
}

impl_component_set!((A, a));
impl_component_set!((A, a), (B, b));
impl_component_set!((A, a), (B, b), (C, c));
impl_component_set!((A, a), (B, b), (C, c), (D, d));
impl_component_set!((A, a), (B, b), (C, c), (D, d), (E, e));

fn required_mask(ids: &[ComponentTypeId]) -> FixedBitSet {
    let bits = ids.iter().map(|id| id.index() + 1).max().unwrap_or(0);
    let mut mask = FixedBitSet::with_capacity(bits);
    for id in ids {
        mask.insert(id.index());
    }
    mask
}

fn has_duplicates(ids: &[ComponentTypeId]) -> bool {
    ids.iter()
        .enumerate()
        .any(|(position, id)| ids[..position].contains(id))
}

impl World {
    /// Run `callback` for every live entity that has every component it asks for
    ///
    /// Entities are visited in ascending slot order. A callback that panics
    /// is logged with the entity and component types and the pass moves on
    /// to the next entity. Requesting a type that has never been added
    /// visits nothing. Returns the number of entities visited.
    ///
    /// The callback cannot reach the world, so the entity table cannot
    /// change underneath the pass. Called from a behaviour hook, the pass
    /// skips the instance whose hook is running.
    pub fn for_each<Q, F>(&mut self, mut callback: F) -> usize
    where
        Q: ComponentSet,
        F: ForEachFn<Q>,
    {
        let Some(ids) = Q::type_ids(&self.registry) else {
            return 0;
        };

        if has_duplicates(&ids) {
            log::warn!("for_each: component set {:?} repeats a type", Q::type_names());
            return 0;
        }

        let required = required_mask(&ids);
        let Some(mut stores) = self.detach_stores(&ids) else {
            return 0;
        };

        let mut visited = 0;
        for index in 0..self.entities.len() {
            let Some(slot) = self.entities.slot(index) else {
                break;
            };
            if !slot.alive || !required.is_subset(&slot.mask) {
                continue;
            }
            // Instances moved out by a running hook only hold placeholders
            if ids.iter().any(|id| self.is_borrowed(*id, index)) {
                continue;
            }
            let Some(entity) = self.entities.handle_at(index) else {
                continue;
            };

            let outcome = catch_unwind(AssertUnwindSafe(|| {
                callback.invoke(entity, index, &mut stores);
            }));

            if let Err(payload) = outcome {
                log::error!(
                    "Failed to process entity {} with {:?}: {}",
                    self.describe(entity),
                    Q::type_names(),
                    panic_message(payload.as_ref())
                );
            }

            visited += 1;
        }

        self.attach_stores(&ids, stores);
        visited
    }

    /// Live entities whose mask contains every id, in ascending slot order
    pub(crate) fn entities_with(&self, ids: &[ComponentTypeId], include_disabled: bool) -> Vec<Entity> {
        let required = required_mask(ids);
        self.entities
            .iter_live()
            .filter(|(_, slot)| (include_disabled || slot.enabled) && required.is_subset(&slot.mask))
            .map(|(entity, _)| entity)
            .collect()
    }
}

/// Cached list of entities holding every component in `Q`
///
/// Rebuilt by [`SceneQuery::refresh`] whenever the world's topology version
/// has moved since the last build.
#[derive(Debug)]
pub struct SceneQuery<Q: ComponentSet> {
    entities: Vec<Entity>,
    seen_version: Option<u64>,
    include_disabled: bool,
    _marker: PhantomData<fn() -> Q>,
}

impl<Q: ComponentSet> Default for SceneQuery<Q> {
    fn default() -> Self {
        Self::new(false)
    }
}

impl<Q: ComponentSet> SceneQuery<Q> {
    /// Create an empty query; call [`SceneQuery::refresh`] before reading it
    pub const fn new(include_disabled: bool) -> Self {
        Self {
            entities: Vec::new(),
            seen_version: None,
            include_disabled,
            _marker: PhantomData,
        }
    }

    /// Rebuild if the world changed, returning whether a rebuild happened
    pub fn refresh(&mut self, world: &World) -> bool {
        if self.seen_version == Some(world.topology_version()) {
            return false;
        }

        self.entities = Q::type_ids(world.registry())
            .map(|ids| world.entities_with(&ids, self.include_disabled))
            .unwrap_or_default();
        self.seen_version = Some(world.topology_version());
        true
    }

    /// Matching entities as of the last refresh
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Number of matching entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether nothing matched
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
