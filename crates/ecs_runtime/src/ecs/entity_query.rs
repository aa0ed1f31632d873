//! Cached component lookups relative to one entity
//!
//! An [`EntityQuery`] remembers which entities around a target own a
//! component, and an [`EntityPairQuery`] which own two at once, walking the transform hierarchy according to its
//! [`EntityQueryMode`]. The result is rebuilt when the world's topology
//! version moves, or on demand through [`EntityQuery::world_changed`].

use std::marker::PhantomData;

use super::{Component, Entity, World};

/// Which part of the hierarchy an [`EntityQuery`] looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EntityQueryMode {
    /// The target only
    #[default]
    SelfOnly,
    /// The nearest ancestor that has the component
    Parent,
    /// The target, then the nearest ancestor
    SelfAndParent,
    /// Every descendant, depth-first pre-order
    Children,
    /// The target, then every descendant
    SelfAndChildren,
}

impl EntityQueryMode {
    const fn includes_self(self) -> bool {
        matches!(self, Self::SelfOnly | Self::SelfAndParent | Self::SelfAndChildren)
    }

    const fn includes_parent(self) -> bool {
        matches!(self, Self::Parent | Self::SelfAndParent)
    }

    const fn includes_children(self) -> bool {
        matches!(self, Self::Children | Self::SelfAndChildren)
    }
}

/// Target, mode and cached owners shared by the query types
#[derive(Debug)]
struct Gathered {
    target: Entity,
    mode: EntityQueryMode,
    with_entities: bool,
    results: Vec<Entity>,
    seen_version: Option<u64>,
}

impl Gathered {
    const fn new(target: Entity, mode: EntityQueryMode, with_entities: bool) -> Self {
        Self {
            target,
            mode,
            with_entities,
            results: Vec::new(),
            seen_version: None,
        }
    }

    fn refresh(&mut self, world: &World, owns: impl Fn(&World, Entity) -> bool) -> bool {
        if self.seen_version == Some(world.topology_version()) {
            return false;
        }
        self.rebuild(world, owns);
        true
    }

    fn rebuild(&mut self, world: &World, owns: impl Fn(&World, Entity) -> bool) {
        self.results.clear();
        self.seen_version = Some(world.topology_version());

        let target = self.target;
        if !world.is_valid_entity(target) {
            log::trace!("EntityQuery target {target:?} is gone, result is empty");
            return;
        }

        if self.mode.includes_self() && owns(world, target) {
            self.results.push(target);
        }

        if self.mode.includes_parent() {
            let mut cursor = world.parent_of(target);
            while let Some(ancestor) = cursor {
                if owns(world, ancestor) {
                    self.results.push(ancestor);
                    break;
                }
                cursor = world.parent_of(ancestor);
            }
        }

        if self.mode.includes_children() {
            self.results.extend(
                world
                    .descendants(target)
                    .into_iter()
                    .filter(|entity| owns(world, *entity)),
            );
        }
    }

    fn content_entities(&self) -> &[Entity] {
        if self.with_entities {
            &self.results
        } else {
            &[]
        }
    }

    fn content_entity(&self) -> Option<Entity> {
        match self.content_entities() {
            [only] => Some(*only),
            _ => None,
        }
    }

    fn clear(&mut self) {
        self.results.clear();
        self.seen_version = None;
    }
}

/// The only item of an iterator, if it yields exactly one
fn single<I: Iterator>(mut items: I) -> Option<I::Item> {
    let first = items.next()?;
    items.next().is_none().then_some(first)
}

/// Entities around `target` that own a `T`
#[derive(Debug)]
pub struct EntityQuery<T: Component> {
    gathered: Gathered,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Component> EntityQuery<T> {
    /// Bind a query to `target`; it is empty until the first refresh
    ///
    /// With `with_entities` the owning entities are exposed through
    /// [`EntityQuery::content_entities`] alongside the components.
    pub const fn new(target: Entity, mode: EntityQueryMode, with_entities: bool) -> Self {
        Self {
            gathered: Gathered::new(target, mode, with_entities),
            _marker: PhantomData,
        }
    }

    /// Entity the query is bound to
    pub const fn target(&self) -> Entity {
        self.gathered.target
    }

    /// Traversal mode
    pub const fn mode(&self) -> EntityQueryMode {
        self.gathered.mode
    }

    /// Recompute if the world changed since the last build
    ///
    /// Returns whether a recompute happened.
    pub fn refresh(&mut self, world: &World) -> bool {
        self.gathered.refresh(world, World::has_component::<T>)
    }

    /// Recompute unconditionally
    pub fn world_changed(&mut self, world: &World) {
        self.gathered.rebuild(world, World::has_component::<T>);
    }

    /// Components found by the last recompute that are still present
    pub fn contents<'w>(&'w self, world: &'w World) -> impl Iterator<Item = &'w T> + 'w {
        self.gathered
            .results
            .iter()
            .filter_map(move |entity| world.get_component::<T>(*entity))
    }

    /// The single component found, if there is exactly one
    pub fn content<'w>(&self, world: &'w World) -> Option<&'w T> {
        single(
            self.gathered
                .results
                .iter()
                .filter_map(|entity| world.get_component::<T>(*entity)),
        )
    }

    /// Owners of the found components; empty unless built `with_entities`
    pub fn content_entities(&self) -> &[Entity] {
        self.gathered.content_entities()
    }

    /// The single owner found, if there is exactly one and entities are kept
    pub fn content_entity(&self) -> Option<Entity> {
        self.gathered.content_entity()
    }

    /// Number of results from the last recompute
    pub fn len(&self) -> usize {
        self.gathered.results.len()
    }

    /// Whether the last recompute found nothing
    pub fn is_empty(&self) -> bool {
        self.gathered.results.is_empty()
    }

    /// Drop cached results; the next refresh rebuilds them
    pub fn clear(&mut self) {
        self.gathered.clear();
    }
}

/// Entities around `target` that own both a `T` and a `U`
///
/// Same traversal as [`EntityQuery`]; an entity counts only when it has
/// both components.
#[derive(Debug)]
pub struct EntityPairQuery<T: Component, U: Component> {
    gathered: Gathered,
    _marker: PhantomData<fn() -> (T, U)>,
}

impl<T: Component, U: Component> EntityPairQuery<T, U> {
    /// Bind a query to `target`; it is empty until the first refresh
    pub const fn new(target: Entity, mode: EntityQueryMode, with_entities: bool) -> Self {
        Self {
            gathered: Gathered::new(target, mode, with_entities),
            _marker: PhantomData,
        }
    }

    fn owns_both(world: &World, entity: Entity) -> bool {
        world.has_component::<T>(entity) && world.has_component::<U>(entity)
    }

    fn pair<'w>(world: &'w World, entity: Entity) -> Option<(&'w T, &'w U)> {
        Some((world.get_component::<T>(entity)?, world.get_component::<U>(entity)?))
    }

    /// Entity the query is bound to
    pub const fn target(&self) -> Entity {
        self.gathered.target
    }

    /// Traversal mode
    pub const fn mode(&self) -> EntityQueryMode {
        self.gathered.mode
    }

    /// Recompute if the world changed since the last build
    pub fn refresh(&mut self, world: &World) -> bool {
        self.gathered.refresh(world, Self::owns_both)
    }

    /// Recompute unconditionally
    pub fn world_changed(&mut self, world: &World) {
        self.gathered.rebuild(world, Self::owns_both);
    }

    /// Component pairs found by the last recompute that are still present
    pub fn contents<'w>(&'w self, world: &'w World) -> impl Iterator<Item = (&'w T, &'w U)> + 'w {
        self.gathered
            .results
            .iter()
            .filter_map(move |entity| Self::pair(world, *entity))
    }

    /// The single pair found, if there is exactly one
    pub fn content<'w>(&self, world: &'w World) -> Option<(&'w T, &'w U)> {
        single(
            self.gathered
                .results
                .iter()
                .filter_map(|entity| Self::pair(world, *entity)),
        )
    }

    /// Owners of the found pairs; empty unless built `with_entities`
    pub fn content_entities(&self) -> &[Entity] {
        self.gathered.content_entities()
    }

    /// The single owner found, if there is exactly one and entities are kept
    pub fn content_entity(&self) -> Option<Entity> {
        self.gathered.content_entity()
    }

    /// Number of results from the last recompute
    pub fn len(&self) -> usize {
        self.gathered.results.len()
    }

    /// Whether the last recompute found nothing
    pub fn is_empty(&self) -> bool {
        self.gathered.results.is_empty()
    }

    /// Drop cached results; the next refresh rebuilds them
    pub fn clear(&mut self) {
        self.gathered.clear();
    }
}
