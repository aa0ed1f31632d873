//! Behaviour components and their lifecycle hooks
//!
//! A behaviour is a component with per-frame callbacks. Types opt in with
//! [`World::register_behaviour`] (or [`World::add_behaviour`]), which records
//! a monomorphized runner for the type; the dispatcher then walks the
//! registered types instead of looking hooks up by name.
//!
//! While a hook runs, its instance is moved out of the store so the hook can
//! take `&mut World`. The slot is tracked in `World::borrowed`; if the hook
//! removes its own component or destroys its entity, the runner finishes the
//! destruction when the hook returns.

use std::any::type_name;
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::component::ComponentTypeId;
use super::error::{CallbackFailure, HookResult};
use super::scheduler::DispatchStats;
use super::{Component, Entity, World};

/// Component with lifecycle callbacks
///
/// `awake` runs as soon as the component is added. `start` runs once before
/// the instance's first `update` or `fixed_update`. Every hook may fail;
/// failures are logged and only affect the instance that raised them.
pub trait Behaviour: Component {
    /// Called when the component is added
    fn awake(&mut self, _ctx: &mut BehaviourContext<'_>) -> HookResult {
        Ok(())
    }

    /// Called once before the first update
    fn start(&mut self, _ctx: &mut BehaviourContext<'_>) -> HookResult {
        Ok(())
    }

    /// Called every variable-step frame
    fn update(&mut self, _ctx: &mut BehaviourContext<'_>) -> HookResult {
        Ok(())
    }

    /// Called every variable-step frame after all updates
    fn late_update(&mut self, _ctx: &mut BehaviourContext<'_>) -> HookResult {
        Ok(())
    }

    /// Called every fixed step
    fn fixed_update(&mut self, _ctx: &mut BehaviourContext<'_>) -> HookResult {
        Ok(())
    }
}

/// What a behaviour hook gets to work with
pub struct BehaviourContext<'w> {
    /// Entity that owns the behaviour
    pub entity: Entity,
    /// Seconds covered by this pass; zero for `awake`
    pub delta_time: f32,
    /// The owning world, with this instance moved out of its cell
    ///
    /// Until the hook returns, lookups of this instance through the world
    /// (`get_component`, `get_component_mut`, `for_each`) treat it as
    /// absent; use `self` instead.
    pub world: &'w mut World,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Hook {
    Awake,
    Start,
    Update,
    LateUpdate,
    FixedUpdate,
}

impl Hook {
    const fn name(self) -> &'static str {
        match self {
            Self::Awake => "awake",
            Self::Start => "start",
            Self::Update => "update",
            Self::LateUpdate => "late_update",
            Self::FixedUpdate => "fixed_update",
        }
    }
}

/// Which behaviour pass to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pass {
    /// Pending start, then `fixed_update`
    Fixed,
    /// Pending start, then `update`
    Update,
    /// `late_update` for started instances
    Late,
}

pub(crate) type HookRunner =
    fn(&mut World, Entity, Hook, f32) -> Result<(), CallbackFailure>;

/// Registered behaviour type
#[derive(Clone, Copy)]
pub(crate) struct BehaviourEntry {
    pub(crate) id: ComponentTypeId,
    pub(crate) name: &'static str,
    pub(crate) run: HookRunner,
}

impl std::fmt::Debug for BehaviourEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviourEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Run one hook of the `T` on `entity`
fn run_hook<T: Behaviour>(
    world: &mut World,
    entity: Entity,
    hook: Hook,
    delta_time: f32,
) -> Result<(), CallbackFailure> {
    let Some(id) = world.registry.id_of::<T>() else {
        return Ok(());
    };
    if !world.entities.get(entity).is_some_and(|slot| slot.has(id)) {
        return Ok(());
    }

    let index = entity.slot();
    let Some(mut instance) = world.typed_store_mut::<T>(id).and_then(|store| store.take(index)) else {
        log::warn!(
            "{} {}: store is detached, skipping {}",
            type_name::<T>(),
            world.describe(entity),
            hook.name()
        );
        return Ok(());
    };
    world.borrowed.push((id, index));

    let outcome = {
        let mut ctx = BehaviourContext {
            entity,
            delta_time,
            world: &mut *world,
        };
        catch_unwind(AssertUnwindSafe(|| match hook {
            Hook::Awake => instance.awake(&mut ctx),
            Hook::Start => instance.start(&mut ctx),
            Hook::Update => instance.update(&mut ctx),
            Hook::LateUpdate => instance.late_update(&mut ctx),
            Hook::FixedUpdate => instance.fixed_update(&mut ctx),
        }))
    };

    match world.borrowed.iter().position(|cell| *cell == (id, index)) {
        Some(position) => {
            world.borrowed.swap_remove(position);
            if let Some(store) = world.typed_store_mut::<T>(id) {
                store.put(index, instance);
            }
        }
        // Removed or destroyed from inside its own hook
        None => instance.on_destroy(),
    }

    CallbackFailure::from_outcome(outcome, || {
        format!(
            "{} {} of {}",
            type_name::<T>(),
            hook.name(),
            world.describe(entity)
        )
    })
}

impl World {
    /// Register `T` for lifecycle dispatch
    ///
    /// Registration order decides the order in which different behaviour
    /// types on the same entity are dispatched. Registering twice is a no-op.
    pub fn register_behaviour<T: Behaviour>(&mut self) -> ComponentTypeId {
        let id = self.ensure_store::<T>();
        if !self.behaviours.iter().any(|entry| entry.id == id) {
            self.behaviours.push(BehaviourEntry {
                id,
                name: type_name::<T>(),
                run: run_hook::<T>,
            });
            log::debug!("Registered behaviour {}", type_name::<T>());
        }
        id
    }

    /// Register `T` and add a default instance to `entity`, running `awake`
    pub fn add_behaviour<T: Behaviour>(&mut self, entity: Entity) -> Option<&mut T> {
        self.register_behaviour::<T>();
        self.add_component::<T>(entity)
    }

    /// Register `T` and add `value` to `entity`, running `awake`
    pub fn insert_behaviour<T: Behaviour>(&mut self, entity: Entity, value: T) -> Option<&mut T> {
        self.register_behaviour::<T>();
        self.insert_component(entity, value)
    }

    /// Whether `T` takes part in lifecycle dispatch
    pub fn is_behaviour<T: Component>(&self) -> bool {
        self.registry
            .id_of::<T>()
            .is_some_and(|id| self.behaviour_runner(id).is_some())
    }

    /// Number of registered behaviour types
    pub fn behaviour_count(&self) -> usize {
        self.behaviours.len()
    }

    pub(crate) fn behaviour_runner(&self, id: ComponentTypeId) -> Option<HookRunner> {
        self.behaviours
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.run)
    }

    pub(crate) fn run_awake(&mut self, run: HookRunner, entity: Entity) {
        if let Err(failure) = run(self, entity, Hook::Awake, 0.0) {
            log::error!("{failure}");
        }
    }

    /// Instances to dispatch this pass: entity-major, then registration order
    fn behaviour_population(&self) -> Vec<(Entity, BehaviourEntry)> {
        self.entities
            .iter_live()
            .filter(|(entity, _)| self.is_entity_enabled(*entity, true))
            .flat_map(|(entity, slot)| {
                self.behaviours
                    .iter()
                    .filter(move |entry| slot.has(entry.id))
                    .map(move |entry| (entity, *entry))
            })
            .collect()
    }

    fn still_has(&self, entity: Entity, id: ComponentTypeId) -> bool {
        self.entities.get(entity).is_some_and(|slot| slot.has(id))
    }

    fn take_just_added(&mut self, id: ComponentTypeId, index: usize) -> bool {
        self.stores
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .is_some_and(|store| store.take_just_added(index))
    }

    fn is_just_added(&self, id: ComponentTypeId, index: usize) -> bool {
        self.stores
            .get(id.index())
            .and_then(Option::as_ref)
            .is_some_and(|store| store.is_just_added(index))
    }

    /// Run one behaviour pass over every enabled instance
    ///
    /// The population is taken when the pass begins; instances added
    /// during the pass wait for the next one.
    pub(crate) fn dispatch_behaviours(&mut self, pass: Pass, delta_time: f32, stats: &mut DispatchStats) {
        for (entity, entry) in self.behaviour_population() {
            if !self.still_has(entity, entry.id) {
                continue;
            }
            let index = entity.slot();

            match pass {
                Pass::Fixed | Pass::Update => {
                    if self.take_just_added(entry.id, index) {
                        stats.record((entry.run)(self, entity, Hook::Start, delta_time));
                    }
                    let hook = if pass == Pass::Fixed {
                        Hook::FixedUpdate
                    } else {
                        Hook::Update
                    };
                    if self.still_has(entity, entry.id) {
                        stats.record((entry.run)(self, entity, hook, delta_time));
                    }
                }
                Pass::Late => {
                    if !self.is_just_added(entry.id, index) {
                        stats.record((entry.run)(self, entity, Hook::LateUpdate, delta_time));
                    }
                }
            }
        }
    }
}
