//! System registration and per-frame lifecycle dispatch
//!
//! The [`EntitySystemManager`] owns every registered [`EntitySystem`] and
//! drives the two per-frame passes:
//!
//! - fixed step: systems with `FIXED_UPDATE` in registration order, then
//!   every behaviour instance's `fixed_update`
//! - variable step: systems with `UPDATE` in registration order, then
//!   every behaviour instance's `start` (once) and `update`, then a second
//!   full pass of `late_update`
//!
//! Each callback is isolated: an error or panic is logged, recorded in the
//! pass's [`DispatchStats`] and the pass carries on.

use std::panic::{catch_unwind, AssertUnwindSafe};

use slotmap::SlotMap;

use super::behaviour::Pass;
use super::error::{CallbackFailure, HookResult};
use super::system::{EntitySystem, SystemCapabilities};
use super::World;
use crate::foundation::time::FixedTimestep;

slotmap::new_key_type! {
    /// Handle to a registered system
    pub struct SystemId;
}

/// Outcome of one or more dispatch passes
#[derive(Debug, Default)]
pub struct DispatchStats {
    /// Callbacks invoked, failed ones included
    pub invoked: usize,
    /// Callbacks that returned an error or panicked
    pub failures: Vec<CallbackFailure>,
}

impl DispatchStats {
    /// Whether any callback failed
    pub fn failed(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Fold another pass into this one
    pub fn merge(&mut self, other: Self) {
        self.invoked += other.invoked;
        self.failures.extend(other.failures);
    }

    /// Count one invocation, logging and keeping its failure
    pub(crate) fn record(&mut self, outcome: Result<(), CallbackFailure>) {
        self.invoked += 1;
        if let Err(failure) = outcome {
            log::error!("{failure}");
            self.failures.push(failure);
        }
    }
}

struct SystemEntry {
    system: Box<dyn EntitySystem>,
    name: String,
    module: Option<String>,
    capabilities: SystemCapabilities,
}

fn guarded(
    name: &str,
    action: &str,
    call: impl FnOnce() -> HookResult,
) -> Result<(), CallbackFailure> {
    CallbackFailure::from_outcome(catch_unwind(AssertUnwindSafe(call)), || {
        format!("system '{name}' {action}")
    })
}

/// Registry and dispatcher for entity systems
#[derive(Default)]
pub struct EntitySystemManager {
    systems: SlotMap<SystemId, SystemEntry>,
    /// Registration order
    order: Vec<SystemId>,
}

impl EntitySystemManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system and run its `startup`
    pub fn register_system(&mut self, world: &mut World, system: impl EntitySystem + 'static) -> SystemId {
        self.insert(world, None, Box::new(system))
    }

    /// Register a system that belongs to `module`
    ///
    /// Everything registered under one module can be removed together with
    /// [`EntitySystemManager::unregister_module`].
    pub fn register_system_in(
        &mut self,
        world: &mut World,
        module: &str,
        system: impl EntitySystem + 'static,
    ) -> SystemId {
        self.insert(world, Some(module.to_owned()), Box::new(system))
    }

    /// Register an already boxed system
    pub fn register_boxed(
        &mut self,
        world: &mut World,
        module: Option<&str>,
        system: Box<dyn EntitySystem>,
    ) -> SystemId {
        self.insert(world, module.map(str::to_owned), system)
    }

    fn insert(&mut self, world: &mut World, module: Option<String>, mut system: Box<dyn EntitySystem>) -> SystemId {
        let name = system.name().to_owned();
        let capabilities = system.capabilities();

        // Startup failures are reported but the system stays registered
        if let Err(failure) = guarded(&name, "startup", || system.startup(world)) {
            log::error!("{failure}");
        }

        let id = self.systems.insert(SystemEntry {
            system,
            name,
            module,
            capabilities,
        });
        self.order.push(id);

        if let Some(entry) = self.systems.get(id) {
            log::debug!(
                "Registered system '{}' ({:?}){}",
                entry.name,
                entry.capabilities,
                entry
                    .module
                    .as_deref()
                    .map(|module| format!(" in module '{module}'"))
                    .unwrap_or_default()
            );
        }
        id
    }

    /// Remove a system and run its `shutdown`
    ///
    /// Returns `false` if the id is unknown.
    pub fn unregister_system(&mut self, world: &mut World, id: SystemId) -> bool {
        let Some(mut entry) = self.systems.remove(id) else {
            return false;
        };
        self.order.retain(|registered| *registered != id);

        let SystemEntry { system, name, .. } = &mut entry;
        if let Err(failure) = guarded(name, "shutdown", || system.shutdown(world)) {
            log::error!("{failure}");
        }
        log::debug!("Unregistered system '{name}'");
        true
    }

    /// Remove every system registered under `module`
    ///
    /// Returns how many were removed; calling it again, or for an unknown
    /// module, removes nothing.
    pub fn unregister_module(&mut self, world: &mut World, module: &str) -> usize {
        let doomed: Vec<SystemId> = self
            .order
            .iter()
            .copied()
            .filter(|id| {
                self.systems
                    .get(*id)
                    .is_some_and(|entry| entry.module.as_deref() == Some(module))
            })
            .collect();

        let removed = doomed
            .into_iter()
            .filter(|id| self.unregister_system(world, *id))
            .count();

        if removed > 0 {
            log::info!("Unloaded module '{module}' ({removed} systems)");
        }
        removed
    }

    /// Shut every system down, newest first
    pub fn shutdown_all(&mut self, world: &mut World) -> usize {
        let ids: Vec<SystemId> = self.order.iter().rev().copied().collect();
        ids.into_iter()
            .filter(|id| self.unregister_system(world, *id))
            .count()
    }

    /// Number of registered systems
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Whether no system is registered
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Whether `id` refers to a registered system
    pub fn contains(&self, id: SystemId) -> bool {
        self.systems.contains_key(id)
    }

    /// Name of a registered system
    pub fn system_name(&self, id: SystemId) -> Option<&str> {
        self.systems.get(id).map(|entry| entry.name.as_str())
    }

    /// Registered systems taking part in a pass, in registration order
    pub fn systems_with(&self, capability: SystemCapabilities) -> Vec<SystemId> {
        self.order
            .iter()
            .copied()
            .filter(|id| {
                self.systems
                    .get(*id)
                    .is_some_and(|entry| entry.capabilities.contains(capability))
            })
            .collect()
    }

    /// Frame preamble: apply deferred destruction
    pub fn begin_frame(&mut self, world: &mut World) -> usize {
        world.flush_destroy_queue()
    }

    /// Run one fixed step
    pub fn fixed_update(&mut self, world: &mut World, fixed_delta: f32) -> DispatchStats {
        let mut stats = DispatchStats::default();

        for id in self.systems_with(SystemCapabilities::FIXED_UPDATE) {
            if let Some(entry) = self.systems.get_mut(id) {
                let SystemEntry { system, name, .. } = entry;
                stats.record(guarded(name, "fixed_update", || system.fixed_update(world, fixed_delta)));
            }
        }

        world.dispatch_behaviours(Pass::Fixed, fixed_delta, &mut stats);

        log::trace!(
            "fixed_update: {} callbacks, {} failed",
            stats.invoked,
            stats.failures.len()
        );
        stats
    }

    /// Run the variable-step update and late update
    pub fn update(&mut self, world: &mut World, delta_time: f32) -> DispatchStats {
        let mut stats = DispatchStats::default();

        for id in self.systems_with(SystemCapabilities::UPDATE) {
            if let Some(entry) = self.systems.get_mut(id) {
                let SystemEntry { system, name, .. } = entry;
                stats.record(guarded(name, "update", || system.update(world, delta_time)));
            }
        }

        world.dispatch_behaviours(Pass::Update, delta_time, &mut stats);
        world.dispatch_behaviours(Pass::Late, delta_time, &mut stats);

        log::trace!(
            "update: {} callbacks, {} failed",
            stats.invoked,
            stats.failures.len()
        );
        stats
    }

    /// Execute all passes for one frame
    ///
    /// Flushes deferred destruction, runs as many fixed steps as the
    /// accumulator yields for `frame_delta`, then the variable-step pass.
    pub fn run_frame(
        &mut self,
        world: &mut World,
        frame_delta: f32,
        timestep: &mut FixedTimestep,
    ) -> DispatchStats {
        self.begin_frame(world);

        let mut stats = DispatchStats::default();
        for _ in 0..timestep.accumulate(frame_delta) {
            stats.merge(self.fixed_update(world, timestep.step()));
        }
        stats.merge(self.update(world, frame_delta));
        stats
    }
}

impl std::fmt::Debug for EntitySystemManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self
            .order
            .iter()
            .filter_map(|id| self.system_name(*id))
            .collect();
        f.debug_struct("EntitySystemManager")
            .field("systems", &names)
            .finish()
    }
}

impl Drop for EntitySystemManager {
    fn drop(&mut self) {
        if !self.systems.is_empty() {
            log::warn!(
                "EntitySystemManager dropped with {} systems still registered; call shutdown_all first",
                self.systems.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{Behaviour, BehaviourContext, Component};
    use std::sync::{Arc, Mutex};

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        label: &'static str,
        capabilities: SystemCapabilities,
        journal: Journal,
        fail_update: bool,
    }

    impl Recorder {
        fn new(label: &'static str, capabilities: SystemCapabilities, journal: &Journal) -> Self {
            Self {
                label,
                capabilities,
                journal: Arc::clone(journal),
                fail_update: false,
            }
        }

        fn log(&self, event: &str) {
            self.journal.lock().unwrap().push(format!("{}:{event}", self.label));
        }
    }

    impl EntitySystem for Recorder {
        fn name(&self) -> &str {
            self.label
        }

        fn capabilities(&self) -> SystemCapabilities {
            self.capabilities
        }

        fn startup(&mut self, _world: &mut World) -> HookResult {
            self.log("startup");
            Ok(())
        }

        fn shutdown(&mut self, _world: &mut World) -> HookResult {
            self.log("shutdown");
            Ok(())
        }

        fn update(&mut self, _world: &mut World, _delta_time: f32) -> HookResult {
            self.log("update");
            if self.fail_update {
                panic!("{} exploded", self.label);
            }
            Ok(())
        }

        fn fixed_update(&mut self, _world: &mut World, _fixed_delta: f32) -> HookResult {
            self.log("fixed");
            Ok(())
        }
    }

    #[derive(Default)]
    struct Pawn {
        journal: Option<Journal>,
    }

    impl Pawn {
        fn log(&self, event: &str) -> HookResult {
            if let Some(journal) = &self.journal {
                journal.lock().unwrap().push(format!("pawn:{event}"));
            }
            Ok(())
        }
    }

    impl Component for Pawn {}

    impl Behaviour for Pawn {
        fn start(&mut self, _ctx: &mut BehaviourContext<'_>) -> HookResult {
            self.log("start")
        }

        fn fixed_update(&mut self, _ctx: &mut BehaviourContext<'_>) -> HookResult {
            self.log("fixed")
        }
    }

    fn drain(journal: &Journal) -> Vec<String> {
        std::mem::take(&mut *journal.lock().unwrap())
    }

    #[test]
    fn test_dual_capability_system_starts_and_stops_once() {
        let journal = Journal::default();
        let mut world = World::new();
        let mut manager = EntitySystemManager::new();

        let id = manager.register_system_in(
            &mut world,
            "gameplay",
            Recorder::new("both", SystemCapabilities::all(), &journal),
        );
        assert_eq!(drain(&journal), vec!["both:startup"]);
        assert_eq!(manager.systems_with(SystemCapabilities::UPDATE), vec![id]);
        assert_eq!(manager.systems_with(SystemCapabilities::FIXED_UPDATE), vec![id]);

        assert_eq!(manager.unregister_module(&mut world, "gameplay"), 1);
        assert_eq!(manager.unregister_module(&mut world, "gameplay"), 0);
        assert_eq!(drain(&journal), vec!["both:shutdown"]);
        assert!(manager.systems_with(SystemCapabilities::UPDATE).is_empty());
        assert!(manager.systems_with(SystemCapabilities::FIXED_UPDATE).is_empty());
        assert!(!manager.contains(id));
    }

    #[test]
    fn test_passes_follow_capabilities_and_registration_order() {
        let journal = Journal::default();
        let mut world = World::new();
        let mut manager = EntitySystemManager::new();

        manager.register_system(&mut world, Recorder::new("a", SystemCapabilities::UPDATE, &journal));
        manager.register_system(&mut world, Recorder::new("b", SystemCapabilities::FIXED_UPDATE, &journal));
        manager.register_system(&mut world, Recorder::new("c", SystemCapabilities::all(), &journal));
        drain(&journal);

        manager.fixed_update(&mut world, 0.02);
        assert_eq!(drain(&journal), vec!["b:fixed", "c:fixed"]);

        let stats = manager.update(&mut world, 0.1);
        assert_eq!(drain(&journal), vec!["a:update", "c:update"]);
        assert_eq!(stats.invoked, 2);

        manager.shutdown_all(&mut world);
        assert_eq!(drain(&journal), vec!["c:shutdown", "b:shutdown", "a:shutdown"]);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_fixed_pass_runs_systems_before_behaviours() {
        let journal = Journal::default();
        let mut world = World::new();
        let mut manager = EntitySystemManager::new();

        let entity = world.create_entity();
        world.insert_behaviour(
            entity,
            Pawn {
                journal: Some(Arc::clone(&journal)),
            },
        );
        manager.register_system(&mut world, Recorder::new("sys", SystemCapabilities::FIXED_UPDATE, &journal));
        drain(&journal);

        let stats = manager.fixed_update(&mut world, 0.02);
        assert_eq!(drain(&journal), vec!["sys:fixed", "pawn:start", "pawn:fixed"]);
        assert_eq!(stats.invoked, 3);

        manager.fixed_update(&mut world, 0.02);
        assert_eq!(drain(&journal), vec!["sys:fixed", "pawn:fixed"]);

        manager.shutdown_all(&mut world);
    }

    #[test]
    fn test_panicking_system_is_isolated() {
        let journal = Journal::default();
        let mut world = World::new();
        let mut manager = EntitySystemManager::new();

        manager.register_system(&mut world, Recorder::new("first", SystemCapabilities::UPDATE, &journal));
        let mut faulty = Recorder::new("faulty", SystemCapabilities::UPDATE, &journal);
        faulty.fail_update = true;
        manager.register_system(&mut world, faulty);
        manager.register_system(&mut world, Recorder::new("last", SystemCapabilities::UPDATE, &journal));
        drain(&journal);

        let stats = manager.update(&mut world, 0.1);

        assert_eq!(drain(&journal), vec!["first:update", "faulty:update", "last:update"]);
        assert_eq!(stats.failures.len(), 1);
        assert!(matches!(
            &stats.failures[0],
            CallbackFailure::Panicked { message, .. } if message == "faulty exploded"
        ));
        assert_eq!(stats.failures[0].context(), "system 'faulty' update");

        manager.shutdown_all(&mut world);
    }

    #[test]
    fn test_unregister_unknown_ids_is_harmless() {
        let journal = Journal::default();
        let mut world = World::new();
        let mut manager = EntitySystemManager::new();

        let id = manager.register_system(&mut world, Recorder::new("solo", SystemCapabilities::empty(), &journal));
        assert!(manager.unregister_system(&mut world, id));
        assert!(!manager.unregister_system(&mut world, id));
        assert_eq!(manager.unregister_module(&mut world, "missing"), 0);
        assert_eq!(drain(&journal), vec!["solo:startup", "solo:shutdown"]);
    }

    #[test]
    fn test_run_frame_flushes_queue_and_runs_fixed_steps() {
        let journal = Journal::default();
        let mut world = World::new();
        let mut manager = EntitySystemManager::new();
        manager.register_system(&mut world, Recorder::new("sim", SystemCapabilities::all(), &journal));
        drain(&journal);

        let doomed = world.create_entity();
        world.queue_destroy(doomed);

        let mut timestep = FixedTimestep::new(0.25);
        let stats = manager.run_frame(&mut world, 0.5, &mut timestep);

        assert!(!world.is_valid_entity(doomed));
        assert_eq!(drain(&journal), vec!["sim:fixed", "sim:fixed", "sim:update"]);
        assert_eq!(stats.invoked, 3);

        manager.shutdown_all(&mut world);
    }
}
