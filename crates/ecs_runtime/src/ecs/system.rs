//! System trait and capability flags

use bitflags::bitflags;

use super::error::HookResult;
use super::World;

bitflags! {
    /// Which per-frame passes a system takes part in
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SystemCapabilities: u8 {
        /// Variable-step pass
        const UPDATE = 1 << 0;
        /// Fixed-step pass
        const FIXED_UPDATE = 1 << 1;
    }
}

/// World-level logic run by the [`EntitySystemManager`](super::EntitySystemManager)
///
/// `startup` runs once when the system is registered and `shutdown` once
/// when it is unregistered, whatever its capabilities. The update methods
/// only run for the passes named in [`EntitySystem::capabilities`].
pub trait EntitySystem: Send {
    /// Name used in logs and failure reports
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Passes this system wants to run in
    fn capabilities(&self) -> SystemCapabilities;

    /// Called once on registration
    fn startup(&mut self, _world: &mut World) -> HookResult {
        Ok(())
    }

    /// Called once on unregistration
    fn shutdown(&mut self, _world: &mut World) -> HookResult {
        Ok(())
    }

    /// Variable-step update
    fn update(&mut self, _world: &mut World, _delta_time: f32) -> HookResult {
        Ok(())
    }

    /// Fixed-step update
    fn fixed_update(&mut self, _world: &mut World, _fixed_delta: f32) -> HookResult {
        Ok(())
    }
}
