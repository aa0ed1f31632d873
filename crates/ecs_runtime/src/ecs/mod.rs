//! Entity-Component-System implementation
//!
//! Generational entity handles, one dense store per component type, a
//! transform hierarchy with lazily recomputed world state, cached queries
//! and a lifecycle dispatcher for systems and behaviour components.

pub mod behaviour;
pub mod component;
pub mod entity;
pub mod entity_query;
pub mod error;
pub mod hierarchy;
pub mod query;
pub mod scheduler;
pub mod storage;
pub mod system;
pub mod world;

#[cfg(test)]
mod tests;

pub use behaviour::{Behaviour, BehaviourContext};
pub use component::{Component, ComponentAdded, ComponentRegistry, ComponentRemoved, ComponentTypeId};
pub use entity::{Entity, DEFAULT_ENTITY_NAME};
pub use entity_query::{EntityPairQuery, EntityQuery, EntityQueryMode};
pub use error::{CallbackFailure, EcsError, HookError, HookResult};
pub use hierarchy::{Hierarchy, Transform};
pub use query::{ComponentSet, ForEachFn, SceneQuery};
pub use scheduler::{DispatchStats, EntitySystemManager, SystemId};
pub use storage::ComponentStore;
pub use system::{EntitySystem, SystemCapabilities};
pub use world::{SharedWorld, World};
