//! # ECS Runtime
//!
//! The entity-component-system core of the engine: generational entity
//! handles, per-type component stores, a transform hierarchy with lazy
//! world-space recomputation, cached entity queries and a per-frame
//! lifecycle dispatcher for systems and behaviour components.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ecs_runtime::prelude::*;
//!
//! #[derive(Default)]
//! struct Position { x: f32, y: f32 }
//! impl Component for Position {}
//!
//! #[derive(Default)]
//! struct Velocity { x: f32, y: f32 }
//! impl Component for Velocity {}
//!
//! let mut world = World::new();
//! let ship = world.create_entity_named("ship");
//! world.insert_component(ship, Position::default());
//! world.insert_component(ship, Velocity { x: 1.0, y: 0.0 });
//!
//! world.for_each(|_: Entity, pos: &mut Position, vel: &mut Velocity| {
//!     pos.x += vel.x;
//!     pos.y += vel.y;
//! });
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod ecs;
pub mod foundation;

/// Common imports for runtime users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, RuntimeConfig},
        ecs::{
            Behaviour, BehaviourContext, Component, DispatchStats, EcsError, Entity,
            EntityPairQuery, EntityQuery, EntityQueryMode, EntitySystem, EntitySystemManager, Hierarchy,
            HookResult, SceneQuery, SharedWorld, SystemCapabilities, SystemId, Transform,
            World,
        },
        foundation::{
            math::{Mat4, Quat, Vec3},
            time::FixedTimestep,
        },
    };
}
