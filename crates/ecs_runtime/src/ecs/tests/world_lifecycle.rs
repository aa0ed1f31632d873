//! Entity and component lifecycle across many create/destroy cycles

use crate::config::RuntimeConfig;
use crate::ecs::{Component, Entity, SceneQuery, World};
use crate::foundation::logging;

#[derive(Debug, Default, Clone, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}
impl Component for Position {}

#[derive(Debug, Default, Clone, PartialEq)]
struct Velocity {
    x: f32,
    y: f32,
}
impl Component for Velocity {}

#[derive(Debug, Default)]
struct Lifetime {
    remaining: f32,
}
impl Component for Lifetime {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_then_destroy_scenario() {
        logging::try_init_for_tests();
        let mut world = World::new();

        let e1 = world.create_entity();
        world.insert_component(e1, Position { x: 0.0, y: 0.0 });
        world.insert_component(e1, Velocity { x: 1.0, y: 0.0 });

        world.for_each(|_: Entity, pos: &mut Position, vel: &mut Velocity| {
            pos.x += vel.x;
            pos.y += vel.y;
        });
        assert_eq!(world.get_component::<Position>(e1), Some(&Position { x: 1.0, y: 0.0 }));

        world.destroy_entity(e1);
        let mut visited = 0;
        world.for_each(|_: Entity, _: &mut Position, _: &mut Velocity| visited += 1);
        assert_eq!(visited, 0);
    }

    #[test]
    fn test_old_handles_never_resolve_across_reuse() {
        let mut world = World::new();
        let mut retired = Vec::new();

        for round in 0..20_u8 {
            let entity = world.create_entity();
            world.insert_component(
                entity,
                Position {
                    x: f32::from(round),
                    y: 0.0,
                },
            );
            if round % 3 != 0 {
                world.destroy_entity(entity);
                retired.push(entity);
            }
        }

        for old in &retired {
            assert!(!world.is_valid_entity(*old));
            assert!(world.get_component::<Position>(*old).is_none());
        }

        let mut seen = Vec::new();
        world.for_each(|entity: Entity, _: &mut Position| seen.push(entity));
        assert!(seen.iter().all(|entity| !retired.contains(entity)));
        assert_eq!(seen.len(), world.entity_count());
        assert!(seen.windows(2).all(|pair| pair[0].index() < pair[1].index()));
    }

    #[test]
    fn test_stores_track_entity_table_length() {
        let config = RuntimeConfig {
            initial_entity_capacity: 64,
            ..RuntimeConfig::default()
        };
        let mut world = World::with_config(&config);
        for _ in 0..5 {
            world.create_entity();
        }

        let late = world.create_entity();
        world.add_component::<Lifetime>(late);
        assert_eq!(world.component_store::<Lifetime>().unwrap().len(), world.capacity());

        for _ in 0..3 {
            world.create_entity();
        }
        assert_eq!(world.component_store::<Lifetime>().unwrap().len(), world.capacity());
        assert_eq!(world.capacity(), 9);
    }

    #[test]
    fn test_expiring_entities_are_queued_and_flushed() {
        let mut world = World::new();
        for lifetime in [0.5_f32, 2.0, 0.1] {
            let entity = world.create_entity();
            world.insert_component(entity, Lifetime { remaining: lifetime });
            world.add_component::<Position>(entity);
        }

        let mut expired = Vec::new();
        world.for_each(|entity: Entity, lifetime: &mut Lifetime| {
            lifetime.remaining -= 1.0;
            if lifetime.remaining <= 0.0 {
                expired.push(entity);
            }
        });
        for entity in expired {
            world.queue_destroy(entity);
        }

        let mut query = SceneQuery::<(Lifetime, Position)>::default();
        query.refresh(&world);
        assert_eq!(query.len(), 3);

        assert_eq!(world.flush_destroy_queue(), 2);
        assert!(query.refresh(&world));
        assert_eq!(query.len(), 1);
        assert_eq!(world.count_entities::<Lifetime>(), 1);
    }
}
