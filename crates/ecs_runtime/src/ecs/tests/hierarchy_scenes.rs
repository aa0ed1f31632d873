//! Transform hierarchies driven by behaviours and observed through queries

use crate::ecs::{
    Behaviour, BehaviourContext, Component, Entity, EntityQuery, EntityQueryMode,
    EntitySystemManager, HookResult, Transform, World,
};
use crate::foundation::math::{constants::HALF_PI, Quat, Vec3};
use crate::foundation::time::FixedTimestep;

/// Spins its entity around +Y at a fixed rate
#[derive(Debug, Default)]
struct Spinner {
    radians_per_second: f32,
}

impl Component for Spinner {}

impl Behaviour for Spinner {
    fn update(&mut self, ctx: &mut BehaviourContext<'_>) -> HookResult {
        let mut hierarchy = ctx.world.hierarchy();
        let current = hierarchy
            .local_rotation(ctx.entity)
            .ok_or("spinner needs a transform")?;
        let step = Quat::from_axis_angle(&Vec3::y_axis(), self.radians_per_second * ctx.delta_time);
        hierarchy.set_local_rotation(ctx.entity, step * current);
        Ok(())
    }
}

#[derive(Debug, Default, PartialEq)]
struct Mass(f32);
impl Component for Mass {}

fn body(world: &mut World, name: &str, offset: Vec3, parent: Option<Entity>) -> Entity {
    let entity = world.create_entity_named(name);
    world.insert_component(entity, Transform::from_position(offset));
    world.hierarchy().set_parent(entity, parent).unwrap();
    entity
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const EPSILON: f32 = 1e-4;

    #[test]
    fn test_spinning_parent_carries_its_subtree() {
        let mut world = World::new();
        let mut manager = EntitySystemManager::new();

        let sun = body(&mut world, "sun", Vec3::zeros(), None);
        let planet = body(&mut world, "planet", Vec3::new(10.0, 0.0, 0.0), Some(sun));
        let moon = body(&mut world, "moon", Vec3::new(2.0, 0.0, 0.0), Some(planet));
        world.insert_behaviour(sun, Spinner { radians_per_second: HALF_PI });

        let mut timestep = FixedTimestep::new(0.5);
        let stats = manager.run_frame(&mut world, 1.0, &mut timestep);
        assert!(!stats.failed());

        let mut hierarchy = world.hierarchy();
        assert_relative_eq!(hierarchy.position(planet).unwrap(), Vec3::new(0.0, 0.0, -10.0), epsilon = EPSILON);
        assert_relative_eq!(hierarchy.position(moon).unwrap(), Vec3::new(0.0, 0.0, -12.0), epsilon = EPSILON);
        assert_relative_eq!(hierarchy.forward(moon).unwrap(), Vec3::new(-1.0, 0.0, 0.0), epsilon = EPSILON);
    }

    #[test]
    fn test_spinner_without_transform_reports_failure() {
        let mut world = World::new();
        let mut manager = EntitySystemManager::new();
        let lonely = world.create_entity_named("lonely");
        world.insert_behaviour(lonely, Spinner { radians_per_second: 1.0 });

        let stats = manager.update(&mut world, 0.1);

        assert_eq!(stats.failures.len(), 1);
        assert!(stats.failures[0].context().contains("'lonely'"));
        assert!(stats.failures[0].to_string().ends_with("spinner needs a transform"));
    }

    #[test]
    fn test_reparenting_keeps_world_position_when_requested() {
        let mut world = World::new();
        let a = body(&mut world, "a", Vec3::new(5.0, 0.0, 0.0), None);
        let b = body(&mut world, "b", Vec3::new(-5.0, 3.0, 0.0), None);
        let item = body(&mut world, "item", Vec3::new(1.0, 0.0, 0.0), Some(a));

        let mut hierarchy = world.hierarchy();
        let before = hierarchy.position(item).unwrap();
        hierarchy.set_parent(item, Some(b)).unwrap();
        hierarchy.set_position(item, before);

        assert_relative_eq!(hierarchy.position(item).unwrap(), Vec3::new(6.0, 0.0, 0.0), epsilon = EPSILON);
        assert_relative_eq!(hierarchy.local_position(item).unwrap(), Vec3::new(11.0, -3.0, 0.0), epsilon = EPSILON);
        assert_eq!(hierarchy.children(a), &[] as &[Entity]);
        assert_eq!(hierarchy.children(b), &[item]);
    }

    #[test]
    fn test_queries_follow_reparenting() {
        let mut world = World::new();
        let ship = body(&mut world, "ship", Vec3::zeros(), None);
        let station = body(&mut world, "station", Vec3::zeros(), None);
        let cargo = body(&mut world, "cargo", Vec3::zeros(), Some(ship));
        world.insert_component(ship, Mass(100.0));
        world.insert_component(station, Mass(5000.0));
        world.insert_component(cargo, Mass(3.0));

        let mut owner = EntityQuery::<Mass>::new(cargo, EntityQueryMode::Parent, true);
        let mut load = EntityQuery::<Mass>::new(ship, EntityQueryMode::SelfAndChildren, false);
        owner.refresh(&world);
        load.refresh(&world);
        assert_eq!(owner.content_entity(), Some(ship));
        assert_relative_eq!(load.contents(&world).map(|mass| mass.0).sum::<f32>(), 103.0);

        world.hierarchy().set_parent(cargo, Some(station)).unwrap();

        assert!(owner.refresh(&world));
        assert!(load.refresh(&world));
        assert_eq!(owner.content(&world), Some(&Mass(5000.0)));
        assert_eq!(load.content(&world), Some(&Mass(100.0)));
    }

    #[test]
    fn test_disabled_ancestor_disables_subtree() {
        let mut world = World::new();
        let root = body(&mut world, "root", Vec3::zeros(), None);
        let child = body(&mut world, "child", Vec3::zeros(), Some(root));
        let leaf = body(&mut world, "leaf", Vec3::zeros(), Some(child));

        world.set_entity_enabled(root, false);

        assert!(world.is_entity_enabled(leaf, false));
        assert!(!world.is_entity_enabled(leaf, true));
        assert_eq!(world.hierarchy().search_child(root, "le", true), Some(leaf));
    }
}
