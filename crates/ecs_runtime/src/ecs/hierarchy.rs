//! Transform component and the parent/child hierarchy
//!
//! [`Transform`] is an ordinary component holding local position, rotation
//! and scale. The tree itself lives beside the stores in a world-owned
//! [`TransformGraph`] with one node per entity slot: the parent link, the
//! ordered child list, cached world-space values and the dirty flag. No
//! component value carries a link, so overwriting a `Transform` can never
//! cut a node out of the tree.
//!
//! World-space values are recomputed lazily. Local edits mark the node
//! dirty, and a node turning dirty marks its subtree dirty, so a clean node
//! always has a clean ancestor chain. Reads walk up to the first clean
//! ancestor and recompute downwards from there.
//!
//! Structural changes and world-space reads go through [`Hierarchy`],
//! obtained from [`World::hierarchy`]. Edits made through `&mut Transform`
//! elsewhere (`get_component_mut`, `for_each`, `insert_component`) are
//! flagged by the store and turned into dirty marks when the next
//! `Hierarchy` is opened. Read-only consumers can call [`Hierarchy::flush`]
//! once and then use [`World::cached_world_matrix`].

use super::component::ComponentTypeId;
use super::error::EcsError;
use super::entity::EntityTable;
use super::storage::ComponentStore;
use super::{Component, Entity, World};
use crate::foundation::math::{
    safe_component_div, translation_of, trs_matrix, Mat4, Point3, Quat, Vec3,
};

/// Local position, rotation and scale of an entity
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    local_position: Vec3,
    local_rotation: Quat,
    local_scale: Vec3,
}

impl Component for Transform {}

impl Default for Transform {
    fn default() -> Self {
        Self {
            local_position: Vec3::zeros(),
            local_rotation: Quat::identity(),
            local_scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create from local position only
    pub fn from_position(position: Vec3) -> Self {
        Self {
            local_position: position,
            ..Default::default()
        }
    }

    /// Create from local position, rotation and scale
    pub fn from_trs(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            local_position: position,
            local_rotation: rotation,
            local_scale: scale,
        }
    }

    /// Builder: set local rotation
    #[must_use]
    pub const fn with_rotation(mut self, rotation: Quat) -> Self {
        self.local_rotation = rotation;
        self
    }

    /// Builder: set local scale
    #[must_use]
    pub const fn with_scale(mut self, scale: Vec3) -> Self {
        self.local_scale = scale;
        self
    }

    /// Position relative to the parent
    pub const fn local_position(&self) -> Vec3 {
        self.local_position
    }

    /// Rotation relative to the parent
    pub const fn local_rotation(&self) -> Quat {
        self.local_rotation
    }

    /// Scale relative to the parent
    pub const fn local_scale(&self) -> Vec3 {
        self.local_scale
    }

    /// Set position relative to the parent
    pub fn set_local_position(&mut self, position: Vec3) {
        self.local_position = position;
    }

    /// Set rotation relative to the parent
    pub fn set_local_rotation(&mut self, rotation: Quat) {
        self.local_rotation = rotation;
    }

    /// Set scale relative to the parent
    pub fn set_local_scale(&mut self, scale: Vec3) {
        self.local_scale = scale;
    }

    /// Local TRS matrix
    pub fn local_matrix(&self) -> Mat4 {
        trs_matrix(&self.local_position, &self.local_rotation, &self.local_scale)
    }
}

// ── Graph ──

#[derive(Debug, Clone)]
struct Node {
    parent: Option<Entity>,
    children: Vec<Entity>,
    world_matrix: Mat4,
    world_position: Vec3,
    world_rotation: Quat,
    world_scale: Vec3,
    dirty: bool,
    recomputes: u64,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            world_matrix: Mat4::identity(),
            world_position: Vec3::zeros(),
            world_rotation: Quat::identity(),
            world_scale: Vec3::new(1.0, 1.0, 1.0),
            dirty: true,
            recomputes: 0,
        }
    }
}

/// Hierarchy links and cached world state, one node per entity slot
///
/// Links are generational handles; a handle that no longer resolves
/// through the entity table is treated as absent.
#[derive(Debug, Default)]
pub(crate) struct TransformGraph {
    nodes: Vec<Node>,
}

impl TransformGraph {
    pub(crate) fn grow_to(&mut self, len: usize) {
        if self.nodes.len() < len {
            self.nodes.resize_with(len, Node::default);
        }
    }

    /// Fresh unlinked, dirty node for a slot that just got a transform
    pub(crate) fn reset(&mut self, index: usize) {
        self.grow_to(index + 1);
        if let Some(node) = self.nodes.get_mut(index) {
            *node = Node::default();
        }
    }

    fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    fn children(&self, index: usize) -> &[Entity] {
        self.node(index).map_or(&[], |node| node.children.as_slice())
    }
}

/// Parent of a node, if it still resolves to a live entity
fn live_parent(entities: &EntityTable, node: &Node) -> Option<Entity> {
    node.parent.filter(|parent| entities.contains(*parent))
}

/// Mark a node and its subtree dirty, stopping at subtrees already dirty
fn mark_dirty(nodes: &mut [Node], entities: &EntityTable, index: usize) {
    let mut stack = vec![index];

    while let Some(current) = stack.pop() {
        let Some(node) = nodes.get_mut(current) else {
            continue;
        };
        if node.dirty {
            continue;
        }
        node.dirty = true;
        stack.extend(
            node.children
                .iter()
                .filter(|child| entities.contains(**child))
                .map(|child| child.slot()),
        );
    }
}

/// Recompute the dirty part of the chain ending at `index`, top-down
///
/// Returns how many nodes were recomputed.
fn recompute_chain(
    nodes: &mut [Node],
    transforms: &ComponentStore<Transform>,
    entities: &EntityTable,
    index: usize,
) -> usize {
    let mut chain = Vec::new();
    let mut cursor = Some(index);

    while let Some(current) = cursor {
        let Some(node) = nodes.get(current) else {
            break;
        };
        if !node.dirty {
            break;
        }
        chain.push(current);
        cursor = live_parent(entities, node).map(Entity::slot);
    }

    for &current in chain.iter().rev() {
        let Some(local) = transforms.get(current) else {
            continue;
        };
        let (parent_matrix, parent_rotation, parent_scale) = nodes
            .get(current)
            .and_then(|node| live_parent(entities, node))
            .and_then(|parent| nodes.get(parent.slot()))
            .map_or_else(
                || (Mat4::identity(), Quat::identity(), Vec3::new(1.0, 1.0, 1.0)),
                |parent| (parent.world_matrix, parent.world_rotation, parent.world_scale),
            );

        let Some(node) = nodes.get_mut(current) else {
            continue;
        };
        node.world_matrix = parent_matrix * local.local_matrix();
        node.world_position = translation_of(&node.world_matrix);
        node.world_rotation = parent_rotation * local.local_rotation;
        node.world_scale = parent_scale.component_mul(&local.local_scale);
        node.dirty = false;
        node.recomputes += 1;
    }

    chain.len()
}

// ── World access ──

impl World {
    /// Slot of a live entity that has a transform
    fn transform_slot(&self, entity: Entity) -> Option<usize> {
        let id = self.registry.id_of::<Transform>()?;
        self.entities
            .get(entity)
            .filter(|slot| slot.has(id))
            .map(|_| entity.slot())
    }

    /// Parent of an entity's transform
    pub fn parent_of(&self, entity: Entity) -> Option<Entity> {
        let index = self.transform_slot(entity)?;
        live_parent(&self.entities, self.graph.node(index)?)
    }

    /// Children of an entity's transform in sibling order
    pub fn children_of(&self, entity: Entity) -> &[Entity] {
        self.transform_slot(entity)
            .map_or(&[], |index| self.graph.children(index))
    }

    /// Every entity below `entity` in the hierarchy, depth-first pre-order
    pub fn descendants(&self, entity: Entity) -> Vec<Entity> {
        let mut found = Vec::new();
        let mut stack: Vec<Entity> = self.children_of(entity).iter().rev().copied().collect();

        while let Some(next) = stack.pop() {
            found.push(next);
            stack.extend(self.children_of(next).iter().rev().copied());
        }

        found
    }

    /// Cached world matrix, `None` while it or any ancestor is out of date
    ///
    /// Call [`Hierarchy::flush`] first to bring every transform up to date.
    pub fn cached_world_matrix(&self, entity: Entity) -> Option<Mat4> {
        let index = self.transform_slot(entity)?;
        let transforms = self.component_store::<Transform>()?;

        let mut cursor = Some(entity);
        while let Some(current) = cursor {
            let slot = self.transform_slot(current)?;
            let node = self.graph.node(slot)?;
            if node.dirty || transforms.is_changed(slot) {
                return None;
            }
            cursor = live_parent(&self.entities, node);
        }

        self.graph.node(index).map(|node| node.world_matrix)
    }

    /// Mutable view over the transform hierarchy
    pub fn hierarchy(&mut self) -> Hierarchy<'_> {
        let transform_id = self.ensure_store::<Transform>();
        self.graph.grow_to(self.entities.len());

        let Self {
            entities,
            stores,
            graph,
            topology_version,
            ..
        } = self;

        let transforms = stores
            .get_mut(transform_id.index())
            .and_then(Option::as_deref_mut)
            .and_then(|store| store.as_any_mut().downcast_mut::<ComponentStore<Transform>>());

        let mut hierarchy = Hierarchy {
            entities,
            transforms,
            graph,
            transform_id,
            topology_version,
        };
        hierarchy.absorb_changes();
        hierarchy
    }
}

/// Mutable view over the transforms of one world
///
/// Entities without a `Transform`, and stale handles, read as "not found":
/// getters return `None` and setters do nothing.
pub struct Hierarchy<'w> {
    entities: &'w EntityTable,
    transforms: Option<&'w mut ComponentStore<Transform>>,
    graph: &'w mut TransformGraph,
    transform_id: ComponentTypeId,
    topology_version: &'w mut u64,
}

impl Hierarchy<'_> {
    fn index_of(&self, entity: Entity) -> Option<usize> {
        self.entities
            .get(entity)
            .filter(|slot| slot.has(self.transform_id))
            .map(|_| entity.slot())
    }

    fn node(&self, entity: Entity) -> Option<&Node> {
        self.graph.node(self.index_of(entity)?)
    }

    fn topology_changed(&mut self) {
        *self.topology_version = self.topology_version.wrapping_add(1);
    }

    /// Turn transforms rewritten outside this view into dirty subtrees
    fn absorb_changes(&mut self) {
        let Some(transforms) = self.transforms.as_deref_mut() else {
            return;
        };
        for index in transforms.drain_changed() {
            mark_dirty(&mut self.graph.nodes, self.entities, index);
        }
    }

    fn require(&self, entity: Entity) -> Result<usize, EcsError> {
        if !self.entities.contains(entity) {
            return Err(EcsError::StaleHandle(entity));
        }
        self.index_of(entity).ok_or(EcsError::MissingComponent {
            entity,
            component: std::any::type_name::<Transform>(),
        })
    }

    /// Bring one node up to date and return it
    fn refreshed(&mut self, entity: Entity) -> Option<&Node> {
        let index = self.index_of(entity)?;
        let transforms = self.transforms.as_deref()?;
        recompute_chain(&mut self.graph.nodes, transforms, self.entities, index);
        self.graph.node(index)
    }

    fn edit_local(&mut self, entity: Entity, edit: impl FnOnce(&mut Transform)) {
        let Some(index) = self.index_of(entity) else {
            return;
        };
        let Some(local) = self.transforms.as_deref_mut().and_then(|store| store.cell_mut(index)) else {
            return;
        };
        edit(local);
        mark_dirty(&mut self.graph.nodes, self.entities, index);
    }

    // ── Structure ──

    /// Transform of a live entity
    pub fn transform(&self, entity: Entity) -> Option<&Transform> {
        let index = self.index_of(entity)?;
        self.transforms.as_deref()?.get(index)
    }

    /// Whether the entity is live and has a transform
    pub fn contains(&self, entity: Entity) -> bool {
        self.index_of(entity).is_some()
    }

    /// Whether cached world-space values are out of date
    pub fn is_dirty(&self, entity: Entity) -> bool {
        self.node(entity).is_some_and(|node| node.dirty)
    }

    /// How many times this node's world state has been recomputed
    pub fn recompute_count(&self, entity: Entity) -> u64 {
        self.node(entity).map_or(0, |node| node.recomputes)
    }

    /// Parent of a transform
    pub fn parent(&self, entity: Entity) -> Option<Entity> {
        live_parent(self.entities, self.node(entity)?)
    }

    /// Children in sibling order
    pub fn children(&self, entity: Entity) -> &[Entity] {
        self.node(entity).map_or(&[], |node| node.children.as_slice())
    }

    /// Number of direct children
    pub fn child_count(&self, entity: Entity) -> usize {
        self.children(entity).len()
    }

    /// Child at a sibling position
    pub fn child(&self, entity: Entity, index: usize) -> Option<Entity> {
        self.children(entity).get(index).copied()
    }

    /// Topmost ancestor, or the entity itself when it has no parent
    pub fn root(&self, entity: Entity) -> Option<Entity> {
        let mut current = self.index_of(entity).map(|_| entity)?;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        Some(current)
    }

    /// Position among the parent's children; roots report 0
    pub fn sibling_index(&self, entity: Entity) -> Option<usize> {
        self.index_of(entity)?;
        match self.parent(entity) {
            Some(parent) => self.children(parent).iter().position(|child| *child == entity),
            None => Some(0),
        }
    }

    /// Swap this transform with the sibling at `index`
    pub fn set_sibling_index(&mut self, entity: Entity, index: usize) -> bool {
        self.parent(entity)
            .is_some_and(|parent| self.move_child(parent, entity, index).is_ok())
    }

    /// Swap `child` with whichever sibling occupies `index` under `parent`
    pub fn move_child(&mut self, parent: Entity, child: Entity, index: usize) -> Result<(), EcsError> {
        let parent_index = self.require(parent)?;
        self.require(child)?;

        let violation = |reason| EcsError::TopologyViolation {
            child,
            parent,
            reason,
        };

        let children = &mut self
            .graph
            .nodes
            .get_mut(parent_index)
            .ok_or(violation("no hierarchy node"))?
            .children;
        let current = children
            .iter()
            .position(|candidate| *candidate == child)
            .ok_or(violation("not a child of this parent"))?;

        if index >= children.len() {
            return Err(violation("sibling index out of range"));
        }

        children.swap(current, index);
        self.topology_changed();
        Ok(())
    }

    /// Attach `child` under `parent`, or make it a root with `None`
    ///
    /// The child goes to the end of the new parent's list; siblings keep
    /// their order. Parenting to self or to a descendant is refused without
    /// changing anything. Re-parenting to the current parent is a no-op.
    pub fn set_parent(&mut self, child: Entity, parent: Option<Entity>) -> Result<(), EcsError> {
        let child_index = self.require(child)?;

        if let Some(parent) = parent {
            self.require(parent)?;

            let mut cursor = Some(parent);
            while let Some(ancestor) = cursor {
                if ancestor == child {
                    let reason = if parent == child {
                        "an entity cannot parent itself"
                    } else {
                        "the parent is a descendant of the child"
                    };
                    log::debug!("set_parent rejected for {child:?} -> {parent:?}: {reason}");
                    return Err(EcsError::TopologyViolation {
                        child,
                        parent,
                        reason,
                    });
                }
                cursor = self.parent(ancestor);
            }
        }

        let current = self.parent(child);
        if current == parent {
            return Ok(());
        }

        let nodes = &mut self.graph.nodes;
        if let Some(old) = current {
            if let Some(old_node) = nodes.get_mut(old.slot()) {
                old_node.children.retain(|sibling| *sibling != child);
            }
        }
        if let Some(new) = parent {
            if let Some(new_node) = nodes.get_mut(new.slot()) {
                new_node.children.push(child);
            }
        }
        if let Some(node) = nodes.get_mut(child_index) {
            node.parent = parent;
        }

        mark_dirty(nodes, self.entities, child_index);
        self.topology_changed();
        Ok(())
    }

    /// Depth-first pre-order search below `entity` by entity name
    ///
    /// With `partial`, a name matches when it starts with `name`.
    pub fn search_child(&self, entity: Entity, name: &str, partial: bool) -> Option<Entity> {
        let mut stack: Vec<Entity> = self.children(entity).iter().rev().copied().collect();

        while let Some(next) = stack.pop() {
            let next_name = self.entities.get(next).map_or("", |slot| slot.name.as_str());
            if next_name == name || (partial && next_name.starts_with(name)) {
                return Some(next);
            }
            stack.extend(self.children(next).iter().rev().copied());
        }

        None
    }

    /// Unlink a transform that is about to disappear; its children become roots
    pub(crate) fn detach_for_removal(&mut self, entity: Entity) {
        let Some(index) = self.index_of(entity) else {
            return;
        };
        let parent = self.parent(entity);
        let nodes = &mut self.graph.nodes;

        let children = match nodes.get_mut(index) {
            Some(node) => {
                node.parent = None;
                std::mem::take(&mut node.children)
            }
            None => return,
        };

        if let Some(parent) = parent {
            if let Some(parent_node) = nodes.get_mut(parent.slot()) {
                parent_node.children.retain(|sibling| *sibling != entity);
            }
        }

        for child in children {
            if let Some(child_node) = nodes.get_mut(child.slot()) {
                child_node.parent = None;
            }
            mark_dirty(nodes, self.entities, child.slot());
        }

        self.topology_changed();
    }

    // ── Local space ──

    /// Position relative to the parent
    pub fn local_position(&self, entity: Entity) -> Option<Vec3> {
        self.transform(entity).map(Transform::local_position)
    }

    /// Rotation relative to the parent
    pub fn local_rotation(&self, entity: Entity) -> Option<Quat> {
        self.transform(entity).map(Transform::local_rotation)
    }

    /// Scale relative to the parent
    pub fn local_scale(&self, entity: Entity) -> Option<Vec3> {
        self.transform(entity).map(Transform::local_scale)
    }

    /// Set position relative to the parent
    pub fn set_local_position(&mut self, entity: Entity, position: Vec3) {
        self.edit_local(entity, |local| local.local_position = position);
    }

    /// Set rotation relative to the parent
    pub fn set_local_rotation(&mut self, entity: Entity, rotation: Quat) {
        self.edit_local(entity, |local| local.local_rotation = rotation);
    }

    /// Set scale relative to the parent
    pub fn set_local_scale(&mut self, entity: Entity, scale: Vec3) {
        self.edit_local(entity, |local| local.local_scale = scale);
    }

    // ── World space ──

    /// Recompute cached world state for `entity` if dirty
    ///
    /// Returns `false` when the entity has no transform.
    pub fn update_state(&mut self, entity: Entity) -> bool {
        self.refreshed(entity).is_some()
    }

    /// Recompute every dirty transform, returning how many nodes were updated
    pub fn flush(&mut self) -> usize {
        self.absorb_changes();

        let live: Vec<usize> = self
            .entities
            .iter_live()
            .filter(|(_, slot)| slot.has(self.transform_id))
            .map(|(entity, _)| entity.slot())
            .collect();

        let Some(transforms) = self.transforms.as_deref() else {
            return 0;
        };
        live.into_iter()
            .map(|index| recompute_chain(&mut self.graph.nodes, transforms, self.entities, index))
            .sum()
    }

    /// World matrix, `parent_world * local`
    pub fn world_matrix(&mut self, entity: Entity) -> Option<Mat4> {
        self.refreshed(entity).map(|node| node.world_matrix)
    }

    /// World-space position
    pub fn position(&mut self, entity: Entity) -> Option<Vec3> {
        self.refreshed(entity).map(|node| node.world_position)
    }

    /// World-space rotation
    pub fn rotation(&mut self, entity: Entity) -> Option<Quat> {
        self.refreshed(entity).map(|node| node.world_rotation)
    }

    /// World-space scale
    pub fn scale(&mut self, entity: Entity) -> Option<Vec3> {
        self.refreshed(entity).map(|node| node.world_scale)
    }

    /// World-space forward direction (-Z)
    pub fn forward(&mut self, entity: Entity) -> Option<Vec3> {
        self.rotation(entity).map(|rotation| rotation * -Vec3::z())
    }

    /// World-space right direction (+X)
    pub fn right(&mut self, entity: Entity) -> Option<Vec3> {
        self.rotation(entity).map(|rotation| rotation * Vec3::x())
    }

    /// World-space up direction (+Y)
    pub fn up(&mut self, entity: Entity) -> Option<Vec3> {
        self.rotation(entity).map(|rotation| rotation * Vec3::y())
    }

    /// Place the transform at world position `position`
    ///
    /// The local position is re-derived from the parent's current world
    /// matrix, so later parent moves carry the child along.
    pub fn set_position(&mut self, entity: Entity, position: Vec3) {
        let local = match self.parent(entity) {
            Some(parent) => match self.refreshed(parent) {
                Some(parent_node) => parent_node.world_matrix.try_inverse().map_or_else(
                    || position - parent_node.world_position,
                    |inverse| inverse.transform_point(&Point3::from(position)).coords,
                ),
                None => position,
            },
            None => position,
        };
        self.set_local_position(entity, local);
    }

    /// Set world-space rotation
    pub fn set_rotation(&mut self, entity: Entity, rotation: Quat) {
        let local = match self.parent(entity).and_then(|parent| self.refreshed(parent)) {
            Some(parent_node) => parent_node.world_rotation.inverse() * rotation,
            None => rotation,
        };
        self.set_local_rotation(entity, local);
    }

    /// Set world-space scale
    pub fn set_scale(&mut self, entity: Entity, scale: Vec3) {
        let local = match self.parent(entity).and_then(|parent| self.refreshed(parent)) {
            Some(parent_node) => safe_component_div(&scale, &parent_node.world_scale),
            None => scale,
        };
        self.set_local_scale(entity, local);
    }
}
