//! world.rs - C8: the ECS facade
//!
//! `World` owns the entity pool, the component occupancy matrix, one
//! container per registered component type, and the set of materialized
//! groups. A tick is `tick()`: run every scheduler stage, then
//! `process_deferred_changes()` to flush queued component/entity removals
//! before the next tick begins.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug_span;

use super::component::{type_index, Component, ComponentTypeIndex};
use super::container::{ComponentContainer, ComponentContainerBase};
use super::entity::{EntityId, TickId};
use super::entity_pool::EntityPool;
use super::error::EcsError;
use super::group::{EntityGroup, GroupFilter};
use super::matrix::ComponentMatrix;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GroupHandle(usize);

type SerializeFn = Box<dyn Fn(&World, EntityId) -> Option<Value> + Send + Sync>;
type DeserializeFn = Box<dyn Fn(&World, EntityId, Value) + Send + Sync>;

struct SaveOps {
    serialize: SerializeFn,
    deserialize: DeserializeFn,
}

#[derive(Serialize, serde::Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub entities: Vec<(u32, u32)>,
    pub components: HashMap<String, Vec<((u32, u32), Value)>>,
}

type ComputedTagEvaluator = Box<dyn Fn(&World, EntityId, &str) -> bool + Send + Sync>;

pub struct World {
    pool: RwLock<EntityPool>,
    matrix: RwLock<ComponentMatrix>,
    containers: RwLock<HashMap<ComponentTypeIndex, RwLock<Box<dyn ComponentContainerBase>>>>,
    save_ops: RwLock<HashMap<ComponentTypeIndex, SaveOps>>,
    type_names: RwLock<HashMap<ComponentTypeIndex, &'static str>>,
    groups: RwLock<Vec<EntityGroup>>,
    pending_destroy: Mutex<Vec<EntityId>>,
    tick: RwLock<TickId>,
    computed_tag_evaluator: RwLock<Option<ComputedTagEvaluator>>,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self {
            pool: RwLock::new(EntityPool::new()),
            matrix: RwLock::new(ComponentMatrix::new()),
            containers: RwLock::new(HashMap::new()),
            save_ops: RwLock::new(HashMap::new()),
            type_names: RwLock::new(HashMap::new()),
            groups: RwLock::new(Vec::new()),
            pending_destroy: Mutex::new(Vec::new()),
            tick: RwLock::new(TickId::default()),
            computed_tag_evaluator: RwLock::new(None),
        }
    }

    pub fn current_tick(&self) -> TickId {
        *self.tick.read().expect("tick lock poisoned")
    }

    // -- entities ---------------------------------------------------------

    pub fn create_entity(&self) -> EntityId {
        self.pool.write().expect("pool lock poisoned").create()
    }

    pub fn create_entity_with_id(&self, id: EntityId) -> Result<EntityId, EcsError> {
        Ok(self.pool.write().expect("pool lock poisoned").create_with_id(id)?)
    }

    pub fn entity_exists(&self, id: EntityId) -> bool {
        self.pool.read().expect("pool lock poisoned").exists(id)
    }

    pub fn set_parent(&self, child: EntityId, parent: EntityId) {
        self.pool.write().expect("pool lock poisoned").set_parent(child, parent);
    }

    pub fn parent(&self, id: EntityId) -> EntityId {
        self.pool.read().expect("pool lock poisoned").parent(id)
    }

    /// Queue `id` for destruction: every attached component is queued for
    /// removal, and the pool slot itself is freed at the next
    /// `process_deferred_changes`.
    pub fn destroy_entity(&self, id: EntityId) {
        let containers = self.containers.read().expect("containers lock poisoned");
        for container in containers.values() {
            let mut container = container.write().expect("container lock poisoned");
            if container.contains(id) {
                container.queue_remove(id);
            }
        }
        self.pending_destroy.lock().expect("pending destroy lock poisoned").push(id);
    }

    // -- components ---------------------------------------------------------

    fn get_or_register<T: Component>(&self, required: Vec<ComponentTypeIndex>) -> ComponentTypeIndex {
        let index = type_index::<T>();
        let mut containers = self.containers.write().expect("containers lock poisoned");
        let is_new = !containers.contains_key(&index);
        containers
            .entry(index)
            .or_insert_with(|| RwLock::new(Box::new(ComponentContainer::<T>::new().require(required.clone()))));
        if is_new {
            for req in &required {
                if let Some(req_container) = containers.get(req) {
                    req_container.write().expect("container lock poisoned").add_required_by(index);
                }
            }
        }
        self.type_names
            .write()
            .expect("type names lock poisoned")
            .entry(index)
            .or_insert_with(std::any::type_name::<T>);
        index
    }

    /// Recursively ensures every type `index` requires already has a
    /// default-constructed component on `entity`, walking the requirement
    /// graph depth-first before the caller attaches `index` itself.
    fn ensure_required_components(
        &self,
        index: ComponentTypeIndex,
        entity: EntityId,
        containers: &HashMap<ComponentTypeIndex, RwLock<Box<dyn ComponentContainerBase>>>,
        matrix: &mut ComponentMatrix,
    ) {
        let Some(required) = containers.get(&index).map(|c| c.read().expect("container lock poisoned").required().to_vec()) else {
            return;
        };
        for req in required {
            self.ensure_required_components(req, entity, containers, matrix);
            if let Some(req_container) = containers.get(&req) {
                req_container.write().expect("container lock poisoned").add_if_not_exist(entity, matrix);
            }
        }
    }

    pub fn register_component<T: Component>(&self) {
        self.get_or_register::<T>(Vec::new());
    }

    pub fn register_component_with_requirements<T: Component>(&self, required: Vec<ComponentTypeIndex>) {
        self.get_or_register::<T>(required);
    }

    /// Register `T` for `save_state`/`load_state`, in addition to whatever
    /// `register_component`/`register_component_with_requirements` already
    /// did (or will do — this call registers the container too).
    pub fn register_serializable<T>(&self, required: Vec<ComponentTypeIndex>)
    where
        T: Component + Clone + Serialize + DeserializeOwned,
    {
        let index = self.get_or_register::<T>(required);
        self.save_ops.write().expect("save ops lock poisoned").insert(
            index,
            SaveOps {
                serialize: Box::new(|world, entity| {
                    world.with_component::<T, _>(entity, |c| serde_json::to_value(c).ok()).flatten()
                }),
                deserialize: Box::new(|world, entity, value| {
                    if let Ok(component) = serde_json::from_value::<T>(value) {
                        world.add_component(entity, component);
                    }
                }),
            },
        );
    }

    /// Attaches `value` to `entity`, first recursively auto-inserting a
    /// default-constructed instance of every component `T` requires that
    /// isn't already present (see Scenario B in the component-container
    /// docs).
    pub fn add_component<T: Component>(&self, entity: EntityId, value: T) {
        let index = self.get_or_register::<T>(Vec::new());
        let containers = self.containers.read().expect("containers lock poisoned");
        let mut matrix = self.matrix.write().expect("matrix lock poisoned");
        self.ensure_required_components(index, entity, &containers, &mut matrix);
        let mut container = containers[&index].write().expect("container lock poisoned");
        let container = container
            .as_any_mut()
            .downcast_mut::<ComponentContainer<T>>()
            .expect("container type mismatch");
        container.add(entity, value, &mut matrix);
    }

    pub fn remove_component<T: Component>(&self, entity: EntityId) {
        let index = type_index::<T>();
        let containers = self.containers.read().expect("containers lock poisoned");
        if let Some(container) = containers.get(&index) {
            container.write().expect("container lock poisoned").queue_remove(entity);
        }
    }

    pub fn has_component<T: Component>(&self, entity: EntityId) -> bool {
        let index = type_index::<T>();
        self.matrix.read().expect("matrix lock poisoned").has_component(entity, index)
    }

    pub fn with_component<T: Component, R>(&self, entity: EntityId, f: impl FnOnce(&T) -> R) -> Option<R> {
        let index = type_index::<T>();
        let containers = self.containers.read().expect("containers lock poisoned");
        let container = containers.get(&index)?.read().expect("container lock poisoned");
        container.as_any().downcast_ref::<ComponentContainer<T>>()?.get(entity).map(f)
    }

    pub fn with_component_mut<T: Component, R>(&self, entity: EntityId, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let index = type_index::<T>();
        let containers = self.containers.read().expect("containers lock poisoned");
        let mut container = containers.get(&index)?.write().expect("container lock poisoned");
        container
            .as_any_mut()
            .downcast_mut::<ComponentContainer<T>>()?
            .get_mut(entity)
            .map(f)
    }

    // -- tags ---------------------------------------------------------

    /// Adds `tag` to `entity`. Refuses (with a warning) `@`/`!`-prefixed
    /// names: those sigils are reserved for computed tags and group-filter
    /// exclusion syntax and must never be written directly.
    pub fn add_tag(&self, entity: EntityId, tag: impl Into<String>) {
        let tag = tag.into();
        if super::tags::is_reserved(&tag) {
            tracing::warn!(tag = %tag, "refusing to add reserved tag: '@'/'!'-prefixed names are reserved syntax");
            return;
        }
        self.matrix.write().expect("matrix lock poisoned").add_tag(entity, tag);
    }

    pub fn remove_tag(&self, entity: EntityId, tag: &str) {
        self.matrix.write().expect("matrix lock poisoned").remove_tag(entity, tag);
    }

    /// Returns whether `entity` carries `tag`. For a computed tag (`@name`)
    /// this defers to the registered evaluator, defaulting to `false` (not
    /// present) when none is registered.
    pub fn has_tag(&self, entity: EntityId, tag: &str) -> bool {
        if super::tags::is_computed(tag) {
            let evaluator = self.computed_tag_evaluator.read().expect("tag evaluator lock poisoned");
            return evaluator.as_ref().map(|f| f(self, entity, tag)).unwrap_or(false);
        }
        self.matrix.read().expect("matrix lock poisoned").has_tag(entity, tag)
    }

    pub fn set_computed_tag_evaluator(&self, evaluator: impl Fn(&World, EntityId, &str) -> bool + Send + Sync + 'static) {
        *self.computed_tag_evaluator.write().expect("tag evaluator lock poisoned") = Some(Box::new(evaluator));
    }

    // -- groups ---------------------------------------------------------

    /// Returns a handle to the group matching `filter`, creating it if no
    /// existing group has an identical filter.
    pub fn group(&self, filter: GroupFilter) -> GroupHandle {
        let mut groups = self.groups.write().expect("groups lock poisoned");
        if let Some(i) = groups.iter().position(|g| *g.filter() == filter) {
            return GroupHandle(i);
        }
        groups.push(EntityGroup::new(filter));
        GroupHandle(groups.len() - 1)
    }

    pub fn group_members(&self, handle: GroupHandle) -> Vec<EntityId> {
        let pool = self.pool.read().expect("pool lock poisoned");
        let matrix = self.matrix.read().expect("matrix lock poisoned");
        let mut groups = self.groups.write().expect("groups lock poisoned");
        groups[handle.0].refresh(&pool, &matrix);
        groups[handle.0].members().to_vec()
    }

    pub fn group_changed<T: Component>(&self, handle: GroupHandle) -> Vec<EntityId> {
        let index = type_index::<T>();
        let containers = self.containers.read().expect("containers lock poisoned");
        let Some(container) = containers.get(&index) else {
            return Vec::new();
        };
        let pool = self.pool.read().expect("pool lock poisoned");
        let matrix = self.matrix.read().expect("matrix lock poisoned");
        let mut groups = self.groups.write().expect("groups lock poisoned");
        groups[handle.0].refresh(&pool, &matrix);
        let container = container.read().expect("container lock poisoned");
        groups[handle.0].changed(container.as_ref())
    }

    pub fn group_deleted<T: Component>(&self, handle: GroupHandle) -> Vec<EntityId> {
        let index = type_index::<T>();
        let containers = self.containers.read().expect("containers lock poisoned");
        let Some(container) = containers.get(&index) else {
            return Vec::new();
        };
        let groups = self.groups.read().expect("groups lock poisoned");
        let container = container.read().expect("container lock poisoned");
        groups[handle.0].deleted(container.as_ref()).to_vec()
    }

    // -- lifecycle ---------------------------------------------------------

    /// Advance one tick: run every scheduler stage, then settle deferred
    /// component/entity removals before the next tick begins.
    pub fn tick(&self, scheduler: &super::scheduler::Scheduler) -> TickId {
        scheduler.run_tick(self);
        self.process_deferred_changes();
        self.tick.write().expect("tick lock poisoned").advance()
    }

    /// Flush every container's queued removals, then retire any entities
    /// queued by `destroy_entity`. Containers are flushed in descending
    /// requirement-chain depth order (dependents before dependencies), so
    /// a type removed in the same tick as its dependent is already clear
    /// of that dependent by the time its own `flush_deferred` checks
    /// `required_by`. A type still required by something not also being
    /// removed this tick is skipped, per `ComponentContainer::flush_deferred`.
    pub fn process_deferred_changes(&self) {
        let _span = debug_span!("process_deferred_changes").entered();
        let containers = self.containers.read().expect("containers lock poisoned");
        let mut matrix = self.matrix.write().expect("matrix lock poisoned");

        let mut depth: HashMap<ComponentTypeIndex, u32> = HashMap::new();
        for &index in containers.keys() {
            requirement_depth(index, &containers, &mut depth);
        }

        let mut order: Vec<ComponentTypeIndex> = containers.keys().copied().collect();
        order.sort_by_key(|index| std::cmp::Reverse(depth[index]));

        for index in order {
            containers[&index].write().expect("container lock poisoned").flush_deferred(&mut matrix);
        }

        let mut pending = self.pending_destroy.lock().expect("pending destroy lock poisoned");
        if !pending.is_empty() {
            let mut pool = self.pool.write().expect("pool lock poisoned");
            for entity in pending.drain(..) {
                matrix.remove_entity(entity);
                pool.remove(entity);
            }
        }
    }

    // -- save/load ---------------------------------------------------------

    pub fn save_state(&self) -> WorldSnapshot {
        let pool = self.pool.read().expect("pool lock poisoned");
        let save_ops = self.save_ops.read().expect("save ops lock poisoned");
        let type_names = self.type_names.read().expect("type names lock poisoned");

        let entities: Vec<(u32, u32)> = pool.ids().map(|id| (id.index(), id.version())).collect();
        let mut components = HashMap::new();
        for (&index, ops) in save_ops.iter() {
            let name = type_names.get(&index).copied().unwrap_or("unknown");
            let mut values = Vec::new();
            for id in pool.ids() {
                if let Some(value) = (ops.serialize)(self, id) {
                    values.push(((id.index(), id.version()), value));
                }
            }
            components.insert(name.to_string(), values);
        }

        WorldSnapshot {
            tick: self.current_tick().0,
            entities,
            components,
        }
    }

    /// Replace the world's content with `snapshot`. Component types must
    /// already be registered via `register_serializable`; unknown type
    /// names in the snapshot are skipped with a warning.
    pub fn load_state(&self, snapshot: WorldSnapshot) {
        {
            let mut pool = self.pool.write().expect("pool lock poisoned");
            *pool = EntityPool::new();
            for (index, version) in snapshot.entities {
                let _ = pool.create_with_id(EntityId::new(index, version));
            }
        }
        *self.matrix.write().expect("matrix lock poisoned") = ComponentMatrix::new();
        *self.tick.write().expect("tick lock poisoned") = TickId(snapshot.tick);

        let save_ops = self.save_ops.read().expect("save ops lock poisoned");
        let type_names = self.type_names.read().expect("type names lock poisoned");
        for (name, entries) in snapshot.components {
            let Some((&index, _)) = type_names.iter().find(|(_, n)| **n == name) else {
                tracing::warn!(component = %name, "skipping unknown component type while loading snapshot");
                continue;
            };
            let Some(ops) = save_ops.get(&index) else { continue };
            for ((idx, ver), value) in entries {
                (ops.deserialize)(self, EntityId::new(idx, ver), value);
            }
        }
    }
}

/// 0 for a type with no requirements, otherwise `1 + max` depth of whatever
/// it requires. Memoized in `depth` since the same type can be reached
/// through multiple dependents.
fn requirement_depth(
    index: ComponentTypeIndex,
    containers: &HashMap<ComponentTypeIndex, RwLock<Box<dyn ComponentContainerBase>>>,
    depth: &mut HashMap<ComponentTypeIndex, u32>,
) -> u32 {
    if let Some(&d) = depth.get(&index) {
        return d;
    }
    let required = containers
        .get(&index)
        .map(|c| c.read().expect("container lock poisoned").required().to_vec())
        .unwrap_or_default();
    let d = required.iter().map(|&req| requirement_depth(req, containers, depth) + 1).max().unwrap_or(0);
    depth.insert(index, d);
    d
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Clone, Default, Serialize, Deserialize)]
    struct Position {
        x: f32,
    }
    impl Component for Position {}

    #[test]
    fn add_get_remove_component() {
        let world = World::new();
        let e = world.create_entity();
        world.add_component(e, Position { x: 1.0 });
        assert!(world.has_component::<Position>(e));
        assert_eq!(world.with_component::<Position, _>(e, |p| p.x), Some(1.0));

        world.remove_component::<Position>(e);
        world.process_deferred_changes();
        assert!(!world.has_component::<Position>(e));
    }

    #[test]
    fn destroy_entity_frees_components_and_slot() {
        let world = World::new();
        let e = world.create_entity();
        world.add_component(e, Position { x: 1.0 });
        world.destroy_entity(e);
        world.process_deferred_changes();
        assert!(!world.entity_exists(e));
    }

    #[test]
    fn adding_dependent_auto_adds_missing_required_component() {
        #[derive(Default)]
        struct Velocity {
            dx: f32,
        }
        impl Component for Velocity {}

        let world = World::new();
        let pos_index = type_index::<Position>();
        world.register_component::<Position>();
        world.register_component_with_requirements::<Velocity>(vec![pos_index]);

        let e = world.create_entity();
        assert!(!world.has_component::<Position>(e));
        world.add_component(e, Velocity { dx: 1.0 });
        assert!(world.has_component::<Position>(e));
        assert_eq!(world.with_component::<Position, _>(e, |p| p.x), Some(0.0));
    }

    #[test]
    fn required_component_removal_is_skipped_while_dependent_remains() {
        #[derive(Default)]
        struct Velocity {
            dx: f32,
        }
        impl Component for Velocity {}

        let world = World::new();
        let pos_index = type_index::<Position>();
        world.register_component::<Position>();
        world.register_component_with_requirements::<Velocity>(vec![pos_index]);

        let e = world.create_entity();
        world.add_component(e, Position { x: 0.0 });
        world.add_component(e, Velocity { dx: 1.0 });

        world.remove_component::<Position>(e);
        world.process_deferred_changes();
        assert!(world.has_component::<Position>(e));
        assert!(world.has_component::<Velocity>(e));

        world.remove_component::<Velocity>(e);
        world.process_deferred_changes();
        assert!(!world.has_component::<Velocity>(e));
        assert!(world.has_component::<Position>(e));
    }

    #[test]
    fn snapshot_roundtrip() {
        let world = World::new();
        world.register_serializable::<Position>(Vec::new());
        let e = world.create_entity();
        world.add_component(e, Position { x: 5.0 });

        let snapshot = world.save_state();

        let restored = World::new();
        restored.register_serializable::<Position>(Vec::new());
        restored.load_state(snapshot);
        assert_eq!(restored.with_component::<Position, _>(e, |p| p.x), Some(5.0));
    }
}
