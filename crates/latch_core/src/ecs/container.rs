//! container.rs - C5: per-component-type storage with dependency tracking
//!
//! Grounded on `examples/original_source/yave/ecs/ComponentContainer.h`.
//! Each container owns a `SparseComponentSet<T>` plus two auxiliary sparse
//! sets: `mutated` (touched via `get_mut` since the last pump, feeds
//! `Changed<T>` group subscriptions) and `pending_delete` (queued for
//! removal, feeds `Deleted<T>` subscriptions).
//!
//! Components may declare other component types as required: adding `T` to
//! an entity recursively ensures every required type is already present,
//! auto-inserting a default-constructed instance where it is missing
//! (`World::add_component` drives the recursion; `add_if_not_exist` is the
//! per-container primitive it calls). Conversely, removing a required type
//! while a dependent is still attached is skipped rather than cascaded:
//! each container tracks `required_by`, the inverse of `required`, and
//! `flush_deferred` checks it against the occupancy matrix before actually
//! erasing a pending removal.

use std::any::Any;

use tracing::warn;

use super::component::{type_index, Component, ComponentTypeIndex};
use super::component_box::ComponentBox;
use super::entity::EntityId;
use super::matrix::ComponentMatrix;
use super::sparse_component_set::SparseComponentSet;
use super::sparse_id_set::SparseIdSet;

/// Type-erased face of `ComponentContainer<T>`, used wherever code only
/// knows a `ComponentTypeIndex` (`World`'s deferred-change pump and its
/// required-component auto-add walk).
pub trait ComponentContainerBase: Send + Sync + Any {
    fn type_index(&self) -> ComponentTypeIndex;
    fn required(&self) -> &[ComponentTypeIndex];

    /// Types that declare `T` as required (inverse of `required`). Checked
    /// by `flush_deferred` before honoring a queued removal.
    fn required_by(&self) -> &[ComponentTypeIndex];

    /// Registers `dependent` as a type that requires `T`. Idempotent.
    fn add_required_by(&mut self, dependent: ComponentTypeIndex);

    fn contains(&self, entity: EntityId) -> bool;

    /// Inserts a default-constructed `T` for `entity` if it doesn't already
    /// have one. The type-erased half of `get_or_add`: `World` calls this
    /// while walking a dependent's `required` list so it never needs `T`
    /// itself.
    fn add_if_not_exist(&mut self, entity: EntityId, matrix: &mut ComponentMatrix);

    /// Queue `entity` for removal at the next pump. Idempotent.
    fn queue_remove(&mut self, entity: EntityId);

    /// Apply every queued removal (skipping any still required by a
    /// present dependent), clearing bookkeeping sets and updating the
    /// shared occupancy matrix. Returns the entities actually removed.
    fn flush_deferred(&mut self, matrix: &mut ComponentMatrix) -> Vec<EntityId>;

    /// Entities touched via `get_mut` since the last `clear_mutated`.
    fn mutated(&self) -> &[EntityId];
    fn clear_mutated(&mut self);

    /// Entities removed by the most recent `flush_deferred`, retained until
    /// the next one so `Deleted<T>` groups can observe them.
    fn recently_deleted(&self) -> &[EntityId];

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub struct ComponentContainer<T: Component> {
    type_index: ComponentTypeIndex,
    required: Vec<ComponentTypeIndex>,
    required_by: Vec<ComponentTypeIndex>,
    data: SparseComponentSet<T>,
    mutated: SparseIdSet,
    pending_delete: SparseIdSet,
    recently_deleted: Vec<EntityId>,
}

impl<T: Component> ComponentContainer<T> {
    pub fn new() -> Self {
        Self {
            type_index: type_index::<T>(),
            required: Vec::new(),
            required_by: Vec::new(),
            data: SparseComponentSet::new(),
            mutated: SparseIdSet::new(),
            pending_delete: SparseIdSet::new(),
            recently_deleted: Vec::new(),
        }
    }

    /// Declare that adding `T` to an entity recursively ensures every type
    /// in `required` is already present (see `World::add_component`).
    pub fn require(mut self, required: Vec<ComponentTypeIndex>) -> Self {
        self.required = required;
        self
    }

    /// Attach `value` to `entity`, overwriting whatever was there.
    pub fn add(&mut self, entity: EntityId, value: T, matrix: &mut ComponentMatrix) -> Option<&mut T> {
        matrix.set_component(entity, self.type_index, true);
        self.pending_delete.erase(entity);
        Some(self.data.insert(entity, value))
    }

    /// Returns the existing component for `entity`, inserting a
    /// default-constructed one first if absent. Mirrors `get_or_add` for
    /// callers that already know the concrete type.
    pub fn get_or_add(&mut self, entity: EntityId, matrix: &mut ComponentMatrix) -> &mut T {
        if !self.data.contains(entity) {
            self.add(entity, T::default(), matrix);
        }
        self.data.try_get_mut(entity).expect("just inserted")
    }

    pub fn get(&self, entity: EntityId) -> Option<&T> {
        self.data.try_get(entity)
    }

    /// Mutable access, recording `entity` in the `mutated` set for
    /// `Changed<T>` subscribers.
    pub fn get_mut(&mut self, entity: EntityId) -> Option<&mut T> {
        if self.data.contains(entity) {
            self.mutated.insert(entity);
        }
        self.data.try_get_mut(entity)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn ids(&self) -> &[EntityId] {
        self.data.ids()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.data.iter()
    }
}

impl<T: Component> Default for ComponentContainer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component> ComponentContainerBase for ComponentContainer<T> {
    fn type_index(&self) -> ComponentTypeIndex {
        self.type_index
    }

    fn required(&self) -> &[ComponentTypeIndex] {
        &self.required
    }

    fn required_by(&self) -> &[ComponentTypeIndex] {
        &self.required_by
    }

    fn add_required_by(&mut self, dependent: ComponentTypeIndex) {
        if !self.required_by.contains(&dependent) {
            self.required_by.push(dependent);
        }
    }

    fn contains(&self, entity: EntityId) -> bool {
        self.data.contains(entity)
    }

    fn add_if_not_exist(&mut self, entity: EntityId, matrix: &mut ComponentMatrix) {
        self.get_or_add(entity, matrix);
    }

    fn queue_remove(&mut self, entity: EntityId) {
        if self.data.contains(entity) {
            self.pending_delete.insert(entity);
        }
    }

    /// Applies every queued removal, skipping (with a warning) any entity
    /// where a still-present dependent requires `T`. Skipped entities are
    /// dropped from `pending_delete` rather than retried automatically;
    /// the caller must remove the dependent first, then queue again.
    fn flush_deferred(&mut self, matrix: &mut ComponentMatrix) -> Vec<EntityId> {
        self.recently_deleted.clear();
        for &entity in self.pending_delete.ids() {
            if self.required_by.iter().any(|&dependent| matrix.has_component(entity, dependent)) {
                warn!(
                    entity = %entity,
                    component = std::any::type_name::<T>(),
                    "skipping component removal: still required by a present dependent"
                );
                continue;
            }
            if self.data.erase(entity) {
                matrix.set_component(entity, self.type_index, false);
                self.recently_deleted.push(entity);
            }
            self.mutated.erase(entity);
        }
        self.pending_delete.clear();
        self.recently_deleted.clone()
    }

    fn mutated(&self) -> &[EntityId] {
        self.mutated.ids()
    }

    fn clear_mutated(&mut self) {
        self.mutated.clear();
    }

    fn recently_deleted(&self) -> &[EntityId] {
        &self.recently_deleted
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Produce a boxed copy of `entity`'s component for a foreign container to
/// consume, e.g. when migrating components between worlds.
pub fn box_component<T: Component + Clone>(container: &ComponentContainer<T>, entity: EntityId) -> Option<ComponentBox> {
    container.get(entity).cloned().map(|v| ComponentBox::new(entity, v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Position(f32);
    impl Component for Position {}

    #[derive(Default)]
    struct RequiresPosition(f32);
    impl Component for RequiresPosition {}

    #[test]
    fn add_get_remove_roundtrip() {
        let mut matrix = ComponentMatrix::new();
        let mut container = ComponentContainer::<Position>::new();
        let e = EntityId::new(0, 0);

        container.add(e, Position(1.0), &mut matrix);
        assert_eq!(container.get(e).unwrap().0, 1.0);
        assert!(matrix.has_component(e, container.type_index()));

        container.queue_remove(e);
        let removed = container.flush_deferred(&mut matrix);
        assert_eq!(removed, vec![e]);
        assert!(container.get(e).is_none());
        assert!(!matrix.has_component(e, container.type_index()));
    }

    #[test]
    fn add_if_not_exist_inserts_default_once() {
        let mut matrix = ComponentMatrix::new();
        let mut container = ComponentContainer::<Position>::new();
        let e = EntityId::new(0, 0);

        container.add_if_not_exist(e, &mut matrix);
        assert_eq!(container.get(e).unwrap().0, 0.0);

        container.get_mut(e).unwrap().0 = 9.0;
        container.add_if_not_exist(e, &mut matrix);
        assert_eq!(container.get(e).unwrap().0, 9.0);
    }

    #[test]
    fn flush_deferred_skips_removal_while_required_by_present_dependent() {
        let mut matrix = ComponentMatrix::new();
        let req_index = type_index::<RequiresPosition>();
        let mut position = ComponentContainer::<Position>::new();
        position.add_required_by(req_index);
        let e = EntityId::new(0, 0);

        position.add(e, Position(1.0), &mut matrix);
        matrix.set_component(e, req_index, true);
        position.queue_remove(e);
        let removed = position.flush_deferred(&mut matrix);
        assert!(removed.is_empty());
        assert!(position.contains(e));

        matrix.set_component(e, req_index, false);
        position.queue_remove(e);
        let removed = position.flush_deferred(&mut matrix);
        assert_eq!(removed, vec![e]);
        assert!(!position.contains(e));
    }

    #[test]
    fn get_mut_marks_entity_as_mutated() {
        let mut matrix = ComponentMatrix::new();
        let mut container = ComponentContainer::<Position>::new();
        let e = EntityId::new(0, 0);
        container.add(e, Position(0.0), &mut matrix);
        assert!(container.mutated().is_empty());
        container.get_mut(e).unwrap().0 = 2.0;
        assert_eq!(container.mutated(), &[e]);
        container.clear_mutated();
        assert!(container.mutated().is_empty());
    }
}
