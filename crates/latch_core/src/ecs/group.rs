//! group.rs - C6: materialized entity groups
//!
//! Grounded on `examples/original_source/yave/ecs/EntityGroup.h`. A group is
//! a structural query over component presence and tags; `World` hands out
//! the same underlying group to two systems that request an identical
//! filter rather than materializing duplicates.

use super::component::ComponentTypeIndex;
use super::container::ComponentContainerBase;
use super::entity::EntityId;
use super::entity_pool::EntityPool;
use super::matrix::ComponentMatrix;

/// Structural description of a group's membership criteria. Two filters
/// that compare equal always produce the same members, so `World` can
/// dedupe groups by filter instead of allocating a fresh one per request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct GroupFilter {
    pub required_components: Vec<ComponentTypeIndex>,
    pub excluded_components: Vec<ComponentTypeIndex>,
    pub required_tags: Vec<String>,
    pub excluded_tags: Vec<String>,
}

impl GroupFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_component(mut self, component: ComponentTypeIndex) -> Self {
        self.required_components.push(component);
        self
    }

    pub fn without_component(mut self, component: ComponentTypeIndex) -> Self {
        self.excluded_components.push(component);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.required_tags.push(tag.into());
        self
    }

    pub fn without_tag(mut self, tag: impl Into<String>) -> Self {
        self.excluded_tags.push(tag.into());
        self
    }

    fn matches(&self, entity: EntityId, matrix: &ComponentMatrix) -> bool {
        if !matrix.matches(entity, &self.required_components, &self.excluded_components) {
            return false;
        }
        if !self.required_tags.iter().all(|t| matrix.has_tag(entity, t)) {
            return false;
        }
        if self.excluded_tags.iter().any(|t| matrix.has_tag(entity, t)) {
            return false;
        }
        true
    }
}

/// A materialized, cached intersection of entities satisfying a
/// [`GroupFilter`]. Membership is recomputed lazily: a cached `matrix`
/// version short-circuits `refresh` when nothing could have changed.
pub struct EntityGroup {
    filter: GroupFilter,
    members: Vec<EntityId>,
    cached_version: Option<u64>,
}

impl EntityGroup {
    pub fn new(filter: GroupFilter) -> Self {
        Self {
            filter,
            members: Vec::new(),
            cached_version: None,
        }
    }

    pub fn filter(&self) -> &GroupFilter {
        &self.filter
    }

    pub fn members(&self) -> &[EntityId] {
        &self.members
    }

    /// Recompute membership against the current pool/matrix state, unless
    /// the matrix hasn't mutated since the last refresh.
    pub fn refresh(&mut self, pool: &EntityPool, matrix: &ComponentMatrix) {
        if self.cached_version == Some(matrix.version()) {
            return;
        }
        self.members.clear();
        self.members
            .extend(pool.ids().filter(|&id| self.filter.matches(id, matrix)));
        self.cached_version = Some(matrix.version());
    }

    /// Current members that `container` recorded a mutation for since its
    /// last pump (i.e. a `Changed<T>` subscription over this group).
    pub fn changed(&self, container: &dyn ComponentContainerBase) -> Vec<EntityId> {
        let mutated = container.mutated();
        self.members
            .iter()
            .copied()
            .filter(|id| mutated.contains(id))
            .collect()
    }

    /// Entities that lost a tracked component during the last pump. These
    /// are reported even though they no longer satisfy `self.filter` (the
    /// component is already gone by the time this is queried).
    pub fn deleted<'a>(&self, container: &'a dyn ComponentContainerBase) -> &'a [EntityId] {
        container.recently_deleted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::type_index;

    #[derive(Default)]
    struct Position;
    impl crate::ecs::component::Component for Position {}

    #[derive(Default)]
    struct Hidden;
    impl crate::ecs::component::Component for Hidden {}

    #[test]
    fn refresh_is_noop_without_matrix_mutation() {
        let pool = EntityPool::new();
        let matrix = ComponentMatrix::new();
        let mut group = EntityGroup::new(GroupFilter::new().with_component(type_index::<Position>()));
        group.refresh(&pool, &matrix);
        assert!(group.members().is_empty());
        group.refresh(&pool, &matrix);
        assert!(group.members().is_empty());
    }

    #[test]
    fn refresh_scenario_c_change_filter() {
        let mut pool = EntityPool::new();
        let mut matrix = ComponentMatrix::new();
        let pos = type_index::<Position>();
        let hidden = type_index::<Hidden>();

        let a = pool.create();
        let b = pool.create();
        matrix.set_component(a, pos, true);
        matrix.set_component(b, pos, true);
        matrix.set_component(b, hidden, true);

        let mut group = EntityGroup::new(GroupFilter::new().with_component(pos).without_component(hidden));
        group.refresh(&pool, &matrix);
        assert_eq!(group.members(), &[a]);
    }

    #[test]
    fn tag_filters_combine_with_component_filters() {
        let mut pool = EntityPool::new();
        let mut matrix = ComponentMatrix::new();
        let pos = type_index::<Position>();
        let a = pool.create();
        matrix.set_component(a, pos, true);
        matrix.add_tag(a, "!visible");

        let mut group = EntityGroup::new(GroupFilter::new().with_component(pos).with_tag("!visible"));
        group.refresh(&pool, &matrix);
        assert_eq!(group.members(), &[a]);

        matrix.remove_tag(a, "!visible");
        group.refresh(&pool, &matrix);
        assert!(group.members().is_empty());
    }
}
