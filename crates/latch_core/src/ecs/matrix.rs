//! matrix.rs - C4: entity x component-type occupancy and tag bookkeeping
//!
//! Grounded on `examples/original_source/yave/ecs/ComponentMatrix.h`. The
//! original keeps incrementally-updated group membership lists alongside the
//! occupancy bitmap; this port instead bumps a monotonic `version` on every
//! mutation and lets `EntityGroup` pull a fresh match set when its cached
//! version goes stale (see `group.rs`). Simpler to keep correct, same
//! amortized cost for the group counts this engine expects.

use std::collections::HashMap;

use super::component::ComponentTypeIndex;
use super::entity::EntityId;
use super::sparse_id_set::SparseIdSet;

const BITS: usize = u64::BITS as usize;

#[derive(Default, Clone)]
struct Row(Vec<u64>);

impl Row {
    fn get(&self, col: usize) -> bool {
        self.0
            .get(col / BITS)
            .map(|word| word & (1 << (col % BITS)) != 0)
            .unwrap_or(false)
    }

    fn set(&mut self, col: usize, present: bool) {
        let word_index = col / BITS;
        if self.0.len() <= word_index {
            self.0.resize(word_index + 1, 0);
        }
        let mask = 1u64 << (col % BITS);
        if present {
            self.0[word_index] |= mask;
        } else {
            self.0[word_index] &= !mask;
        }
    }

    fn any(&self) -> bool {
        self.0.iter().any(|&w| w != 0)
    }
}

#[derive(Default)]
pub struct ComponentMatrix {
    rows: Vec<Row>,
    tags: HashMap<String, SparseIdSet>,
    entity_tags: HashMap<EntityId, Vec<String>>,
    version: u64,
}

impl ComponentMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monotonic counter bumped by every mutating call. `EntityGroup` uses
    /// this to know when its cached membership needs recomputing.
    pub fn version(&self) -> u64 {
        self.version
    }

    fn row_mut(&mut self, entity: EntityId) -> &mut Row {
        let idx = entity.index() as usize;
        if self.rows.len() <= idx {
            self.rows.resize(idx + 1, Row::default());
        }
        &mut self.rows[idx]
    }

    pub fn has_component(&self, entity: EntityId, component: ComponentTypeIndex) -> bool {
        self.rows
            .get(entity.index() as usize)
            .map(|row| row.get(component.as_usize()))
            .unwrap_or(false)
    }

    pub fn set_component(&mut self, entity: EntityId, component: ComponentTypeIndex, present: bool) {
        self.row_mut(entity).set(component.as_usize(), present);
        self.version += 1;
    }

    pub fn matches(&self, entity: EntityId, required: &[ComponentTypeIndex], excluded: &[ComponentTypeIndex]) -> bool {
        required.iter().all(|&c| self.has_component(entity, c))
            && excluded.iter().all(|&c| !self.has_component(entity, c))
    }

    pub fn add_tag(&mut self, entity: EntityId, tag: impl Into<String>) {
        let tag = tag.into();
        self.tags.entry(tag.clone()).or_default().insert(entity);
        let owned = self.entity_tags.entry(entity).or_default();
        if !owned.contains(&tag) {
            owned.push(tag);
        }
        self.version += 1;
    }

    pub fn remove_tag(&mut self, entity: EntityId, tag: &str) {
        if let Some(set) = self.tags.get_mut(tag) {
            set.erase(entity);
        }
        if let Some(owned) = self.entity_tags.get_mut(&entity) {
            owned.retain(|t| t != tag);
        }
        self.version += 1;
    }

    pub fn has_tag(&self, entity: EntityId, tag: &str) -> bool {
        self.tags.get(tag).map(|s| s.contains(entity)).unwrap_or(false)
    }

    pub fn entities_with_tag(&self, tag: &str) -> &[EntityId] {
        self.tags.get(tag).map(|s| s.ids()).unwrap_or(&[])
    }

    pub fn tags_of(&self, entity: EntityId) -> &[String] {
        self.entity_tags.get(&entity).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Drop all bookkeeping for an entity being destroyed.
    pub fn remove_entity(&mut self, entity: EntityId) {
        if let Some(tags) = self.entity_tags.remove(&entity) {
            for tag in tags {
                if let Some(set) = self.tags.get_mut(&tag) {
                    set.erase(entity);
                }
            }
        }
        if let Some(row) = self.rows.get_mut(entity.index() as usize) {
            if row.any() {
                *row = Row::default();
            }
        }
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comp(i: u32) -> ComponentTypeIndex {
        ComponentTypeIndex(i)
    }

    #[test]
    fn component_presence_roundtrips() {
        let mut m = ComponentMatrix::new();
        let e = EntityId::new(0, 0);
        assert!(!m.has_component(e, comp(3)));
        m.set_component(e, comp(3), true);
        assert!(m.has_component(e, comp(3)));
        m.set_component(e, comp(3), false);
        assert!(!m.has_component(e, comp(3)));
    }

    #[test]
    fn matches_respects_required_and_excluded() {
        let mut m = ComponentMatrix::new();
        let e = EntityId::new(0, 0);
        m.set_component(e, comp(0), true);
        assert!(m.matches(e, &[comp(0)], &[comp(1)]));
        m.set_component(e, comp(1), true);
        assert!(!m.matches(e, &[comp(0)], &[comp(1)]));
    }

    #[test]
    fn tags_are_per_entity_and_queryable_in_bulk() {
        let mut m = ComponentMatrix::new();
        let a = EntityId::new(0, 0);
        let b = EntityId::new(1, 0);
        m.add_tag(a, "!visible");
        m.add_tag(b, "!visible");
        assert_eq!(m.entities_with_tag("!visible").len(), 2);
        m.remove_tag(a, "!visible");
        assert_eq!(m.entities_with_tag("!visible"), &[b]);
    }

    #[test]
    fn remove_entity_clears_tags_and_components() {
        let mut m = ComponentMatrix::new();
        let e = EntityId::new(0, 0);
        m.set_component(e, comp(2), true);
        m.add_tag(e, "!visible");
        m.remove_entity(e);
        assert!(!m.has_component(e, comp(2)));
        assert!(!m.has_tag(e, "!visible"));
    }
}
