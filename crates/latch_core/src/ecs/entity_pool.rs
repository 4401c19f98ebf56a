//! entity_pool.rs - C3: entity ID allocation and parent/child hierarchy
//!
//! Grounded on `examples/original_source/yave/ecs/EntityPool.h`. Children of
//! a parent form a doubly-linked circular list so detach/insert are O(1); an
//! only child is its own left/right sibling.

use tracing::warn;

use super::entity::EntityId;

#[derive(Copy, Clone)]
struct Record {
    id: EntityId,
    parent: EntityId,
    first_child: EntityId,
    left_sibling: EntityId,
    right_sibling: EntityId,
}

impl Record {
    fn invalid() -> Self {
        Self {
            id: EntityId::INVALID,
            parent: EntityId::INVALID,
            first_child: EntityId::INVALID,
            left_sibling: EntityId::INVALID,
            right_sibling: EntityId::INVALID,
        }
    }

    fn is_valid(&self) -> bool {
        self.id.is_valid()
    }
}

/// Error returned by [`EntityPool::create_with_id`].
#[derive(Debug, thiserror::Error)]
#[error("entity id {0} is already in use")]
pub struct IdInUse(pub EntityId);

pub struct EntityPool {
    entities: Vec<Record>,
    free: Vec<u32>,
}

impl Default for EntityPool {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityPool {
    pub fn new() -> Self {
        Self {
            entities: Vec::new(),
            free: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.entities.len() - self.free.len()
    }

    pub fn exists(&self, id: EntityId) -> bool {
        self.slot(id).is_some()
    }

    fn slot(&self, id: EntityId) -> Option<&Record> {
        let rec = self.entities.get(id.index() as usize)?;
        (rec.id == id).then_some(rec)
    }

    fn slot_mut(&mut self, id: EntityId) -> Option<&mut Record> {
        let rec = self.entities.get_mut(id.index() as usize)?;
        (rec.id == id).then_some(rec)
    }

    /// Allocate a fresh id, reusing a free slot (with a bumped generation)
    /// when available.
    pub fn create(&mut self) -> EntityId {
        let index = self.free.pop().unwrap_or_else(|| {
            self.entities.push(Record::invalid());
            (self.entities.len() - 1) as u32
        });

        let version = self.entities[index as usize].id.version().wrapping_add(1);
        let id = EntityId::new(index, version);
        self.entities[index as usize] = Record {
            id,
            parent: EntityId::INVALID,
            first_child: id,
            left_sibling: id,
            right_sibling: id,
        };
        id
    }

    /// Materialize an entity at a specific id (used when loading prefabs).
    /// Fails if that slot is currently occupied.
    pub fn create_with_id(&mut self, id: EntityId) -> Result<EntityId, IdInUse> {
        let index = id.index() as usize;
        if index < self.entities.len() && self.entities[index].is_valid() {
            return Err(IdInUse(id));
        }
        if self.entities.len() <= index {
            let start = self.entities.len() as u32;
            self.entities.resize_with(index + 1, Record::invalid);
            self.free.extend(start..index as u32);
        } else {
            self.free.retain(|&i| i as usize != index);
        }
        self.entities[index] = Record {
            id,
            parent: EntityId::INVALID,
            first_child: id,
            left_sibling: id,
            right_sibling: id,
        };
        Ok(id)
    }

    /// Detach from parent, unparent children, and free the slot.
    pub fn remove(&mut self, id: EntityId) {
        if !self.exists(id) {
            return;
        }
        self.set_parent(id, EntityId::INVALID);

        // Re-root children to no parent rather than leaving dangling pointers.
        let children: Vec<EntityId> = self.children(id).collect();
        for child in children {
            self.set_parent(child, EntityId::INVALID);
        }

        self.entities[id.index() as usize] = Record::invalid();
        self.free.push(id.index());
    }

    pub fn parent(&self, id: EntityId) -> EntityId {
        self.slot(id).map(|r| r.parent).unwrap_or(EntityId::INVALID)
    }

    pub fn first_child(&self, id: EntityId) -> EntityId {
        self.slot(id).map(|r| r.first_child).unwrap_or(EntityId::INVALID)
    }

    fn next_child(&self, parent: EntityId, current: EntityId) -> EntityId {
        let next = self.slot(current).map(|r| r.right_sibling).unwrap_or(EntityId::INVALID);
        let first = self.first_child(parent);
        if next == first {
            EntityId::INVALID
        } else {
            next
        }
    }

    /// Detach `child` from its current parent (if any), then attach it at
    /// the head of `parent`'s children list. Passing an invalid `parent`
    /// just detaches.
    pub fn set_parent(&mut self, child: EntityId, parent: EntityId) {
        if !self.exists(child) {
            debug_fail(&format!("set_parent on nonexistent entity {child}"));
            return;
        }

        let old_parent = self.parent(child);
        if old_parent.is_valid() {
            self.detach_from_parent(child, old_parent);
        }

        if parent.is_valid() {
            if !self.exists(parent) {
                debug_fail(&format!("set_parent with nonexistent parent {parent}"));
                return;
            }
            self.attach_to_parent(child, parent);
        } else if let Some(rec) = self.slot_mut(child) {
            rec.parent = EntityId::INVALID;
        }
    }

    fn detach_from_parent(&mut self, child: EntityId, parent: EntityId) {
        let (left, right) = {
            let rec = self.slot(child).unwrap();
            (rec.left_sibling, rec.right_sibling)
        };

        if left == child {
            // Only child: clear parent's first_child.
            if let Some(p) = self.slot_mut(parent) {
                p.first_child = EntityId::INVALID;
            }
        } else {
            if let Some(l) = self.slot_mut(left) {
                l.right_sibling = right;
            }
            if let Some(r) = self.slot_mut(right) {
                r.left_sibling = left;
            }
            if let Some(p) = self.slot_mut(parent) {
                if p.first_child == child {
                    p.first_child = right;
                }
            }
        }

        if let Some(rec) = self.slot_mut(child) {
            rec.parent = EntityId::INVALID;
            rec.left_sibling = child;
            rec.right_sibling = child;
        }
    }

    fn attach_to_parent(&mut self, child: EntityId, parent: EntityId) {
        let old_first = self.first_child(parent);
        if old_first.is_valid() {
            let old_last = self.slot(old_first).unwrap().left_sibling;
            if let Some(rec) = self.slot_mut(child) {
                rec.parent = parent;
                rec.left_sibling = old_last;
                rec.right_sibling = old_first;
            }
            if let Some(l) = self.slot_mut(old_last) {
                l.right_sibling = child;
            }
            if let Some(f) = self.slot_mut(old_first) {
                f.left_sibling = child;
            }
        } else if let Some(rec) = self.slot_mut(child) {
            rec.parent = parent;
            rec.left_sibling = child;
            rec.right_sibling = child;
        }

        if let Some(p) = self.slot_mut(parent) {
            p.first_child = child;
        }
    }

    pub fn is_parent(&self, id: EntityId, candidate_parent: EntityId) -> bool {
        let mut cur = self.parent(id);
        while cur.is_valid() {
            if cur == candidate_parent {
                return true;
            }
            cur = self.parent(cur);
        }
        false
    }

    /// Lazily iterate live ids in pool order.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter().filter(|r| r.is_valid()).map(|r| r.id)
    }

    /// Lazily iterate `id`'s children, most-recently-attached first.
    pub fn children(&self, id: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        let start = self.first_child(id);
        let mut current = start;
        let mut started = false;
        std::iter::from_fn(move || {
            if !current.is_valid() || (started && current == start) {
                return None;
            }
            started = true;
            let out = current;
            current = self.next_child(id, current);
            Some(out)
        })
    }

    /// Debug-only cycle audit (spec §4.8 step 6).
    #[cfg(debug_assertions)]
    pub fn audit(&self) {
        for id in self.ids() {
            let mut slow = id;
            let mut fast = id;
            loop {
                fast = self.parent(fast);
                if !fast.is_valid() {
                    break;
                }
                fast = self.parent(fast);
                if !fast.is_valid() {
                    break;
                }
                slow = self.parent(slow);
                if slow == fast {
                    warn!(entity = %id, "entity hierarchy cycle detected during audit");
                    break;
                }
            }
        }
    }
}

fn debug_fail(msg: &str) {
    if cfg!(debug_assertions) {
        panic!("{msg}");
    } else {
        tracing::error!("{msg}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_recycles_slots_with_bumped_generation() {
        let mut pool = EntityPool::new();
        let a = pool.create();
        pool.remove(a);
        let b = pool.create();
        assert_eq!(a.index(), b.index());
        assert_ne!(a.version(), b.version());
    }

    #[test]
    fn hierarchy_scenario_a() {
        let mut pool = EntityPool::new();
        let e1 = pool.create();
        let e2 = pool.create();
        let e3 = pool.create();

        pool.set_parent(e2, e1);
        pool.set_parent(e3, e1);

        let children: Vec<_> = pool.children(e1).collect();
        assert_eq!(children, vec![e3, e2]);
        assert_eq!(pool.parent(e2), e1);

        pool.remove(e1);
        assert!(!pool.exists(e1));
        assert!(pool.exists(e2));
        assert!(!pool.parent(e2).is_valid());
    }

    #[test]
    fn only_child_is_its_own_sibling() {
        let mut pool = EntityPool::new();
        let parent = pool.create();
        let child = pool.create();
        pool.set_parent(child, parent);
        assert_eq!(pool.children(parent).collect::<Vec<_>>(), vec![child]);

        pool.set_parent(child, EntityId::INVALID);
        assert!(pool.children(parent).next().is_none());
    }

    #[test]
    fn is_parent_walks_chain() {
        let mut pool = EntityPool::new();
        let grandparent = pool.create();
        let parent = pool.create();
        let child = pool.create();
        pool.set_parent(parent, grandparent);
        pool.set_parent(child, parent);

        assert!(pool.is_parent(child, grandparent));
        assert!(pool.is_parent(child, parent));
        assert!(!pool.is_parent(grandparent, child));
    }

    #[test]
    fn create_with_id_rejects_occupied_slot() {
        let mut pool = EntityPool::new();
        let a = pool.create();
        assert!(pool.create_with_id(a).is_err());
    }
}
