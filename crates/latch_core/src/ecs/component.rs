//! component.rs - component type identity
//!
//! Every component type is assigned a process-wide, stable
//! `ComponentTypeIndex` the first time it is touched. The registry is a
//! `TypeId -> index` map behind a `once_cell::sync::Lazy`, mirroring how
//! `latch_core` keeps other process-wide registries (see `latch_env`).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;

/// A component type's stable index into `ComponentMatrix`'s columns.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentTypeIndex(pub(crate) u32);

impl ComponentTypeIndex {
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

static REGISTRY: Lazy<Mutex<HashMap<TypeId, ComponentTypeIndex>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// A type storable as a component. Requires `'static` since the registry
/// keys on `TypeId`; `Send + Sync` so worlds can be shared across the
/// scheduler's worker threads; `Default` so a required-but-absent
/// component can be auto-inserted (see `World::add_component`) without
/// the caller supplying a value.
pub trait Component: Any + Send + Sync + Default + 'static {}

/// Returns `T`'s stable index, assigning one on first use.
pub fn type_index<T: Component>() -> ComponentTypeIndex {
    let type_id = TypeId::of::<T>();
    let mut registry = REGISTRY.lock().expect("component registry poisoned");
    let next = registry.len() as u32;
    *registry.entry(type_id).or_insert(ComponentTypeIndex(next))
}

/// The number of distinct component types registered so far in this process.
/// Used to size `ComponentMatrix` columns.
pub fn registered_count() -> usize {
    REGISTRY.lock().expect("component registry poisoned").len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Position;
    impl Component for Position {}

    #[derive(Default)]
    struct Velocity;
    impl Component for Velocity {}

    #[test]
    fn same_type_always_returns_same_index() {
        let a = type_index::<Position>();
        let b = type_index::<Position>();
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_types_get_distinct_indices() {
        let pos = type_index::<Position>();
        let vel = type_index::<Velocity>();
        assert_ne!(pos, vel);
    }
}
