//! compiler.rs - C11: topological sort, aliasing, barriers, persistent hand-off
//!
//! Runs once per frame against a fully-declared [`super::FrameGraphBuilder`].
//! Grounded on the barrier/stage-union idiom in
//! `examples/other_examples/24c310e0_HelixOS-Org-helix__drivers-gpu-magma-crates-lumina-src-graph.rs.rs`:
//! a resource transitions are collapsed into one barrier per incompatible
//! access change, carrying the union of every writer's stages into the
//! union of every subsequent reader's stages.

use std::collections::{HashMap, HashSet, VecDeque};

use wgpu::ShaderStages;

use crate::command::CommandRecorder;
use crate::error::GraphError;

use super::pass::Access;
use super::resource::{PersistentId, ResourceDesc, ResourceId};
use super::{FrameGraphBuilder, PassRecord};

/// Identifies one physical allocation backing zero or more virtual
/// resources that alias onto it across the frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PhysicalId(pub u32);

/// Cross-frame store of persistent virtual resources' physical backings.
/// Owned by whoever drives the frame loop (typically once per `World`),
/// not by any single [`FrameGraphBuilder`].
#[derive(Default)]
pub struct PersistentStore {
    bindings: HashMap<PersistentId, (ResourceDesc, PhysicalId)>,
    next_physical: u32,
}

impl PersistentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_physical(&mut self) -> PhysicalId {
        let id = PhysicalId(self.next_physical);
        self.next_physical += 1;
        id
    }

    fn resolve(&mut self, id: PersistentId, desc: &ResourceDesc) -> PhysicalId {
        if let Some((prior_desc, physical)) = self.bindings.get(&id) {
            if prior_desc.alias_compatible_with(desc) {
                return *physical;
            }
        }
        let physical = self.alloc_physical();
        self.bindings.insert(id, (*desc, physical));
        physical
    }

    /// Drops bindings not touched this frame, returning their physical ids
    /// so the caller can hand them to the command lifetime manager for
    /// deferred destruction.
    fn retire_missing(&mut self, seen: &HashSet<PersistentId>) -> Vec<PhysicalId> {
        let stale: Vec<PersistentId> = self.bindings.keys().filter(|id| !seen.contains(id)).copied().collect();
        stale
            .into_iter()
            .map(|id| self.bindings.remove(&id).expect("key from bindings.keys()").1)
            .collect()
    }
}

#[derive(Debug)]
pub struct Barrier {
    pub before_pass: usize,
    pub resource: ResourceId,
    pub src_stages: ShaderStages,
    pub dst_stages: ShaderStages,
}

/// The frame's recording schedule: a topological pass order, physical
/// resource assignments, and the barriers to emit before each pass.
pub struct CompiledGraph {
    order: Vec<usize>,
    passes: Vec<PassRecord>,
    pub image_physical: Vec<PhysicalId>,
    pub buffer_physical: Vec<PhysicalId>,
    pub barriers: Vec<Barrier>,
    pub released_physical: Vec<PhysicalId>,
}

impl CompiledGraph {
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Invokes each pass's recording closure, in topological order,
    /// against the same command recorder.
    pub fn record(&mut self, recorder: &mut dyn CommandRecorder) {
        for &pass_index in &self.order {
            if let Some(execute) = self.passes[pass_index].execute.as_mut() {
                execute(recorder);
            }
        }
    }
}

fn topological_order(builder: &FrameGraphBuilder) -> Result<Vec<usize>, GraphError> {
    let n = builder.pass_count();
    let mut writers: HashMap<ResourceId, Vec<usize>> = HashMap::new();
    let mut readers: HashMap<ResourceId, Vec<usize>> = HashMap::new();
    for (i, pass) in builder.passes.iter().enumerate() {
        for edge in &pass.edges {
            match edge.access {
                Access::Write => writers.entry(edge.resource).or_default().push(i),
                Access::Read => readers.entry(edge.resource).or_default().push(i),
            }
        }
    }

    let mut adjacency: Vec<HashSet<usize>> = vec![HashSet::new(); n];
    let mut in_degree = vec![0usize; n];
    for (resource, writer_passes) in &writers {
        let Some(reader_passes) = readers.get(resource) else { continue };
        for &w in writer_passes {
            for &r in reader_passes {
                if w != r && adjacency[w].insert(r) {
                    in_degree[r] += 1;
                }
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(node) = queue.pop_front() {
        order.push(node);
        for &next in &adjacency[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if order.len() != n {
        return Err(GraphError::FrameGraphCycle);
    }
    Ok(order)
}

fn validate_inputs(builder: &FrameGraphBuilder) -> Result<(), GraphError> {
    let mut written: HashSet<ResourceId> = HashSet::new();
    for pass in &builder.passes {
        for edge in &pass.edges {
            if edge.access == Access::Write {
                written.insert(edge.resource);
            }
        }
    }
    for pass in &builder.passes {
        for edge in &pass.edges {
            let has_producer = written.contains(&edge.resource)
                || matches!(edge.resource, ResourceId::Image(id) if builder.images[id.0 as usize].persistent.is_some())
                || matches!(edge.resource, ResourceId::Buffer(id) if builder.buffers[id.0 as usize].persistent.is_some());
            if edge.access == Access::Read && !has_producer {
                return Err(GraphError::MissingInput {
                    pass: pass.name.clone(),
                    resource: format!("{:?}", edge.resource),
                });
            }
        }
    }
    Ok(())
}

/// Bucket aliasing: resources sorted by first-use topological position;
/// each is placed in the first compatible bucket whose current occupant's
/// lifetime already ended, or a fresh bucket otherwise.
fn assign_physical(
    resources: &[(ResourceDesc, Option<PersistentId>, Option<usize>, Option<usize>)],
    topo_position: &HashMap<usize, usize>,
    persistent_store: &mut PersistentStore,
    next_physical: &mut u32,
) -> Vec<PhysicalId> {
    struct Bucket {
        desc: ResourceDesc,
        physical: PhysicalId,
        ends_at: usize,
    }

    let mut order: Vec<usize> = (0..resources.len()).collect();
    order.sort_by_key(|&i| resources[i].2.and_then(|p| topo_position.get(&p)).copied().unwrap_or(0));

    let mut assignment = vec![PhysicalId(0); resources.len()];
    let mut buckets: Vec<Bucket> = Vec::new();

    for i in order {
        let (desc, persistent, first, last) = &resources[i];
        if let Some(pid) = persistent {
            assignment[i] = persistent_store.resolve(*pid, desc);
            continue;
        }
        let starts_at = first.and_then(|p| topo_position.get(&p)).copied().unwrap_or(0);
        let ends_at = last.and_then(|p| topo_position.get(&p)).copied().unwrap_or(starts_at);

        if let Some(bucket) = buckets
            .iter_mut()
            .find(|b| b.ends_at < starts_at && b.desc.alias_compatible_with(desc))
        {
            bucket.ends_at = ends_at;
            bucket.desc = *desc;
            assignment[i] = bucket.physical;
        } else {
            let physical = PhysicalId(*next_physical);
            *next_physical += 1;
            buckets.push(Bucket {
                desc: *desc,
                physical,
                ends_at,
            });
            assignment[i] = physical;
        }
    }
    assignment
}

fn build_barriers(builder: &FrameGraphBuilder, order: &[usize]) -> Vec<Barrier> {
    let topo_position: HashMap<usize, usize> = order.iter().enumerate().map(|(pos, &pass)| (pass, pos)).collect();

    let mut touches: HashMap<ResourceId, Vec<(usize, Access, ShaderStages)>> = HashMap::new();
    for &pass_index in order {
        for edge in &builder.passes[pass_index].edges {
            touches.entry(edge.resource).or_default().push((pass_index, edge.access, edge.stage));
        }
    }

    let mut barriers = Vec::new();
    for (resource, mut uses) in touches {
        uses.sort_by_key(|(pass, ..)| topo_position.get(pass).copied().unwrap_or(0));
        let mut pending_write_stages = ShaderStages::NONE;
        let mut prev_access: Option<Access> = None;

        for (pass, access, stage) in uses {
            let incompatible = match prev_access {
                Some(Access::Write) => true,
                Some(Access::Read) => access == Access::Write,
                None => false,
            };
            if incompatible {
                barriers.push(Barrier {
                    before_pass: pass,
                    resource,
                    src_stages: pending_write_stages,
                    dst_stages: stage,
                });
            }
            if access == Access::Write {
                pending_write_stages |= stage;
            }
            prev_access = Some(access);
        }
    }
    barriers
}

pub(crate) fn compile(mut builder: FrameGraphBuilder, persistent_store: &mut PersistentStore) -> Result<CompiledGraph, GraphError> {
    validate_inputs(&builder)?;
    let order = topological_order(&builder)?;
    let topo_position: HashMap<usize, usize> = order.iter().enumerate().map(|(pos, &pass)| (pass, pos)).collect();
    let barriers = build_barriers(&builder, &order);

    let image_inputs: Vec<_> = builder
        .images
        .iter()
        .map(|r| (r.desc, r.persistent, r.first_pass, r.last_pass))
        .collect();
    let buffer_inputs: Vec<_> = builder
        .buffers
        .iter()
        .map(|r| (r.desc, r.persistent, r.first_pass, r.last_pass))
        .collect();

    let mut next_physical = 0u32;
    let image_physical = assign_physical(&image_inputs, &topo_position, persistent_store, &mut next_physical);
    let buffer_physical = assign_physical(&buffer_inputs, &topo_position, persistent_store, &mut next_physical);

    let seen: HashSet<PersistentId> = builder
        .images
        .iter()
        .chain(builder.buffers.iter())
        .filter_map(|r| r.persistent)
        .collect();
    let released_physical = persistent_store.retire_missing(&seen);

    let passes = std::mem::take(&mut builder.passes);
    Ok(CompiledGraph {
        order,
        passes,
        image_physical,
        buffer_physical,
        barriers,
        released_physical,
    })
}

#[cfg(test)]
mod tests {
    use super::super::resource::{Extent, ImageFormat};
    use super::*;

    #[test]
    fn cycle_is_rejected() {
        let mut graph = FrameGraphBuilder::new();
        let a = graph.declare_image(super::super::ImageDesc {
            format: ImageFormat::R8,
            extent: Extent::new_2d(1, 1),
            mip_levels: 1,
        });
        let b = graph.declare_image(super::super::ImageDesc {
            format: ImageFormat::R8,
            extent: Extent::new_2d(1, 1),
            mip_levels: 1,
        });
        graph.add_pass("p1", |p| {
            p.add_storage_input(a, ShaderStages::COMPUTE);
            p.add_storage_output(b, ShaderStages::COMPUTE);
        });
        graph.add_pass("p2", |p| {
            p.add_storage_input(b, ShaderStages::COMPUTE);
            p.add_storage_output(a, ShaderStages::COMPUTE);
        });

        let mut store = PersistentStore::new();
        assert!(matches!(graph.compile(&mut store), Err(GraphError::FrameGraphCycle)));
    }

    #[test]
    fn missing_producer_is_rejected() {
        let mut graph = FrameGraphBuilder::new();
        let a = graph.declare_image(super::super::ImageDesc {
            format: ImageFormat::R8,
            extent: Extent::new_2d(1, 1),
            mip_levels: 1,
        });
        graph.add_pass("reads_only", |p| {
            p.add_storage_input(a, ShaderStages::COMPUTE);
        });
        let mut store = PersistentStore::new();
        assert!(matches!(graph.compile(&mut store), Err(GraphError::MissingInput { .. })));
    }

    #[test]
    fn scenario_d_non_overlapping_images_alias() {
        let mut graph = FrameGraphBuilder::new();
        let desc = super::super::ImageDesc {
            format: ImageFormat::R8,
            extent: Extent::new_2d(256, 256),
            mip_levels: 1,
        };
        let a = graph.declare_image(desc);
        graph.add_pass("p1", |p| p.add_storage_output(a, ShaderStages::COMPUTE));

        let b = graph.declare_image(desc);
        graph.add_pass("p2", |p| {
            p.add_storage_input(a, ShaderStages::COMPUTE);
            p.add_storage_output(b, ShaderStages::COMPUTE);
        });

        let c = graph.declare_image(desc);
        graph.add_pass("p3", |p| {
            p.add_storage_input(b, ShaderStages::COMPUTE);
            p.add_storage_output(c, ShaderStages::COMPUTE);
        });

        let mut store = PersistentStore::new();
        let compiled = graph.compile(&mut store).unwrap();
        let physical_ids: HashSet<_> = compiled.image_physical.iter().collect();
        assert_eq!(physical_ids.len(), 2, "A and C should alias the same physical slot");
    }

    #[test]
    fn scenario_f_persistent_resource_survives_and_then_releases() {
        let mut store = PersistentStore::new();
        let persistent_id = PersistentId::new();
        let desc = super::super::ImageDesc {
            format: ImageFormat::Rgba8,
            extent: Extent::new_2d(128, 128),
            mip_levels: 1,
        };

        let mut frame_n = FrameGraphBuilder::new();
        let x = frame_n.declare_persistent_image(desc, persistent_id);
        frame_n.add_pass("write_x", |p| p.add_storage_output(x, ShaderStages::COMPUTE));
        let compiled_n = frame_n.compile(&mut store).unwrap();
        let physical_n = compiled_n.image_physical[0];

        let mut frame_n1 = FrameGraphBuilder::new();
        let x_prime = frame_n1.declare_persistent_image(desc, persistent_id);
        frame_n1.add_pass("read_x", |p| p.add_storage_input(x_prime, ShaderStages::COMPUTE));
        let compiled_n1 = frame_n1.compile(&mut store).unwrap();
        assert_eq!(compiled_n1.image_physical[0], physical_n);

        let frame_n2 = FrameGraphBuilder::new();
        let compiled_n2 = frame_n2.compile(&mut store).unwrap();
        assert_eq!(compiled_n2.released_physical, vec![physical_n]);
    }
}
