//! pass.rs - C10: per-pass resource declarations
//!
//! A [`PassBuilder`] borrows the in-progress [`super::FrameGraphBuilder`]
//! for the duration of one pass's setup closure. Every declaration both
//! records an edge (so the compiler can order passes and insert barriers)
//! and folds into the resource's accumulated [`UsageFlags`].

use wgpu::ShaderStages;

use super::resource::{BufferDesc, BufferId, Extent, ImageDesc, ImageFormat, ImageId, ResourceId, UsageFlags};
use super::FrameGraphBuilder;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

#[derive(Clone, Debug)]
pub struct Edge {
    pub resource: ResourceId,
    pub access: Access,
    pub stage: ShaderStages,
}

pub struct PassBuilder<'a> {
    graph: &'a mut FrameGraphBuilder,
    pass_index: usize,
    next_descriptor_index: u32,
}

impl<'a> PassBuilder<'a> {
    pub(super) fn new(graph: &'a mut FrameGraphBuilder, pass_index: usize) -> Self {
        Self {
            graph,
            pass_index,
            next_descriptor_index: 0,
        }
    }

    fn record_edge(&mut self, resource: ResourceId, access: Access, stage: ShaderStages, usage: UsageFlags) {
        self.graph.touch_resource(resource, self.pass_index, usage);
        self.graph.pass_mut(self.pass_index).edges.push(Edge { resource, access, stage });
    }

    pub fn declare_image(&mut self, format: ImageFormat, extent: Extent) -> ImageId {
        self.graph.declare_image(ImageDesc { format, extent, mip_levels: 1 })
    }

    pub fn declare_buffer(&mut self, size_bytes: u64, element_size: u64) -> BufferId {
        self.graph.declare_buffer(BufferDesc {
            size_bytes,
            element_size,
            cpu_visible: false,
        })
    }

    /// Declares a new virtual resource that carries forward `src`'s
    /// format/size, writing a dependency edge from `src`. The compiler may
    /// alias the copy onto the same physical backing once `src` is no
    /// longer read, or materialize a real copy if usages conflict.
    pub fn declare_copy(&mut self, src: ResourceId) -> ResourceId {
        let copy = self.graph.declare_copy_of(src);
        self.record_edge(src, Access::Read, ShaderStages::NONE, UsageFlags::TRANSFER_SRC);
        self.record_edge(copy, Access::Write, ShaderStages::NONE, UsageFlags::TRANSFER_DST);
        copy
    }

    pub fn add_uniform_input(&mut self, resource: impl Into<ResourceId>, stage: ShaderStages) {
        self.record_edge(resource.into(), Access::Read, stage, UsageFlags::UNIFORM);
    }

    pub fn add_storage_input(&mut self, resource: impl Into<ResourceId>, stage: ShaderStages) {
        self.record_edge(resource.into(), Access::Read, stage, UsageFlags::STORAGE);
    }

    pub fn add_storage_output(&mut self, resource: impl Into<ResourceId>, stage: ShaderStages) {
        self.record_edge(resource.into(), Access::Write, stage, UsageFlags::STORAGE);
    }

    pub fn add_color_output(&mut self, image: ImageId) {
        self.record_edge(image.into(), Access::Write, ShaderStages::FRAGMENT, UsageFlags::COLOR_ATTACHMENT);
    }

    pub fn add_depth_output(&mut self, image: ImageId) {
        self.record_edge(image.into(), Access::Write, ShaderStages::FRAGMENT, UsageFlags::DEPTH_ATTACHMENT);
    }

    /// Declares an additional usage on `resource` without creating a new
    /// edge — used when a resource needs a capability (e.g. `TRANSFER_SRC`
    /// for a later screenshot) that no declared access already implies.
    pub fn add_input_usage(&mut self, resource: impl Into<ResourceId>, usage: UsageFlags) {
        self.graph.touch_resource(resource.into(), self.pass_index, usage);
    }

    /// Marks `buffer` CPU-visible and persistently mapped for the duration
    /// of this pass's recording closure.
    pub fn map_buffer(&mut self, buffer: BufferId) {
        self.graph.mark_mapped(buffer);
        self.add_input_usage(buffer, UsageFlags::TRANSFER_DST);
    }

    /// Monotonically increasing per-pass descriptor-set index. Each call
    /// reserves the next slot; callers are expected to bind the resource
    /// declared immediately before this call into it.
    pub fn next_descriptor_set(&mut self) -> u32 {
        let index = self.next_descriptor_index;
        self.next_descriptor_index += 1;
        index
    }
}

#[cfg(test)]
mod tests {
    use super::super::FrameGraphBuilder;
    use super::*;

    #[test]
    fn declaring_color_output_records_attachment_usage() {
        let mut graph = FrameGraphBuilder::new();
        graph.add_pass("main", |pass| {
            let image = pass.declare_image(ImageFormat::Rgba8, Extent::new_2d(1920, 1080));
            pass.add_color_output(image);
        });
        let usage = graph.resource_usage(ResourceId::Image(ImageId(0)));
        assert!(usage.contains(UsageFlags::COLOR_ATTACHMENT));
    }

    #[test]
    fn descriptor_indices_increment_per_pass() {
        let mut graph = FrameGraphBuilder::new();
        graph.add_pass("main", |pass| {
            let buffer = pass.declare_buffer(256, 4);
            assert_eq!(pass.next_descriptor_set(), 0);
            pass.add_uniform_input(buffer, ShaderStages::FRAGMENT);
            assert_eq!(pass.next_descriptor_set(), 1);
        });
    }
}
