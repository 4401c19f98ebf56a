//! Retained frame-graph renderer: declare GPU passes as a DAG of virtual
//! resources (C9/C10), compile them into a barrier-correct, aliased
//! recording schedule (C11), and hand the result to the device layer.

mod compiler;
mod pass;
mod resource;

pub use compiler::{CompiledGraph, PersistentStore};
pub use pass::{Access, Edge, PassBuilder};
pub use resource::{
    BufferDesc, BufferId, Extent, ImageDesc, ImageFormat, ImageId, PersistentId, ResourceDesc, ResourceId, UsageFlags,
};

use resource::ResourceRecord;

use crate::command::CommandRecorder;

pub(crate) struct PassRecord {
    pub name: String,
    pub edges: Vec<Edge>,
    pub execute: Option<Box<dyn FnMut(&mut dyn CommandRecorder) + Send>>,
}

/// Accumulates passes and resources for one frame. Consumed by
/// [`FrameGraphBuilder::compile`], which is the only way to turn a
/// declared graph into something submittable.
#[derive(Default)]
pub struct FrameGraphBuilder {
    passes: Vec<PassRecord>,
    images: Vec<ResourceRecord>,
    buffers: Vec<ResourceRecord>,
    mapped_buffers: Vec<BufferId>,
}

impl FrameGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a pass and runs `build` against a [`PassBuilder`] scoped to
    /// it, recording whatever resource declarations the closure makes.
    pub fn add_pass(&mut self, name: impl Into<String>, build: impl FnOnce(&mut PassBuilder)) -> usize {
        let index = self.passes.len();
        self.passes.push(PassRecord {
            name: name.into(),
            edges: Vec::new(),
            execute: None,
        });
        let mut builder = PassBuilder::new(self, index);
        build(&mut builder);
        index
    }

    /// Attaches the recording closure invoked at [`CompiledGraph::record`]
    /// time for pass `index`.
    pub fn set_executor(&mut self, index: usize, execute: impl FnMut(&mut dyn CommandRecorder) + Send + 'static) {
        self.passes[index].execute = Some(Box::new(execute));
    }

    pub(crate) fn pass_mut(&mut self, index: usize) -> &mut PassRecord {
        &mut self.passes[index]
    }

    pub fn declare_image(&mut self, desc: ImageDesc) -> ImageId {
        self.images.push(ResourceRecord::new(ResourceDesc::Image(desc)));
        ImageId((self.images.len() - 1) as u32)
    }

    pub fn declare_buffer(&mut self, desc: BufferDesc) -> BufferId {
        self.buffers.push(ResourceRecord::new(ResourceDesc::Buffer(desc)));
        BufferId((self.buffers.len() - 1) as u32)
    }

    /// Declares a persistent resource: the compiler resolves it to the
    /// prior frame's physical backing for `persistent_id` if one exists.
    pub fn declare_persistent_image(&mut self, desc: ImageDesc, persistent_id: PersistentId) -> ImageId {
        let id = self.declare_image(desc);
        self.images[id.0 as usize].persistent = Some(persistent_id);
        id
    }

    pub(crate) fn declare_copy_of(&mut self, src: ResourceId) -> ResourceId {
        match src {
            ResourceId::Image(id) => {
                let desc = match self.images[id.0 as usize].desc {
                    ResourceDesc::Image(desc) => desc,
                    ResourceDesc::Buffer(_) => unreachable!("ImageId always indexes an image record"),
                };
                let mut record = ResourceRecord::new(ResourceDesc::Image(desc));
                record.copy_source = Some(src);
                self.images.push(record);
                ResourceId::Image(ImageId((self.images.len() - 1) as u32))
            }
            ResourceId::Buffer(id) => {
                let desc = match self.buffers[id.0 as usize].desc {
                    ResourceDesc::Buffer(desc) => desc,
                    ResourceDesc::Image(_) => unreachable!("BufferId always indexes a buffer record"),
                };
                let mut record = ResourceRecord::new(ResourceDesc::Buffer(desc));
                record.copy_source = Some(src);
                self.buffers.push(record);
                ResourceId::Buffer(BufferId((self.buffers.len() - 1) as u32))
            }
        }
    }

    pub(crate) fn touch_resource(&mut self, resource: ResourceId, pass: usize, usage: UsageFlags) {
        let record = self.resource_record_mut(resource);
        record.touch(pass);
        record.usage |= usage;
    }

    pub(crate) fn mark_mapped(&mut self, buffer: BufferId) {
        self.mapped_buffers.push(buffer);
    }

    fn resource_record_mut(&mut self, resource: ResourceId) -> &mut ResourceRecord {
        match resource {
            ResourceId::Image(id) => &mut self.images[id.0 as usize],
            ResourceId::Buffer(id) => &mut self.buffers[id.0 as usize],
        }
    }

    pub fn resource_usage(&self, resource: ResourceId) -> UsageFlags {
        match resource {
            ResourceId::Image(id) => self.images[id.0 as usize].usage,
            ResourceId::Buffer(id) => self.buffers[id.0 as usize].usage,
        }
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Runs the C11 compilation pipeline: topological sort, lifetime
    /// computation, aliasing, barrier insertion, and persistent hand-off.
    /// See [`compiler::compile`] for the step-by-step breakdown.
    pub fn compile(self, persistent_store: &mut PersistentStore) -> Result<CompiledGraph, crate::error::GraphError> {
        compiler::compile(self, persistent_store)
    }
}
