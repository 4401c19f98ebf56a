//! Command-pool-per-thread model and the resource-fence-ordered lifetime
//! manager (C12).

mod lifetime;
mod pool;

pub use lifetime::{DestroyableResource, LifetimeManager};
pub use pool::{CommandBuffer, CommandBufferHandle, CommandPool, CommandPoolRegistry};

use wgpu::ShaderStages;

/// Raw recording surface a compiled frame graph plays pass closures
/// against. Kept deliberately thin — binding concrete pipeline/resource
/// objects is a backend concern, not something the frame graph dictates.
pub trait CommandRecorder: Send {
    fn barrier(&mut self, resource: &str, src_stages: ShaderStages, dst_stages: ShaderStages);
    fn bind_descriptor_set(&mut self, index: u32);
    fn draw(&mut self, vertex_count: u32, instance_count: u32);
    fn dispatch(&mut self, x: u32, y: u32, z: u32);
}

/// A `CommandRecorder` that only logs what it was asked to do. Used by
/// [`crate::device::NullDevice`] and by tests that exercise the frame
/// graph without a real backend.
#[derive(Default)]
pub struct TracingRecorder;

impl CommandRecorder for TracingRecorder {
    fn barrier(&mut self, resource: &str, src_stages: ShaderStages, dst_stages: ShaderStages) {
        tracing::trace!(resource, ?src_stages, ?dst_stages, "barrier");
    }

    fn bind_descriptor_set(&mut self, index: u32) {
        tracing::trace!(index, "bind_descriptor_set");
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32) {
        tracing::trace!(vertex_count, instance_count, "draw");
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        tracing::trace!(x, y, z, "dispatch");
    }
}
