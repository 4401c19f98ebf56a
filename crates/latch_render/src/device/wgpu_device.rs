//! wgpu_device.rs - thin [`Device`]/[`Queue`] wrapper over a real wgpu adapter
//!
//! Keeps the engine's device abstraction genuinely backed by wgpu rather
//! than only ever exercised through [`super::NullDevice`]. Command
//! buffers recorded through a [`WgpuCommandRecorder`] are staged into a
//! side table keyed by command-pool slot and handed to
//! [`wgpu::Queue::submit`] at submit time; the timeline fence is this
//! wrapper's own monotonic counter, backed by `wgpu::Device::poll` for
//! waiting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;

use super::{Device, DeviceLimits, Queue, ResourceFence, TimelineFence};
use crate::command::{CommandBufferHandle, CommandPoolRegistry};
use crate::command::CommandRecorder;
use crate::error::DeviceError;

type StagedBuffers = DashMap<u32, wgpu::CommandBuffer>;

/// Records into a real `wgpu::CommandEncoder`. [`crate::command::CommandRecorder`]
/// only exposes the frame graph's narrow recording surface; pass
/// closures that need the full wgpu render-pass API reach for
/// `encoder()` directly.
pub struct WgpuCommandRecorder {
    slot: u32,
    encoder: Option<wgpu::CommandEncoder>,
    staged: Arc<StagedBuffers>,
}

impl WgpuCommandRecorder {
    fn new(slot: u32, device: &wgpu::Device, staged: Arc<StagedBuffers>) -> Self {
        let encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("latch_render command buffer"),
        });
        Self { slot, encoder: Some(encoder), staged }
    }

    pub fn encoder(&mut self) -> &mut wgpu::CommandEncoder {
        self.encoder.as_mut().expect("recorder already finished")
    }

    /// Finishes recording and stages the buffer for the next submit of
    /// its owning slot. Idempotent.
    pub fn finish(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.staged.insert(self.slot, encoder.finish());
        }
    }
}

impl CommandRecorder for WgpuCommandRecorder {
    fn barrier(&mut self, resource: &str, src_stages: wgpu::ShaderStages, dst_stages: wgpu::ShaderStages) {
        // wgpu infers synchronization from pass/resource usage; this only
        // traces the frame graph's intent for debugging real submissions.
        tracing::trace!(resource, ?src_stages, ?dst_stages, "barrier (wgpu-inferred)");
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

impl Drop for WgpuCommandRecorder {
    fn drop(&mut self) {
        self.finish();
    }
}

pub struct WgpuQueue {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    staged: Arc<StagedBuffers>,
    timeline: AtomicU64,
    last_submission: Mutex<Option<wgpu::SubmissionIndex>>,
}

impl Queue for WgpuQueue {
    fn submit(&self, cmd: CommandBufferHandle) -> Result<TimelineFence, DeviceError> {
        let Some((_, buffer)) = self.staged.remove(&cmd.slot) else {
            return Err(DeviceError::DriverError(format!(
                "no recorded command buffer staged for pool slot {}",
                cmd.slot
            )));
        };
        let index = self.queue.submit(std::iter::once(buffer));
        *self.last_submission.lock().unwrap() = Some(index);
        let value = self.timeline.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TimelineFence(value))
    }

    fn timeline_value(&self) -> u64 {
        self.timeline.load(Ordering::SeqCst)
    }

    fn wait_timeline(&self, value: u64, timeout: Duration) -> Result<(), DeviceError> {
        if value > self.timeline_value() {
            return Err(DeviceError::TimelineTimeout(timeout));
        }
        if let Some(index) = self.last_submission.lock().unwrap().clone() {
            self.device.poll(wgpu::Maintain::WaitForSubmissionIndex(index));
        }
        Ok(())
    }
}

/// Thin wrapper binding the engine's [`Device`]/[`Queue`] traits to a
/// live `wgpu::Device`/`wgpu::Queue` pair. The graphics and loader queues
/// share wgpu's single real queue handle (cloning it is cheap, it's an
/// `Arc` internally) but keep independent timelines so callers can wait
/// on uploads without stalling frame submission bookkeeping.
pub struct WgpuDevice {
    device: Arc<wgpu::Device>,
    graphics: WgpuQueue,
    loader: WgpuQueue,
    pools: CommandPoolRegistry,
    limits: DeviceLimits,
    next_fence: AtomicU64,
}

impl WgpuDevice {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, adapter_limits: wgpu::Limits) -> Self {
        let device = Arc::new(device);
        let queue = Arc::new(queue);
        let staged = Arc::new(StagedBuffers::default());
        let graphics = WgpuQueue {
            device: device.clone(),
            queue: queue.clone(),
            staged: staged.clone(),
            timeline: AtomicU64::new(0),
            last_submission: Mutex::new(None),
        };
        let loader = WgpuQueue {
            device: device.clone(),
            queue,
            staged,
            timeline: AtomicU64::new(0),
            last_submission: Mutex::new(None),
        };
        let limits = DeviceLimits {
            max_texture_size: adapter_limits.max_texture_dimension_2d,
            max_descriptor_sets: adapter_limits.max_bind_groups,
            max_bound_descriptor_sets: adapter_limits.max_bind_groups,
        };
        Self {
            device,
            graphics,
            loader,
            pools: CommandPoolRegistry::new(),
            limits,
            next_fence: AtomicU64::new(0),
        }
    }

    /// Begins recording into a fresh `wgpu::CommandEncoder` for `slot`'s
    /// eventual submission.
    pub fn begin_recording(&self, slot: u32) -> WgpuCommandRecorder {
        WgpuCommandRecorder::new(slot, &self.device, self.graphics.staged.clone())
    }

    pub fn raw(&self) -> &wgpu::Device {
        &self.device
    }
}

impl Device for WgpuDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn supports_ray_tracing(&self) -> bool {
        false
    }

    fn create_fence(&self) -> ResourceFence {
        ResourceFence(self.next_fence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn graphics_queue(&self) -> &dyn Queue {
        &self.graphics
    }

    fn loader_queue(&self) -> &dyn Queue {
        &self.loader
    }

    fn command_pools(&self) -> &CommandPoolRegistry {
        &self.pools
    }
}
