//! device/mod.rs - C13: thin device & queue abstraction
//!
//! The core never binds to a concrete graphics API directly (per the
//! project's stated non-goal); it only requires something implementing
//! [`Device`]/[`Queue`] with timeline-semaphore semantics. [`NullDevice`]
//! is the reference implementation used by tests and headless tools — it
//! "completes" submissions immediately, which is enough to exercise the
//! frame graph and command-lifetime machinery without a driver.

mod null;
mod wgpu_device;

pub use null::{NullDevice, NullQueue};
pub use wgpu_device::WgpuDevice;

use std::time::Duration;

use crate::command::{CommandBufferHandle, CommandPoolRegistry};
use crate::error::DeviceError;

/// Default wait before a timeline stall is treated as fatal (spec: 10s).
pub const DEFAULT_TIMELINE_TIMEOUT: Duration = Duration::from_secs(10);

/// A resource-side monotonic counter, distinct from the device's timeline,
/// used to stamp deferred destructions before a resource is first bound
/// into a command buffer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceFence(pub u64);

/// A value tied to a device's monotonic timeline semaphore. "Ready" means
/// the device has signaled a value >= this one.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimelineFence(pub u64);

#[derive(Copy, Clone, Debug, Default)]
pub struct DeviceLimits {
    pub max_texture_size: u32,
    pub max_descriptor_sets: u32,
    pub max_bound_descriptor_sets: u32,
}

/// A logical GPU device: queue access, fence minting, and the per-thread
/// command pool registry every thread pulls its scratch pool from.
pub trait Device: Send + Sync {
    fn limits(&self) -> DeviceLimits;

    /// Ray tracing is optional; callers that want it must check this and
    /// fall back to a non-RT code path if absent.
    fn supports_ray_tracing(&self) -> bool;

    fn create_fence(&self) -> ResourceFence;

    fn graphics_queue(&self) -> &dyn Queue;

    /// A dedicated queue for asynchronous uploads, separate from the
    /// graphics queue so large transfers don't stall frame submission.
    fn loader_queue(&self) -> &dyn Queue;

    /// Per-(thread, queue family) command pools. Never share a pool
    /// obtained through this registry across threads.
    fn command_pools(&self) -> &CommandPoolRegistry;
}

/// One command queue with a monotonic timeline semaphore.
pub trait Queue: Send + Sync {
    /// Submits `cmd`, assigning it the queue's next timeline value.
    /// Submission is serialized internally; callers may call this from any
    /// thread.
    fn submit(&self, cmd: CommandBufferHandle) -> Result<TimelineFence, DeviceError>;

    /// The highest timeline value the device has signaled so far.
    fn timeline_value(&self) -> u64;

    /// Blocks until the timeline reaches `value` or `timeout` elapses.
    fn wait_timeline(&self, value: u64, timeout: Duration) -> Result<(), DeviceError>;
}
