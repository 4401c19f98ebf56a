//! null.rs - headless reference [`Device`]/[`Queue`] implementation
//!
//! Submissions complete the instant they're issued: the timeline counter
//! is bumped synchronously and `wait_timeline` never blocks. Exists so
//! the ECS/frame-graph machinery can be exercised in tests and
//! command-line tools with no window, adapter, or driver present.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::{Device, DeviceLimits, Queue, ResourceFence, TimelineFence};
use crate::command::{CommandBufferHandle, CommandPoolRegistry};
use crate::error::DeviceError;

pub struct NullQueue {
    timeline: AtomicU64,
}

impl Default for NullQueue {
    fn default() -> Self {
        Self { timeline: AtomicU64::new(0) }
    }
}

impl Queue for NullQueue {
    fn submit(&self, _cmd: CommandBufferHandle) -> Result<TimelineFence, DeviceError> {
        let value = self.timeline.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TimelineFence(value))
    }

    fn timeline_value(&self) -> u64 {
        self.timeline.load(Ordering::SeqCst)
    }

    fn wait_timeline(&self, value: u64, _timeout: Duration) -> Result<(), DeviceError> {
        if value <= self.timeline_value() {
            Ok(())
        } else {
            Err(DeviceError::TimelineTimeout(Duration::ZERO))
        }
    }
}

pub struct NullDevice {
    graphics: NullQueue,
    loader: NullQueue,
    pools: CommandPoolRegistry,
    next_fence: AtomicU64,
}

impl Default for NullDevice {
    fn default() -> Self {
        Self {
            graphics: NullQueue::default(),
            loader: NullQueue::default(),
            pools: CommandPoolRegistry::new(),
            next_fence: AtomicU64::new(0),
        }
    }
}

impl NullDevice {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Device for NullDevice {
    fn limits(&self) -> DeviceLimits {
        DeviceLimits {
            max_texture_size: 8192,
            max_descriptor_sets: 4,
            max_bound_descriptor_sets: 4,
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submissions_complete_immediately() {
        let device = NullDevice::new();
        let (handle, buffer) = device.command_pools().alloc_for_current_thread();
        device.command_pools().release(buffer);
        let fence = device.graphics_queue().submit(handle).unwrap();
        assert_eq!(fence, TimelineFence(1));
        device.graphics_queue().wait_timeline(1, Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn waiting_on_an_unreached_value_times_out() {
        let queue = NullQueue::default();
        let err = queue.wait_timeline(5, Duration::ZERO).unwrap_err();
        assert!(matches!(err, DeviceError::TimelineTimeout(_)));
    }
}
