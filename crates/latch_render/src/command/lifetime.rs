//! lifetime.rs - C12: deferred resource destruction
//!
//! GPU resources can't be freed the moment their last reference drops;
//! the driver may still be replaying commands that touch them. Callers
//! hand resources to [`LifetimeManager::destroy_later`] stamped with the
//! [`ResourceFence`] value reached by the last command buffer that used
//! them. [`LifetimeManager::poll`] (or the background collector thread
//! started by [`LifetimeManager::spawn_collector`]) reclaims them once
//! the device's timeline has passed that point.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::device::{Queue, ResourceFence, TimelineFence};

/// A GPU-side object whose destruction must wait on a fence. The variant
/// tags what kind of driver call ultimately frees it; the frame graph
/// and device layer only need to know this much to route it here.
pub enum DestroyableResource {
    Image { physical: u32 },
    Buffer { physical: u32 },
    CommandBuffer { slot: u32 },
}

struct PendingDestroy {
    resource: DestroyableResource,
    ready_at: ResourceFence,
}

/// Queues resources for destruction once a submitted timeline value
/// proves the commands referencing them have retired. One manager is
/// typically shared per device, behind an `Arc`.
#[derive(Default)]
pub struct LifetimeManager {
    pending: Mutex<Vec<PendingDestroy>>,
}

impl LifetimeManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn destroy_later(&self, resource: DestroyableResource, ready_at: ResourceFence) {
        self.pending.lock().unwrap().push(PendingDestroy { resource, ready_at });
    }

    /// Reclaims every pending resource whose `ready_at` is at or below
    /// `current_fence`, returning them so the caller can issue the real
    /// driver-level free calls.
    pub fn poll(&self, current_fence: ResourceFence) -> Vec<DestroyableResource> {
        let mut pending = self.pending.lock().unwrap();
        let (done, still_pending): (Vec<_>, Vec<_>) =
            std::mem::take(&mut *pending).into_iter().partition(|entry| entry.ready_at <= current_fence);
        *pending = still_pending;
        done.into_iter().map(|entry| entry.resource).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Blocks the calling thread until every command buffer submitted to
    /// `queue` so far has retired, per spec's "flush on shutdown"
    /// requirement. Not for per-frame use.
    pub fn wait_cmd_buffers(queue: &dyn Queue, timeout: Duration) -> Result<(), crate::error::DeviceError> {
        let target = TimelineFence(queue.timeline_value());
        queue.wait_timeline(target.0, timeout)
    }

    /// Starts a background thread that calls `poll_fn` every `interval`
    /// and drops whatever it returns, logging the reclaimed count. The
    /// thread exits once the returned `JoinHandle` is dropped and the
    /// manager's `Arc` strong count reaches zero.
    pub fn spawn_collector(
        manager: Arc<LifetimeManager>,
        fence_source: impl Fn() -> ResourceFence + Send + 'static,
        interval: Duration,
    ) -> JoinHandle<()> {
        std::thread::spawn(move || loop {
            if Arc::strong_count(&manager) <= 1 {
                return;
            }
            let current = fence_source();
            let reclaimed = manager.poll(current);
            if !reclaimed.is_empty() {
                tracing::debug!(count = reclaimed.len(), "reclaimed deferred resources");
            }
            std::thread::sleep(interval);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resources_stay_pending_until_their_fence_is_reached() {
        let manager = LifetimeManager::new();
        manager.destroy_later(DestroyableResource::Buffer { physical: 3 }, ResourceFence(5));
        assert_eq!(manager.pending_count(), 1);

        let reclaimed = manager.poll(ResourceFence(4));
        assert!(reclaimed.is_empty());
        assert_eq!(manager.pending_count(), 1);

        let reclaimed = manager.poll(ResourceFence(5));
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn poll_only_reclaims_entries_whose_fence_has_passed() {
        let manager = LifetimeManager::new();
        manager.destroy_later(DestroyableResource::Image { physical: 1 }, ResourceFence(2));
        manager.destroy_later(DestroyableResource::Image { physical: 2 }, ResourceFence(10));

        let reclaimed = manager.poll(ResourceFence(5));
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(manager.pending_count(), 1);
    }
}
