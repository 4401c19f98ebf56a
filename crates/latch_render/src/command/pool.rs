//! pool.rs - C12: command-pool-per-thread allocation
//!
//! Every thread that wants to record commands owns exactly one
//! [`CommandPool`] per queue family, looked up through
//! [`CommandPoolRegistry`] by [`std::thread::ThreadId`]. Pools recycle
//! released buffers rather than freeing them, mirroring the
//! allocate-once-reuse-forever discipline real drivers reward.

use std::thread::ThreadId;

use dashmap::DashMap;

use crate::device::ResourceFence;

/// Opaque handle to a recorded, not-yet-submitted command buffer. Queues
/// consume these; callers never touch the buffer's contents directly.
#[derive(Debug)]
pub struct CommandBufferHandle {
    pub(crate) pool_thread: ThreadId,
    pub(crate) slot: u32,
}

/// One primary command buffer and whatever secondary buffers were
/// recorded into it. Tracks the [`ResourceFence`] value that must be
/// reached before any resource it referenced can be destroyed.
pub struct CommandBuffer {
    slot: u32,
    secondary: Vec<u32>,
    resource_fence: ResourceFence,
}

impl CommandBuffer {
    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn secondary_buffers(&self) -> &[u32] {
        &self.secondary
    }

    pub fn resource_fence(&self) -> ResourceFence {
        self.resource_fence
    }

    pub fn record_secondary(&mut self, slot: u32) {
        self.secondary.push(slot);
    }

    pub fn set_resource_fence(&mut self, fence: ResourceFence) {
        self.resource_fence = fence;
    }
}

/// Thread-local allocator over a flat slab of command buffer slots.
/// `released` holds slots free for reuse; `next_slot` only grows.
pub struct CommandPool {
    next_slot: u32,
    released: Vec<u32>,
    in_flight: Vec<CommandBuffer>,
}

impl Default for CommandPool {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandPool {
    pub fn new() -> Self {
        Self::with_capacity(Self::default_reserved_slots())
    }

    pub fn with_capacity(reserved_slots: usize) -> Self {
        Self {
            next_slot: 0,
            released: Vec::with_capacity(reserved_slots),
            in_flight: Vec::with_capacity(reserved_slots),
        }
    }

    /// Guesses a reasonable starting free-list capacity from the host's
    /// L2 size: a busy thread that records roughly one small command
    /// buffer per L2 line avoids a reallocation in its first few frames.
    fn default_reserved_slots() -> usize {
        let memory = latch_env::memory::Memory::detect();
        (memory.l2 / 4096).clamp(8, 256)
    }

    /// Pulls a recycled slot if one is free, otherwise grows the pool.
    pub fn alloc(&mut self) -> CommandBuffer {
        let slot = self.released.pop().unwrap_or_else(|| {
            let slot = self.next_slot;
            self.next_slot += 1;
            slot
        });
        CommandBuffer {
            slot,
            secondary: Vec::new(),
            resource_fence: ResourceFence::default(),
        }
    }

    /// Returns a submitted buffer's slot to the free list once its
    /// timeline fence has been observed signaled by the caller.
    pub fn release(&mut self, buffer: CommandBuffer) {
        self.released.push(buffer.slot);
        for slot in &buffer.secondary {
            self.released.push(*slot);
        }
    }

    pub fn track_in_flight(&mut self, buffer: CommandBuffer) {
        self.in_flight.push(buffer);
    }

    pub fn allocated_count(&self) -> u32 {
        self.next_slot
    }

    pub fn released_count(&self) -> usize {
        self.released.len()
    }
}

/// Per-(calling thread) registry of command pools, one per thread that
/// has ever recorded on this device. Never hand a pool reference across
/// a thread boundary; look it up fresh from the registry instead.
#[derive(Default)]
pub struct CommandPoolRegistry {
    pools: DashMap<ThreadId, CommandPool>,
}

impl CommandPoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a command buffer from the calling thread's pool,
    /// creating that pool on first use.
    pub fn alloc_for_current_thread(&self) -> (CommandBufferHandle, CommandBuffer) {
        let thread = std::thread::current().id();
        let mut pool = self.pools.entry(thread).or_insert_with(CommandPool::new);
        let buffer = pool.alloc();
        let handle = CommandBufferHandle {
            pool_thread: thread,
            slot: buffer.slot,
        };
        (handle, buffer)
    }

    pub fn release(&self, buffer: CommandBuffer) {
        let thread = std::thread::current().id();
        if let Some(mut pool) = self.pools.get_mut(&thread) {
            pool.release(buffer);
        }
    }

    pub fn thread_count(&self) -> usize {
        self.pools.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_slots_are_recycled_before_growing() {
        let mut pool = CommandPool::new();
        let a = pool.alloc();
        let slot_a = a.slot();
        pool.release(a);
        let b = pool.alloc();
        assert_eq!(b.slot(), slot_a);
        assert_eq!(pool.allocated_count(), 1);
    }

    #[test]
    fn registry_creates_one_pool_per_calling_thread() {
        let registry = CommandPoolRegistry::new();
        let (_, buf) = registry.alloc_for_current_thread();
        registry.release(buf);
        assert_eq!(registry.thread_count(), 1);

        let handle = std::thread::spawn(move || {
            let registry = CommandPoolRegistry::new();
            registry.alloc_for_current_thread();
            registry.thread_count()
        });
        assert_eq!(handle.join().unwrap(), 1);
    }
}
