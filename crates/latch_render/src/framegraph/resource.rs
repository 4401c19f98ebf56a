//! resource.rs - C9: frame-graph resource model
//!
//! Virtual resources are declared against a [`FrameGraphBuilder`] and exist
//! only for the frame they're declared in, unless tagged with a
//! [`PersistentId`] — in which case the compiler hands the previous frame's
//! physical backing back as a read-only input (see `compiler.rs`).

use std::sync::atomic::{AtomicU32, Ordering};

bitflags::bitflags! {
    /// Accumulated usage for a resource across every pass that touches it.
    /// The compiler consults this when allocating and when choosing a
    /// layout transition; it is never reset mid-frame.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct UsageFlags: u32 {
        const SAMPLED          = 1 << 0;
        const STORAGE          = 1 << 1;
        const COLOR_ATTACHMENT = 1 << 2;
        const DEPTH_ATTACHMENT = 1 << 3;
        const TRANSFER_SRC     = 1 << 4;
        const TRANSFER_DST     = 1 << 5;
        const UNIFORM          = 1 << 6;
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ImageFormat {
    R8,
    Rgba8,
    Rgba16Float,
    Depth32Float,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl Extent {
    pub fn new_2d(width: u32, height: u32) -> Self {
        Self { width, height, depth: 1 }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ImageDesc {
    pub format: ImageFormat,
    pub extent: Extent,
    pub mip_levels: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BufferDesc {
    pub size_bytes: u64,
    pub element_size: u64,
    pub cpu_visible: bool,
}

/// A process-global token binding a frame-graph resource to its physical
/// backing from the prior frame. Stable across frames by construction —
/// callers mint one once (e.g. a `static` counter) and reuse it every frame
/// they want continuity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PersistentId(pub u32);

static NEXT_PERSISTENT_ID: AtomicU32 = AtomicU32::new(0);

impl PersistentId {
    pub fn new() -> Self {
        Self(NEXT_PERSISTENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for PersistentId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageId(pub(crate) u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(pub(crate) u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ResourceId {
    Image(ImageId),
    Buffer(BufferId),
}

impl From<ImageId> for ResourceId {
    fn from(id: ImageId) -> Self {
        ResourceId::Image(id)
    }
}

impl From<BufferId> for ResourceId {
    fn from(id: BufferId) -> Self {
        ResourceId::Buffer(id)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResourceDesc {
    Image(ImageDesc),
    Buffer(BufferDesc),
}

impl ResourceDesc {
    /// Two descriptors are alias-compatible if they describe backing of
    /// the same byte footprint and kind. The bucket algorithm in
    /// `compiler.rs` only ever compares resources it already knows are the
    /// same `ResourceKind`, so format/layout mismatches for images of equal
    /// size are the only case actually discriminated here.
    pub fn alias_compatible_with(&self, other: &ResourceDesc) -> bool {
        match (self, other) {
            (ResourceDesc::Image(a), ResourceDesc::Image(b)) => a.format == b.format && a.extent == b.extent && a.mip_levels == b.mip_levels,
            (ResourceDesc::Buffer(a), ResourceDesc::Buffer(b)) => a.size_bytes == b.size_bytes,
            _ => false,
        }
    }
}

/// A resource's declared description, accumulated usage, and (at compile
/// time) computed lifetime.
pub struct ResourceRecord {
    pub desc: ResourceDesc,
    pub usage: UsageFlags,
    pub persistent: Option<PersistentId>,
    pub copy_source: Option<ResourceId>,
    pub first_pass: Option<usize>,
    pub last_pass: Option<usize>,
}

impl ResourceRecord {
    pub fn new(desc: ResourceDesc) -> Self {
        Self {
            desc,
            usage: UsageFlags::empty(),
            persistent: None,
            copy_source: None,
            first_pass: None,
            last_pass: None,
        }
    }

    pub fn touch(&mut self, pass: usize) {
        self.first_pass = Some(self.first_pass.map_or(pass, |p| p.min(pass)));
        self.last_pass = Some(self.last_pass.map_or(pass, |p| p.max(pass)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistent_ids_are_distinct() {
        assert_ne!(PersistentId::new(), PersistentId::new());
    }

    #[test]
    fn alias_compatible_requires_matching_image_desc() {
        let a = ResourceDesc::Image(ImageDesc {
            format: ImageFormat::R8,
            extent: Extent::new_2d(64, 64),
            mip_levels: 1,
        });
        let b = ResourceDesc::Image(ImageDesc {
            format: ImageFormat::R8,
            extent: Extent::new_2d(64, 64),
            mip_levels: 1,
        });
        let c = ResourceDesc::Image(ImageDesc {
            format: ImageFormat::Rgba8,
            extent: Extent::new_2d(64, 64),
            mip_levels: 1,
        });
        assert!(a.alias_compatible_with(&b));
        assert!(!a.alias_compatible_with(&c));
    }

    #[test]
    fn touch_widens_lifetime_bounds() {
        let mut r = ResourceRecord::new(ResourceDesc::Buffer(BufferDesc {
            size_bytes: 256,
            element_size: 4,
            cpu_visible: false,
        }));
        r.touch(3);
        r.touch(1);
        r.touch(5);
        assert_eq!((r.first_pass, r.last_pass), (Some(1), Some(5)));
    }
}
