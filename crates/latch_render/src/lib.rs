//! Latch Render System
//!
//! A retained frame-graph renderer: declare the passes and virtual
//! resources a frame needs, let [`framegraph`] compile them into a
//! barrier-correct, aliased recording schedule, and hand that schedule
//! to a [`device`] backed by a real wgpu adapter or by the headless
//! [`device::NullDevice`]. Command buffer allocation and deferred
//! resource destruction live in [`command`]; [`backend`] and [`window`]
//! are the surrounding windowing/capability glue `latch_runtime` drives.

pub mod backend;
pub mod command;
pub mod device;
pub mod error;
pub mod framegraph;
pub mod window;

pub use wgpu;
pub use winit;

/// Rendering backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// Metal (macOS, iOS)
    Metal,
    /// DirectX 11 (Windows)
    DirectX11,
    /// DirectX 12 (Windows)
    DirectX12,
    /// Vulkan (cross-platform)
    Vulkan,
    /// OpenGL (cross-platform, fallback)
    OpenGL,
    /// WebGL (web)
    WebGL,
    /// Software rasterizer (ultimate fallback)
    Software,
}

/// Capability probe result
#[derive(Debug, Clone)]
pub struct DeviceCapabilities {
    pub backend: BackendType,
    pub max_texture_size: u32,
    pub supports_compute: bool,
    pub supports_instancing: bool,
}
