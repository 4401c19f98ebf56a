//! Rendering backend selection
//!
//! wgpu already abstracts over Vulkan/Metal/DX12/GL; this module only
//! narrows its [`wgpu::Backend`] down to the subset latch_render
//! supports and reports the selected device's capabilities through the
//! engine's own [`Device`](crate::device::Device) trait rather than
//! wgpu's adapter info directly, so headless [`crate::device::NullDevice`]
//! callers get a capability report too.

use crate::device::Device;
use crate::{BackendType, DeviceCapabilities};

impl From<wgpu::Backend> for BackendType {
    fn from(backend: wgpu::Backend) -> Self {
        match backend {
            wgpu::Backend::Metal => BackendType::Metal,
            wgpu::Backend::Dx12 => BackendType::DirectX12,
            wgpu::Backend::Vulkan => BackendType::Vulkan,
            wgpu::Backend::Gl => BackendType::OpenGL,
            wgpu::Backend::BrowserWebGpu => BackendType::WebGL,
            wgpu::Backend::Empty => BackendType::Software,
        }
    }
}

/// Reports what a concrete device can do. `backend` identifies which
/// wgpu backend (or [`BackendType::Software`] for the null device) is
/// behind it; the rest is read straight from the device's own limits.
pub fn probe_capabilities(backend: BackendType, device: &dyn Device) -> DeviceCapabilities {
    let limits = device.limits();
    DeviceCapabilities {
        backend,
        max_texture_size: limits.max_texture_size,
        supports_compute: true,
        supports_instancing: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::NullDevice;

    #[test]
    fn null_device_reports_its_own_limits() {
        let device = NullDevice::new();
        let caps = probe_capabilities(BackendType::Software, &device);
        assert_eq!(caps.backend, BackendType::Software);
        assert_eq!(caps.max_texture_size, device.limits().max_texture_size);
    }
}
