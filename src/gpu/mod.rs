//! GPU resource management utilities.
//!
//! Provides wgpu device/surface initialization, the particle buffer pool,
//! and texture upload/render-target helpers.

/// Exact-length pooled GPU buffer allocator.
pub mod buffer_pool;
/// wgpu device, surface, and queue initialization.
pub mod render_context;
/// Source-bitmap upload and render-target texture abstraction.
pub mod texture;

#[cfg(test)]
pub(crate) mod test_support {
    //! One shared headless device for the whole test run.
    //!
    //! The pipeline cache is process-wide and bound to the first device it
    //! sees, so every GPU-dependent test must use the same device. Tests
    //! skip gracefully (return early) on machines with no usable adapter.

    use std::sync::OnceLock;

    static DEVICE: OnceLock<Option<(wgpu::Device, wgpu::Queue)>> =
        OnceLock::new();

    /// The shared headless device, or `None` when no adapter is available.
    pub(crate) fn shared_device() -> Option<&'static (wgpu::Device, wgpu::Queue)>
    {
        DEVICE
            .get_or_init(|| {
                let instance = wgpu::Instance::default();
                let adapter = pollster::block_on(instance.request_adapter(
                    &wgpu::RequestAdapterOptions::default(),
                ))
                .ok()?;
                pollster::block_on(adapter.request_device(
                    &wgpu::DeviceDescriptor {
                        label: Some("dustfx test device"),
                        required_features: wgpu::Features::empty(),
                        required_limits: wgpu::Limits::default(),
                        ..Default::default()
                    },
                ))
                .ok()
            })
            .as_ref()
    }
}
