use std::sync::Arc;

use ivy_indirect::{wgpu, GpuContext};

/// A device without a window surface, for tests.
pub struct HeadlessGpu {
    pub adapter: wgpu::Adapter,
    pub context: GpuContext,
}

impl HeadlessGpu {
    pub fn device(&self) -> &wgpu::Device {
        &self.context.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.context.queue
    }
}

/// Requests a headless device with `features` and the adapter's own limits.
///
/// Returns `None` when no adapter exists or the adapter lacks `features`, so GPU tests can
/// return early on machines without a suitable backend.
pub async fn try_headless_gpu(features: wgpu::Features) -> Option<HeadlessGpu> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .ok()?;

    if !adapter.features().contains(features) {
        return None;
    }

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("ivy_test_device"),
            required_features: features,
            required_limits: adapter.limits(),
            memory_hints: Default::default(),
            trace: Default::default(),
        })
        .await
        .ok()?;

    let context = GpuContext::from_adapter(&adapter, Arc::new(device), Arc::new(queue));
    Some(HeadlessGpu { adapter, context })
}
