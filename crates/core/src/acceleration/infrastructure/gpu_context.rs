use std::sync::Arc;

use crate::acceleration::domain::program_cache::DeviceFingerprint;
use crate::shared::error::DetectionError;

/// A wgpu device and queue shared by every accelerator scan.
///
/// Programs are not held here; they come from the program cache keyed by
/// this context's fingerprint.
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Create a context on the first high-performance adapter. Returns `None`
    /// if no suitable adapter is available.
    pub fn new() -> Option<Self> {
        let instance = wgpu::Instance::default();
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))?;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("haarscan-device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .ok()?;

        let info = adapter.get_info();
        log::debug!(
            "Opened {} ({:?}, driver {})",
            info.name,
            info.backend,
            info.driver
        );

        Some(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            info,
        })
    }

    pub fn info(&self) -> &wgpu::AdapterInfo {
        &self.info
    }

    /// Adapter name, PCI ids, graphics API and driver. Any change in these
    /// produces a new program cache key.
    pub fn fingerprint(&self) -> DeviceFingerprint {
        DeviceFingerprint::new(format!(
            "{}|{:04x}:{:04x}|{:?}|{} {}",
            self.info.name,
            self.info.vendor,
            self.info.device,
            self.info.backend,
            self.info.driver,
            self.info.driver_info
        ))
    }

    /// Fail with `TransferFailure` instead of tripping a device validation
    /// error when a buffer would exceed the storage binding limit.
    pub fn check_storage_size(&self, label: &str, bytes: u64) -> Result<(), DetectionError> {
        let limit = self.device.limits().max_storage_buffer_binding_size as u64;
        if bytes > limit {
            return Err(DetectionError::TransferFailure(format!(
                "{label} needs {bytes} bytes, device limit is {limit}"
            )));
        }
        Ok(())
    }
}
