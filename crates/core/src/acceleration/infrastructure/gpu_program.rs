use crate::acceleration::domain::program_cache::{DeviceFingerprint, ProgramTarget};

use super::gpu_context::GpuContext;

/// WGSL source of every accelerator kernel. The program cache keys on this
/// text, so any edit to either shader forces a rebuild.
pub const PROGRAM_SOURCE: &str = concat!(
    include_str!("shaders/cascade_scan.wgsl"),
    "\n",
    include_str!("shaders/fill_buffer.wgsl"),
);

pub const SCAN_ENTRY_POINT: &str = "scan_windows";
pub const FILL_ENTRY_POINT: &str = "fill_value";

/// Compute pipelines built from [`PROGRAM_SOURCE`] for one device.
///
/// Both use layouts derived from the shader, so bind group layouts come from
/// `get_bind_group_layout(0)` on the pipeline itself.
pub struct GpuProgram {
    pub scan: wgpu::ComputePipeline,
    pub fill: wgpu::ComputePipeline,
}

impl ProgramTarget for GpuContext {
    type Binary = GpuProgram;

    fn fingerprint(&self) -> DeviceFingerprint {
        GpuContext::fingerprint(self)
    }

    fn compile(&self, source: &str) -> Result<GpuProgram, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("haarscan-kernels"),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        let scan = self.create_pipeline(&module, SCAN_ENTRY_POINT);
        let fill = self.create_pipeline(&module, FILL_ENTRY_POINT);

        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(err.to_string()),
            None => Ok(GpuProgram { scan, fill }),
        }
    }
}

impl GpuContext {
    fn create_pipeline(&self, module: &wgpu::ShaderModule, entry_point: &str) -> wgpu::ComputePipeline {
        self.device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(entry_point),
                layout: None,
                module,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
    }
}
