use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::acceleration::domain::program_cache::{compile_program, CompiledProgram, ProgramCache};
use crate::acceleration::infrastructure::gpu_context::GpuContext;
use crate::acceleration::infrastructure::gpu_program::{GpuProgram, PROGRAM_SOURCE};
use crate::acceleration::infrastructure::staged_buffer::StagedBuffer;
use crate::cascade::domain::cascade_model::CascadeModel;
use crate::cascade::domain::feature_scaler::{FeatureScaler, ScaledCascade, MAX_RECTS_PER_FEATURE};
use crate::cascade::domain::integral_image::IntegralImage;
use crate::detection::domain::detection_parameters::DetectionParameters;
use crate::detection::domain::result_set::ResultSet;
use crate::detection::domain::scan_backend::ScanBackend;
use crate::detection::domain::scan_plan::{ScanLevel, ScanPlan};
use crate::shared::constants::SCAN_WORKGROUP_SIZE;
use crate::shared::error::DetectionError;
use crate::shared::frame::Frame;

/// Per-level uniform matching `ScanParams` in the scan shader (48 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuScanParams {
    pub plane_width: u32,
    pub plane_len: u32,
    pub cols: u32,
    pub rows: u32,
    pub step: u32,
    pub window_width: u32,
    pub window_height: u32,
    pub stage_count: u32,
    pub output_offset: u32,
    /// Frame mean the squared plane is centered on.
    pub mean_offset: f32,
    pub _pad1: u32,
    pub _pad2: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub weight: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuFeature {
    pub rects: [GpuRect; MAX_RECTS_PER_FEATURE],
    pub threshold: f32,
    pub left_value: f32,
    pub right_value: f32,
    pub rect_count: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuStage {
    pub first_feature: u32,
    pub feature_count: u32,
    pub threshold: f32,
    pub bias: f32,
}

/// Cascade scan on a wgpu device in f32.
///
/// Per frame: the integral planes are uploaded once, every level's scaled
/// cascade is uploaded and dispatched in one submission, and the accept
/// flags come back through a single blocking read-back. Results are
/// reproducible on one device but can differ from [`SequentialBackend`]
/// on windows whose response sits at a stump threshold.
///
/// The squared plane is centered on the frame mean, which keeps window
/// variances usable on large frames. The sum plane is not: past roughly
/// 2^24 / 255 pixels (about 256x256) its corner values exceed the f32
/// mantissa and feature responses pick up a few intensity units of error.
///
/// [`SequentialBackend`]: super::sequential_backend::SequentialBackend
pub struct AcceleratorBackend {
    ctx: Arc<GpuContext>,
    cache: Option<Arc<ProgramCache<GpuProgram>>>,
}

impl AcceleratorBackend {
    /// With `cache` set, kernels are built once per process and device.
    /// Without it every scan rebuilds them.
    pub fn new(ctx: Arc<GpuContext>, cache: Option<Arc<ProgramCache<GpuProgram>>>) -> Self {
        Self { ctx, cache }
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    fn program(&self) -> Result<Arc<CompiledProgram<GpuProgram>>, DetectionError> {
        let devices = std::slice::from_ref(self.ctx.as_ref());
        match &self.cache {
            Some(cache) => cache.get_or_compile(PROGRAM_SOURCE, devices),
            None => compile_program(PROGRAM_SOURCE, devices).map(Arc::new),
        }
    }

    fn dispatch_levels(
        &self,
        program: &GpuProgram,
        plan: &ScanPlan,
        scaled: &[ScaledCascade],
        integral: &IntegralImage,
        hits: &StagedBuffer,
    ) -> Result<(), DetectionError> {
        let device = &self.ctx.device;
        let planes = integral.to_f32_planes();
        self.ctx
            .check_storage_size("integral planes", (planes.len() * 4) as u64)?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let planes_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("integral-planes"),
            contents: bytemuck::cast_slice(&planes),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let layout = program.scan.get_bind_group_layout(0);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("scan-encoder"),
        });

        let mut offset = 0u32;
        for (level, cascade) in plan.levels().iter().zip(scaled) {
            let (stages, features) = pack_cascade(cascade);
            let params = scan_params(level, integral, stages.len() as u32, offset);

            let params_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("scan-params"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM,
            });
            let stages_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("scan-stages"),
                contents: bytemuck::cast_slice(&stages),
                usage: wgpu::BufferUsages::STORAGE,
            });
            let features_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("scan-features"),
                contents: bytemuck::cast_slice(&features),
                usage: wgpu::BufferUsages::STORAGE,
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("scan-bind-group"),
                layout: &layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params_buf.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: planes_buf.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: stages_buf.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: features_buf.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: hits.device_buffer().as_entire_binding(),
                    },
                ],
            });

            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("scan-level"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&program.scan);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(
                    level.cols.div_ceil(SCAN_WORKGROUP_SIZE),
                    level.rows.div_ceil(SCAN_WORKGROUP_SIZE),
                    1,
                );
            }
            offset += level.position_count() as u32;
        }
        self.ctx.queue.submit(Some(encoder.finish()));

        match pollster::block_on(device.pop_error_scope()) {
            Some(err) => Err(DetectionError::TransferFailure(err.to_string())),
            None => Ok(()),
        }
    }
}

impl ScanBackend for AcceleratorBackend {
    fn name(&self) -> &'static str {
        "accelerator"
    }

    fn scan(
        &self,
        frame: &Frame,
        cascade: &CascadeModel,
        params: &DetectionParameters,
    ) -> Result<ResultSet, DetectionError> {
        let plan = ScanPlan::build(frame, cascade, params)?;
        // every level is scaled before anything reaches the device
        let scaled = plan
            .levels()
            .iter()
            .map(|level| FeatureScaler::scale(cascade, level.window, level.scale_weight))
            .collect::<Result<Vec<_>, _>>()?;
        if plan.total_positions() == 0 {
            return Ok(ResultSet::new());
        }

        let program = self.program()?;
        let binary = program
            .for_device(&self.ctx.fingerprint())
            .ok_or_else(|| DetectionError::CompilationFailure {
                log: format!("no binary for {}", self.ctx.fingerprint()),
            })?;

        let integral = IntegralImage::from_frame(frame);
        let mut hits = StagedBuffer::new(&self.ctx, "scan-hits", plan.total_positions())?;
        self.dispatch_levels(binary, &plan, &scaled, &integral, &hits)?;
        hits.read_back(&self.ctx)?;

        log::debug!(
            "Accelerator scanned {} levels, {} windows",
            plan.levels().len(),
            plan.total_positions()
        );
        Ok(collect_hits(&plan, hits.host()))
    }
}

fn scan_params(level: &ScanLevel, integral: &IntegralImage, stage_count: u32, output_offset: u32) -> GpuScanParams {
    GpuScanParams {
        plane_width: integral.width() + 1,
        plane_len: integral.plane_len() as u32,
        cols: level.cols,
        rows: level.rows,
        step: level.step,
        window_width: level.window.width,
        window_height: level.window.height,
        stage_count,
        output_offset,
        mean_offset: integral.frame_mean() as f32,
        _pad1: 0,
        _pad2: 0,
    }
}

/// Flatten a scaled cascade into the shader's stage and feature arrays.
/// The feature array always has at least one entry so it can be bound.
pub fn pack_cascade(cascade: &ScaledCascade) -> (Vec<GpuStage>, Vec<GpuFeature>) {
    let stages = cascade
        .stages()
        .iter()
        .map(|s| GpuStage {
            first_feature: s.first_feature as u32,
            feature_count: s.feature_count as u32,
            threshold: s.threshold as f32,
            bias: s.bias as f32,
        })
        .collect();

    let mut features: Vec<GpuFeature> = cascade
        .features()
        .iter()
        .map(|f| {
            let mut rects = [GpuRect::default(); MAX_RECTS_PER_FEATURE];
            for (dst, src) in rects.iter_mut().zip(f.rects()) {
                *dst = GpuRect {
                    x: src.x,
                    y: src.y,
                    width: src.width,
                    height: src.height,
                    weight: src.weight as f32,
                };
            }
            GpuFeature {
                rects,
                threshold: f.threshold as f32,
                left_value: f.left_value as f32,
                right_value: f.right_value as f32,
                rect_count: f.rects().len() as u32,
            }
        })
        .collect();
    if features.is_empty() {
        features.push(GpuFeature::default());
    }
    (stages, features)
}

/// Turn per-position accept flags, laid out level after level and
/// row-major within a level, into regions in the same order.
pub fn collect_hits(plan: &ScanPlan, flags: &[u32]) -> ResultSet {
    let mut result = ResultSet::new();
    let mut offset = 0;
    for level in plan.levels() {
        for row in 0..level.rows {
            for col in 0..level.cols {
                let idx = offset + (row * level.cols + col) as usize;
                if flags.get(idx).copied().unwrap_or(0) != 0 {
                    result.push(level.region_at(col, row));
                }
            }
        }
        offset += level.position_count();
    }
    result
}
