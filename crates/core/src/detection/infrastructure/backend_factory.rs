use std::sync::Arc;

use crate::acceleration::domain::program_cache::ProgramCache;
use crate::acceleration::infrastructure::gpu_context::GpuContext;
use crate::acceleration::infrastructure::gpu_program::GpuProgram;
use crate::cascade::domain::cascade_model::CascadeModel;
use crate::detection::domain::detection_parameters::DetectionParameters;
use crate::detection::domain::result_set::ResultSet;
use crate::detection::domain::scan_backend::ScanBackend;
use crate::shared::error::DetectionError;
use crate::shared::frame::Frame;

use super::accelerator_backend::AcceleratorBackend;
use super::sequential_backend::SequentialBackend;

/// Backend preference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Sequential,
    Accelerator,
}

/// The backend a session scans with, fixed at construction.
pub enum ExecutionBackend {
    Sequential(SequentialBackend),
    Accelerator(AcceleratorBackend),
}

impl ExecutionBackend {
    pub fn kind(&self) -> BackendKind {
        match self {
            ExecutionBackend::Sequential(_) => BackendKind::Sequential,
            ExecutionBackend::Accelerator(_) => BackendKind::Accelerator,
        }
    }
}

impl ScanBackend for ExecutionBackend {
    fn name(&self) -> &'static str {
        match self {
            ExecutionBackend::Sequential(b) => b.name(),
            ExecutionBackend::Accelerator(b) => b.name(),
        }
    }

    fn scan(
        &self,
        frame: &Frame,
        cascade: &CascadeModel,
        params: &DetectionParameters,
    ) -> Result<ResultSet, DetectionError> {
        match self {
            ExecutionBackend::Sequential(b) => b.scan(frame, cascade, params),
            ExecutionBackend::Accelerator(b) => b.scan(frame, cascade, params),
        }
    }
}

/// Creates the requested backend. Logs which backend is selected.
///
/// Asking for the accelerator with no usable adapter fails with
/// [`DetectionError::NoDevice`]; there is no silent fallback here.
/// `use_binary_cache = false` makes the accelerator rebuild its kernels on
/// every scan instead of going through `cache`.
pub fn create_backend(
    kind: BackendKind,
    workers: usize,
    use_binary_cache: bool,
    cache: &Arc<ProgramCache<GpuProgram>>,
) -> Result<ExecutionBackend, DetectionError> {
    match kind {
        BackendKind::Sequential => {
            let backend = SequentialBackend::with_workers(workers);
            log::info!(
                "Using sequential backend ({} worker{})",
                backend.workers(),
                if backend.workers() == 1 { "" } else { "s" }
            );
            Ok(ExecutionBackend::Sequential(backend))
        }
        BackendKind::Accelerator => {
            let ctx = GpuContext::new().ok_or(DetectionError::NoDevice)?;
            log::info!(
                "Using accelerator backend on {} ({:?}), binary cache {}",
                ctx.info().name,
                ctx.info().backend,
                if use_binary_cache { "on" } else { "off" }
            );
            let cache = use_binary_cache.then(|| Arc::clone(cache));
            Ok(ExecutionBackend::Accelerator(AcceleratorBackend::new(
                Arc::new(ctx),
                cache,
            )))
        }
    }
}

/// Returns true if a GPU adapter is available for compute shaders.
pub fn accelerator_available() -> bool {
    GpuContext::new().is_some()
}
