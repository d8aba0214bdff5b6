use std::sync::Arc;
use std::time::Instant;

use crate::acceleration::domain::program_cache::ProgramCache;
use crate::acceleration::infrastructure::gpu_program::GpuProgram;
use crate::cascade::domain::cascade_model::CascadeModel;
use crate::detection::domain::detection_parameters::DetectionParameters;
use crate::detection::domain::result_set::ResultSet;
use crate::detection::domain::scan_backend::ScanBackend;
use crate::detection::infrastructure::backend_factory::{create_backend, BackendKind, ExecutionBackend};
use crate::shared::constants::DEFAULT_WORKERS;
use crate::shared::error::DetectionError;
use crate::shared::frame::Frame;

use super::session_logger::{NullSessionLogger, SessionLogger};

/// How a session scans. Fixed for the session's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub backend: BackendKind,
    pub use_binary_cache: bool,
    /// Host threads for the sequential backend.
    pub workers: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Sequential,
            use_binary_cache: true,
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Runs `process_frame` calls against one backend.
pub struct DetectionSession {
    backend: ExecutionBackend,
    logger: Box<dyn SessionLogger>,
}

impl DetectionSession {
    /// Build the configured backend. `cache` is the process-wide program
    /// cache; it is only consulted by the accelerator with the binary cache
    /// enabled.
    pub fn new(
        config: SessionConfig,
        cache: &Arc<ProgramCache<GpuProgram>>,
    ) -> Result<Self, DetectionError> {
        let backend = create_backend(
            config.backend,
            config.workers,
            config.use_binary_cache,
            cache,
        )?;
        Ok(Self::with_backend(backend))
    }

    pub fn with_backend(backend: ExecutionBackend) -> Self {
        Self {
            backend,
            logger: Box::new(NullSessionLogger),
        }
    }

    pub fn with_logger(mut self, mut logger: Box<dyn SessionLogger>) -> Self {
        logger.info(&format!("Scanning with the {} backend", self.backend.name()));
        self.logger = logger;
        self
    }

    pub fn backend(&self) -> &ExecutionBackend {
        &self.backend
    }

    /// Scan every pyramid level of `frame` and return the accepted windows,
    /// ungrouped, in scan order.
    pub fn process_frame(
        &mut self,
        frame: &Frame,
        cascade: &CascadeModel,
        params: &DetectionParameters,
    ) -> Result<ResultSet, DetectionError> {
        params.validate()?;

        let start = Instant::now();
        let result = self.backend.scan(frame, cascade, params)?;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        self.logger.timing(self.backend.name(), elapsed_ms);
        self.logger.metric("detections", result.len() as f64);
        self.logger.frame_done(frame.index(), result.len());
        Ok(result)
    }

    /// Emit the logger's summary.
    pub fn finish(&self) {
        self.logger.summary();
    }
}
