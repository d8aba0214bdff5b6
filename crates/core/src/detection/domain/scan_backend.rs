use crate::cascade::domain::cascade_model::CascadeModel;
use crate::shared::error::DetectionError;
use crate::shared::frame::Frame;

use super::detection_parameters::DetectionParameters;
use super::result_set::ResultSet;

/// Domain interface for running a cascade over every window of a frame.
///
/// Implementations scan the levels of a
/// [`ScanPlan`](super::scan_plan::ScanPlan) and return accepted windows in
/// level order, row-major within a level. Two implementations may disagree
/// on borderline windows when their arithmetic differs; each must be
/// reproducible on its own.
pub trait ScanBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn scan(
        &self,
        frame: &Frame,
        cascade: &CascadeModel,
        params: &DetectionParameters,
    ) -> Result<ResultSet, DetectionError>;
}
