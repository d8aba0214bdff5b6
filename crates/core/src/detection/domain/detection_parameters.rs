use crate::shared::constants::{
    DEFAULT_MAX_SIZE, DEFAULT_MIN_SIZE, DEFAULT_SCALING_FACTOR, DEFAULT_STEP_FACTOR,
};
use crate::shared::error::DetectionError;
use crate::shared::region::WindowSize;

/// Order in which pyramid levels are scanned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanMode {
    SmallerToLarger,
    LargerToSmaller,
}

/// How the weight coefficient of each level is chosen.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WeightCalibration {
    /// `1 / (window width * window height)`: responses become mean
    /// intensity differences, comparable against `threshold * std_dev`.
    InverseWindowArea,
    /// The same externally supplied coefficient at every level.
    Fixed(f64),
}

impl WeightCalibration {
    pub fn scale_weight(&self, window: WindowSize) -> f64 {
        match self {
            WeightCalibration::InverseWindowArea => 1.0 / window.area(),
            WeightCalibration::Fixed(w) => *w,
        }
    }
}

/// Parameters of one `process_frame` call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionParameters {
    pub scaling_factor: f64,
    pub min_size: WindowSize,
    pub max_size: WindowSize,
    pub scan_mode: ScanMode,
    pub weight_calibration: WeightCalibration,
    /// Window step in pixels at the canonical scale.
    pub step_factor: f64,
}

impl Default for DetectionParameters {
    fn default() -> Self {
        Self {
            scaling_factor: DEFAULT_SCALING_FACTOR,
            min_size: WindowSize::square(DEFAULT_MIN_SIZE),
            max_size: WindowSize::square(DEFAULT_MAX_SIZE),
            scan_mode: ScanMode::LargerToSmaller,
            weight_calibration: WeightCalibration::InverseWindowArea,
            step_factor: DEFAULT_STEP_FACTOR,
        }
    }
}

impl DetectionParameters {
    pub fn validate(&self) -> Result<(), DetectionError> {
        if !self.scaling_factor.is_finite() || self.scaling_factor <= 1.0 {
            return Err(DetectionError::InvalidParameter(format!(
                "scaling factor must be > 1.0, got {}",
                self.scaling_factor
            )));
        }
        for (name, size) in [("min", self.min_size), ("max", self.max_size)] {
            if size.width == 0 || size.height == 0 {
                return Err(DetectionError::InvalidParameter(format!(
                    "{name} size {}x{} has a zero dimension",
                    size.width, size.height
                )));
            }
        }
        if !self.min_size.fits_within(&self.max_size) {
            return Err(DetectionError::InvalidParameter(format!(
                "min size {}x{} exceeds max size {}x{}",
                self.min_size.width,
                self.min_size.height,
                self.max_size.width,
                self.max_size.height
            )));
        }
        if !self.step_factor.is_finite() || self.step_factor <= 0.0 {
            return Err(DetectionError::InvalidParameter(format!(
                "step factor must be > 0, got {}",
                self.step_factor
            )));
        }
        if let WeightCalibration::Fixed(w) = self.weight_calibration {
            if !w.is_finite() {
                return Err(DetectionError::InvalidParameter(format!(
                    "fixed weight scale must be finite, got {w}"
                )));
            }
        }
        Ok(())
    }
}
