use crate::shared::error::DetectionError;
use crate::shared::region::WindowSize;

use super::detection_parameters::{DetectionParameters, ScanMode};

/// Relative slack when comparing a level against the far bound, so a bound
/// reached exactly in real arithmetic is not lost to rounding.
const BOUND_TOLERANCE: f64 = 1e-9;

/// Lazy, finite sequence of window sizes between two bounds.
///
/// Level `k` is `start * factor^k` (ascending) or `start / factor^k`
/// (descending), floored to whole pixels. Each level is computed from the
/// start bound directly, so there is no accumulated drift. Runs of `k` that
/// floor to an already emitted size are skipped in one jump, so factors
/// barely above 1.0 still finish in one step per distinct size.
#[derive(Clone, Debug)]
pub struct ScalePyramid {
    start: WindowSize,
    bound: WindowSize,
    factor: f64,
    mode: ScanMode,
    level: u64,
    last: Option<WindowSize>,
    done: bool,
}

impl ScalePyramid {
    pub fn new(
        min_size: WindowSize,
        max_size: WindowSize,
        scaling_factor: f64,
        mode: ScanMode,
    ) -> Result<Self, DetectionError> {
        if !scaling_factor.is_finite() || scaling_factor <= 1.0 {
            return Err(DetectionError::InvalidParameter(format!(
                "scaling factor must be > 1.0, got {scaling_factor}"
            )));
        }
        if min_size.width == 0 || min_size.height == 0 {
            return Err(DetectionError::InvalidParameter(
                "min size has a zero dimension".into(),
            ));
        }
        if !min_size.fits_within(&max_size) {
            return Err(DetectionError::InvalidParameter(format!(
                "min size {}x{} exceeds max size {}x{}",
                min_size.width, min_size.height, max_size.width, max_size.height
            )));
        }
        let (start, bound) = match mode {
            ScanMode::SmallerToLarger => (min_size, max_size),
            ScanMode::LargerToSmaller => (max_size, min_size),
        };
        Ok(Self {
            start,
            bound,
            factor: scaling_factor,
            mode,
            level: 0,
            last: None,
            done: false,
        })
    }

    pub fn from_parameters(params: &DetectionParameters) -> Result<Self, DetectionError> {
        Self::new(
            params.min_size,
            params.max_size,
            params.scaling_factor,
            params.scan_mode,
        )
    }

    fn within_bound(&self, value: f64, bound: u32) -> bool {
        let bound = bound as f64;
        let slack = bound * BOUND_TOLERANCE;
        match self.mode {
            ScanMode::SmallerToLarger => value <= bound + slack,
            ScanMode::LargerToSmaller => value >= bound - slack,
        }
    }

    /// A level no later than the first one whose floored size differs from
    /// `size` on some axis. May undershoot by a level or two; the duplicate
    /// check in `next` absorbs that.
    fn next_distinct_level(&self, size: WindowSize) -> u64 {
        let ln_factor = self.factor.ln();
        let axis = |from: u32, current: u32| -> f64 {
            let from = from as f64 * (1.0 + BOUND_TOLERANCE);
            let levels = match self.mode {
                ScanMode::SmallerToLarger => ((current as f64 + 1.0) / from).ln() / ln_factor,
                ScanMode::LargerToSmaller => (from / current as f64).ln() / ln_factor,
            };
            (levels.floor() - 1.0).max(0.0)
        };
        let levels = axis(self.start.width, size.width).min(axis(self.start.height, size.height));
        // saturating float-to-int cast
        levels as u64
    }
}

impl Iterator for ScalePyramid {
    type Item = WindowSize;

    fn next(&mut self) -> Option<WindowSize> {
        while !self.done {
            let exponent = self.level as f64;
            let multiplier = match self.mode {
                ScanMode::SmallerToLarger => self.factor.powf(exponent),
                ScanMode::LargerToSmaller => self.factor.powf(-exponent),
            };
            self.level = self.level.saturating_add(1);

            let w = self.start.width as f64 * multiplier;
            let h = self.start.height as f64 * multiplier;
            if !self.within_bound(w, self.bound.width) || !self.within_bound(h, self.bound.height)
            {
                self.done = true;
                break;
            }

            let size = WindowSize::new(
                (w * (1.0 + BOUND_TOLERANCE)).floor() as u32,
                (h * (1.0 + BOUND_TOLERANCE)).floor() as u32,
            );
            if self.last == Some(size) {
                continue;
            }
            self.last = Some(size);
            self.level = self.level.max(self.next_distinct_level(size));
            return Some(size);
        }
        None
    }
}
