use crate::cascade::domain::cascade_model::CascadeModel;
use crate::cascade::domain::feature_scaler::{FeatureScaler, ScaleCoefficients};
use crate::shared::error::DetectionError;
use crate::shared::frame::Frame;
use crate::shared::region::{Region, WindowSize};

use super::detection_parameters::DetectionParameters;
use super::scale_pyramid::ScalePyramid;

/// Geometry of one pyramid level over a specific frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScanLevel {
    /// Position of this level in scan order.
    pub index: usize,
    pub window: WindowSize,
    pub scale_weight: f64,
    /// Pixels between neighbouring window positions, on both axes.
    pub step: u32,
    pub cols: u32,
    pub rows: u32,
}

impl ScanLevel {
    pub fn position_count(&self) -> usize {
        self.cols as usize * self.rows as usize
    }

    /// Top-left corners in row-major order.
    pub fn positions(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (0..self.rows).flat_map(move |row| {
            (0..self.cols).map(move |col| (col * self.step, row * self.step))
        })
    }

    /// Frame region of the window at grid cell `(col, row)`.
    pub fn region_at(&self, col: u32, row: u32) -> Region {
        Region::new(
            (col * self.step) as i32,
            (row * self.step) as i32,
            self.window.width as i32,
            self.window.height as i32,
        )
    }
}

/// Every level both backends scan for one frame, in scan-mode order.
///
/// Built once per call so the sequential and accelerator paths visit exactly
/// the same windows.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanPlan {
    levels: Vec<ScanLevel>,
}

impl ScanPlan {
    /// Validates the inputs and lays out the levels. Pyramid sizes that do
    /// not fit inside the frame are skipped.
    pub fn build(
        frame: &Frame,
        cascade: &CascadeModel,
        params: &DetectionParameters,
    ) -> Result<Self, DetectionError> {
        validate_inputs(frame, cascade)?;
        params.validate()?;

        let frame_size = WindowSize::new(frame.width(), frame.height());
        let mut levels = Vec::new();
        for window in ScalePyramid::from_parameters(params)? {
            if !window.fits_within(&frame_size) {
                continue;
            }
            let scale_weight = params.weight_calibration.scale_weight(window);
            let coeffs = ScaleCoefficients::for_window(cascade.window(), window, scale_weight);
            let step = ((params.step_factor * coeffs.scale_rect).round() as u32).max(1);
            levels.push(ScanLevel {
                index: levels.len(),
                window,
                scale_weight,
                step,
                cols: (frame_size.width - window.width) / step + 1,
                rows: (frame_size.height - window.height) / step + 1,
            });
        }
        Ok(Self { levels })
    }

    pub fn levels(&self) -> &[ScanLevel] {
        &self.levels
    }

    pub fn total_positions(&self) -> usize {
        self.levels.iter().map(ScanLevel::position_count).sum()
    }
}

/// Rejects empty frames and malformed cascades before any scan work starts.
///
/// The cascade is scaled once at its canonical size, so a bad feature is
/// reported even when no pyramid level fits the frame.
pub fn validate_inputs(frame: &Frame, cascade: &CascadeModel) -> Result<(), DetectionError> {
    if frame.is_empty() {
        return Err(DetectionError::InvalidArgument("frame is empty".into()));
    }
    let expected = frame.width() as usize * frame.height() as usize;
    if frame.data().len() != expected {
        return Err(DetectionError::InvalidArgument(format!(
            "frame holds {} bytes, expected {expected} for {}x{}",
            frame.data().len(),
            frame.width(),
            frame.height()
        )));
    }
    if cascade.is_empty() {
        return Err(DetectionError::InvalidArgument(
            "cascade has no stages".into(),
        ));
    }
    FeatureScaler::scale(cascade, cascade.window(), 1.0)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::domain::cascade_model::Stage;
    use crate::cascade::domain::haar_feature::{FeatureNode, HaarRectangle};
    use crate::detection::domain::detection_parameters::ScanMode;
    use rstest::rstest;

    fn cascade() -> CascadeModel {
        let feature = FeatureNode::new(
            vec![
                HaarRectangle::new(0, 0, 20, 20, -1.0),
                HaarRectangle::new(0, 0, 10, 20, 2.0),
            ],
            0.0,
            -1.0,
            1.0,
        );
        CascadeModel::new(WindowSize::square(20), vec![Stage::new(vec![feature], 0.0, 0.0)])
    }

    fn frame(w: u32, h: u32) -> Frame {
        Frame::new(vec![0; (w * h) as usize], w, h, 0)
    }

    fn params(min: u32, max: u32, mode: ScanMode) -> DetectionParameters {
        DetectionParameters {
            min_size: WindowSize::square(min),
            max_size: WindowSize::square(max),
            scan_mode: mode,
            ..Default::default()
        }
    }

    #[test]
    fn test_levels_follow_scan_mode_and_skip_oversized_windows() {
        let plan =
            ScanPlan::build(&frame(100, 60), &cascade(), &params(20, 300, ScanMode::SmallerToLarger))
                .unwrap();
        let widths: Vec<u32> = plan.levels().iter().map(|l| l.window.width).collect();
        assert_eq!(widths, vec![20, 25, 31, 39, 48]);
        assert!(plan.levels().iter().enumerate().all(|(i, l)| l.index == i));
    }

    #[test]
    fn test_step_grows_with_scale() {
        let plan =
            ScanPlan::build(&frame(200, 200), &cascade(), &params(20, 80, ScanMode::SmallerToLarger))
                .unwrap();
        let first = plan.levels()[0];
        assert_eq!(first.step, 1);
        assert_eq!(first.cols, 181);
        let last = *plan.levels().last().unwrap();
        assert_eq!(last.window.width, 76);
        assert_eq!(last.step, 4); // 1.0 * 76 / 20 = 3.8 -> 4
        assert_eq!(last.cols, (200 - 76) / 4 + 1);
    }

    #[test]
    fn test_positions_are_row_major_and_inside_frame() {
        let plan =
            ScanPlan::build(&frame(23, 22), &cascade(), &params(20, 20, ScanMode::SmallerToLarger))
                .unwrap();
        let level = plan.levels()[0];
        let positions: Vec<(u32, u32)> = level.positions().collect();
        assert_eq!(positions.len(), level.position_count());
        assert_eq!(&positions[..5], &[(0, 0), (1, 0), (2, 0), (3, 0), (0, 1)]);
        assert_eq!(plan.total_positions(), 4 * 3);
        assert_eq!(level.region_at(3, 2), Region::new(3, 2, 20, 20));
    }

    #[test]
    fn test_empty_frame_is_invalid_argument() {
        let err = ScanPlan::build(
            &Frame::new(Vec::new(), 0, 0, 0),
            &cascade(),
            &DetectionParameters::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DetectionError::InvalidArgument(_)));
    }

    #[test]
    fn test_empty_cascade_is_invalid_argument() {
        let empty = CascadeModel::new(WindowSize::square(20), Vec::new());
        let err = ScanPlan::build(&frame(50, 50), &empty, &DetectionParameters::default())
            .unwrap_err();
        assert!(matches!(err, DetectionError::InvalidArgument(_)));
    }

    #[test]
    fn test_bad_parameters_are_invalid_parameter() {
        let bad = DetectionParameters {
            scaling_factor: 1.0,
            ..Default::default()
        };
        let err = ScanPlan::build(&frame(50, 50), &cascade(), &bad).unwrap_err();
        assert!(matches!(err, DetectionError::InvalidParameter(_)));
    }

    #[rstest]
    #[case::single_rect(vec![HaarRectangle::new(0, 0, 20, 20, 0.0)])]
    #[case::zero_area_anchor(vec![
        HaarRectangle::new(0, 0, 0, 20, 0.0),
        HaarRectangle::new(0, 0, 10, 20, 2.0),
    ])]
    fn test_malformed_cascade_rejected_even_when_no_level_fits(
        #[case] rects: Vec<HaarRectangle>,
    ) {
        let bad = CascadeModel::new(
            WindowSize::square(20),
            vec![Stage::new(vec![FeatureNode::new(rects, 0.0, -1.0, 1.0)], 0.0, 0.0)],
        );
        let err = ScanPlan::build(&frame(10, 10), &bad, &DetectionParameters::default())
            .unwrap_err();
        assert!(matches!(err, DetectionError::InvalidModel(_)));
    }

    #[test]
    fn test_frame_smaller_than_every_window_yields_no_levels() {
        let plan = ScanPlan::build(&frame(10, 10), &cascade(), &DetectionParameters::default())
            .unwrap();
        assert!(plan.levels().is_empty());
        assert_eq!(plan.total_positions(), 0);
    }
}
