use crate::shared::error::DetectionError;
use crate::shared::region::WindowSize;

use super::cascade_model::CascadeModel;
use super::haar_feature::FeatureNode;

pub const MAX_RECTS_PER_FEATURE: usize = 3;

/// Per-level scale coefficients.
///
/// `scale_rect` maps canonical geometry to the target window. `scale_weight`
/// is an independent calibration input and is not derived from `scale_rect`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleCoefficients {
    pub scale_rect: f64,
    pub scale_weight: f64,
}

impl ScaleCoefficients {
    /// Geometric coefficient for `target`, using the tighter of the two axes
    /// so scaled features never leave the target window.
    pub fn for_window(canonical: WindowSize, target: WindowSize, scale_weight: f64) -> Self {
        let sx = target.width as f64 / canonical.width as f64;
        let sy = target.height as f64 / canonical.height as f64;
        Self {
            scale_rect: sx.min(sy),
            scale_weight,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScaledRectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub weight: f64,
}

/// A feature with geometry and weights for one pyramid level.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaledFeature {
    rects: [ScaledRectangle; MAX_RECTS_PER_FEATURE],
    rect_count: usize,
    pub threshold: f64,
    pub left_value: f64,
    pub right_value: f64,
}

impl ScaledFeature {
    pub fn rects(&self) -> &[ScaledRectangle] {
        &self.rects[..self.rect_count]
    }

    pub fn output(&self, response: f64, std_dev: f64) -> f64 {
        if response < self.threshold * std_dev {
            self.left_value
        } else {
            self.right_value
        }
    }
}

/// Stage bounds into the flat feature list of a [`ScaledCascade`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaledStage {
    pub first_feature: usize,
    pub feature_count: usize,
    pub threshold: f64,
    pub bias: f64,
}

/// The cascade rescaled for one window size.
///
/// Features are stored flat with stages indexing into them, which is also the
/// layout uploaded to the accelerator.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScaledCascade {
    window: Option<WindowSize>,
    coefficients: Option<ScaleCoefficients>,
    stages: Vec<ScaledStage>,
    features: Vec<ScaledFeature>,
}

impl ScaledCascade {
    pub fn new() -> Self {
        Self::default()
    }

    /// Target window, or `None` before the first `scale_into`.
    pub fn window(&self) -> Option<WindowSize> {
        self.window
    }

    pub fn coefficients(&self) -> Option<ScaleCoefficients> {
        self.coefficients
    }

    pub fn stages(&self) -> &[ScaledStage] {
        &self.stages
    }

    pub fn features(&self) -> &[ScaledFeature] {
        &self.features
    }

    pub fn stage_features(&self, stage: &ScaledStage) -> &[ScaledFeature] {
        &self.features[stage.first_feature..stage.first_feature + stage.feature_count]
    }
}

/// Rescales a [`CascadeModel`] to arbitrary window sizes.
pub struct FeatureScaler;

impl FeatureScaler {
    /// Scale `model` to `target`, producing a fresh [`ScaledCascade`].
    pub fn scale(
        model: &CascadeModel,
        target: WindowSize,
        scale_weight: f64,
    ) -> Result<ScaledCascade, DetectionError> {
        let mut scaled = ScaledCascade::new();
        Self::scale_into(model, target, scale_weight, &mut scaled)?;
        Ok(scaled)
    }

    /// Scale `model` into `scratch`, reusing its allocations.
    ///
    /// Fails with `InvalidModel` on the first malformed feature; `scratch`
    /// is left in an unspecified state in that case.
    pub fn scale_into(
        model: &CascadeModel,
        target: WindowSize,
        scale_weight: f64,
        scratch: &mut ScaledCascade,
    ) -> Result<(), DetectionError> {
        let canonical = model.window();
        if canonical.width == 0 || canonical.height == 0 {
            return Err(DetectionError::InvalidModel(
                "canonical window has a zero dimension".into(),
            ));
        }
        if target.width == 0 || target.height == 0 {
            return Err(DetectionError::InvalidParameter(format!(
                "target window {}x{} has a zero dimension",
                target.width, target.height
            )));
        }
        if !scale_weight.is_finite() {
            return Err(DetectionError::InvalidParameter(format!(
                "weight scale must be finite, got {scale_weight}"
            )));
        }

        let coefficients = ScaleCoefficients::for_window(canonical, target, scale_weight);

        scratch.stages.clear();
        scratch.features.clear();
        for (stage_idx, stage) in model.stages().iter().enumerate() {
            let first_feature = scratch.features.len();
            for (feature_idx, node) in stage.features.iter().enumerate() {
                let scaled = scale_feature(node, coefficients, target).map_err(|reason| {
                    DetectionError::InvalidModel(format!(
                        "stage {stage_idx} feature {feature_idx}: {reason}"
                    ))
                })?;
                scratch.features.push(scaled);
            }
            scratch.stages.push(ScaledStage {
                first_feature,
                feature_count: stage.features.len(),
                threshold: stage.threshold,
                bias: stage.bias,
            });
        }
        scratch.window = Some(target);
        scratch.coefficients = Some(coefficients);
        Ok(())
    }
}

/// Scale one feature for a `window`-sized level. The anchor weight is
/// derived from the other rectangles' scaled weights and all areas are the
/// unscaled base areas:
///
/// `w1' = -sum_{i>=2}(area_i * w_i') / area_1`
///
/// Scaled rectangles are clipped to `window`; rounding the origin and the
/// extent separately can otherwise overrun it by a pixel.
pub fn scale_feature(
    node: &FeatureNode,
    coefficients: ScaleCoefficients,
    window: WindowSize,
) -> Result<ScaledFeature, String> {
    let rects = node.rects();
    if !(2..=MAX_RECTS_PER_FEATURE).contains(&rects.len()) {
        return Err(format!(
            "feature has {} rectangles, expected 2 or 3",
            rects.len()
        ));
    }
    if rects
        .iter()
        .any(|r| r.x < 0 || r.y < 0 || r.width < 0 || r.height < 0)
    {
        return Err("rectangle has negative geometry".into());
    }
    let anchor_area = rects[0].area();
    if anchor_area == 0.0 {
        return Err("anchor rectangle has zero area".into());
    }

    let s = coefficients.scale_rect;
    let (win_w, win_h) = (window.width as i32, window.height as i32);
    let mut out = [ScaledRectangle::default(); MAX_RECTS_PER_FEATURE];
    let mut weighted_area = 0.0;
    for (i, r) in rects.iter().enumerate() {
        let x = scale_coord(r.x, s).min(win_w);
        let y = scale_coord(r.y, s).min(win_h);
        out[i] = ScaledRectangle {
            x,
            y,
            width: scale_coord(r.width, s).min(win_w - x),
            height: scale_coord(r.height, s).min(win_h - y),
            weight: 0.0,
        };
        if i > 0 {
            out[i].weight = coefficients.scale_weight * r.weight;
            weighted_area += r.area() * out[i].weight;
        }
    }
    out[0].weight = -weighted_area / anchor_area;

    Ok(ScaledFeature {
        rects: out,
        rect_count: rects.len(),
        threshold: node.threshold,
        left_value: node.left_value,
        right_value: node.right_value,
    })
}

fn scale_coord(v: i32, scale: f64) -> i32 {
    (v as f64 * scale).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::domain::cascade_model::Stage;
    use crate::cascade::domain::haar_feature::HaarRectangle;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn two_rect() -> FeatureNode {
        FeatureNode::new(
            vec![
                HaarRectangle::new(1, 1, 1, 1, -1.0),
                HaarRectangle::new(1, 1, 1, 1, 1.0),
            ],
            0.0,
            -1.0,
            1.0,
        )
    }

    fn three_rect() -> FeatureNode {
        FeatureNode::new(
            vec![
                HaarRectangle::new(0, 0, 9, 4, -1.0),
                HaarRectangle::new(3, 0, 3, 4, 3.0),
                HaarRectangle::new(0, 2, 9, 1, 0.5),
            ],
            0.1,
            -1.0,
            1.0,
        )
    }

    fn model(features: Vec<FeatureNode>) -> CascadeModel {
        CascadeModel::new(WindowSize::square(20), vec![Stage::new(features, 0.0, 0.0)])
    }

    fn weighted_area_sum(node: &FeatureNode, scaled: &ScaledFeature) -> f64 {
        node.rects()
            .iter()
            .zip(scaled.rects())
            .map(|(base, s)| base.area() * s.weight)
            .sum()
    }

    #[test]
    fn test_integer_scale_is_exact() {
        let coeffs = ScaleCoefficients {
            scale_rect: 2.0,
            scale_weight: 1.0,
        };
        let scaled = scale_feature(&two_rect(), coeffs, WindowSize::square(40)).unwrap();
        for r in scaled.rects() {
            assert_eq!((r.x, r.y, r.width, r.height), (2, 2, 2, 2));
        }
    }

    #[test]
    fn test_non_anchor_weight_is_scaled_independently_of_geometry() {
        let coeffs = ScaleCoefficients {
            scale_rect: 3.0,
            scale_weight: 0.25,
        };
        let scaled = scale_feature(&three_rect(), coeffs, WindowSize::square(60)).unwrap();
        assert_relative_eq!(scaled.rects()[1].weight, 0.75);
        assert_relative_eq!(scaled.rects()[2].weight, 0.125);
    }

    #[test]
    fn test_anchor_weight_uses_base_areas() {
        // area2 = 12, area3 = 9, area1 = 36
        let coeffs = ScaleCoefficients {
            scale_rect: 2.5,
            scale_weight: 0.5,
        };
        let scaled = scale_feature(&three_rect(), coeffs, WindowSize::square(60)).unwrap();
        let expected = -(12.0 * 1.5 + 9.0 * 0.25) / 36.0;
        assert_relative_eq!(scaled.rects()[0].weight, expected);
    }

    #[rstest]
    #[case(1.0, 1.0)]
    #[case(1.25, 0.01)]
    #[case(2.0, 1.0 / 1600.0)]
    #[case(7.3, 3.5)]
    #[case(15.0, 1.0 / 90000.0)]
    fn test_zero_sum_holds_at_every_scale(#[case] scale_rect: f64, #[case] scale_weight: f64) {
        let coeffs = ScaleCoefficients {
            scale_rect,
            scale_weight,
        };
        for node in [two_rect(), three_rect()] {
            let scaled = scale_feature(&node, coeffs, WindowSize::square(400)).unwrap();
            assert_relative_eq!(weighted_area_sum(&node, &scaled), 0.0, epsilon = 1e-12);
        }
    }

    #[rstest]
    #[case::one_rect(1)]
    #[case::four_rects(4)]
    fn test_bad_rect_count_is_invalid_model(#[case] count: usize) {
        let node = FeatureNode::new(
            vec![HaarRectangle::new(0, 0, 2, 2, 1.0); count],
            0.0,
            -1.0,
            1.0,
        );
        let err = FeatureScaler::scale(&model(vec![node]), WindowSize::square(40), 1.0)
            .unwrap_err();
        assert!(matches!(err, DetectionError::InvalidModel(_)));
    }

    #[test]
    fn test_zero_area_anchor_is_invalid_model() {
        let node = FeatureNode::new(
            vec![
                HaarRectangle::new(0, 0, 0, 4, -1.0),
                HaarRectangle::new(0, 0, 2, 4, 2.0),
            ],
            0.0,
            -1.0,
            1.0,
        );
        let err = FeatureScaler::scale(&model(vec![node]), WindowSize::square(20), 1.0)
            .unwrap_err();
        assert!(matches!(err, DetectionError::InvalidModel(_)));
    }

    #[test]
    fn test_rounded_geometry_is_clipped_to_window() {
        // 24 -> 30 gives scale 1.25; x=2 -> 2.5 -> 3 and w=22 -> 27.5 -> 28
        let node = FeatureNode::new(
            vec![
                HaarRectangle::new(2, 0, 22, 24, -1.0),
                HaarRectangle::new(0, 0, 12, 24, 1.0),
            ],
            0.0,
            -1.0,
            1.0,
        );
        let coeffs = ScaleCoefficients::for_window(
            WindowSize::square(24),
            WindowSize::square(30),
            1.0,
        );
        let scaled = scale_feature(&node, coeffs, WindowSize::square(30)).unwrap();
        let anchor = scaled.rects()[0];
        assert_eq!(anchor.x, 3);
        assert_eq!(anchor.x + anchor.width, 30);
    }

    #[test]
    fn test_negative_geometry_is_invalid_model() {
        let node = FeatureNode::new(
            vec![
                HaarRectangle::new(-1, 0, 4, 4, -1.0),
                HaarRectangle::new(0, 0, 2, 4, 2.0),
            ],
            0.0,
            -1.0,
            1.0,
        );
        let err = FeatureScaler::scale(&model(vec![node]), WindowSize::square(20), 1.0)
            .unwrap_err();
        assert!(matches!(err, DetectionError::InvalidModel(_)));
    }

    #[test]
    fn test_scale_records_window_and_coefficients() {
        let scaled =
            FeatureScaler::scale(&model(vec![two_rect()]), WindowSize::square(40), 0.5).unwrap();
        assert_eq!(scaled.window(), Some(WindowSize::square(40)));
        let coeffs = scaled.coefficients().unwrap();
        assert_relative_eq!(coeffs.scale_rect, 2.0);
        assert_relative_eq!(coeffs.scale_weight, 0.5);
    }

    #[test]
    fn test_scale_into_reuses_scratch_and_leaves_model_untouched() {
        let m = model(vec![two_rect(), three_rect()]);
        let before = m.clone();
        let mut scratch = ScaledCascade::new();

        FeatureScaler::scale_into(&m, WindowSize::square(20), 1.0, &mut scratch).unwrap();
        assert_eq!(scratch.features().len(), 2);
        FeatureScaler::scale_into(&m, WindowSize::square(40), 1.0, &mut scratch).unwrap();
        assert_eq!(scratch.features().len(), 2);
        assert_eq!(scratch.stages().len(), 1);
        assert_eq!(scratch.features()[0].rects()[0].x, 2);
        assert_eq!(m, before);
    }

    #[test]
    fn test_stage_features_slices_flat_list() {
        let m = CascadeModel::new(
            WindowSize::square(20),
            vec![
                Stage::new(vec![two_rect()], 0.0, 0.0),
                Stage::new(vec![three_rect(), two_rect()], 0.0, 0.0),
            ],
        );
        let scaled = FeatureScaler::scale(&m, WindowSize::square(20), 1.0).unwrap();
        let second = scaled.stages()[1];
        assert_eq!(second.first_feature, 1);
        assert_eq!(scaled.stage_features(&second).len(), 2);
        assert_eq!(scaled.stage_features(&second)[0].rects().len(), 3);
    }

    #[test]
    fn test_non_square_target_uses_tighter_axis() {
        let coeffs = ScaleCoefficients::for_window(
            WindowSize::square(20),
            WindowSize::new(40, 30),
            1.0,
        );
        assert_relative_eq!(coeffs.scale_rect, 1.5);
    }
}
