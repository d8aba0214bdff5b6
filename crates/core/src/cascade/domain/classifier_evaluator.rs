use crate::shared::region::WindowSize;

use super::feature_scaler::{ScaledCascade, ScaledFeature};
use super::integral_image::IntegralImage;

/// Outcome of running the cascade on one window.
///
/// Rejection is the common case, not an error: most windows stop within the
/// first one or two stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected { stage: usize },
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

pub struct ClassifierEvaluator;

impl ClassifierEvaluator {
    /// Run the stages in order, pulling each feature's response from
    /// `response`. Stops at the first stage whose sum falls below its
    /// threshold; features of later stages are never requested.
    pub fn evaluate<F>(cascade: &ScaledCascade, std_dev: f64, mut response: F) -> Verdict
    where
        F: FnMut(&ScaledFeature) -> f64,
    {
        for (idx, stage) in cascade.stages().iter().enumerate() {
            let mut sum = stage.bias;
            for feature in cascade.stage_features(stage) {
                sum += feature.output(response(feature), std_dev);
            }
            if sum < stage.threshold {
                return Verdict::Rejected { stage: idx };
            }
        }
        Verdict::Accepted
    }

    /// Evaluate the window whose top-left corner is `(x, y)`. The scaled
    /// window must lie inside the integral image.
    pub fn evaluate_window(
        cascade: &ScaledCascade,
        integral: &IntegralImage,
        x: i32,
        y: i32,
    ) -> Verdict {
        let window = cascade.window().unwrap_or(WindowSize::new(0, 0));
        let std_dev = integral.std_dev(x, y, window.width as i32, window.height as i32);
        Self::evaluate(cascade, std_dev, |feature| {
            Self::feature_response(feature, integral, x, y)
        })
    }

    /// Weighted area sum of the feature's rectangles, offset to `(x, y)`.
    pub fn feature_response(
        feature: &ScaledFeature,
        integral: &IntegralImage,
        x: i32,
        y: i32,
    ) -> f64 {
        feature
            .rects()
            .iter()
            .map(|r| r.weight * integral.rect_sum(x + r.x, y + r.y, r.width, r.height))
            .sum()
    }
}
