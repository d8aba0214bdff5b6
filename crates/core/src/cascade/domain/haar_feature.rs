/// One weighted rectangle of a Haar feature, in canonical-window units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HaarRectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub weight: f64,
}

impl HaarRectangle {
    pub fn new(x: i32, y: i32, width: i32, height: i32, weight: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            weight,
        }
    }

    /// Area of the unscaled rectangle. Scaling never changes this value.
    pub fn area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }
}

/// A cascade leaf: two or three rectangles plus a decision stump.
///
/// `rects[0]` is the anchor. Its weight is recomputed at every scale from the
/// other rectangles so the area-weighted sum of weights is zero; whatever
/// weight it carries here is ignored by the scaler.
///
/// The rectangle count is not checked on construction. A node with a count
/// outside `{2, 3}` is rejected when the cascade is scaled.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureNode {
    rects: Vec<HaarRectangle>,
    pub threshold: f64,
    pub left_value: f64,
    pub right_value: f64,
}

impl FeatureNode {
    pub fn new(
        rects: Vec<HaarRectangle>,
        threshold: f64,
        left_value: f64,
        right_value: f64,
    ) -> Self {
        Self {
            rects,
            threshold,
            left_value,
            right_value,
        }
    }

    pub fn rects(&self) -> &[HaarRectangle] {
        &self.rects
    }

    pub fn rect_count(&self) -> usize {
        self.rects.len()
    }

    /// The rectangle whose weight is derived rather than trained.
    pub fn anchor(&self) -> Option<&HaarRectangle> {
        self.rects.first()
    }

    /// Stump output for a response already normalized by the window's
    /// standard deviation factor.
    pub fn output(&self, response: f64, std_dev: f64) -> f64 {
        if response < self.threshold * std_dev {
            self.left_value
        } else {
            self.right_value
        }
    }
}
