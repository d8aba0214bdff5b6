//! Synthetic frames and cascades with predictable detections.

use crate::cascade::domain::cascade_model::{CascadeModel, Stage};
use crate::cascade::domain::haar_feature::{FeatureNode, HaarRectangle};
use crate::shared::frame::Frame;
use crate::shared::region::{Region, WindowSize};

pub const BRIGHT: u8 = 200;
pub const DARK: u8 = 20;

/// Bright columns left of `edge_x`, dark columns from `edge_x` on.
pub fn edge_frame(width: u32, height: u32, edge_x: u32) -> Frame {
    let data = (0..height)
        .flat_map(|_| (0..width).map(move |x| if x < edge_x { BRIGHT } else { DARK }))
        .collect();
    Frame::new(data, width, height, 0)
}

/// Left-half-minus-right-half detector on a 20x20 canonical window.
///
/// The anchor covers the whole window; with the inverse-area weight its
/// response is half the difference of the two half means, and it fires when
/// that reaches half the window's standard deviation. The second stage is a
/// top-minus-bottom feature that passes unless the window has a horizontal
/// edge.
pub fn edge_cascade() -> CascadeModel {
    let vertical_edge = FeatureNode::new(
        vec![
            HaarRectangle::new(0, 0, 20, 20, 0.0),
            HaarRectangle::new(0, 0, 10, 20, 2.0),
        ],
        0.5,
        -1.0,
        1.0,
    );
    let horizontal_edge = FeatureNode::new(
        vec![
            HaarRectangle::new(0, 0, 20, 20, 0.0),
            HaarRectangle::new(0, 0, 20, 10, 2.0),
        ],
        0.5,
        1.0,
        -1.0,
    );
    CascadeModel::new(
        WindowSize::square(20),
        vec![
            Stage::new(vec![vertical_edge], 0.0, 0.0),
            Stage::new(vec![horizontal_edge], 0.0, 0.0),
        ],
    )
}

/// Whether `region` contains pixels on both sides of `edge_x`.
pub fn straddles(region: &Region, edge_x: i32) -> bool {
    region.x < edge_x && region.x + region.width > edge_x
}
