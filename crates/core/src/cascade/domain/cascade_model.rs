use crate::shared::region::WindowSize;

use super::haar_feature::FeatureNode;

/// One boosted stage: the window survives when
/// `bias + sum(feature outputs) >= threshold`.
#[derive(Clone, Debug, PartialEq)]
pub struct Stage {
    pub features: Vec<FeatureNode>,
    pub threshold: f64,
    pub bias: f64,
}

impl Stage {
    pub fn new(features: Vec<FeatureNode>, threshold: f64, bias: f64) -> Self {
        Self {
            features,
            threshold,
            bias,
        }
    }
}

/// A trained cascade, immutable once built.
///
/// Scans borrow it (or share it through an `Arc`) and never modify it;
/// per-scale values live in a separate `ScaledCascade`.
#[derive(Clone, Debug, PartialEq)]
pub struct CascadeModel {
    window: WindowSize,
    stages: Vec<Stage>,
}

impl CascadeModel {
    /// `window` is the canonical size the cascade was trained at.
    pub fn new(window: WindowSize, stages: Vec<Stage>) -> Self {
        Self { window, stages }
    }

    pub fn window(&self) -> WindowSize {
        self.window
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn feature_count(&self) -> usize {
        self.stages.iter().map(|s| s.features.len()).sum()
    }

    pub fn features(&self) -> impl Iterator<Item = &FeatureNode> {
        self.stages.iter().flat_map(|s| s.features.iter())
    }
}
