use std::path::Path;

use serde::Deserialize;

use haarscan_core::cascade::domain::cascade_model::{CascadeModel, Stage};
use haarscan_core::cascade::domain::haar_feature::{FeatureNode, HaarRectangle};
use haarscan_core::shared::region::WindowSize;

/// On-disk cascade layout.
///
/// ```json
/// {
///   "window": { "width": 24, "height": 24 },
///   "stages": [
///     {
///       "threshold": -0.8,
///       "features": [
///         { "rects": [[0, 0, 24, 24, -1.0], [0, 0, 12, 24, 2.0]],
///           "threshold": 0.01, "left": -1.0, "right": 1.0 }
///       ]
///     }
///   ]
/// }
/// ```
///
/// Each rectangle is `[x, y, width, height, weight]`. The first rectangle's
/// weight is ignored; it is derived at every scale.
#[derive(Debug, Deserialize)]
struct CascadeFile {
    window: WindowDto,
    stages: Vec<StageDto>,
}

#[derive(Debug, Deserialize)]
struct WindowDto {
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct StageDto {
    threshold: f64,
    #[serde(default)]
    bias: f64,
    features: Vec<FeatureDto>,
}

#[derive(Debug, Deserialize)]
struct FeatureDto {
    rects: Vec<(i32, i32, i32, i32, f64)>,
    threshold: f64,
    left: f64,
    right: f64,
}

impl From<CascadeFile> for CascadeModel {
    fn from(file: CascadeFile) -> Self {
        let stages = file
            .stages
            .into_iter()
            .map(|stage| {
                let features = stage
                    .features
                    .into_iter()
                    .map(|f| {
                        let rects = f
                            .rects
                            .into_iter()
                            .map(|(x, y, w, h, weight)| HaarRectangle::new(x, y, w, h, weight))
                            .collect();
                        FeatureNode::new(rects, f.threshold, f.left, f.right)
                    })
                    .collect();
                Stage::new(features, stage.threshold, stage.bias)
            })
            .collect();
        CascadeModel::new(
            WindowSize::new(file.window.width, file.window.height),
            stages,
        )
    }
}

pub fn parse_cascade(json: &str) -> Result<CascadeModel, Box<dyn std::error::Error>> {
    let file: CascadeFile = serde_json::from_str(json)?;
    Ok(file.into())
}

pub fn load_cascade(path: &Path) -> Result<CascadeModel, Box<dyn std::error::Error>> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read cascade {}: {e}", path.display()))?;
    parse_cascade(&json).map_err(|e| format!("Invalid cascade {}: {e}", path.display()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TWO_STAGE: &str = r#"{
        "window": { "width": 20, "height": 20 },
        "stages": [
            {
                "threshold": 0.0,
                "bias": 0.25,
                "features": [
                    { "rects": [[0, 0, 20, 20, 0.0], [0, 0, 10, 20, 2.0]],
                      "threshold": 0.5, "left": -1.0, "right": 1.0 }
                ]
            },
            {
                "threshold": 0.0,
                "features": [
                    { "rects": [[0, 0, 20, 20, 0.0], [0, 0, 20, 10, 2.0], [0, 10, 20, 5, -1.0]],
                      "threshold": 0.5, "left": 1.0, "right": -1.0 }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_parse_builds_stages_and_features_in_order() {
        let model = parse_cascade(TWO_STAGE).unwrap();
        assert_eq!(model.window(), WindowSize::square(20));
        assert_eq!(model.stages().len(), 2);
        assert_eq!(model.feature_count(), 2);
        assert_eq!(model.stages()[0].bias, 0.25);
        assert_eq!(model.stages()[1].bias, 0.0);

        let second = &model.stages()[1].features[0];
        assert_eq!(second.rect_count(), 3);
        assert_eq!(second.rects()[2], HaarRectangle::new(0, 10, 20, 5, -1.0));
        assert_eq!(second.left_value, 1.0);
        assert_eq!(second.right_value, -1.0);
    }

    #[test]
    fn test_load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TWO_STAGE.as_bytes()).unwrap();
        let model = load_cascade(file.path()).unwrap();
        assert_eq!(model.stages().len(), 2);
    }

    #[test]
    fn test_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let err = load_cascade(&path).unwrap_err().to_string();
        assert!(err.contains("absent.json"));
    }

    #[test]
    fn test_malformed_rect_is_rejected() {
        let json = r#"{ "window": { "width": 20, "height": 20 },
            "stages": [{ "threshold": 0.0, "features": [
                { "rects": [[0, 0, 20]], "threshold": 0.0, "left": 0.0, "right": 0.0 }
            ]}]}"#;
        assert!(parse_cascade(json).is_err());
    }
}
