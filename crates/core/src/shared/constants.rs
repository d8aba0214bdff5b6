/// Growth rate between pyramid levels.
pub const DEFAULT_SCALING_FACTOR: f64 = 1.25;

/// Smallest window scanned, in pixels (square).
pub const DEFAULT_MIN_SIZE: u32 = 20;

/// Largest window scanned, in pixels (square).
pub const DEFAULT_MAX_SIZE: u32 = 300;

/// Window step at the canonical scale; multiplied by the level's scale.
pub const DEFAULT_STEP_FACTOR: f64 = 1.0;

/// Host worker threads for the sequential backend (1 = calling thread only).
pub const DEFAULT_WORKERS: usize = 1;

/// Workgroup edge of the scan kernel (8 x 8 window positions per group).
pub const SCAN_WORKGROUP_SIZE: u32 = 8;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
