use thiserror::Error;

/// Failure taxonomy for scanning, scaling and program compilation.
///
/// Validation errors are reported as-is and never corrected. Nothing in this
/// crate retries; falling back to another backend is the caller's decision.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    /// A required input is missing or empty.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Scan bounds or the scaling factor are malformed.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// A cascade feature cannot be scaled.
    #[error("invalid cascade model: {0}")]
    InvalidModel(String),
    /// The accelerator program failed to build on at least one device.
    ///
    /// `log` holds the diagnostics of every failing device, one per line.
    #[error("program compilation failed:\n{log}")]
    CompilationFailure { log: String },
    #[error("device transfer failed: {0}")]
    TransferFailure(String),
    #[error("no accelerator device available")]
    NoDevice,
    /// A host scan worker died before reporting its levels.
    #[error("scan worker failed: {0}")]
    WorkerFailure(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compilation_failure_message_contains_every_device_log() {
        let err = DetectionError::CompilationFailure {
            log: "gpu-a: bad token\ngpu-b: bad token".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("gpu-a"));
        assert!(msg.contains("gpu-b"));
    }

    #[test]
    fn test_invalid_parameter_display() {
        let err = DetectionError::InvalidParameter("scaling factor must be > 1.0".into());
        assert_eq!(
            err.to_string(),
            "invalid parameter: scaling factor must be > 1.0"
        );
    }
}
