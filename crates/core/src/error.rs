use std::path::PathBuf;

/// Domain errors surfaced to callers of the engine.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failures inside a supervised separation run.
///
/// None of these escape the supervisor task: each one is rendered into the
/// `error_detail` of a single terminal `Failed` write.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed or missing upload, rejected before a job id is issued.
    #[error("Invalid input: {0}")]
    InputValidation(String),

    /// A required external binary could not be resolved.
    #[error("{binary} is not installed or not executable (searched PATH and {} fallback locations)", searched.len())]
    DependencyMissing {
        binary: String,
        searched: Vec<PathBuf>,
    },

    /// The external process exited with a non-zero code.
    #[error("process exited with code {exit_code:?}: {stderr}")]
    ProcessFailure {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Unexpected error: {0}")]
    Unexpected(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EngineError> for CoreError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::InputValidation(msg) => CoreError::Validation(msg),
            other => CoreError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_dependency_missing() {
        let err = EngineError::DependencyMissing {
            binary: "ffmpeg".to_string(),
            searched: vec![PathBuf::from("/usr/bin/ffmpeg"), PathBuf::from("/bin/ffmpeg")],
        };
        assert_eq!(
            err.to_string(),
            "ffmpeg is not installed or not executable (searched PATH and 2 fallback locations)"
        );
    }

    #[test]
    fn display_process_failure() {
        let err = EngineError::ProcessFailure {
            exit_code: Some(1),
            stderr: "decode error".to_string(),
        };
        assert_eq!(err.to_string(), "process exited with code Some(1): decode error");
    }

    #[test]
    fn validation_maps_to_core_validation() {
        let core: CoreError = EngineError::InputValidation("no file".into()).into();
        assert!(matches!(core, CoreError::Validation(msg) if msg == "no file"));
    }

    #[test]
    fn io_maps_to_core_internal() {
        let inner = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let core: CoreError = EngineError::from(inner).into();
        assert!(matches!(core, CoreError::Internal(_)));
    }
}
