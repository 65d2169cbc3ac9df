//! Error handling for the deferred renderer core
//!
//! One error type for the whole crate. Variants fall into three groups:
//! fatal device errors (abort the frame and surface to the host),
//! programmer errors (bad handles, bad constant slots, unknown names) and
//! configuration errors. Missing or corrupt assets never halt the renderer:
//! `InvalidAsset` is reported where the asset is loaded and the caller swaps
//! in a fallback.

/// Main error type for the renderer core
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // Fatal device errors
    #[error("GPU device lost: {reason}")]
    DeviceLost { reason: String },

    #[error("GPU device creation failed: {reason}")]
    DeviceCreation { reason: String },

    #[error("Resource creation failed for {resource}: {reason}")]
    ResourceCreation { resource: String, reason: String },

    #[error("Out of GPU memory: requested {requested} bytes, available {available}")]
    OutOfMemory { requested: u64, available: u64 },

    #[error("Command submission failed: {reason}")]
    SubmissionFailed { reason: String },

    // Frame loop misuse
    #[error("Invalid renderer state: expected {expected}, actual {actual}")]
    InvalidState { expected: String, actual: String },

    // Programmer errors
    #[error("Invalid {kind} handle: {index}")]
    InvalidHandle { kind: &'static str, index: u32 },

    #[error("Constant buffer slot out of range in {buffer}: index {index} >= capacity {capacity}")]
    InvalidConstantSlot {
        buffer: &'static str,
        index: u32,
        capacity: u32,
    },

    #[error("Material not found: {name}")]
    MaterialNotFound { name: String },

    #[error("Resource state mismatch on {resource}: expected {expected}, found {found}")]
    ResourceStateMismatch {
        resource: String,
        expected: String,
        found: String,
    },

    #[error("Pipeline not registered: {key}")]
    PipelineMissing { key: String },

    // Bad asset data, replaced by a fallback where it is loaded
    #[error("Invalid asset {asset}: {reason}")]
    InvalidAsset { asset: String, reason: String },

    // Configuration errors
    #[error("Invalid config: {field} = {value} ({reason})")]
    InvalidConfig {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load config from {path}: {error}")]
    ConfigLoad { path: String, error: String },

    // Generic fallback for unexpected errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EngineError {
    /// Device-level failures that cannot be recovered within this run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::DeviceLost { .. }
                | EngineError::DeviceCreation { .. }
                | EngineError::ResourceCreation { .. }
                | EngineError::OutOfMemory { .. }
                | EngineError::SubmissionFailed { .. }
        )
    }

    pub fn device_lost(reason: impl Into<String>) -> Self {
        EngineError::DeviceLost {
            reason: reason.into(),
        }
    }
}

/// Type alias for Results in the renderer core
pub type EngineResult<T> = Result<T, EngineError>;

impl From<std::io::Error> for EngineError {
    fn from(error: std::io::Error) -> Self {
        EngineError::ConfigLoad {
            path: String::new(),
            error: error.to_string(),
        }
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(error: toml::de::Error) -> Self {
        EngineError::ConfigLoad {
            path: String::new(),
            error: error.to_string(),
        }
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for EngineError {
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        EngineError::device_lost("GPU timeline channel closed")
    }
}

/// Convert Option to Result with context
pub trait OptionExt<T> {
    fn ok_or_engine<F>(self, f: F) -> EngineResult<T>
    where
        F: FnOnce() -> EngineError;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_engine<F>(self, f: F) -> EngineResult<T>
    where
        F: FnOnce() -> EngineError,
    {
        self.ok_or_else(f)
    }
}

/// Extension trait for adding context to foreign errors
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> EngineResult<T>;
    fn with_context<F>(self, f: F) -> EngineResult<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::fmt::Display,
{
    fn context(self, msg: &str) -> EngineResult<T> {
        self.map_err(|e| EngineError::Internal {
            message: format!("{}: {}", msg, e),
        })
    }

    fn with_context<F>(self, f: F) -> EngineResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| EngineError::Internal {
            message: format!("{}: {}", f(), e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::InvalidConstantSlot {
            buffer: "light",
            index: 10,
            capacity: 5,
        };
        assert_eq!(
            err.to_string(),
            "Constant buffer slot out of range in light: index 10 >= capacity 5"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(EngineError::device_lost("removed").is_fatal());
        assert!(!EngineError::MaterialNotFound {
            name: "brick".to_string()
        }
        .is_fatal());
        assert!(!EngineError::InvalidHandle {
            kind: "render item",
            index: 3
        }
        .is_fatal());
        assert!(!EngineError::InvalidAsset {
            asset: "texture 'bricks'".to_string(),
            reason: "expected 64 bytes, got 3".to_string(),
        }
        .is_fatal());
    }

    #[test]
    fn test_option_ext() {
        let opt: Option<i32> = None;
        let result = opt.ok_or_engine(|| EngineError::Internal {
            message: "test".to_string(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_error_context() {
        let result: Result<i32, std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));
        let with_context = result.context("loading config");
        match with_context {
            Err(EngineError::Internal { message }) => {
                assert!(message.starts_with("loading config"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
