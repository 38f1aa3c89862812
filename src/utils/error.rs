use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Model download failed: {0}")]
    DownloadError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Framework installation not found: {path}")]
    MissingInstall { path: String },

    #[error("Environment variable {variable} is not set")]
    MissingEnvironment { variable: String },

    #[error("Input directory not found: {path}")]
    MissingInput { path: String },

    #[error("No images found in {path}")]
    NoInputImages { path: String },

    #[error("Insufficient images in {path}: found {found}, need at least {required}")]
    InsufficientImages {
        path: String,
        found: usize,
        required: usize,
    },

    #[error("Segmentation error: {message}")]
    SegmentationError { message: String },

    #[error("Node {step} failed: {command}")]
    NodeFailed { step: String, command: String },

    #[error("Stage {stage} failed: {details}")]
    StageFailed { stage: String, details: String },

    #[error("Stage {stage} failed: {source}")]
    StageError {
        stage: String,
        #[source]
        source: Box<ReconError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Environment,
    Input,
    Processing,
    External,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ReconError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ReconError::ConfigValidationError { .. }
            | ReconError::InvalidConfigValueError { .. }
            | ReconError::MissingConfigError { .. } => ErrorCategory::Configuration,
            ReconError::MissingInstall { .. } | ReconError::MissingEnvironment { .. } => {
                ErrorCategory::Environment
            }
            ReconError::MissingInput { .. }
            | ReconError::NoInputImages { .. }
            | ReconError::InsufficientImages { .. } => ErrorCategory::Input,
            ReconError::ImageError(_)
            | ReconError::SegmentationError { .. }
            | ReconError::SerializationError(_) => ErrorCategory::Processing,
            ReconError::NodeFailed { .. } | ReconError::DownloadError(_) => {
                ErrorCategory::External
            }
            ReconError::StageFailed { .. } => ErrorCategory::Processing,
            ReconError::StageError { source, .. } => source.category(),
            ReconError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ReconError::StageError { source, .. } => source.severity(),
            ReconError::DownloadError(_) => ErrorSeverity::Medium,
            ReconError::IoError(_)
            | ReconError::MissingInstall { .. }
            | ReconError::SegmentationError { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            ReconError::IoError(_) => "Check file permissions and available disk space".to_string(),
            ReconError::ImageError(_) => {
                "Make sure the input files are valid JPEG or PNG images".to_string()
            }
            ReconError::DownloadError(_) => {
                "Check the network connection or place the model file in the model directory manually"
                    .to_string()
            }
            ReconError::SerializationError(_) => "Report this issue with the failing input".to_string(),
            ReconError::ConfigValidationError { .. }
            | ReconError::InvalidConfigValueError { .. }
            | ReconError::MissingConfigError { .. } => {
                "Review recon.toml and the command line flags".to_string()
            }
            ReconError::MissingInstall { .. } => {
                "Install AliceVision under ./aliceVision or set framework.root in recon.toml"
                    .to_string()
            }
            ReconError::MissingEnvironment { .. } => {
                "Run 'photo-recon setup' and then 'source vars.sh' before reconstructing".to_string()
            }
            ReconError::MissingInput { .. } => {
                "Run 'photo-recon preprocess' first to produce the sanitized images".to_string()
            }
            ReconError::NoInputImages { .. } => {
                "Place .jpg, .jpeg or .png photographs in the raw directory".to_string()
            }
            ReconError::InsufficientImages { required, .. } => format!(
                "At least {} overlapping images are needed for triangulation",
                required
            ),
            ReconError::SegmentationError { .. } => {
                "Verify the segmentation model file or switch to the chroma backend".to_string()
            }
            ReconError::NodeFailed { .. } => {
                "Re-run the printed command with --verboseLevel info to inspect the node output"
                    .to_string()
            }
            ReconError::StageFailed { .. } => "See the stage error above".to_string(),
            ReconError::StageError { source, .. } => source.recovery_suggestion(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            ReconError::NodeFailed { step, .. } => {
                format!("Reconstruction stopped at node {}", step)
            }
            ReconError::InsufficientImages { found, required, .. } => format!(
                "Only {} sanitized images were found ({} required)",
                found, required
            ),
            ReconError::StageFailed { stage, details } => {
                format!("Stage '{}' failed: {}", stage, details)
            }
            ReconError::StageError { stage, source } => {
                format!("Stage '{}' failed: {}", stage, source.user_friendly_message())
            }
            other => other.to_string(),
        }
    }

    /// 依嚴重程度決定退出碼
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_failure_classification() {
        let err = ReconError::NodeFailed {
            step: "Meshing".to_string(),
            command: "aliceVision_meshing --input sfm.abc".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::External);
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert_eq!(err.exit_code(), 1);
        assert!(err.user_friendly_message().contains("Meshing"));
    }

    #[test]
    fn test_environment_errors_suggest_setup() {
        let err = ReconError::MissingEnvironment {
            variable: "ALICEVISION_BIN".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Environment);
        assert!(err.recovery_suggestion().contains("vars.sh"));
    }

    #[test]
    fn test_stage_error_keeps_inner_severity() {
        let err = ReconError::StageError {
            stage: "reconstruct".to_string(),
            source: Box::new(ReconError::InsufficientImages {
                path: "data/sanitized".to_string(),
                found: 1,
                required: 3,
            }),
        };
        assert_eq!(err.category(), ErrorCategory::Input);
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert!(err.user_friendly_message().contains("reconstruct"));
        assert!(err.recovery_suggestion().contains("3"));
    }

    #[test]
    fn test_io_error_is_critical() {
        let err: ReconError = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(err.exit_code(), 3);
    }
}
