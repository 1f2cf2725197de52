use thiserror::Error;

/// Errors surfaced by the capture engine.
///
/// Backend and platform failures are translated into one of these kinds at
/// the operation boundary; raw platform errors never cross it.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("Camera device is unavailable")]
    DeviceUnavailable,
    #[error("Failed to configure camera session: {0}")]
    ConfigurationFailed(String),
    #[error("Video recording already in progress")]
    AlreadyRecording,
    #[error("No active recording")]
    NotRecording,
    #[error("Failed to set up recording writer: {0}")]
    WriterSetupFailed(String),
    #[error("Cannot switch camera while recording")]
    SwitchNotSupportedWhileRecording,
    #[error("Capture error: {0}")]
    CaptureFailed(String),
    #[error("Encoding error: {0}")]
    EncodingFailed(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Operation timed out: {0}")]
    Timeout(String),
    #[error("Execution context has terminated")]
    ContextTerminated,
}

impl CameraError {
    pub fn configuration(message: impl Into<String>) -> Self {
        CameraError::ConfigurationFailed(message.into())
    }

    pub fn writer_setup(message: impl Into<String>) -> Self {
        CameraError::WriterSetupFailed(message.into())
    }

    pub fn capture(message: impl Into<String>) -> Self {
        CameraError::CaptureFailed(message.into())
    }

    pub fn encoding(message: impl Into<String>) -> Self {
        CameraError::EncodingFailed(message.into())
    }

    /// Stable machine-readable name of the error kind.
    pub fn kind_name(&self) -> &'static str {
        match self {
            CameraError::DeviceUnavailable => "DEVICE_UNAVAILABLE",
            CameraError::ConfigurationFailed(_) => "CONFIGURATION_FAILED",
            CameraError::AlreadyRecording => "ALREADY_RECORDING",
            CameraError::NotRecording => "NOT_RECORDING",
            CameraError::WriterSetupFailed(_) => "WRITER_SETUP_FAILED",
            CameraError::SwitchNotSupportedWhileRecording => {
                "SWITCH_NOT_SUPPORTED_WHILE_RECORDING"
            }
            CameraError::CaptureFailed(_) => "CAPTURE_FAILED",
            CameraError::EncodingFailed(_) => "ENCODING_FAILED",
            CameraError::InvalidArgument(_) => "INVALID_ARGUMENT",
            CameraError::Io(_) => "IO_ERROR",
            CameraError::Timeout(_) => "TIMEOUT",
            CameraError::ContextTerminated => "CONTEXT_TERMINATED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            CameraError::DeviceUnavailable.to_string(),
            "Camera device is unavailable"
        );
        assert_eq!(
            CameraError::configuration("no video connection").to_string(),
            "Failed to configure camera session: no video connection"
        );
        assert_eq!(CameraError::NotRecording.to_string(), "No active recording");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: CameraError = io.into();
        assert_eq!(err.kind_name(), "IO_ERROR");
        assert!(err.to_string().contains("denied"));
    }
}
