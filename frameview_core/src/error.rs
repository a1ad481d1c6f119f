//! Error types for the FrameView core.

use thiserror::Error;

use crate::calibration::ParseError;
use crate::pointcloud::PcdError;

/// Errors surfaced to the host while assembling or rendering a frame.
///
/// Projection itself never fails: a point or box that cannot be drawn is
/// simply absent from the result. These variants describe conditions the
/// host may want to report.
#[derive(Debug, Error)]
pub enum FrameViewError {
    /// The requested camera has no calibration in the current set
    #[error("No calibration for camera: {0}")]
    MissingCalibration(String),

    /// Nothing in front of the camera (empty depth range)
    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// Non-finite coordinates or unusable sizes
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Calibration text could not be tokenized
    #[error("Calibration error: {0}")]
    Calibration(#[from] ParseError),

    /// Point cloud file could not be read
    #[error("Point cloud error: {0}")]
    PointCloud(#[from] PcdError),

    /// Frame manifest or label file is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File access failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameViewError {
    /// Creates a missing-calibration error.
    pub fn missing_calibration(camera_id: impl Into<String>) -> Self {
        Self::MissingCalibration(camera_id.into())
    }

    /// Creates an invalid-input error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
