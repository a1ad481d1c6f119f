//! FrameView Core - LiDAR/camera projection engine for annotated frames
//!
//! Draws what the LiDAR saw onto each camera image:
//! 1. **Calibration**: `cameras.cfg` blocks become camera poses with a cached
//!    sensor-to-camera inverse
//! 2. **Projection**: pinhole projection with depth culling, bounds testing and
//!    intrinsics rescaled to the display size
//! 3. **Overlays**: depth-colored point clouds and box wireframes per camera

pub mod calibration;
pub mod color;
pub mod error;
pub mod frame;
pub mod labels;
pub mod oriented_box;
pub mod pointcloud;
pub mod projector;
pub mod scene_pass;
pub mod session;

#[cfg(feature = "visualization")]
pub mod visualization;

// Re-export key types for convenience
pub use calibration::{BlockError, CalibrationSet, CameraCalibration, CameraExtrinsics, CameraIntrinsics, ParseError};
pub use color::{HueGradient, Rgb};
pub use error::FrameViewError;
pub use frame::{FrameManifest, FrameSequence, FrameViewState};
pub use oriented_box::{EulerXyz, ObjectType, OrientedBox, BOX_EDGES};
pub use pointcloud::{PcdError, PointCloud};
pub use projector::{project, ProjectedPoint, Projector, Rejection};
pub use scene_pass::{
    project_boxes, project_cloud, BoxOverlay, CloudProjection, PassStats, ProjectionConfig, SceneProjectionPass,
};
pub use session::{CameraOverlay, FrameSession, Layers};

#[cfg(feature = "visualization")]
pub use visualization::RerunVisualizer;
