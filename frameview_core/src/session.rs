//! Everything needed to draw one frame, owned in one place.
//!
//! A [`FrameSession`] is built per frame load and dropped on the next one.
//! Rendering borrows it immutably, so cameras can be rendered from several
//! threads at once.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::calibration::CalibrationSet;
use crate::error::FrameViewError;
use crate::frame::FrameManifest;
use crate::labels::load_labels;
use crate::oriented_box::OrientedBox;
use crate::pointcloud::{read_pcd_file, PointCloud};
use crate::projector::ProjectedPoint;
use crate::scene_pass::{BoxOverlay, PassStats, ProjectionConfig, SceneProjectionPass};

/// Which overlays a render produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Layers {
    pub points: bool,
    pub boxes: bool,
}

impl Default for Layers {
    fn default() -> Self {
        Self {
            points: true,
            boxes: true,
        }
    }
}

/// Overlays for one camera image at one display size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraOverlay {
    pub camera_id: String,
    pub width: u32,
    pub height: u32,
    pub point_radius: f32,
    /// Depth-colored points, farthest first
    pub points: Vec<ProjectedPoint>,
    pub boxes: Vec<BoxOverlay>,
    pub stats: PassStats,
}

impl CameraOverlay {
    /// Overlay with nothing to draw.
    pub fn empty(camera_id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            camera_id: camera_id.into(),
            width,
            height,
            point_radius: ProjectionConfig::default().point_radius,
            points: Vec::new(),
            boxes: Vec::new(),
            stats: PassStats::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.boxes.is_empty()
    }
}

/// Calibration, annotations and point cloud of the current frame.
#[derive(Debug, Clone, Default)]
pub struct FrameSession {
    calibrations: CalibrationSet,
    boxes: Vec<OrientedBox>,
    cloud: PointCloud,
    config: ProjectionConfig,
    layers: Layers,
}

impl FrameSession {
    pub fn new(calibrations: CalibrationSet, boxes: Vec<OrientedBox>, cloud: PointCloud) -> Self {
        Self {
            calibrations,
            boxes,
            cloud,
            config: ProjectionConfig::default(),
            layers: Layers::default(),
        }
    }

    pub fn with_config(mut self, config: ProjectionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_layers(mut self, layers: Layers) -> Self {
        self.layers = layers;
        self
    }

    /// Loads the files a manifest names. Relative paths are taken from `root`.
    ///
    /// A point cloud that cannot be read is an error. A calibration or label
    /// file that is absent or unreadable only leaves the frame without
    /// cameras or boxes.
    pub fn load(manifest: &FrameManifest, root: impl AsRef<Path>) -> Result<Self, FrameViewError> {
        let root = root.as_ref();

        let calibrations = match manifest.calibration_path() {
            Some(path) => CalibrationSet::from_file(root.join(&path)).unwrap_or_else(|e| {
                warn!(config = %path, error = %e, "calibration unavailable, no camera can be projected");
                CalibrationSet::new()
            }),
            None => {
                warn!("frame has no config directory, no camera can be projected");
                CalibrationSet::new()
            }
        };

        let boxes = match manifest.label_path() {
            Some(path) => load_labels(root.join(path)).unwrap_or_else(|e| {
                warn!(label = %path, error = %e, "label file unavailable, continuing without boxes");
                Vec::new()
            }),
            None => Vec::new(),
        };

        let cloud = match manifest.point_cloud_path() {
            Some(path) => read_pcd_file(root.join(path))?,
            None => PointCloud::default(),
        };

        info!(
            cameras = calibrations.len(),
            boxes = boxes.len(),
            points = cloud.len(),
            "frame loaded"
        );

        Ok(Self::new(calibrations, boxes, cloud))
    }

    /// Reads a manifest file and loads its frame.
    pub fn load_manifest_file(path: impl AsRef<Path>, root: impl AsRef<Path>) -> Result<Self, FrameViewError> {
        let manifest = FrameManifest::load(path)?;
        Self::load(&manifest, root)
    }

    pub fn calibrations(&self) -> &CalibrationSet {
        &self.calibrations
    }

    pub fn boxes(&self) -> &[OrientedBox] {
        &self.boxes
    }

    pub fn cloud(&self) -> &PointCloud {
        &self.cloud
    }

    pub fn config(&self) -> &ProjectionConfig {
        &self.config
    }

    pub fn layers(&self) -> Layers {
        self.layers
    }

    pub fn set_layers(&mut self, layers: Layers) {
        self.layers = layers;
    }

    /// Renders one camera, failing when it has no calibration.
    pub fn try_render_camera(&self, camera_id: &str, width: u32, height: u32) -> Result<CameraOverlay, FrameViewError> {
        let calibration = self
            .calibrations
            .get(camera_id)
            .ok_or_else(|| FrameViewError::missing_calibration(camera_id))?;
        if width == 0 || height == 0 {
            return Err(FrameViewError::invalid(format!(
                "display size {}x{} for camera {}",
                width, height, camera_id
            )));
        }

        let pass = SceneProjectionPass::new(calibration, width, height, self.config);

        let (points, stats) = if self.layers.points {
            let cloud = pass.project_cloud(self.cloud.points());
            let stats = *cloud.stats();
            (cloud.into_points(), stats)
        } else {
            (Vec::new(), PassStats::default())
        };

        let boxes = if self.layers.boxes {
            pass.project_boxes(&self.boxes)
        } else {
            Vec::new()
        };

        debug!(
            camera = camera_id,
            width,
            height,
            points = points.len(),
            boxes = boxes.len(),
            "camera rendered"
        );

        Ok(CameraOverlay {
            camera_id: camera_id.to_string(),
            width,
            height,
            point_radius: self.config.point_radius,
            points,
            boxes,
            stats,
        })
    }

    /// Renders one camera. A camera without calibration, or an unusable
    /// size, gives an empty overlay and a warning.
    pub fn render_camera(&self, camera_id: &str, width: u32, height: u32) -> CameraOverlay {
        self.try_render_camera(camera_id, width, height).unwrap_or_else(|e| {
            warn!(camera = camera_id, error = %e, "nothing to draw");
            CameraOverlay::empty(camera_id, width, height)
        })
    }

    /// Renders every calibrated camera, in id order. Cameras absent from
    /// `sizes` are drawn at their calibration resolution.
    pub fn render_all(&self, sizes: &BTreeMap<String, (u32, u32)>) -> Vec<CameraOverlay> {
        self.calibrations
            .iter()
            .map(|calibration| {
                let (width, height) = sizes
                    .get(&calibration.id)
                    .copied()
                    .unwrap_or((calibration.intrinsics.width, calibration.intrinsics.height));
                self.render_camera(&calibration.id, width, height)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{CameraCalibration, CameraExtrinsics, CameraIntrinsics};
    use crate::oriented_box::{EulerXyz, ObjectType};
    use nalgebra::{Point3, Vector3};

    fn camera(id: &str) -> CameraCalibration {
        CameraCalibration::new(
            id,
            CameraIntrinsics::pinhole(1000, 1000, 1000.0, 1000.0, 500.0, 500.0),
            CameraExtrinsics::identity(),
        )
        .unwrap()
    }

    fn sample_session() -> FrameSession {
        let calibrations: CalibrationSet = vec![camera("camera_1"), camera("camera_2")].into_iter().collect();
        let boxes = vec![OrientedBox::new(
            "1",
            ObjectType::Pedestrian,
            Point3::new(0.0, 0.0, 10.0),
            Vector3::new(0.6, 0.6, 1.8),
            EulerXyz::default(),
        )];
        let cloud: PointCloud = vec![Point3::new(0.0, 0.0, 5.0), Point3::new(0.2, 0.0, 15.0)]
            .into_iter()
            .collect();
        FrameSession::new(calibrations, boxes, cloud)
    }

    #[test]
    fn test_render_camera() {
        let session = sample_session();
        let overlay = session.render_camera("camera_1", 1000, 1000);

        assert_eq!(overlay.camera_id, "camera_1");
        assert_eq!(overlay.points.len(), 2);
        assert_eq!(overlay.points[0].depth, 15.0);
        assert_eq!(overlay.boxes.len(), 1);
        assert_eq!(overlay.boxes[0].label, "Pedestrian 1");
        assert_eq!(overlay.stats.emitted, 2);
    }

    #[test]
    fn test_missing_calibration_is_empty() {
        let session = sample_session();
        let overlay = session.render_camera("panoramic_1", 800, 600);
        assert!(overlay.is_empty());
        assert_eq!((overlay.width, overlay.height), (800, 600));

        assert!(matches!(
            session.try_render_camera("panoramic_1", 800, 600),
            Err(FrameViewError::MissingCalibration(id)) if id == "panoramic_1"
        ));
    }

    #[test]
    fn test_zero_size_is_invalid() {
        let session = sample_session();
        assert!(matches!(
            session.try_render_camera("camera_1", 0, 600),
            Err(FrameViewError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_layers() {
        let session = sample_session().with_layers(Layers {
            points: false,
            boxes: true,
        });
        let overlay = session.render_camera("camera_1", 1000, 1000);
        assert!(overlay.points.is_empty());
        assert_eq!(overlay.boxes.len(), 1);
    }

    #[test]
    fn test_render_all_uses_sizes_or_native() {
        let session = sample_session();
        let mut sizes = BTreeMap::new();
        sizes.insert("camera_2".to_string(), (500, 500));

        let overlays = session.render_all(&sizes);
        assert_eq!(overlays.len(), 2);
        assert_eq!((overlays[0].width, overlays[0].height), (1000, 1000));
        assert_eq!((overlays[1].width, overlays[1].height), (500, 500));
        // Half-size display halves every coordinate
        assert_eq!(overlays[1].points[1].x, overlays[0].points[1].x / 2.0);
    }

    #[test]
    fn test_cameras_render_in_parallel() {
        let session = sample_session();
        let overlays: Vec<CameraOverlay> = std::thread::scope(|scope| {
            let handles: Vec<_> = ["camera_1", "camera_2"]
                .into_iter()
                .map(|id| {
                    let session = &session;
                    scope.spawn(move || session.render_camera(id, 1000, 1000))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(overlays[0].points, overlays[1].points);
    }
}
