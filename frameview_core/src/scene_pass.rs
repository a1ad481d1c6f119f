//! Projection passes over a whole frame for one camera: the point cloud
//! (depth colored, painter ordered) and the annotated boxes (wireframes).

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::calibration::CameraCalibration;
use crate::color::{HueGradient, Rgb};
use crate::error::FrameViewError;
use crate::oriented_box::{OrientedBox, BOX_EDGES};
use crate::projector::{ProjectedPoint, Projector, Rejection};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Tuning for projection passes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    /// Corners that must project before a box is drawn at all
    pub min_visible_corners: usize,
    /// Hue of the nearest point, degrees
    pub near_hue: f64,
    /// Hue of the farthest point, degrees
    pub far_hue: f64,
    /// Suggested dot radius for the render sink, display pixels
    pub point_radius: f32,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            min_visible_corners: 2,
            near_hue: 0.0,
            far_hue: 240.0,
            point_radius: 2.0,
        }
    }
}

impl ProjectionConfig {
    pub fn depth_gradient(&self) -> HueGradient {
        HueGradient::new(self.near_hue, self.far_hue)
    }
}

/// Counters for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassStats {
    pub input: usize,
    pub non_finite: usize,
    pub behind_camera: usize,
    pub out_of_frame: usize,
    pub emitted: usize,
}

impl PassStats {
    fn reject(&mut self, reason: Rejection) {
        match reason {
            Rejection::NonFinite => self.non_finite += 1,
            Rejection::BehindCamera => self.behind_camera += 1,
            Rejection::OutOfFrame => self.out_of_frame += 1,
        }
    }
}

// ============================================================================
// OUTPUTS
// ============================================================================

/// Depth-colored points sorted far to near.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CloudProjection {
    points: Vec<ProjectedPoint>,
    depth_range: Option<(f64, f64)>,
    stats: PassStats,
}

impl CloudProjection {
    /// Points in draw order (farthest first).
    pub fn points(&self) -> &[ProjectedPoint] {
        &self.points
    }

    pub fn into_points(self) -> Vec<ProjectedPoint> {
        self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// `[min, max]` camera depth over points in front of the camera,
    /// including those that fall outside the image.
    pub fn depth_range(&self) -> Option<(f64, f64)> {
        self.depth_range
    }

    pub fn stats(&self) -> &PassStats {
        &self.stats
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ProjectedPoint> {
        self.points.iter()
    }

    /// Fails when nothing was in front of the camera.
    pub fn ensure_visible(&self) -> Result<(), FrameViewError> {
        match self.depth_range {
            Some(_) => Ok(()),
            None => Err(FrameViewError::DegenerateGeometry(format!(
                "none of {} points is in front of the camera",
                self.stats.input
            ))),
        }
    }
}

impl IntoIterator for CloudProjection {
    type Item = ProjectedPoint;
    type IntoIter = std::vec::IntoIter<ProjectedPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.into_iter()
    }
}

impl<'a> IntoIterator for &'a CloudProjection {
    type Item = &'a ProjectedPoint;
    type IntoIter = std::slice::Iter<'a, ProjectedPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

/// A box wireframe ready to draw.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxOverlay {
    pub object_id: String,
    /// `"{type} {id}"`
    pub label: String,
    pub color: Rgb,
    /// Only edges whose two corners both projected
    pub edges: Vec<(ProjectedPoint, ProjectedPoint)>,
    /// Topmost projected corner (minimum `y`)
    pub label_anchor: Option<ProjectedPoint>,
    pub visible_corners: usize,
}

// ============================================================================
// PASS
// ============================================================================

/// Both projection passes for one camera at one display size.
#[derive(Debug, Clone, Copy)]
pub struct SceneProjectionPass<'a> {
    projector: Projector<'a>,
    config: ProjectionConfig,
}

impl<'a> SceneProjectionPass<'a> {
    pub fn new(calibration: &'a CameraCalibration, width: u32, height: u32, config: ProjectionConfig) -> Self {
        Self {
            projector: Projector::new(calibration, width, height),
            config,
        }
    }

    pub fn projector(&self) -> &Projector<'a> {
        &self.projector
    }

    pub fn config(&self) -> &ProjectionConfig {
        &self.config
    }

    /// Projects a sensor-frame point cloud.
    ///
    /// The depth range is taken over every finite point in front of the
    /// camera before any bounds test, so colors stay stable while the view
    /// is resized.
    pub fn project_cloud(&self, points: &[Point3<f64>]) -> CloudProjection {
        let mut stats = PassStats {
            input: points.len(),
            ..PassStats::default()
        };

        // Pass 1: camera-space points and their depth range
        let mut in_front = Vec::with_capacity(points.len());
        let mut min_z = f64::INFINITY;
        let mut max_z = f64::NEG_INFINITY;
        for point in points {
            if !point.iter().all(|v| v.is_finite()) {
                stats.reject(Rejection::NonFinite);
                continue;
            }
            let camera = self.projector.to_camera(point);
            if !camera.z.is_finite() {
                stats.reject(Rejection::NonFinite);
                continue;
            }
            if camera.z <= 0.0 {
                stats.reject(Rejection::BehindCamera);
                continue;
            }
            min_z = min_z.min(camera.z);
            max_z = max_z.max(camera.z);
            in_front.push(camera);
        }

        if in_front.is_empty() {
            debug!(input = stats.input, "no points in front of the camera");
            return CloudProjection {
                points: Vec::new(),
                depth_range: None,
                stats,
            };
        }

        // Pass 2: project, color by normalized depth
        let gradient = self.config.depth_gradient();
        let mut projected = Vec::with_capacity(in_front.len());
        for camera in &in_front {
            match self.projector.classify_camera(camera) {
                Ok(p) => projected.push(p.with_color(gradient.map(p.depth, min_z, max_z))),
                Err(reason) => stats.reject(reason),
            }
        }

        // Painter's order: far points first so near ones draw on top
        projected.sort_by(|a, b| b.depth.total_cmp(&a.depth));
        stats.emitted = projected.len();

        debug!(
            input = stats.input,
            emitted = stats.emitted,
            behind = stats.behind_camera,
            out_of_frame = stats.out_of_frame,
            min_z,
            max_z,
            "point cloud projected"
        );

        CloudProjection {
            points: projected,
            depth_range: Some((min_z, max_z)),
            stats,
        }
    }

    /// Projects one box, `None` when too few corners are visible.
    pub fn project_box(&self, object: &OrientedBox) -> Option<BoxOverlay> {
        if !object.is_finite() {
            return None;
        }

        let corners = object.corners().map(|corner| self.projector.project(&corner));
        let visible_corners = corners.iter().flatten().count();
        if visible_corners == 0 || visible_corners < self.config.min_visible_corners {
            return None;
        }

        let edges = BOX_EDGES
            .iter()
            .filter_map(|&(i, j)| Some((corners[i]?, corners[j]?)))
            .collect();

        let label_anchor = corners
            .iter()
            .flatten()
            .copied()
            .min_by(|a, b| a.y.total_cmp(&b.y));

        Some(BoxOverlay {
            object_id: object.object_id.clone(),
            label: object.label(),
            color: object.color(),
            edges,
            label_anchor,
            visible_corners,
        })
    }

    /// Projects every box, keeping the input order.
    pub fn project_boxes(&self, boxes: &[OrientedBox]) -> Vec<BoxOverlay> {
        let overlays: Vec<BoxOverlay> = boxes.iter().filter_map(|b| self.project_box(b)).collect();
        debug!(input = boxes.len(), drawn = overlays.len(), "boxes projected");
        overlays
    }
}

/// Projects a point cloud with the default configuration.
pub fn project_cloud(
    points: &[Point3<f64>],
    calibration: &CameraCalibration,
    width: u32,
    height: u32,
) -> CloudProjection {
    SceneProjectionPass::new(calibration, width, height, ProjectionConfig::default()).project_cloud(points)
}

/// Projects boxes with the default configuration.
pub fn project_boxes(
    boxes: &[OrientedBox],
    calibration: &CameraCalibration,
    width: u32,
    height: u32,
) -> Vec<BoxOverlay> {
    SceneProjectionPass::new(calibration, width, height, ProjectionConfig::default()).project_boxes(boxes)
}
