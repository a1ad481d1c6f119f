//! Frame manifests, directory-backed frame sequences and the per-image view
//! state the host keeps between renders.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::FrameViewError;

/// Image keys a manifest may carry, in display order.
pub const CAMERA_KEYS: [&str; 11] = [
    "camera_1",
    "camera_2",
    "camera_3",
    "camera_4",
    "camera_5",
    "camera_6",
    "panoramic_1",
    "panoramic_2",
    "panoramic_3",
    "panoramic_4",
    "traffic_2",
];

/// Name of the calibration file inside the `config` directory.
pub const CALIBRATION_FILE: &str = "cameras.cfg";

/// Joins two path fragments with exactly one `/` between them.
pub fn join_paths(base: &str, relative: &str) -> String {
    match (base.ends_with('/'), relative.starts_with('/')) {
        (true, true) => format!("{}{}", base, &relative[1..]),
        (false, false) => format!("{}/{}", base, relative),
        _ => format!("{}{}", base, relative),
    }
}

// ============================================================================
// MANIFEST
// ============================================================================

#[derive(Deserialize)]
struct ManifestFile {
    frame: FrameManifest,
}

/// Paths that make up one frame.
///
/// After [`FrameManifest::parse`] every path already has `parent_dir`
/// prepended when one was given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_dir: Option<String>,
    /// Directory holding `cameras.cfg`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lidar_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undistort_lidar_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Segmentation overlays keyed by camera id
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub seg_result: BTreeMap<String, String>,
    /// Camera images and any other keys
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl FrameManifest {
    /// Parses `{ "frame": { ... } }` and applies `parent_dir`.
    pub fn parse(json: &str) -> Result<Self, FrameViewError> {
        let file: ManifestFile = serde_json::from_str(json)?;
        Ok(file.frame.resolved())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, FrameViewError> {
        let json = std::fs::read_to_string(path)?;
        Self::parse(&json)
    }

    fn resolved(mut self) -> Self {
        let Some(parent) = self.parent_dir.clone().filter(|p| !p.is_empty()) else {
            return self;
        };
        let join = |path: &mut String| *path = join_paths(&parent, path);

        for path in [
            &mut self.config,
            &mut self.lidar_path,
            &mut self.undistort_lidar_path,
            &mut self.label,
        ]
        .into_iter()
        .flatten()
        {
            join(path);
        }

        for key in CAMERA_KEYS {
            if let Some(serde_json::Value::String(path)) = self.extra.get_mut(key) {
                join(path);
            }
        }

        self.seg_result.values_mut().for_each(join);

        debug!(parent = %parent, "frame paths resolved");
        self
    }

    /// `<config>/cameras.cfg`
    pub fn calibration_path(&self) -> Option<String> {
        self.config.as_deref().map(|dir| join_paths(dir, CALIBRATION_FILE))
    }

    /// The undistorted cloud when present, otherwise the raw one.
    pub fn point_cloud_path(&self) -> Option<&str> {
        self.undistort_lidar_path.as_deref().or(self.lidar_path.as_deref())
    }

    pub fn label_path(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Camera images as `(camera id, path)` in [`CAMERA_KEYS`] order.
    pub fn images(&self) -> Vec<(&'static str, &str)> {
        CAMERA_KEYS
            .iter()
            .filter_map(|&key| self.image(key).map(|path| (key, path)))
            .collect()
    }

    pub fn image(&self, camera_id: &str) -> Option<&str> {
        match self.extra.get(camera_id) {
            Some(serde_json::Value::String(path)) if !path.is_empty() => Some(path),
            _ => None,
        }
    }

    pub fn segmentation(&self, camera_id: &str) -> Option<&str> {
        self.seg_result.get(camera_id).map(String::as_str)
    }
}

// ============================================================================
// SEQUENCE
// ============================================================================

/// Entry of the frame pager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavSlot {
    Frame(usize),
    Ellipsis,
}

/// Manifest files of a directory, sorted by name, with a cursor.
#[derive(Debug, Clone, Default)]
pub struct FrameSequence {
    files: Vec<PathBuf>,
    index: usize,
}

impl FrameSequence {
    /// Sorts `files` by file name; the cursor starts at the first.
    pub fn new(mut files: Vec<PathBuf>) -> Self {
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Self { files, index: 0 }
    }

    /// Every `*.json` file directly inside `dir`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, FrameViewError> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        debug!(frames = files.len(), "frame sequence listed");
        Ok(Self::new(files))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn current(&self) -> Option<&Path> {
        self.files.get(self.index).map(PathBuf::as_path)
    }

    /// Moves to `index` if it exists. Out-of-range indices are ignored.
    pub fn set_index(&mut self, index: usize) -> Option<&Path> {
        if index < self.files.len() {
            self.index = index;
            self.current()
        } else {
            None
        }
    }

    /// Advances one frame; `None` (cursor unchanged) at the last frame.
    pub fn next(&mut self) -> Option<&Path> {
        self.set_index(self.index + 1)
    }

    /// Steps back one frame; `None` (cursor unchanged) at the first frame.
    pub fn previous(&mut self) -> Option<&Path> {
        let index = self.index.checked_sub(1)?;
        self.set_index(index)
    }

    /// `"name (3/10)"` for the current frame.
    pub fn position_label(&self) -> Option<String> {
        let name = self.current()?.file_name()?.to_string_lossy().into_owned();
        Some(format!("{} ({}/{})", name, self.index + 1, self.files.len()))
    }

    /// Pager entries: every frame when they fit in `max_visible`, otherwise
    /// the first and last few around an ellipsis.
    pub fn navigation_slots(&self, max_visible: usize) -> Vec<NavSlot> {
        let total = self.files.len();
        if total <= max_visible {
            return (0..total).map(NavSlot::Frame).collect();
        }

        let half = max_visible.saturating_sub(2) / 2;
        (0..half)
            .map(NavSlot::Frame)
            .chain(std::iter::once(NavSlot::Ellipsis))
            .chain((total - half..total).map(NavSlot::Frame))
            .collect()
    }
}

// ============================================================================
// VIEW STATE
// ============================================================================

/// What a camera panel currently shows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewSource<'a, P> {
    Original(&'a str),
    Projected(&'a P),
}

/// Per-image state: the untouched source and the latest projection.
///
/// The original source is never overwritten, so turning projection off
/// always restores the real image.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameViewState<P> {
    original: String,
    projected: Option<P>,
    show_projected: bool,
}

impl<P> FrameViewState<P> {
    pub fn new(original: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            projected: None,
            show_projected: true,
        }
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn projected(&self) -> Option<&P> {
        self.projected.as_ref()
    }

    /// Stores a new projection, returning the previous one.
    pub fn set_projected(&mut self, projected: P) -> Option<P> {
        self.projected.replace(projected)
    }

    pub fn clear_projected(&mut self) -> Option<P> {
        self.projected.take()
    }

    pub fn shows_projected(&self) -> bool {
        self.show_projected
    }

    /// Chooses between the projected view and the original.
    pub fn set_show_projected(&mut self, show: bool) {
        self.show_projected = show;
    }

    /// Flips the choice and returns the new setting.
    pub fn toggle(&mut self) -> bool {
        self.show_projected = !self.show_projected;
        self.show_projected
    }

    /// The projection when enabled and available, otherwise the original.
    pub fn current(&self) -> ViewSource<'_, P> {
        match (&self.projected, self.show_projected) {
            (Some(p), true) => ViewSource::Projected(p),
            _ => ViewSource::Original(&self.original),
        }
    }
}
