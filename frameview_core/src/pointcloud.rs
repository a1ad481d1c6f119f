//! LiDAR point clouds and a reader for PCD files.
//!
//! Only the `x y z` fields are kept. `DATA ascii` and `DATA binary` are
//! supported; `binary_compressed` is rejected.

use std::collections::HashMap;
use std::f64::consts::TAU;
use std::io::{BufRead, Read};
use std::path::Path;

use nalgebra::Point3;
use tracing::debug;

use crate::color::{HueGradient, Rgb};

const MAX_POINT_STEP: usize = 1024;
const MAX_POINTS: usize = 50_000_000;
/// Reserved up front; larger clouds grow as the body is read
const INITIAL_CAPACITY: usize = 1 << 20;

/// Errors while reading a PCD file.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PcdError {
    /// Failed to read the file or stream
    #[error("Failed to read PCD data: {0}")]
    Io(#[from] std::io::Error),

    /// Header is incomplete or inconsistent
    #[error("Malformed PCD header: {0}")]
    MalformedHeader(String),

    /// Header is valid but uses something this reader does not handle
    #[error("Unsupported PCD feature: {0}")]
    Unsupported(String),

    /// A data line in an ascii body could not be read
    #[error("Bad PCD data at point {index}: {reason}")]
    BadPoint { index: usize, reason: String },

    /// Fewer points than the header announced
    #[error("PCD body ends after {found} of {expected} points")]
    Truncated { expected: usize, found: usize },

    /// File name does not end in `.pcd`
    #[error("Invalid PCD file extension. Got: {0}")]
    InvalidFileExtension(String),
}

fn malformed(msg: impl Into<String>) -> PcdError {
    PcdError::MalformedHeader(msg.into())
}

// ============================================================================
// POINT CLOUD
// ============================================================================

/// Points in the LiDAR (sensor) frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<Point3<f64>>,
}

impl PointCloud {
    pub fn new(points: Vec<Point3<f64>>) -> Self {
        Self { points }
    }

    /// Builds a cloud from an interleaved `x, y, z, x, y, z, ...` buffer.
    /// A trailing partial triple is ignored.
    pub fn from_flat(xyz: &[f32]) -> Self {
        xyz.chunks_exact(3)
            .map(|c| Point3::new(c[0] as f64, c[1] as f64, c[2] as f64))
            .collect()
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// `[min, max]` of z over finite points.
    pub fn z_range(&self) -> Option<(f64, f64)> {
        self.points
            .iter()
            .map(|p| p.z)
            .filter(|z| z.is_finite())
            .fold(None, |range, z| match range {
                None => Some((z, z)),
                Some((lo, hi)) => Some((f64::min(lo, z), f64::max(hi, z))),
            })
    }

    /// One color per point by height, low points blue and high points red.
    pub fn height_colors(&self) -> Vec<Rgb> {
        self.colors_by_height(HueGradient::HEIGHT)
    }

    /// One color per point, `gradient` spread over the z range.
    pub fn colors_by_height(&self, gradient: HueGradient) -> Vec<Rgb> {
        let (lo, hi) = self.z_range().unwrap_or((0.0, 0.0));
        self.points.iter().map(|p| gradient.map(p.z, lo, hi)).collect()
    }
}

impl FromIterator<Point3<f64>> for PointCloud {
    fn from_iter<I: IntoIterator<Item = Point3<f64>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Concentric ground circles around the sensor, one every `step` meters up
/// to `max_radius`, each sampled with `segments` points and closed.
pub fn range_rings(step: f64, max_radius: f64, segments: usize) -> Vec<Vec<Point3<f64>>> {
    if step.is_nan() || step <= 0.0 || segments < 3 {
        return Vec::new();
    }

    let count = (max_radius / step).floor() as usize;
    (1..=count)
        .map(|i| {
            let r = step * i as f64;
            (0..=segments)
                .map(|s| {
                    let a = TAU * s as f64 / segments as f64;
                    Point3::new(r * a.cos(), r * a.sin(), 0.0)
                })
                .collect()
        })
        .collect()
}

// ============================================================================
// PCD READER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DataFormat {
    Ascii,
    Binary,
}

#[derive(Debug)]
struct PcdField {
    /// Byte offset within a binary record
    offset: usize,
    /// Token index within an ascii line
    column: usize,
    size: usize,
    count: usize,
    kind: char,
}

#[derive(Debug)]
struct PcdLayout {
    fields: HashMap<String, PcdField>,
    point_step: usize,
    columns: usize,
    num_points: usize,
    format: DataFormat,
}

impl PcdLayout {
    fn xyz(&self) -> Result<[&PcdField; 3], PcdError> {
        let get = |name: &str| {
            self.fields
                .get(name)
                .ok_or_else(|| PcdError::Unsupported(format!("no '{}' field", name)))
        };
        Ok([get("x")?, get("y")?, get("z")?])
    }

    fn initial_capacity(&self) -> usize {
        self.num_points.min(INITIAL_CAPACITY)
    }
}

fn parse_list<T: std::str::FromStr>(key: &str, values: std::str::SplitWhitespace<'_>) -> Result<Vec<T>, PcdError> {
    values
        .map(|v| v.parse::<T>().map_err(|_| malformed(format!("bad {} value '{}'", key, v))))
        .collect()
}

fn parse_pcd_layout<R: BufRead>(reader: &mut R) -> Result<PcdLayout, PcdError> {
    let mut names: Vec<String> = Vec::new();
    let mut sizes: Vec<usize> = Vec::new();
    let mut types: Vec<char> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();
    let mut width: Option<usize> = None;
    let mut height: Option<usize> = None;
    let mut points: Option<usize> = None;

    let format = loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(malformed("no DATA line"));
        }
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut it = line.split_whitespace();
        match it.next() {
            Some("FIELDS") => names = it.map(String::from).collect(),
            Some("SIZE") => sizes = parse_list("SIZE", it)?,
            Some("COUNT") => counts = parse_list("COUNT", it)?,
            Some("TYPE") => {
                types = it
                    .map(|v| v.chars().next().ok_or_else(|| malformed("empty TYPE")))
                    .collect::<Result<_, _>>()?
            }
            Some("WIDTH") => width = parse_list::<usize>("WIDTH", it)?.first().copied(),
            Some("HEIGHT") => height = parse_list::<usize>("HEIGHT", it)?.first().copied(),
            Some("POINTS") => points = parse_list::<usize>("POINTS", it)?.first().copied(),
            Some("DATA") => match it.next() {
                Some("ascii") => break DataFormat::Ascii,
                Some("binary") => break DataFormat::Binary,
                Some(other) => return Err(PcdError::Unsupported(format!("DATA {}", other))),
                None => return Err(malformed("DATA without a format")),
            },
            // VERSION, VIEWPOINT
            _ => {}
        }
    };

    if names.is_empty() {
        return Err(malformed("no FIELDS"));
    }
    if sizes.len() != names.len() || types.len() != names.len() || (!counts.is_empty() && counts.len() != names.len()) {
        return Err(malformed("FIELDS, SIZE, TYPE and COUNT lengths differ"));
    }

    let num_points = match (points, width, height) {
        (Some(n), _, _) => n,
        (None, Some(w), h) => w.checked_mul(h.unwrap_or(1)).ok_or_else(|| malformed("WIDTH x HEIGHT overflows"))?,
        (None, None, _) => return Err(malformed("neither POINTS nor WIDTH")),
    };
    if num_points > MAX_POINTS {
        return Err(malformed(format!("{} points exceeds the limit", num_points)));
    }

    let mut fields = HashMap::new();
    let mut offset = 0usize;
    let mut column = 0usize;
    for (i, name) in names.iter().enumerate() {
        let count = counts.get(i).copied().unwrap_or(1);
        let field = PcdField {
            offset,
            column,
            size: sizes[i],
            count,
            kind: types[i],
        };

        offset = sizes[i]
            .checked_mul(count)
            .and_then(|bytes| offset.checked_add(bytes))
            .ok_or_else(|| malformed("point size overflows"))?;
        column += count;

        if offset > MAX_POINT_STEP {
            return Err(malformed("point record too large"));
        }
        if fields.insert(name.clone(), field).is_some() {
            return Err(malformed(format!("duplicate field '{}'", name)));
        }
    }

    let layout = PcdLayout {
        fields,
        point_step: offset,
        columns: column,
        num_points,
        format,
    };

    for field in layout.xyz()? {
        if !(field.kind == 'F' && field.size == 4 && field.count == 1) {
            return Err(PcdError::Unsupported("x, y and z must be 4-byte floats".to_string()));
        }
    }

    Ok(layout)
}

#[inline]
fn read_f32(buf: &[u8], offset: usize) -> f32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    f32::from_le_bytes(bytes)
}

fn read_binary_body<R: Read>(reader: &mut R, layout: &PcdLayout) -> Result<Vec<Point3<f64>>, PcdError> {
    let [fx, fy, fz] = layout.xyz()?;
    let mut record = vec![0u8; layout.point_step];
    let mut points = Vec::with_capacity(layout.initial_capacity());

    for found in 0..layout.num_points {
        if let Err(e) = reader.read_exact(&mut record) {
            return Err(match e.kind() {
                std::io::ErrorKind::UnexpectedEof => PcdError::Truncated {
                    expected: layout.num_points,
                    found,
                },
                _ => PcdError::Io(e),
            });
        }
        points.push(Point3::new(
            read_f32(&record, fx.offset) as f64,
            read_f32(&record, fy.offset) as f64,
            read_f32(&record, fz.offset) as f64,
        ));
    }

    Ok(points)
}

fn read_ascii_body<R: BufRead>(reader: &mut R, layout: &PcdLayout) -> Result<Vec<Point3<f64>>, PcdError> {
    let [fx, fy, fz] = layout.xyz()?;
    let mut points = Vec::with_capacity(layout.initial_capacity());
    let mut line = String::new();

    while points.len() < layout.num_points {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(PcdError::Truncated {
                expected: layout.num_points,
                found: points.len(),
            });
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        let index = points.len();
        if tokens.len() < layout.columns {
            return Err(PcdError::BadPoint {
                index,
                reason: format!("{} values, expected {}", tokens.len(), layout.columns),
            });
        }

        let value = |field: &PcdField| {
            let raw = tokens[field.column];
            raw.parse::<f64>().map_err(|_| PcdError::BadPoint {
                index,
                reason: format!("'{}' is not a number", raw),
            })
        };
        points.push(Point3::new(value(fx)?, value(fy)?, value(fz)?));
    }

    Ok(points)
}

/// Reads a PCD stream. Points with a NaN or infinite coordinate are dropped.
pub fn read_pcd<R: BufRead>(mut reader: R) -> Result<PointCloud, PcdError> {
    let layout = parse_pcd_layout(&mut reader)?;

    let raw = match layout.format {
        DataFormat::Binary => read_binary_body(&mut reader, &layout)?,
        DataFormat::Ascii => read_ascii_body(&mut reader, &layout)?,
    };

    let total = raw.len();
    let points: Vec<Point3<f64>> = raw.into_iter().filter(|p| p.iter().all(|v| v.is_finite())).collect();
    debug!(
        points = points.len(),
        dropped = total - points.len(),
        format = ?layout.format,
        "read PCD"
    );

    Ok(PointCloud::new(points))
}

/// Reads a `.pcd` file.
pub fn read_pcd_file(path: impl AsRef<Path>) -> Result<PointCloud, PcdError> {
    let path = path.as_ref();
    match path.extension() {
        Some(ext) if ext == "pcd" => {}
        Some(ext) => return Err(PcdError::InvalidFileExtension(ext.to_string_lossy().to_string())),
        None => return Err(PcdError::InvalidFileExtension(String::new())),
    }

    let file = std::fs::File::open(path)?;
    read_pcd(std::io::BufReader::new(file))
}
