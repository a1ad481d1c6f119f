//! FrameView CLI
//!
//! Loads a frame (calibration, labels, point cloud) and writes the per-camera
//! overlays as JSON.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use frameview_core::frame::NavSlot;
use frameview_core::labels::load_labels;
use frameview_core::{
    CalibrationSet, CameraOverlay, FrameManifest, FrameSequence, FrameSession, Layers, ProjectionConfig,
};
use serde::Serialize;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "frameview")]
#[command(about = "Project LiDAR points and 3D boxes onto camera images", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the cameras of a cameras.cfg file
    Cameras {
        /// Path to cameras.cfg
        config: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Project a frame onto its camera images
    Project(ProjectArgs),

    /// List the boxes of a label file
    Boxes {
        /// Path to the label JSON
        #[arg(short, long)]
        labels: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List the frame manifests of a directory in playback order
    Frames {
        /// Directory of *.json frame manifests
        dir: PathBuf,

        /// Pager width
        #[arg(long, default_value = "10")]
        max_visible: usize,
    },
}

#[derive(Args, Debug)]
struct ProjectArgs {
    /// Frame manifest JSON
    #[arg(short, long)]
    frame: PathBuf,

    /// Directory relative manifest paths are resolved against
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Only this camera (default: every calibrated camera)
    #[arg(short, long)]
    camera: Option<String>,

    /// Display width (default: calibration width)
    #[arg(long, requires = "height")]
    width: Option<u32>,

    /// Display height (default: calibration height)
    #[arg(long, requires = "width")]
    height: Option<u32>,

    /// Write JSON here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip box overlays
    #[arg(long)]
    no_boxes: bool,

    /// Skip point cloud overlays
    #[arg(long)]
    no_points: bool,

    /// Corners that must be visible before a box is drawn
    #[arg(long, default_value = "2")]
    min_corners: usize,

    /// Also send the frame to a Rerun viewer
    #[cfg(feature = "visualization")]
    #[arg(long)]
    rerun: bool,
}

#[derive(Serialize)]
struct CameraRow<'a> {
    id: &'a str,
    width: u32,
    height: u32,
    fx: f64,
    fy: f64,
    cx: f64,
    cy: f64,
    model: &'a str,
    position: [f64; 3],
}

#[derive(Serialize)]
struct CameraListing<'a> {
    cameras: Vec<CameraRow<'a>>,
    rejected: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean JSON
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    match cli.command {
        Command::Cameras { config, json } => run_cameras(&config, json),
        Command::Project(args) => run_project(&args),
        Command::Boxes { labels, json } => run_boxes(&labels, json),
        Command::Frames { dir, max_visible } => run_frames(&dir, max_visible),
    }
}

fn run_cameras(config: &Path, json: bool) -> Result<()> {
    let set = CalibrationSet::from_file(config).with_context(|| format!("reading {}", config.display()))?;

    let cameras: Vec<CameraRow> = set
        .iter()
        .map(|c| {
            let p = c.extrinsics.position();
            CameraRow {
                id: &c.id,
                width: c.intrinsics.width,
                height: c.intrinsics.height,
                fx: c.intrinsics.fx,
                fy: c.intrinsics.fy,
                cx: c.intrinsics.cx,
                cy: c.intrinsics.cy,
                model: &c.intrinsics.model,
                position: [p.x, p.y, p.z],
            }
        })
        .collect();
    let rejected: Vec<String> = set.rejected().iter().map(ToString::to_string).collect();

    if json {
        let listing = CameraListing { cameras, rejected };
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("{:<14} {:>11} {:>9} {:>9} {:>8} {:>8}  model", "camera", "size", "fx", "fy", "cx", "cy");
    for row in &cameras {
        println!(
            "{:<14} {:>11} {:>9.2} {:>9.2} {:>8.2} {:>8.2}  {}",
            row.id,
            format!("{}x{}", row.width, row.height),
            row.fx,
            row.fy,
            row.cx,
            row.cy,
            row.model
        );
    }
    for line in &rejected {
        println!("skipped: {}", line);
    }
    Ok(())
}

fn render(args: &ProjectArgs, session: &FrameSession) -> Result<Vec<CameraOverlay>> {
    let overlays = match (&args.camera, args.width.zip(args.height)) {
        (Some(id), size) => {
            let Some(calibration) = session.calibrations().get(id) else {
                bail!("no calibration for camera {}", id);
            };
            let (width, height) = size.unwrap_or((calibration.intrinsics.width, calibration.intrinsics.height));
            vec![session.try_render_camera(id, width, height)?]
        }
        (None, Some(size)) => {
            let sizes: BTreeMap<String, (u32, u32)> = session.calibrations().ids().map(|id| (id.to_string(), size)).collect();
            session.render_all(&sizes)
        }
        (None, None) => session.render_all(&BTreeMap::new()),
    };
    Ok(overlays)
}

fn run_project(args: &ProjectArgs) -> Result<()> {
    let manifest = FrameManifest::load(&args.frame).with_context(|| format!("reading {}", args.frame.display()))?;
    debug!(?manifest, "manifest loaded");

    let config = ProjectionConfig {
        min_visible_corners: args.min_corners,
        ..ProjectionConfig::default()
    };
    let layers = Layers {
        points: !args.no_points,
        boxes: !args.no_boxes,
    };
    let session = FrameSession::load(&manifest, &args.root)
        .with_context(|| format!("loading frame {}", args.frame.display()))?
        .with_config(config)
        .with_layers(layers);

    if session.calibrations().is_empty() {
        warn!("no usable camera calibration in this frame");
    }

    let overlays = render(args, &session)?;
    for overlay in &overlays {
        info!(
            camera = %overlay.camera_id,
            points = overlay.points.len(),
            boxes = overlay.boxes.len(),
            "overlay ready"
        );
    }

    #[cfg(feature = "visualization")]
    if args.rerun {
        let visualizer = frameview_core::RerunVisualizer::new("frameview")
            .map_err(|e| anyhow::anyhow!("starting rerun: {}", e))?;
        visualizer.log_range_rings().map_err(|e| anyhow::anyhow!("{}", e))?;
        visualizer
            .log_frame(&session, &overlays)
            .map_err(|e| anyhow::anyhow!("{}", e))?;
    }

    write_json(&overlays, args.output.as_deref())
}

fn write_json<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer.flush()?;
            info!("Wrote {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

fn run_boxes(labels: &Path, json: bool) -> Result<()> {
    let boxes = load_labels(labels).with_context(|| format!("reading {}", labels.display()))?;

    if json {
        return write_json(&boxes, None);
    }

    println!("{:<20} {:>28} {:>22} {:>8}", "label", "position", "scale", "yaw");
    for b in &boxes {
        println!(
            "{:<20} {:>28} {:>22} {:>8.3}",
            b.label(),
            format!("({:.2}, {:.2}, {:.2})", b.position.x, b.position.y, b.position.z),
            format!("{:.2} x {:.2} x {:.2}", b.scale.x, b.scale.y, b.scale.z),
            b.rotation.z
        );
    }
    Ok(())
}

fn run_frames(dir: &Path, max_visible: usize) -> Result<()> {
    let sequence = FrameSequence::from_dir(dir).with_context(|| format!("listing {}", dir.display()))?;
    if sequence.is_empty() {
        bail!("no frame manifests in {}", dir.display());
    }

    for (i, path) in sequence.files().iter().enumerate() {
        println!("{:>5}  {}", i + 1, path.display());
    }

    let pager: Vec<String> = sequence
        .navigation_slots(max_visible)
        .into_iter()
        .map(|slot| match slot {
            NavSlot::Frame(i) => (i + 1).to_string(),
            NavSlot::Ellipsis => "...".to_string(),
        })
        .collect();
    println!("pages: {}", pager.join(" "));
    Ok(())
}
