//! Rig Round-Trip Example
//!
//! Loads one or more camera YAML files into a rig, samples a pixel grid in
//! every camera and reports how accurately each pixel survives an
//! unproject/project round trip.
//!
//! Usage:
//! ```bash
//! cargo run --example rig_round_trip -- \
//!   --camera samples/rad_tan.yaml \
//!   --camera samples/equidistant.yaml \
//!   --num-points 500
//! ```

use camera_rig_tools::frame::VisualFrame;
use camera_rig_tools::id::{FrameId, NCamerasId};
use camera_rig_tools::{geometry, util, Camera, NCameras};
use clap::Parser;
use flexi_logger::{colored_detailed_format, detailed_format, Duplicate, FileSpec, Logger};
use log::{info, warn};
use nalgebra::{Isometry3, Vector3};
use std::path::PathBuf;
use std::sync::Arc;

/// Camera rig round-trip checker
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Camera YAML files, one per rig camera
    #[arg(short = 'c', long = "camera", required = true)]
    cameras: Vec<PathBuf>,

    /// Approximate number of pixels sampled per camera
    #[arg(short = 'n', long, default_value_t = 500)]
    num_points: usize,

    /// Human-readable rig label
    #[arg(short = 'l', long, default_value = "rig")]
    label: String,
}

fn load_cameras(paths: &[PathBuf]) -> Result<Vec<Arc<Camera>>, Box<dyn std::error::Error>> {
    let mut cameras = Vec::with_capacity(paths.len());
    for path in paths {
        let path_str = path.to_str().ok_or("Invalid camera path string")?;
        let camera = Camera::load_from_yaml(path_str)?;
        info!(
            "Loaded camera {} ({} distortion, {}x{}) from {:?}",
            camera.id(),
            camera.distortion().distortion_type(),
            camera.resolution().width,
            camera.resolution().height,
            path
        );
        cameras.push(Arc::new(camera));
    }
    Ok(cameras)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    Logger::try_with_str("info")?
        .log_to_file(
            FileSpec::default()
                .directory("logs")
                .suppress_timestamp()
                .suffix("log"),
        )
        .duplicate_to_stdout(Duplicate::All)
        .format_for_files(detailed_format)
        .format_for_stdout(colored_detailed_format)
        .set_palette("196;208;76;39;178".to_string())
        .start()?;

    let cli = Cli::parse();
    info!("Camera files: {:?}", cli.cameras);
    info!("Points per camera: {}", cli.num_points);

    let cameras = load_cameras(&cli.cameras)?;

    // Calibration files carry no extrinsics; space the cameras 10 cm apart.
    let transforms = (0..cameras.len())
        .map(|i| Isometry3::translation(-0.1 * i as f64, 0.0, 0.0))
        .collect::<Vec<_>>();
    let rig = NCameras::new(NCamerasId::random(), transforms, cameras, cli.label)?;
    info!(
        "Built rig '{}' ({}) with {} cameras",
        rig.label(),
        rig.id(),
        rig.num_cameras()
    );

    for (index, camera) in rig.cameras().iter().enumerate() {
        let pixels = geometry::sample_points(camera.resolution(), cli.num_points);

        match util::compute_round_trip_error(camera, &pixels) {
            Ok(stats) => info!("Camera {index} round trip: {stats:?}"),
            Err(err) => warn!("Camera {index} round trip failed: {err}"),
        }

        let mut frame = VisualFrame::new(FrameId::random(), Arc::clone(camera));
        frame.set_keypoint_measurements(pixels)?;
        let forward = (0..frame.num_keypoints())
            .filter_map(|i| frame.get_keypoint_bearing(i).ok())
            .filter(|bearing| bearing.dot(&Vector3::z()) > 0.0)
            .count();
        info!(
            "Camera {index}: {forward} of {} keypoints unproject in front of the camera",
            frame.num_keypoints()
        );

        let t_c_b = rig.get_t_c_b(index)?;
        info!(
            "Camera {index}: body origin in camera frame at {:?}",
            t_c_b.translation.vector.as_slice()
        );
    }

    Ok(())
}
