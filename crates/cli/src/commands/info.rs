//! `info` command implementation.
//!
//! Runs the size negotiation offline for every camera of the device profile,
//! the way the engine would after opening it.

use anyhow::{Context, Result};
use contracts::{CameraProfile, Mode, Reference, SessionBlueprint, Size};
use geometry::Angles;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

#[derive(Serialize)]
struct SessionInfo {
    facing: String,
    mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    surface: Option<String>,
    display_offset: u32,
    device_orientation: u32,
    cameras: Vec<CameraInfo>,
}

#[derive(Serialize)]
struct CameraInfo {
    facing: String,
    sensor_offset: u32,
    /// sensor -> view, sensor -> output
    view_offset: u32,
    output_offset: u32,
    picture_size: Option<String>,
    video_size: Option<String>,
    preview_size: Option<String>,
    snapshot_size: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    aspect_ratios: Vec<String>,
    zoom_supported: bool,
    auto_focus_supported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    let blueprint = super::load_blueprint(args.config.as_deref(), &args.overrides)?;
    info!(cameras = blueprint.device.cameras.len(), "Computing session info");

    let session_info = build_session_info(&blueprint);
    if args.json {
        let json = serde_json::to_string_pretty(&session_info)
            .context("Failed to serialize session info")?;
        println!("{}", json);
    } else {
        print_session_info(&session_info);
    }
    Ok(())
}

fn build_session_info(blueprint: &SessionBlueprint) -> SessionInfo {
    SessionInfo {
        facing: blueprint.camera.facing.to_string(),
        mode: blueprint.camera.mode.to_string(),
        surface: blueprint.surface.map(|s| s.to_string()),
        display_offset: blueprint.camera.display_offset,
        device_orientation: blueprint.camera.device_orientation,
        cameras: blueprint
            .device
            .cameras
            .iter()
            .map(|camera| camera_info(blueprint, camera))
            .collect(),
    }
}

fn camera_info(blueprint: &SessionBlueprint, camera: &CameraProfile) -> CameraInfo {
    let mut info = CameraInfo {
        facing: camera.facing.to_string(),
        sensor_offset: camera.sensor_offset,
        view_offset: 0,
        output_offset: 0,
        picture_size: None,
        video_size: None,
        preview_size: None,
        snapshot_size: None,
        aspect_ratios: Vec::new(),
        zoom_supported: camera.zoom_supported,
        auto_focus_supported: camera.auto_focus_supported,
        error: None,
    };
    if let Err(e) = negotiate(blueprint, camera, &mut info) {
        info.error = Some(e.to_string());
    }
    info
}

/// Capture sizes for both modes, then preview and snapshot for the
/// configured mode. Sizes are reported in the view frame.
fn negotiate(blueprint: &SessionBlueprint, camera: &CameraProfile, info: &mut CameraInfo) -> Result<()> {
    let angles = Angles::with(
        camera.facing,
        camera.sensor_offset,
        blueprint.camera.display_offset,
        blueprint.camera.device_orientation,
    )?;
    info.view_offset = angles.offset(Reference::Sensor, Reference::View);
    info.output_offset = angles.offset(Reference::Sensor, Reference::Output);
    let flip = angles.flip(Reference::Sensor, Reference::View);
    let to_view = |size: Size| size.flip_if(flip).to_string();

    let picture_selector = sizing::parse_constraints(&blueprint.sizes.picture);
    let video_selector = sizing::parse_constraints(&blueprint.sizes.video);
    let picture = geometry::compute_capture_size(&angles, &camera.picture_sizes, &picture_selector)?;
    let video = geometry::compute_capture_size(&angles, &camera.video_sizes, &video_selector)?;
    info.picture_size = Some(to_view(picture));
    info.video_size = Some(to_view(video));

    if let Some(capabilities) = blueprint.device.capabilities(camera.facing) {
        info.aspect_ratios = capabilities
            .aspect_ratios(blueprint.camera.mode)
            .iter()
            .map(ToString::to_string)
            .collect();
    }

    let capture = match blueprint.camera.mode {
        Mode::Picture => picture,
        Mode::Video => video,
    };
    let preview_selector = sizing::parse_optional(blueprint.sizes.preview.as_ref());
    let preview = geometry::compute_preview_stream_size(
        &angles,
        &camera.preview_sizes,
        capture,
        blueprint.surface.unwrap_or_default(),
        preview_selector.as_ref(),
    )?;
    info.preview_size = Some(to_view(preview));

    let snapshot = blueprint.snapshot.unwrap_or_default();
    let snapshot_size = geometry::uncropped_snapshot_size(
        preview.flip_if(flip),
        snapshot.max_width,
        snapshot.max_height,
    );
    info.snapshot_size = Some(snapshot_size.to_string());
    Ok(())
}

fn print_session_info(info: &SessionInfo) {
    println!("=== Camera Session ===\n");
    println!("Requested");
    println!("   ├─ Facing: {}", info.facing);
    println!("   ├─ Mode: {}", info.mode);
    println!(
        "   ├─ Surface: {}",
        info.surface.as_deref().unwrap_or("(none)")
    );
    println!("   ├─ Display offset: {}", info.display_offset);
    println!("   └─ Device orientation: {}", info.device_orientation);

    println!("\nCameras ({})", info.cameras.len());
    for (i, camera) in info.cameras.iter().enumerate() {
        let is_last = i == info.cameras.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child = if is_last { "   " } else { "│  " };

        println!("   {} {} (sensor {}°)", prefix, camera.facing, camera.sensor_offset);
        if let Some(error) = &camera.error {
            println!("   {}  └─ error: {}", child, error);
            continue;
        }
        println!(
            "   {}  ├─ Offsets: view {}°, output {}°",
            child, camera.view_offset, camera.output_offset
        );
        let show = |size: &Option<String>| size.clone().unwrap_or_else(|| "-".to_string());
        println!("   {}  ├─ Picture: {}", child, show(&camera.picture_size));
        println!("   {}  ├─ Video: {}", child, show(&camera.video_size));
        println!("   {}  ├─ Preview: {}", child, show(&camera.preview_size));
        println!("   {}  ├─ Snapshot: {}", child, show(&camera.snapshot_size));
        println!("   {}  ├─ Aspect ratios: {}", child, camera.aspect_ratios.join(", "));
        println!(
            "   {}  └─ Zoom: {}, Auto focus: {}",
            child, camera.zoom_supported, camera.auto_focus_supported
        );
    }
    println!();
}
