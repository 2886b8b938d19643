use std::{fs, path::PathBuf};

use anyhow::Context;
use clap::Parser;
use opencv::{core::Size, highgui};
use tracing::info;
use tracing_subscriber::EnvFilter;

use chessboard_calib::{
    log_calibration, persist_images, preview_should_close, run, CalibrationParams, CameraSource,
    FileSource, PatternSpec, SessionConfig, SessionOutcome,
};

const PREVIEW_WINDOW: &str = "Undistorted preview";

#[derive(Parser, Debug)]
#[command(
    name = "chessboard-calib",
    version,
    about = "Calibrate a camera from chessboard images",
    long_about = "Calibrate a camera against a flat chessboard pattern.\n\n\
        With no image arguments the tool captures from a live camera: present \
        the board, press SPACE or ENTER to grab a frame, ESC or q to finish and \
        calibrate. With image arguments it processes the given files in order \
        without interaction.\n\n\
        On success the first accepted frame and its undistorted counterpart are \
        written to the output directory and the intrinsic parameters are printed."
)]
struct Args {
    /// Calibration images; leave empty to capture from a live camera.
    images: Vec<PathBuf>,

    /// Camera device index for interactive capture.
    #[arg(long, default_value_t = 0)]
    cam_id: i32,

    /// Requested capture width in pixels.
    #[arg(long, default_value_t = 640)]
    width: i32,

    /// Requested capture height in pixels.
    #[arg(long, default_value_t = 480)]
    height: i32,

    /// Interior corner count along the board's short axis.
    #[arg(long, default_value_t = 4)]
    cols: i32,

    /// Interior corner count along the board's long axis.
    #[arg(long, default_value_t = 6)]
    rows: i32,

    /// Side length of one board square, in your unit of choice.
    #[arg(long, default_value_t = 1.0)]
    square_size: f32,

    /// Directory the comparison images are written to.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Also write the solved parameters to this file as JSON.
    #[arg(long)]
    save_params: Option<PathBuf>,

    /// After calibrating, show a live undistorted preview (interactive mode only).
    #[arg(long)]
    preview: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = SessionConfig {
        pattern: PatternSpec {
            cols: args.cols,
            rows: args.rows,
            square_size: args.square_size,
        },
    };

    if args.images.is_empty() {
        info!("Interactive calibration: SPACE/ENTER grabs a frame, ESC or q finishes");
        let mut source = CameraSource::open(args.cam_id, Size::new(args.width, args.height))?;
        let outcome = run(&config, &mut source)?;
        report(&args, &outcome)?;
        if args.preview {
            preview_undistorted(&mut source, &outcome)?;
        }
    } else {
        let mut source = FileSource::new(args.images.clone());
        let outcome = run(&config, &mut source)?;
        report(&args, &outcome)?;
    }

    Ok(())
}

fn report(args: &Args, outcome: &SessionOutcome) -> anyhow::Result<()> {
    let undistorter = outcome.calibration.create_undistorter()?;
    let undistorted = undistorter.undistort(&outcome.first_frame)?;
    persist_images(&args.out_dir, &outcome.first_frame, &undistorted)?;
    log_calibration(&outcome.calibration)?;

    if let Some(path) = &args.save_params {
        let params = CalibrationParams::from_calibration(&outcome.calibration)?;
        let json = serde_json::to_string_pretty(&params)?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        info!("Saved calibration parameters to {}", path.display());
    }
    Ok(())
}

/// Continuously undistort live frames for visual inspection, until a key is
/// pressed or the preview window is closed.
fn preview_undistorted(source: &mut CameraSource, outcome: &SessionOutcome) -> anyhow::Result<()> {
    let undistorter = outcome.calibration.create_undistorter()?;
    highgui::named_window(PREVIEW_WINDOW, highgui::WINDOW_KEEPRATIO)?;
    info!("Press any key in the preview window to exit");
    loop {
        let frame = source.grab()?;
        let undistorted = undistorter.undistort(&frame)?;
        highgui::imshow(PREVIEW_WINDOW, &undistorted)?;
        let key = highgui::wait_key(10)?;
        let visible = highgui::get_window_property(PREVIEW_WINDOW, highgui::WND_PROP_VISIBLE)?;
        if preview_should_close(key, visible) {
            break;
        }
    }
    Ok(())
}
