use std::path::PathBuf;

use opencv::{
    core::{Mat, Size},
    highgui, imgproc,
    prelude::*,
};
use tracing::{info, warn};

use crate::{
    calibration::{CalibrationError, IntrinsicCalibration},
    pattern::PatternSpec,
    sample::{Sample, SampleSet},
    source::FrameSource,
};

pub const DETECTION_WINDOW: &str = "Detected pattern";

/// Immutable per-run configuration, fixed before acquisition starts.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub pattern: PatternSpec,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("camera device {index} could not be opened")]
    OpenDevice { index: i32 },
    #[error("could not load image {}", path.display())]
    LoadImage {
        path: PathBuf,
        #[source]
        source: crate::Error,
    },
    #[error("no pattern found in any captured frame")]
    NoSamples,
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Cv(#[from] crate::Error),
}

impl From<opencv::Error> for SessionError {
    fn from(value: opencv::Error) -> Self {
        SessionError::Cv(value.into())
    }
}

#[derive(Debug)]
pub struct SessionOutcome {
    pub calibration: IntrinsicCalibration,
    /// The first accepted frame, kept verbatim for the undistortion demo.
    pub first_frame: Mat,
}

/// Drive one full session: acquire until the source is exhausted, then
/// calibrate. Acquisition never restarts once calibration has begun.
pub fn run(
    config: &SessionConfig,
    source: &mut dyn FrameSource,
) -> Result<SessionOutcome, SessionError> {
    let (samples, first_frame, image_size) = acquire(config, source)?;

    let Some(first_frame) = first_frame else {
        return Err(SessionError::NoSamples);
    };

    info!("Calibrating from {} samples", samples.len());
    let calibration = IntrinsicCalibration::solve(samples, image_size)?;
    Ok(SessionOutcome {
        calibration,
        first_frame,
    })
}

/// Acquisition loop: attempt detection on every yielded frame, skip failures
/// with a notice, keep the first accepted frame. No retries.
fn acquire(
    config: &SessionConfig,
    source: &mut dyn FrameSource,
) -> Result<(SampleSet, Option<Mat>, Size), SessionError> {
    let mut samples = SampleSet::new();
    let mut first_frame: Option<Mat> = None;
    let mut image_size = Size::default();

    while let Some(frame) = source.next_frame()? {
        let mut gray = Mat::default();
        imgproc::cvt_color(
            &frame.image,
            &mut gray,
            imgproc::COLOR_BGR2GRAY,
            0,
        )?;

        let Some(corners) = config.pattern.detect(&gray)? else {
            info!("Pattern not found in {}", frame.label);
            continue;
        };
        let sample = match Sample::new(&config.pattern, corners.clone()) {
            Ok(sample) => sample,
            Err(err) => {
                warn!("Rejecting {}: {err}", frame.label);
                continue;
            }
        };

        if source.interactive() {
            let mut overlay = frame.image.clone();
            config.pattern.draw_detected(&mut overlay, &corners)?;
            highgui::imshow(DETECTION_WINDOW, &overlay)?;
        }

        image_size = frame.image.size()?;
        if first_frame.is_none() {
            first_frame = Some(frame.image.clone());
        }
        samples.push(sample);
        info!("Accepted {} ({} samples total)", frame.label, samples.len());
    }

    Ok((samples, first_frame, image_size))
}
