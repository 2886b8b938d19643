use std::path::{Path, PathBuf};

use opencv::{
    core::{self, Mat, Vector},
    imgcodecs,
    prelude::*,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{calibration::IntrinsicCalibration, session::SessionError};

pub const FIRST_FRAME_FILE: &str = "first_frame.jpg";
pub const UNDISTORTED_FRAME_FILE: &str = "undistorted_frame.jpg";

/// Serialisable subset of a solved calibration, for `--save-params`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CalibrationParams {
    pub camera_matrix: Vec<Vec<f64>>,
    pub dist_coeffs: Vec<f64>,
    pub reprojection_error: f64,
}

impl CalibrationParams {
    pub fn from_calibration(calibration: &IntrinsicCalibration) -> Result<Self, crate::Error> {
        Self::from_parts(
            calibration.camera_matrix(),
            calibration.dist_coeffs(),
            calibration.reprojection_error(),
        )
    }

    fn from_parts(
        camera_matrix: &Mat,
        dist_coeffs: &Mat,
        reprojection_error: f64,
    ) -> Result<Self, crate::Error> {
        Ok(Self {
            camera_matrix: camera_matrix.to_vec_2d::<f64>()?,
            dist_coeffs: dist_coeffs.to_vec_2d::<f64>()?.into_iter().flatten().collect(),
            reprojection_error,
        })
    }
}

/// Write the retained first frame and its undistorted counterpart next to
/// each other for visual comparison.
pub fn persist_images(
    out_dir: &Path,
    first_frame: &Mat,
    undistorted: &Mat,
) -> Result<(PathBuf, PathBuf), SessionError> {
    let original = out_dir.join(FIRST_FRAME_FILE);
    let corrected = out_dir.join(UNDISTORTED_FRAME_FILE);
    write_image(&original, first_frame)?;
    write_image(&corrected, undistorted)?;
    info!(
        "Saved {} and its undistorted counterpart {}",
        original.display(),
        corrected.display()
    );
    Ok((original, corrected))
}

fn write_image(path: &Path, image: &Mat) -> Result<(), SessionError> {
    let written = imgcodecs::imwrite(path.to_string_lossy().as_ref(), image, &Vector::new())?;
    if !written {
        return Err(opencv::Error::new(
            core::StsError,
            format!("could not write {}", path.display()),
        )
        .into());
    }
    Ok(())
}

pub fn log_calibration(calibration: &IntrinsicCalibration) -> Result<(), crate::Error> {
    let params = CalibrationParams::from_calibration(calibration)?;
    info!("Intrinsic parameters:");
    for row in &params.camera_matrix {
        info!("  {row:?}");
    }
    info!("Distortion coefficients: {:?}", params.dist_coeffs);
    info!("RMS reprojection error: {}", params.reprojection_error);
    Ok(())
}
