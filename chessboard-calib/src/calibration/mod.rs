use opencv::{
    calib3d,
    core::{self, Mat, Size},
    imgproc,
};

mod intrinsic;

pub use intrinsic::IntrinsicCalibration;

pub type CalibrationResult<T> = Result<T, CalibrationError>;

#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("cannot calibrate from an empty sample set")]
    EmptySampleSet,
    #[error(transparent)]
    Cv(#[from] crate::Error),
}

impl From<opencv::Error> for CalibrationError {
    fn from(value: opencv::Error) -> Self {
        CalibrationError::Cv(value.into())
    }
}

/// Precomputed undistortion maps for one image size.
pub struct Undistorter {
    map1: Mat,
    map2: Mat,
}

impl Undistorter {
    pub fn new(
        camera_matrix: &Mat,
        dist_coeffs: &Mat,
        image_size: Size,
    ) -> CalibrationResult<Self> {
        let mut map1 = Mat::default();
        let mut map2 = Mat::default();
        calib3d::init_undistort_rectify_map(
            camera_matrix,
            dist_coeffs,
            &Mat::default(),
            camera_matrix, // keep the solved matrix, no re-cropping
            image_size,
            core::CV_32FC1,
            &mut map1,
            &mut map2,
        )?;
        Ok(Self { map1, map2 })
    }

    pub fn undistort(&self, distorted: &Mat) -> Result<Mat, crate::Error> {
        let mut undistorted = Mat::default();
        imgproc::remap(
            distorted,
            &mut undistorted,
            &self.map1,
            &self.map2,
            imgproc::INTER_LINEAR,
            core::BORDER_CONSTANT,
            core::Scalar::all(0.0),
        )?;
        Ok(undistorted)
    }
}
