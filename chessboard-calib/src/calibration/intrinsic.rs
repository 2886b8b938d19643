use opencv::{
    calib3d,
    core::{Mat, Size, TermCriteria, Vector},
};
use tracing::{debug, trace};

use crate::sample::SampleSet;

use super::{CalibrationError, CalibrationResult, Undistorter};

type VectorOfMat = Vector<Mat>;

/// Output of the closed-form solve: intrinsics, distortion coefficients and
/// one pose per sample. Read-only once produced.
#[derive(Debug)]
pub struct IntrinsicCalibration {
    camera_matrix: Mat,
    dist_coeffs: Mat,
    rvecs: VectorOfMat,
    tvecs: VectorOfMat,
    reprojection_error: f64,
    image_size: Size,
}

impl IntrinsicCalibration {
    /// Solve for the camera intrinsics from the full sample set. The set is
    /// consumed whole; callers guard against an empty one, but the solver
    /// behaviour on empty input is undefined so it is re-checked here.
    pub fn solve(samples: SampleSet, image_size: Size) -> CalibrationResult<Self> {
        if samples.is_empty() {
            return Err(CalibrationError::EmptySampleSet);
        }
        let sample_count = samples.len();
        let (object_points, image_points) = samples.into_calibration_input();

        let mut camera_matrix = Mat::default();
        let mut dist_coeffs = Mat::default();
        let mut rvecs = VectorOfMat::new();
        let mut tvecs = VectorOfMat::new();

        trace!("Solving intrinsics from {sample_count} samples");
        let reprojection_error = calib3d::calibrate_camera(
            &object_points,
            &image_points,
            image_size,
            &mut camera_matrix,
            &mut dist_coeffs,
            &mut rvecs,
            &mut tvecs,
            0,
            TermCriteria::default()?,
        )?;
        debug!("RMS reprojection error: {reprojection_error}");
        trace!("Camera matrix:\n{camera_matrix:?}");
        trace!("Distortion coefficients:\n{dist_coeffs:?}");

        Ok(Self {
            camera_matrix,
            dist_coeffs,
            rvecs,
            tvecs,
            reprojection_error,
            image_size,
        })
    }

    pub fn create_undistorter(&self) -> CalibrationResult<Undistorter> {
        Undistorter::new(&self.camera_matrix, &self.dist_coeffs, self.image_size)
    }

    pub fn camera_matrix(&self) -> &Mat {
        &self.camera_matrix
    }

    pub fn dist_coeffs(&self) -> &Mat {
        &self.dist_coeffs
    }

    pub fn rvecs(&self) -> &VectorOfMat {
        &self.rvecs
    }

    pub fn tvecs(&self) -> &VectorOfMat {
        &self.tvecs
    }

    pub fn reprojection_error(&self) -> f64 {
        self.reprojection_error
    }

    pub fn image_size(&self) -> Size {
        self.image_size
    }
}

#[cfg(test)]
mod tests {
    use opencv::{
        calib3d,
        core::{self, Point2f, Scalar},
        prelude::*,
    };

    use super::*;
    use crate::{pattern::PatternSpec, sample::Sample};

    const FX: f64 = 600.0;
    const FY: f64 = 600.0;
    const CX: f64 = 320.0;
    const CY: f64 = 240.0;
    const DIST: [f64; 5] = [-0.25, 0.07, 0.0, 0.0, 0.0];

    /// Poses keeping the 4x6 unit grid well inside a 640x480 view, with
    /// enough tilt variation for the planar solve to be well conditioned.
    const POSES: [([f64; 3], [f64; 3]); 5] = [
        ([0.0, 0.0, 0.0], [-2.5, -1.5, 10.0]),
        ([0.25, 0.0, 0.0], [-2.5, -1.5, 10.0]),
        ([0.0, 0.3, 0.0], [-2.0, -1.5, 10.0]),
        ([-0.2, 0.15, 0.1], [-2.5, -1.0, 10.0]),
        ([0.15, -0.25, -0.1], [-2.0, -2.0, 11.0]),
    ];

    fn camera_matrix() -> Mat {
        Mat::from_slice_2d(&[[FX, 0.0, CX], [0.0, FY, CY], [0.0, 0.0, 1.0]]).unwrap()
    }

    fn dist_coeffs(coeffs: &[f64; 5]) -> Mat {
        Mat::from_slice_2d(&[*coeffs]).unwrap()
    }

    fn col_vec(v: [f64; 3]) -> Mat {
        Mat::from_slice_2d(&[[v[0]], [v[1]], [v[2]]]).unwrap()
    }

    fn project(spec: &PatternSpec, pose: ([f64; 3], [f64; 3]), dist: &Mat) -> Vector<Point2f> {
        let mut projected = Mat::default();
        calib3d::project_points_def(
            &spec.object_points(),
            &col_vec(pose.0),
            &col_vec(pose.1),
            &camera_matrix(),
            dist,
            &mut projected,
        )
        .unwrap();
        projected.iter::<Point2f>().unwrap().map(|(_, p)| p).collect()
    }

    fn synthetic_samples(spec: &PatternSpec) -> SampleSet {
        let dist = dist_coeffs(&DIST);
        let mut samples = SampleSet::new();
        for pose in POSES {
            samples.push(Sample::new(spec, project(spec, pose, &dist)).unwrap());
        }
        samples
    }

    fn mean_residual(points: &Vector<Point2f>, reference: &Vector<Point2f>) -> f32 {
        points
            .iter()
            .zip(reference.iter())
            .map(|(p, q)| ((p.x - q.x).powi(2) + (p.y - q.y).powi(2)).sqrt())
            .sum::<f32>()
            / points.len() as f32
    }

    #[test]
    fn empty_sample_set_is_rejected_before_the_solver_runs() {
        let err = IntrinsicCalibration::solve(SampleSet::new(), Size::new(640, 480)).unwrap_err();
        assert!(matches!(err, CalibrationError::EmptySampleSet));
    }

    #[test]
    fn solve_recovers_known_intrinsics_and_distortion() {
        let spec = PatternSpec::default();
        let calibration =
            IntrinsicCalibration::solve(synthetic_samples(&spec), Size::new(640, 480)).unwrap();

        assert!(
            calibration.reprojection_error() < 0.5,
            "RMS error {} too large for exact synthetic observations",
            calibration.reprojection_error()
        );
        assert_eq!(calibration.rvecs().len(), POSES.len());
        assert_eq!(calibration.tvecs().len(), POSES.len());

        let k = calibration.camera_matrix().to_vec_2d::<f64>().unwrap();
        assert!((k[0][0] - FX).abs() < 5.0, "fx {} instead of {FX}", k[0][0]);
        assert!((k[1][1] - FY).abs() < 5.0, "fy {} instead of {FY}", k[1][1]);
        assert!((k[0][2] - CX).abs() < 5.0, "cx {} instead of {CX}", k[0][2]);
        assert!((k[1][2] - CY).abs() < 5.0, "cy {} instead of {CY}", k[1][2]);

        let d: Vec<f64> = calibration
            .dist_coeffs()
            .to_vec_2d::<f64>()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert!((d[0] - DIST[0]).abs() < 0.05, "k1 {} instead of {}", d[0], DIST[0]);

        // The solved result must be directly usable for the demo output.
        let undistorter = calibration.create_undistorter().unwrap();
        let frame =
            Mat::new_rows_cols_with_default(480, 640, core::CV_8UC3, Scalar::all(128.0)).unwrap();
        let undistorted = undistorter.undistort(&frame).unwrap();
        assert_eq!(undistorted.size().unwrap(), Size::new(640, 480));
    }

    #[test]
    fn undistortion_reduces_residual_against_ideal_projection() {
        let spec = PatternSpec::default();
        let calibration =
            IntrinsicCalibration::solve(synthetic_samples(&spec), Size::new(640, 480)).unwrap();

        let pose = POSES[3];
        let ideal = project(&spec, pose, &dist_coeffs(&[0.0; 5]));
        let observed = project(&spec, pose, &dist_coeffs(&DIST));

        let mut corrected = Vector::<Point2f>::new();
        calib3d::undistort_points(
            &observed,
            &mut corrected,
            calibration.camera_matrix(),
            calibration.dist_coeffs(),
            &core::no_array(),
            calibration.camera_matrix(),
        )
        .unwrap();

        let before = mean_residual(&observed, &ideal);
        let after = mean_residual(&corrected, &ideal);
        assert!(
            after < before,
            "undistortion left the residual at {after} px (was {before} px)"
        );
        assert!(after < 0.2, "residual {after} px after undistortion");
    }
}
