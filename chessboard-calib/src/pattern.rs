use opencv::{
    calib3d,
    core::{Mat, Point2f, Point3f, Size, TermCriteria, TermCriteria_COUNT, TermCriteria_EPS, Vector},
    imgproc,
};
use tracing::debug;

/// Search window side length for `corner_sub_pix`.
const SUBPIX_WINDOW: i32 = 11;
/// Refinement stops after this many iterations or once the update falls
/// below [`SUBPIX_EPSILON`], whichever comes first.
const SUBPIX_MAX_ITER: i32 = 100;
const SUBPIX_EPSILON: f64 = 0.15;

/// Geometry of the calibration board: interior corner counts and the side
/// length of one square in an arbitrary world unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternSpec {
    pub cols: i32,
    pub rows: i32,
    pub square_size: f32,
}

impl Default for PatternSpec {
    fn default() -> Self {
        Self {
            cols: 4,
            rows: 6,
            square_size: 1.0,
        }
    }
}

impl PatternSpec {
    pub fn corner_count(&self) -> usize {
        (self.cols * self.rows) as usize
    }

    pub fn size(&self) -> Size {
        Size::new(self.cols, self.rows)
    }

    /// Planar grid the detected corners correspond to. z is always 0, the
    /// grid is identical for every sample of a run.
    pub fn object_points(&self) -> Vector<Point3f> {
        (0..self.cols * self.rows)
            .map(|i| {
                Point3f::new(
                    (i / self.cols) as f32 * self.square_size,
                    (i % self.cols) as f32 * self.square_size,
                    0.0,
                )
            })
            .collect()
    }

    /// Locate the board in a grayscale frame. `Ok(None)` means no board,
    /// which is an expected per-frame outcome, not an error.
    pub fn detect(&self, gray: &Mat) -> Result<Option<Vector<Point2f>>, crate::Error> {
        let mut corners = Vector::<Point2f>::new();
        let found = calib3d::find_chessboard_corners(
            gray,
            self.size(),
            &mut corners,
            calib3d::CALIB_CB_ADAPTIVE_THRESH
                | calib3d::CALIB_CB_NORMALIZE_IMAGE
                | calib3d::CALIB_CB_FAST_CHECK,
        )?;
        if !found {
            return Ok(None);
        }

        imgproc::corner_sub_pix(
            gray,
            &mut corners,
            Size::new(SUBPIX_WINDOW, SUBPIX_WINDOW),
            Size::new(-1, -1),
            TermCriteria::new(
                TermCriteria_EPS + TermCriteria_COUNT,
                SUBPIX_MAX_ITER,
                SUBPIX_EPSILON,
            )?,
        )?;
        debug!("Refined {} corners", corners.len());
        Ok(Some(corners))
    }

    /// Overlay the detected corners on a colour frame (interactive sanity
    /// check, same rendering the original windows showed).
    pub fn draw_detected(
        &self,
        frame: &mut Mat,
        corners: &Vector<Point2f>,
    ) -> Result<(), crate::Error> {
        calib3d::draw_chessboard_corners(frame, self.size(), corners, true)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use opencv::{
        core::{self, Mat, Point2f, Rect, Scalar, Size},
        imgproc,
    };

    use super::PatternSpec;

    /// Render a flat, axis-aligned chessboard into a white 640x480 canvas
    /// and return it together with the exact interior-corner positions.
    /// Corner centres sit on pixel boundaries, hence the -0.5 offsets.
    pub fn render_chessboard(
        spec: &PatternSpec,
        square_px: i32,
        origin: (i32, i32),
    ) -> Result<(Mat, Vec<Point2f>), crate::Error> {
        let (ox, oy) = origin;
        let mut img =
            Mat::new_rows_cols_with_default(480, 640, core::CV_8UC1, Scalar::all(255.0))?;

        for r in 0..spec.rows + 1 {
            for c in 0..spec.cols + 1 {
                if (r + c) % 2 == 0 {
                    imgproc::rectangle(
                        &mut img,
                        Rect::new(ox + c * square_px, oy + r * square_px, square_px, square_px),
                        Scalar::all(0.0),
                        imgproc::FILLED,
                        imgproc::LINE_8,
                        0,
                    )?;
                }
            }
        }

        // A touch of blur gives the refiner a smooth gradient to work with,
        // as a real photograph would.
        let mut blurred = Mat::default();
        imgproc::gaussian_blur_def(&img, &mut blurred, Size::new(5, 5), 1.0)?;

        let mut truth = Vec::with_capacity(spec.corner_count());
        for r in 1..=spec.rows {
            for c in 1..=spec.cols {
                truth.push(Point2f::new(
                    (ox + c * square_px) as f32 - 0.5,
                    (oy + r * square_px) as f32 - 0.5,
                ));
            }
        }
        Ok((blurred, truth))
    }
}
