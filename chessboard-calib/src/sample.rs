use opencv::core::{Point2f, Point3f, Vector};

use crate::pattern::PatternSpec;

/// One accepted frame: the fixed planar grid paired with the refined
/// image-space corners, in matching order.
#[derive(Debug)]
pub struct Sample {
    object_points: Vector<Point3f>,
    image_points: Vector<Point2f>,
}

#[derive(Debug, thiserror::Error)]
#[error("expected {expected} corners, detector returned {got}")]
pub struct CornerCountMismatch {
    expected: usize,
    got: usize,
}

impl Sample {
    pub fn new(
        spec: &PatternSpec,
        image_points: Vector<Point2f>,
    ) -> Result<Self, CornerCountMismatch> {
        let expected = spec.corner_count();
        if image_points.len() != expected {
            return Err(CornerCountMismatch {
                expected,
                got: image_points.len(),
            });
        }
        Ok(Self {
            object_points: spec.object_points(),
            image_points,
        })
    }

    pub fn object_points(&self) -> &Vector<Point3f> {
        &self.object_points
    }

    pub fn image_points(&self) -> &Vector<Point2f> {
        &self.image_points
    }
}

/// Samples in acquisition order. Grown during acquisition, handed to the
/// solver in one piece, never touched afterwards.
#[derive(Default)]
pub struct SampleSet {
    samples: Vec<Sample>,
}

impl SampleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Split into the parallel point vectors `calibrate_camera` expects.
    pub fn into_calibration_input(self) -> (Vector<Vector<Point3f>>, Vector<Vector<Point2f>>) {
        let mut object_points = Vector::<Vector<Point3f>>::new();
        let mut image_points = Vector::<Vector<Point2f>>::new();
        for sample in self.samples {
            object_points.push(sample.object_points);
            image_points.push(sample.image_points);
        }
        (object_points, image_points)
    }
}
