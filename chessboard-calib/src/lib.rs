pub mod calibration;
mod pattern;
mod report;
mod sample;
mod session;
mod source;

use std::backtrace::Backtrace;

pub use pattern::PatternSpec;
pub use report::{log_calibration, persist_images, CalibrationParams};
pub use sample::{CornerCountMismatch, Sample, SampleSet};
pub use session::{run, SessionConfig, SessionError, SessionOutcome};
pub use source::{preview_should_close, CameraSource, FileSource, Frame, FrameSource, KeyAction};

#[derive(Debug, thiserror::Error)]
#[error("{source:?}: {trace}")]
pub struct Error {
    source: opencv::Error,
    trace: String,
}

impl From<opencv::Error> for Error {
    fn from(value: opencv::Error) -> Self {
        Self {
            source: value,
            trace: Backtrace::capture().to_string(),
        }
    }
}
