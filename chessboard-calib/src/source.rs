use std::path::PathBuf;

use opencv::{
    core::{self, Mat, Size},
    highgui, imgcodecs,
    prelude::*,
    videoio::{self, VideoCapture},
};
use tracing::{debug, info};

use crate::session::SessionError;

pub const CAMERA_WINDOW: &str = "Camera Image";

const KEY_ESCAPE: i32 = 27;
const KEY_SPACE: i32 = 32;
const KEY_ENTER_LF: i32 = 10;
const KEY_ENTER_CR: i32 = 13;
const KEY_QUIT: i32 = b'q' as i32;
/// `wait_key` reports -1 once the window has been closed.
const KEY_CLOSE_WINDOW: i32 = -1;

/// Logical operator actions, decoupled from backend key codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Accept,
    Quit,
    Ignore,
}

impl KeyAction {
    pub fn from_code(code: i32) -> Self {
        match code {
            KEY_ESCAPE | KEY_QUIT | KEY_CLOSE_WINDOW => Self::Quit,
            KEY_SPACE | KEY_ENTER_LF | KEY_ENTER_CR => Self::Accept,
            _ => Self::Ignore,
        }
    }
}

/// Exit rule for the post-calibration preview loop: any key press ends it,
/// as does a closed preview window. The visibility check is needed because a
/// polling `wait_key` reports -1 both on timeout and once the window is gone.
pub fn preview_should_close(key: i32, window_visible: f64) -> bool {
    (key > 0 && key != 255) || window_visible < 1.0
}

/// A frame handed to the session loop, labelled for log messages.
pub struct Frame {
    pub image: Mat,
    pub label: String,
}

/// Where frames come from: a live device or a prespecified file list. `None`
/// means the source is exhausted (or the operator quit) and the session moves
/// on to calibration.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SessionError>;

    /// Whether this source drives interactive windows.
    fn interactive(&self) -> bool {
        false
    }
}

/// Live capture. The device is exclusively owned for the session's lifetime
/// and released on drop. Each frame is shown in a window and the loop blocks
/// until the operator accepts it, skips it, or quits.
pub struct CameraSource {
    capture: VideoCapture,
    grabbed: usize,
}

impl CameraSource {
    pub fn open(index: i32, frame_size: Size) -> Result<Self, SessionError> {
        let mut capture = VideoCapture::new(index, videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(SessionError::OpenDevice { index });
        }
        // Some drivers default to a tiny resolution, request one explicitly.
        capture.set(videoio::CAP_PROP_FRAME_WIDTH, frame_size.width as f64)?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, frame_size.height as f64)?;
        highgui::named_window(CAMERA_WINDOW, highgui::WINDOW_KEEPRATIO)?;
        info!("Opened camera device {index}");
        Ok(Self {
            capture,
            grabbed: 0,
        })
    }

    /// Grab one frame without waiting for operator input.
    pub fn grab(&mut self) -> Result<Mat, SessionError> {
        let mut frame = Mat::default();
        if !self.capture.read(&mut frame)? || frame.empty() {
            return Err(
                opencv::Error::new(core::StsError, "camera returned no frame".to_string()).into(),
            );
        }
        Ok(frame)
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SessionError> {
        loop {
            let frame = self.grab()?;
            highgui::imshow(CAMERA_WINDOW, &frame)?;
            let key = highgui::wait_key(0)?;
            match KeyAction::from_code(key) {
                KeyAction::Quit => return Ok(None),
                KeyAction::Accept => {
                    let label = format!("camera frame {}", self.grabbed);
                    self.grabbed += 1;
                    return Ok(Some(Frame {
                        image: frame,
                        label,
                    }));
                }
                KeyAction::Ignore => debug!("Ignoring key code {key}"),
            }
        }
    }

    fn interactive(&self) -> bool {
        true
    }
}

/// Iterates a fixed list of image paths in their given order, no user
/// interaction. An unreadable path is fatal rather than silently skipped.
pub struct FileSource {
    paths: std::vec::IntoIter<PathBuf>,
}

impl FileSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths: paths.into_iter(),
        }
    }
}

impl FrameSource for FileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, SessionError> {
        let Some(path) = self.paths.next() else {
            return Ok(None);
        };
        info!("Loading {}", path.display());
        let image = imgcodecs::imread(path.to_string_lossy().as_ref(), imgcodecs::IMREAD_COLOR)
            .map_err(|source| SessionError::LoadImage {
                path: path.clone(),
                source: source.into(),
            })?;
        if image.empty() {
            return Err(SessionError::LoadImage {
                source: opencv::Error::new(
                    core::StsBadArg,
                    "imread returned an empty image".to_string(),
                )
                .into(),
                path,
            });
        }
        let label = path.display().to_string();
        Ok(Some(Frame { image, label }))
    }
}
