use image::imageops::{self, FilterType};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::MediaStream;

/// Playback readiness, mirroring the HTML media element levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

/// Something that can hand out the frame currently on screen
pub trait FrameSource: Send + Sync {
    /// Whether a decoded frame is available right now
    fn has_current_data(&self) -> bool;

    /// The frame currently presented, if any
    fn current_frame(&self) -> Option<RgbaImage>;
}

/// Drawable RGBA surface
///
/// Clones refer to the same pixels.
#[derive(Clone)]
pub struct Canvas {
    id: Uuid,
    surface: Arc<Mutex<RgbaImage>>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            surface: Arc::new(Mutex::new(RgbaImage::new(width, height))),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.surface().width()
    }

    pub fn height(&self) -> u32 {
        self.surface().height()
    }

    /// Paint a frame over the whole canvas, scaling it to the canvas size
    pub fn draw_frame(&self, frame: &RgbaImage) {
        let mut surface = self.surface();
        let (width, height) = surface.dimensions();
        if frame.dimensions() == (width, height) {
            surface.copy_from_slice(frame.as_raw());
        } else {
            *surface = imageops::resize(frame, width, height, FilterType::Nearest);
        }
    }

    /// Copy of the current pixels
    pub fn snapshot(&self) -> RgbaImage {
        self.surface().clone()
    }

    fn surface(&self) -> MutexGuard<'_, RgbaImage> {
        self.surface.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Canvas")
            .field("id", &self.id)
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

#[derive(Default)]
struct VideoElementState {
    src_object: Option<MediaStream>,
    frame: Option<RgbaImage>,
}

/// Playback element: may carry a live stream and presents decoded frames
#[derive(Clone, Default)]
pub struct VideoElement {
    state: Arc<Mutex<VideoElementState>>,
}

impl VideoElement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Element already previewing a stream
    pub fn with_stream(stream: MediaStream) -> Self {
        let element = Self::new();
        element.set_src_object(Some(stream));
        element
    }

    pub fn src_object(&self) -> Option<MediaStream> {
        self.lock().src_object.clone()
    }

    pub fn set_src_object(&self, stream: Option<MediaStream>) {
        self.lock().src_object = stream;
    }

    /// Present a decoded frame
    pub fn present_frame(&self, frame: RgbaImage) {
        self.lock().frame = Some(frame);
    }

    pub fn ready_state(&self) -> ReadyState {
        let state = self.lock();
        match (&state.frame, &state.src_object) {
            (Some(_), _) => ReadyState::HaveCurrentData,
            (None, Some(_)) => ReadyState::HaveMetadata,
            (None, None) => ReadyState::HaveNothing,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VideoElementState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FrameSource for VideoElement {
    fn has_current_data(&self) -> bool {
        self.ready_state() >= ReadyState::HaveCurrentData
    }

    fn current_frame(&self) -> Option<RgbaImage> {
        self.lock().frame.clone()
    }
}

impl fmt::Debug for VideoElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoElement")
            .field("ready_state", &self.ready_state())
            .field("src_object", &self.src_object())
            .finish()
    }
}
