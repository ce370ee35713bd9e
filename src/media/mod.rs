// Handles the recorder operates on: tracks and streams coming from the
// capture backend, and the drawable/playback surfaces owned by the UI.

mod stream;
mod surface;

pub use stream::{MediaConstraints, MediaStream, MediaTrack, TrackKind};
pub use surface::{Canvas, FrameSource, ReadyState, VideoElement};
