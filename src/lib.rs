//! Recording sessions for the rehabilitation portal.
//!
//! A [`MediaCaptureRecorder`] records either a live camera/microphone stream
//! or a canvas (optionally with microphone audio) through a
//! [`CaptureBackend`], and hands back the result as a single
//! [`RecordingBlob`]. Progress is reported on an event bus the UI layer can
//! subscribe to.

pub mod capture;
pub mod codec;
pub mod config;
pub mod events;
pub mod media;
pub mod recorder;
pub mod state;

pub use capture::{default_backend, CaptureBackend, CaptureBackendError, EncoderSession};
pub use config::{ConfigError, EncoderOptions, RecorderOptions};
pub use events::{event_names, EventBus, RecorderEvent};
pub use media::{Canvas, FrameSource, MediaStream, MediaTrack, VideoElement};
pub use recorder::{CaptureMode, MediaCaptureRecorder, RecorderError, RecordingBlob};
pub use state::{RecorderFault, RecorderState};
