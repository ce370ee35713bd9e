// Fake capture backend for testing
//
// Hands out counted tracks and in-memory encoders so tests can check that
// every acquired device is released exactly once.

use crate::capture::{CaptureBackend, CaptureBackendError, EncoderEventSender};
use crate::config::EncoderOptions;
use crate::media::{Canvas, MediaConstraints, MediaStream, MediaTrack, TrackKind};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::FakeEncoder;

/// Call counters shared between the backend, its tracks and its encoders
#[derive(Debug, Default)]
pub(super) struct FakeCounters {
    pub(super) user_media_requests: AtomicU32,
    pub(super) canvas_captures: AtomicU32,
    pub(super) acquired_tracks: AtomicU32,
    pub(super) stopped_tracks: AtomicU32,
    pub(super) encoders_created: AtomicU32,
    pub(super) encoder_starts: AtomicU32,
    pub(super) encoder_pauses: AtomicU32,
    pub(super) encoder_resumes: AtomicU32,
    pub(super) encoder_stops: AtomicU32,
}

/// Encoder behaviour switches, read by each FakeEncoder at call time
#[derive(Debug, Default)]
pub(super) struct FakeEncoderFlags {
    pub(super) stop_fails: AtomicBool,
    pub(super) emit_empty_chunks: AtomicBool,
    pub(super) close_on_stop: AtomicBool,
}

/// Configurable fake backend for testing
#[derive(Debug, Clone)]
pub struct FakeCaptureBackend {
    /// Error for camera (video) requests
    user_media_error: Arc<Mutex<Option<FakeError>>>,
    /// Error for microphone-only requests
    microphone_error: Arc<Mutex<Option<FakeError>>>,
    /// Simulated permission prompt latency
    permission_delay_ms: Arc<AtomicU64>,
    canvas_capture_fails: Arc<AtomicBool>,
    encoder_creation_fails: Arc<AtomicBool>,
    /// Identifiers `is_type_supported` accepts
    supported_types: Arc<Mutex<Vec<String>>>,
    /// Options passed to the most recent `create_encoder`
    last_encoder_options: Arc<Mutex<Option<EncoderOptions>>>,
    counters: Arc<FakeCounters>,
    encoder_flags: Arc<FakeEncoderFlags>,
}

#[derive(Debug, Clone)]
pub enum FakeError {
    PermissionDenied,
    NotFound,
    NotSupported,
}

impl FakeError {
    fn to_backend_error(&self, what: &str) -> CaptureBackendError {
        match self {
            FakeError::PermissionDenied => {
                CaptureBackendError::PermissionDenied(format!("{} access denied", what))
            }
            FakeError::NotFound => CaptureBackendError::DeviceNotFound(format!("No {} found", what)),
            FakeError::NotSupported => {
                CaptureBackendError::NotSupported(format!("{} capture unavailable", what))
            }
        }
    }
}

impl Default for FakeCaptureBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCaptureBackend {
    pub fn new() -> Self {
        Self {
            user_media_error: Arc::new(Mutex::new(None)),
            microphone_error: Arc::new(Mutex::new(None)),
            permission_delay_ms: Arc::new(AtomicU64::new(0)),
            canvas_capture_fails: Arc::new(AtomicBool::new(false)),
            encoder_creation_fails: Arc::new(AtomicBool::new(false)),
            supported_types: Arc::new(Mutex::new(vec![
                "video/webm;codecs=vp9".to_string(),
                "video/webm;codecs=vp8".to_string(),
                "video/webm".to_string(),
            ])),
            last_encoder_options: Arc::new(Mutex::new(None)),
            counters: Arc::new(FakeCounters::default()),
            encoder_flags: Arc::new(FakeEncoderFlags::default()),
        }
    }

    /// Create a backend where every request succeeds
    pub fn succeeding() -> Self {
        Self::new()
    }

    /// Create a backend that refuses camera and microphone access
    pub fn permission_denied() -> Self {
        let backend = Self::new();
        backend.set_user_media_error(Some(FakeError::PermissionDenied));
        backend.set_microphone_error(Some(FakeError::PermissionDenied));
        backend
    }

    /// Create a backend that only supports the given identifiers
    pub fn with_supported_types(types: &[&str]) -> Self {
        let backend = Self::new();
        *backend.supported_types.lock().unwrap() = types.iter().map(|t| t.to_string()).collect();
        backend
    }

    pub fn set_user_media_error(&self, error: Option<FakeError>) {
        *self.user_media_error.lock().unwrap() = error;
    }

    pub fn set_microphone_error(&self, error: Option<FakeError>) {
        *self.microphone_error.lock().unwrap() = error;
    }

    pub fn set_permission_delay(&self, delay: Duration) {
        self.permission_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_canvas_capture_fails(&self, fails: bool) {
        self.canvas_capture_fails.store(fails, Ordering::SeqCst);
    }

    pub fn set_encoder_creation_fails(&self, fails: bool) {
        self.encoder_creation_fails.store(fails, Ordering::SeqCst);
    }

    /// Make `EncoderSession::stop` fail, as when the host already stopped it
    pub fn set_encoder_stop_fails(&self, fails: bool) {
        self.encoder_flags.stop_fails.store(fails, Ordering::SeqCst);
    }

    /// Drop the event channel on stop without finalizing, as a crashed encoder would
    pub fn set_encoder_closes_on_stop(&self, closes: bool) {
        self.encoder_flags
            .close_on_stop
            .store(closes, Ordering::SeqCst);
    }

    /// Emit an empty slice before every real one
    pub fn set_emit_empty_chunks(&self, emit: bool) {
        self.encoder_flags
            .emit_empty_chunks
            .store(emit, Ordering::SeqCst);
    }

    pub fn last_encoder_options(&self) -> Option<EncoderOptions> {
        self.last_encoder_options.lock().unwrap().clone()
    }

    pub fn user_media_request_count(&self) -> u32 {
        self.counters.user_media_requests.load(Ordering::SeqCst)
    }

    pub fn canvas_capture_count(&self) -> u32 {
        self.counters.canvas_captures.load(Ordering::SeqCst)
    }

    pub fn acquired_track_count(&self) -> u32 {
        self.counters.acquired_tracks.load(Ordering::SeqCst)
    }

    pub fn stopped_track_count(&self) -> u32 {
        self.counters.stopped_tracks.load(Ordering::SeqCst)
    }

    pub fn encoder_count(&self) -> u32 {
        self.counters.encoders_created.load(Ordering::SeqCst)
    }

    pub fn encoder_start_count(&self) -> u32 {
        self.counters.encoder_starts.load(Ordering::SeqCst)
    }

    pub fn encoder_pause_count(&self) -> u32 {
        self.counters.encoder_pauses.load(Ordering::SeqCst)
    }

    pub fn encoder_resume_count(&self) -> u32 {
        self.counters.encoder_resumes.load(Ordering::SeqCst)
    }

    pub fn encoder_stop_count(&self) -> u32 {
        self.counters.encoder_stops.load(Ordering::SeqCst)
    }

    fn new_track(&self, kind: TrackKind, label: &str) -> MediaTrack {
        self.counters.acquired_tracks.fetch_add(1, Ordering::SeqCst);
        let counters = Arc::clone(&self.counters);
        MediaTrack::with_stop_hook(kind, label, move || {
            counters.stopped_tracks.fetch_add(1, Ordering::SeqCst);
        })
    }
}

impl CaptureBackend for FakeCaptureBackend {
    type Encoder = FakeEncoder;

    async fn request_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, CaptureBackendError> {
        self.counters
            .user_media_requests
            .fetch_add(1, Ordering::SeqCst);

        let delay = self.permission_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let error = if constraints.video {
            self.user_media_error.lock().unwrap().clone()
        } else {
            self.microphone_error.lock().unwrap().clone()
        };
        if let Some(error) = error {
            let what = if constraints.video { "Camera" } else { "Microphone" };
            return Err(error.to_backend_error(what));
        }

        let mut tracks = Vec::new();
        if constraints.video {
            tracks.push(self.new_track(TrackKind::Video, "fake camera"));
        }
        if constraints.audio {
            tracks.push(self.new_track(TrackKind::Audio, "fake microphone"));
        }
        Ok(MediaStream::new(tracks))
    }

    fn capture_canvas_stream(
        &self,
        canvas: &Canvas,
        _frame_rate: u32,
    ) -> Result<MediaStream, CaptureBackendError> {
        self.counters.canvas_captures.fetch_add(1, Ordering::SeqCst);

        if self.canvas_capture_fails.load(Ordering::SeqCst) {
            return Err(CaptureBackendError::NotSupported(
                "Canvas capture unavailable".to_string(),
            ));
        }

        let label = format!("canvas {}", canvas.id());
        Ok(MediaStream::new(vec![self.new_track(TrackKind::Video, &label)]))
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported_types
            .lock()
            .unwrap()
            .iter()
            .any(|t| t == mime_type)
    }

    fn create_encoder(
        &self,
        _stream: &MediaStream,
        options: &EncoderOptions,
        events: EncoderEventSender,
    ) -> Result<Self::Encoder, CaptureBackendError> {
        if self.encoder_creation_fails.load(Ordering::SeqCst) {
            return Err(CaptureBackendError::Encoder(
                "Encoder construction failed".to_string(),
            ));
        }

        self.counters.encoders_created.fetch_add(1, Ordering::SeqCst);
        *self.last_encoder_options.lock().unwrap() = Some(options.clone());

        let mime_type = if options.mime_type.is_empty() {
            "video/webm".to_string()
        } else {
            options.mime_type.clone()
        };

        Ok(FakeEncoder::new(
            mime_type,
            events,
            Arc::clone(&self.counters),
            Arc::clone(&self.encoder_flags),
        ))
    }
}
