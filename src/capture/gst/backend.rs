use crate::capture::{CaptureBackend, CaptureBackendError, EncoderEventSender};
use crate::config::EncoderOptions;
use crate::media::{Canvas, MediaConstraints, MediaStream, MediaTrack, TrackKind};
use gstreamer::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::encoding::{plan_for, DEFAULT_MIME_TYPE};
use super::pipeline::{describe_pipeline, AudioInput, GstEncoderSession, VideoInput};

/// V4L2 node used when no camera device is configured
const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";

/// What a track handed out by this backend reads from
#[derive(Debug, Clone)]
pub(super) enum TrackSource {
    Video(VideoInput),
    Audio(AudioInput),
}

type SourceRegistry = Arc<Mutex<HashMap<Uuid, TrackSource>>>;

fn lock(sources: &Mutex<HashMap<Uuid, TrackSource>>) -> MutexGuard<'_, HashMap<Uuid, TrackSource>> {
    sources.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Capture backend built on V4L2, PulseAudio and GStreamer encoders
///
/// Tracks are plain handles; the backend remembers which device or canvas
/// each live track reads from until the track is stopped.
#[derive(Clone, Default)]
pub struct GstCaptureBackend {
    camera_device: Option<String>,
    microphone_device: Option<String>,
    pub(super) sources: SourceRegistry,
}

impl GstCaptureBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use specific devices instead of the system defaults
    pub fn with_devices(camera: Option<String>, microphone: Option<String>) -> Self {
        Self {
            camera_device: camera,
            microphone_device: microphone,
            sources: SourceRegistry::default(),
        }
    }

    /// Hand out a track and remember its source until it is stopped
    pub(super) fn register(&self, kind: TrackKind, label: &str, source: TrackSource) -> MediaTrack {
        let id = Arc::new(OnceLock::new());
        let hook_id = Arc::clone(&id);
        let sources = Arc::clone(&self.sources);
        let track = MediaTrack::with_stop_hook(kind, label, move || {
            if let Some(id) = hook_id.get() {
                lock(&sources).remove(id);
                debug!("Released track {}", id);
            }
        });
        let _ = id.set(track.id());
        lock(&self.sources).insert(track.id(), source);
        track
    }

    /// Open the device far enough (READY) to learn whether it is usable
    fn probe(
        factory_name: &str,
        device: Option<&str>,
        on_failure: impl FnOnce() -> CaptureBackendError,
    ) -> Result<(), CaptureBackendError> {
        gstreamer::init().map_err(|e| {
            CaptureBackendError::Internal(format!("Failed to initialize GStreamer: {}", e))
        })?;

        let factory = gstreamer::ElementFactory::find(factory_name).ok_or_else(|| {
            CaptureBackendError::NotSupported(format!("{} is not installed", factory_name))
        })?;
        let element = factory.create().build().map_err(|e| {
            CaptureBackendError::NotSupported(format!("Failed to create {}: {}", factory_name, e))
        })?;
        if let Some(device) = device {
            element.set_property_from_str("device", device);
        }

        let result = element.set_state(gstreamer::State::Ready);
        let _ = element.set_state(gstreamer::State::Null);
        result.map(|_| ()).map_err(|_| on_failure())
    }

    fn probe_camera(&self) -> Result<(), CaptureBackendError> {
        let device = self
            .camera_device
            .clone()
            .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string());
        Self::probe("v4l2src", Some(&device), || {
            if Path::new(&device).exists() {
                CaptureBackendError::PermissionDenied(format!("Cannot open camera {}", device))
            } else {
                CaptureBackendError::DeviceNotFound(format!("No camera at {}", device))
            }
        })
    }

    fn probe_microphone(&self) -> Result<(), CaptureBackendError> {
        Self::probe("pulsesrc", self.microphone_device.as_deref(), || {
            CaptureBackendError::DeviceNotFound("No usable microphone".to_string())
        })
    }

    /// Video and (optional) audio inputs behind a stream's live tracks
    fn inputs_for(&self, stream: &MediaStream) -> (Option<VideoInput>, Option<AudioInput>) {
        let sources = lock(&self.sources);
        let mut video = None;
        let mut audio = None;
        for track in stream.tracks().iter().filter(|t| t.is_live()) {
            match sources.get(&track.id()) {
                Some(TrackSource::Video(input)) if video.is_none() => video = Some(input.clone()),
                Some(TrackSource::Audio(input)) if audio.is_none() => audio = Some(input.clone()),
                Some(_) => debug!("Ignoring extra {:?} track {}", track.kind(), track.id()),
                None => warn!("Track {} was not created by this backend", track.id()),
            }
        }
        (video, audio)
    }
}

impl std::fmt::Debug for GstCaptureBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GstCaptureBackend")
            .field("camera_device", &self.camera_device)
            .field("microphone_device", &self.microphone_device)
            .field("live_tracks", &lock(&self.sources).len())
            .finish()
    }
}

impl CaptureBackend for GstCaptureBackend {
    type Encoder = GstEncoderSession;

    async fn request_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, CaptureBackendError> {
        let mut tracks = Vec::new();

        if constraints.video {
            self.probe_camera()?;
            tracks.push(self.register(
                TrackKind::Video,
                "camera",
                TrackSource::Video(VideoInput::Camera {
                    device: self.camera_device.clone(),
                }),
            ));
        }
        if constraints.audio {
            if let Err(err) = self.probe_microphone() {
                // Release what was acquired for this request
                for track in &tracks {
                    track.stop();
                }
                return Err(err);
            }
            tracks.push(self.register(
                TrackKind::Audio,
                "microphone",
                TrackSource::Audio(AudioInput {
                    device: self.microphone_device.clone(),
                }),
            ));
        }

        info!("Acquired {} device track(s)", tracks.len());
        Ok(MediaStream::new(tracks))
    }

    fn capture_canvas_stream(
        &self,
        canvas: &Canvas,
        frame_rate: u32,
    ) -> Result<MediaStream, CaptureBackendError> {
        gstreamer::init().map_err(|e| {
            CaptureBackendError::Internal(format!("Failed to initialize GStreamer: {}", e))
        })?;
        if gstreamer::ElementFactory::find("appsrc").is_none() {
            return Err(CaptureBackendError::NotSupported(
                "appsrc is not installed".to_string(),
            ));
        }

        let track = self.register(
            TrackKind::Video,
            &format!("canvas {}", canvas.id()),
            TrackSource::Video(VideoInput::Canvas {
                canvas: canvas.clone(),
                frame_rate,
            }),
        );
        Ok(MediaStream::new(vec![track]))
    }

    fn is_type_supported(&self, mime_type: &str) -> bool {
        if mime_type.is_empty() {
            return true;
        }
        plan_for(mime_type).is_some_and(|plan| plan.resolve(false).is_some())
    }

    fn create_encoder(
        &self,
        stream: &MediaStream,
        options: &EncoderOptions,
        events: EncoderEventSender,
    ) -> Result<Self::Encoder, CaptureBackendError> {
        let (video, audio) = self.inputs_for(stream);
        let video = video.ok_or_else(|| {
            CaptureBackendError::NotSupported("Stream has no recordable video track".to_string())
        })?;

        let mime_type = if options.mime_type.is_empty() {
            DEFAULT_MIME_TYPE.to_string()
        } else {
            options.mime_type.clone()
        };
        let plan = plan_for(&mime_type).ok_or_else(|| {
            CaptureBackendError::NotSupported(format!("Cannot produce {}", mime_type))
        })?;
        let encoding = plan.resolve(audio.is_some()).ok_or_else(|| {
            CaptureBackendError::Encoder(format!("No encoder available for {}", mime_type))
        })?;

        let description = describe_pipeline(&video, audio.as_ref(), &encoding, options);
        GstEncoderSession::new(&description, mime_type, &video, events)
    }
}
