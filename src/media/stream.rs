use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Audio,
    Video,
}

/// What to ask the device layer for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub video: bool,
    pub audio: bool,
}

impl MediaConstraints {
    pub const fn audio_only() -> Self {
        Self {
            video: false,
            audio: true,
        }
    }

    pub const fn audio_video() -> Self {
        Self {
            video: true,
            audio: true,
        }
    }
}

type StopHook = Box<dyn Fn() + Send + Sync>;

struct TrackInner {
    id: Uuid,
    kind: TrackKind,
    label: String,
    live: AtomicBool,
    on_stop: Option<StopHook>,
}

/// A single live audio or video track
///
/// Clones share the same underlying track. Stopping is one-way: the
/// backend's stop hook runs at most once, however many clones call `stop`.
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    pub fn new(kind: TrackKind, label: impl Into<String>) -> Self {
        Self::build(kind, label.into(), None)
    }

    /// Create a track whose release is signalled back to the backend
    pub fn with_stop_hook(
        kind: TrackKind,
        label: impl Into<String>,
        on_stop: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self::build(kind, label.into(), Some(Box::new(on_stop)))
    }

    fn build(kind: TrackKind, label: String, on_stop: Option<StopHook>) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: Uuid::new_v4(),
                kind,
                label,
                live: AtomicBool::new(true),
                on_stop,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::SeqCst)
    }

    /// Stop the track and release the device behind it
    pub fn stop(&self) {
        if self.inner.live.swap(false, Ordering::SeqCst) {
            if let Some(hook) = &self.inner.on_stop {
                hook();
            }
        }
    }
}

impl PartialEq for MediaTrack {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("label", &self.inner.label)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Shared, mutable set of tracks
///
/// Cloning yields another handle to the same stream, so tracks added
/// through one handle are visible through all of them.
#[derive(Clone)]
pub struct MediaStream {
    id: Uuid,
    tracks: Arc<Mutex<Vec<MediaTrack>>>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tracks: Arc::new(Mutex::new(tracks)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn add_track(&self, track: MediaTrack) {
        let mut tracks = self.tracks.lock().unwrap_or_else(PoisonError::into_inner);
        if !tracks.contains(&track) {
            tracks.push(track);
        }
    }

    pub fn tracks(&self) -> Vec<MediaTrack> {
        self.tracks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn audio_tracks(&self) -> Vec<MediaTrack> {
        self.tracks_of(TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> Vec<MediaTrack> {
        self.tracks_of(TrackKind::Video)
    }

    fn tracks_of(&self, kind: TrackKind) -> Vec<MediaTrack> {
        self.tracks()
            .into_iter()
            .filter(|t| t.kind() == kind)
            .collect()
    }

    /// True while at least one track is live
    pub fn is_active(&self) -> bool {
        self.tracks().iter().any(MediaTrack::is_live)
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("tracks", &self.tracks())
            .finish()
    }
}
