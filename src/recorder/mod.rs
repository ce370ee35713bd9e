// Recording sessions over a camera or a canvas
//
// `MediaCaptureRecorder` owns one capture session: the stream it records,
// the encoder armed on it, the chunks collected while recording and the
// active-time bookkeeping. All platform work goes through a CaptureBackend.

mod blob;
mod frame_loop;
mod timing;

pub use blob::{Chunk, RecordingBlob};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::capture::{
    CaptureBackend, CaptureBackendError, EncoderEvent, EncoderEventReceiver, EncoderSession,
};
use crate::codec;
use crate::config::{ConfigError, EncoderOptions, RecorderOptions};
use crate::events::{
    EventBus, InitializedEvent, PermissionKind, PermissionNeededEvent, RecorderEvent,
    RecordingStartedEvent, RecordingStoppedEvent,
};
use crate::media::{Canvas, FrameSource, MediaConstraints, MediaStream, MediaTrack, VideoElement};
use crate::state::{RecorderFault, RecorderState, StateMachine};

use blob::ChunkBuffer;
use frame_loop::FrameCopyLoop;
use timing::Timing;

/// Interval at which the encoder is asked for a chunk
pub const TIMESLICE: Duration = Duration::from_millis(1000);

/// Where the recorded stream comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Stream derived from a canvas, optionally with microphone audio
    Canvas,
    /// Live camera/microphone stream
    Device,
}

/// Errors surfaced by `stop()`
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderError {
    /// Nothing is being recorded
    NoActiveRecording,
    /// Another `stop()` is still waiting for the encoder
    StopInProgress,
    /// The encoder refused to stop
    Encoder(CaptureBackendError),
    /// The encoder went away before finalizing
    EncoderClosed,
    /// `dispose()` ran while the recording was being finalized
    Disposed,
}

impl fmt::Display for RecorderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoActiveRecording => write!(f, "No active recording"),
            Self::StopInProgress => write!(f, "Recording is already being finalized"),
            Self::Encoder(err) => write!(f, "Failed to stop encoder: {}", err),
            Self::EncoderClosed => write!(f, "Encoder closed before finalizing"),
            Self::Disposed => write!(f, "Recorder disposed during finalization"),
        }
    }
}

impl std::error::Error for RecorderError {}

/// Resources acquired by one successful initialization
struct Session<E> {
    mode: CaptureMode,
    stream: MediaStream,
    /// Tracks this session created and must release; borrowed ones are not listed
    owned_tracks: Vec<MediaTrack>,
    canvas: Option<Canvas>,
    encoder: Option<E>,
    encoder_events: Option<EncoderEventReceiver>,
    encoder_options: EncoderOptions,
}

impl<E: EncoderSession> Session<E> {
    /// Identifier the finished blob is tagged with
    fn blob_mime_type(&self) -> String {
        match (&self.encoder, self.encoder_options.mime_type.is_empty()) {
            (Some(encoder), true) => encoder.mime_type().to_string(),
            _ => self.encoder_options.mime_type.clone(),
        }
    }

    fn release_owned_tracks(&self) {
        for track in &self.owned_tracks {
            track.stop();
        }
    }
}

struct Inner<E> {
    machine: StateMachine,
    session: Option<Session<E>>,
    frame_source: Option<Arc<dyn FrameSource>>,
    frame_loop: Option<FrameCopyLoop>,
    chunks: ChunkBuffer,
    timing: Timing,
    recording_id: Option<Uuid>,
    /// A `stop()` is waiting for the encoder to finalize
    finalizing: bool,
    /// Bumped by every `dispose()`
    generation: u64,
    /// Tracks from an initialization whose encoder could not be created
    unarmed_tracks: Vec<MediaTrack>,
}

impl<E> Inner<E> {
    fn release_unarmed_tracks(&mut self) {
        for track in self.unarmed_tracks.drain(..) {
            track.stop();
        }
    }

    /// Move whatever the encoder has emitted so far into the chunk buffer
    fn collect_pending(&mut self) {
        let Some(events) = self
            .session
            .as_mut()
            .and_then(|s| s.encoder_events.as_mut())
        else {
            return;
        };
        while let Ok(event) = events.try_recv() {
            if let EncoderEvent::Data(chunk) = event {
                self.chunks.push(chunk);
            }
        }
    }
}

/// Start/pause/resume/stop recording over a camera or canvas stream
///
/// Every method takes `&self`, so the recorder can be shared behind an `Arc`
/// and `dispose()` may be called while an initializer is still waiting on a
/// permission prompt. Dropping the recorder disposes it.
pub struct MediaCaptureRecorder<B: CaptureBackend> {
    backend: B,
    options: RecorderOptions,
    inner: Mutex<Inner<B::Encoder>>,
    state_tx: watch::Sender<RecorderState>,
    events: EventBus,
}

impl<B: CaptureBackend> MediaCaptureRecorder<B> {
    /// Create an empty, uninitialized recorder
    pub fn new(backend: B, options: RecorderOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        let (state_tx, _) = watch::channel(RecorderState::Inactive);

        Ok(Self {
            backend,
            options,
            inner: Mutex::new(Inner {
                machine: StateMachine::new(),
                session: None,
                frame_source: None,
                frame_loop: None,
                chunks: ChunkBuffer::default(),
                timing: Timing::default(),
                recording_id: None,
                finalizing: false,
                generation: 0,
                unarmed_tracks: Vec::new(),
            }),
            state_tx,
            events: EventBus::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner<B::Encoder>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a canvas, optionally mixing in microphone audio
    ///
    /// Microphone failure is not fatal; the session records video only.
    pub async fn initialize_with_canvas(&self, canvas: &Canvas, include_audio: bool) -> bool {
        let Some(generation) = self.begin_initialization() else {
            return false;
        };

        let stream = match self
            .backend
            .capture_canvas_stream(canvas, self.options.frame_rate)
        {
            Ok(stream) => stream,
            Err(err) => {
                self.record_fault(&err);
                error!("Error initializing canvas recorder: {}", err);
                return false;
            }
        };
        let mut owned_tracks = stream.tracks();

        if include_audio {
            self.events
                .emit(RecorderEvent::PermissionNeeded(PermissionNeededEvent {
                    kind: PermissionKind::Microphone,
                }));
            match self
                .backend
                .request_user_media(&MediaConstraints::audio_only())
                .await
            {
                Ok(audio) => {
                    for track in audio.audio_tracks() {
                        stream.add_track(track.clone());
                        owned_tracks.push(track);
                    }
                }
                Err(err) => warn!("Could not get audio stream, recording video only: {}", err),
            }
        }

        self.finish_initialization(
            generation,
            CaptureMode::Canvas,
            stream,
            owned_tracks,
            Some(canvas.clone()),
        )
    }

    /// Record a camera, reusing the live stream already attached to `video`
    ///
    /// A stream whose tracks have all ended is not reused; a new one is
    /// requested instead. A reused stream is borrowed: `dispose()` leaves its tracks running.
    /// Otherwise a camera+microphone stream is requested and attached to
    /// `video` for preview.
    pub async fn initialize_with_capture(&self, video: &VideoElement) -> bool {
        let Some(generation) = self.begin_initialization() else {
            return false;
        };

        if let Some(stream) = video.src_object().filter(MediaStream::is_active) {
            debug!("Reusing stream {} already attached to video element", stream.id());
            return self.finish_initialization(
                generation,
                CaptureMode::Device,
                stream,
                Vec::new(),
                None,
            );
        }

        self.events
            .emit(RecorderEvent::PermissionNeeded(PermissionNeededEvent {
                kind: PermissionKind::Camera,
            }));
        let stream = match self
            .backend
            .request_user_media(&MediaConstraints::audio_video())
            .await
        {
            Ok(stream) => stream,
            Err(err) => {
                self.record_fault(&err);
                error!("Error initializing camera recorder: {}", err);
                return false;
            }
        };

        let owned_tracks = stream.tracks();
        let armed = self.finish_initialization(
            generation,
            CaptureMode::Device,
            stream.clone(),
            owned_tracks,
            None,
        );
        if armed {
            video.set_src_object(Some(stream));
        }
        armed
    }

    /// Check that a new session may be set up; returns the current generation
    fn begin_initialization(&self) -> Option<u64> {
        let inner = self.lock();
        if inner.finalizing || inner.machine.state() != RecorderState::Inactive {
            debug!(
                "Cannot initialize while {:?}{}",
                inner.machine.state(),
                if inner.finalizing { " (finalizing)" } else { "" }
            );
            return None;
        }
        Some(inner.generation)
    }

    /// Install the stream, resolve the codec and arm the encoder
    fn finish_initialization(
        &self,
        generation: u64,
        mode: CaptureMode,
        stream: MediaStream,
        owned_tracks: Vec<MediaTrack>,
        canvas: Option<Canvas>,
    ) -> bool {
        let mut inner = self.lock();

        if inner.generation != generation
            || inner.finalizing
            || inner.machine.state() != RecorderState::Inactive
        {
            drop(inner);
            warn!("Recorder changed while waiting for capture permission, releasing stream");
            for track in &owned_tracks {
                track.stop();
            }
            return false;
        }

        if let Some(previous) = inner.session.take() {
            debug!("Replacing previous capture session");
            previous.release_owned_tracks();
        }
        inner.release_unarmed_tracks();
        inner.chunks.clear();

        let resolved = codec::resolve_mime_type(&self.options.mime_type, |mime| {
            self.backend.is_type_supported(mime)
        });
        let encoder_options = self.options.encoder_options(&resolved);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let encoder = match self
            .backend
            .create_encoder(&stream, &encoder_options, events_tx)
        {
            Ok(encoder) => encoder,
            Err(err) => {
                error!("Error creating encoder: {}", err);
                let fault = RecorderFault::from(&err);
                inner.machine.set_error(fault.clone());
                // Held until dispose() or the next initialization
                inner.unarmed_tracks = owned_tracks;
                drop(inner);
                self.events.emit_error(&fault);
                return false;
            }
        };

        inner.session = Some(Session {
            mode,
            stream,
            owned_tracks,
            canvas,
            encoder: Some(encoder),
            encoder_events: Some(events_rx),
            encoder_options: encoder_options.clone(),
        });
        drop(inner);

        info!("Encoder initialized with options: {:?}", encoder_options);
        self.events.emit(RecorderEvent::Initialized(InitializedEvent {
            mode,
            mime_type: encoder_options.mime_type,
        }));
        true
    }

    fn record_fault(&self, err: &CaptureBackendError) {
        let fault = RecorderFault::from(err);
        self.lock().machine.set_error(fault.clone());
        self.events.emit_error(&fault);
    }

    /// Supply the playback element whose frames are copied onto the canvas
    pub fn attach_frame_source(&self, source: impl FrameSource + 'static) {
        self.lock().frame_source = Some(Arc::new(source));
    }

    /// Begin recording (Inactive → Recording)
    ///
    /// Returns false without an armed encoder or when already recording.
    pub fn start(&self) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if inner.finalizing || inner.machine.state() != RecorderState::Inactive {
            debug!("Ignoring start while {:?}", inner.machine.state());
            return false;
        }
        let Some(session) = inner.session.as_mut() else {
            debug!("Ignoring start: recorder not initialized");
            return false;
        };
        let Some(encoder) = session.encoder.as_mut() else {
            debug!("Ignoring start: no encoder armed");
            return false;
        };

        // Residue from a previous run
        if let Some(events) = session.encoder_events.as_mut() {
            while events.try_recv().is_ok() {}
        }
        inner.chunks.clear();

        if let Err(err) = encoder.start(TIMESLICE) {
            error!("Error starting recording: {}", err);
            inner.machine.set_error(RecorderFault::from(&err));
            return false;
        }
        if let Err(err) = inner.machine.start() {
            debug!("{}", err);
            return false;
        }

        let recording_id = Uuid::new_v4();
        inner.recording_id = Some(recording_id);
        inner.timing.start(Instant::now());
        self.state_tx.send_replace(RecorderState::Recording);

        if session.mode == CaptureMode::Canvas {
            if let (Some(canvas), Some(source)) = (&session.canvas, &inner.frame_source) {
                if source.has_current_data() {
                    inner.frame_loop = FrameCopyLoop::spawn(
                        canvas.clone(),
                        Arc::clone(source),
                        self.options.frame_rate,
                        self.state_tx.subscribe(),
                    );
                }
            }
        }

        let mime_type = session.blob_mime_type();
        drop(guard);

        info!("Recording {} started ({})", recording_id, mime_type);
        self.events
            .emit_state_change(RecorderState::Inactive, RecorderState::Recording);
        self.events
            .emit(RecorderEvent::RecordingStarted(RecordingStartedEvent {
                session_id: recording_id,
                mime_type,
            }));
        true
    }

    /// Suspend recording (Recording → Paused)
    pub fn pause(&self) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if inner.finalizing || inner.machine.state() != RecorderState::Recording {
            debug!("Ignoring pause while {:?}", inner.machine.state());
            return false;
        }
        let Some(encoder) = inner.session.as_mut().and_then(|s| s.encoder.as_mut()) else {
            return false;
        };
        if let Err(err) = encoder.pause() {
            error!("Error pausing recording: {}", err);
            return false;
        }
        if let Err(err) = inner.machine.pause() {
            debug!("{}", err);
            return false;
        }

        inner.timing.pause(Instant::now());
        inner.collect_pending();
        self.state_tx.send_replace(RecorderState::Paused);
        drop(guard);

        self.events
            .emit_state_change(RecorderState::Recording, RecorderState::Paused);
        true
    }

    /// Continue recording (Paused → Recording)
    pub fn resume(&self) -> bool {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if inner.finalizing || inner.machine.state() != RecorderState::Paused {
            debug!("Ignoring resume while {:?}", inner.machine.state());
            return false;
        }
        let Some(encoder) = inner.session.as_mut().and_then(|s| s.encoder.as_mut()) else {
            return false;
        };
        if let Err(err) = encoder.resume() {
            error!("Error resuming recording: {}", err);
            return false;
        }
        if let Err(err) = inner.machine.resume() {
            debug!("{}", err);
            return false;
        }

        inner.timing.resume(Instant::now());
        self.state_tx.send_replace(RecorderState::Recording);
        drop(guard);

        self.events
            .emit_state_change(RecorderState::Paused, RecorderState::Recording);
        true
    }

    /// Finish recording and return everything captured as one blob
    ///
    /// Waits for the encoder to flush. The stream stays open so the session
    /// can record again.
    pub async fn stop(&self) -> Result<RecordingBlob, RecorderError> {
        let (mut encoder_events, generation, previous) = {
            let mut guard = self.lock();
            let inner = &mut *guard;

            if inner.finalizing {
                return Err(RecorderError::StopInProgress);
            }
            let previous = inner.machine.state();
            if previous == RecorderState::Inactive {
                return Err(RecorderError::NoActiveRecording);
            }
            let Some(session) = inner.session.as_mut() else {
                return Err(RecorderError::NoActiveRecording);
            };
            let Some(encoder) = session.encoder.as_mut() else {
                return Err(RecorderError::NoActiveRecording);
            };

            inner.timing.finish(Instant::now());
            inner.frame_loop = None;

            if let Err(err) = encoder.stop() {
                error!("Error stopping recording: {}", err);
                inner.machine.reset();
                self.state_tx.send_replace(RecorderState::Inactive);
                drop(guard);
                self.events
                    .emit_state_change(previous, RecorderState::Inactive);
                return Err(RecorderError::Encoder(err));
            }
            let Some(encoder_events) = session.encoder_events.take() else {
                warn!("Encoder has no event channel, disarming it");
                session.encoder = None;
                inner.machine.reset();
                self.state_tx.send_replace(RecorderState::Inactive);
                drop(guard);
                self.events
                    .emit_state_change(previous, RecorderState::Inactive);
                return Err(RecorderError::EncoderClosed);
            };

            inner.finalizing = true;
            (encoder_events, inner.generation, previous)
        };

        let mut received = Vec::new();
        let mut finalized = false;
        while let Some(event) = encoder_events.recv().await {
            match event {
                EncoderEvent::Data(chunk) => received.push(chunk),
                EncoderEvent::Stopped => {
                    finalized = true;
                    break;
                }
            }
        }

        let mut guard = self.lock();
        let inner = &mut *guard;

        if inner.generation != generation {
            return Err(RecorderError::Disposed);
        }
        inner.finalizing = false;

        let Some(session) = inner.session.as_mut() else {
            return Err(RecorderError::Disposed);
        };
        let mime_type = session.blob_mime_type();

        // Chunks collected earlier were emitted before anything still queued
        for chunk in received {
            inner.chunks.push(chunk);
        }
        let (data, chunk_count) = inner.chunks.drain_concat();
        let duration = inner.timing.elapsed(Instant::now());
        let session_id = inner.recording_id.take().unwrap_or_else(Uuid::new_v4);

        if let Err(err) = inner.machine.stop() {
            debug!("{}", err);
            inner.machine.reset();
        }
        self.state_tx.send_replace(RecorderState::Inactive);

        if !finalized {
            // No further chunks can be collected from this encoder
            warn!("Encoder closed before finalizing, disarming it");
            session.encoder = None;
            drop(guard);
            self.events
                .emit_state_change(previous, RecorderState::Inactive);
            return Err(RecorderError::EncoderClosed);
        }
        session.encoder_events = Some(encoder_events);
        drop(guard);

        let blob = RecordingBlob {
            session_id,
            mime_type,
            data,
            duration,
            chunk_count,
        };
        info!(
            "Recording {} stopped: {} bytes in {} chunks, {} ms",
            blob.session_id,
            blob.size(),
            blob.chunk_count,
            blob.duration_ms()
        );

        self.events
            .emit_state_change(previous, RecorderState::Inactive);
        self.events
            .emit(RecorderEvent::RecordingStopped(RecordingStoppedEvent {
                session_id: blob.session_id,
                mime_type: blob.mime_type.clone(),
                duration_ms: blob.duration_ms(),
                size_bytes: blob.size(),
                chunk_count: blob.chunk_count,
            }));
        Ok(blob)
    }

    /// Release everything this session owns; safe to call any number of times
    ///
    /// Stops an active encoder (errors are logged), stops owned tracks,
    /// cancels the frame-copy loop and drops all handles. A permission
    /// request still in flight will have its stream released on arrival.
    pub fn dispose(&self) {
        let (session, frame_loop, unarmed_tracks, previous, was_finalizing) = {
            let mut guard = self.lock();
            let inner = &mut *guard;

            inner.generation += 1;
            let previous = inner.machine.state();
            let was_finalizing = inner.finalizing;
            inner.machine.reset();
            inner.finalizing = false;
            inner.chunks.clear();
            inner.recording_id = None;
            inner.frame_source = None;
            self.state_tx.send_replace(RecorderState::Inactive);

            (
                inner.session.take(),
                inner.frame_loop.take(),
                std::mem::take(&mut inner.unarmed_tracks),
                previous,
                was_finalizing,
            )
        };

        let had_resources =
            session.is_some() || frame_loop.is_some() || !unarmed_tracks.is_empty();
        drop(frame_loop);
        for track in &unarmed_tracks {
            track.stop();
        }

        if let Some(mut session) = session {
            if previous != RecorderState::Inactive && !was_finalizing {
                if let Some(encoder) = session.encoder.as_mut() {
                    if let Err(err) = encoder.stop() {
                        error!("Error stopping recorder during disposal: {}", err);
                    }
                }
            }
            session.release_owned_tracks();
            let borrowed = session
                .stream
                .tracks()
                .iter()
                .filter(|track| !session.owned_tracks.contains(track))
                .count();
            debug!(
                "Released {} owned track(s), left {} borrowed",
                session.owned_tracks.len(),
                borrowed
            );
        }

        self.events
            .emit_state_change(previous, RecorderState::Inactive);
        if had_resources {
            info!("Recorder disposed");
            self.events.emit(RecorderEvent::Disposed);
        }
    }

    /// Current state; no side effects
    pub fn state(&self) -> RecorderState {
        self.lock().machine.state()
    }

    /// Active recording time, excluding pauses
    ///
    /// Grows with the clock while recording, holds at the pause instant while
    /// paused, and keeps the final value once stopped.
    pub fn duration(&self) -> Duration {
        self.lock().timing.elapsed(Instant::now())
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration().as_millis() as u64
    }

    pub fn mode(&self) -> Option<CaptureMode> {
        self.lock().session.as_ref().map(|s| s.mode)
    }

    /// Whether an encoder is armed and `start()` can succeed from Inactive
    pub fn is_armed(&self) -> bool {
        self.lock()
            .session
            .as_ref()
            .is_some_and(|s| s.encoder.is_some())
    }

    /// Identifier chosen from the fallback chain; empty means backend default
    pub fn resolved_mime_type(&self) -> Option<String> {
        self.encoder_options().map(|o| o.mime_type)
    }

    pub fn encoder_options(&self) -> Option<EncoderOptions> {
        self.lock()
            .session
            .as_ref()
            .map(|s| s.encoder_options.clone())
    }

    pub fn options(&self) -> &RecorderOptions {
        &self.options
    }

    /// The stream being recorded, if initialized
    pub fn stream(&self) -> Option<MediaStream> {
        self.lock().session.as_ref().map(|s| s.stream.clone())
    }

    /// Chunks collected so far in the current recording
    pub fn chunk_count(&self) -> usize {
        let mut inner = self.lock();
        inner.collect_pending();
        inner.chunks.len()
    }

    pub fn last_error(&self) -> Option<RecorderFault> {
        self.lock().machine.last_error().cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.events.subscribe()
    }

    /// Watch state changes without polling
    pub fn watch_state(&self) -> watch::Receiver<RecorderState> {
        self.state_tx.subscribe()
    }
}

impl<B: CaptureBackend> Drop for MediaCaptureRecorder<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<B: CaptureBackend> fmt::Debug for MediaCaptureRecorder<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("MediaCaptureRecorder")
            .field("state", &inner.machine.state())
            .field("mode", &inner.session.as_ref().map(|s| s.mode))
            .field("chunks", &inner.chunks.len())
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests;
