use crate::capture::{
    CaptureBackendError, EncodedChunk, EncoderEvent, EncoderEventSender, EncoderSession,
};
use crate::config::EncoderOptions;
use crate::media::Canvas;
use gstreamer::prelude::*;
use gstreamer::ClockTime;
use gstreamer_app::{AppSink, AppSinkCallbacks, AppSrc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::encoding::{audio_bitrate_property, video_bitrate_property, ResolvedEncoding};

/// How long `stop()` waits for the muxer to drain before giving up
const EOS_TIMEOUT_SECS: u64 = 5;

/// Where the video branch of a pipeline reads from
#[derive(Debug, Clone)]
pub enum VideoInput {
    /// V4L2 device (default device when None)
    Camera { device: Option<String> },
    /// Frames copied from a canvas through `appsrc`
    Canvas { canvas: Canvas, frame_rate: u32 },
}

/// PulseAudio capture (default source when `device` is None)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioInput {
    pub device: Option<String>,
}

fn device_property(device: &Option<String>) -> String {
    device
        .as_ref()
        .map(|d| format!(" device={}", d))
        .unwrap_or_default()
}

fn muxer_properties(muxer: &str) -> &'static str {
    match muxer {
        "webmmux" | "matroskamux" => " streamable=true",
        // appsink is not seekable, so write fragments instead of a trailing moov
        "mp4mux" => " fragment-duration=1000",
        _ => "",
    }
}

/// Build the `gst-launch` description for one encoder session
///
/// - Camera: v4l2src ! videoconvert ! videoscale ! videorate ! encoder ! mux.
/// - Canvas: appsrc name=canvas ! videoconvert ! videorate ! encoder ! mux.
/// - Audio (optional): pulsesrc ! audioconvert ! audioresample ! encoder ! mux.
/// - muxer name=mux ! appsink name=sink
pub fn describe_pipeline(
    video: &VideoInput,
    audio: Option<&AudioInput>,
    encoding: &ResolvedEncoding,
    options: &EncoderOptions,
) -> String {
    let video_source = match video {
        VideoInput::Camera { device } => format!(
            "v4l2src{} ! videoconvert ! videoscale",
            device_property(device)
        ),
        VideoInput::Canvas { .. } => {
            "appsrc name=canvas is-live=true format=time do-timestamp=true ! videoconvert"
                .to_string()
        }
    };

    let mut description = format!(
        "{video_source} ! \
         videorate ! video/x-raw,framerate={fps}/1 ! \
         {video_encoder} {video_props} ! queue ! mux. ",
        video_source = video_source,
        fps = options.frame_rate,
        video_encoder = encoding.video_encoder,
        video_props = video_bitrate_property(encoding.video_encoder, options),
    );

    if let (Some(audio), Some(audio_encoder)) = (audio, encoding.audio_encoder) {
        description.push_str(&format!(
            "pulsesrc{device} ! \
             audioconvert ! \
             audioresample ! audio/x-raw,channels={channels} ! \
             {audio_encoder} {audio_props} ! queue ! mux. ",
            device = device_property(&audio.device),
            channels = options.audio_channels,
            audio_encoder = audio_encoder,
            audio_props = audio_bitrate_property(audio_encoder, options),
        ));
    }

    description.push_str(&format!(
        "{muxer} name=mux{muxer_props} ! appsink name=sink sync=false",
        muxer = encoding.muxer,
        muxer_props = muxer_properties(encoding.muxer),
    ));
    description
}

/// Groups muxer output into timeslice-sized chunks
#[derive(Debug)]
pub(super) struct SliceCollector {
    events: EncoderEventSender,
    timeslice: ClockTime,
    pending: Vec<u8>,
    slice_start: Option<ClockTime>,
    finished: bool,
}

impl SliceCollector {
    pub(super) fn new(events: EncoderEventSender) -> Self {
        Self {
            events,
            timeslice: ClockTime::from_seconds(1),
            pending: Vec::new(),
            slice_start: None,
            finished: false,
        }
    }

    /// Prepare for a new run
    pub(super) fn reset(&mut self, timeslice: Duration) {
        self.timeslice = ClockTime::from_mseconds(timeslice.as_millis() as u64);
        self.pending.clear();
        self.slice_start = None;
        self.finished = false;
    }

    /// Append muxer output; emits a chunk once a timeslice worth has piled up
    ///
    /// Buffers without a timestamp (container headers) join the current slice.
    pub(super) fn push(&mut self, data: &[u8], pts: Option<ClockTime>) {
        if self.finished {
            return;
        }
        self.pending.extend_from_slice(data);

        let Some(pts) = pts else {
            return;
        };
        let start = *self.slice_start.get_or_insert(pts);
        if pts.saturating_sub(start) >= self.timeslice {
            self.flush();
        }
    }

    pub(super) fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let chunk = EncodedChunk {
            data: std::mem::take(&mut self.pending),
            timecode_ms: self.slice_start.take().map(|t| t.mseconds()).unwrap_or(0),
        };
        let _ = self.events.send(EncoderEvent::Data(chunk));
    }

    /// Deliver the tail and signal the end of the run, once
    pub(super) fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.flush();
        self.finished = true;
        let _ = self.events.send(EncoderEvent::Stopped);
    }
}

fn lock(collector: &Mutex<SliceCollector>) -> MutexGuard<'_, SliceCollector> {
    collector.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pushes canvas snapshots into `appsrc` at the stream frame rate
struct CanvasFeed {
    stop: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CanvasFeed {
    fn spawn(appsrc: AppSrc, canvas: Canvas, frame_rate: u32) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let paused = Arc::new(AtomicBool::new(false));
        let period = Duration::from_secs_f64(1.0 / f64::from(frame_rate.max(1)));

        let thread_stop = Arc::clone(&stop);
        let thread_paused = Arc::clone(&paused);
        let thread = std::thread::spawn(move || {
            while !thread_stop.load(Ordering::SeqCst) {
                if !thread_paused.load(Ordering::SeqCst) {
                    let frame = canvas.snapshot().into_raw();
                    if let Err(e) = appsrc.push_buffer(gstreamer::Buffer::from_mut_slice(frame)) {
                        debug!("Canvas feed stopped: {:?}", e);
                        break;
                    }
                }
                std::thread::sleep(period);
            }
        });

        Self {
            stop,
            paused,
            thread: Some(thread),
        }
    }

    fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for CanvasFeed {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Encoder session backed by a GStreamer pipeline ending in an appsink
pub struct GstEncoderSession {
    pipeline: gstreamer::Pipeline,
    mime_type: String,
    collector: Arc<Mutex<SliceCollector>>,
    /// Canvas source and its frame rate, when recording a canvas
    canvas: Option<(AppSrc, Canvas, u32)>,
    feed: Option<CanvasFeed>,
    running: bool,
}

impl GstEncoderSession {
    pub(super) fn new(
        description: &str,
        mime_type: String,
        video: &VideoInput,
        events: EncoderEventSender,
    ) -> Result<Self, CaptureBackendError> {
        gstreamer::init().map_err(|e| {
            CaptureBackendError::Internal(format!("Failed to initialize GStreamer: {}", e))
        })?;

        debug!("Creating encoder pipeline: {}", description);
        let pipeline = gstreamer::parse::launch(description).map_err(|e| {
            CaptureBackendError::Encoder(format!("Failed to create pipeline: {}", e))
        })?;
        let pipeline = pipeline.downcast::<gstreamer::Pipeline>().map_err(|_| {
            CaptureBackendError::Internal("Failed to downcast to Pipeline".to_string())
        })?;

        let sink = pipeline
            .by_name("sink")
            .and_then(|e| e.downcast::<AppSink>().ok())
            .ok_or_else(|| CaptureBackendError::Internal("Pipeline has no appsink".to_string()))?;

        let collector = Arc::new(Mutex::new(SliceCollector::new(events)));
        let on_sample = Arc::clone(&collector);
        let on_eos = Arc::clone(&collector);
        sink.set_callbacks(
            AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gstreamer::FlowError::Eos)?;
                    let buffer = sample.buffer().ok_or(gstreamer::FlowError::Error)?;
                    let map = buffer
                        .map_readable()
                        .map_err(|_| gstreamer::FlowError::Error)?;
                    lock(&on_sample).push(map.as_slice(), buffer.pts());
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .eos(move |_| {
                    debug!("Encoder pipeline reached EOS at appsink");
                    lock(&on_eos).finish();
                })
                .build(),
        );

        let canvas = match video {
            VideoInput::Canvas { canvas, frame_rate } => {
                let appsrc = pipeline
                    .by_name("canvas")
                    .and_then(|e| e.downcast::<AppSrc>().ok())
                    .ok_or_else(|| {
                        CaptureBackendError::Internal("Pipeline has no canvas appsrc".to_string())
                    })?;
                let caps = gstreamer_video::VideoInfo::builder(
                    gstreamer_video::VideoFormat::Rgba,
                    canvas.width(),
                    canvas.height(),
                )
                .fps(gstreamer::Fraction::new(*frame_rate as i32, 1))
                .build()
                .and_then(|info| info.to_caps())
                .map_err(|e| {
                    CaptureBackendError::Encoder(format!("Invalid canvas format: {}", e))
                })?;
                appsrc.set_caps(Some(&caps));
                appsrc.set_format(gstreamer::Format::Time);
                Some((appsrc, canvas.clone(), *frame_rate))
            }
            VideoInput::Camera { .. } => None,
        };

        Ok(Self {
            pipeline,
            mime_type,
            collector,
            canvas,
            feed: None,
            running: false,
        })
    }

    fn set_state(&self, state: gstreamer::State, action: &str) -> Result<(), CaptureBackendError> {
        self.pipeline.set_state(state).map(|_| ()).map_err(|e| {
            // Check bus for more detailed error
            let mut detail = String::new();
            if let Some(bus) = self.pipeline.bus() {
                while let Some(msg) = bus.pop_filtered(&[gstreamer::MessageType::Error]) {
                    if let gstreamer::MessageView::Error(err) = msg.view() {
                        detail = format!(": {}", err.error());
                    }
                }
            }
            error!("Failed to {} pipeline: {}{}", action, e, detail);
            CaptureBackendError::Encoder(format!("Failed to {} pipeline{}", action, detail))
        })
    }

    /// Wait for EOS or an error on the bus, then make sure the run is finalized
    fn watch_for_eos(&self) {
        let Some(bus) = self.pipeline.bus() else {
            warn!("Pipeline has no bus, finalizing immediately");
            lock(&self.collector).finish();
            return;
        };
        let collector = Arc::clone(&self.collector);
        std::thread::spawn(move || {
            use gstreamer::MessageView;
            let msg = bus.timed_pop_filtered(
                ClockTime::from_seconds(EOS_TIMEOUT_SECS),
                &[gstreamer::MessageType::Eos, gstreamer::MessageType::Error],
            );
            match msg.as_ref().map(|m| m.view()) {
                Some(MessageView::Eos(..)) => debug!("Encoder pipeline drained"),
                Some(MessageView::Error(err)) => {
                    error!("Encoder pipeline error: {}", err.error())
                }
                _ => warn!("Timed out waiting for EOS"),
            }
            // No-op when the appsink already saw EOS
            lock(&collector).finish();
        });
    }
}

impl EncoderSession for GstEncoderSession {
    fn start(&mut self, timeslice: Duration) -> Result<(), CaptureBackendError> {
        if self.running {
            return Err(CaptureBackendError::Encoder(
                "Encoder already running".to_string(),
            ));
        }
        info!("Starting encoder pipeline ({})", self.mime_type);

        // A finished run leaves the pipeline at EOS
        self.set_state(gstreamer::State::Null, "reset")?;
        lock(&self.collector).reset(timeslice);
        self.set_state(gstreamer::State::Playing, "start")?;

        if let Some((appsrc, canvas, frame_rate)) = &self.canvas {
            self.feed = Some(CanvasFeed::spawn(appsrc.clone(), canvas.clone(), *frame_rate));
        }
        self.running = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<(), CaptureBackendError> {
        if !self.running {
            return Err(CaptureBackendError::Encoder(
                "Encoder is not running".to_string(),
            ));
        }
        if let Some(feed) = &self.feed {
            feed.set_paused(true);
        }
        self.set_state(gstreamer::State::Paused, "pause")
    }

    fn resume(&mut self) -> Result<(), CaptureBackendError> {
        if !self.running {
            return Err(CaptureBackendError::Encoder(
                "Encoder is not running".to_string(),
            ));
        }
        self.set_state(gstreamer::State::Playing, "resume")?;
        if let Some(feed) = &self.feed {
            feed.set_paused(false);
        }
        Ok(())
    }

    /// Send EOS; the tail chunk and `Stopped` follow once the muxer drains
    fn stop(&mut self) -> Result<(), CaptureBackendError> {
        if !self.running {
            return Err(CaptureBackendError::Encoder(
                "Encoder is not running".to_string(),
            ));
        }
        info!("Stopping encoder pipeline");
        self.running = false;

        if let Some(mut feed) = self.feed.take() {
            feed.shutdown();
        }
        // EOS only flows through a playing pipeline
        self.set_state(gstreamer::State::Playing, "finalize")?;
        if let Some((appsrc, _, _)) = &self.canvas {
            let _ = appsrc.end_of_stream();
        }
        self.pipeline.send_event(gstreamer::event::Eos::new());
        self.watch_for_eos();
        Ok(())
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

impl Drop for GstEncoderSession {
    fn drop(&mut self) {
        self.feed = None;
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}

impl std::fmt::Debug for GstEncoderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GstEncoderSession")
            .field("mime_type", &self.mime_type)
            .field("canvas", &self.canvas.is_some())
            .field("running", &self.running)
            .finish()
    }
}
