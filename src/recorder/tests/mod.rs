use super::*;
use crate::capture::fake::{FakeCaptureBackend, FakeError};
use crate::events::{RecorderEvent, StateChangedEvent};
use crate::state::FaultCode;

type FakeRecorder = MediaCaptureRecorder<FakeCaptureBackend>;

pub(super) fn recorder(backend: &FakeCaptureBackend) -> FakeRecorder {
    recorder_with(backend, RecorderOptions::default())
}

pub(super) fn recorder_with(backend: &FakeCaptureBackend, options: RecorderOptions) -> FakeRecorder {
    MediaCaptureRecorder::new(backend.clone(), options).unwrap()
}

/// Recorder armed on a fresh camera stream
pub(super) async fn camera_recorder(backend: &FakeCaptureBackend) -> (FakeRecorder, VideoElement) {
    let recorder = recorder(backend);
    let video = VideoElement::new();
    assert!(recorder.initialize_with_capture(&video).await);
    (recorder, video)
}

/// Move the paused clock forward in small steps so timers fire in order
pub(super) async fn advance(ms: u64) {
    let mut remaining = ms;
    while remaining > 0 {
        let step = remaining.min(100);
        tokio::time::advance(Duration::from_millis(step)).await;
        tokio::task::yield_now().await;
        remaining -= step;
    }
}

pub(super) fn drain_events(rx: &mut broadcast::Receiver<RecorderEvent>) -> Vec<RecorderEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub(super) fn assert_close(actual: Duration, expected_ms: u64, tolerance_ms: u64) {
    let actual_ms = actual.as_millis() as u64;
    assert!(
        actual_ms.abs_diff(expected_ms) <= tolerance_ms,
        "expected ~{} ms, got {} ms",
        expected_ms,
        actual_ms
    );
}

mod frames;
