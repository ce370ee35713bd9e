use super::*;
use image::{Rgba, RgbaImage};

// Canvas capture and frame-copy loop tests

const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

fn frame(color: Rgba<u8>) -> RgbaImage {
    RgbaImage::from_pixel(4, 4, color)
}

fn canvas_options() -> RecorderOptions {
    RecorderOptions {
        frame_rate: 10,
        ..Default::default()
    }
}

fn painted(canvas: &Canvas) -> Rgba<u8> {
    *canvas.snapshot().get_pixel(0, 0)
}

#[tokio::test]
async fn test_canvas_recording_with_audio() {
    let backend = FakeCaptureBackend::succeeding();
    let recorder = recorder(&backend);
    let mut events = recorder.subscribe();
    let canvas = Canvas::new(8, 8);

    assert!(recorder.initialize_with_canvas(&canvas, true).await);

    let stream = recorder.stream().unwrap();
    assert_eq!(stream.video_tracks().len(), 1);
    assert_eq!(stream.audio_tracks().len(), 1);
    assert_eq!(recorder.mode(), Some(CaptureMode::Canvas));
    assert_eq!(
        drain_events(&mut events)[0],
        RecorderEvent::PermissionNeeded(PermissionNeededEvent {
            kind: PermissionKind::Microphone
        })
    );
}

#[tokio::test]
async fn test_canvas_recording_without_audio() {
    let backend = FakeCaptureBackend::succeeding();
    let recorder = recorder(&backend);

    assert!(recorder.initialize_with_canvas(&Canvas::new(8, 8), false).await);
    assert!(recorder.stream().unwrap().audio_tracks().is_empty());
    assert_eq!(backend.user_media_request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_microphone_denied_records_video_only() {
    let backend = FakeCaptureBackend::succeeding();
    backend.set_microphone_error(Some(FakeError::PermissionDenied));
    let recorder = recorder(&backend);

    assert!(recorder.initialize_with_canvas(&Canvas::new(8, 8), true).await);
    let stream = recorder.stream().unwrap();
    assert_eq!(stream.video_tracks().len(), 1);
    assert!(stream.audio_tracks().is_empty());
    assert!(recorder.last_error().is_none());

    assert!(recorder.start());
    advance(1000).await;
    assert!(!recorder.stop().await.unwrap().data.is_empty());
}

#[tokio::test]
async fn test_canvas_capture_failure() {
    let backend = FakeCaptureBackend::succeeding();
    backend.set_canvas_capture_fails(true);
    let recorder = recorder(&backend);

    assert!(!recorder.initialize_with_canvas(&Canvas::new(8, 8), true).await);
    assert!(!recorder.start());
    assert_eq!(
        recorder.last_error().map(|e| e.code),
        Some(FaultCode::CaptureUnsupported)
    );
    assert_eq!(backend.user_media_request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_frame_loop_paints_canvas() {
    let backend = FakeCaptureBackend::succeeding();
    let recorder = recorder_with(&backend, canvas_options());
    let canvas = Canvas::new(8, 8);
    let video = VideoElement::new();
    video.present_frame(frame(RED));

    assert!(recorder.initialize_with_canvas(&canvas, false).await);
    recorder.attach_frame_source(video.clone());
    assert!(recorder.start());
    advance(200).await;

    assert_eq!(painted(&canvas), RED);
}

#[tokio::test(start_paused = true)]
async fn test_frame_loop_idle_while_paused() {
    let backend = FakeCaptureBackend::succeeding();
    let recorder = recorder_with(&backend, canvas_options());
    let canvas = Canvas::new(8, 8);
    let video = VideoElement::new();
    video.present_frame(frame(RED));

    assert!(recorder.initialize_with_canvas(&canvas, false).await);
    recorder.attach_frame_source(video.clone());
    assert!(recorder.start());
    advance(200).await;

    assert!(recorder.pause());
    video.present_frame(frame(BLUE));
    advance(300).await;
    assert_eq!(painted(&canvas), RED);

    assert!(recorder.resume());
    advance(200).await;
    assert_eq!(painted(&canvas), BLUE);
}

#[tokio::test(start_paused = true)]
async fn test_frame_loop_needs_ready_source() {
    let backend = FakeCaptureBackend::succeeding();
    let recorder = recorder_with(&backend, canvas_options());
    let canvas = Canvas::new(8, 8);
    let video = VideoElement::new();

    assert!(recorder.initialize_with_canvas(&canvas, false).await);
    recorder.attach_frame_source(video.clone());
    assert!(recorder.start());

    // Source became ready after start; the loop was never armed
    video.present_frame(frame(RED));
    advance(300).await;
    assert_eq!(painted(&canvas), Rgba([0, 0, 0, 0]));
}

#[tokio::test(start_paused = true)]
async fn test_frame_loop_ends_with_recording() {
    let backend = FakeCaptureBackend::succeeding();
    let recorder = recorder_with(&backend, canvas_options());
    let canvas = Canvas::new(8, 8);
    let video = VideoElement::new();
    video.present_frame(frame(RED));

    assert!(recorder.initialize_with_canvas(&canvas, false).await);
    recorder.attach_frame_source(video.clone());
    assert!(recorder.start());
    advance(200).await;
    recorder.stop().await.unwrap();

    video.present_frame(frame(BLUE));
    advance(300).await;
    assert_eq!(painted(&canvas), RED);
}

