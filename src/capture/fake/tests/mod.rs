use super::*;
use crate::capture::{CaptureBackend, CaptureBackendError, EncoderEvent, EncoderSession};
use crate::config::{EncoderOptions, RecorderOptions};
use crate::media::{Canvas, MediaConstraints, MediaStream};
use std::time::Duration;
use tokio::sync::mpsc;

pub(super) fn test_options(mime_type: &str) -> EncoderOptions {
    RecorderOptions::default().encoder_options(mime_type)
}

/// Drain the channel without waiting
pub(super) fn drain(rx: &mut mpsc::UnboundedReceiver<EncoderEvent>) -> Vec<EncoderEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
