// Capture backend abstraction
//
// This module defines the contract between the recorder and the host's
// capture/encode facilities, and provides the platform implementation.

#[cfg(feature = "gstreamer")]
pub mod gst;

#[cfg(test)]
pub mod fake;

use crate::config::EncoderOptions;
use crate::media::{Canvas, MediaConstraints, MediaStream};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

/// Errors that can occur during capture operations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CaptureBackendError {
    /// User or OS refused access to the device
    PermissionDenied(String),
    /// No matching capture device
    DeviceNotFound(String),
    /// Capability missing on this host
    NotSupported(String),
    /// Encoder could not be created or driven
    Encoder(String),
    /// Internal error
    Internal(String),
}

impl fmt::Display for CaptureBackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            Self::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            Self::NotSupported(msg) => write!(f, "Not supported: {}", msg),
            Self::Encoder(msg) => write!(f, "Encoder error: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for CaptureBackendError {}

/// One slice of encoded output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    pub data: Vec<u8>,
    /// Position of the slice in the recording, as reported by the encoder
    pub timecode_ms: u64,
}

/// Notifications an encoder session sends back to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    /// Data became available
    Data(EncodedChunk),
    /// All data for the current run has been delivered
    Stopped,
}

pub type EncoderEventSender = mpsc::UnboundedSender<EncoderEvent>;
pub type EncoderEventReceiver = mpsc::UnboundedReceiver<EncoderEvent>;

/// A stateful encoder bound to one stream
///
/// Calls return once the request has been accepted; encoded output and the
/// final `Stopped` notification arrive on the event channel given to
/// `CaptureBackend::create_encoder`, in emission order.
pub trait EncoderSession: Send {
    /// Begin emitting a chunk every `timeslice`
    fn start(&mut self, timeslice: Duration) -> Result<(), CaptureBackendError>;

    fn pause(&mut self) -> Result<(), CaptureBackendError>;

    fn resume(&mut self) -> Result<(), CaptureBackendError>;

    /// Flush remaining data, then send `EncoderEvent::Stopped`
    fn stop(&mut self) -> Result<(), CaptureBackendError>;

    /// Container/codec actually produced
    fn mime_type(&self) -> &str;
}

/// Trait for capture backends
///
/// Each host implements this trait to provide device access, canvas
/// streams and encoding.
pub trait CaptureBackend: Send + Sync {
    type Encoder: EncoderSession;

    /// Acquire a live device stream
    ///
    /// May wait on a permission prompt. Rejects with `PermissionDenied` or
    /// `DeviceNotFound`.
    fn request_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> impl std::future::Future<Output = Result<MediaStream, CaptureBackendError>> + Send;

    /// Derive a live video stream from a canvas at the given frame rate
    fn capture_canvas_stream(
        &self,
        canvas: &Canvas,
        frame_rate: u32,
    ) -> Result<MediaStream, CaptureBackendError>;

    /// Whether the encoder can produce the given container/codec identifier
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Construct an encoder session for `stream`, armed but not started
    fn create_encoder(
        &self,
        stream: &MediaStream,
        options: &EncoderOptions,
        events: EncoderEventSender,
    ) -> Result<Self::Encoder, CaptureBackendError>;
}

/// Get the capture backend for this build
#[cfg(feature = "gstreamer")]
pub fn default_backend() -> gst::GstCaptureBackend {
    gst::GstCaptureBackend::new()
}

/// Stub backend when no platform adapter is compiled in
#[cfg(not(feature = "gstreamer"))]
pub fn default_backend() -> StubBackend {
    StubBackend
}

/// Backend that reports every capability as unavailable
#[derive(Debug, Default, Clone, Copy)]
pub struct StubBackend;

/// Encoder type for `StubBackend`; never constructed
#[derive(Debug)]
pub enum StubEncoder {}

impl EncoderSession for StubEncoder {
    fn start(&mut self, _timeslice: Duration) -> Result<(), CaptureBackendError> {
        match *self {}
    }

    fn pause(&mut self) -> Result<(), CaptureBackendError> {
        match *self {}
    }

    fn resume(&mut self) -> Result<(), CaptureBackendError> {
        match *self {}
    }

    fn stop(&mut self) -> Result<(), CaptureBackendError> {
        match *self {}
    }

    fn mime_type(&self) -> &str {
        match *self {}
    }
}

impl CaptureBackend for StubBackend {
    type Encoder = StubEncoder;

    async fn request_user_media(
        &self,
        _constraints: &MediaConstraints,
    ) -> Result<MediaStream, CaptureBackendError> {
        Err(CaptureBackendError::NotSupported(
            "Device capture not implemented for this platform".to_string(),
        ))
    }

    fn capture_canvas_stream(
        &self,
        _canvas: &Canvas,
        _frame_rate: u32,
    ) -> Result<MediaStream, CaptureBackendError> {
        Err(CaptureBackendError::NotSupported(
            "Canvas capture not implemented for this platform".to_string(),
        ))
    }

    fn is_type_supported(&self, _mime_type: &str) -> bool {
        false
    }

    fn create_encoder(
        &self,
        _stream: &MediaStream,
        _options: &EncoderOptions,
        _events: EncoderEventSender,
    ) -> Result<Self::Encoder, CaptureBackendError> {
        Err(CaptureBackendError::NotSupported(
            "Encoding not implemented for this platform".to_string(),
        ))
    }
}
