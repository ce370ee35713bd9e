// Capture backend using V4L2/PulseAudio devices and GStreamer encoders
//
// Streams are recorded by a `gst-launch` style pipeline that ends in an
// appsink, so encoded output can be handed back in timeslice chunks.

mod backend;
mod encoding;
mod pipeline;

pub use backend::GstCaptureBackend;
pub use encoding::{detect_available_element, plan_for, EncodingPlan, ResolvedEncoding};
pub use pipeline::{describe_pipeline, AudioInput, GstEncoderSession, VideoInput};
