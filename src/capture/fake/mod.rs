// Fake capture backend for testing
//
// This module provides an in-memory implementation of CaptureBackend for use
// in tests without real devices or codecs.

mod backend;
mod encoder;

pub use backend::{FakeCaptureBackend, FakeError};
pub use encoder::FakeEncoder;

#[cfg(test)]
mod tests;
