// In-memory encoder session
//
// Emits numbered text chunks ("[1]", "[2]", ...) every timeslice while
// running and not paused, so tests can check ordering of the final blob.

use crate::capture::{
    CaptureBackendError, EncodedChunk, EncoderEvent, EncoderEventSender, EncoderSession,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::backend::{FakeCounters, FakeEncoderFlags};

/// Sequence state shared with the emission task
#[derive(Debug, Default)]
struct Emitter {
    paused: AtomicBool,
    next_seq: AtomicU64,
    timeslice_ms: AtomicU64,
}

impl Emitter {
    fn next_chunk(&self) -> EncodedChunk {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        EncodedChunk {
            data: format!("[{}]", seq).into_bytes(),
            timecode_ms: (seq - 1) * self.timeslice_ms.load(Ordering::SeqCst),
        }
    }
}

pub struct FakeEncoder {
    mime_type: String,
    events: EncoderEventSender,
    counters: Arc<FakeCounters>,
    flags: Arc<FakeEncoderFlags>,
    emitter: Arc<Emitter>,
    task: Option<JoinHandle<()>>,
}

impl FakeEncoder {
    pub(super) fn new(
        mime_type: String,
        events: EncoderEventSender,
        counters: Arc<FakeCounters>,
        flags: Arc<FakeEncoderFlags>,
    ) -> Self {
        Self {
            mime_type,
            events,
            counters,
            flags,
            emitter: Arc::new(Emitter::default()),
            task: None,
        }
    }

    fn is_running(&self) -> bool {
        self.task.is_some()
    }

    fn send_chunk(events: &EncoderEventSender, flags: &FakeEncoderFlags, emitter: &Emitter) -> bool {
        if flags.emit_empty_chunks.load(Ordering::SeqCst) {
            let empty = EncodedChunk {
                data: Vec::new(),
                timecode_ms: 0,
            };
            if events.send(EncoderEvent::Data(empty)).is_err() {
                return false;
            }
        }
        events.send(EncoderEvent::Data(emitter.next_chunk())).is_ok()
    }
}

impl EncoderSession for FakeEncoder {
    fn start(&mut self, timeslice: Duration) -> Result<(), CaptureBackendError> {
        self.counters.encoder_starts.fetch_add(1, Ordering::SeqCst);

        if self.is_running() {
            return Err(CaptureBackendError::Encoder(
                "Encoder already running".to_string(),
            ));
        }

        self.emitter.paused.store(false, Ordering::SeqCst);
        self.emitter.next_seq.store(0, Ordering::SeqCst);
        self.emitter
            .timeslice_ms
            .store(timeslice.as_millis() as u64, Ordering::SeqCst);

        let events = self.events.clone();
        let flags = Arc::clone(&self.flags);
        let emitter = Arc::clone(&self.emitter);
        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + timeslice, timeslice);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if emitter.paused.load(Ordering::SeqCst) {
                    continue;
                }
                if !Self::send_chunk(&events, &flags, &emitter) {
                    break;
                }
            }
        }));
        Ok(())
    }

    fn pause(&mut self) -> Result<(), CaptureBackendError> {
        self.counters.encoder_pauses.fetch_add(1, Ordering::SeqCst);

        if !self.is_running() || self.emitter.paused.swap(true, Ordering::SeqCst) {
            return Err(CaptureBackendError::Encoder(
                "Encoder is not recording".to_string(),
            ));
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<(), CaptureBackendError> {
        self.counters.encoder_resumes.fetch_add(1, Ordering::SeqCst);

        if !self.is_running() || !self.emitter.paused.swap(false, Ordering::SeqCst) {
            return Err(CaptureBackendError::Encoder(
                "Encoder is not paused".to_string(),
            ));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureBackendError> {
        self.counters.encoder_stops.fetch_add(1, Ordering::SeqCst);

        if self.flags.stop_fails.load(Ordering::SeqCst) {
            return Err(CaptureBackendError::Encoder(
                "Encoder already stopped by host".to_string(),
            ));
        }

        let Some(task) = self.task.take() else {
            return Err(CaptureBackendError::Encoder(
                "Encoder is not running".to_string(),
            ));
        };
        task.abort();

        if self.flags.close_on_stop.load(Ordering::SeqCst) {
            let (closed, _) = mpsc::unbounded_channel();
            drop(std::mem::replace(&mut self.events, closed));
            return Ok(());
        }

        // Flush whatever the current slice holds, then finalize
        Self::send_chunk(&self.events, &self.flags, &self.emitter);
        let _ = self.events.send(EncoderEvent::Stopped);
        Ok(())
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

impl Drop for FakeEncoder {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
