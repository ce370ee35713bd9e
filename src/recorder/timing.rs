use std::time::Duration;
use tokio::time::Instant;

/// Active recording time, excluding paused intervals
#[derive(Debug, Clone, Default)]
pub(crate) struct Timing {
    /// Sum of finished recording segments
    accumulated: Duration,
    /// Start of the segment in progress, if recording
    running_since: Option<Instant>,
}

impl Timing {
    /// Begin a fresh session
    pub(crate) fn start(&mut self, now: Instant) {
        self.accumulated = Duration::ZERO;
        self.running_since = Some(now);
    }

    pub(crate) fn pause(&mut self, now: Instant) {
        self.close_segment(now);
    }

    pub(crate) fn resume(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    /// Freeze the total
    pub(crate) fn finish(&mut self, now: Instant) {
        self.close_segment(now);
    }

    pub(crate) fn elapsed(&self, now: Instant) -> Duration {
        self.accumulated
            + self
                .running_since
                .map(|since| now.saturating_duration_since(since))
                .unwrap_or_default()
    }

    fn close_segment(&mut self, now: Instant) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += now.saturating_duration_since(since);
        }
    }
}
