use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::media::{Canvas, FrameSource};
use crate::state::RecorderState;

/// Periodic copy of the source frame onto the recorded canvas
///
/// Keeps the canvas in step with the playback element the user watches. It
/// runs on its own timer, independent of the encoder's sampling. The task is
/// aborted when this handle is dropped, so a recorder that goes out of scope
/// never leaves a timer behind.
#[derive(Debug)]
pub(crate) struct FrameCopyLoop {
    handle: JoinHandle<()>,
}

impl FrameCopyLoop {
    /// Spawn the loop on the current tokio runtime, if there is one
    pub(crate) fn spawn(
        canvas: Canvas,
        source: Arc<dyn FrameSource>,
        frame_rate: u32,
        mut state: watch::Receiver<RecorderState>,
    ) -> Option<Self> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available, canvas frame copy disabled");
            return None;
        };

        let period = Duration::from_secs_f64(1.0 / f64::from(frame_rate.max(1)));
        debug!("Starting frame copy loop every {:?}", period);

        let handle = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                // Recorder gone
                if state.has_changed().is_err() {
                    break;
                }
                if *state.borrow_and_update() != RecorderState::Recording {
                    continue;
                }
                if !source.has_current_data() {
                    continue;
                }
                if let Some(frame) = source.current_frame() {
                    canvas.draw_frame(&frame);
                }
            }
        });

        Some(Self { handle })
    }
}

impl Drop for FrameCopyLoop {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
