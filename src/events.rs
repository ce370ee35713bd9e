use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::recorder::CaptureMode;
use crate::state::{RecorderFault, RecorderState};

/// Event emitted when recorder state changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangedEvent {
    pub state: RecorderState,
    pub previous: RecorderState,
}

/// Device the host is about to prompt for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionKind {
    Camera,
    Microphone,
}

/// Event emitted before a device permission request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionNeededEvent {
    pub kind: PermissionKind,
}

/// Event emitted once an encoder is armed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializedEvent {
    pub mode: CaptureMode,
    pub mime_type: String,
}

/// Event emitted on a recovered failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub error: RecorderFault,
}

/// Event emitted when recording starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingStartedEvent {
    pub session_id: Uuid,
    pub mime_type: String,
}

/// Event emitted when recording stops and the blob is ready
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingStoppedEvent {
    pub session_id: Uuid,
    pub mime_type: String,
    pub duration_ms: u64,
    pub size_bytes: usize,
    pub chunk_count: usize,
}

/// Everything the recorder reports to the UI layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum RecorderEvent {
    StateChanged(StateChangedEvent),
    PermissionNeeded(PermissionNeededEvent),
    Initialized(InitializedEvent),
    RecordingStarted(RecordingStartedEvent),
    RecordingStopped(RecordingStoppedEvent),
    Error(ErrorEvent),
    Disposed,
}

impl RecorderEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StateChanged(_) => event_names::STATE_CHANGED,
            Self::PermissionNeeded(_) => event_names::PERMISSION_NEEDED,
            Self::Initialized(_) => event_names::INITIALIZED,
            Self::RecordingStarted(_) => event_names::RECORDING_STARTED,
            Self::RecordingStopped(_) => event_names::RECORDING_STOPPED,
            Self::Error(_) => event_names::ERROR,
            Self::Disposed => event_names::DISPOSED,
        }
    }
}

/// Event names as seen by the UI layer
pub mod event_names {
    pub const STATE_CHANGED: &str = "recorder:state_changed";
    pub const PERMISSION_NEEDED: &str = "recorder:permission_needed";
    pub const INITIALIZED: &str = "recorder:initialized";
    pub const RECORDING_STARTED: &str = "recorder:recording_started";
    pub const RECORDING_STOPPED: &str = "recorder:recording_stopped";
    pub const ERROR: &str = "recorder:error";
    pub const DISPOSED: &str = "recorder:disposed";
}

const EVENT_CAPACITY: usize = 64;

/// Fan-out of recorder events to any number of subscribers
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RecorderEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecorderEvent> {
        self.sender.subscribe()
    }

    /// Send to current subscribers; having none is fine
    pub fn emit(&self, event: RecorderEvent) {
        debug!(event = event.name(), "Emitting recorder event");
        let _ = self.sender.send(event);
    }

    pub(crate) fn emit_state_change(&self, previous: RecorderState, state: RecorderState) {
        if previous != state {
            self.emit(RecorderEvent::StateChanged(StateChangedEvent { state, previous }));
        }
    }

    pub(crate) fn emit_error(&self, error: &RecorderFault) {
        self.emit(RecorderEvent::Error(ErrorEvent {
            error: error.clone(),
        }));
    }
}
