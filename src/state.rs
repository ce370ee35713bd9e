use serde::{Deserialize, Serialize};

use crate::capture::CaptureBackendError;

/// Recording states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecorderState {
    /// Nothing being recorded (armed or not)
    #[default]
    Inactive,
    /// Encoder is accepting frames
    Recording,
    /// Encoder emission suspended
    Paused,
}

/// Error codes reported to the UI layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultCode {
    PermissionDenied,
    DeviceNotFound,
    CaptureUnsupported,
    EncoderUnavailable,
    Unknown,
}

/// Error details for a locally recovered failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecorderFault {
    pub code: FaultCode,
    pub message: String,
}

impl From<&CaptureBackendError> for RecorderFault {
    fn from(err: &CaptureBackendError) -> Self {
        let code = match err {
            CaptureBackendError::PermissionDenied(_) => FaultCode::PermissionDenied,
            CaptureBackendError::DeviceNotFound(_) => FaultCode::DeviceNotFound,
            CaptureBackendError::NotSupported(_) => FaultCode::CaptureUnsupported,
            CaptureBackendError::Encoder(_) => FaultCode::EncoderUnavailable,
            CaptureBackendError::Internal(_) => FaultCode::Unknown,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

/// State transition error
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionError {
    pub from: RecorderState,
    pub to: RecorderState,
    pub message: String,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Invalid transition from {:?} to {:?}: {}",
            self.from, self.to, self.message
        )
    }
}

impl std::error::Error for TransitionError {}

/// State machine for one capture session
#[derive(Debug, Default)]
pub struct StateMachine {
    state: RecorderState,
    last_error: Option<RecorderFault>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn last_error(&self) -> Option<&RecorderFault> {
        self.last_error.as_ref()
    }

    /// Validate and perform state transition
    fn transition(&mut self, to: RecorderState) -> Result<RecorderState, TransitionError> {
        let from = self.state;

        let valid = matches!(
            (from, to),
            (RecorderState::Inactive, RecorderState::Recording)
                | (RecorderState::Recording, RecorderState::Paused)
                | (RecorderState::Paused, RecorderState::Recording)
                | (RecorderState::Recording, RecorderState::Inactive)
                | (RecorderState::Paused, RecorderState::Inactive)
        );

        if valid {
            self.state = to;
            Ok(to)
        } else {
            Err(TransitionError {
                from,
                to,
                message: format!("Cannot transition from {:?} to {:?}", from, to),
            })
        }
    }

    /// Begin recording (Inactive → Recording)
    pub fn start(&mut self) -> Result<RecorderState, TransitionError> {
        if self.state != RecorderState::Inactive {
            return Err(TransitionError {
                from: self.state,
                to: RecorderState::Recording,
                message: "Recording already active".to_string(),
            });
        }
        let state = self.transition(RecorderState::Recording)?;
        self.last_error = None;
        Ok(state)
    }

    /// Pause recording (Recording → Paused)
    pub fn pause(&mut self) -> Result<RecorderState, TransitionError> {
        self.transition(RecorderState::Paused)
    }

    /// Resume recording (Paused → Recording)
    pub fn resume(&mut self) -> Result<RecorderState, TransitionError> {
        if self.state != RecorderState::Paused {
            return Err(TransitionError {
                from: self.state,
                to: RecorderState::Recording,
                message: "Recording is not paused".to_string(),
            });
        }
        self.transition(RecorderState::Recording)
    }

    /// Finish recording (Recording/Paused → Inactive)
    pub fn stop(&mut self) -> Result<RecorderState, TransitionError> {
        self.transition(RecorderState::Inactive)
    }

    /// Record a recovered failure without changing state
    pub fn set_error(&mut self, error: RecorderFault) {
        self.last_error = Some(error);
    }

    /// Unconditional return to Inactive (disposal)
    pub fn reset(&mut self) -> RecorderState {
        self.state = RecorderState::Inactive;
        RecorderState::Inactive
    }
}
