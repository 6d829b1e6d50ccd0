use crate::capture::CaptureError;
use crate::display::DisplayError;
use crate::plugin::PluginLoadError;
use crate::types::{RunState, SessionId};

/// Errors returned by the [`crate::ModuleSession`] control surface.
///
/// Per-frame failures never show up here; they are logged and counted in
/// [`crate::SessionTelemetry`] instead.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    PluginLoad(#[from] PluginLoadError),
    #[error("session {0} is closed")]
    Closed(SessionId),
    #[error("cannot {operation} while the session is {state}")]
    InvalidState {
        operation: &'static str,
        state: RunState,
    },
    #[error("a recording is already active for this session")]
    RecordingAlreadyActive,
    #[error("no recording is active for this session")]
    NotRecording,
    #[error(transparent)]
    Capture(CaptureError),
    #[error("module `{0}` has no configuration interface")]
    ConfigurationUnavailable(String),
    #[error(transparent)]
    Display(#[from] DisplayError),
}

impl From<CaptureError> for SessionError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::AlreadyActive => Self::RecordingAlreadyActive,
            CaptureError::NotRecording => Self::NotRecording,
            other => Self::Capture(other),
        }
    }
}
