use thiserror::Error;

/// Errors surfaced by the verification session and its collaborators.
///
/// Raw extractor/decoder errors never cross into the controller; they are
/// translated into one of these at the component boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("liveness challenge timed out")]
    LivenessTimeout,
    #[error("identity/QR check failed {attempts} times")]
    DualCheckExhausted { attempts: u32 },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("verification backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("face models failed to load: {0}")]
    ModelLoadFailure(String),
    #[error("a verification request is already in flight")]
    SubmissionInFlight,
}

impl SessionError {
    /// The session cannot continue without an explicit reset.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::LivenessTimeout | Self::DualCheckExhausted { .. }
        )
    }

    /// The caller may retry the same operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoFaceDetected | Self::BackendUnavailable(_) | Self::SubmissionInFlight
        )
    }
}
