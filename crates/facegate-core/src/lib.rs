//! facegate-core — Verification session state machine.
//!
//! Ties per-frame landmark and descriptor data from an external face
//! recognition library into a pass/fail decision: baseline capture, a
//! blink/mouth liveness challenge, then a combined identity + QR check.
//! Inference and QR decoding are injected through [`LandmarkExtractor`]
//! and [`QrDecoder`].

pub mod error;
pub mod event_log;
pub mod extractor;
pub mod liveness;
pub mod matcher;
pub mod qr;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::SessionError;
pub use event_log::{EventLog, LogEntry, LOG_CAPACITY};
pub use extractor::{ExtractorError, LandmarkExtractor};
pub use liveness::{LivenessEvaluator, LivenessMode, LivenessSignal};
pub use matcher::{EuclideanMatcher, MatchResult, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use qr::{DecoderError, QrCode, QrDecoder, QrGate, QrOutcome};
pub use session::{
    FailureReason, Observation, Outcome, SessionConfig, SessionController, SessionSnapshot,
    Step, TimerKind, TimerRequest, TimerToken,
};
pub use types::{
    BoundingBox, Descriptor, Detection, DetectorOptions, Frame, LandmarkSet, Point,
    RawDetection, DESCRIPTOR_DIM, LANDMARK_COUNT,
};
