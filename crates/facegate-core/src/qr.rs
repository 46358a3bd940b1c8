//! QR decoder boundary and token gate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Frame, Point};

#[derive(Error, Debug)]
pub enum DecoderError {
    #[error("frame has no pixel data ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },
    #[error("decode failed: {0}")]
    Decode(String),
}

/// A decoded QR code and, when the decoder reports it, its corner points
/// (top-left, top-right, bottom-right, bottom-left).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrCode {
    pub data: String,
    #[serde(default)]
    pub location: Option<[Point; 4]>,
}

pub trait QrDecoder: Send {
    /// `Ok(None)` means the frame holds no decodable code.
    fn decode(&mut self, frame: &Frame) -> Result<Option<QrCode>, DecoderError>;
}

/// Decode a frame, folding decoder failures into "no code found".
pub fn scan(decoder: &mut dyn QrDecoder, frame: &Frame) -> Option<QrCode> {
    match decoder.decode(frame) {
        Ok(code) => code,
        Err(e) => {
            tracing::warn!(seq = frame.seq, error = %e, "QR decode failed; treating as no code");
            None
        }
    }
}

/// Result of gating one frame's decoded string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QrOutcome {
    Match,
    Mismatch(String),
    NoCodeFound,
}

impl QrOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, QrOutcome::Match)
    }
}

/// Compares decoded QR content against the session's expected token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrGate {
    expected: String,
}

impl QrGate {
    pub fn new(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
        }
    }

    pub fn expected(&self) -> &str {
        &self.expected
    }

    /// Exact, case-sensitive equality.
    pub fn check(&self, decoded: &str) -> bool {
        decoded == self.expected
    }

    pub fn evaluate(&self, decoded: Option<&str>) -> QrOutcome {
        match decoded {
            None => QrOutcome::NoCodeFound,
            Some(s) if self.check(s) => QrOutcome::Match,
            Some(s) => QrOutcome::Mismatch(s.to_string()),
        }
    }
}
