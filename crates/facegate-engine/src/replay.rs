//! Recorded sessions.
//!
//! A trace is a JSON list of frames whose extractor and decoder output were
//! captured ahead of time. Replaying one drives the engine exactly as a live
//! camera would, without a camera or neural network.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use facegate_core::extractor::ExtractorError;
use facegate_core::qr::DecoderError;
use facegate_core::{
    DetectorOptions, Frame, LandmarkExtractor, QrCode, QrDecoder, RawDetection, SessionConfig,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("failed to read trace {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid trace: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Trace {
    /// Optional session overrides recorded with the trace.
    #[serde(default)]
    pub session: Option<SessionConfig>,
    pub frames: Vec<TraceFrame>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceFrame {
    /// Wait before submitting this frame.
    #[serde(default)]
    pub delay_ms: u64,
    /// Extractor output for this frame; absent means no face.
    #[serde(default)]
    pub face: Option<RawDetection>,
    /// Decoder output for this frame; absent means no QR code.
    #[serde(default)]
    pub qr: Option<String>,
}

pub struct ReplayFrame {
    pub frame: Frame,
    pub delay: Duration,
}

/// A trace split into injectable collaborators and the frames to feed.
pub struct Replay {
    pub session: Option<SessionConfig>,
    pub extractor: RecordedExtractor,
    pub decoder: RecordedDecoder,
    pub frames: Vec<ReplayFrame>,
}

impl Trace {
    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let text = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ReplayError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Assign sequence numbers and split into collaborators keyed by them.
    pub fn into_replay(self) -> Replay {
        let mut detections = HashMap::new();
        let mut codes = HashMap::new();
        let mut frames = Vec::with_capacity(self.frames.len());

        for (i, tf) in self.frames.into_iter().enumerate() {
            let seq = i as u64;
            if let Some(face) = tf.face {
                detections.insert(seq, face);
            }
            if let Some(qr) = tf.qr {
                codes.insert(seq, qr);
            }
            frames.push(ReplayFrame {
                frame: Frame::empty(seq),
                delay: Duration::from_millis(tf.delay_ms),
            });
        }

        Replay {
            session: self.session,
            extractor: RecordedExtractor { detections },
            decoder: RecordedDecoder { codes },
            frames,
        }
    }
}

/// Extractor that answers from a recording, keyed by frame sequence number.
#[derive(Debug, Default)]
pub struct RecordedExtractor {
    detections: HashMap<u64, RawDetection>,
}

impl LandmarkExtractor for RecordedExtractor {
    fn extract(
        &mut self,
        frame: &Frame,
        options: &DetectorOptions,
    ) -> Result<Option<RawDetection>, ExtractorError> {
        Ok(self
            .detections
            .get(&frame.seq)
            .filter(|d| d.score >= options.score_threshold)
            .cloned())
    }
}

#[derive(Debug, Default)]
pub struct RecordedDecoder {
    codes: HashMap<u64, String>,
}

impl QrDecoder for RecordedDecoder {
    fn decode(&mut self, frame: &Frame) -> Result<Option<QrCode>, DecoderError> {
        Ok(self.codes.get(&frame.seq).map(|data| QrCode {
            data: data.clone(),
            location: None,
        }))
    }
}
