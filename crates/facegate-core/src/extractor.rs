//! Landmark extractor boundary.

use thiserror::Error;

use crate::error::SessionError;
use crate::types::{Detection, DetectorOptions, Frame, RawDetection};

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("extractor not ready")]
    NotReady,
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Face detector + landmark net + recognition net, as one black box.
///
/// Implementations may hold model state between calls, hence `&mut self`.
pub trait LandmarkExtractor: Send {
    fn extract(
        &mut self,
        frame: &Frame,
        options: &DetectorOptions,
    ) -> Result<Option<RawDetection>, ExtractorError>;
}

/// Run the extractor on a frame and validate its output.
///
/// An extractor failure is treated as "no face in this frame" so that a
/// flaky inference call never reaches the controller. Malformed output
/// (wrong landmark count, wrong descriptor length) is `InvalidInput`.
pub fn detect(
    extractor: &mut dyn LandmarkExtractor,
    frame: &Frame,
    options: &DetectorOptions,
) -> Result<Option<Detection>, SessionError> {
    match extractor.extract(frame, options) {
        Ok(Some(raw)) => Detection::try_from(raw).map(Some),
        Ok(None) => Ok(None),
        Err(e) => {
            tracing::warn!(seq = frame.seq, error = %e, "extractor failed; treating frame as faceless");
            Ok(None)
        }
    }
}
