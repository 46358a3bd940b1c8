//! Descriptor comparison.

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::types::{Descriptor, DESCRIPTOR_DIM};

/// Euclidean distance at or below which two 128-d descriptors are treated
/// as the same person. 0.6 is the conventional operating point for this
/// descriptor space; lower is stricter.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Result of comparing a candidate descriptor against the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Euclidean distance between the two descriptors (0 = identical).
    pub distance: f32,
    /// Whether `distance <= threshold`.
    pub is_match: bool,
}

pub trait Matcher {
    fn compare(
        &self,
        baseline: Option<&Descriptor>,
        candidate: Option<&Descriptor>,
    ) -> Result<MatchResult, SessionError>;
}

/// Thresholded Euclidean-distance matcher.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    pub threshold: f32,
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl EuclideanMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Matcher for EuclideanMatcher {
    fn compare(
        &self,
        baseline: Option<&Descriptor>,
        candidate: Option<&Descriptor>,
    ) -> Result<MatchResult, SessionError> {
        let baseline = baseline
            .ok_or_else(|| SessionError::InvalidInput("baseline descriptor missing".into()))?;
        let candidate = candidate
            .ok_or_else(|| SessionError::InvalidInput("candidate descriptor missing".into()))?;
        let distance = euclidean_distance(baseline.values(), candidate.values())?;
        Ok(MatchResult {
            distance,
            is_match: distance <= self.threshold,
        })
    }
}

/// Euclidean distance between two descriptor-length vectors.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Result<f32, SessionError> {
    if a.len() != DESCRIPTOR_DIM || b.len() != DESCRIPTOR_DIM {
        return Err(SessionError::InvalidInput(format!(
            "descriptor dimension mismatch: {} vs {} (expected {DESCRIPTOR_DIM})",
            a.len(),
            b.len()
        )));
    }
    let sum: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum();
    Ok(sum.sqrt())
}
