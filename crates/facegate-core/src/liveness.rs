//! Active liveness detection via eye and mouth aspect ratios.
//!
//! A live subject asked to blink produces a sharp dip in Eye Aspect Ratio
//! (EAR) followed by a recovery; asked to open their mouth, a rise in Mouth
//! Aspect Ratio (MAR). Both ratios are scale and translation invariant, so
//! they work regardless of how far the subject sits from the camera.
//!
//! Blinks use two thresholds (close below, re-open above) so a single noisy
//! frame hovering around one threshold cannot register as a blink. Events are
//! edge-triggered: each genuine blink or mouth opening is reported once.
//!
//! # Threat Coverage
//!
//! - **Blocks:** Printed photographs and static images on a screen.
//! - **Does not block:** Video replay of someone blinking, 3D masks with
//!   moving eyelids.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::types::{LandmarkSet, Point};

/// EAR below which the eyes count as closed.
pub const DEFAULT_EAR_CLOSE_THRESHOLD: f32 = 0.21;
/// EAR above which closed eyes count as re-opened. Must exceed the close threshold.
pub const DEFAULT_EAR_OPEN_THRESHOLD: f32 = 0.25;
/// Smallest gap enforced between the close and re-open thresholds.
pub const MIN_EAR_HYSTERESIS: f32 = 0.02;
/// MAR above which the mouth counts as open.
pub const DEFAULT_MAR_OPEN_THRESHOLD: f32 = 0.5;
/// Number of recent frames a blink has to complete within.
pub const DEFAULT_WINDOW_FRAMES: usize = 30;

// Mouth-local inner-lip indices (global 60, 62, 64, 66).
const INNER_LIP_LEFT: usize = 12;
const INNER_LIP_TOP: usize = 14;
const INNER_LIP_RIGHT: usize = 16;
const INNER_LIP_BOTTOM: usize = 18;

/// Which events the liveness challenge requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LivenessMode {
    #[default]
    #[serde(rename = "blink")]
    Blink,
    #[serde(rename = "blink+mouth")]
    BlinkAndMouth,
}

impl std::str::FromStr for LivenessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blink" => Ok(Self::Blink),
            "blink+mouth" => Ok(Self::BlinkAndMouth),
            other => Err(format!("unknown liveness mode '{other}'")),
        }
    }
}

/// Evaluator thresholds.
///
/// `ear_open` must be strictly above `ear_close`; [`LivenessEvaluator::new`]
/// widens a collapsed band to [`MIN_EAR_HYSTERESIS`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LivenessThresholds {
    pub ear_close: f32,
    pub ear_open: f32,
    pub mar_open: f32,
    /// Sliding window length in frames (minimum 2).
    pub window_frames: usize,
}

impl LivenessThresholds {
    /// Reject thresholds that would turn blink detection into a single
    /// threshold crossing.
    pub fn validate(&self) -> Result<(), SessionError> {
        if !self.ear_close.is_finite() || !self.ear_open.is_finite() || !self.mar_open.is_finite()
        {
            return Err(SessionError::InvalidInput(
                "liveness thresholds must be finite".to_string(),
            ));
        }
        if self.ear_open <= self.ear_close {
            return Err(SessionError::InvalidInput(format!(
                "EAR open threshold {} must exceed close threshold {}",
                self.ear_open, self.ear_close
            )));
        }
        Ok(())
    }
}

impl Default for LivenessThresholds {
    fn default() -> Self {
        Self {
            ear_close: DEFAULT_EAR_CLOSE_THRESHOLD,
            ear_open: DEFAULT_EAR_OPEN_THRESHOLD,
            mar_open: DEFAULT_MAR_OPEN_THRESHOLD,
            window_frames: DEFAULT_WINDOW_FRAMES,
        }
    }
}

/// Per-frame evaluation result.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LivenessSignal {
    /// A blink completed on this frame.
    pub blink: bool,
    /// The mouth opened on this frame.
    pub mouth_open: bool,
    /// Mean EAR of both eyes for this frame.
    pub ear: f32,
    /// MAR for this frame.
    pub mar: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Sample {
    seq: u64,
    ear: f32,
    mar: f32,
}

/// Eye Aspect Ratio for one eye given its six contour points p1..p6:
/// `(|p2-p6| + |p3-p5|) / (2 * |p1-p4|)`.
///
/// Returns 0 when fewer than six points are supplied or the eye has zero width.
pub fn eye_aspect_ratio(eye: &[Point]) -> f32 {
    if eye.len() < 6 {
        return 0.0;
    }
    let horizontal = eye[0].distance(&eye[3]);
    if horizontal == 0.0 {
        return 0.0;
    }
    let vertical1 = eye[1].distance(&eye[5]);
    let vertical2 = eye[2].distance(&eye[4]);
    (vertical1 + vertical2) / (2.0 * horizontal)
}

/// Mouth Aspect Ratio from the 20 mouth points: inner-lip vertical over
/// inner-lip horizontal distance.
///
/// Returns 0 when fewer than 19 points are supplied or the horizontal
/// distance is 0.
pub fn mouth_aspect_ratio(mouth: &[Point]) -> f32 {
    if mouth.len() < 19 {
        return 0.0;
    }
    let horizontal = mouth[INNER_LIP_LEFT].distance(&mouth[INNER_LIP_RIGHT]);
    if horizontal == 0.0 {
        return 0.0;
    }
    mouth[INNER_LIP_TOP].distance(&mouth[INNER_LIP_BOTTOM]) / horizontal
}

/// Sliding-window blink / mouth-open detector.
#[derive(Debug, Clone, PartialEq)]
pub struct LivenessEvaluator {
    thresholds: LivenessThresholds,
    window: VecDeque<Sample>,
    next_seq: u64,
    /// Closed samples at or before this sequence number were already spent
    /// on a reported blink.
    last_blink: Option<u64>,
}

impl Default for LivenessEvaluator {
    fn default() -> Self {
        Self::new(LivenessThresholds::default())
    }
}

impl LivenessEvaluator {
    pub fn new(mut thresholds: LivenessThresholds) -> Self {
        thresholds.window_frames = thresholds.window_frames.max(2);
        if thresholds.ear_open.is_nan() || thresholds.ear_open <= thresholds.ear_close {
            let widened = thresholds.ear_close + MIN_EAR_HYSTERESIS;
            tracing::warn!(
                ear_close = thresholds.ear_close,
                ear_open = thresholds.ear_open,
                widened,
                "EAR thresholds leave no hysteresis band, widening"
            );
            thresholds.ear_open = widened;
        }
        Self {
            window: VecDeque::with_capacity(thresholds.window_frames),
            thresholds,
            next_seq: 0,
            last_blink: None,
        }
    }

    pub fn thresholds(&self) -> &LivenessThresholds {
        &self.thresholds
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Feed one frame's landmarks.
    pub fn evaluate(&mut self, landmarks: &LandmarkSet) -> LivenessSignal {
        let ear = (eye_aspect_ratio(landmarks.left_eye())
            + eye_aspect_ratio(landmarks.right_eye()))
            / 2.0;
        let mar = mouth_aspect_ratio(landmarks.mouth());
        self.push(ear, mar)
    }

    /// Feed a precomputed (EAR, MAR) sample.
    ///
    /// A blink is reported when EAR rises above `ear_open` and the window
    /// still holds a closed sample (below `ear_close`) newer than the last
    /// reported blink. Closures that have scrolled out of the window are
    /// forgotten.
    pub fn push(&mut self, ear: f32, mar: f32) -> LivenessSignal {
        let t = self.thresholds;
        let seq = self.next_seq;
        self.next_seq += 1;

        let mouth_was_open = self.window.back().is_some_and(|prev| prev.mar > t.mar_open);

        self.window.push_back(Sample { seq, ear, mar });
        while self.window.len() > t.window_frames {
            self.window.pop_front();
        }

        let mut blink = false;
        if ear > t.ear_open {
            let fresh_from = self.last_blink.map_or(0, |last| last + 1);
            let closure = self
                .window
                .iter()
                .find(|s| s.seq >= fresh_from && s.ear < t.ear_close);
            if let Some(closed) = closure {
                tracing::debug!(closed_at = closed.seq, reopened_at = seq, "blink");
                self.last_blink = Some(seq);
                blink = true;
            }
        }

        let mouth_open = mar > t.mar_open && !mouth_was_open;

        LivenessSignal {
            blink,
            mouth_open,
            ear,
            mar,
        }
    }

    /// Drop all history.
    pub fn reset(&mut self) {
        *self = Self::new(self.thresholds);
    }
}
