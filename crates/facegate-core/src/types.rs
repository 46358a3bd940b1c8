use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Number of points in a landmark set (iBUG-68 layout).
pub const LANDMARK_COUNT: usize = 68;

/// Length of a face descriptor produced by the recognition net.
pub const DESCRIPTOR_DIM: usize = 128;

const LEFT_EYE: std::ops::Range<usize> = 36..42;
const RIGHT_EYE: std::ops::Range<usize> = 42..48;
const MOUTH: std::ops::Range<usize> = 48..68;

/// A 2-D image-space point.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

/// Face bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Ordered 68-point facial landmarks.
///
/// Index layout: jaw 0–16, eyebrows 17–26, nose 27–35, left eye 36–41,
/// right eye 42–47, mouth 48–67.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: Vec<Point>,
}

impl LandmarkSet {
    /// Build a landmark set, rejecting anything that is not exactly 68
    /// finite points.
    pub fn new(points: Vec<Point>) -> Result<Self, SessionError> {
        if points.len() != LANDMARK_COUNT {
            return Err(SessionError::InvalidInput(format!(
                "expected {LANDMARK_COUNT} landmark points, got {}",
                points.len()
            )));
        }
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(SessionError::InvalidInput(
                "landmark point is NaN or infinite".to_string(),
            ));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn left_eye(&self) -> &[Point] {
        &self.points[LEFT_EYE]
    }

    pub fn right_eye(&self) -> &[Point] {
        &self.points[RIGHT_EYE]
    }

    /// The 20 mouth points (outer lip 0–11, inner lip 12–19).
    pub fn mouth(&self) -> &[Point] {
        &self.points[MOUTH]
    }
}

/// A 128-d face identity embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Result<Self, SessionError> {
        if values.len() != DESCRIPTOR_DIM {
            return Err(SessionError::InvalidInput(format!(
                "descriptor dimension {} (expected {DESCRIPTOR_DIM})",
                values.len()
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(SessionError::InvalidInput(
                "descriptor value is NaN or infinite".to_string(),
            ));
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

/// Detector tuning handed to the landmark extractor on every call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorOptions {
    /// Square input resolution of the detector network.
    pub input_size: u32,
    /// Minimum detection score for a face to be reported.
    pub score_threshold: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            input_size: 224,
            score_threshold: 0.5,
        }
    }
}

/// Unvalidated extractor output, as handed across the collaborator boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    #[serde(default)]
    pub bbox: BoundingBox,
    #[serde(default)]
    pub score: f32,
    pub landmarks: Vec<Point>,
    pub descriptor: Vec<f32>,
}

/// A validated single-face detection.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub score: f32,
    pub landmarks: LandmarkSet,
    pub descriptor: Descriptor,
}

impl TryFrom<RawDetection> for Detection {
    type Error = SessionError;

    fn try_from(raw: RawDetection) -> Result<Self, Self::Error> {
        Ok(Self {
            bbox: raw.bbox,
            score: raw.score,
            landmarks: LandmarkSet::new(raw.landmarks)?,
            descriptor: Descriptor::new(raw.descriptor)?,
        })
    }
}

/// A camera frame: packed RGBA8 pixels plus a monotonically increasing
/// sequence number assigned by the frame source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub seq: u64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(seq: u64, width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            seq,
            width,
            height,
            data,
        }
    }

    /// A pixel-less frame, used when detections come from a recording.
    pub fn empty(seq: u64) -> Self {
        Self {
            seq,
            ..Self::default()
        }
    }
}
