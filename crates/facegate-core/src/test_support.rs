//! Synthetic landmark and descriptor builders shared by unit tests.

use crate::types::{
    Descriptor, Detection, LandmarkSet, Point, RawDetection, DESCRIPTOR_DIM, LANDMARK_COUNT,
};

const EYE_WIDTH: f32 = 30.0;
const MOUTH_WIDTH: f32 = 40.0;

/// Six eye-contour points (p1..p6) with the requested EAR, anchored at `origin`.
pub fn eye_points(origin: Point, ear: f32) -> [Point; 6] {
    // EAR = 2h / w for this symmetric layout.
    let h = ear * EYE_WIDTH / 2.0;
    let (x, y) = (origin.x, origin.y);
    [
        Point::new(x, y),
        Point::new(x + EYE_WIDTH / 3.0, y - h),
        Point::new(x + 2.0 * EYE_WIDTH / 3.0, y - h),
        Point::new(x + EYE_WIDTH, y),
        Point::new(x + 2.0 * EYE_WIDTH / 3.0, y + h),
        Point::new(x + EYE_WIDTH / 3.0, y + h),
    ]
}

/// 68 points whose eyes have `ear` and whose inner lips have `mar`.
pub fn face_points(ear: f32, mar: f32) -> Vec<Point> {
    let mut pts = vec![Point::new(100.0, 100.0); LANDMARK_COUNT];
    for (i, p) in eye_points(Point::new(60.0, 80.0), ear).into_iter().enumerate() {
        pts[36 + i] = p;
    }
    for (i, p) in eye_points(Point::new(110.0, 80.0), ear).into_iter().enumerate() {
        pts[42 + i] = p;
    }
    let v = mar * MOUTH_WIDTH / 2.0;
    let (mx, my) = (80.0, 140.0);
    // Mouth-local inner lip: left 12, top 14, right 16, bottom 18.
    pts[60] = Point::new(mx, my);
    pts[62] = Point::new(mx + MOUTH_WIDTH / 2.0, my - v);
    pts[64] = Point::new(mx + MOUTH_WIDTH, my);
    pts[66] = Point::new(mx + MOUTH_WIDTH / 2.0, my + v);
    pts
}

pub fn face(ear: f32, mar: f32) -> LandmarkSet {
    LandmarkSet::new(face_points(ear, mar)).unwrap()
}

/// Descriptor with every component set to `v`, except component 0 which is
/// offset by `delta`. Distance between `descriptor(v, 0)` and
/// `descriptor(v, d)` is exactly `d`.
pub fn descriptor(v: f32, delta: f32) -> Descriptor {
    let mut values = vec![v; DESCRIPTOR_DIM];
    values[0] += delta;
    Descriptor::new(values).unwrap()
}

pub fn detection(ear: f32, mar: f32, delta: f32) -> Detection {
    Detection::try_from(RawDetection {
        score: 0.9,
        landmarks: face_points(ear, mar),
        descriptor: descriptor(0.05, delta).values().to_vec(),
        ..RawDetection::default()
    })
    .unwrap()
}
