//! Per-frame hand observations and the geometry types shared by the pipeline.

use serde::{Deserialize, Serialize};

use crate::error::InputError;

pub const KEYPOINT_COUNT: usize = 21;
pub const WRIST: usize = 0;
pub const INDEX_FINGERTIP: usize = 8;

/// A pixel-space coordinate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 2]", into = "[f32; 2]")]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Snap to the pixel grid. Only used when reporting, never fed back into state.
    pub fn rounded(&self) -> [i32; 2] {
        [self.x.round() as i32, self.y.round() as i32]
    }
}

impl From<[f32; 2]> for Point {
    fn from(p: [f32; 2]) -> Self {
        Self { x: p[0], y: p[1] }
    }
}

impl From<Point> for [f32; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl BoundingBox {
    /// Min/max over the points, clamped to `[0, width-1] x [0, height-1]`.
    pub fn around(points: &[Point], frame_width: u32, frame_height: u32) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut x_min = f32::MAX;
        let mut y_min = f32::MAX;
        let mut x_max = f32::MIN;
        let mut y_max = f32::MIN;
        for p in points {
            x_min = x_min.min(p.x);
            y_min = y_min.min(p.y);
            x_max = x_max.max(p.x);
            y_max = y_max.max(p.y);
        }

        let w_hi = frame_width.saturating_sub(1) as f32;
        let h_hi = frame_height.saturating_sub(1) as f32;
        Some(Self {
            x_min: x_min.clamp(0.0, w_hi) as i32,
            y_min: y_min.clamp(0.0, h_hi) as i32,
            x_max: x_max.clamp(0.0, w_hi) as i32,
            y_max: y_max.clamp(0.0, h_hi) as i32,
        })
    }
}

/// One detected hand, as reported by the landmark detector.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HandObservation {
    pub landmarks: Vec<Point>,
    #[serde(default)]
    pub handedness: Option<String>,
}

impl HandObservation {
    #[cfg(test)]
    pub fn new(landmarks: Vec<Point>) -> Self {
        Self {
            landmarks,
            handedness: None,
        }
    }

    pub fn validate(&self) -> Result<(), InputError> {
        if self.landmarks.is_empty() {
            return Err(InputError::Empty);
        }
        if self.landmarks.len() != KEYPOINT_COUNT {
            return Err(InputError::WrongKeypointCount {
                expected: KEYPOINT_COUNT,
                got: self.landmarks.len(),
            });
        }
        if let Some(index) = self
            .landmarks
            .iter()
            .position(|p| !p.x.is_finite() || !p.y.is_finite())
        {
            return Err(InputError::NonFinite { index });
        }
        Ok(())
    }
}

/// Everything the detector reported for one frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FrameInput {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub hands: Vec<HandObservation>,
}

impl FrameInput {
    /// The first reported hand is authoritative; the rest are ignored.
    pub fn primary_hand(&self) -> Option<&HandObservation> {
        self.hands.first()
    }
}

#[cfg(test)]
pub(crate) fn synthetic_hand(origin: Point, spread: f32) -> Vec<Point> {
    (0..KEYPOINT_COUNT)
        .map(|i| {
            let i = i as f32;
            Point::new(origin.x + i * spread, origin.y - i * spread * 0.5)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_is_clamped_to_frame() {
        let pts = vec![Point::new(-5.0, 10.0), Point::new(700.0, 500.0)];
        let bb = BoundingBox::around(&pts, 640, 480).unwrap();
        assert_eq!(
            bb,
            BoundingBox {
                x_min: 0,
                y_min: 10,
                x_max: 639,
                y_max: 479
            }
        );
        assert!(BoundingBox::around(&[], 640, 480).is_none());
    }

    #[test]
    fn validate_rejects_malformed_hands() {
        assert_eq!(HandObservation::new(vec![]).validate(), Err(InputError::Empty));
        assert_eq!(
            HandObservation::new(vec![Point::ORIGIN; 5]).validate(),
            Err(InputError::WrongKeypointCount {
                expected: KEYPOINT_COUNT,
                got: 5
            })
        );
        let mut pts = synthetic_hand(Point::new(100.0, 100.0), 3.0);
        pts[4].y = f32::NAN;
        assert_eq!(
            HandObservation::new(pts).validate(),
            Err(InputError::NonFinite { index: 4 })
        );
        assert!(
            HandObservation::new(synthetic_hand(Point::ORIGIN, 1.0))
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn frame_input_parses_detector_json() {
        let mut landmarks = String::from("[");
        for i in 0..KEYPOINT_COUNT {
            if i > 0 {
                landmarks.push(',');
            }
            landmarks.push_str(&format!("[{i}, {}]", i * 2));
        }
        landmarks.push(']');
        let txt = format!(
            r#"{{"width": 640, "height": 480, "hands": [{{"landmarks": {landmarks}, "handedness": "Right"}}, {{"landmarks": []}}]}}"#
        );
        let frame: FrameInput = serde_json::from_str(&txt).unwrap();
        assert_eq!(frame.hands.len(), 2);
        let hand = frame.primary_hand().unwrap();
        assert_eq!(hand.handedness.as_deref(), Some("Right"));
        assert_eq!(hand.landmarks[3], Point::new(3.0, 6.0));
    }
}
