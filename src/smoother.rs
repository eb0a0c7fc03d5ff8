//! Exponential smoothing of keypoints across frames.

use crate::error::InputError;
use crate::hand::Point;

pub const DEFAULT_ALPHA: f32 = 0.5;

/// Per-keypoint EMA: `smoothed = alpha * current + (1 - alpha) * previous`.
///
/// State is kept in floating point so rounding never compounds across frames.
#[derive(Debug, Clone)]
pub struct TemporalSmoother {
    alpha: f32,
    prev: Option<Vec<Point>>,
}

impl Default for TemporalSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

impl TemporalSmoother {
    /// `alpha` is clamped to `[0, 1]`.
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            prev: None,
        }
    }

    /// Smooth `current` against the stored state and keep the result as the
    /// new state. On error the state is left untouched.
    pub fn smooth(&mut self, current: &[Point]) -> Result<Vec<Point>, InputError> {
        let out = match &self.prev {
            None => current.to_vec(),
            Some(prev) if prev.len() != current.len() => {
                return Err(InputError::KeypointCountChanged {
                    previous: prev.len(),
                    current: current.len(),
                });
            }
            Some(prev) => {
                let a = self.alpha;
                current
                    .iter()
                    .zip(prev)
                    .map(|(c, p)| Point::new(a * c.x + (1.0 - a) * p.x, a * c.y + (1.0 - a) * p.y))
                    .collect()
            }
        };
        self.prev = Some(out.clone());
        Ok(out)
    }

    pub fn reset(&mut self) {
        self.prev = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(v: f32) -> Vec<Point> {
        vec![Point::new(v, v * 2.0), Point::new(v + 1.0, 0.0)]
    }

    #[test]
    fn first_call_passes_through() {
        let mut s = TemporalSmoother::default();
        assert_eq!(s.smooth(&frame(10.0)).unwrap(), frame(10.0));
        assert_eq!(s.smooth(&frame(10.0)).unwrap(), frame(10.0));
    }

    #[test]
    fn blends_with_previous() {
        let mut s = TemporalSmoother::new(0.5);
        s.smooth(&frame(10.0)).unwrap();
        let out = s.smooth(&frame(20.0)).unwrap();
        assert_eq!(out[0], Point::new(15.0, 30.0));
        let out = s.smooth(&frame(20.0)).unwrap();
        assert_eq!(out[0], Point::new(17.5, 35.0));
    }

    #[test]
    fn alpha_one_is_identity() {
        let mut s = TemporalSmoother::new(1.0);
        for v in [1.0, 50.0, -3.0, 7.25] {
            assert_eq!(s.smooth(&frame(v)).unwrap(), frame(v));
        }
    }

    #[test]
    fn alpha_zero_freezes_first_sample() {
        let mut s = TemporalSmoother::new(0.0);
        s.smooth(&frame(4.0)).unwrap();
        for v in [9.0, 100.0, -20.0] {
            assert_eq!(s.smooth(&frame(v)).unwrap(), frame(4.0));
        }
    }

    #[test]
    fn no_rounding_drift() {
        // an integer-rounding EMA would get stuck at 1 short of the target
        let mut s = TemporalSmoother::new(0.5);
        s.smooth(&[Point::new(0.0, 0.0)]).unwrap();
        let mut last = Point::ORIGIN;
        for _ in 0..40 {
            last = s.smooth(&[Point::new(101.0, 101.0)]).unwrap()[0];
        }
        assert_eq!(last.rounded(), [101, 101]);
    }

    #[test]
    fn count_mismatch_is_rejected_without_state_change() {
        let mut s = TemporalSmoother::default();
        s.smooth(&frame(1.0)).unwrap();
        let err = s.smooth(&[Point::ORIGIN]).unwrap_err();
        assert_eq!(
            err,
            InputError::KeypointCountChanged {
                previous: 2,
                current: 1
            }
        );
        assert_eq!(s.smooth(&frame(1.0)).unwrap(), frame(1.0));
    }

    #[test]
    fn clone_stages_without_touching_original() {
        let mut s = TemporalSmoother::new(0.5);
        s.smooth(&frame(0.0)).unwrap();
        let mut staged = s.clone();
        staged.smooth(&frame(100.0)).unwrap();
        assert_eq!(s.smooth(&frame(0.0)).unwrap(), frame(0.0));
    }

    #[test]
    fn reset_reseeds() {
        let mut s = TemporalSmoother::new(0.5);
        s.smooth(&frame(0.0)).unwrap();
        s.reset();
        assert_eq!(s.smooth(&frame(8.0)).unwrap(), frame(8.0));
    }
}
