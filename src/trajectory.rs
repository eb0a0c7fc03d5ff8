//! Sliding window of fingertip positions for the motion classifier.

use std::{collections::VecDeque, iter};

use crate::hand::Point;

pub const DEFAULT_WINDOW_LEN: usize = 16;

/// Fixed-capacity FIFO of points. Pushing at capacity evicts the oldest entry.
///
/// A `(0, 0)` entry means "no motion sample this frame"; it still occupies a
/// slot so the window keeps one entry per frame.
#[derive(Debug, Clone)]
pub struct TrajectoryWindow {
    points: VecDeque<Point>,
    capacity: usize,
}

impl Default for TrajectoryWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_LEN)
    }
}

impl TrajectoryWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, point: Point) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn push_degenerate(&mut self) {
        self.push(Point::ORIGIN);
    }

    pub fn is_full(&self) -> bool {
        self.points.len() == self.capacity
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Flatten relative to the oldest slot, scaling x by the frame width and
    /// y by the frame height independently.
    ///
    /// Always yields `2 * capacity` values. Slots not yet filled count as
    /// degenerate samples ahead of the oldest retained point.
    pub fn flatten_normalized(&self, frame_width: u32, frame_height: u32) -> Vec<f32> {
        let missing = self.capacity - self.points.len();
        let slots = iter::repeat_n(Point::ORIGIN, missing).chain(self.points.iter().copied());
        let base = if missing > 0 {
            Point::ORIGIN
        } else {
            self.points.front().copied().unwrap_or(Point::ORIGIN)
        };
        let scale = |v: f32, dim: u32| if dim == 0 { 0.0 } else { v / dim as f32 };

        let mut out = Vec::with_capacity(self.capacity * 2);
        for p in slots {
            out.push(scale(p.x - base.x, frame_width));
            out.push(scale(p.y - base.y, frame_height));
        }
        out
    }
}

#[cfg(test)]
impl TrajectoryWindow {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Oldest first.
    pub fn points(&self) -> impl Iterator<Item = &Point> {
        self.points.iter()
    }
}
