//! Wrist-relative, scale-normalized pose features.

use crate::hand::{Point, WRIST};

/// Flatten keypoints into a pose feature vector.
///
/// Every keypoint is translated so the wrist becomes the origin, the pairs are
/// flattened in keypoint order and the result is divided by its largest
/// absolute value. All values land in `[-1, 1]`; a degenerate hand (every
/// keypoint on the wrist) yields zeros.
pub fn normalize(keypoints: &[Point]) -> Vec<f32> {
    let Some(base) = keypoints.get(WRIST).copied() else {
        return Vec::new();
    };

    let mut flat: Vec<f32> = keypoints
        .iter()
        .flat_map(|p| [p.x - base.x, p.y - base.y])
        .collect();

    let max_abs = flat.iter().fold(0.0f32, |m, v| m.max(v.abs()));
    if max_abs > 0.0 {
        for v in &mut flat {
            *v /= max_abs;
        }
    } else {
        flat.fill(0.0);
    }
    flat
}
