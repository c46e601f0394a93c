//! Two-hand scale and translate, driven by the two index fingertips.

use crate::config::TwoHandTuning;
use crate::landmarks::{Hand, INDEX_TIP, Vec2, distance};

/// Absolute scale and position for one two-hand frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwoHandPose {
    /// Replaces the gesture scale outright; the baseline is not multiplied in.
    pub scale: f32,
    pub position: Vec2,
}

/// Maps the fingertip gap to a scale and the fingertip midpoint into the
/// `[-range_x, range_x] x [-range_y, range_y]` viewport box.
pub fn resolve(a: &Hand, b: &Hand, th: &TwoHandTuning) -> TwoHandPose {
    let ia = a.landmark(INDEX_TIP).xy();
    let ib = b.landmark(INDEX_TIP).xy();
    let d = distance(ia, ib);
    let mid = (ia + ib) * 0.5;
    TwoHandPose {
        scale: (th.base_scale + d * th.gain).clamp(th.min_scale, th.max_scale),
        position: Vec2::new(
            (mid.x - 0.5) * 2.0 * th.range_x,
            (0.5 - mid.y) * 2.0 * th.range_y,
        ),
    }
}
