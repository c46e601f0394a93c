//! Static hand-shape predicates over a single frame.
//!
//! Fist and finger-count shapes use raw image-plane distances from the palm
//! center. Pinch and open palm use the span-normalized thumb-index distance
//! so they hold up as the hand moves toward or away from the camera.

use crate::config::Thresholds;
use crate::landmarks::{
    FINGERTIPS, HandView, INDEX_MCP, INDEX_TIP, MIDDLE_MCP, MIDDLE_TIP, PINKY_MCP, PINKY_TIP,
    RING_MCP, RING_TIP, THUMB_TIP,
};
use crate::smoothing::Hysteresis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub fn tip(self) -> usize {
        match self {
            Finger::Thumb => THUMB_TIP,
            Finger::Index => INDEX_TIP,
            Finger::Middle => MIDDLE_TIP,
            Finger::Ring => RING_TIP,
            Finger::Pinky => PINKY_TIP,
        }
    }

    /// Knuckle the tip must rise above to count as pointing up.
    fn base(self) -> Option<usize> {
        match self {
            Finger::Thumb => None,
            Finger::Index => Some(INDEX_MCP),
            Finger::Middle => Some(MIDDLE_MCP),
            Finger::Ring => Some(RING_MCP),
            Finger::Pinky => Some(PINKY_MCP),
        }
    }
}

pub fn is_fist(view: &HandView, th: &Thresholds) -> bool {
    let total: f32 = FINGERTIPS.iter().map(|&i| view.distance_to_palm(i)).sum();
    total / (FINGERTIPS.len() as f32) < th.fist.max_mean_tip_distance
}

fn is_extended_up(view: &HandView, th: &Thresholds, finger: Finger) -> bool {
    let tip = finger.tip();
    let far = view.distance_to_palm(tip) > th.fingers.extended_min;
    let up = finger
        .base()
        .is_none_or(|base| view.point(tip).y < view.point(base).y);
    far && up
}

fn is_closed(view: &HandView, th: &Thresholds, finger: Finger) -> bool {
    view.distance_to_palm(finger.tip()) < th.fingers.closed_max
}

/// Every finger in `extended` points up and away from the palm while every
/// finger in `closed` is curled in.
pub fn finger_pose(view: &HandView, th: &Thresholds, extended: &[Finger], closed: &[Finger]) -> bool {
    extended.iter().all(|&f| is_extended_up(view, th, f))
        && closed.iter().all(|&f| is_closed(view, th, f))
}

pub fn is_one_finger(view: &HandView, th: &Thresholds) -> bool {
    use Finger::*;
    finger_pose(view, th, &[Index], &[Middle, Ring, Pinky, Thumb])
}

pub fn is_two_fingers(view: &HandView, th: &Thresholds) -> bool {
    use Finger::*;
    finger_pose(view, th, &[Index, Middle], &[Ring, Pinky, Thumb])
}

pub fn is_three_fingers(view: &HandView, th: &Thresholds) -> bool {
    use Finger::*;
    finger_pose(view, th, &[Index, Middle, Ring], &[Pinky, Thumb])
}

/// Span-normalized thumb-to-index distance.
pub fn pinch_metric(view: &HandView) -> f32 {
    view.normalized_distance(THUMB_TIP, INDEX_TIP)
}

pub fn pinch_band(th: &Thresholds) -> Hysteresis {
    Hysteresis::new(th.pinch.start, th.pinch.end)
}

/// Pinch state for this frame given whether the hand was pinching before.
pub fn is_pinch(view: &HandView, th: &Thresholds, was_pinching: bool) -> bool {
    pinch_band(th).next(was_pinching, pinch_metric(view))
}

pub fn is_open_palm(view: &HandView, th: &Thresholds, pinching: bool) -> bool {
    !pinching
        && pinch_metric(view) > th.pinch.end + th.open_palm.margin
        && view.distance(INDEX_TIP, MIDDLE_TIP) > th.open_palm.index_middle_min
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::fixtures::*;
    use crate::landmarks::{Hand, HandView};

    fn check(hand: &Hand, f: fn(&HandView, &Thresholds) -> bool) -> bool {
        let th = Thresholds::default();
        let view = HandView::new(hand, th.normalizer.span_floor);
        f(&view, &th)
    }

    #[test]
    fn fist_fixture_is_a_fist_only() {
        let hand = fist();
        assert!(check(&hand, is_fist));
        assert!(!check(&hand, is_one_finger));
        assert!(!check(&hand, is_two_fingers));
        assert!(!check(&hand, is_three_fingers));
    }

    #[test]
    fn finger_counts_are_exclusive_on_clean_poses() {
        let cases: [(Hand, [bool; 3]); 3] = [
            (one_finger(), [true, false, false]),
            (two_fingers(), [false, true, false]),
            (three_fingers(), [false, false, true]),
        ];
        for (hand, expected) in cases {
            let got = [
                check(&hand, is_one_finger),
                check(&hand, is_two_fingers),
                check(&hand, is_three_fingers),
            ];
            assert_eq!(got, expected);
            assert!(!check(&hand, is_fist));
        }
    }

    #[test]
    fn finger_pointing_down_is_not_extended() {
        let hand = HandBuilder::new().tip(INDEX_TIP, 0.44, 0.80).build();
        assert!(!check(&hand, is_one_finger));
    }

    #[test]
    fn open_thumb_breaks_finger_counts() {
        let hand = HandBuilder::new()
            .extend(INDEX_TIP)
            .extend(THUMB_TIP)
            .build();
        assert!(!check(&hand, is_one_finger));
    }

    #[test]
    fn pinch_engages_below_start() {
        let th = Thresholds::default();
        let hand = pinching(0.04);
        let view = HandView::new(&hand, th.normalizer.span_floor);
        assert!(is_pinch(&view, &th, false));
        assert!(!is_open_palm(&view, &th, true));
    }

    #[test]
    fn pinch_holds_inside_band() {
        let th = Thresholds::default();
        let hand = pinching(0.052);
        let view = HandView::new(&hand, th.normalizer.span_floor);
        assert!(is_pinch(&view, &th, true));
        assert!(!is_pinch(&view, &th, false));
    }

    #[test]
    fn open_palm_needs_spread_fingers() {
        let th = Thresholds::default();
        let open = open_palm();
        let view = HandView::new(&open, th.normalizer.span_floor);
        assert!(is_open_palm(&view, &th, false));
        assert!(!is_open_palm(&view, &th, true));

        let loose = pointing_loose();
        let view = HandView::new(&loose, th.normalizer.span_floor);
        assert!(!is_open_palm(&view, &th, false));
    }

    #[test]
    fn open_palm_needs_margin_above_release() {
        let th = Thresholds::default();
        // above pinch.end but inside the margin
        let hand = pinching(0.065);
        let view = HandView::new(&hand, th.normalizer.span_floor);
        assert!(!is_pinch(&view, &th, true));
        assert!(!is_open_palm(&view, &th, false));
    }
}
