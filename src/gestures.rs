//! Gesture arbitration: one authoritative gesture per frame.
//!
//! Shapes are tried in a fixed priority order, strictest first, so a hand
//! caught between two shapes collapses toward the stricter reading instead
//! of flickering into the fallback. When no shape matches, the palm group
//! decides between pinch, open palm and the rotate fallback.

use log::debug;
use serde::Serialize;

use crate::classify;
use crate::config::Thresholds;
use crate::landmarks::{HandView, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GestureKind {
    None,
    Fist,
    TwoFinger,
    OneFinger,
    ThreeFinger,
    Pinch,
    OpenPalm,
    Rotate,
    TwoHand,
}

impl GestureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Fist => "fist",
            Self::TwoFinger => "two-finger",
            Self::OneFinger => "one-finger",
            Self::ThreeFinger => "three-finger",
            Self::Pinch => "pinch",
            Self::OpenPalm => "open-palm",
            Self::Rotate => "rotate",
            Self::TwoHand => "two-hand",
        }
    }

    /// Human-readable label for status displays.
    pub fn label(&self, lock_center: bool) -> &'static str {
        match self {
            Self::None => "none",
            Self::Fist => "fist: zoom in",
            Self::TwoFinger => "two fingers: zoom out",
            Self::OneFinger if lock_center => "one finger: pan model",
            Self::OneFinger => "one finger: pan viewport",
            Self::ThreeFinger => "three fingers: pan model",
            Self::Pinch => "pinch: scale",
            Self::OpenPalm => "open palm: translate",
            Self::Rotate => "index move: rotate",
            Self::TwoHand => "two hands: scale + translate",
        }
    }
}

/// The active gesture together with whatever it needs to carry between
/// frames. Leaving a gesture drops its payload in one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActiveGesture {
    None,
    Fist,
    TwoFinger,
    OneFinger { last: Vec2 },
    ThreeFinger { last: Vec2 },
    /// Smoothed span-normalized pinch distance from the previous frame.
    Pinch { ema: f32 },
    OpenPalm,
    Rotate { last: Vec2 },
    TwoHand,
}

impl ActiveGesture {
    pub fn kind(&self) -> GestureKind {
        match self {
            Self::None => GestureKind::None,
            Self::Fist => GestureKind::Fist,
            Self::TwoFinger => GestureKind::TwoFinger,
            Self::OneFinger { .. } => GestureKind::OneFinger,
            Self::ThreeFinger { .. } => GestureKind::ThreeFinger,
            Self::Pinch { .. } => GestureKind::Pinch,
            Self::OpenPalm => GestureKind::OpenPalm,
            Self::Rotate { .. } => GestureKind::Rotate,
            Self::TwoHand => GestureKind::TwoHand,
        }
    }
}

/// Frame-edge event relative to the previous frame's gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "gesture", rename_all = "kebab-case")]
pub enum Transition {
    Entered(GestureKind),
    Continued(GestureKind),
    Exited(GestureKind),
}

pub type Classifier = fn(&HandView, &Thresholds) -> bool;

/// Mutually exclusive hand shapes, first match wins.
pub const SHAPE_PRIORITY: [(Classifier, GestureKind); 4] = [
    (classify::is_fist, GestureKind::Fist),
    (classify::is_two_fingers, GestureKind::TwoFinger),
    (classify::is_one_finger, GestureKind::OneFinger),
    (classify::is_three_fingers, GestureKind::ThreeFinger),
];

pub fn select_shape(view: &HandView, th: &Thresholds) -> Option<GestureKind> {
    SHAPE_PRIORITY
        .iter()
        .find(|(test, _)| test(view, th))
        .map(|&(_, kind)| kind)
}

/// Pinch, then open palm, then rotate as the catch-all.
pub fn select_palm(view: &HandView, th: &Thresholds, was_pinching: bool) -> GestureKind {
    let pinching = classify::is_pinch(view, th, was_pinching);
    if pinching {
        GestureKind::Pinch
    } else if classify::is_open_palm(view, th, pinching) {
        GestureKind::OpenPalm
    } else {
        GestureKind::Rotate
    }
}

/// Single-hand resolution for one frame. `was_pinching` is the pinch
/// hysteresis latch left by the last frame that reached the palm group.
pub fn resolve(view: &HandView, th: &Thresholds, was_pinching: bool) -> GestureKind {
    select_shape(view, th).unwrap_or_else(|| select_palm(view, th, was_pinching))
}

/// Holds the one active gesture across frames and reports transitions.
#[derive(Debug, Clone)]
pub struct Arbiter {
    active: ActiveGesture,
    entered_ms: u64,
    last_active_ms: u64,
    // shape frames leave it alone; only the palm group or a reset moves it
    pinch_latched: bool,
}

impl Default for Arbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Arbiter {
    pub fn new() -> Self {
        Self {
            active: ActiveGesture::None,
            entered_ms: 0,
            last_active_ms: 0,
            pinch_latched: false,
        }
    }

    pub fn active(&self) -> &ActiveGesture {
        &self.active
    }

    pub fn kind(&self) -> GestureKind {
        self.active.kind()
    }

    #[cfg(test)]
    pub fn pinch_latched(&self) -> bool {
        self.pinch_latched
    }

    /// Resolves a single-hand frame and updates the pinch latch when the
    /// palm group decided it.
    pub fn resolve(&mut self, view: &HandView, th: &Thresholds) -> GestureKind {
        let kind = resolve(view, th, self.pinch_latched);
        match kind {
            GestureKind::Pinch => self.pinch_latched = true,
            GestureKind::OpenPalm | GestureKind::Rotate => self.pinch_latched = false,
            _ => {}
        }
        kind
    }

    /// How long the current gesture has been continuously active.
    pub fn held_ms(&self) -> u64 {
        match self.active {
            ActiveGesture::None => 0,
            _ => self.last_active_ms.saturating_sub(self.entered_ms),
        }
    }

    /// Installs `next` as this frame's gesture and reports the edge.
    pub fn commit(&mut self, next: ActiveGesture, now_ms: u64) -> Vec<Transition> {
        let prev = self.active.kind();
        let kind = next.kind();
        self.active = next;

        if prev == kind {
            if kind == GestureKind::None {
                return Vec::new();
            }
            self.last_active_ms = now_ms;
            return vec![Transition::Continued(kind)];
        }

        let mut out = Vec::with_capacity(2);
        if prev != GestureKind::None {
            debug!("gesture exited: {}", prev.as_str());
            out.push(Transition::Exited(prev));
        }
        if kind != GestureKind::None {
            debug!("gesture entered: {}", kind.as_str());
            self.entered_ms = now_ms;
            self.last_active_ms = now_ms;
            out.push(Transition::Entered(kind));
        }
        out
    }

    /// Zero-hands reset: back to `None` with every payload dropped.
    pub fn reset(&mut self, now_ms: u64) -> Vec<Transition> {
        let out = self.commit(ActiveGesture::None, now_ms);
        self.entered_ms = 0;
        self.last_active_ms = 0;
        self.pinch_latched = false;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::fixtures::*;
    use crate::landmarks::{Hand, INDEX_TIP, MIDDLE_TIP};
    use proptest::prelude::*;

    fn resolve_with(hand: &Hand, th: &Thresholds, was_pinching: bool) -> GestureKind {
        let view = HandView::new(hand, th.normalizer.span_floor);
        resolve(&view, th, was_pinching)
    }

    #[test]
    fn fixtures_resolve_to_their_gesture() {
        let th = Thresholds::default();
        assert_eq!(resolve_with(&fist(), &th, false), GestureKind::Fist);
        assert_eq!(resolve_with(&one_finger(), &th, false), GestureKind::OneFinger);
        assert_eq!(resolve_with(&two_fingers(), &th, false), GestureKind::TwoFinger);
        assert_eq!(resolve_with(&three_fingers(), &th, false), GestureKind::ThreeFinger);
        assert_eq!(resolve_with(&pinching(0.04), &th, false), GestureKind::Pinch);
        assert_eq!(resolve_with(&open_palm(), &th, false), GestureKind::OpenPalm);
        assert_eq!(resolve_with(&pointing_loose(), &th, false), GestureKind::Rotate);
    }

    #[test]
    fn ambiguous_finger_count_goes_to_higher_priority() {
        // closed_max above extended_min lets a half-raised middle finger
        // count as both extended and closed
        let mut th = Thresholds::default();
        th.fingers.closed_max = 0.25;
        let hand = HandBuilder::new()
            .extend(INDEX_TIP)
            .tip(MIDDLE_TIP, 0.50, 0.42)
            .build();
        let view = HandView::new(&hand, th.normalizer.span_floor);
        assert!(classify::is_one_finger(&view, &th));
        assert!(classify::is_two_fingers(&view, &th));
        for _ in 0..10 {
            assert_eq!(select_shape(&view, &th), Some(GestureKind::TwoFinger));
        }
    }

    #[test]
    fn fist_outranks_finger_counts() {
        let mut th = Thresholds::default();
        th.fist.max_mean_tip_distance = 0.5;
        let view_hand = one_finger();
        let view = HandView::new(&view_hand, th.normalizer.span_floor);
        assert!(classify::is_one_finger(&view, &th));
        assert_eq!(select_shape(&view, &th), Some(GestureKind::Fist));
    }

    #[test]
    fn pinch_latches_only_when_already_pinching() {
        let th = Thresholds::default();
        let hand = pinching(0.052);
        assert_eq!(resolve_with(&hand, &th, true), GestureKind::Pinch);
        assert_eq!(resolve_with(&hand, &th, false), GestureKind::Rotate);
    }

    #[test]
    fn shape_frames_keep_the_pinch_latch() {
        let th = Thresholds::default();
        let mut arb = Arbiter::new();
        fn hr<F: for<'a> Fn(&'a Hand) -> HandView<'a>>(f: F) -> F {
            f
        }
        let view = hr(|hand: &Hand| HandView::new(hand, th.normalizer.span_floor));

        assert_eq!(arb.resolve(&view(&pinching(0.04)), &th), GestureKind::Pinch);
        assert_eq!(arb.resolve(&view(&fist()), &th), GestureKind::Fist);
        assert!(arb.pinch_latched());
        assert_eq!(arb.resolve(&view(&pinching(0.052)), &th), GestureKind::Pinch);

        // leaving through the top of the band releases it
        assert_ne!(arb.resolve(&view(&pinching(0.07)), &th), GestureKind::Pinch);
        assert!(!arb.pinch_latched());
        assert_eq!(arb.resolve(&view(&pinching(0.052)), &th), GestureKind::Rotate);

        arb.resolve(&view(&pinching(0.04)), &th);
        arb.reset(1);
        assert!(!arb.pinch_latched());
    }

    #[test]
    fn commit_reports_enter_continue_exit() {
        let mut arb = Arbiter::new();
        assert_eq!(
            arb.commit(ActiveGesture::Fist, 10),
            vec![Transition::Entered(GestureKind::Fist)]
        );
        assert_eq!(
            arb.commit(ActiveGesture::Fist, 20),
            vec![Transition::Continued(GestureKind::Fist)]
        );
        assert_eq!(arb.held_ms(), 10);
        assert_eq!(
            arb.commit(ActiveGesture::OpenPalm, 30),
            vec![
                Transition::Exited(GestureKind::Fist),
                Transition::Entered(GestureKind::OpenPalm)
            ]
        );
        assert_eq!(arb.held_ms(), 0);
    }

    #[test]
    fn reset_drops_payload_and_reenters_fresh() {
        let mut arb = Arbiter::new();
        arb.commit(ActiveGesture::Rotate { last: Vec2::new(0.4, 0.4) }, 5);
        assert_eq!(arb.reset(6), vec![Transition::Exited(GestureKind::Rotate)]);
        assert_eq!(*arb.active(), ActiveGesture::None);
        assert_eq!(arb.held_ms(), 0);
        assert!(arb.reset(7).is_empty());
        assert_eq!(
            arb.commit(ActiveGesture::Fist, 8),
            vec![Transition::Entered(GestureKind::Fist)]
        );
    }

    proptest! {
        #[test]
        fn exactly_one_gesture_for_any_hand(
            coords in proptest::collection::vec((0.0f32..1.0, 0.0f32..1.0), 21),
            was_pinching in any::<bool>(),
        ) {
            let mut lm = [crate::landmarks::Landmark::default(); 21];
            for (l, (x, y)) in lm.iter_mut().zip(coords) {
                l.x = x;
                l.y = y;
            }
            let hand = Hand::new(lm);
            let th = Thresholds::default();
            let view = HandView::new(&hand, th.normalizer.span_floor);

            let shape_hits = SHAPE_PRIORITY.iter().filter(|(m, _)| m(&view, &th)).count();
            let kind = resolve(&view, &th, was_pinching);

            prop_assert_ne!(kind, GestureKind::None);
            prop_assert_ne!(kind, GestureKind::TwoHand);
            if shape_hits > 0 {
                prop_assert_eq!(Some(kind), select_shape(&view, &th));
            }
        }
    }
}
