//! Hand landmark frames and the palm-relative view every classifier reads.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Sub};

pub const LANDMARK_COUNT: usize = 21;

pub const WRIST: usize = 0;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_TIP: usize = 12;
pub const RING_MCP: usize = 13;
pub const RING_TIP: usize = 16;
pub const PINKY_MCP: usize = 17;
pub const PINKY_TIP: usize = 20;

/// Landmarks averaged into the palm center.
pub const PALM_POINTS: [usize; 5] = [WRIST, INDEX_MCP, MIDDLE_MCP, RING_MCP, PINKY_MCP];

/// Thumb, index, middle, ring, pinky tips.
pub const FINGERTIPS: [usize; 5] = [THUMB_TIP, INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        self.x.hypot(self.y)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn lerp(self, to: Vec2, t: f32) -> Vec2 {
        Vec2::new(
            crate::smoothing::lerp(self.x, to.x, t),
            crate::smoothing::lerp(self.y, to.y, t),
        )
    }

    /// Re-scales the vector onto the circle of radius `max` when it is longer,
    /// keeping its direction.
    pub fn clamp_length(self, max: f32) -> Vec2 {
        let len = self.length();
        if len > max && len > 0.0 {
            self * (max / len)
        } else {
            self
        }
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;
    fn mul(self, k: f32) -> Vec2 {
        Vec2::new(self.x * k, self.y * k)
    }
}

/// One tracked point in detector-normalized image space (y grows downward).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    #[cfg(test)]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn xy(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Exactly 21 landmarks in the detector's anatomical order.
#[derive(Debug, Clone, PartialEq)]
pub struct Hand {
    landmarks: [Landmark; LANDMARK_COUNT],
}

impl Hand {
    pub fn new(landmarks: [Landmark; LANDMARK_COUNT]) -> Self {
        Self { landmarks }
    }

    pub fn landmark(&self, index: usize) -> &Landmark {
        &self.landmarks[index]
    }

    pub fn landmarks(&self) -> &[Landmark; LANDMARK_COUNT] {
        &self.landmarks
    }

    pub fn is_finite(&self) -> bool {
        self.landmarks().iter().all(Landmark::is_finite)
    }
}

/// Hands detected at one sampling instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub timestamp_ms: u64,
    pub hands: Vec<Hand>,
}

impl Frame {
    pub fn new(timestamp_ms: u64, hands: Vec<Hand>) -> Self {
        Self {
            timestamp_ms,
            hands,
        }
    }
}

/// Image-plane Euclidean distance; depth is ignored.
pub fn distance(a: Vec2, b: Vec2) -> f32 {
    (a - b).length()
}

/// A hand seen relative to its own palm: palm center plus knuckle span.
///
/// Built fresh for every frame and never cached across frames.
#[derive(Debug, Clone, Copy)]
pub struct HandView<'a> {
    hand: &'a Hand,
    palm_center: Vec2,
    span: f32,
}

impl<'a> HandView<'a> {
    /// `span_floor` bounds the index-to-pinky knuckle width from below so
    /// span-normalized distances stay finite on degenerate hands.
    pub fn new(hand: &'a Hand, span_floor: f32) -> Self {
        let sum = PALM_POINTS
            .iter()
            .fold(Vec2::ZERO, |acc, &i| acc + hand.landmark(i).xy());
        let palm_center = sum * (1.0 / PALM_POINTS.len() as f32);
        let span = distance(
            hand.landmark(INDEX_MCP).xy(),
            hand.landmark(PINKY_MCP).xy(),
        )
        .max(span_floor);
        Self {
            hand,
            palm_center,
            span,
        }
    }

    pub fn point(&self, index: usize) -> Vec2 {
        self.hand.landmark(index).xy()
    }

    #[cfg(test)]
    pub fn palm_center(&self) -> Vec2 {
        self.palm_center
    }

    #[cfg(test)]
    pub fn span(&self) -> f32 {
        self.span
    }

    pub fn distance(&self, a: usize, b: usize) -> f32 {
        distance(self.point(a), self.point(b))
    }

    /// Raw image-plane distance from the palm center.
    pub fn distance_to_palm(&self, index: usize) -> f32 {
        distance(self.point(index), self.palm_center)
    }

    /// Distance between two landmarks divided by the knuckle span.
    pub fn normalized_distance(&self, a: usize, b: usize) -> f32 {
        self.distance(a, b) / self.span
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn palm_center_is_mean_of_palm_points() {
        let hand = HandBuilder::new().build();
        let view = HandView::new(&hand, 0.001);
        assert!(distance(view.palm_center(), PALM_CENTER) < 1e-6);
    }

    #[test]
    fn span_is_index_to_pinky_knuckle_width() {
        let hand = HandBuilder::new().build();
        let view = HandView::new(&hand, 0.001);
        assert!((view.span() - SPAN).abs() < 1e-5);
    }

    #[test]
    fn span_is_floored_for_collapsed_hands() {
        let hand = Hand::new([Landmark::new(0.5, 0.5, 0.0); LANDMARK_COUNT]);
        let view = HandView::new(&hand, 0.001);
        assert_eq!(view.span(), 0.001);
        assert_eq!(view.normalized_distance(THUMB_TIP, INDEX_TIP), 0.0);
    }

    #[test]
    fn distance_ignores_depth() {
        let mut lm = [Landmark::default(); LANDMARK_COUNT];
        lm[THUMB_TIP] = Landmark::new(0.0, 0.0, 5.0);
        lm[INDEX_TIP] = Landmark::new(0.3, 0.4, -5.0);
        let hand = Hand::new(lm);
        let view = HandView::new(&hand, 0.001);
        assert!((view.distance(THUMB_TIP, INDEX_TIP) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn normalized_distance_divides_by_span() {
        let hand = pinching(0.04);
        let view = HandView::new(&hand, 0.001);
        assert!((view.normalized_distance(THUMB_TIP, INDEX_TIP) - 0.04).abs() < 1e-4);
    }

    #[test]
    fn non_finite_coordinates_are_detected() {
        let mut lm = *fist().landmarks();
        assert!(Hand::new(lm).is_finite());
        lm[RING_TIP].y = f32::NAN;
        assert!(!Hand::new(lm).is_finite());
        lm[RING_TIP].y = 0.5;
        lm[WRIST].z = f32::INFINITY;
        assert!(!Hand::new(lm).is_finite());
    }

    #[test]
    fn clamp_length_preserves_direction() {
        let v = Vec2::new(3.0, 4.0).clamp_length(2.5);
        assert!((v.length() - 2.5).abs() < 1e-6);
        assert!((v.x / v.y - 0.75).abs() < 1e-6);
        assert_eq!(Vec2::new(1.0, 1.0).clamp_length(3.0), Vec2::new(1.0, 1.0));
    }
}
