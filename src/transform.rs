//! Target transform state: what gesture handlers write and the renderer reads.
//!
//! Every setter rejects non-finite results, so one bad frame cannot poison
//! the target the renderer interpolates toward.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::config::Thresholds;
use crate::landmarks::Vec2;

/// Rotation angles in radians around the x and y axes.
pub type Rotation = Vec2;

/// What the render sink interpolates toward each tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetTransform {
    /// `gesture_scale * baseline_scale`.
    pub scale: f32,
    pub rotation: Rotation,
    pub position: Vec2,
}

/// Camera distance to the object and the viewport pan offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraRig {
    pub distance: f32,
    pub offset: Vec2,
}

#[derive(Debug, Clone)]
pub struct Accumulator {
    gesture_scale: f32,
    baseline_scale: f32,
    rotation: Rotation,
    position: Vec2,
    camera: CameraRig,
}

impl Accumulator {
    pub fn new(th: &Thresholds) -> Self {
        Self {
            gesture_scale: 1.0,
            baseline_scale: 1.0,
            rotation: Vec2::ZERO,
            position: Vec2::ZERO,
            camera: CameraRig {
                distance: th.camera.initial_distance,
                offset: Vec2::ZERO,
            },
        }
    }

    pub fn target(&self) -> TargetTransform {
        TargetTransform {
            scale: self.gesture_scale * self.baseline_scale,
            rotation: self.rotation,
            position: self.position,
        }
    }

    pub fn gesture_scale(&self) -> f32 {
        self.gesture_scale
    }

    pub fn baseline_scale(&self) -> f32 {
        self.baseline_scale
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn camera(&self) -> CameraRig {
        self.camera
    }

    /// Absolute gesture scale, as written by two-hand mode and replay.
    pub fn set_gesture_scale(&mut self, scale: f32) {
        if scale.is_finite() && scale > 0.0 {
            self.gesture_scale = scale;
        } else {
            warn!("rejected gesture scale {scale}");
        }
    }

    /// Sets the baseline scale, clamped to the configured limits.
    pub fn set_baseline_scale(&mut self, scale: f32, th: &Thresholds) {
        if !scale.is_finite() {
            warn!("rejected baseline scale {scale}");
            return;
        }
        self.baseline_scale = scale.clamp(th.scale.min, th.scale.max);
    }

    /// Multiplies the baseline scale by `ratio`, clamped to the limits.
    pub fn scale_baseline(&mut self, ratio: f32, th: &Thresholds) {
        self.set_baseline_scale(self.baseline_scale * ratio, th);
    }

    pub fn rotate_by(&mut self, delta: Rotation) {
        let next = self.rotation + delta;
        if next.is_finite() {
            self.rotation = next;
        } else {
            warn!("rejected rotation delta {delta:?}");
        }
    }

    pub fn set_rotation(&mut self, rotation: Rotation) {
        if rotation.is_finite() {
            self.rotation = rotation;
        } else {
            warn!("rejected rotation {rotation:?}");
        }
    }

    pub fn set_position(&mut self, position: Vec2) {
        if position.is_finite() {
            self.position = position;
        } else {
            warn!("rejected position {position:?}");
        }
    }

    /// Moves the model; with `max_distance` the result is re-scaled onto the
    /// limit circle instead of being clipped per axis.
    pub fn translate_by(&mut self, delta: Vec2, max_distance: Option<f32>) {
        let mut next = self.position + delta;
        if let Some(max) = max_distance {
            next = next.clamp_length(max);
        }
        self.set_position(next);
    }

    /// Lerps the position toward the origin. Runs every tick in lock-center
    /// mode whether or not a pan gesture is active.
    pub fn decay_to_center(&mut self, rate: f32) {
        self.position = self.position.lerp(Vec2::ZERO, rate);
    }

    /// Zeroes position and rotation.
    pub fn center(&mut self) {
        self.position = Vec2::ZERO;
        self.rotation = Vec2::ZERO;
    }

    pub fn set_camera_distance(&mut self, distance: f32) {
        if distance.is_finite() && distance > 0.0 {
            self.camera.distance = distance;
        } else {
            warn!("rejected camera distance {distance}");
        }
    }

    /// Moves the camera `step` closer, never below `min`. A camera already
    /// inside `min` is left where it is.
    pub fn zoom_in(&mut self, step: f32, min: f32) {
        let next = (self.camera.distance - step).max(min);
        if next < self.camera.distance {
            self.camera.distance = next;
        }
    }

    /// Moves the camera `step` away, never beyond `max`.
    pub fn zoom_out(&mut self, step: f32, max: f32) {
        let next = (self.camera.distance + step).min(max);
        if next > self.camera.distance {
            self.camera.distance = next;
        }
    }

    /// Scales the camera distance about the object center.
    pub fn orbit(&mut self, multiplier: f32) {
        self.set_camera_distance(self.camera.distance * multiplier);
    }

    /// Lerps the viewport pan offset toward `offset + delta`.
    pub fn pan_camera(&mut self, delta: Vec2, smoothing: f32) {
        let goal = self.camera.offset + delta;
        let next = self.camera.offset.lerp(goal, smoothing);
        if next.is_finite() {
            self.camera.offset = next;
        } else {
            warn!("rejected camera pan {delta:?}");
        }
    }
}
