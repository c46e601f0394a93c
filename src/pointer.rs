//! Mouse-analog manipulation: drags and wheel steps fed into the same
//! accumulator the hand gestures write.

use serde::Deserialize;
use std::f32::consts::PI;

use crate::config::Thresholds;
use crate::landmarks::Vec2;
use crate::transform::Accumulator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DragMode {
    Rotate,
    Translate,
    Scale,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

impl DragMode {
    /// Primary button rotates, ctrl/meta+primary scales, shift/alt+primary
    /// or any other button translates.
    pub fn for_press(button: u8, mods: Modifiers) -> Self {
        match button {
            0 if mods.ctrl || mods.meta => DragMode::Scale,
            0 if mods.shift || mods.alt => DragMode::Translate,
            0 => DragMode::Rotate,
            _ => DragMode::Translate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Drag {
    #[serde(default)]
    pub mode: Option<DragMode>,
    #[serde(default)]
    pub button: u8,
    #[serde(default)]
    pub modifiers: Modifiers,
    /// Pixel deltas since the previous drag event.
    pub dx: f32,
    pub dy: f32,
}

impl Drag {
    pub fn mode(&self) -> DragMode {
        self.mode
            .unwrap_or_else(|| DragMode::for_press(self.button, self.modifiers))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Drag(Drag),
    Wheel { delta_y: f32 },
}

/// Applies one pointer event and returns the label to show for it.
pub fn apply(
    acc: &mut Accumulator,
    event: &PointerEvent,
    th: &Thresholds,
    lock_center: bool,
) -> &'static str {
    let p = &th.pointer;
    match event {
        PointerEvent::Drag(drag) => match drag.mode() {
            DragMode::Rotate => {
                let k = PI * p.rotate_gain;
                acc.rotate_by(Vec2::new(-drag.dy * k, -drag.dx * k));
                "pointer: rotate"
            }
            DragMode::Translate if lock_center => {
                // screen y grows downward, world y upward
                let wpp = p.world_per_pixel;
                acc.translate_by(Vec2::new(drag.dx * wpp, -drag.dy * wpp), None);
                "pointer: pan model"
            }
            DragMode::Translate => {
                let delta = Vec2::new(-drag.dx * p.viewport_pan, drag.dy * p.viewport_pan);
                acc.pan_camera(delta, 1.0);
                "pointer: pan viewport"
            }
            DragMode::Scale => {
                acc.scale_baseline((-drag.dy * p.scale_rate).exp(), th);
                "pointer: scale"
            }
        },
        PointerEvent::Wheel { delta_y } => {
            let step = (delta_y * p.wheel_rate).clamp(-p.wheel_clamp, p.wheel_clamp);
            acc.orbit(1.0 + step);
            if *delta_y > 0.0 {
                "wheel: zoom out"
            } else {
                "wheel: zoom in"
            }
        }
    }
}
