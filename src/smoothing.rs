//! Temporal filters: hysteresis for binary gesture state, EMA and lerp for
//! continuous values.
//!
//! The two kinds are kept apart. Hysteresis only decides whether a mode is
//! engaged; the EMA and the ratio clamp shape the magnitude once it is.

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Separate enter and exit thresholds on a "lower is engaged" metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hysteresis {
    pub enter_below: f32,
    pub exit_above: f32,
}

impl Hysteresis {
    pub fn new(enter_below: f32, exit_above: f32) -> Self {
        Self {
            enter_below,
            exit_above,
        }
    }

    /// Next engaged state given the current one. Inside the band the
    /// previous state is held.
    pub fn next(&self, engaged: bool, value: f32) -> bool {
        if !engaged && value < self.enter_below {
            true
        } else if engaged && value > self.exit_above {
            false
        } else {
            engaged
        }
    }
}

/// Exponential moving average with weight `alpha` on the newest sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ema {
    pub alpha: f32,
}

impl Ema {
    pub fn new(alpha: f32) -> Self {
        Self { alpha }
    }

    /// Seeds with `raw` when there is no history.
    pub fn next(&self, prev: Option<f32>, raw: f32) -> f32 {
        let last = prev.unwrap_or(raw);
        last * (1.0 - self.alpha) + raw * self.alpha
    }
}

/// Per-frame scale step derived from two successive smoothed pinch values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatioLimiter {
    /// Steps with `|ratio - 1|` at or below this are dropped as jitter.
    pub deadzone: f32,
    pub min: f32,
    pub max: f32,
}

impl RatioLimiter {
    /// `None` when the step falls in the deadzone or `last` is unusable.
    pub fn step(&self, current: f32, last: f32) -> Option<f32> {
        if last.is_nan() || last <= 0.0 {
            return None;
        }
        let ratio = current / last;
        self.limit(ratio)
    }

    pub fn limit(&self, ratio: f32) -> Option<f32> {
        if !ratio.is_finite() || (ratio - 1.0).abs() <= self.deadzone {
            return None;
        }
        Some(ratio.clamp(self.min, self.max))
    }
}
