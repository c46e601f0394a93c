//! Transform recording and replay.
//!
//! Only the accumulator output is captured. Replay writes samples back while
//! live gesture processing is suppressed; gesture state is never touched.

use anyhow::{Context, Result, anyhow};
use log::info;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::landmarks::Vec2;
use crate::transform::Accumulator;

pub const FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformSample {
    /// Milliseconds since the recording started.
    pub t_ms: u64,
    /// Gesture scale; the baseline scale is not part of a sample.
    pub scale: f32,
    pub rotation: Vec2,
    pub position: Vec2,
}

impl TransformSample {
    pub fn capture(t_ms: u64, acc: &Accumulator) -> Self {
        Self {
            t_ms,
            scale: acc.gesture_scale(),
            rotation: acc.rotation(),
            position: acc.position(),
        }
    }

    pub fn restore(&self, acc: &mut Accumulator) {
        acc.set_gesture_scale(self.scale);
        acc.set_rotation(self.rotation);
        acc.set_position(self.position);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub format_version: String,
    pub samples: Vec<TransformSample>,
}

impl Default for Recording {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            samples: Vec::new(),
        }
    }
}

impl Recording {
    pub fn duration_ms(&self) -> u64 {
        self.samples.last().map_or(0, |s| s.t_ms)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        info!(
            "saved recording ({} samples) to {}",
            self.samples.len(),
            path.display()
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
        let rec: Recording = serde_json::from_str(&txt)
            .map_err(|e| anyhow!("failed to parse {}: {e}", path.display()))?;
        if rec.format_version != FORMAT_VERSION {
            return Err(anyhow!(
                "unsupported recording format {} (expected {FORMAT_VERSION})",
                rec.format_version
            ));
        }
        if rec.samples.windows(2).any(|w| w[1].t_ms < w[0].t_ms) {
            return Err(anyhow!("recording samples are not in time order"));
        }
        Ok(rec)
    }
}

/// Samples the accumulator at a fixed cadence while active.
#[derive(Debug, Clone)]
pub struct Recorder {
    interval_ms: u64,
    started_ms: Option<u64>,
    last_sample_ms: Option<u64>,
    recording: Recording,
}

impl Recorder {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            started_ms: None,
            last_sample_ms: None,
            recording: Recording::default(),
        }
    }

    pub fn set_interval(&mut self, interval_ms: u64) {
        self.interval_ms = interval_ms;
    }

    pub fn is_active(&self) -> bool {
        self.started_ms.is_some()
    }

    /// Starts a fresh recording, discarding any previous samples.
    pub fn start(&mut self, now_ms: u64) {
        self.recording = Recording::default();
        self.started_ms = Some(now_ms);
        self.last_sample_ms = None;
    }

    pub fn stop(&mut self) {
        self.started_ms = None;
    }

    pub fn sample(&mut self, now_ms: u64, acc: &Accumulator) {
        let Some(start) = self.started_ms else {
            return;
        };
        if let Some(last) = self.last_sample_ms {
            if now_ms.saturating_sub(last) < self.interval_ms {
                return;
            }
        }
        self.last_sample_ms = Some(now_ms);
        let t = now_ms.saturating_sub(start);
        self.recording.samples.push(TransformSample::capture(t, acc));
    }

    pub fn recording(&self) -> &Recording {
        &self.recording
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayStatus {
    Running,
    Finished,
}

/// Writes recorded samples back as their timestamps elapse.
#[derive(Debug, Clone)]
pub struct Replayer {
    samples: Vec<TransformSample>,
    next: usize,
    started_ms: u64,
}

impl Replayer {
    pub fn new(recording: Recording, now_ms: u64) -> Self {
        Self {
            samples: recording.samples,
            next: 0,
            started_ms: now_ms,
        }
    }

    /// Applies every sample due by `now_ms`, in order.
    pub fn advance(&mut self, now_ms: u64, acc: &mut Accumulator) -> ReplayStatus {
        let elapsed = now_ms.saturating_sub(self.started_ms);
        while let Some(sample) = self.samples.get(self.next) {
            if sample.t_ms > elapsed {
                break;
            }
            sample.restore(acc);
            self.next += 1;
        }
        if self.next >= self.samples.len() {
            ReplayStatus::Finished
        } else {
            ReplayStatus::Running
        }
    }
}
