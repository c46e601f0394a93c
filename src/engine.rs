//! The gesture interpretation engine.
//!
//! One `Engine` owns all gesture and transform state. It is driven by one
//! `process` call per landmark frame and one `tick` per render interval;
//! consumers pull `snapshot()` whenever they need the current target.

use log::{debug, info, warn};
use serde::Serialize;
use std::f32::consts::PI;

use crate::classify;
use crate::config::{Features, Profile, Thresholds};
use crate::gestures::{ActiveGesture, Arbiter, GestureKind, Transition};
use crate::landmarks::{Frame, Hand, HandView, INDEX_TIP, MIDDLE_TIP, RING_TIP, Vec2};
use crate::pointer::{self, PointerEvent};
use crate::replay::{Recorder, Recording, ReplayStatus, Replayer};
use crate::smoothing::{Ema, RatioLimiter};
use crate::transform::{Accumulator, CameraRig, TargetTransform};
use crate::two_hand;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FrameOutcome {
    Processed,
    /// Live processing is paused; state is preserved.
    Suppressed,
    /// Timestamp not after the previous frame's.
    Stale,
    /// Several hands while two-hand mode is off.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub timestamp_ms: u64,
    pub outcome: FrameOutcome,
    pub gesture: GestureKind,
    pub transitions: Vec<Transition>,
}

/// Everything a renderer or status display reads once per tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub gesture: GestureKind,
    pub label: &'static str,
    pub held_ms: u64,
    pub target: TargetTransform,
    pub gesture_scale: f32,
    pub baseline_scale: f32,
    pub camera: CameraRig,
    pub features: Features,
    pub suppressed: bool,
    pub recording: bool,
    pub replaying: bool,
}

pub struct Engine {
    th: Thresholds,
    features: Features,
    arbiter: Arbiter,
    acc: Accumulator,
    label: &'static str,
    suppressed: bool,
    last_frame_ms: Option<u64>,
    recorder: Recorder,
    replay: Option<Replayer>,
}

impl Engine {
    pub fn new(profile: &Profile) -> Self {
        Self {
            th: profile.thresholds.clone(),
            features: profile.features,
            arbiter: Arbiter::new(),
            acc: Accumulator::new(&profile.thresholds),
            label: GestureKind::None.label(profile.features.lock_center),
            suppressed: false,
            last_frame_ms: None,
            recorder: Recorder::new(profile.pipeline.sample_ms),
            replay: None,
        }
    }

    /// Swaps in new tuning without disturbing gesture or transform state.
    pub fn apply_profile(&mut self, profile: &Profile) {
        self.th = profile.thresholds.clone();
        self.features = profile.features;
        self.recorder.set_interval(profile.pipeline.sample_ms);
        let baseline = self.acc.baseline_scale();
        self.acc.set_baseline_scale(baseline, &self.th);
    }

    pub fn features(&self) -> Features {
        self.features
    }

    pub fn set_two_hand(&mut self, on: bool) {
        self.features.two_hand = on;
    }

    pub fn set_lock_center(&mut self, on: bool) {
        self.features.lock_center = on;
    }

    /// Caller-owned pause. Frames are skipped while set; nothing is reset.
    pub fn set_suppressed(&mut self, on: bool) {
        self.suppressed = on;
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed || self.replay.is_some()
    }

    pub fn gesture(&self) -> GestureKind {
        self.arbiter.kind()
    }

    pub fn active(&self) -> &ActiveGesture {
        self.arbiter.active()
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn target(&self) -> TargetTransform {
        self.acc.target()
    }

    pub fn accumulator(&self) -> &Accumulator {
        &self.acc
    }

    pub fn process(&mut self, frame: &Frame) -> FrameReport {
        let ts = frame.timestamp_ms;
        if self.is_suppressed() {
            return self.report(ts, FrameOutcome::Suppressed, Vec::new());
        }
        if let Some(last) = self.last_frame_ms {
            if ts <= last {
                warn!("dropping stale frame t={ts} (last t={last})");
                return self.report(ts, FrameOutcome::Stale, Vec::new());
            }
        }
        self.last_frame_ms = Some(ts);

        let hands: Vec<&Hand> = frame
            .hands
            .iter()
            .filter(|h| {
                let ok = h.is_finite();
                if !ok {
                    warn!("dropping hand with non-finite landmarks at t={ts}");
                }
                ok
            })
            .collect();

        let transitions = match hands.as_slice() {
            [] => self.arbiter.reset(ts),
            [a, b, ..] if self.features.two_hand => self.process_two_hand(a, b, ts),
            [hand] => self.process_single(hand, ts),
            _ => {
                debug!("{} hands with two-hand mode off; frame ignored", hands.len());
                return self.report(ts, FrameOutcome::Ignored, Vec::new());
            }
        };
        self.label = self.gesture().label(self.features.lock_center);
        self.report(ts, FrameOutcome::Processed, transitions)
    }

    fn report(&self, ts: u64, outcome: FrameOutcome, transitions: Vec<Transition>) -> FrameReport {
        FrameReport {
            timestamp_ms: ts,
            outcome,
            gesture: self.gesture(),
            transitions,
        }
    }

    fn process_single(&mut self, hand: &Hand, ts: u64) -> Vec<Transition> {
        let view = HandView::new(hand, self.th.normalizer.span_floor);
        let prev = *self.active();
        let kind = self.arbiter.resolve(&view, &self.th);
        let next = apply_gesture(
            &mut self.acc,
            &self.th,
            self.features.lock_center,
            kind,
            &prev,
            &view,
        );
        self.arbiter.commit(next, ts)
    }

    fn process_two_hand(&mut self, a: &Hand, b: &Hand, ts: u64) -> Vec<Transition> {
        let pose = two_hand::resolve(a, b, &self.th.two_hand);
        self.acc.set_gesture_scale(pose.scale);
        self.acc.set_position(pose.position);
        self.arbiter.commit(ActiveGesture::TwoHand, ts)
    }

    /// Mouse-analog input. Honoured while suppressed and leaves hand
    /// gesture continuation alone.
    pub fn pointer(&mut self, event: &PointerEvent) {
        self.label = pointer::apply(
            &mut self.acc,
            event,
            &self.th,
            self.features.lock_center,
        );
    }

    /// Per-render-tick work: replay playback, lock-center decay, recording.
    pub fn tick(&mut self, now_ms: u64) {
        if let Some(player) = self.replay.as_mut() {
            if player.advance(now_ms, &mut self.acc) == ReplayStatus::Finished {
                info!("replay finished");
                self.replay = None;
            }
        }
        if self.features.lock_center {
            self.acc.decay_to_center(self.th.lock_center.decay);
        }
        self.recorder.sample(now_ms, &self.acc);
    }

    pub fn center(&mut self) {
        self.acc.center();
    }

    pub fn set_baseline_scale(&mut self, scale: f32) {
        self.acc.set_baseline_scale(scale, &self.th);
    }

    pub fn start_recording(&mut self, now_ms: u64) {
        info!("recording started");
        self.recorder.start(now_ms);
    }

    pub fn stop_recording(&mut self) {
        if self.recorder.is_active() {
            info!(
                "recording stopped ({} samples)",
                self.recorder.recording().samples.len()
            );
        }
        self.recorder.stop();
    }

    pub fn recording(&self) -> &Recording {
        self.recorder.recording()
    }

    /// Starts playback and suppresses live frames until it ends. Returns
    /// false when a replay is already running or there is nothing to play.
    pub fn start_replay(&mut self, recording: Recording, now_ms: u64) -> bool {
        if self.replay.is_some() || recording.samples.is_empty() {
            return false;
        }
        info!(
            "replaying {} samples over {} ms",
            recording.samples.len(),
            recording.duration_ms()
        );
        self.replay = Some(Replayer::new(recording, now_ms));
        true
    }

    pub fn is_replaying(&self) -> bool {
        self.replay.is_some()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            gesture: self.gesture(),
            label: self.label,
            held_ms: self.arbiter.held_ms(),
            target: self.target(),
            gesture_scale: self.acc.gesture_scale(),
            baseline_scale: self.acc.baseline_scale(),
            camera: self.acc.camera(),
            features: self.features,
            suppressed: self.is_suppressed(),
            recording: self.recorder.is_active(),
            replaying: self.is_replaying(),
        }
    }
}

/// Runs the handler for `kind` and returns the gesture with its payload for
/// the next frame. Continuation deltas only apply when `prev` is the same
/// gesture; a fresh entry just seeds the payload.
fn apply_gesture(
    acc: &mut Accumulator,
    th: &Thresholds,
    lock_center: bool,
    kind: GestureKind,
    prev: &ActiveGesture,
    view: &HandView,
) -> ActiveGesture {
    match kind {
        GestureKind::Fist => {
            acc.zoom_in(th.fist.zoom_speed, th.fist.min_distance);
            ActiveGesture::Fist
        }
        GestureKind::TwoFinger => {
            acc.zoom_out(th.two_finger.zoom_speed, th.two_finger.max_distance);
            ActiveGesture::TwoFinger
        }
        GestureKind::OneFinger => {
            let pos = view.point(INDEX_TIP);
            if let ActiveGesture::OneFinger { last } = prev {
                let t = &th.one_finger;
                let d = (pos - *last) * t.sensitivity;
                if lock_center {
                    let delta = Vec2::new(-d.x * t.model_gain, d.y * t.model_gain);
                    acc.translate_by(delta, Some(t.max_pan_distance));
                } else {
                    let delta = Vec2::new(d.x * t.camera_gain, -d.y * t.camera_gain);
                    acc.pan_camera(delta, t.smoothing);
                }
            }
            ActiveGesture::OneFinger { last: pos }
        }
        GestureKind::ThreeFinger => {
            let pos = (view.point(INDEX_TIP) + view.point(MIDDLE_TIP) + view.point(RING_TIP))
                * (1.0 / 3.0);
            if let ActiveGesture::ThreeFinger { last } = prev {
                let t = &th.three_finger;
                let d = (pos - *last) * t.sensitivity;
                let delta = Vec2::new(-d.x * t.model_gain, d.y * t.model_gain);
                acc.translate_by(delta, Some(t.max_pan_distance));
            }
            ActiveGesture::ThreeFinger { last: pos }
        }
        GestureKind::Pinch => {
            let raw = classify::pinch_metric(view);
            let ema = match prev {
                ActiveGesture::Pinch { ema: last } => {
                    let p = &th.pinch;
                    let ema = Ema::new(p.ema_alpha).next(Some(*last), raw);
                    let limiter = RatioLimiter {
                        deadzone: p.min_change_ratio,
                        min: p.ratio_min,
                        max: p.ratio_max,
                    };
                    if let Some(ratio) = limiter.step(ema, *last) {
                        acc.scale_baseline(ratio, th);
                    }
                    ema
                }
                _ => raw,
            };
            ActiveGesture::Pinch { ema }
        }
        GestureKind::OpenPalm => {
            let tip = view.point(INDEX_TIP);
            let o = &th.open_palm;
            acc.set_position(Vec2::new(
                (tip.x - 0.5) * 2.0 * o.gain_x,
                (0.5 - tip.y) * 2.0 * o.gain_y,
            ));
            ActiveGesture::OpenPalm
        }
        GestureKind::Rotate => {
            let pos = view.point(INDEX_TIP);
            if let ActiveGesture::Rotate { last } = prev {
                let d = pos - *last;
                let k = PI * th.rotate.gain;
                acc.rotate_by(Vec2::new(-d.y * k, -d.x * k));
            }
            ActiveGesture::Rotate { last: pos }
        }
        // single-hand resolution never yields these
        GestureKind::None | GestureKind::TwoHand => ActiveGesture::None,
    }
}
