use anyhow::{Context, Result, anyhow};
use directories::BaseDirs;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Meta {
    pub name: Option<String>,
}

/// Runtime-toggleable modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Features {
    pub two_hand: bool,
    pub lock_center: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            two_hand: false,
            lock_center: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineTuning {
    /// Interval between engine ticks (decay, replay, recording).
    pub tick_ms: u64,
    /// Recorder sampling cadence.
    pub sample_ms: u64,
    /// Process only every (frame_skip + 1)-th landmark frame.
    pub frame_skip: u32,
}

impl Default for PipelineTuning {
    fn default() -> Self {
        Self {
            tick_ms: 16,
            sample_ms: 50,
            frame_skip: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NormalizerTuning {
    pub span_floor: f32,
}

impl Default for NormalizerTuning {
    fn default() -> Self {
        Self { span_floor: 0.001 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FistTuning {
    /// Mean palm-to-fingertip distance, raw image units.
    pub max_mean_tip_distance: f32,
    pub zoom_speed: f32,
    pub min_distance: f32,
}

impl Default for FistTuning {
    fn default() -> Self {
        Self {
            max_mean_tip_distance: 0.08,
            zoom_speed: 0.015,
            min_distance: 0.01,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FingerTuning {
    pub extended_min: f32,
    pub closed_max: f32,
}

impl Default for FingerTuning {
    fn default() -> Self {
        Self {
            extended_min: 0.15,
            closed_max: 0.12,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TwoFingerTuning {
    pub zoom_speed: f32,
    pub max_distance: f32,
}

impl Default for TwoFingerTuning {
    fn default() -> Self {
        Self {
            zoom_speed: 0.015,
            max_distance: 15.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OneFingerTuning {
    pub sensitivity: f32,
    pub max_pan_distance: f32,
    /// Lerp factor for camera pans (lock center off).
    pub smoothing: f32,
    pub model_gain: f32,
    pub camera_gain: f32,
}

impl Default for OneFingerTuning {
    fn default() -> Self {
        Self {
            sensitivity: 0.8,
            max_pan_distance: 3.0,
            smoothing: 0.1,
            model_gain: 2.5,
            camera_gain: 3.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThreeFingerTuning {
    pub sensitivity: f32,
    pub max_pan_distance: f32,
    pub model_gain: f32,
}

impl Default for ThreeFingerTuning {
    fn default() -> Self {
        Self {
            sensitivity: 1.2,
            max_pan_distance: 3.0,
            model_gain: 2.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PinchTuning {
    /// Engage when span-normalized thumb-index distance drops below this.
    pub start: f32,
    /// Release when it rises above this.
    pub end: f32,
    pub ema_alpha: f32,
    pub min_change_ratio: f32,
    pub ratio_min: f32,
    pub ratio_max: f32,
}

impl Default for PinchTuning {
    fn default() -> Self {
        Self {
            start: 0.045,
            end: 0.060,
            ema_alpha: 0.3,
            min_change_ratio: 0.01,
            ratio_min: 0.85,
            ratio_max: 1.18,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OpenPalmTuning {
    /// Added to `pinch.end` for the open-palm thumb-index floor.
    pub margin: f32,
    pub index_middle_min: f32,
    pub gain_x: f32,
    pub gain_y: f32,
}

impl Default for OpenPalmTuning {
    fn default() -> Self {
        Self {
            margin: 0.01,
            index_middle_min: 0.09,
            gain_x: 1.2,
            gain_y: 0.9,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RotateTuning {
    /// Radians per unit of fingertip motion, in multiples of pi.
    pub gain: f32,
}

impl Default for RotateTuning {
    fn default() -> Self {
        Self { gain: 1.8 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScaleLimits {
    pub min: f32,
    pub max: f32,
}

impl Default for ScaleLimits {
    fn default() -> Self {
        Self {
            min: 0.05,
            max: 10.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TwoHandTuning {
    pub base_scale: f32,
    pub gain: f32,
    pub min_scale: f32,
    pub max_scale: f32,
    pub range_x: f32,
    pub range_y: f32,
}

impl Default for TwoHandTuning {
    fn default() -> Self {
        Self {
            base_scale: 0.2,
            gain: 6.0,
            min_scale: 0.1,
            max_scale: 8.0,
            range_x: 1.1,
            range_y: 0.9,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LockCenterTuning {
    /// Per-tick lerp factor toward the origin.
    pub decay: f32,
}

impl Default for LockCenterTuning {
    fn default() -> Self {
        Self { decay: 0.25 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PointerTuning {
    /// Radians per pixel, in multiples of pi.
    pub rotate_gain: f32,
    pub scale_rate: f32,
    pub wheel_rate: f32,
    pub wheel_clamp: f32,
    pub viewport_pan: f32,
    pub world_per_pixel: f32,
}

impl Default for PointerTuning {
    fn default() -> Self {
        Self {
            rotate_gain: 0.01,
            scale_rate: 0.003,
            wheel_rate: 0.001,
            wheel_clamp: 0.5,
            viewport_pan: 0.01,
            world_per_pixel: 0.005,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CameraTuning {
    pub initial_distance: f32,
}

impl Default for CameraTuning {
    fn default() -> Self {
        Self {
            initial_distance: 5.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Thresholds {
    pub normalizer: NormalizerTuning,
    pub fist: FistTuning,
    pub fingers: FingerTuning,
    pub two_finger: TwoFingerTuning,
    pub one_finger: OneFingerTuning,
    pub three_finger: ThreeFingerTuning,
    pub pinch: PinchTuning,
    pub open_palm: OpenPalmTuning,
    pub rotate: RotateTuning,
    pub scale: ScaleLimits,
    pub two_hand: TwoHandTuning,
    pub lock_center: LockCenterTuning,
    pub pointer: PointerTuning,
    pub camera: CameraTuning,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Profile {
    pub meta: Meta,
    pub features: Features,
    pub pipeline: PipelineTuning,
    pub thresholds: Thresholds,
}

impl Profile {
    pub fn from_toml_str(txt: &str) -> Result<Self> {
        let profile: Profile = toml::from_str(txt)?;
        validate_profile(&profile)?;
        Ok(profile)
    }
}

#[derive(Debug, Clone)]
pub struct ConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

pub fn default_config_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().ok_or_else(|| anyhow!("cannot determine home directory"))?;
    Ok(base.config_dir().join("handctl"))
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl ConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        Self::open(default_config_dir()?)
    }

    /// Loads the active profile under `config_dir`, installing the default
    /// profile and the `active` pointer when they are missing.
    pub fn open(config_dir: PathBuf) -> Result<Self> {
        let profiles_dir = config_dir.join("profiles");
        fs::create_dir_all(&profiles_dir)
            .with_context(|| format!("creating {}", profiles_dir.display()))?;

        let def_path = profiles_dir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = config_dir.join("active");
        if !active_ptr.exists() {
            fs::write(&active_ptr, b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = load_profile(&profiles_dir, &active_name)?;

        Ok(Self {
            active_name,
            profile,
            config_dir,
            profiles_dir,
            active_ptr,
        })
    }

    /// Re-reads the active profile. On error the previous profile stays.
    pub fn reload(&mut self) -> Result<()> {
        self.profile = load_profile(&self.profiles_dir, &self.active_name)?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profile_path(name);
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        let profile = load_profile(&self.profiles_dir, name)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.profile = profile;
        Ok(())
    }

    pub fn profile_path(&self, name: &str) -> PathBuf {
        self.profiles_dir.join(format!("{name}.toml"))
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        v.push(stem.to_string());
                    }
                }
            }
        }
        v.sort();
        v
    }

    pub fn doctor_report(&self, socket: &Path) -> serde_json::Value {
        serde_json::json!({
            "config_dir": self.config_dir,
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "profiles": self.list_profiles(),
            "features": self.profile.features,
            "socket": socket,
            "socket_present": socket.exists(),
            "hints": {
                "frames": "pipe detector output as JSON lines: handctl run < frames.jsonl",
                "log_level": "RUST_LOG=debug shows gesture transitions"
            }
        })
    }
}

fn load_profile(profiles_dir: &Path, name: &str) -> Result<Profile> {
    let path = profiles_dir.join(format!("{name}.toml"));
    let txt = fs::read_to_string(&path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    Profile::from_toml_str(&txt).map_err(|e| anyhow!("failed to load {}: {e}", path.display()))
}

/// Dotted path of the first non-finite float under `value`, if any.
fn non_finite_field(prefix: &str, value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::Float(f) if !f.is_finite() => Some(prefix.to_string()),
        toml::Value::Table(table) => table.iter().find_map(|(key, v)| {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            non_finite_field(&path, v)
        }),
        _ => None,
    }
}

fn validate_profile(p: &Profile) -> Result<()> {
    let th = &p.thresholds;
    let tree = toml::Value::try_from(th).context("serializing thresholds")?;
    if let Some(field) = non_finite_field("", &tree) {
        return Err(anyhow!("{field} must be a finite number"));
    }
    if p.pipeline.tick_ms == 0 || p.pipeline.sample_ms == 0 {
        return Err(anyhow!("pipeline intervals must be positive durations"));
    }
    if !(th.normalizer.span_floor > 0.0) {
        return Err(anyhow!("normalizer.span_floor must be positive"));
    }
    if !(th.pinch.start < th.pinch.end) {
        return Err(anyhow!(
            "pinch.start ({}) must be below pinch.end ({})",
            th.pinch.start,
            th.pinch.end
        ));
    }
    if !(th.pinch.ema_alpha > 0.0 && th.pinch.ema_alpha <= 1.0) {
        return Err(anyhow!("pinch.ema_alpha must be in (0,1]"));
    }
    if !(th.pinch.ratio_min > 0.0 && th.pinch.ratio_min <= 1.0 && th.pinch.ratio_max >= 1.0) {
        return Err(anyhow!("pinch ratio clamp must bracket 1.0"));
    }
    if !(th.scale.min > 0.0 && th.scale.min < th.scale.max) {
        return Err(anyhow!("scale limits must satisfy 0 < min < max"));
    }
    if !(th.two_hand.min_scale > 0.0 && th.two_hand.min_scale < th.two_hand.max_scale) {
        return Err(anyhow!("two_hand scale limits must satisfy 0 < min < max"));
    }
    if !(th.fist.min_distance > 0.0 && th.fist.min_distance < th.two_finger.max_distance) {
        return Err(anyhow!(
            "camera distance limits must satisfy 0 < fist.min_distance < two_finger.max_distance"
        ));
    }
    let rates = [
        ("lock_center.decay", th.lock_center.decay),
        ("one_finger.smoothing", th.one_finger.smoothing),
    ];
    for (name, v) in rates {
        if !(v > 0.0 && v <= 1.0) {
            return Err(anyhow!("{name} must be in (0,1]"));
        }
    }
    if !(th.one_finger.max_pan_distance > 0.0 && th.three_finger.max_pan_distance > 0.0) {
        return Err(anyhow!("max_pan_distance must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn embedded_default_profile_matches_defaults() {
        let p = Profile::from_toml_str(default_profile_text()).expect("default profile parses");
        let d = Profile::default();
        assert_eq!(p.features, d.features);
        assert_eq!(p.thresholds.pinch.start, d.thresholds.pinch.start);
        assert_eq!(p.thresholds.pinch.end, d.thresholds.pinch.end);
        assert_eq!(p.thresholds.fist.zoom_speed, 0.015);
        assert_eq!(p.thresholds.two_hand.gain, 6.0);
        assert_eq!(p.pipeline.sample_ms, 50);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let p = Profile::from_toml_str("[features]\ntwo_hand = true\n").unwrap();
        assert!(p.features.two_hand);
        assert!(p.features.lock_center);
        assert_eq!(p.thresholds.scale.max, 10.0);
        assert_eq!(p.thresholds.three_finger.sensitivity, 1.2);
    }

    #[test]
    fn inverted_hysteresis_band_is_rejected() {
        let err = Profile::from_toml_str("[thresholds.pinch]\nstart = 0.07\nend = 0.06\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("pinch.start"));
    }

    #[test]
    fn out_of_range_rates_are_rejected() {
        assert!(Profile::from_toml_str("[thresholds.lock_center]\ndecay = 0.0\n").is_err());
        assert!(Profile::from_toml_str("[thresholds.pinch]\nema_alpha = 1.5\n").is_err());
        assert!(Profile::from_toml_str("[pipeline]\ntick_ms = 0\n").is_err());
    }

    #[test]
    fn non_finite_thresholds_are_rejected() {
        let err = Profile::from_toml_str("[thresholds.camera]\ninitial_distance = nan\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("camera.initial_distance"), "{err}");
        let err = Profile::from_toml_str("[thresholds.fist]\nzoom_speed = inf\n")
            .unwrap_err()
            .to_string();
        assert!(err.contains("fist.zoom_speed"), "{err}");
    }

    #[test]
    fn open_installs_default_and_pointer() {
        let dir = TempDir::new().expect("temp dir");
        let cfg = ConfigState::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(cfg.active_name, "default");
        assert!(dir.path().join("profiles/default.toml").exists());
        assert_eq!(
            fs::read_to_string(dir.path().join("active")).unwrap(),
            "default"
        );
        assert_eq!(cfg.list_profiles(), vec!["default".to_string()]);
    }

    #[test]
    fn set_active_switches_and_persists() {
        let dir = TempDir::new().expect("temp dir");
        let mut cfg = ConfigState::open(dir.path().to_path_buf()).unwrap();
        fs::write(
            cfg.profile_path("demo"),
            "[meta]\nname = \"demo\"\n[features]\ntwo_hand = true\n",
        )
        .unwrap();

        cfg.set_active("demo").unwrap();
        assert_eq!(cfg.active_name, "demo");
        assert!(cfg.profile.features.two_hand);
        assert_eq!(fs::read_to_string(&cfg.active_ptr).unwrap(), "demo");
        assert_eq!(cfg.list_profiles(), vec!["default", "demo"]);

        assert!(cfg.set_active("missing").is_err());
        assert_eq!(cfg.active_name, "demo");
    }

    #[test]
    fn failed_reload_keeps_last_good_profile() {
        let dir = TempDir::new().expect("temp dir");
        let mut cfg = ConfigState::open(dir.path().to_path_buf()).unwrap();
        fs::write(cfg.profile_path("default"), "[pipeline]\ntick_ms = 0\n").unwrap();
        assert!(cfg.reload().is_err());
        assert_eq!(cfg.profile.pipeline.tick_ms, 16);
    }
}
