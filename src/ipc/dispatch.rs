use anyhow::{Result, anyhow};
use log::info;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::mpsc::Sender;

use super::runtime::socket_path;
use super::server::{IpcMsg, Shared};
use crate::replay::Recording;

/// Maps one control request onto the shared engine and config.
pub fn handle_request(req: &Value, shared: &Shared, tx: &Sender<IpcMsg>) -> Value {
    let op = req.get("op").and_then(|v| v.as_str()).unwrap_or("");
    let result = match op {
        "status" => status(shared),
        "state" => shared
            .engine()
            .and_then(|e| Ok(serde_json::to_value(e.snapshot())?)),
        "reload" => reload_profile(shared),
        "use" => use_profile(req, shared),
        "list" => shared.cfg().map(|cfg| {
            json!({"profiles": cfg.list_profiles(), "active": cfg.active_name})
        }),
        "doctor" => doctor(shared),
        "set" => set_feature(req, shared),
        "suppress" => bool_arg(req, "on").and_then(|on| {
            shared.engine()?.set_suppressed(on);
            Ok(json!({"suppressed": on}))
        }),
        "center" => shared.engine().map(|mut e| {
            e.center();
            json!({"centered": true})
        }),
        "scale" => scale(req, shared),
        "record" => record(req, shared),
        "replay" => replay(req, shared),
        "shutdown" => {
            let _ = tx.send(IpcMsg::Shutdown);
            Ok(json!("shutting down"))
        }
        _ => Err(anyhow!("unknown op: {op}")),
    };
    match result {
        Ok(data) => json!({"ok": true, "data": data}),
        Err(e) => json!({"ok": false, "error": e.to_string()}),
    }
}

/// Re-reads the active profile and hands it to the engine. The previous
/// profile stays in force when the new one fails to load.
pub fn reload_profile(shared: &Shared) -> Result<Value> {
    let mut cfg = shared.cfg()?;
    cfg.reload()?;
    shared.engine()?.apply_profile(&cfg.profile);
    info!("profile '{}' reloaded", cfg.active_name);
    Ok(json!({"active_profile": cfg.active_name}))
}

fn use_profile(req: &Value, shared: &Shared) -> Result<Value> {
    let name = str_arg(req, "profile")?;
    let mut cfg = shared.cfg()?;
    cfg.set_active(name)?;
    shared.engine()?.apply_profile(&cfg.profile);
    info!("switched active profile to {}", cfg.active_name);
    Ok(json!({"active_profile": cfg.active_name}))
}

fn status(shared: &Shared) -> Result<Value> {
    let active = shared.cfg()?.active_name.clone();
    let snap = shared.engine()?.snapshot();
    Ok(json!({
        "active_profile": active,
        "gesture": snap.gesture,
        "label": snap.label,
        "features": snap.features,
        "suppressed": snap.suppressed,
        "recording": snap.recording,
        "replaying": snap.replaying,
        "socket": socket_path().ok(),
        "pid": std::process::id(),
    }))
}

fn doctor(shared: &Shared) -> Result<Value> {
    let sock = socket_path()?;
    Ok(shared.cfg()?.doctor_report(&sock))
}

fn set_feature(req: &Value, shared: &Shared) -> Result<Value> {
    let feature = str_arg(req, "feature")?;
    let on = bool_arg(req, "on")?;
    let mut engine = shared.engine()?;
    match feature {
        "two-hand" => engine.set_two_hand(on),
        "lock-center" => engine.set_lock_center(on),
        other => return Err(anyhow!("unknown feature: {other}")),
    }
    info!("{feature} {}", if on { "enabled" } else { "disabled" });
    Ok(serde_json::to_value(engine.features())?)
}

fn scale(req: &Value, shared: &Shared) -> Result<Value> {
    let value = req
        .get("value")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| anyhow!("missing numeric 'value'"))? as f32;
    let mut engine = shared.engine()?;
    engine.set_baseline_scale(value);
    Ok(json!({"baseline_scale": engine.accumulator().baseline_scale()}))
}

fn record(req: &Value, shared: &Shared) -> Result<Value> {
    let action = str_arg(req, "action")?;
    let now = shared.now_ms();
    let mut engine = shared.engine()?;
    match action {
        "start" => {
            engine.start_recording(now);
            Ok(json!({"recording": true}))
        }
        "stop" => {
            engine.stop_recording();
            Ok(json!({"recording": false, "samples": engine.recording().samples.len()}))
        }
        "save" => {
            let path = Path::new(str_arg(req, "path")?);
            engine.recording().save(path)?;
            Ok(json!({"path": path, "samples": engine.recording().samples.len()}))
        }
        other => Err(anyhow!("unknown record action: {other}")),
    }
}

fn replay(req: &Value, shared: &Shared) -> Result<Value> {
    let loaded = match req.get("path").and_then(|v| v.as_str()) {
        Some(path) => Some(Recording::load(Path::new(path))?),
        None => None,
    };
    let now = shared.now_ms();
    let mut engine = shared.engine()?;
    let recording = loaded.unwrap_or_else(|| engine.recording().clone());
    let samples = recording.samples.len();
    let duration_ms = recording.duration_ms();
    if !engine.start_replay(recording, now) {
        return Err(anyhow!(
            "nothing to replay (replay already running or recording empty)"
        ));
    }
    Ok(json!({"samples": samples, "duration_ms": duration_ms}))
}

fn str_arg<'a>(req: &'a Value, key: &str) -> Result<&'a str> {
    req.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("missing string '{key}'"))
}

fn bool_arg(req: &Value, key: &str) -> Result<bool> {
    req.get(key)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| anyhow!("missing boolean '{key}'"))
}
