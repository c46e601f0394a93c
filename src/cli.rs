use anyhow::{Context, Result, anyhow};
use log::warn;
use pico_args::Arguments;
use serde::Serialize;
use std::{
    env,
    fs::File,
    io::{self, BufReader, Write},
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use crate::config::{ConfigState, Profile};
use crate::engine::{Engine, FrameReport};
use crate::ipc::{self, FrameInput, PipelineOptions};
use crate::source::{EventReader, FrameError, InputEvent};

pub fn run() -> Result<()> {
    let mut pargs = Arguments::from_env();

    // Hidden daemon mode (spawned by `start`)
    if pargs.contains("--daemon") {
        let input = frame_input(&mut pargs)?;
        return ipc::run_daemon(
            input,
            PipelineOptions {
                exit_on_eof: false,
                emit_state: false,
            },
        );
    }

    // No args -> general help
    if env::args().len() == 1 {
        print_help();
        return Ok(());
    }

    if pargs.contains("-h") || pargs.contains("--help") {
        print_help();
        return Ok(());
    }

    let subcmd: Option<String> = pargs.free_from_str().ok();

    match subcmd.as_deref() {
        Some("help") => {
            let topic: Option<String> = pargs.free_from_str().ok();
            if let Some(t) = topic {
                print_subcmd_help(&t);
            } else {
                print_help();
            }
            Ok(())
        }

        Some("run") => {
            let input = frame_input(&mut pargs)?;
            ipc::run_daemon(
                input,
                PipelineOptions {
                    exit_on_eof: true,
                    emit_state: true,
                },
            )
        }

        Some("start") => {
            let frames = start_frames(&mut pargs)?;
            let exe = env::current_exe()?;
            let mut cmd = Command::new(exe);
            cmd.arg("--daemon")
                .arg("--frames")
                .arg(frames)
                .stdin(Stdio::null())
                .stdout(Stdio::null());
            let child = cmd.spawn()?;
            println!("handctl: started daemon (pid={})", child.id());
            Ok(())
        }

        Some("stop") => request(serde_json::json!({"op":"shutdown"})),
        Some("status") => request(serde_json::json!({"op":"status"})),
        Some("state") => request(serde_json::json!({"op":"state"})),
        Some("reload") => request(serde_json::json!({"op":"reload"})),
        Some("list") => request(serde_json::json!({"op":"list"})),
        Some("doctor") => request(serde_json::json!({"op":"doctor"})),
        Some("center") => request(serde_json::json!({"op":"center"})),

        Some("use") => {
            let name: String = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl use <profile_name>"))?;
            request(serde_json::json!({"op":"use","profile":name}))
        }

        Some("set") => {
            let usage = || anyhow!("usage: handctl set <two-hand|lock-center> <on|off>");
            let feature: String = pargs.free_from_str().map_err(|_| usage())?;
            let value: String = pargs.free_from_str().map_err(|_| usage())?;
            let on = parse_switch(&value).ok_or_else(usage)?;
            request(serde_json::json!({"op":"set","feature":feature,"on":on}))
        }

        Some("suppress") => {
            let usage = || anyhow!("usage: handctl suppress <on|off>");
            let value: String = pargs.free_from_str().map_err(|_| usage())?;
            let on = parse_switch(&value).ok_or_else(usage)?;
            request(serde_json::json!({"op":"suppress","on":on}))
        }

        Some("scale") => {
            let value: f32 = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl scale <value>"))?;
            request(serde_json::json!({"op":"scale","value":value}))
        }

        Some("record") => {
            let usage = || anyhow!("usage: handctl record <start|stop|save <path>>");
            let action: String = pargs.free_from_str().map_err(|_| usage())?;
            match action.as_str() {
                "start" | "stop" => {
                    request(serde_json::json!({"op":"record","action":action}))
                }
                "save" => {
                    let path: PathBuf = pargs.free_from_str().map_err(|_| usage())?;
                    let path = absolute(&path)?;
                    request(serde_json::json!({"op":"record","action":"save","path":path}))
                }
                _ => Err(usage()),
            }
        }

        Some("replay") => {
            let path: Option<PathBuf> = pargs.opt_free_from_str()?;
            let req = match path {
                Some(p) => serde_json::json!({"op":"replay","path":absolute(&p)?}),
                None => serde_json::json!({"op":"replay"}),
            };
            request(req)
        }

        Some("classify") => {
            let path: PathBuf = pargs
                .free_from_str()
                .map_err(|_| anyhow!("usage: handctl classify <frames.jsonl>"))?;
            classify_file(&path)
        }

        Some(other) => {
            eprintln!("unknown subcommand: {other}\n");
            print_help();
            Ok(())
        }

        None => {
            print_help();
            Ok(())
        }
    }
}

fn frame_input(pargs: &mut Arguments) -> Result<FrameInput> {
    let frames: Option<PathBuf> = pargs.opt_value_from_str("--frames")?;
    Ok(frames.map_or(FrameInput::Stdin, FrameInput::File))
}

/// A detached daemon has no stdin to read, so `start` needs a frame source.
fn start_frames(pargs: &mut Arguments) -> Result<PathBuf> {
    let frames: Option<PathBuf> = pargs.opt_value_from_str("--frames")?;
    let path = frames.ok_or_else(|| {
        anyhow!("usage: handctl start --frames <path> (use `handctl run` to read stdin)")
    })?;
    absolute(&path)
}

/// The daemon runs with its own working directory; paths go over the
/// socket in absolute form.
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(env::current_dir()?.join(path))
    }
}

fn parse_switch(value: &str) -> Option<bool> {
    match value {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

fn request(req: serde_json::Value) -> Result<()> {
    let r = ipc::client_request(req)?;
    print_response(&r);
    Ok(())
}

#[derive(Serialize)]
struct ClassifiedFrame<'a> {
    #[serde(flatten)]
    report: &'a FrameReport,
    label: &'static str,
}

/// Runs a captured frame file through a fresh engine and prints one JSON
/// line per frame. No daemon involved.
fn classify_file(path: &Path) -> Result<()> {
    let profile = match ConfigState::load_or_install_default() {
        Ok(cfg) => cfg.profile,
        Err(e) => {
            warn!("using built-in profile: {e}");
            Profile::default()
        }
    };
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut engine = Engine::new(&profile);
    let mut out = io::stdout().lock();

    for event in EventReader::new(BufReader::new(file)) {
        match event {
            Ok(InputEvent::Frame(frame)) => {
                let report = engine.process(&frame);
                engine.tick(frame.timestamp_ms);
                let line = ClassifiedFrame {
                    report: &report,
                    label: engine.label(),
                };
                serde_json::to_writer(&mut out, &line)?;
                writeln!(out)?;
            }
            Ok(InputEvent::Pointer(ev)) => engine.pointer(&ev),
            Err(FrameError::Io(e)) => return Err(e.into()),
            Err(e) => warn!("skipping input line: {e}"),
        }
    }
    Ok(())
}

fn print_help() {
    println!(
        r#"handctl: hand gesture interpretation engine

USAGE:
  handctl help [command]                  Show general or command-specific help
  handctl run [--frames <path>]           Run in the foreground; snapshots on stdout
  handctl start --frames <path>           Start the background daemon
  handctl stop                            Stop the daemon
  handctl status                          Show daemon state
  handctl state                           Print the current engine snapshot
  handctl reload                          Reload active profile
  handctl use <name>                      Switch active profile
  handctl list                            List profiles
  handctl doctor                          Diagnose configuration and socket
  handctl set <two-hand|lock-center> <on|off>
                                          Toggle a runtime feature
  handctl suppress <on|off>               Pause or resume live gesture input
  handctl center                          Reset position and rotation
  handctl scale <value>                   Set the baseline scale
  handctl record <start|stop|save <path>> Record the transform
  handctl replay [path]                   Replay the last or a saved recording
  handctl classify <path>                 Label every frame of a capture file

TIPS:
  - Frames are JSON lines: {{"type":"frame","hands":[[{{"x":..,"y":..}}, ...21]]}}
  - --frames also accepts a named pipe fed by the detector
  - Profiles: ~/.config/handctl/profiles
  - Active profile pointer: ~/.config/handctl/active
"#
    );
}

fn print_subcmd_help(cmd: &str) {
    match cmd {
        "run" => println!(
            "usage: handctl run [--frames <path>]\nReads frames from stdin or <path>, serves the control socket and writes one JSON snapshot per changed tick. Exits when the input ends."
        ),
        "start" => println!(
            "usage: handctl start --frames <path>\nStarts the background daemon reading frames from <path>."
        ),
        "stop" => println!("usage: handctl stop\nStops the running daemon."),
        "status" => println!(
            "usage: handctl status\nShows active profile, gesture, feature flags, socket and PID."
        ),
        "state" => println!("usage: handctl state\nPrints the latest engine snapshot."),
        "reload" => println!(
            "usage: handctl reload\nReloads the current profile; keeps last good on error."
        ),
        "use" => {
            println!("usage: handctl use <name>\nSwitches active profile to <name> and reloads.")
        }
        "list" => println!("usage: handctl list\nLists available profiles."),
        "doctor" => println!(
            "usage: handctl doctor\nShows config paths, profiles and socket presence."
        ),
        "set" => println!(
            "usage: handctl set <two-hand|lock-center> <on|off>\nToggles a feature until the next reload."
        ),
        "suppress" => println!(
            "usage: handctl suppress <on|off>\nPauses live gesture processing without resetting state."
        ),
        "center" => println!("usage: handctl center\nZeroes position and rotation."),
        "scale" => println!(
            "usage: handctl scale <value>\nSets the baseline scale, clamped to the profile limits."
        ),
        "record" => println!(
            "usage:\n  handctl record start\n  handctl record stop\n  handctl record save <path>"
        ),
        "replay" => println!(
            "usage: handctl replay [path]\nReplays the last recording or a saved one; live input is paused meanwhile."
        ),
        "classify" => println!(
            "usage: handctl classify <frames.jsonl>\nPrints gesture, label and transitions for every frame, offline."
        ),
        _ => {
            eprintln!("unknown command: {cmd}\n");
            print_help();
        }
    }
}

fn print_response(v: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(v).unwrap_or_default());
}
