use anyhow::{Context, Result};
use log::{error, info, warn};
use std::{
    fs::File,
    io::{self, BufRead, BufReader, Write},
    path::PathBuf,
    sync::mpsc::{Receiver, RecvTimeoutError, Sender},
    thread,
    time::{Duration, Instant},
};

use super::server::Shared;
use crate::engine::{Engine, EngineSnapshot};
use crate::source::{EventReader, FrameError, InputEvent};

#[derive(Debug, Clone)]
pub enum FrameInput {
    Stdin,
    /// A capture file or a named pipe fed by the detector.
    File(PathBuf),
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    /// Stop the daemon once the frame input is exhausted.
    pub exit_on_eof: bool,
    /// Write changed snapshots to stdout as JSON lines.
    pub emit_state: bool,
}

/// Reads events on their own thread so a blocked input never stalls ticks.
/// The channel disconnects when the input ends.
pub fn spawn_reader(input: FrameInput, tx: Sender<InputEvent>) -> Result<()> {
    let reader: Box<dyn BufRead + Send> = match &input {
        FrameInput::Stdin => Box::new(BufReader::new(io::stdin())),
        FrameInput::File(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
    };
    info!("frame input: {input:?}");
    thread::spawn(move || {
        for event in EventReader::new(reader) {
            match event {
                Ok(event) => {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
                Err(FrameError::Io(e)) => {
                    error!("frame input failed: {e}");
                    break;
                }
                Err(e) => warn!("skipping input line: {e}"),
            }
        }
    });
    Ok(())
}

/// Counts frames and lets through every `(skip + 1)`-th one.
#[derive(Debug, Default)]
pub struct FrameGate {
    seen: u64,
}

impl FrameGate {
    pub fn admit(&mut self, skip: u32) -> bool {
        let n = self.seen;
        self.seen += 1;
        n % (u64::from(skip) + 1) == 0
    }
}

pub fn handle_event(engine: &mut Engine, gate: &mut FrameGate, skip: u32, event: InputEvent) {
    match event {
        InputEvent::Frame(frame) => {
            // suppressed frames do not advance the skip counter
            if engine.is_suppressed() || gate.admit(skip) {
                engine.process(&frame);
            }
        }
        InputEvent::Pointer(ev) => engine.pointer(&ev),
    }
}

pub fn run_pipeline(
    shared: &Shared,
    rx: Receiver<InputEvent>,
    opts: PipelineOptions,
) -> Result<()> {
    let mut out = io::stdout().lock();
    let mut last: Option<EngineSnapshot> = None;
    let mut gate = FrameGate::default();
    let mut input_open = true;
    let mut next_tick = Instant::now();

    while !shared.shutdown_requested() {
        let tuning = shared.cfg()?.profile.pipeline.clone();
        let wait = next_tick.saturating_duration_since(Instant::now());

        if input_open {
            match rx.recv_timeout(wait) {
                Ok(event) => {
                    let mut engine = shared.engine()?;
                    handle_event(&mut engine, &mut gate, tuning.frame_skip, event);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("frame input closed");
                    input_open = false;
                    if opts.exit_on_eof {
                        break;
                    }
                }
            }
        } else {
            thread::sleep(wait);
        }

        if Instant::now() >= next_tick {
            next_tick = Instant::now() + Duration::from_millis(tuning.tick_ms);
            tick(shared, &mut out, &mut last, opts)?;
        }
    }

    // flush the final state before leaving
    tick(shared, &mut out, &mut last, opts)?;
    if opts.exit_on_eof {
        shared.request_shutdown();
    }
    Ok(())
}

fn tick(
    shared: &Shared,
    out: &mut impl Write,
    last: &mut Option<EngineSnapshot>,
    opts: PipelineOptions,
) -> Result<()> {
    let snap = {
        let mut engine = shared.engine()?;
        engine.tick(shared.now_ms());
        engine.snapshot()
    };
    if opts.emit_state && last.as_ref() != Some(&snap) {
        serde_json::to_writer(&mut *out, &snap)?;
        writeln!(out)?;
        out.flush()?;
    }
    *last = Some(snap);
    Ok(())
}
