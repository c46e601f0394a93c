//! Control socket, daemon lifecycle and the frame pipeline.
//!
//! Requests and responses are single JSON lines:
//! `{"op": "...", ...}` in, `{"ok": true, "data": ...}` or
//! `{"ok": false, "error": "..."}` out.

mod dispatch;
mod pipeline;
mod runtime;
mod server;

use anyhow::{Context, Result, anyhow};
use std::{
    io::{BufRead, BufReader, Write},
    os::unix::net::UnixStream,
};

pub use pipeline::{FrameInput, PipelineOptions};
pub use runtime::socket_path;
pub use server::run_daemon;

pub fn client_request(req: serde_json::Value) -> Result<serde_json::Value> {
    let sock = socket_path()?;
    if !sock.exists() {
        return Err(anyhow!(
            "handctl daemon is not running (socket missing at {})",
            sock.display()
        ));
    }
    let mut stream = UnixStream::connect(&sock)
        .with_context(|| format!("connecting to {}", sock.display()))?;
    let line = serde_json::to_string(&req)? + "\n";
    stream.write_all(line.as_bytes())?;
    let mut reader = BufReader::new(stream);
    let mut resp = String::new();
    reader.read_line(&mut resp)?;
    let v: serde_json::Value = serde_json::from_str(&resp)?;
    Ok(v)
}
