use anyhow::{Context, Result, anyhow};
use log::{error, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use std::{
    io::{BufRead, BufReader, ErrorKind, Write},
    os::unix::net::{UnixListener, UnixStream},
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Sender},
    },
    thread,
    time::{Duration, Instant},
};

use super::dispatch;
use super::pipeline::{self, FrameInput, PipelineOptions};
use super::runtime::socket_path;
use crate::config::ConfigState;
use crate::engine::Engine;

/// State shared by the accept loop, client handlers and the pipeline.
/// Lock order is `cfg` before `engine`.
pub struct Shared {
    cfg: Mutex<ConfigState>,
    engine: Mutex<Engine>,
    clock: Instant,
    shutdown: Arc<AtomicBool>,
}

impl Shared {
    pub fn new(cfg: ConfigState) -> Self {
        let engine = Engine::new(&cfg.profile);
        Self {
            cfg: Mutex::new(cfg),
            engine: Mutex::new(engine),
            clock: Instant::now(),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cfg(&self) -> Result<MutexGuard<'_, ConfigState>> {
        self.cfg.lock().map_err(|_| anyhow!("config lock poisoned"))
    }

    pub fn engine(&self) -> Result<MutexGuard<'_, Engine>> {
        self.engine.lock().map_err(|_| anyhow!("engine lock poisoned"))
    }

    /// Milliseconds on the daemon's monotonic clock; drives ticks,
    /// recording and replay.
    pub fn now_ms(&self) -> u64 {
        self.clock.elapsed().as_millis() as u64
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

pub enum IpcMsg {
    /// Files under the profiles directory changed on disk.
    ProfilesChanged(Vec<PathBuf>),
    Shutdown,
}

/// Unlinks the bound socket file when dropped.
struct SocketFile {
    path: PathBuf,
}

impl Drop for SocketFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn bind_socket(sock: &Path) -> Result<(UnixListener, SocketFile)> {
    let listener =
        UnixListener::bind(sock).with_context(|| format!("binding {}", sock.display()))?;
    let guard = SocketFile {
        path: sock.to_path_buf(),
    };
    info!("daemon: listening on {}", sock.display());
    Ok((listener, guard))
}

pub fn run_daemon(input: FrameInput, opts: PipelineOptions) -> Result<()> {
    let sock = socket_path()?;
    if sock.exists() {
        if UnixStream::connect(&sock).is_ok() {
            return Err(anyhow!(
                "handctl daemon already running (socket at {})",
                sock.display()
            ));
        }
        let _ = std::fs::remove_file(&sock);
    }

    // state
    let cfg = ConfigState::load_or_install_default()?;
    info!("daemon: active profile '{}'", cfg.active_name);
    let profiles_dir = cfg.profiles_dir.clone();
    let shared = Arc::new(Shared::new(cfg));
    install_signal_handler(shared.shutdown.clone())?;

    // channels
    let (tx_req, rx_req) = mpsc::channel::<IpcMsg>();
    let _watcher = watch_profiles(&profiles_dir, tx_req.clone())?;

    // pipeline thread
    let (tx_evt, rx_evt) = mpsc::channel();
    pipeline::spawn_reader(input, tx_evt)?;

    // socket, bound once everything above succeeded
    let (listener, _sock_file) = bind_socket(&sock)?;

    let pipeline_thread = {
        let shared = shared.clone();
        thread::spawn(move || {
            if let Err(e) = pipeline::run_pipeline(&shared, rx_evt, opts) {
                error!("frame pipeline failed: {e}");
                shared.request_shutdown();
            }
        })
    };

    // accept loop
    listener.set_nonblocking(true)?;
    while !shared.shutdown_requested() {
        match listener.accept() {
            Ok((stream, _)) => {
                let shared = shared.clone();
                let tx = tx_req.clone();
                thread::spawn(move || {
                    if let Err(e) = handle_client(stream, &shared, &tx) {
                        error!("ipc client error: {e}");
                    }
                });
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => warn!("accept failed: {e}"),
        }

        while let Ok(msg) = rx_req.try_recv() {
            match msg {
                IpcMsg::ProfilesChanged(paths) => {
                    if let Err(e) = reload_if_active(&shared, &paths) {
                        error!("reload failed: {e}");
                    }
                }
                IpcMsg::Shutdown => shared.request_shutdown(),
            }
        }

        thread::sleep(Duration::from_millis(5));
    }

    info!("daemon: shutting down");
    let _ = pipeline_thread.join();
    Ok(())
}

fn handle_client(mut stream: UnixStream, shared: &Shared, tx: &Sender<IpcMsg>) -> Result<()> {
    stream.set_nonblocking(false)?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim().is_empty() {
        return Ok(());
    }
    let resp = match serde_json::from_str::<serde_json::Value>(&line) {
        Ok(req) => dispatch::handle_request(&req, shared, tx),
        Err(e) => serde_json::json!({"ok": false, "error": format!("bad request: {e}")}),
    };
    writeln!(stream, "{resp}")?;
    Ok(())
}

fn reload_if_active(shared: &Shared, paths: &[PathBuf]) -> Result<()> {
    let active = shared.cfg()?.active_name.clone();
    let touched = paths
        .iter()
        .any(|p| p.file_stem().and_then(|s| s.to_str()) == Some(active.as_str()));
    if touched {
        info!("profile '{active}' changed on disk");
        dispatch::reload_profile(shared)?;
    }
    Ok(())
}

fn is_profile_change(event: &Event) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|p| p.extension().is_some_and(|ext| ext == "toml"))
}

fn watch_profiles(dir: &Path, tx: Sender<IpcMsg>) -> Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if is_profile_change(&event) => {
            let _ = tx.send(IpcMsg::ProfilesChanged(event.paths));
        }
        Ok(_) => {}
        Err(e) => warn!("profile watcher error: {e}"),
    })?;
    watcher
        .watch(dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("watching {}", dir.display()))?;
    info!("daemon: watching {}", dir.display());
    Ok(watcher)
}

fn install_signal_handler(flag: Arc<AtomicBool>) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("daemon: received signal {sig}");
            flag.store(true, Ordering::SeqCst);
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use tempfile::TempDir;

    #[test]
    fn only_toml_writes_count_as_profile_changes() {
        let toml = Event::new(EventKind::Modify(ModifyKind::Any)).add_path("p/fast.toml".into());
        assert!(is_profile_change(&toml));
        let created = Event::new(EventKind::Create(CreateKind::File)).add_path("p/a.toml".into());
        assert!(is_profile_change(&created));
        let swap = Event::new(EventKind::Modify(ModifyKind::Any)).add_path("p/.fast.toml.swp".into());
        assert!(!is_profile_change(&swap));
        let read = Event::new(EventKind::Access(AccessKind::Any)).add_path("p/fast.toml".into());
        assert!(!is_profile_change(&read));
    }

    #[test]
    fn socket_file_is_removed_on_drop() {
        let dir = TempDir::new().expect("temp dir");
        let sock = dir.path().join("handctl.sock");
        {
            let (_listener, _guard) = bind_socket(&sock).unwrap();
            assert!(sock.exists());
        }
        assert!(!sock.exists());
    }

    #[test]
    fn only_the_active_profile_triggers_reload() {
        let dir = TempDir::new().expect("temp dir");
        let cfg = ConfigState::open(dir.path().to_path_buf()).unwrap();
        let path = cfg.profile_path("default");
        let shared = Shared::new(cfg);

        let txt = std::fs::read_to_string(&path)
            .unwrap()
            .replace("lock_center = true", "lock_center = false");
        std::fs::write(&path, txt).unwrap();

        reload_if_active(&shared, &[dir.path().join("profiles/other.toml")]).unwrap();
        assert!(shared.engine().unwrap().features().lock_center);

        reload_if_active(&shared, &[path]).unwrap();
        assert!(!shared.engine().unwrap().features().lock_center);
    }
}
