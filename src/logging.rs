use env_logger::{Builder, Env};

/// Logs go to stderr; stdout carries the state stream.
/// `HANDCTL_LOG` takes precedence over `RUST_LOG`; the default level is info.
pub fn init() {
    let env = if std::env::var_os("HANDCTL_LOG").is_some() {
        Env::new().filter("HANDCTL_LOG")
    } else {
        Env::default().default_filter_or("info")
    };
    let _ = Builder::from_env(env)
        .format_timestamp_millis()
        .target(env_logger::Target::Stderr)
        .try_init();
}
