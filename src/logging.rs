#![forbid(unsafe_code)]

use std::fs::OpenOptions;
use std::io;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

pub const ENV_LOG: &str = "MDBOARD_LOG";
pub const ENV_LOG_FILE: &str = "MDBOARD_LOG_FILE";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(ENV_LOG)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Logs to stderr so stdout stays machine-readable.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(io::stderr)
        .try_init();
}

/// For the full-screen UI: logs go to `MDBOARD_LOG_FILE` or nowhere.
pub fn init_tui() {
    let file = std::env::var_os(ENV_LOG_FILE).and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });
    let _ = match file {
        Some(file) => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .try_init(),
        None => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(io::sink)
            .try_init(),
    };
}
