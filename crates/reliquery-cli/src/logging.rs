use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const RUN_LOG: &str = "reliquery.log";
const DEBUG_LOG: &str = "reliquery.debug";

/// File logging for every run, plus an optional stderr mirror.
///
/// Normal runs append errors to `reliquery.log`; `debug` runs start a fresh
/// `reliquery.debug` at debug level. `RUST_LOG` overrides the file level.
pub fn init(log_dir: &Path, debug: bool, verbose: bool) -> anyhow::Result<()> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;

    let (name, level) = if debug { (DEBUG_LOG, "debug") } else { (RUN_LOG, "error") };
    let path = log_dir.join(name);
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(!debug)
        .truncate(debug)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    let file_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .with_filter(file_filter);

    let stderr_layer = verbose.then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(EnvFilter::new("info"))
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(())
}
