use std::path::Path;

use tracing_subscriber::EnvFilter;

/// Target constant convention: each crate defines its own `LOG_TARGET` and
/// logs through it, the way the teacher's subsystems use `gum`/`LOG_TARGET`.
/// `vmfuzz-common` owns only the shared subscriber bootstrap.
pub const LOG_TARGET: &str = "vmfuzz::common";

/// Initializes the global `tracing` subscriber once for the whole process.
///
/// Honors `RUST_LOG` via `EnvFilter`, and additionally tees output to
/// `<work_dir>/debug.log` when `log` is set, matching the orchestrator's
/// `--log` flag. Safe to call from both the manager and worker processes;
/// each worker gets its own log file handle since they are separate
/// processes, not separate threads sharing one subscriber.
pub fn init_logging(log_to_file: bool, work_dir: &Path) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if log_to_file {
        let path = work_dir.join("debug.log");
        if let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(&path) {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(file)
                .with_ansi(false)
                .try_init();
            return;
        }
    }
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
