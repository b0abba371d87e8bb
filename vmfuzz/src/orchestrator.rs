//! Orchestrator: spawns the manager in-process and N fuzz + M symbolic
//! workers as separate OS processes, then drives the manager loop until
//! shutdown.
//!
//! Grounded on `manager/core.py`'s `start()`: self-check, working-directory
//! prepare/purge, logging init, seed copy, CPU oversubscription check, then
//! fork-and-loop — re-expressed with worker *processes* spawned via `exec`
//! of the separate `vmfuzz-worker` binary rather than `multiprocessing.Process`
//! forks, matching the teacher's own `polkadot`/`polkadot-execute-worker`
//! split: a process that has already opened mmaps and sockets should not be
//! forked.

use std::path::PathBuf;
use std::process::{Child, Command};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};
use vmfuzz_common::Config;
use vmfuzz_manager::{ManagerError, NullTaskSource, Server, TaskSource};

pub const LOG_TARGET: &str = "vmfuzz::orchestrator";

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("self-check failed: {0}")]
    SelfCheck(String),
    #[error("requested {processes} worker processes but only {available} cpus are available")]
    CpuOversubscribed { processes: usize, available: usize },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("manager error: {0}")]
    Manager(#[from] ManagerError),
}

/// Runs self-checks standing in for the original's broader hypervisor/KVM
/// capability probe (itself out of scope): the configured qemu binary must
/// exist and be executable, and the work dir's parent must be writable.
fn self_check(config: &Config) -> Result<(), OrchestratorError> {
    if !config.qemu_path.exists() {
        return Err(OrchestratorError::SelfCheck(format!(
            "qemu binary not found at {}",
            config.qemu_path.display()
        )));
    }
    let parent = config.work_dir.parent().unwrap_or(&config.work_dir);
    let meta = std::fs::metadata(parent)?;
    if meta.permissions().readonly() {
        return Err(OrchestratorError::SelfCheck(format!(
            "work dir parent {} is not writable",
            parent.display()
        )));
    }
    Ok(())
}

fn prepare_working_dir(config: &Config) -> std::io::Result<()> {
    if config.purge && config.work_dir.exists() {
        std::fs::remove_dir_all(&config.work_dir)?;
    }
    std::fs::create_dir_all(&config.work_dir)?;
    std::fs::create_dir_all(config.work_dir.join("snapshot"))?;
    std::fs::create_dir_all(config.work_dir.join("logs"))?;
    Ok(())
}

fn copy_seeds(config: &Config) -> std::io::Result<()> {
    match &config.seed_dir {
        None => {
            warn!(target: LOG_TARGET, "no seed directory configured; starting from an empty corpus");
            Ok(())
        }
        Some(seed_dir) => {
            if !seed_dir.exists() {
                warn!(target: LOG_TARGET, dir = %seed_dir.display(), "seed directory does not exist");
                return Ok(());
            }
            let dest = config.work_dir.join("seeds");
            std::fs::create_dir_all(&dest)?;
            for entry in std::fs::read_dir(seed_dir)? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    std::fs::copy(entry.path(), dest.join(entry.file_name()))?;
                }
            }
            Ok(())
        }
    }
}

fn available_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

fn worker_binary_path() -> PathBuf {
    let mut path = std::env::current_exe().expect("current executable path");
    path.set_file_name("vmfuzz-worker");
    path
}

fn spawn_worker(config: &Config, pid: usize, symbolic: bool) -> std::io::Result<Child> {
    let role = if symbolic { "symbolic" } else { "fuzz" };
    Command::new(worker_binary_path())
        .arg("--work-dir")
        .arg(&config.work_dir)
        .arg("--pid")
        .arg(pid.to_string())
        .arg("--role")
        .arg(role)
        .spawn()
}

/// Kills any VM process under `qemu_path` whose parent process is gone,
/// matching the original's `util.qemu_sweep` orphan reaper.
fn qemu_sweep(config: &Config) {
    let Ok(entries) = std::fs::read_dir("/proc") else { return };
    let qemu_name = config
        .qemu_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    for entry in entries.flatten() {
        let Ok(pid) = entry.file_name().to_string_lossy().parse::<i32>() else { continue };
        let comm_path = entry.path().join("comm");
        let Ok(comm) = std::fs::read_to_string(&comm_path) else { continue };
        if comm.trim() != qemu_name {
            continue;
        }
        let stat_path = entry.path().join("stat");
        let Ok(stat) = std::fs::read_to_string(&stat_path) else { continue };
        // /proc/<pid>/stat's comm field is parenthesized and may itself
        // contain spaces, so locate the matching ")" before splitting the
        // remaining whitespace-separated fields (state, ppid, ...).
        if let Some(close_paren) = stat.rfind(')') {
            let rest = &stat[close_paren + 2..];
            if let Some(ppid_str) = rest.split_whitespace().nth(1) {
                if let Ok(ppid) = ppid_str.parse::<i32>() {
                    if ppid == 1 {
                        warn!(target: LOG_TARGET, pid, "sweeping orphaned vm process");
                        let _ = nix::sys::signal::kill(
                            nix::unistd::Pid::from_raw(pid),
                            nix::sys::signal::Signal::SIGKILL,
                        );
                    }
                }
            }
        }
    }
}

fn terminate_gracefully(children: &mut [Child]) {
    for child in children.iter_mut() {
        let _ = nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(child.id() as i32),
            nix::sys::signal::Signal::SIGTERM,
        );
    }
    let deadline = Instant::now() + Duration::from_secs(1);
    for child in children.iter_mut() {
        loop {
            match child.try_wait() {
                Ok(Some(_)) => break,
                _ if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    break;
                }
                _ => std::thread::sleep(Duration::from_millis(50)),
            }
        }
    }
}

pub fn start(config: Config) -> Result<(), OrchestratorError> {
    self_check(&config)?;
    prepare_working_dir(&config)?;
    vmfuzz_common::logging::init_logging(config.log, &config.work_dir);

    copy_seeds(&config)?;
    if config.ip_filters.iter().all(Option::is_none) {
        warn!(target: LOG_TARGET, "no ip0 filter configured; coverage feedback will be blind");
    }

    let available = available_cpus();
    if config.processes + config.syx_processes > available {
        return Err(OrchestratorError::CpuOversubscribed {
            processes: config.processes + config.syx_processes,
            available,
        });
    }

    config.write_to_work_dir()?;
    let socket_path = config.work_dir.join("kafl_socket");
    let mut server = Server::bind(&socket_path)?;
    let mut task_source: Box<dyn TaskSource> = Box::new(NullTaskSource);

    let mut children = Vec::with_capacity(config.processes + config.syx_processes);
    for pid in 0..config.processes {
        children.push(spawn_worker(&config, pid, false)?);
    }
    for i in 0..config.syx_processes {
        children.push(spawn_worker(&config, config.processes + i, true)?);
    }
    info!(target: LOG_TARGET, fuzz = config.processes, symbolic = config.syx_processes, "workers spawned");

    let run_result = run_manager_loop(&mut server, task_source.as_mut());

    match &run_result {
        Ok(()) => info!(target: LOG_TARGET, "manager loop exited normally"),
        Err(e) => error!(target: LOG_TARGET, "manager loop exited: {e}"),
    }

    terminate_gracefully(&mut children);
    qemu_sweep(&config);

    match run_result {
        Ok(()) | Err(OrchestratorError::Manager(ManagerError::AllWorkersExited)) => Ok(()),
        Err(e) => Err(e),
    }
}

fn run_manager_loop(server: &mut Server, task_source: &mut dyn TaskSource) -> Result<(), OrchestratorError> {
    loop {
        let inbound = match server.wait(Duration::from_millis(200)) {
            Ok(inbound) => inbound,
            Err(ManagerError::AllWorkersExited) => return Err(ManagerError::AllWorkersExited.into()),
            Err(e) => return Err(e.into()),
        };
        for msg in inbound {
            use vmfuzz_wire::Message;
            match msg.message {
                Message::Ready { .. } => {
                    if let Some(task) = task_source.next_task() {
                        let _ = server.send_import(msg.token, task);
                    } else {
                        let _ = server.send_busy(msg.token);
                    }
                }
                Message::SymWait => {
                    if let Some(task) = task_source.next_symbolic_task() {
                        let _ = server.send_sym_request(msg.token, task);
                    } else if !server.symbolic_queue.is_empty() {
                        if let Some(req) = server.symbolic_queue.take() {
                            let packed = vmfuzz_symbolic::pack(&req);
                            let _ = server.send_sym_request(msg.token, packed);
                        }
                    } else {
                        let _ = server.send_busy(msg.token);
                    }
                }
                Message::SymNew { requests } => {
                    for req_value in requests {
                        if let Some(req) = vmfuzz_symbolic::unpack(&req_value) {
                            server.symbolic_queue.offer(req);
                        }
                    }
                }
                Message::NewInput { payload, bitmap, info } => {
                    task_source.record_new_input(payload, bitmap, info);
                }
                Message::NodeDone { .. } | Message::NodeAbort { .. } | Message::SymResult { .. } => {
                    // Corpus/queue bookkeeping for these is owned by the
                    // TaskSource seam; nothing further for the core loop.
                }
                Message::Print { msg } => info!(target: LOG_TARGET, "worker: {msg}"),
                _ => {}
            }
        }
    }
}
