use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Child;
use std::time::{Duration, Instant};

use memmap2::{Mmap, MmapMut};
use tracing::{debug, info, warn};
use vmfuzz_aux_buffer::{AuxBuffer, VmState};
use vmfuzz_common::{Config, ExecCode, ExecutionResult, Outcome, SymbolicRequest};

use crate::error::VmError;
use crate::launch::{build_qemu_cmd, interface_socket_path, startup_delay};

pub const LOG_TARGET: &str = "vmfuzz::vm_driver";

/// Whether this driver instance runs an ordinary fuzz VM or a symbolic
/// (concolic) VM. Replaces what the original expresses as a subclass split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Ordinary,
    Symbolic,
}

/// Sentinel returned by `send_payload`/`resume_payload` when a symbolic VM
/// pauses mid-execution. `SymWait` means the VM wants a new symbolic request
/// fed to it; `SymFlush` means the VM has written a result batch and the
/// caller must drain it via its `SymbolicResultReader` before resuming —
/// the driver does not own that reader, so it cannot service the flush
/// itself.
pub enum SendOutcome {
    Result(ExecutionResult),
    SymWait,
    SymFlush,
}

pub struct Driver {
    config: Config,
    pid: usize,
    mode: Mode,
    child: Option<Child>,
    control: Option<UnixStream>,
    aux: Option<AuxBuffer>,
    bitmap: Option<Mmap>,
    payload: Option<MmapMut>,
    persistent_runs: u32,
    bb_seen: u32,
    last_page_fault_addr: Option<u64>,
    exiting: bool,
    exec_start: Option<Instant>,
    accumulated_symbolic_requests: Vec<SymbolicRequest>,
}

impl Driver {
    pub fn new(config: Config, pid: usize, mode: Mode) -> Self {
        Self {
            config,
            pid,
            mode,
            child: None,
            control: None,
            aux: None,
            bitmap: None,
            payload: None,
            persistent_runs: 0,
            bb_seen: 0,
            last_page_fault_addr: None,
            exiting: false,
            exec_start: None,
            accumulated_symbolic_requests: Vec::new(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    fn resource_path(&self, name: &str) -> PathBuf {
        self.config.work_dir.join(format!("{name}_{}", self.pid))
    }

    /// Prepares shm files, launches the VM, completes the handshake, and
    /// configures the hard timeout. Returns `false` on connection failure or
    /// if `shutdown` has already been requested.
    pub fn start(&mut self) -> Result<bool, VmError> {
        if self.exiting {
            return Ok(false);
        }

        let aux = AuxBuffer::open(&self.resource_path("aux_buffer"))?;
        self.aux = Some(aux);

        let bitmap_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(self.resource_path("bitmap"))?;
        bitmap_file.set_len(self.config.bitmap_size as u64)?;
        self.bitmap = Some(unsafe { Mmap::map(&bitmap_file)? });

        let payload_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(self.resource_path("payload"))?;
        payload_file.set_len(self.config.payload_size as u64)?;
        self.payload = Some(unsafe { MmapMut::map_mut(&payload_file)? });

        // A zero-length ijon shm is required by the layout but not consulted here.
        let ijon_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(self.resource_path("ijon"))?;
        ijon_file.set_len(Config::IJON_SIZE as u64)?;

        let delay = startup_delay(self.pid);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut cmd = build_qemu_cmd(&self.config, self.pid);
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setpgid(nix::unistd::Pid::from_raw(0), nix::unistd::Pid::from_raw(0))
                    .map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
                Ok(())
            });
        }
        info!(target: LOG_TARGET, pid = self.pid, "launching vm");
        let child = cmd.spawn()?;
        self.child = Some(child);

        match self.connect_with_retry() {
            Ok(stream) => self.control = Some(stream),
            Err(e) => {
                self.shutdown();
                return Err(e);
            }
        }

        self.handshake()?;

        let aux = self.aux.as_mut().expect("aux buffer initialized above");
        aux.set_timeout(self.config.t_hard);
        aux.set_trace_mode(self.config.trace);
        aux.set_syx_mode(self.mode == Mode::Symbolic);

        self.persistent_runs = 0;
        self.bb_seen = 0;
        self.last_page_fault_addr = None;

        Ok(true)
    }

    fn connect_with_retry(&mut self) -> Result<UnixStream, VmError> {
        let path = interface_socket_path(&self.config.work_dir, self.pid);
        let deadline = Instant::now() + Duration::from_secs(6);
        loop {
            if let Some(child) = self.child.as_mut() {
                if let Ok(Some(_status)) = child.try_wait() {
                    return Err(VmError::ProcessExitedDuringConnect);
                }
            }
            match UnixStream::connect(&path) {
                Ok(stream) => return Ok(stream),
                Err(_) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(_) => return Err(VmError::ConnectTimeout),
            }
        }
    }

    /// Hands control to the VM for one round and waits for it to yield.
    fn run_qemu(&mut self) -> Result<(), VmError> {
        let control = self.control.as_mut().expect("started");
        control.write_all(&[b'x'])?;
        let mut ack = [0u8; 1];
        control.read_exact(&mut ack)?;
        Ok(())
    }

    fn handshake(&mut self) -> Result<(), VmError> {
        loop {
            self.run_qemu()?;
            let result = self.aux.as_ref().expect("aux buffer initialized above").get_result()?;
            match result.exec_code {
                ExecCode::Abort => {
                    return Err(VmError::GuestAbort("abort during handshake".into()));
                }
                ExecCode::Hprintf => {
                    self.service_hprintf();
                    continue;
                }
                _ => {}
            }
            if self.aux.as_ref().expect("aux buffer initialized above").get_state()? == VmState::Fuzzing {
                break;
            }
        }
        Ok(())
    }

    fn service_hprintf(&mut self) {
        let misc = self.aux.as_ref().expect("aux buffer initialized above").get_misc_buf().to_vec();
        if self.config.log_hprintf || self.config.log_crashes {
            if let Ok(mut f) =
                OpenOptions::new().create(true).append(true).open(self.resource_path("hprintf").with_extension("log"))
            {
                let _ = f.write_all(&misc);
            }
        } else {
            debug!(target: LOG_TARGET, pid = self.pid, "hprintf: {}", String::from_utf8_lossy(&misc));
        }
    }

    /// Truncates the accumulated hprintf log; called whenever reload resets
    /// guest state (`persistent_runs == 0`).
    pub fn flush_crashlogs(&self) {
        let _ = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.resource_path("hprintf").with_extension("log"));
    }

    /// Copies the accumulated hprintf log into `<work_dir>/logs/<label>_<stamp>.log`
    /// for a finding worth keeping, then truncates the source.
    pub fn store_crashlogs(&self, label: &str, stamp: &str) -> std::io::Result<()> {
        let src = self.resource_path("hprintf").with_extension("log");
        if !src.exists() {
            return Ok(());
        }
        let logs_dir = self.config.work_dir.join("logs");
        std::fs::create_dir_all(&logs_dir)?;
        let label_short: String = label.chars().take(5).collect();
        let stamp_short: String = stamp.chars().take(6).collect();
        let dest = logs_dir.join(format!("{label_short}_{stamp_short}.log"));
        std::fs::copy(&src, &dest)?;
        self.flush_crashlogs();
        Ok(())
    }

    /// Writes the `(agent_flags, length)` header then the body into the
    /// payload shm. Fails if the payload exceeds `payload_limit`.
    pub fn set_payload(&mut self, data: &[u8]) -> Result<(), VmError> {
        let limit = self.config.payload_limit();
        if data.len() > limit {
            return Err(VmError::PayloadTooLarge { len: data.len(), limit });
        }
        let payload = self.payload.as_mut().expect("started");
        payload[0..4].copy_from_slice(&0u32.to_le_bytes());
        payload[4..8].copy_from_slice(&(data.len() as u32).to_le_bytes());
        payload[8..8 + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn toggle_reload_mode(&mut self) -> Result<(), VmError> {
        let target = self.config.reload;
        if target <= 1 {
            self.aux.as_mut().expect("started").set_reload_mode(true);
            if self.config.log_crashes && self.persistent_runs == 0 {
                self.flush_crashlogs();
            }
            return Ok(());
        }

        self.persistent_runs += 1;
        let aux = self.aux.as_mut().expect("started");
        if self.persistent_runs == 1 {
            aux.set_reload_mode(false);
        } else if self.persistent_runs >= target {
            aux.set_reload_mode(true);
            self.persistent_runs = 0;
        }
        if self.config.log_crashes && self.persistent_runs == 0 {
            self.flush_crashlogs();
        }
        Ok(())
    }

    /// Drives one execution round. See component design §4.2 for the full
    /// per-exec-code handling. In symbolic mode, returns early on
    /// `SymWait`/`SymFlush`; call [`Driver::resume_payload`] to continue
    /// after servicing either (the caller owns the `SymbolicResultReader`
    /// a flush must drain, so the driver cannot service it itself).
    pub fn send_payload(&mut self) -> Result<SendOutcome, VmError> {
        self.toggle_reload_mode()?;
        self.exec_start = Some(Instant::now());
        self.accumulated_symbolic_requests.clear();
        self.run_until_pause()
    }

    /// Resumes a run paused by `SymWait` (after feeding the VM a new
    /// request) or by `SymFlush` (after draining the result FIFO).
    pub fn resume_payload(&mut self) -> Result<SendOutcome, VmError> {
        self.run_until_pause()
    }

    fn run_until_pause(&mut self) -> Result<SendOutcome, VmError> {
        loop {
            self.run_qemu()?;
            let result = self.aux.as_ref().expect("started").get_result()?;

            match result.exec_code {
                ExecCode::Hprintf => {
                    self.service_hprintf();
                    continue;
                }
                ExecCode::Abort => {
                    return Err(VmError::GuestAbort("abort during execution".into()));
                }
                ExecCode::SyxSymWait if self.mode == Mode::Symbolic => {
                    return Ok(SendOutcome::SymWait);
                }
                ExecCode::SyxSymFlush if self.mode == Mode::Symbolic => {
                    return Ok(SendOutcome::SymFlush);
                }
                ExecCode::SyxSymNew if self.mode == Mode::Ordinary => {
                    let payload = self.payload.as_ref().expect("started");
                    let offset = result.syx_fuzzer_input_offset as usize;
                    let len = result.syx_len as usize;
                    let snapshot = &payload[8 + offset..8 + offset + len];
                    self.accumulated_symbolic_requests.push(SymbolicRequest::new(
                        result.syx_fuzzer_input_offset,
                        result.syx_len,
                        snapshot,
                    ));
                    continue;
                }
                ExecCode::SyxSymNew | ExecCode::SyxSymWait | ExecCode::SyxSymFlush => {
                    return Err(VmError::ProtocolViolation(result.exec_code));
                }
                _ => {}
            }

            if result.page_fault {
                if self.last_page_fault_addr == Some(result.page_fault_addr) {
                    return Err(VmError::RepeatPageFault { addr: result.page_fault_addr });
                }
                self.last_page_fault_addr = Some(result.page_fault_addr);
                self.aux.as_mut().expect("started").dump_page(result.page_fault_addr);
                continue;
            }
            self.last_page_fault_addr = None;

            if result.exec_done {
                self.bb_seen = self.bb_seen.max(result.bb_cov);
                let outcome = result.exec_code.classify();
                let bitmap = self.bitmap.as_ref().expect("started").to_vec();
                let start = self.exec_start.take().unwrap_or_else(Instant::now);
                return Ok(SendOutcome::Result(ExecutionResult {
                    bitmap,
                    bitmap_size: self.config.bitmap_size,
                    outcome,
                    runtime: start.elapsed(),
                    symbolic_requests: std::mem::take(&mut self.accumulated_symbolic_requests),
                    bb_seen: self.bb_seen,
                    starved: matches!(result.exec_code, ExecCode::Starved),
                }));
            }
        }
    }

    /// Same as `send_payload` but with the hard timeout disabled, for
    /// interactive inspection.
    pub fn debug_payload(&mut self) -> Result<SendOutcome, VmError> {
        self.aux.as_mut().expect("started").set_timeout(0.0);
        let outcome = self.send_payload();
        self.aux.as_mut().expect("started").set_timeout(self.config.t_hard);
        outcome
    }

    /// Terminates the VM (SIGTERM, then SIGKILL if needed) and unlinks shm
    /// files. Idempotent.
    pub fn shutdown(&mut self) {
        self.exiting = true;
        if let Some(mut child) = self.child.take() {
            let pid = nix::unistd::Pid::from_raw(child.id() as i32);
            let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM);
            match child.try_wait() {
                Ok(Some(_)) => {}
                _ => {
                    std::thread::sleep(Duration::from_millis(200));
                    if child.try_wait().ok().flatten().is_none() {
                        let _ = child.kill();
                    }
                }
            }
            let _ = child.wait();
        }
        self.control = None;
        for name in ["aux_buffer", "bitmap", "ijon", "payload", "interface"] {
            let _ = std::fs::remove_file(self.resource_path(name));
        }
        warn!(target: LOG_TARGET, pid = self.pid, "vm driver shut down");
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        if !self.exiting {
            self.shutdown();
        }
    }
}
