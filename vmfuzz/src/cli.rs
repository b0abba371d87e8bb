//! Command-line surface. Grounded on `polkadot-cli`'s `clap`-derived
//! argument structs: a top-level `Cli` wrapping a subcommand enum, with each
//! subcommand's fields building directly into the immutable `Config` the
//! rest of the workspace consumes.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use vmfuzz_common::Config;

#[derive(Debug, Parser)]
#[command(name = "vmfuzz", version, about = "Coverage-guided VM fuzzer orchestrator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the fuzzer: spawn the manager and the fuzz/symbolic worker pool.
    Fuzz(FuzzArgs),
    /// Execute a single payload against a fresh VM with the hard timeout disabled.
    Debug,
    /// Render coverage reports from a completed run. Not implemented by this core.
    Cov,
    /// Launch the interactive monitor. Not implemented by this core.
    Gui,
    /// Plot coverage-over-time from a completed run. Not implemented by this core.
    Plot,
    /// Pretty-print a MessagePack control-plane trace. Not implemented by this core.
    Mcat,
}

#[derive(Debug, Args)]
pub struct FuzzArgs {
    /// Working directory for all shared-memory files, sockets, and logs.
    #[arg(long)]
    pub work_dir: PathBuf,
    /// Remove and recreate the working directory before starting.
    #[arg(long)]
    pub purge: bool,
    /// Number of ordinary fuzz worker processes.
    #[arg(short = 'p', long, default_value_t = 1)]
    pub processes: usize,
    /// Number of symbolic-executor worker processes.
    #[arg(long, default_value_t = 0)]
    pub syx_processes: usize,
    /// Directory of seed files copied into the working directory at startup.
    #[arg(long)]
    pub seed_dir: Option<PathBuf>,

    #[arg(long)]
    pub qemu_path: PathBuf,
    #[arg(long)]
    pub qemu_image: Option<PathBuf>,
    #[arg(long)]
    pub qemu_kernel: Option<PathBuf>,
    #[arg(long)]
    pub qemu_initrd: Option<PathBuf>,
    #[arg(long)]
    pub qemu_bios: Option<PathBuf>,
    #[arg(long)]
    pub qemu_append: Option<String>,
    #[arg(long, default_value_t = 512)]
    pub memory: u32,
    /// Reload interval: 1 resets guest state every execution; >1 toggles
    /// reload mode with that period.
    #[arg(short = 'R', long, default_value_t = 1)]
    pub reload: u32,

    #[arg(long, value_parser = parse_ip_range)]
    pub ip0: Option<(u64, u64)>,
    #[arg(long, value_parser = parse_ip_range)]
    pub ip1: Option<(u64, u64)>,
    #[arg(long, value_parser = parse_ip_range)]
    pub ip2: Option<(u64, u64)>,
    #[arg(long, value_parser = parse_ip_range)]
    pub ip3: Option<(u64, u64)>,

    /// Hard per-execution timeout, in seconds.
    #[arg(long, default_value_t = 2.0)]
    pub t_hard: f64,
    #[arg(long, default_value_t = 0.25)]
    pub t_soft: f64,
    #[arg(long)]
    pub t_check: bool,
    #[arg(long, default_value_t = Config::DEFAULT_PAYLOAD_SIZE)]
    pub payload_size: usize,
    #[arg(long, default_value_t = Config::DEFAULT_BITMAP_SIZE)]
    pub bitmap_size: usize,
    #[arg(long)]
    pub trace: bool,

    #[arg(long)]
    pub log: bool,
    #[arg(long)]
    pub log_hprintf: bool,
    #[arg(long)]
    pub log_crashes: bool,
    #[arg(short, long)]
    pub verbose: bool,
    #[arg(short, long)]
    pub quiet: bool,

    #[arg(long)]
    pub abort_time: Option<f64>,
    #[arg(long)]
    pub abort_exec: Option<u64>,
}

/// Parses an `"a-b"` address range. Rejects `a > b`, a range exceeding the
/// 128KB bound, and the degenerate full-range `"0-131072"`; a single value
/// `"v"` is accepted as `[v, v]`.
const IP_RANGE_MAX: u64 = 128 << 10;

fn parse_ip_range(s: &str) -> Result<(u64, u64), String> {
    let parse_hex_or_dec = |s: &str| -> Result<u64, String> {
        if let Some(hex) = s.strip_prefix("0x") {
            u64::from_str_radix(hex, 16).map_err(|e| e.to_string())
        } else {
            s.parse::<u64>().map_err(|e| e.to_string())
        }
    };
    let (a, b) = match s.split_once('-') {
        Some((a, b)) => (parse_hex_or_dec(a)?, parse_hex_or_dec(b)?),
        None => {
            let v = parse_hex_or_dec(s)?;
            (v, v)
        }
    };
    if a > b {
        return Err(format!("range start {a:#x} is greater than end {b:#x}"));
    }
    if b > IP_RANGE_MAX {
        return Err(format!("range end {b:#x} exceeds the {IP_RANGE_MAX:#x} (128KB) bound"));
    }
    if a == 0 && b == IP_RANGE_MAX {
        return Err("the full address space is not a valid filter range".to_string());
    }
    Ok((a, b))
}

impl FuzzArgs {
    pub fn into_config(self) -> Config {
        Config {
            work_dir: self.work_dir,
            purge: self.purge,
            processes: self.processes,
            syx_processes: self.syx_processes,
            seed_dir: self.seed_dir,
            qemu_path: self.qemu_path,
            qemu_image: self.qemu_image,
            qemu_kernel: self.qemu_kernel,
            qemu_initrd: self.qemu_initrd,
            qemu_bios: self.qemu_bios,
            qemu_append: self.qemu_append,
            memory_mb: self.memory,
            reload: self.reload,
            ip_filters: [self.ip0, self.ip1, self.ip2, self.ip3],
            t_hard: self.t_hard,
            t_soft: self.t_soft,
            t_check: self.t_check,
            payload_size: self.payload_size,
            bitmap_size: self.bitmap_size,
            trace: self.trace,
            log: self.log,
            log_hprintf: self.log_hprintf,
            log_crashes: self.log_crashes,
            verbose: self.verbose,
            quiet: self.quiet,
            abort_time: self.abort_time,
            abort_exec: self.abort_exec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_range() {
        assert!(parse_ip_range("100-50").is_err());
    }

    #[test]
    fn rejects_full_address_space() {
        assert!(parse_ip_range("0-131072").is_err());
    }

    #[test]
    fn single_value_becomes_point_range() {
        assert_eq!(parse_ip_range("42").unwrap(), (42, 42));
    }
}
