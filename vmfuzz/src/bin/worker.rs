//! Worker process entrypoint, spawned by the orchestrator the way `polkadot`
//! spawns its separate `polkadot-execute-worker`/`polkadot-prepare-worker`
//! binaries. Reads the config the orchestrator persisted to the work
//! directory, then runs either the ordinary fuzz or the symbolic run loop.

use std::path::PathBuf;

use clap::Parser;
use tracing::error;
use vmfuzz_common::Config;
use vmfuzz_vm_driver::{Driver, Mode};
use vmfuzz_worker::{Client, FuzzWorkerLoop, IdentityMutationStage, SymbolicWorkerLoop};

#[derive(Parser)]
struct WorkerArgs {
    #[arg(long)]
    work_dir: PathBuf,
    #[arg(long)]
    pid: usize,
    #[arg(long)]
    role: Role,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Role {
    Fuzz,
    Symbolic,
}

fn main() {
    let args = WorkerArgs::parse();
    let config = match Config::read_from_work_dir(&args.work_dir) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("vmfuzz-worker: failed to read config: {e}");
            std::process::exit(1);
        }
    };
    vmfuzz_common::logging::init_logging(config.log, &config.work_dir);

    let socket_path = config.work_dir.join("kafl_socket");
    let result = match args.role {
        Role::Fuzz => run_fuzz_worker(config, args.pid, &socket_path),
        Role::Symbolic => run_symbolic_worker(config, args.pid, &socket_path),
    };
    if let Err(e) = result {
        error!(target: "vmfuzz::worker", pid = args.pid, "worker exited: {e}");
        std::process::exit(1);
    }
}

fn run_fuzz_worker(
    config: Config,
    pid: usize,
    socket_path: &std::path::Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::connect(socket_path, pid as u64, false)?;
    let driver = Driver::new(config, pid, Mode::Ordinary);
    let mut run_loop = FuzzWorkerLoop::new(client, driver, IdentityMutationStage, pid as u64);
    run_loop.run()?;
    Ok(())
}

fn run_symbolic_worker(
    config: Config,
    pid: usize,
    socket_path: &std::path::Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let syx_workdir = config.work_dir.join(format!("syx_workdir_{pid}"));
    let result_reader = vmfuzz_symbolic::SymbolicResultReader::open(&syx_workdir)?;
    let client = Client::connect(socket_path, pid as u64, true)?;
    let driver = Driver::new(config, pid, Mode::Symbolic);
    let mut run_loop = SymbolicWorkerLoop::new(client, driver, result_reader, pid as u64);
    run_loop.run()?;
    Ok(())
}
