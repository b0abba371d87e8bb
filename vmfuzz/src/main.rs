mod cli;
mod orchestrator;

use clap::Parser;
use cli::{Cli, Command};

fn main() {
    let cli = Cli::parse();
    let exit_code = match cli.command {
        Command::Fuzz(args) => {
            let config = args.into_config();
            match orchestrator::start(config) {
                Ok(()) => 0,
                Err(e) => {
                    eprintln!("vmfuzz: {e}");
                    -1
                }
            }
        }
        Command::Debug | Command::Cov | Command::Gui | Command::Plot | Command::Mcat => {
            eprintln!("vmfuzz: this subcommand is not implemented by this core");
            1
        }
    };
    std::process::exit(exit_code);
}
