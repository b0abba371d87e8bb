//! Worker-side control-plane client and the two run loops (ordinary fuzz,
//! symbolic) that drive a [`vmfuzz_vm_driver::Driver`] from received tasks.

mod client;
mod error;
mod mutation;
mod run_loop;

pub use client::Client;
pub use error::WorkerError;
pub use mutation::{IdentityMutationStage, MutationStage};
pub use run_loop::{FuzzWorkerLoop, SymbolicWorkerLoop, LOG_TARGET};
