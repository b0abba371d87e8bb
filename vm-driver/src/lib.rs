//! Launches and drives one VM subprocess per worker, turning input payloads
//! into [`vmfuzz_common::ExecutionResult`]s.
//!
//! Grounded on the original `worker/qemu.py`: command-line assembly, the
//! single-byte handshake protocol, reload-mode toggling, and page-fault
//! repeat detection all follow it closely, re-expressed as a mode enum
//! (`Ordinary` / `Symbolic`) instead of a subclass split.

mod driver;
mod error;
mod launch;

pub use driver::{Driver, Mode, SendOutcome, LOG_TARGET};
pub use error::VmError;
