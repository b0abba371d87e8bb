//! Symbolic-execution request lifecycle: the request value object lives in
//! [`vmfuzz_common::SymbolicRequest`] (shared with the VM driver, which
//! constructs them); this crate owns their queueing and result decoding.

mod error;
mod queue;
mod result_reader;
mod wire;

pub use error::SymbolicError;
pub use queue::SymbolicQueue;
pub use result_reader::{SymbolicResultReader, SymbolicResultRecord};
pub use vmfuzz_common::SymbolicRequest;
pub use wire::{pack, unpack};
