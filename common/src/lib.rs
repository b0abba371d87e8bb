//! Shared types threaded across the vmfuzz workspace: the immutable `Config`
//! record, execution-result/outcome types, and the logging bootstrap.

pub mod config;
pub mod logging;
pub mod result;

pub use config::Config;
pub use result::{ExecCode, ExecutionResult, Outcome, SymbolicRequest, WorkerId};
