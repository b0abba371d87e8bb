//! Manager-side control-plane server: accepts worker connections, multiplexes
//! their requests over a readiness primitive, and shuttles symbolic requests
//! between ordinary and symbolic workers through a [`SymbolicQueue`].

mod error;
mod server;
mod task_source;

pub use error::ManagerError;
pub use server::{Inbound, Server};
pub use task_source::{NullTaskSource, TaskSource};
pub use vmfuzz_symbolic::SymbolicQueue;
