use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wire error: {0}")]
    Wire(#[from] vmfuzz_wire::WireError),
    #[error("vm driver error: {0}")]
    Vm(#[from] vmfuzz_vm_driver::VmError),
    #[error("symbolic error: {0}")]
    Symbolic(#[from] vmfuzz_symbolic::SymbolicError),
    #[error("control socket closed unexpectedly")]
    ControlSocketClosed,
}
