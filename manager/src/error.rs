use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("manager io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("wire error: {0}")]
    Wire(#[from] vmfuzz_wire::WireError),
    #[error("all workers exited")]
    AllWorkersExited,
}
