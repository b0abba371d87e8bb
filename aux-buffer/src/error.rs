use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuxBufferError {
    #[error("aux buffer io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("aux buffer header magic mismatch: expected {expected:#x}, found {found:#x}")]
    BadMagic { expected: u32, found: u32 },
    #[error("aux buffer version mismatch: expected {expected}, found {found}")]
    BadVersion { expected: u32, found: u32 },
    #[error("aux buffer state {0} is not a recognized value")]
    BadState(u32),
    #[error("aux buffer exec code {0} is not a recognized value")]
    BadExecCode(u32),
}
