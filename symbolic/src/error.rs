use thiserror::Error;

#[derive(Debug, Error)]
pub enum SymbolicError {
    #[error("symbolic result reader io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("symbolic result reader errno: {0}")]
    Errno(#[from] nix::Error),
    #[error("replacement record length {found} does not match the active request length {expected}")]
    LengthMismatch { expected: usize, found: usize },
}
