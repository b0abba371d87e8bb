use thiserror::Error;

#[derive(Debug, Error)]
pub enum VmError {
    #[error("vm io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("aux buffer error: {0}")]
    AuxBuffer(#[from] vmfuzz_aux_buffer::AuxBufferError),
    #[error("vm process exited before control socket connect completed")]
    ProcessExitedDuringConnect,
    #[error("timed out waiting to connect to vm control socket")]
    ConnectTimeout,
    #[error("guest reported ABORT: {0}")]
    GuestAbort(String),
    #[error("repeat page fault at {addr:#x}, abandoning run")]
    RepeatPageFault { addr: u64 },
    #[error("payload of {len} bytes exceeds payload limit of {limit} bytes")]
    PayloadTooLarge { len: usize, limit: usize },
    #[error("unexpected exec code in this driver mode: {0:?}")]
    ProtocolViolation(vmfuzz_common::ExecCode),
}
