use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("wire io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("msgpack decode error: {0}")]
    Decode(String),
    #[error("frame is missing required key {0:?}")]
    MissingKey(&'static str),
    #[error("unknown message type tag {0}")]
    UnknownType(i64),
    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(u32),
}
