//! Control-plane wire protocol: message definitions and length-prefixed
//! MessagePack framing shared by the manager and worker crates.

mod error;
mod framing;
mod message;

pub use error::WireError;
pub use framing::{framed_recv_blocking, framed_send_blocking, MAX_FRAME_SIZE};
pub use message::Message;
pub use rmpv::Value;
