//! Length-prefixed framing on top of MessagePack.
//!
//! Mirrors the teacher's `framed_send_blocking`/`framed_recv_blocking`
//! helpers: a 4-byte little-endian length prefix precedes the payload so a
//! reader can allocate the exact buffer up front, rather than relying on
//! MessagePack's own self-describing encoding to find frame boundaries.

use std::io::{Read, Write};

use crate::error::WireError;
use crate::message::Message;

/// Frames larger than this are rejected outright; guards against a
/// corrupted or malicious length prefix driving an unbounded allocation.
pub const MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

pub fn framed_send_blocking<W: Write>(stream: &mut W, msg: &Message) -> Result<(), WireError> {
    let mut body = Vec::new();
    rmpv::encode::write_value(&mut body, &msg.encode())
        .map_err(|e| WireError::Decode(e.to_string()))?;
    let len = body.len() as u32;
    stream.write_all(&len.to_le_bytes())?;
    stream.write_all(&body)?;
    Ok(())
}

pub fn framed_recv_blocking<R: Read>(stream: &mut R) -> Result<Message, WireError> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body)?;
    let value = rmpv::decode::read_value(&mut &body[..])
        .map_err(|e| WireError::Decode(e.to_string()))?;
    Message::decode(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_through_a_byte_buffer() {
        let mut buf = Vec::new();
        framed_send_blocking(&mut buf, &Message::Busy).unwrap();
        let mut cursor = Cursor::new(buf);
        let decoded = framed_recv_blocking(&mut cursor).unwrap();
        assert!(matches!(decoded, Message::Busy));
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_SIZE + 1).to_le_bytes());
        let mut cursor = Cursor::new(buf);
        assert!(framed_recv_blocking(&mut cursor).is_err());
    }
}
