//! RCON packet framing.
//!
//! Every packet is `length | request id | type | body | 0x00 0x00`, with the
//! three integers little-endian `i32` and `length` counting everything after
//! itself.
//!
//! A frame longer than the decoder accepts is not a framing error: its body
//! is dropped as it streams in and the frame decodes as
//! [`RconFrame::Oversized`], so the connection stays usable.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::common::error::RconError;

/// Request id + type + the two NUL terminators.
const HEADER_AND_PADDING: usize = 10;

/// Largest response body kept. Servers cap a packet at 4096 characters,
/// which is up to four bytes each in UTF-8.
pub const MAX_INCOMING_BODY: usize = 4 * 4096;

/// Largest command body a Minecraft server accepts.
pub const MAX_OUTGOING_BODY: usize = 1446;

/// Packet type values. `AUTH_RESPONSE` and `EXEC_COMMAND` share a value;
/// direction tells them apart.
pub mod packet_type {
    #[cfg(test)]
    pub const RESPONSE_VALUE: i32 = 0;
    pub const EXEC_COMMAND: i32 = 2;
    pub const AUTH_RESPONSE: i32 = 2;
    pub const AUTH: i32 = 3;
}

/// Request id the server answers with when the password is wrong.
pub const AUTH_FAILED_ID: i32 = -1;

/// One RCON packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconPacket {
    pub request_id: i32,
    pub packet_type: i32,
    pub body: String,
}

impl RconPacket {
    pub fn new(request_id: i32, packet_type: i32, body: impl Into<String>) -> Self {
        Self {
            request_id,
            packet_type,
            body: body.into(),
        }
    }
}

/// What the decoder yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RconFrame {
    Packet(RconPacket),
    /// A frame whose body exceeded [`MAX_INCOMING_BODY`] and was discarded.
    Oversized { request_id: i32, len: usize },
}

/// Codec for RCON packets over a byte stream.
#[derive(Debug, Default)]
pub struct RconCodec {
    /// Bytes of an oversized frame still to be dropped.
    discarding: usize,
}

impl RconCodec {
    /// Drop as much of an oversized frame as is buffered.
    fn discard(&mut self, src: &mut BytesMut) {
        let n = self.discarding.min(src.len());
        src.advance(n);
        self.discarding -= n;
    }
}

impl Decoder for RconCodec {
    type Item = RconFrame;
    type Error = RconError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.discard(src);
        if self.discarding > 0 || src.len() < 4 {
            return Ok(None);
        }

        let length = i32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        if length < HEADER_AND_PADDING as i32 {
            return Err(RconError::InvalidPacket {
                message: format!("bad packet length {}", length),
            });
        }
        let length = length as usize;

        if length > HEADER_AND_PADDING + MAX_INCOMING_BODY {
            if src.len() < 12 {
                return Ok(None);
            }
            src.advance(4);
            let request_id = src.get_i32_le();
            src.advance(4);
            self.discarding = length - 8;
            self.discard(src);
            return Ok(Some(RconFrame::Oversized {
                request_id,
                len: length - HEADER_AND_PADDING,
            }));
        }

        if src.len() < 4 + length {
            src.reserve(4 + length - src.len());
            return Ok(None);
        }

        src.advance(4);
        let mut frame = src.split_to(length);

        let request_id = frame.get_i32_le();
        let packet_type = frame.get_i32_le();
        let body_len = length - HEADER_AND_PADDING;
        let body = String::from_utf8_lossy(&frame[..body_len]).into_owned();

        if frame[body_len..] != [0, 0] {
            return Err(RconError::InvalidPacket {
                message: "missing body terminator".to_string(),
            });
        }

        Ok(Some(RconFrame::Packet(RconPacket {
            request_id,
            packet_type,
            body,
        })))
    }
}

impl Encoder<RconPacket> for RconCodec {
    type Error = RconError;

    fn encode(&mut self, item: RconPacket, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = item.body.as_bytes();
        if body.len() > MAX_OUTGOING_BODY {
            return Err(RconError::BodyTooLong { len: body.len() });
        }

        let length = body.len() + HEADER_AND_PADDING;
        dst.reserve(4 + length);
        dst.put_i32_le(length as i32);
        dst.put_i32_le(item.request_id);
        dst.put_i32_le(item.packet_type);
        dst.put_slice(body);
        dst.put_u8(0);
        dst.put_u8(0);

        Ok(())
    }
}
