use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use voxmap_common::types::Result;
use voxmap_common::VoxmapError;

/// A VarInt never needs more than 5 bytes for a 32-bit value
const MAX_VARINT_LEN: usize = 5;

/// Splits a byte stream into frames. Each frame is prefixed with its length as a
/// VarInt: 7 bits per byte, least significant group first, with the most significant
/// bit of each byte set to 1 unless it is the final byte.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_length: usize,
}

impl FrameCodec {
    pub fn new(max_frame_length: usize) -> Self {
        Self { max_frame_length }
    }
}

/// Appends `value` as a VarInt.
pub fn write_varint(dst: &mut BytesMut, mut value: u32) {
    while value & !0x7F != 0 {
        dst.put_u8(((value & 0x7F) as u8) | 0x80);
        value >>= 7;
    }
    dst.put_u8(value as u8);
}

/// Reads a VarInt from the start of `src` without consuming it. Returns the value and
/// the number of bytes it occupies, or `None` if more bytes are needed.
pub fn peek_varint(src: &[u8]) -> Result<Option<(u32, usize)>> {
    let mut result: u32 = 0;

    for (i, byte) in src.iter().take(MAX_VARINT_LEN).enumerate() {
        result |= ((byte & 0x7F) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(Some((result, i + 1)));
        }
    }

    if src.len() >= MAX_VARINT_LEN {
        return Err(VoxmapError::MalformedPacket("VarInt too big".to_owned()));
    }
    Ok(None)
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = VoxmapError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        let Some((length, header_len)) = peek_varint(src)? else {
            return Ok(None);
        };
        let length = length as usize;

        if length > self.max_frame_length {
            return Err(VoxmapError::FrameTooLarge {
                length,
                max: self.max_frame_length,
            });
        }

        let total = header_len + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(header_len);
        Ok(Some(src.split_to(length).freeze()))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = VoxmapError;

    fn encode(&mut self, frame: Bytes, dst: &mut BytesMut) -> Result<()> {
        if frame.len() > self.max_frame_length {
            return Err(VoxmapError::FrameTooLarge {
                length: frame.len(),
                max: self.max_frame_length,
            });
        }

        dst.reserve(MAX_VARINT_LEN + frame.len());
        write_varint(dst, frame.len() as u32);
        dst.extend_from_slice(&frame);
        Ok(())
    }
}
