use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;
use voxmap_common::types::{ChunkCoordinate, ChunkRaw, Result, SessionId, CHUNK_DATA_SIZE};
use voxmap_common::VoxmapError;

pub const PACKET_HELLO: u8 = 0x10;
pub const PACKET_MESSAGE: u8 = 0x11;
pub const PACKET_EXCEPTION: u8 = 0x12;
pub const PACKET_CHUNK_DATA: u8 = 0x13;

/// Every frame on the wire is one of these: a discriminant byte followed by the
/// variant payload. Integers are big-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Sent once to a newly connected client
    Hello { client_id: u8 },
    /// Chat/log line, may carry `&`-style markup
    Message { text: String },
    /// Same shape as `Message`, shown as an error
    Exception { text: String },
    /// A full chunk snapshot
    ChunkData {
        coord: ChunkCoordinate,
        blocks: ChunkRaw,
    },
}

impl Packet {
    /// Hello for a session. The wire id is 8 bits wide, so it carries the low byte.
    pub fn hello(session_id: SessionId) -> Self {
        Packet::Hello {
            client_id: (session_id & 0xFF) as u8,
        }
    }

    pub fn message(text: impl Into<String>) -> Self {
        Packet::Message { text: text.into() }
    }

    pub fn exception(text: impl Into<String>) -> Self {
        Packet::Exception { text: text.into() }
    }

    pub fn chunk_data(coord: ChunkCoordinate, blocks: ChunkRaw) -> Self {
        Packet::ChunkData { coord, blocks }
    }

    pub fn packet_type(&self) -> u8 {
        match self {
            Packet::Hello { .. } => PACKET_HELLO,
            Packet::Message { .. } => PACKET_MESSAGE,
            Packet::Exception { .. } => PACKET_EXCEPTION,
            Packet::ChunkData { .. } => PACKET_CHUNK_DATA,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Packet::Hello { .. } => "Hello",
            Packet::Message { .. } => "Message",
            Packet::Exception { .. } => "Exception",
            Packet::ChunkData { .. } => "ChunkData",
        }
    }

    fn encoded_len(&self) -> usize {
        1 + match self {
            Packet::Hello { .. } => 1,
            Packet::Message { text } | Packet::Exception { text } => text.len(),
            Packet::ChunkData { .. } => 8 + CHUNK_DATA_SIZE,
        }
    }

    /// Encodes the packet into a single immutable frame.
    pub fn encode(&self) -> Bytes {
        let mut buffer = PacketWriter::with_capacity(self.encoded_len());
        buffer.write_u8(self.packet_type());

        match self {
            Packet::Hello { client_id } => buffer.write_u8(*client_id),
            Packet::Message { text } | Packet::Exception { text } => {
                buffer.write_bytes(text.as_bytes())
            }
            Packet::ChunkData { coord, blocks } => {
                buffer.write_i32(coord.x);
                buffer.write_i32(coord.z);
                buffer.write_bytes(blocks.as_bytes());
            }
        }

        buffer.into_bytes()
    }

    /// Decodes one frame. Chunk payloads are sliced out of `frame` without copying.
    pub fn decode(frame: Bytes) -> Result<Packet> {
        let mut buffer = PacketReader::new(frame);
        let packet_type = buffer
            .read_u8()
            .map_err(|_| VoxmapError::MalformedPacket("empty frame".to_owned()))?;

        match packet_type {
            PACKET_HELLO => {
                let client_id = buffer.read_u8()?;
                buffer.expect_end()?;
                Ok(Packet::Hello { client_id })
            }
            PACKET_MESSAGE => Ok(Packet::Message {
                text: buffer.read_remaining_string()?,
            }),
            PACKET_EXCEPTION => Ok(Packet::Exception {
                text: buffer.read_remaining_string()?,
            }),
            PACKET_CHUNK_DATA => {
                let x = buffer.read_i32()?;
                let z = buffer.read_i32()?;
                let blocks = ChunkRaw::new(buffer.read_remaining())?;
                Ok(Packet::ChunkData {
                    coord: ChunkCoordinate::new(x, z),
                    blocks,
                })
            }
            other => Err(VoxmapError::UnknownPacketType(other)),
        }
    }
}

/// Append-only packet buffer used for encoding.
#[derive(Debug, Default)]
pub struct PacketWriter {
    buffer: Vec<u8>,
}

impl PacketWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Writes an i32 in network (big-endian) order.
    pub fn write_i32(&mut self, value: i32) {
        let mut raw = [0u8; 4];
        BigEndian::write_i32(&mut raw, value);
        self.buffer.extend_from_slice(&raw);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn into_bytes(self) -> Bytes {
        Bytes::from(self.buffer)
    }
}

/// Packet buffer with a read cursor. The cursor is used to keep track of the current
/// position in the frame; reads past the end fail instead of panicking.
#[derive(Debug)]
pub struct PacketReader {
    frame: Bytes,
    cursor: usize,
}

impl PacketReader {
    pub fn new(frame: Bytes) -> Self {
        Self { frame, cursor: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.frame.len() - self.cursor
    }

    fn take(&mut self, count: usize, what: &str) -> Result<&[u8]> {
        if self.remaining() < count {
            return Err(VoxmapError::MalformedPacket(format!(
                "not enough bytes to read {}: need {}, have {}",
                what,
                count,
                self.remaining()
            )));
        }
        let start = self.cursor;
        self.cursor += count;
        Ok(&self.frame[start..self.cursor])
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1, "u8")?[0])
    }

    /// Reads an i32 in network (big-endian) order.
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(BigEndian::read_i32(self.take(4, "i32")?))
    }

    /// Everything after the cursor, sharing the frame's allocation.
    pub fn read_remaining(&mut self) -> Bytes {
        let rest = self.frame.slice(self.cursor..);
        self.cursor = self.frame.len();
        rest
    }

    pub fn read_remaining_string(&mut self) -> Result<String> {
        let rest = self.read_remaining();
        String::from_utf8(rest.to_vec())
            .map_err(|_| VoxmapError::MalformedPacket("text is not valid UTF-8".to_owned()))
    }

    pub fn expect_end(&self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(VoxmapError::MalformedPacket(format!(
                "{} unexpected trailing bytes",
                self.remaining()
            )));
        }
        Ok(())
    }
}
