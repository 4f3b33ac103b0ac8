use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::VoxmapError;

pub type Result<T> = std::result::Result<T, VoxmapError>;

/// Identifier of a connected client. Never reused within a process.
pub type SessionId = u64;

/// Chunk width and depth in blocks
pub const CHUNK_SIZE: usize = 16;
/// Chunk height in blocks
pub const CHUNK_HEIGHT: usize = 256;
/// Raw chunk size: one packed RGB triple per voxel
pub const CHUNK_DATA_SIZE: usize = 3 * CHUNK_SIZE * CHUNK_SIZE * CHUNK_HEIGHT;
/// Projected chunk size: four bytes per column
pub const HEIGHT_MAP_SIZE: usize = CHUNK_SIZE * CHUNK_SIZE * 4;

/// Position of a chunk in chunk-grid units (not blocks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkCoordinate {
    pub x: i32,
    pub z: i32,
}

impl ChunkCoordinate {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing the given block, rounding toward negative infinity.
    pub fn from_block(block_x: i32, block_z: i32) -> Self {
        let size = CHUNK_SIZE as i32;
        Self {
            x: block_x.div_euclid(size),
            z: block_z.div_euclid(size),
        }
    }
}

impl fmt::Display for ChunkCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.x, self.z)
    }
}

/// A full 3-D chunk snapshot: `CHUNK_SIZE * CHUNK_SIZE` columns of `CHUNK_HEIGHT` RGB
/// voxels, column-major by (x, z) with y varying fastest. `(0, 0, 0)` is air.
///
/// The length is checked on construction, so a `ChunkRaw` always holds exactly
/// `CHUNK_DATA_SIZE` bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct ChunkRaw(Bytes);

impl ChunkRaw {
    pub fn new(data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        if data.len() != CHUNK_DATA_SIZE {
            return Err(VoxmapError::ChunkSizeMismatch {
                expected: CHUNK_DATA_SIZE,
                actual: data.len(),
            });
        }
        Ok(Self(data))
    }

    /// An all-air chunk
    pub fn empty() -> Self {
        Self(Bytes::from(vec![0u8; CHUNK_DATA_SIZE]))
    }

    /// Byte offset of voxel (x, y, z)
    pub fn index(x: usize, y: usize, z: usize) -> usize {
        (CHUNK_HEIGHT * (CHUNK_SIZE * x + z) + y) * 3
    }

    /// Voxel color packed as `0xRRGGBB`
    pub fn color_at(&self, x: usize, y: usize, z: usize) -> u32 {
        let i = Self::index(x, y, z);
        ((self.0[i] as u32) << 16) | ((self.0[i + 1] as u32) << 8) | self.0[i + 2] as u32
    }

    /// Voxel color as separate channels
    pub fn rgb_at(&self, x: usize, y: usize, z: usize) -> [u8; 3] {
        let i = Self::index(x, y, z);
        [self.0[i], self.0[i + 1], self.0[i + 2]]
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl fmt::Debug for ChunkRaw {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkRaw({} bytes)", self.0.len())
    }
}

/// Builds raw chunks voxel by voxel. Mostly useful for uploaders and tests.
pub struct ChunkRawBuilder {
    data: Vec<u8>,
}

impl ChunkRawBuilder {
    pub fn new() -> Self {
        Self {
            data: vec![0u8; CHUNK_DATA_SIZE],
        }
    }

    pub fn set(&mut self, x: usize, y: usize, z: usize, color: u32) -> &mut Self {
        let i = ChunkRaw::index(x, y, z);
        self.data[i] = (color >> 16) as u8;
        self.data[i + 1] = (color >> 8) as u8;
        self.data[i + 2] = color as u8;
        self
    }

    /// Fills `y_from..=y_to` of one column with a color
    pub fn set_range(&mut self, x: usize, z: usize, y_from: usize, y_to: usize, color: u32) -> &mut Self {
        for y in y_from..=y_to {
            self.set(x, y, z, color);
        }
        self
    }

    pub fn build(self) -> ChunkRaw {
        ChunkRaw(Bytes::from(self.data))
    }
}

impl Default for ChunkRawBuilder {
    fn default() -> Self {
        Self::new()
    }
}
