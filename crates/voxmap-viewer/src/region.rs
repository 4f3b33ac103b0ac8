//! The world texture: projected chunks laid out side by side in one RGBA buffer.
//!
//! The region covers chunk coordinates `[offset_x, offset_x + size_x)` by
//! `[offset_z, offset_z + size_z)`. Texture rows run along block x and each row is
//! `CHUNK_SIZE * size_z` texels wide, so a block at region-relative `(bx, bz)` sits at
//! texel `bx * CHUNK_SIZE * size_z + bz`.

use crate::projector::HeightMap;
use voxmap_common::types::{ChunkCoordinate, Result, CHUNK_SIZE, HEIGHT_MAP_SIZE};
use voxmap_common::VoxmapError;

/// Bytes per texel
pub const TEXEL_SIZE: usize = 4;

pub struct WorldRegion {
    offset_x: i32,
    offset_z: i32,
    size_x: usize,
    size_z: usize,
    max_side: usize,
    data: Vec<u8>,
}

/// Write access to a single texel
#[derive(Debug)]
pub struct BlockWriter<'a> {
    texel: &'a mut [u8],
}

impl BlockWriter<'_> {
    pub fn set_color(&mut self, r: u8, g: u8, b: u8, a: u8) {
        self.texel.copy_from_slice(&[r, g, b, a]);
    }
}

impl WorldRegion {
    /// A zeroed region spanning `[-radius, radius)` chunks on both axes.
    pub fn new(radius: u32) -> Self {
        let side = radius as usize * 2;
        Self::with_bounds(ChunkCoordinate::new(-(radius as i32), -(radius as i32)), side, side)
    }

    pub fn with_bounds(offset: ChunkCoordinate, size_x: usize, size_z: usize) -> Self {
        Self {
            offset_x: offset.x,
            offset_z: offset.z,
            size_x,
            size_z,
            max_side: usize::MAX,
            data: vec![0; size_x * size_z * HEIGHT_MAP_SIZE],
        }
    }

    /// Caps how far `grow_to_include` may grow either side, in chunks.
    pub fn with_max_side(mut self, max_side: usize) -> Self {
        self.max_side = max_side;
        self
    }

    /// Lowest chunk coordinate covered
    pub fn offset(&self) -> ChunkCoordinate {
        ChunkCoordinate::new(self.offset_x, self.offset_z)
    }

    /// Size in chunks as `(size_x, size_z)`
    pub fn size(&self) -> (usize, usize) {
        (self.size_x, self.size_z)
    }

    /// Texture size in texels as `(width, height)`: width runs along z.
    pub fn dimensions(&self) -> (usize, usize) {
        (self.size_z * CHUNK_SIZE, self.size_x * CHUNK_SIZE)
    }

    fn row_texels(&self) -> usize {
        self.size_z * CHUNK_SIZE
    }

    /// Chunk position relative to the region, if inside it
    fn relative(&self, coord: ChunkCoordinate) -> Option<(usize, usize)> {
        let rx = coord.x as i64 - self.offset_x as i64;
        let rz = coord.z as i64 - self.offset_z as i64;
        if rx < 0 || rz < 0 || rx >= self.size_x as i64 || rz >= self.size_z as i64 {
            return None;
        }
        Some((rx as usize, rz as usize))
    }

    pub fn contains(&self, coord: ChunkCoordinate) -> bool {
        self.relative(coord).is_some()
    }

    fn texel_index(&self, rel_chunk: (usize, usize), local_x: usize, local_z: usize) -> usize {
        let row = rel_chunk.0 * CHUNK_SIZE + local_x;
        let col = rel_chunk.1 * CHUNK_SIZE + local_z;
        (row * self.row_texels() + col) * TEXEL_SIZE
    }

    /// Copies a 1024-byte projection into the chunk's slot. Nothing is written
    /// when the chunk is outside the region.
    pub fn write_chunk_bytes(&mut self, coord: ChunkCoordinate, bytes: &[u8]) -> Result<()> {
        if bytes.len() != HEIGHT_MAP_SIZE {
            return Err(VoxmapError::ChunkSizeMismatch {
                expected: HEIGHT_MAP_SIZE,
                actual: bytes.len(),
            });
        }
        let rel = self
            .relative(coord)
            .ok_or(VoxmapError::OutOfRegion {
                x: coord.x,
                z: coord.z,
            })?;

        let column_bytes = CHUNK_SIZE * TEXEL_SIZE;
        for x in 0..CHUNK_SIZE {
            let start = self.texel_index(rel, x, 0);
            let src = x * column_bytes;
            self.data[start..start + column_bytes].copy_from_slice(&bytes[src..src + column_bytes]);
        }
        Ok(())
    }

    pub fn write_chunk(&mut self, coord: ChunkCoordinate, height_map: &HeightMap) -> Result<()> {
        self.write_chunk_bytes(coord, &height_map.to_bytes())
    }

    /// Fills a chunk with a shaded placeholder: `rgba` darkened towards the
    /// chunk's low corner, alpha left as is.
    pub fn fill_chunk(&mut self, coord: ChunkCoordinate, rgba: [u8; 4]) -> Result<()> {
        let mut bytes = [0u8; HEIGHT_MAP_SIZE];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let channel = rgba[i % TEXEL_SIZE];
            *byte = if i % TEXEL_SIZE == TEXEL_SIZE - 1 {
                channel
            } else {
                let shade = (((i % 64) + i / 64) as f32 / 64.0).max(0.05);
                (channel as f32 * shade).clamp(0.0, 255.0) as u8
            };
        }
        self.write_chunk_bytes(coord, &bytes)
    }

    /// The texel for a block, addressed in world block coordinates.
    pub fn read_block(&self, block_x: i32, block_z: i32) -> Option<[u8; 4]> {
        let index = self.block_index(block_x, block_z)?;
        let mut texel = [0u8; 4];
        texel.copy_from_slice(&self.data[index..index + TEXEL_SIZE]);
        Some(texel)
    }

    pub fn block_mut(&mut self, block_x: i32, block_z: i32) -> Result<BlockWriter<'_>> {
        let chunk = ChunkCoordinate::from_block(block_x, block_z);
        let index = self.block_index(block_x, block_z).ok_or(VoxmapError::OutOfRegion {
            x: chunk.x,
            z: chunk.z,
        })?;
        Ok(BlockWriter {
            texel: &mut self.data[index..index + TEXEL_SIZE],
        })
    }

    fn block_index(&self, block_x: i32, block_z: i32) -> Option<usize> {
        let chunk = ChunkCoordinate::from_block(block_x, block_z);
        let rel = self.relative(chunk)?;
        let size = CHUNK_SIZE as i32;
        Some(self.texel_index(
            rel,
            block_x.rem_euclid(size) as usize,
            block_z.rem_euclid(size) as usize,
        ))
    }

    pub fn as_texture_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Grows the region until it covers `coord`, keeping everything written so
    /// far. Each axis that doesn't reach far enough doubles, half on each side.
    /// Returns whether the region changed.
    pub fn grow_to_include(&mut self, coord: ChunkCoordinate) -> Result<bool> {
        if self.contains(coord) {
            return Ok(false);
        }

        let (offset_x, size_x) = grown_axis(self.offset_x, self.size_x, coord.x);
        let (offset_z, size_z) = grown_axis(self.offset_z, self.size_z, coord.z);
        if size_x > self.max_side || size_z > self.max_side {
            return Err(VoxmapError::RegionTooLarge { size_x, size_z });
        }

        let mut grown = WorldRegion::with_bounds(ChunkCoordinate::new(offset_x, offset_z), size_x, size_z)
            .with_max_side(self.max_side);

        if !self.data.is_empty() {
            let old_row_bytes = self.row_texels() * TEXEL_SIZE;
            let row_shift = (self.offset_x - offset_x) as usize * CHUNK_SIZE;
            let col_shift = (self.offset_z - offset_z) as usize * CHUNK_SIZE;
            for (row, src) in self.data.chunks_exact(old_row_bytes).enumerate() {
                let start = ((row + row_shift) * grown.row_texels() + col_shift) * TEXEL_SIZE;
                grown.data[start..start + old_row_bytes].copy_from_slice(src);
            }
        }

        *self = grown;
        Ok(true)
    }
}

/// New `(offset, size)` of one axis after doubling until `target` is covered.
fn grown_axis(offset: i32, size: usize, target: i32) -> (i32, usize) {
    if size == 0 {
        return (target, 1);
    }

    let mut offset = offset as i64;
    let mut size = size as i64;
    let target = target as i64;
    while target < offset || target >= offset + size {
        offset -= size / 2 + size % 2;
        size *= 2;
    }
    (offset as i32, size as usize)
}
