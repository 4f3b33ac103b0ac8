//! Top-down projection of a raw chunk into one height/color sample per column.

use voxmap_common::types::{ChunkRaw, CHUNK_HEIGHT, CHUNK_SIZE, HEIGHT_MAP_SIZE};

pub const COLOR_AIR: u32 = 0x000000;
pub const COLOR_WATER: u32 = 0x294d96;
pub const COLOR_KELP_STEM: u32 = 0x253e13;
pub const COLOR_KELP_PLANT: u32 = 0x36531b;
pub const COLOR_SEAGRASS: u32 = 0x56764e;
pub const COLOR_TALL_SEAGRASS: u32 = 0x678461;
pub const COLOR_SEA_PICKLE: u32 = 0x81886b;

const PLANT_COLORS: [u32; 5] = [
    COLOR_KELP_STEM,
    COLOR_KELP_PLANT,
    COLOR_SEAGRASS,
    COLOR_TALL_SEAGRASS,
    COLOR_SEA_PICKLE,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjectionOptions {
    /// Scan below water for the floor instead of stopping at the surface
    pub see_through_water: bool,
}

impl Default for ProjectionOptions {
    fn default() -> Self {
        Self {
            see_through_water: true,
        }
    }
}

/// What a column looks like from above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnProjection {
    /// Nothing found, or water with no floor underneath
    #[default]
    Empty,
    /// Topmost non-air voxel
    Surface { color: [u8; 3], y: u8 },
    /// Water column: where the water starts, where the floor is, and whether
    /// anything grew in between
    Submerged {
        plant_growth: bool,
        floor_y: u8,
        surface_y: u8,
    },
}

impl ColumnProjection {
    /// The four-byte texel layout the renderer expects. The first byte doubles as
    /// the tag: submerged columns always start with 0.
    pub fn to_bytes(self) -> [u8; 4] {
        match self {
            ColumnProjection::Empty => [0; 4],
            ColumnProjection::Surface { color, y } => [color[0], color[1], color[2], y],
            ColumnProjection::Submerged {
                plant_growth,
                floor_y,
                surface_y,
            } => [0, plant_growth as u8, floor_y, surface_y],
        }
    }
}

/// How the depth scan treats a voxel below a water surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthClass {
    Water,
    Plant,
    /// Anything else, air included, ends the scan
    Floor,
}

pub fn classify_depth(color: u32) -> DepthClass {
    if color == COLOR_WATER {
        DepthClass::Water
    } else if PLANT_COLORS.contains(&color) {
        DepthClass::Plant
    } else {
        DepthClass::Floor
    }
}

/// One projected chunk: `CHUNK_SIZE * CHUNK_SIZE` columns, indexed by (x, z).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeightMap {
    columns: Vec<ColumnProjection>,
}

impl HeightMap {
    pub fn new() -> Self {
        Self {
            columns: vec![ColumnProjection::Empty; CHUNK_SIZE * CHUNK_SIZE],
        }
    }

    fn index(x: usize, z: usize) -> usize {
        x * CHUNK_SIZE + z
    }

    pub fn column(&self, x: usize, z: usize) -> ColumnProjection {
        self.columns[Self::index(x, z)]
    }

    pub fn set_column(&mut self, x: usize, z: usize, column: ColumnProjection) {
        self.columns[Self::index(x, z)] = column;
    }

    /// Flat encoding, four bytes per column in (x, z) order.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEIGHT_MAP_SIZE);
        for column in &self.columns {
            bytes.extend_from_slice(&column.to_bytes());
        }
        bytes
    }
}

impl Default for HeightMap {
    fn default() -> Self {
        Self::new()
    }
}

fn project_column(chunk: &ChunkRaw, x: usize, z: usize, options: ProjectionOptions) -> ColumnProjection {
    for y in (0..CHUNK_HEIGHT).rev() {
        let color = chunk.color_at(x, y, z);
        if color == COLOR_AIR {
            continue;
        }

        if color != COLOR_WATER || !options.see_through_water {
            return ColumnProjection::Surface {
                color: chunk.rgb_at(x, y, z),
                y: y as u8,
            };
        }

        let mut plant_growth = false;
        for d in (0..=y).rev() {
            match classify_depth(chunk.color_at(x, d, z)) {
                DepthClass::Water => {}
                DepthClass::Plant => plant_growth = true,
                DepthClass::Floor => {
                    return ColumnProjection::Submerged {
                        plant_growth,
                        floor_y: d as u8,
                        surface_y: y as u8,
                    }
                }
            }
        }
        // Water all the way down
        return ColumnProjection::Empty;
    }
    ColumnProjection::Empty
}

/// Projects every column of a chunk. Pure; safe to run on any thread.
pub fn project_chunk(chunk: &ChunkRaw, options: ProjectionOptions) -> HeightMap {
    let mut map = HeightMap::new();
    for x in 0..CHUNK_SIZE {
        for z in 0..CHUNK_SIZE {
            map.set_column(x, z, project_column(chunk, x, z, options));
        }
    }
    map
}
