use crate::frame::FrameCoalescer;
use crate::pipeline::ProjectionResult;
use crate::region::WorldRegion;
use std::collections::HashMap;
use voxmap_common::config::ViewerConfig;
use voxmap_common::types::{ChunkCoordinate, Result};
use voxmap_common::VoxmapError;
use voxmap_logger::log::log;
use voxmap_logger::severity::LogSeverity::{Debug, Warning};

/// Render-side world state: the region texture and whether it changed since the
/// last frame.
pub struct WorldView {
    region: WorldRegion,
    coalescer: FrameCoalescer,
    auto_grow: bool,
    /// Sequence number of the last result written for each chunk
    applied_seq: HashMap<ChunkCoordinate, u64>,
}

impl WorldView {
    pub fn new(region: WorldRegion, auto_grow: bool) -> Self {
        Self {
            region,
            coalescer: FrameCoalescer::new(),
            auto_grow,
            applied_seq: HashMap::new(),
        }
    }

    pub fn from_config(config: &ViewerConfig) -> Self {
        let region = WorldRegion::new(config.initial_region_radius).with_max_side(config.max_region_side);
        Self::new(region, config.auto_grow_region)
    }

    pub fn region(&self) -> &WorldRegion {
        &self.region
    }

    fn apply_one(&mut self, result: &ProjectionResult) -> Result<()> {
        if self.auto_grow && self.region.grow_to_include(result.coord)? {
            let (size_x, size_z) = self.region.size();
            log(
                format!("World region grown to {}x{} chunks", size_x, size_z),
                Debug,
            );
        }
        self.region.write_chunk(result.coord, &result.height_map)
    }

    fn is_stale(&self, result: &ProjectionResult) -> bool {
        self.applied_seq
            .get(&result.coord)
            .is_some_and(|&seq| seq >= result.seq)
    }

    /// Writes projected chunks into the region and returns how many landed.
    /// Chunks that don't fit are logged and dropped, as are results older than
    /// what is already shown for their chunk.
    pub fn apply(&mut self, results: Vec<ProjectionResult>) -> usize {
        let mut applied = 0;
        for result in &results {
            if self.is_stale(result) {
                log(format!("Skipping stale projection of chunk {}", result.coord), Debug);
                continue;
            }
            match self.apply_one(result) {
                Ok(()) => {
                    self.applied_seq.insert(result.coord, result.seq);
                    applied += 1;
                }
                Err(err @ VoxmapError::OutOfRegion { .. }) => log(format!("Dropping chunk: {}", err), Debug),
                Err(err) => log(format!("Dropping chunk {}: {}", result.coord, err), Warning),
            }
        }

        if applied > 0 {
            self.coalescer.request_update();
        }
        applied
    }

    /// The texture, if anything changed since the last frame.
    pub fn frame(&self) -> Option<&[u8]> {
        if self.coalescer.take_pending() {
            Some(self.region.as_texture_bytes())
        } else {
            None
        }
    }
}
