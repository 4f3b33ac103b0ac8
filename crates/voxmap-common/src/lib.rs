pub mod config;
pub mod error;
pub mod types;

pub use error::VoxmapError;
pub use types::{ChunkCoordinate, ChunkRaw, ChunkRawBuilder, Result, SessionId};
