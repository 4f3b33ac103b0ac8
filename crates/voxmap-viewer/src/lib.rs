pub mod client;
pub mod frame;
pub mod pipeline;
pub mod projector;
pub mod region;
pub mod view;

// Re-export commonly used items
pub use client::{ViewerConnection, ViewerEvent};
pub use pipeline::{ProjectionPipeline, ProjectionResult};
pub use projector::{project_chunk, HeightMap, ProjectionOptions};
pub use region::WorldRegion;
pub use view::WorldView;
