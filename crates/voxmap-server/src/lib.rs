pub mod chunk_store;
pub mod console;
pub mod ingest;
pub mod server;

pub use server::{Server, ServerState, ShutdownHandle};
