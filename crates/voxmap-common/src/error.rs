use crate::types::SessionId;
use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum VoxmapError {
    IoError(std::io::Error),
    MalformedPacket(String),
    UnknownPacketType(u8),
    ChunkSizeMismatch { expected: usize, actual: usize },
    FrameTooLarge { length: usize, max: usize },
    UnknownSession(SessionId),
    SessionClosed(SessionId),
    SendTimeout(SessionId),
    OutOfRegion { x: i32, z: i32 },
    RegionTooLarge { size_x: usize, size_z: usize },
    InvalidCoordinates(String),
    InvalidMethod(String),
    QueueFull,
    PipelineClosed,
    ConfigError(String),
    ServerError(String),
}

impl VoxmapError {
    /// Protocol decode errors mean the peer sent something we can't trust.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            VoxmapError::MalformedPacket(_)
                | VoxmapError::UnknownPacketType(_)
                | VoxmapError::ChunkSizeMismatch { .. }
                | VoxmapError::FrameTooLarge { .. }
        )
    }
}

impl fmt::Display for VoxmapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoxmapError::IoError(err) => write!(f, "IO error: {}", err),
            VoxmapError::MalformedPacket(msg) => write!(f, "Malformed packet: {}", msg),
            VoxmapError::UnknownPacketType(id) => write!(f, "Unknown packet type 0x{:02x}", id),
            VoxmapError::ChunkSizeMismatch { expected, actual } => write!(
                f,
                "Invalid chunk data: expected {} bytes, got {}",
                expected, actual
            ),
            VoxmapError::FrameTooLarge { length, max } => {
                write!(f, "Frame of {} bytes exceeds limit of {}", length, max)
            }
            VoxmapError::UnknownSession(id) => write!(f, "Client with id {} doesn't exist", id),
            VoxmapError::SessionClosed(id) => write!(f, "Client {} connection is closed", id),
            VoxmapError::SendTimeout(id) => write!(f, "Timed out sending to client {}", id),
            VoxmapError::OutOfRegion { x, z } => {
                write!(f, "Chunk {}, {} is outside the world region", x, z)
            }
            VoxmapError::RegionTooLarge { size_x, size_z } => write!(
                f,
                "World region of {}x{} chunks exceeds the size limit",
                size_x, size_z
            ),
            VoxmapError::InvalidCoordinates(msg) => {
                write!(f, "Invalid chunk coordinates: {}", msg)
            }
            VoxmapError::InvalidMethod(method) => write!(f, "Invalid request method: {}", method),
            VoxmapError::QueueFull => write!(f, "Projection queue is full"),
            VoxmapError::PipelineClosed => write!(f, "Projection pipeline is shut down"),
            VoxmapError::ConfigError(msg) => write!(f, "Config error: {}", msg),
            VoxmapError::ServerError(msg) => write!(f, "Server error: {}", msg),
        }
    }
}

impl Error for VoxmapError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            VoxmapError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for VoxmapError {
    fn from(err: std::io::Error) -> Self {
        VoxmapError::IoError(err)
    }
}

impl From<serde_json::Error> for VoxmapError {
    fn from(err: serde_json::Error) -> Self {
        VoxmapError::ConfigError(err.to_string())
    }
}
