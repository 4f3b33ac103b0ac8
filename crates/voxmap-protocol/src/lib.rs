pub mod codec;
pub mod markup;
pub mod packet;
pub mod session;
pub mod session_manager;

// Re-export commonly used items
pub use codec::FrameCodec;
pub use packet::Packet;
pub use session_manager::{BroadcastReport, Delivery, SessionEvent, SessionManager};
