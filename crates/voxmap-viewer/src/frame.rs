use std::sync::atomic::{AtomicBool, Ordering};

/// Collapses any number of update requests between two frames into one.
#[derive(Debug, Default)]
pub struct FrameCoalescer {
    pending: AtomicBool,
}

impl FrameCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_update(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// True if an update was requested since the last call.
    pub fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }
}
