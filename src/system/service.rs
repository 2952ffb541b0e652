//! Seam to the local VIO front-end.

use thiserror::Error;

use crate::vlc::VlcFrame;

#[derive(Debug, Error)]
pub enum FrameServiceError {
    #[error("no frame for ({robot_id}, {pose_id})")]
    NotFound { robot_id: u16, pose_id: u32 },
    #[error("frame service unavailable: {0}")]
    Unavailable(String),
}

/// Synchronous, blocking, best-effort access to the local robot's VLC
/// frames. Only the comms worker calls this, serialized by the
/// `vlc_service` lock.
pub trait LocalFrameService: Send + Sync {
    fn fetch_frame(&self, robot_id: u16, pose_id: u32) -> Result<VlcFrame, FrameServiceError>;
}
