//! System orchestration: the three cooperating workers, the shared state
//! they synchronize on, and the transport-facing event types.

pub mod comms;
pub mod ingest;
pub mod lcd_system;
pub mod messages;
pub mod service;
pub mod shared_state;
pub mod verifier;

pub use lcd_system::{DistributedLcd, InboundChannels};
pub use messages::{BowQuery, OutboundEvent, PoseGraphEdge, VlcRequests, VlcResponses};
pub use service::{FrameServiceError, LocalFrameService};
pub use shared_state::SharedState;
