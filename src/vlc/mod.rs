//! Visual localization context: frames, the frame cache, and descriptor
//! matching.

pub mod frame_store;
pub mod matching;
pub mod types;

pub use frame_store::FrameStore;
pub use matching::{hamming_distance, match_descriptors};
pub use types::{Descriptor, PotentialEdge, VertexId, VlcEdge, VlcFrame, DESCRIPTOR_BYTES};
