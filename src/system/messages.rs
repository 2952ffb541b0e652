//! Events exchanged with the transport and the downstream consumer.
//!
//! Wire encoding is owned by the transport layer; these are the in-process
//! representations handed over crossbeam channels.

use crate::bow::BowVector;
use crate::geometry::SE3;
use crate::vlc::{VertexId, VlcEdge, VlcFrame};

/// A place descriptor announced by a robot (self included) for one of its
/// pose-graph vertices.
#[derive(Debug, Clone)]
pub struct BowQuery {
    pub robot_id: u16,
    pub pose_id: u32,
    pub bow: BowVector,
}

impl BowQuery {
    /// Approximate wire payload, for the communication counters.
    pub fn payload_bytes(&self) -> usize {
        std::mem::size_of::<u16>() + std::mem::size_of::<u32>() + self.bow.payload_bytes()
    }
}

/// A batch of frame fetches addressed to one robot.
#[derive(Debug, Clone)]
pub struct VlcRequests {
    pub from: u16,
    pub to: u16,
    pub vertex_ids: Vec<VertexId>,
}

/// Frames answering a previous request. A response may omit requested ids.
#[derive(Debug, Clone)]
pub struct VlcResponses {
    pub from: u16,
    pub to: u16,
    pub frames: Vec<VlcFrame>,
}

impl VlcResponses {
    pub fn payload_bytes(&self) -> usize {
        self.frames.iter().map(|f| f.payload_bytes()).sum()
    }
}

/// A verified relative pose constraint, as published to the
/// pairwise-consistency consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseGraphEdge {
    pub from: VertexId,
    pub to: VertexId,
    pub pose: SE3,
}

impl From<&VlcEdge> for PoseGraphEdge {
    fn from(edge: &VlcEdge) -> Self {
        Self {
            from: edge.src,
            to: edge.dst,
            pose: edge.t_src_dst.clone(),
        }
    }
}

/// Everything this node publishes.
#[derive(Debug, Clone)]
pub enum OutboundEvent {
    LoopClosure(PoseGraphEdge),
    VlcRequests(VlcRequests),
    VlcResponses(VlcResponses),
}
