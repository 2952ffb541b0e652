//! Core identifiers and visual-localization-context types.

use std::fmt;

use nalgebra::Vector3;

use crate::geometry::SE3;

/// Width of a binary ORB descriptor in bytes (256 bits).
pub const DESCRIPTOR_BYTES: usize = 32;

/// One binary descriptor row.
pub type Descriptor = [u8; DESCRIPTOR_BYTES];

/// A pose-graph vertex: (robot id, pose id within that robot's trajectory).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId {
    pub robot_id: u16,
    pub pose_id: u32,
}

impl VertexId {
    pub fn new(robot_id: u16, pose_id: u32) -> Self {
        Self { robot_id, pose_id }
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.robot_id, self.pose_id)
    }
}

/// Visual localization context for one vertex: 3D keypoints in the frame's
/// camera coordinates with one binary descriptor per keypoint.
/// Immutable once cached.
#[derive(Debug, Clone)]
pub struct VlcFrame {
    pub vertex: VertexId,
    pub keypoints: Vec<Vector3<f64>>,
    pub descriptors: Vec<Descriptor>,
}

impl VlcFrame {
    pub fn new(vertex: VertexId, keypoints: Vec<Vector3<f64>>, descriptors: Vec<Descriptor>) -> Self {
        debug_assert_eq!(keypoints.len(), descriptors.len());
        Self {
            vertex,
            keypoints,
            descriptors,
        }
    }

    pub fn num_keypoints(&self) -> usize {
        self.keypoints.len()
    }

    /// Approximate serialized payload size: 3 f32 per keypoint plus the
    /// descriptor rows.
    pub fn payload_bytes(&self) -> usize {
        self.keypoints.len() * 3 * std::mem::size_of::<f32>()
            + self.descriptors.len() * DESCRIPTOR_BYTES
    }
}

/// An unverified loop-closure candidate between a query vertex and a match
/// vertex found in one of the BoW databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PotentialEdge {
    pub query: VertexId,
    pub matched: VertexId,
}

impl PotentialEdge {
    pub fn new(query: VertexId, matched: VertexId) -> Self {
        Self { query, matched }
    }
}

impl fmt::Display for PotentialEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.query, self.matched)
    }
}

/// A verified loop closure: relative pose from `src` (the query vertex) to
/// `dst` (the matched vertex), i.e. `keypoints_dst ≈ T_src_dst · keypoints_src`.
#[derive(Debug, Clone, PartialEq)]
pub struct VlcEdge {
    pub src: VertexId,
    pub dst: VertexId,
    pub t_src_dst: SE3,
}

impl VlcEdge {
    pub fn new(src: VertexId, dst: VertexId, t_src_dst: SE3) -> Self {
        Self { src, dst, t_src_dst }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_ordering() {
        let a = VertexId::new(0, 5);
        let b = VertexId::new(0, 7);
        let c = VertexId::new(1, 0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_frame_payload_bytes() {
        let vertex = VertexId::new(0, 0);
        let frame = VlcFrame::new(
            vertex,
            vec![Vector3::zeros(); 4],
            vec![[0u8; DESCRIPTOR_BYTES]; 4],
        );
        assert_eq!(frame.payload_bytes(), 4 * 12 + 4 * 32);
    }
}
