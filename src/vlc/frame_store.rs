//! Cache of VLC frames keyed by vertex.

use std::collections::HashMap;

use super::types::{VertexId, VlcFrame};

/// Insertion-only frame cache. A frame, once resident, stays for the run.
#[derive(Debug, Default)]
pub struct FrameStore {
    frames: HashMap<VertexId, VlcFrame>,
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a frame. Idempotent: a second put for the same vertex is a
    /// no-op, so a late duplicate response never replaces cached data.
    pub fn put(&mut self, frame: VlcFrame) {
        self.frames.entry(frame.vertex).or_insert(frame);
    }

    pub fn get(&self, vertex: VertexId) -> Option<&VlcFrame> {
        self.frames.get(&vertex)
    }

    pub fn contains(&self, vertex: VertexId) -> bool {
        self.frames.contains_key(&vertex)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::Vector3;

    use super::*;
    use crate::vlc::types::DESCRIPTOR_BYTES;

    fn frame(vertex: VertexId, n: usize) -> VlcFrame {
        VlcFrame::new(
            vertex,
            vec![Vector3::zeros(); n],
            vec![[0u8; DESCRIPTOR_BYTES]; n],
        )
    }

    #[test]
    fn test_put_get() {
        let mut store = FrameStore::new();
        let vertex = VertexId::new(1, 7);
        store.put(frame(vertex, 3));

        assert!(store.contains(vertex));
        assert_eq!(store.get(vertex).unwrap().num_keypoints(), 3);
        assert!(!store.contains(VertexId::new(1, 8)));
    }

    #[test]
    fn test_second_put_is_noop() {
        let mut store = FrameStore::new();
        let vertex = VertexId::new(0, 0);
        store.put(frame(vertex, 2));
        store.put(frame(vertex, 9));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(vertex).unwrap().num_keypoints(), 2);
    }
}
