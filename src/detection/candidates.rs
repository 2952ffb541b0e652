//! Registry of unverified loop-closure candidates.
//!
//! Candidates wait here until both endpoint frames are resident in the
//! frame store, then move into a FIFO ready queue for geometric
//! verification. Candidates are filed under the peer whose frames must be
//! fetched (pure-self candidates under the own id).

use std::collections::{HashMap, HashSet, VecDeque};

use crate::vlc::{FrameStore, PotentialEdge, VertexId};

#[derive(Debug, Default)]
pub struct CandidateRegistry {
    /// peer robot id -> candidates pending frame fetch.
    pending: HashMap<u16, Vec<PotentialEdge>>,
    /// Candidates with both frames resident, awaiting verification.
    ready: VecDeque<PotentialEdge>,
}

impl CandidateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// File a candidate under the involved peer.
    ///
    /// No deduplication: the detector issues at most one candidate per
    /// database per BoW message, so a repeated (query, match) pair would be
    /// a detector bug.
    pub fn insert(&mut self, self_id: u16, edge: PotentialEdge) {
        let peer = if edge.query.robot_id != self_id {
            edge.query.robot_id
        } else {
            edge.matched.robot_id
        };
        self.pending.entry(peer).or_default().push(edge);
    }

    /// Peers with at least one pending candidate, in ascending order.
    pub fn pending_peers(&self) -> Vec<u16> {
        let mut peers: Vec<u16> = self
            .pending
            .iter()
            .filter(|(_, edges)| !edges.is_empty())
            .map(|(&peer, _)| peer)
            .collect();
        peers.sort_unstable();
        peers
    }

    /// Endpoint vertices on `peer`'s list whose frames are not yet
    /// resident. Used to build fetch requests.
    pub fn pending_vertices(&self, peer: u16, store: &FrameStore) -> HashSet<VertexId> {
        let mut vertices = HashSet::new();
        if let Some(edges) = self.pending.get(&peer) {
            for edge in edges {
                for vertex in [edge.query, edge.matched] {
                    if !store.contains(vertex) {
                        vertices.insert(vertex);
                    }
                }
            }
        }
        vertices
    }

    /// Move up to `max` candidates whose both endpoint frames are resident
    /// into the ready queue. Returns how many moved.
    pub fn drain_ready(&mut self, store: &FrameStore, max: usize) -> usize {
        let mut moved = 0;

        let mut peers: Vec<u16> = self.pending.keys().copied().collect();
        peers.sort_unstable();

        for peer in peers {
            if moved >= max {
                break;
            }
            let Some(edges) = self.pending.get_mut(&peer) else {
                continue;
            };
            let mut i = 0;
            while i < edges.len() && moved < max {
                let edge = edges[i];
                if store.contains(edge.query) && store.contains(edge.matched) {
                    edges.remove(i);
                    self.ready.push_back(edge);
                    moved += 1;
                } else {
                    i += 1;
                }
            }
        }

        moved
    }

    /// Pop up to `max` candidates from the ready queue, oldest first.
    pub fn pop_ready(&mut self, max: usize) -> Vec<PotentialEdge> {
        let take = max.min(self.ready.len());
        self.ready.drain(..take).collect()
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.values().map(|v| v.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::Vector3;

    use super::*;
    use crate::vlc::{VlcFrame, DESCRIPTOR_BYTES};

    fn edge(q: (u16, u32), m: (u16, u32)) -> PotentialEdge {
        PotentialEdge::new(VertexId::new(q.0, q.1), VertexId::new(m.0, m.1))
    }

    fn put_frame(store: &mut FrameStore, vertex: VertexId) {
        store.put(VlcFrame::new(
            vertex,
            vec![Vector3::zeros(); 1],
            vec![[0u8; DESCRIPTOR_BYTES]; 1],
        ));
    }

    #[test]
    fn test_insert_files_under_peer() {
        let mut reg = CandidateRegistry::new();
        reg.insert(0, edge((2, 5), (0, 1))); // peer query -> own match
        reg.insert(0, edge((0, 9), (1, 4))); // own query -> shared-db match
        reg.insert(0, edge((0, 9), (0, 2))); // pure self closure

        assert_eq!(reg.pending_peers(), vec![0, 1, 2]);
        assert_eq!(reg.pending_len(), 3);
    }

    #[test]
    fn test_pending_vertices_excludes_resident() {
        let mut reg = CandidateRegistry::new();
        let mut store = FrameStore::new();
        reg.insert(0, edge((2, 5), (0, 1)));

        let vertices = reg.pending_vertices(2, &store);
        assert_eq!(vertices.len(), 2);

        put_frame(&mut store, VertexId::new(0, 1));
        let vertices = reg.pending_vertices(2, &store);
        assert_eq!(vertices.len(), 1);
        assert!(vertices.contains(&VertexId::new(2, 5)));
    }

    #[test]
    fn test_drain_ready_requires_both_frames() {
        let mut reg = CandidateRegistry::new();
        let mut store = FrameStore::new();
        reg.insert(0, edge((1, 3), (0, 0)));

        put_frame(&mut store, VertexId::new(1, 3));
        assert_eq!(reg.drain_ready(&store, 10), 0);
        assert_eq!(reg.ready_len(), 0);

        put_frame(&mut store, VertexId::new(0, 0));
        assert_eq!(reg.drain_ready(&store, 10), 1);
        assert_eq!(reg.ready_len(), 1);
        assert_eq!(reg.pending_len(), 0);
    }

    #[test]
    fn test_pop_ready_is_fifo() {
        let mut reg = CandidateRegistry::new();
        let mut store = FrameStore::new();
        let first = edge((1, 1), (0, 0));
        let second = edge((1, 2), (0, 0));
        reg.insert(0, first);
        reg.insert(0, second);

        for vertex in [VertexId::new(1, 1), VertexId::new(1, 2), VertexId::new(0, 0)] {
            put_frame(&mut store, vertex);
        }
        reg.drain_ready(&store, 10);

        assert_eq!(reg.pop_ready(1), vec![first]);
        assert_eq!(reg.pop_ready(10), vec![second]);
        assert!(reg.pop_ready(10).is_empty());
    }

    #[test]
    fn test_drain_ready_respects_limit() {
        let mut reg = CandidateRegistry::new();
        let mut store = FrameStore::new();
        put_frame(&mut store, VertexId::new(0, 0));
        for pose in 0..5u32 {
            reg.insert(0, edge((1, pose), (0, 0)));
            put_frame(&mut store, VertexId::new(1, pose));
        }

        assert_eq!(reg.drain_ready(&store, 3), 3);
        assert_eq!(reg.ready_len(), 3);
        assert_eq!(reg.pending_len(), 2);
    }
}
