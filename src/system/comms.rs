//! Comms worker: frame exchange with peers and the local VIO.
//!
//! Per tick: answer peer frame requests out of the store (fetching missing
//! own frames from the VIO), absorb peer responses, fetch own-endpoint
//! frames for pending candidates, then publish deduplicated per-peer
//! request batches. This worker is the only caller of the blocking VIO
//! service.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::vlc::{VertexId, VlcFrame};

use super::messages::{OutboundEvent, VlcRequests, VlcResponses};
use super::service::LocalFrameService;
use super::shared_state::SharedState;

/// Outbound requests for a peer are withheld while the verification queue
/// is longer than this.
const READY_QUEUE_HIGH_WATER: usize = 64;

/// An outstanding request expires after one full tick without a response;
/// its ids then fall back into the pending set.
const OUTSTANDING_TICKS: u64 = 2;

#[derive(Debug, Default, Clone)]
pub struct CommsStats {
    pub requests_served: usize,
    pub frames_sent: usize,
    pub frames_received: usize,
    pub requests_published: usize,
}

pub struct CommsWorker {
    shared: Arc<SharedState>,
    service: Arc<dyn LocalFrameService>,
    outbound: Sender<OutboundEvent>,
    self_id: u16,
    vlc_batch_size: usize,
    period: Duration,
    /// Vertex -> tick at which its fetch was last requested.
    outstanding: HashMap<VertexId, u64>,
    tick: u64,
    stats: CommsStats,
}

impl CommsWorker {
    pub fn new(
        shared: Arc<SharedState>,
        service: Arc<dyn LocalFrameService>,
        outbound: Sender<OutboundEvent>,
        self_id: u16,
        vlc_batch_size: usize,
        period: Duration,
    ) -> Self {
        Self {
            shared,
            service,
            outbound,
            self_id,
            vlc_batch_size,
            period,
            outstanding: HashMap::new(),
            tick: 0,
            stats: CommsStats::default(),
        }
    }

    pub fn run(
        &mut self,
        requests_rx: Receiver<VlcRequests>,
        responses_rx: Receiver<VlcResponses>,
    ) {
        info!("comms worker started");

        loop {
            if self.shared.is_shutdown_requested() {
                break;
            }

            while let Ok(request) = requests_rx.try_recv() {
                self.serve_peer_request(request);
            }
            while let Ok(response) = responses_rx.try_recv() {
                self.absorb_responses(response);
            }

            self.fetch_self_frames();
            self.expire_outstanding();
            self.publish_peer_requests();

            self.tick += 1;
            std::thread::sleep(self.period);
        }

        info!(
            "comms worker exiting: served={}, sent={}, received={}, published={}",
            self.stats.requests_served,
            self.stats.frames_sent,
            self.stats.frames_received,
            self.stats.requests_published
        );
    }

    /// Answer a peer's request for our frames. Unknown poses are omitted.
    fn serve_peer_request(&mut self, request: VlcRequests) {
        if request.to != self.self_id {
            return;
        }
        self.stats.requests_served += 1;

        let mut frames = Vec::new();
        for vertex in request.vertex_ids {
            if vertex.robot_id != self.self_id {
                continue;
            }
            match self.local_frame(vertex) {
                Some(frame) => frames.push(frame),
                None => debug!("omitting unavailable frame {}", vertex),
            }
        }

        if frames.is_empty() {
            return;
        }

        self.stats.frames_sent += frames.len();
        let response = VlcResponses {
            from: self.self_id,
            to: request.from,
            frames,
        };
        if self.outbound.send(OutboundEvent::VlcResponses(response)).is_err() {
            warn!("outbound channel closed; dropping VLC responses");
        }
    }

    /// A frame of our own trajectory: served from the store, fetched from
    /// the VIO on first use.
    fn local_frame(&self, vertex: VertexId) -> Option<VlcFrame> {
        if let Some(frame) = self.shared.frames.lock().get(vertex).cloned() {
            return Some(frame);
        }

        let fetched = {
            let _guard = self.shared.vlc_service.lock();
            self.service.fetch_frame(vertex.robot_id, vertex.pose_id)
        };

        match fetched {
            Ok(frame) => {
                self.shared.frames.lock().put(frame.clone());
                Some(frame)
            }
            Err(e) => {
                warn!("local frame fetch failed: {}", e);
                None
            }
        }
    }

    /// Store frames received from peers.
    fn absorb_responses(&mut self, response: VlcResponses) {
        if response.to != self.self_id {
            return;
        }
        self.shared
            .record_vlc_bytes(response.from, response.payload_bytes());

        let mut store = self.shared.frames.lock();
        for frame in response.frames {
            self.outstanding.remove(&frame.vertex);
            self.stats.frames_received += 1;
            store.put(frame);
        }
    }

    /// Fetch own-trajectory endpoints of pending candidates from the VIO.
    /// A failed fetch is retried on the next tick; the vertex simply stays
    /// pending.
    fn fetch_self_frames(&mut self) {
        let needed: Vec<VertexId> = {
            let registry = self.shared.candidates.lock();
            let store = self.shared.frames.lock();

            let mut needed: Vec<VertexId> = registry
                .pending_peers()
                .into_iter()
                .flat_map(|peer| registry.pending_vertices(peer, &store))
                .filter(|v| v.robot_id == self.self_id)
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            needed.sort_unstable();
            needed
        };

        for vertex in needed {
            let _ = self.local_frame(vertex);
        }
    }

    fn expire_outstanding(&mut self) {
        let tick = self.tick;
        self.outstanding
            .retain(|_, issued| tick.saturating_sub(*issued) < OUTSTANDING_TICKS);
    }

    /// Publish one deduplicated request batch per peer.
    fn publish_peer_requests(&mut self) {
        let peers: Vec<u16> = {
            let registry = self.shared.candidates.lock();
            registry
                .pending_peers()
                .into_iter()
                .filter(|&p| p != self.self_id)
                .collect()
        };

        for peer in peers {
            let batch = {
                let registry = self.shared.candidates.lock();
                if registry.ready_len() > READY_QUEUE_HIGH_WATER {
                    debug!(
                        "verification queue above high water; skipping requests to {}",
                        peer
                    );
                    continue;
                }
                let store = self.shared.frames.lock();
                let pending = registry.pending_vertices(peer, &store);
                plan_peer_batch(&pending, &self.outstanding, peer, self.vlc_batch_size)
            };

            if batch.is_empty() {
                continue;
            }

            for &vertex in &batch {
                self.outstanding.insert(vertex, self.tick);
            }
            self.stats.requests_published += 1;
            debug!("requesting {} frames from robot {}", batch.len(), peer);

            let request = VlcRequests {
                from: self.self_id,
                to: peer,
                vertex_ids: batch,
            };
            if self.outbound.send(OutboundEvent::VlcRequests(request)).is_err() {
                warn!("outbound channel closed; dropping VLC requests");
            }
        }
    }
}

/// Deterministic request batch for one peer: that peer's pending vertices
/// without an outstanding request, lowest pose id first, capped at
/// `batch_size`.
fn plan_peer_batch(
    pending: &HashSet<VertexId>,
    outstanding: &HashMap<VertexId, u64>,
    peer: u16,
    batch_size: usize,
) -> Vec<VertexId> {
    let mut batch: Vec<VertexId> = pending
        .iter()
        .filter(|v| v.robot_id == peer && !outstanding.contains_key(v))
        .copied()
        .collect();
    batch.sort_unstable_by_key(|v| v.pose_id);
    batch.truncate(batch_size);
    batch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex_set(peer: u16, poses: &[u32]) -> HashSet<VertexId> {
        poses.iter().map(|&p| VertexId::new(peer, p)).collect()
    }

    #[test]
    fn test_batch_is_lowest_poses_first() {
        let pending = vertex_set(2, &[9, 1, 5, 12, 3, 7, 30]);
        let batch = plan_peer_batch(&pending, &HashMap::new(), 2, 3);

        let poses: Vec<u32> = batch.iter().map(|v| v.pose_id).collect();
        assert_eq!(poses, vec![1, 3, 5]);
    }

    #[test]
    fn test_batch_skips_outstanding() {
        let pending = vertex_set(2, &[1, 2, 3, 4]);
        let mut outstanding = HashMap::new();
        outstanding.insert(VertexId::new(2, 1), 0);
        outstanding.insert(VertexId::new(2, 3), 0);

        let batch = plan_peer_batch(&pending, &outstanding, 2, 10);
        let poses: Vec<u32> = batch.iter().map(|v| v.pose_id).collect();
        assert_eq!(poses, vec![2, 4]);
    }

    #[test]
    fn test_batch_filters_other_robots() {
        let mut pending = vertex_set(2, &[1]);
        pending.insert(VertexId::new(0, 5));
        pending.insert(VertexId::new(3, 2));

        let batch = plan_peer_batch(&pending, &HashMap::new(), 2, 10);
        assert_eq!(batch, vec![VertexId::new(2, 1)]);
    }

    #[test]
    fn test_partial_response_then_next_batch() {
        // Seven pending ids, batch size 3: the first batch takes the three
        // lowest; after two of them resolve and one expires, the next batch
        // takes the following three.
        let mut pending = vertex_set(2, &[0, 1, 2, 3, 4, 5, 6]);
        let mut outstanding = HashMap::new();

        let first = plan_peer_batch(&pending, &outstanding, 2, 3);
        assert_eq!(
            first.iter().map(|v| v.pose_id).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        for &v in &first {
            outstanding.insert(v, 0);
        }

        // Frames 0 and 1 arrive; 2 stays outstanding.
        pending.remove(&VertexId::new(2, 0));
        pending.remove(&VertexId::new(2, 1));
        outstanding.remove(&VertexId::new(2, 0));
        outstanding.remove(&VertexId::new(2, 1));

        let second = plan_peer_batch(&pending, &outstanding, 2, 3);
        assert_eq!(
            second.iter().map(|v| v.pose_id).collect::<Vec<_>>(),
            vec![3, 4, 5]
        );
    }
}
