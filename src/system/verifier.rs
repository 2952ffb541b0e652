//! Verification worker: geometric checks on ready candidates.
//!
//! Per tick, candidates whose frames are resident move into a local batch
//! under the candidate and frame locks; matching and RANSAC then run
//! lock-free. Accepted edges are appended to the shared list, published,
//! and mirrored to the CSV debug log.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use tracing::{debug, info, warn};

use crate::detection::{verify_candidate, VerificationConfig};
use crate::io::edge_log;
use crate::vlc::{PotentialEdge, VlcFrame};

use super::messages::{OutboundEvent, PoseGraphEdge};
use super::shared_state::SharedState;

/// Candidates moved out of the ready queue per tick.
const VERIFY_BATCH_SIZE: usize = 16;

#[derive(Debug, Default, Clone)]
pub struct VerifierStats {
    pub candidates_checked: usize,
    pub edges_accepted: usize,
    pub candidates_rejected: usize,
}

pub struct VerificationWorker {
    shared: Arc<SharedState>,
    config: VerificationConfig,
    outbound: Sender<OutboundEvent>,
    edge_log_path: PathBuf,
    period: Duration,
    stats: VerifierStats,
}

impl VerificationWorker {
    pub fn new(
        shared: Arc<SharedState>,
        config: VerificationConfig,
        outbound: Sender<OutboundEvent>,
        edge_log_path: PathBuf,
        period: Duration,
    ) -> Self {
        Self {
            shared,
            config,
            outbound,
            edge_log_path,
            period,
            stats: VerifierStats::default(),
        }
    }

    pub fn run(&mut self) {
        info!("verification worker started");

        loop {
            if self.shared.is_shutdown_requested() {
                break;
            }

            let batch = self.collect_batch();
            for (candidate, frame_query, frame_match) in batch {
                self.verify(candidate, &frame_query, &frame_match);
            }

            std::thread::sleep(self.period);
        }

        info!(
            "verification worker exiting: checked={}, accepted={}, rejected={}",
            self.stats.candidates_checked,
            self.stats.edges_accepted,
            self.stats.candidates_rejected
        );
    }

    /// Move ready candidates and their frames into a local batch.
    fn collect_batch(&self) -> Vec<(PotentialEdge, VlcFrame, VlcFrame)> {
        let mut registry = self.shared.candidates.lock();
        let store = self.shared.frames.lock();

        registry.drain_ready(&store, VERIFY_BATCH_SIZE);

        registry
            .pop_ready(VERIFY_BATCH_SIZE)
            .into_iter()
            .filter_map(|candidate| {
                let frame_query = store.get(candidate.query)?.clone();
                let frame_match = store.get(candidate.matched)?.clone();
                Some((candidate, frame_query, frame_match))
            })
            .collect()
    }

    fn verify(&mut self, candidate: PotentialEdge, frame_query: &VlcFrame, frame_match: &VlcFrame) {
        info!("checking loop closure {}", candidate);
        self.stats.candidates_checked += 1;

        match verify_candidate(&candidate, frame_query, frame_match, &self.config) {
            Ok(edge) => {
                self.stats.edges_accepted += 1;
                info!("verified loop closure {}", candidate);

                let snapshot = {
                    let mut edges = self.shared.loop_closures.lock();
                    edges.push(edge.clone());
                    edges.clone()
                };

                let published = PoseGraphEdge::from(&edge);
                if self
                    .outbound
                    .send(OutboundEvent::LoopClosure(published))
                    .is_err()
                {
                    warn!("outbound channel closed; dropping loop closure");
                }

                if let Err(e) = edge_log::write_edges(&self.edge_log_path, &snapshot) {
                    warn!("failed to write loop closure log: {}", e);
                }
            }
            Err(reject) => {
                self.stats.candidates_rejected += 1;
                debug!("rejected {}: {}", candidate, reject);
            }
        }
    }
}
