//! Ingest worker: runs place recognition on every incoming BoW query.
//!
//! A single thread drains the BoW channel, so queries from a given robot
//! are processed in arrival order. All work here is in-memory; frame I/O
//! belongs to the comms worker.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info, warn};

use super::messages::BowQuery;
use super::shared_state::SharedState;

const RECV_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Default, Clone)]
pub struct IngestStats {
    pub queries_processed: usize,
    pub queries_rejected: usize,
    pub candidates_registered: usize,
}

pub struct IngestWorker {
    shared: Arc<SharedState>,
    self_id: u16,
    stats: IngestStats,
}

impl IngestWorker {
    pub fn new(shared: Arc<SharedState>, self_id: u16) -> Self {
        Self {
            shared,
            self_id,
            stats: IngestStats::default(),
        }
    }

    pub fn run(&mut self, bow_receiver: Receiver<BowQuery>) {
        info!("ingest worker started");

        loop {
            if self.shared.is_shutdown_requested() {
                break;
            }

            match bow_receiver.recv_timeout(RECV_TIMEOUT) {
                Ok(msg) => self.process_query(msg),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    info!("BoW channel disconnected");
                    break;
                }
            }
        }

        info!(
            "ingest worker exiting: processed={}, rejected={}, candidates={}",
            self.stats.queries_processed,
            self.stats.queries_rejected,
            self.stats.candidates_registered
        );
    }

    fn process_query(&mut self, msg: BowQuery) {
        self.shared.record_bow_bytes(msg.robot_id, msg.payload_bytes());

        let candidates = {
            let mut detector = self.shared.detector.write();
            match detector.process_query(msg.robot_id, msg.pose_id, msg.bow) {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(
                        "dropping BoW query ({}, {}): {}",
                        msg.robot_id, msg.pose_id, e
                    );
                    self.stats.queries_rejected += 1;
                    return;
                }
            }
        };

        self.stats.queries_processed += 1;

        if !candidates.is_empty() {
            let mut registry = self.shared.candidates.lock();
            for candidate in candidates {
                debug!("registered candidate {}", candidate);
                registry.insert(self.self_id, candidate);
                self.stats.candidates_registered += 1;
            }
        }
    }
}
