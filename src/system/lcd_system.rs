//! DistributedLcd - system handle and thread orchestration.
//!
//! Owns the shared stores and spawns the three workers: ingest (place
//! recognition), comms (frame exchange), and verification (geometric
//! checks). Components reference the stores through the shared-state
//! handle, never through each other.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use tracing::warn;

use crate::bow::Vocabulary;
use crate::config::LcdConfig;
use crate::detection::LoopDetector;
use crate::io::edge_log;
use crate::vlc::VlcEdge;

use super::comms::CommsWorker;
use super::ingest::IngestWorker;
use super::messages::{BowQuery, OutboundEvent, VlcRequests, VlcResponses};
use super::service::LocalFrameService;
use super::shared_state::SharedState;
use super::verifier::VerificationWorker;

/// Inbound transport channels, one per subscription.
pub struct InboundChannels {
    pub bow: Receiver<BowQuery>,
    pub vlc_requests: Receiver<VlcRequests>,
    pub vlc_responses: Receiver<VlcResponses>,
}

/// One loop-closure detection node.
pub struct DistributedLcd {
    shared: Arc<SharedState>,
    config: LcdConfig,
    ingest_handle: Option<JoinHandle<()>>,
    comms_handle: Option<JoinHandle<()>>,
    verification_handle: Option<JoinHandle<()>>,
}

impl DistributedLcd {
    /// Validate the configuration, load the vocabulary, and spawn the
    /// workers.
    pub fn new(
        config: LcdConfig,
        service: Arc<dyn LocalFrameService>,
        inbound: InboundChannels,
        outbound: Sender<OutboundEvent>,
    ) -> Result<Self> {
        config.validate()?;

        let vocab = Arc::new(
            Vocabulary::load_from_text(&config.vocabulary_path).with_context(|| {
                format!(
                    "failed to load vocabulary {}",
                    config.vocabulary_path.display()
                )
            })?,
        );

        let detector = LoopDetector::new(config.detector_config(), vocab);
        let shared = SharedState::new(detector, config.num_robots);
        config.log_parameters();

        let ingest_handle = {
            let shared = shared.clone();
            let self_id = config.robot_id;
            let bow_rx = inbound.bow;
            thread::spawn(move || {
                IngestWorker::new(shared, self_id).run(bow_rx);
            })
        };

        let comms_handle = {
            let mut worker = CommsWorker::new(
                shared.clone(),
                service,
                outbound.clone(),
                config.robot_id,
                config.vlc_batch_size,
                Duration::from_millis(config.comms_period_ms),
            );
            let requests_rx = inbound.vlc_requests;
            let responses_rx = inbound.vlc_responses;
            thread::spawn(move || {
                worker.run(requests_rx, responses_rx);
            })
        };

        let verification_handle = {
            let mut worker = VerificationWorker::new(
                shared.clone(),
                config.verification_config(),
                outbound,
                config.log_output_path.join("loop_closures.csv"),
                Duration::from_millis(config.verification_period_ms),
            );
            thread::spawn(move || {
                worker.run();
            })
        };

        Ok(Self {
            shared,
            config,
            ingest_handle: Some(ingest_handle),
            comms_handle: Some(comms_handle),
            verification_handle: Some(verification_handle),
        })
    }

    pub fn robot_id(&self) -> u16 {
        self.config.robot_id
    }

    /// Snapshot of all verified loop closures so far.
    pub fn loop_closures(&self) -> Vec<VlcEdge> {
        self.shared.loop_closures_snapshot()
    }

    /// Signal the workers, join them, and write the comm-stats log.
    pub fn shutdown(&mut self) {
        self.shared.request_shutdown();

        for handle in [
            self.ingest_handle.take(),
            self.comms_handle.take(),
            self.verification_handle.take(),
        ]
        .into_iter()
        .flatten()
        {
            let _ = handle.join();
        }

        let stats_path = self.config.log_output_path.join("lcd_comm_stats.csv");
        if let Err(e) = edge_log::write_comm_stats(
            &stats_path,
            &self.shared.bow_bytes_snapshot(),
            &self.shared.vlc_bytes_snapshot(),
        ) {
            warn!("failed to write comm stats: {}", e);
        }
    }
}

impl Drop for DistributedLcd {
    fn drop(&mut self) {
        self.shutdown();
    }
}
