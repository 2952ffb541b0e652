//! Place recognition over the local and shared BoW databases.
//!
//! Every incoming BoW vector is queried against the local robot's own
//! trajectory, and self queries are additionally checked against the shared
//! database of peer trajectories. Detection runs before insertion so a
//! vector can never match itself.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::bow::{BowDatabase, BowVector, Vocabulary};
use crate::vlc::{PotentialEdge, VertexId};

/// Place-recognition parameters (a subset of the node configuration).
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// This robot's id.
    pub self_id: u16,
    /// Total number of robots in the deployment.
    pub num_robots: u16,
    /// Score threshold multiplier: the best result is accepted iff
    /// `score >= alpha * nss_factor`.
    pub alpha: f64,
    /// Number of most recent own poses excluded from self-queries.
    pub dist_local: u32,
    /// Top-k for database queries.
    pub max_db_results: usize,
    /// Normalization floor used for cross-robot queries.
    pub base_nss_factor: f64,
    /// Self queries with a lower similarity to the previous own vector are
    /// not matched against the local trajectory at all.
    pub min_nss_factor: f64,
}

/// Rejected BoW ingest events. All are logged and dropped by the caller.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("robot {robot} is below own id {self_id}; handled by that peer")]
    ForeignRobot { robot: u16, self_id: u16 },
    #[error("robot {robot} outside fleet of {num_robots}")]
    UnknownRobot { robot: u16, num_robots: u16 },
    #[error("own pose {got} out of sequence (expected {expected})")]
    OutOfSequence { expected: u32, got: u32 },
}

/// Loop-closure detector state: both BoW databases and the bookkeeping
/// needed to window and normalize queries.
pub struct LoopDetector {
    config: DetectorConfig,
    vocab: Arc<Vocabulary>,
    /// Own trajectory; index equals pose id.
    local_db: BowDatabase,
    /// Peer trajectories, in arrival order.
    shared_db: BowDatabase,
    /// Shared-database index -> originating vertex.
    shared_db_to_vertex: HashMap<u32, VertexId>,
    /// Most recently inserted own vector, for NSS normalization.
    latest_bow: Option<BowVector>,
    next_local_pose: u32,
}

impl LoopDetector {
    pub fn new(config: DetectorConfig, vocab: Arc<Vocabulary>) -> Self {
        Self {
            local_db: BowDatabase::new(vocab.clone()),
            shared_db: BowDatabase::new(vocab.clone()),
            shared_db_to_vertex: HashMap::new(),
            latest_bow: None,
            next_local_pose: 0,
            config,
            vocab,
        }
    }

    /// Process one BoW vector: validate, detect candidates against both
    /// databases, then insert the vector. Returns the registered candidates
    /// (zero, one, or two).
    pub fn process_query(
        &mut self,
        robot_id: u16,
        pose_id: u32,
        bow: BowVector,
    ) -> Result<Vec<PotentialEdge>, IngestError> {
        let self_id = self.config.self_id;
        if robot_id < self_id {
            return Err(IngestError::ForeignRobot {
                robot: robot_id,
                self_id,
            });
        }
        if robot_id >= self.config.num_robots {
            return Err(IngestError::UnknownRobot {
                robot: robot_id,
                num_robots: self.config.num_robots,
            });
        }
        if robot_id == self_id && pose_id != self.next_local_pose {
            return Err(IngestError::OutOfSequence {
                expected: self.next_local_pose,
                got: pose_id,
            });
        }

        let query = VertexId::new(robot_id, pose_id);
        let mut candidates = Vec::new();

        if let Some(matched) = self.detect_in_local_db(query, &bow) {
            candidates.push(PotentialEdge::new(query, matched));
        }
        if robot_id == self_id {
            if let Some(matched) = self.detect_in_shared_db(&bow) {
                candidates.push(PotentialEdge::new(query, matched));
            }
        }

        // Insert after detection so the query never scores against itself.
        if robot_id == self_id {
            let index = self.local_db.add(bow.clone());
            debug_assert_eq!(index, pose_id);
            self.latest_bow = Some(bow);
            self.next_local_pose += 1;
        } else {
            let index = self.shared_db.add(bow);
            self.shared_db_to_vertex.insert(index, query);
        }

        Ok(candidates)
    }

    /// Query the own-trajectory database.
    ///
    /// Self queries are normalized by the similarity to the previous own
    /// vector (NSS) and windowed by `dist_local`; peer queries use the
    /// configured floor and may match any own pose.
    fn detect_in_local_db(&self, query: VertexId, bow: &BowVector) -> Option<VertexId> {
        if self.local_db.is_empty() {
            return None;
        }

        let mut nss_factor = self.config.base_nss_factor;
        let mut max_id = self.next_local_pose as i64 - 1;

        if query.robot_id == self.config.self_id {
            max_id -= self.config.dist_local as i64;
            // latest_bow is present whenever the local database is non-empty.
            let latest = self.latest_bow.as_ref()?;
            nss_factor = self.vocab.score(bow, latest);
            if nss_factor < self.config.min_nss_factor {
                debug!(
                    "self query {} below min nss factor ({:.3})",
                    query, nss_factor
                );
                return None;
            }
        }

        if max_id < 0 {
            // The admissible window is empty; anything newer is excluded by
            // the dist_local guard.
            return None;
        }

        let results = self
            .local_db
            .query(bow, self.config.max_db_results, Some(max_id as u32));
        let best = results.first()?;

        if best.score >= self.config.alpha * nss_factor {
            Some(VertexId::new(self.config.self_id, best.id))
        } else {
            None
        }
    }

    /// Query the shared database of peer trajectories (self queries only).
    fn detect_in_shared_db(&self, bow: &BowVector) -> Option<VertexId> {
        let results = self.shared_db.query(bow, self.config.max_db_results, None);
        let best = results.first()?;

        if best.score >= self.config.alpha * self.config.base_nss_factor {
            self.shared_db_to_vertex.get(&best.id).copied()
        } else {
            None
        }
    }

    pub fn next_local_pose(&self) -> u32 {
        self.next_local_pose
    }

    pub fn local_db_len(&self) -> usize {
        self.local_db.len()
    }

    pub fn shared_db_len(&self) -> usize {
        self.shared_db.len()
    }
}
