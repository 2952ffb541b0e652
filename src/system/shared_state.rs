//! State shared between the ingest, comms, and verification workers.
//!
//! Locks are numbered; a worker holding lock N must not acquire a
//! lower-numbered lock:
//!
//! 1. `detector`      — both BoW databases and detection bookkeeping
//! 2. `candidates`    — the candidate registry
//! 3. `frames`        — the VLC frame store
//! 4. `loop_closures` — the verified edge list
//! 5. `vlc_service`   — serializes calls into the local VIO service
//!
//! None of #2–#5 may be held across blocking I/O, except `vlc_service`
//! which wraps exactly the one blocking VIO call.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::detection::{CandidateRegistry, LoopDetector};
use crate::vlc::{FrameStore, VlcEdge};

pub struct SharedState {
    /// Lock #1. Writers: the ingest worker. Readers: observability
    /// accessors.
    pub detector: RwLock<LoopDetector>,

    /// Lock #2.
    pub candidates: Mutex<CandidateRegistry>,

    /// Lock #3.
    pub frames: Mutex<FrameStore>,

    /// Lock #4. Verified edges, in acceptance order.
    pub loop_closures: Mutex<Vec<VlcEdge>>,

    /// Lock #5. Held only around a single blocking VIO call.
    pub vlc_service: Mutex<()>,

    /// Polled at the top of every worker loop; callbacks become no-ops
    /// once set.
    shutdown_requested: AtomicBool,

    /// Received bytes per origin robot, for the comm-stats log.
    bow_bytes_received: Vec<AtomicU64>,
    vlc_bytes_received: Vec<AtomicU64>,
}

impl SharedState {
    pub fn new(detector: LoopDetector, num_robots: u16) -> Arc<Self> {
        Arc::new(Self {
            detector: RwLock::new(detector),
            candidates: Mutex::new(CandidateRegistry::new()),
            frames: Mutex::new(FrameStore::new()),
            loop_closures: Mutex::new(Vec::new()),
            vlc_service: Mutex::new(()),
            shutdown_requested: AtomicBool::new(false),
            bow_bytes_received: (0..num_robots).map(|_| AtomicU64::new(0)).collect(),
            vlc_bytes_received: (0..num_robots).map(|_| AtomicU64::new(0)).collect(),
        })
    }

    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Account received BoW traffic. Out-of-range robots are ignored.
    pub fn record_bow_bytes(&self, robot_id: u16, bytes: usize) {
        if let Some(counter) = self.bow_bytes_received.get(robot_id as usize) {
            counter.fetch_add(bytes as u64, Ordering::Relaxed);
        }
    }

    /// Account received VLC traffic. Out-of-range robots are ignored.
    pub fn record_vlc_bytes(&self, robot_id: u16, bytes: usize) {
        if let Some(counter) = self.vlc_bytes_received.get(robot_id as usize) {
            counter.fetch_add(bytes as u64, Ordering::Relaxed);
        }
    }

    pub fn bow_bytes_snapshot(&self) -> Vec<u64> {
        self.bow_bytes_received
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }

    pub fn vlc_bytes_snapshot(&self) -> Vec<u64> {
        self.vlc_bytes_received
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }

    /// Snapshot of the verified edges.
    pub fn loop_closures_snapshot(&self) -> Vec<VlcEdge> {
        self.loop_closures.lock().clone()
    }
}
