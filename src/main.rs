//! Scripted two-robot replay through a full detection node.
//!
//! Robot 0 runs the node. Its trajectory revisits an early place, and later
//! crosses a place first announced by robot 1; the peer side of the frame
//! exchange is answered by looping outbound requests back with synthesized
//! responses. Expected output: one self closure (19 -> 2) and one
//! inter-robot closure ((0, 25) -> (1, 7)).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::unbounded;
use nalgebra::Vector3;
use rand::prelude::*;
use tracing::info;

use distributed_lcd::bow::BowVector;
use distributed_lcd::config::LcdConfig;
use distributed_lcd::system::{
    BowQuery, DistributedLcd, FrameServiceError, InboundChannels, LocalFrameService,
    OutboundEvent, VlcResponses,
};
use distributed_lcd::vlc::{Descriptor, VertexId, VlcFrame, DESCRIPTOR_BYTES};

/// Poses at which robot 0 revisits a previously seen place.
fn place_of(pose: u32) -> u32 {
    match pose {
        19 => 2,
        25 => 42,
        p => p,
    }
}

/// Deterministic synthetic frame for a place: revisits of the same place
/// yield identical geometry, so verification recovers the identity.
fn synth_frame(vertex: VertexId, place: u32) -> VlcFrame {
    let mut rng = StdRng::seed_from_u64(place as u64);
    let n = 40;

    let keypoints: Vec<_> = (0..n)
        .map(|_| {
            Vector3::new(
                rng.gen_range(-5.0..5.0),
                rng.gen_range(-5.0..5.0),
                rng.gen_range(1.0..6.0),
            )
        })
        .collect();
    let descriptors: Vec<Descriptor> = (0..n)
        .map(|_| {
            let mut d = [0u8; DESCRIPTOR_BYTES];
            rng.fill(&mut d[..]);
            d
        })
        .collect();

    VlcFrame::new(vertex, keypoints, descriptors)
}

/// BoW vector for a place: one word shared with each temporal neighbor.
fn place_bow(place: u32) -> BowVector {
    BowVector::from_pairs([(place, 0.5), (place + 1, 0.5)])
}

/// Revisit vector: dominated by the revisited place, with enough of the
/// current surroundings to pass the self-similarity floor.
fn revisit_bow(place: u32, previous_place: u32) -> BowVector {
    BowVector::from_pairs([
        (place, 0.3),
        (place + 1, 0.3),
        (previous_place, 0.2),
        (previous_place + 1, 0.2),
    ])
}

/// VIO stand-in for robot 0.
struct SynthFrameService;

impl LocalFrameService for SynthFrameService {
    fn fetch_frame(&self, robot_id: u16, pose_id: u32) -> Result<VlcFrame, FrameServiceError> {
        if robot_id != 0 {
            return Err(FrameServiceError::NotFound { robot_id, pose_id });
        }
        Ok(synth_frame(
            VertexId::new(robot_id, pose_id),
            place_of(pose_id),
        ))
    }
}

fn demo_config() -> Result<LcdConfig> {
    let dir = std::env::temp_dir().join("distributed-lcd-demo");
    std::fs::create_dir_all(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    // A minimal vocabulary; the front-end quantization it would drive is
    // emulated by the scripted BoW vectors.
    let vocab_path = dir.join("vocab.txt");
    let zeros = "0 ".repeat(32);
    std::fs::write(
        &vocab_path,
        format!("2 1 0 0\n0 1 {z}0.5\n0 1 {z}0.5\n", z = zeros),
    )?;

    Ok(LcdConfig {
        robot_id: 0,
        num_robots: 2,
        vocabulary_path: vocab_path,
        alpha: 0.5,
        dist_local: 5,
        max_db_results: 5,
        base_nss_factor: 0.2,
        min_nss_factor: 0.05,
        lowe_ratio: 0.8,
        max_ransac_iterations: 500,
        ransac_threshold: 0.05,
        geometric_verification_min_inlier_count: 10,
        geometric_verification_min_inlier_percentage: 0.3,
        vlc_batch_size: 10,
        log_output_path: dir,
        comms_period_ms: 50,
        verification_period_ms: 50,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => LcdConfig::load_from_yaml(PathBuf::from(path))?,
        None => demo_config()?,
    };
    let log_dir = config.log_output_path.clone();

    let (bow_tx, bow_rx) = unbounded();
    let (_req_tx, req_rx) = unbounded();
    let (resp_tx, resp_rx) = unbounded();
    let (out_tx, out_rx) = unbounded();

    let mut system = DistributedLcd::new(
        config,
        Arc::new(SynthFrameService),
        InboundChannels {
            bow: bow_rx,
            vlc_requests: req_rx,
            vlc_responses: resp_rx,
        },
        out_tx,
    )?;

    // Robot 1 announces the place robot 0 will cross at pose 25.
    bow_tx.send(BowQuery {
        robot_id: 1,
        pose_id: 7,
        bow: place_bow(42),
    })?;

    // Robot 0's trajectory: 19 fresh places, a revisit of place 2, more
    // fresh places, then robot 1's place.
    for pose in 0..19u32 {
        bow_tx.send(BowQuery {
            robot_id: 0,
            pose_id: pose,
            bow: place_bow(pose),
        })?;
    }
    bow_tx.send(BowQuery {
        robot_id: 0,
        pose_id: 19,
        bow: revisit_bow(2, 18),
    })?;
    for pose in 20..25u32 {
        bow_tx.send(BowQuery {
            robot_id: 0,
            pose_id: pose,
            bow: place_bow(pose + 100),
        })?;
    }
    bow_tx.send(BowQuery {
        robot_id: 0,
        pose_id: 25,
        bow: revisit_bow(42, 124),
    })?;

    // Drive the event loop: answer frame requests on robot 1's behalf and
    // collect closures.
    let mut closures = 0;
    while closures < 2 {
        match out_rx.recv_timeout(Duration::from_secs(10)) {
            Ok(OutboundEvent::VlcRequests(request)) => {
                info!(
                    "peer {} asked for {} frames",
                    request.to,
                    request.vertex_ids.len()
                );
                let frames: Vec<VlcFrame> = request
                    .vertex_ids
                    .iter()
                    .filter(|v| v.robot_id == 1)
                    .map(|&v| synth_frame(v, 42))
                    .collect();
                resp_tx.send(VlcResponses {
                    from: request.to,
                    to: request.from,
                    frames,
                })?;
            }
            Ok(OutboundEvent::LoopClosure(edge)) => {
                closures += 1;
                let t = &edge.pose.translation;
                info!(
                    "loop closure {} -> {} (t = [{:.3}, {:.3}, {:.3}])",
                    edge.from, edge.to, t.x, t.y, t.z
                );
            }
            Ok(OutboundEvent::VlcResponses(_)) => {}
            Err(_) => {
                anyhow::bail!("timed out waiting for loop closures");
            }
        }
    }

    system.shutdown();

    info!(
        "Done: {} verified loop closures, logs in {}",
        system.loop_closures().len(),
        log_dir.display()
    );

    Ok(())
}
