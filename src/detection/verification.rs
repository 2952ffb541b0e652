//! Geometric verification of loop-closure candidates.
//!
//! A candidate passes when descriptor matching yields enough
//! correspondences, point-cloud RANSAC converges, and the inlier set clears
//! both the absolute and the relative gate. The absolute gate guards
//! against degenerate low-correspondence matches; the relative gate guards
//! against bulk mis-registration on feature-rich frames.

use thiserror::Error;
use tracing::debug;

use crate::geometry::{align_points_ransac, ArunRansacConfig};
use crate::vlc::{match_descriptors, PotentialEdge, VlcEdge, VlcFrame};

/// Geometric verification parameters (a subset of the node configuration).
#[derive(Debug, Clone)]
pub struct VerificationConfig {
    /// Lowe ratio: a match is kept iff d1 < lowe_ratio * d2.
    pub lowe_ratio: f64,
    /// RANSAC iteration cap.
    pub max_ransac_iterations: usize,
    /// RANSAC inlier threshold on point-to-point distance (meters).
    pub ransac_threshold: f64,
    /// Absolute inlier floor.
    pub min_inlier_count: usize,
    /// Relative inlier floor, in [0, 1].
    pub min_inlier_percentage: f64,
}

/// Why a candidate was rejected. None of these is fatal: the candidate is
/// dropped and the system moves on.
#[derive(Debug, Error, PartialEq)]
pub enum VerificationReject {
    #[error("{count} correspondences after ratio test, need at least 3")]
    DegenerateMatch { count: usize },
    #[error("alignment RANSAC did not converge")]
    NoModel,
    #[error("{inliers} inliers below minimum {min}")]
    InlierCount { inliers: usize, min: usize },
    #[error("inlier ratio {ratio:.3} below minimum {min:.3}")]
    InlierRatio { ratio: f64, min: f64 },
}

/// Inlier gates applied after RANSAC convergence.
pub fn check_inlier_gates(
    num_inliers: usize,
    num_correspondences: usize,
    config: &VerificationConfig,
) -> Result<(), VerificationReject> {
    if num_inliers < config.min_inlier_count {
        return Err(VerificationReject::InlierCount {
            inliers: num_inliers,
            min: config.min_inlier_count,
        });
    }

    let ratio = num_inliers as f64 / num_correspondences as f64;
    if ratio < config.min_inlier_percentage {
        return Err(VerificationReject::InlierRatio {
            ratio,
            min: config.min_inlier_percentage,
        });
    }

    Ok(())
}

/// Verify a candidate whose both endpoint frames are resident.
///
/// On success the returned edge carries `T_src_dst` with `src` the query
/// vertex and `dst` the matched vertex, satisfying
/// `keypoints_dst ≈ T_src_dst · keypoints_src` on the inlier set.
pub fn verify_candidate(
    candidate: &PotentialEdge,
    frame_query: &VlcFrame,
    frame_match: &VlcFrame,
    config: &VerificationConfig,
) -> Result<VlcEdge, VerificationReject> {
    let (i_query, i_match) = match_descriptors(
        &frame_query.descriptors,
        &frame_match.descriptors,
        config.lowe_ratio,
    );

    let num_correspondences = i_query.len();
    if num_correspondences < 3 {
        return Err(VerificationReject::DegenerateMatch {
            count: num_correspondences,
        });
    }

    let points_query: Vec<_> = i_query.iter().map(|&i| frame_query.keypoints[i]).collect();
    let points_match: Vec<_> = i_match.iter().map(|&i| frame_match.keypoints[i]).collect();

    let ransac_config = ArunRansacConfig {
        max_iterations: config.max_ransac_iterations,
        inlier_threshold: config.ransac_threshold,
        ..Default::default()
    };

    let result = align_points_ransac(&points_query, &points_match, &ransac_config)
        .ok_or(VerificationReject::NoModel)?;

    check_inlier_gates(result.inliers.len(), num_correspondences, config)?;

    debug!(
        "verified {} with {}/{} inliers (mse {:.2e})",
        candidate,
        result.inliers.len(),
        num_correspondences,
        result.mse
    );

    Ok(VlcEdge::new(
        candidate.query,
        candidate.matched,
        result.transform,
    ))
}
