//! Rigid-body alignment of 3D point correspondences with RANSAC.
//!
//! Solves the absolute-orientation problem on minimal 3-point samples
//! (Arun's closed form via SVD), counts inliers by point-to-point distance,
//! and refines the winning model on its full inlier set.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use rand::prelude::*;

use super::SE3;

/// Configuration for the alignment RANSAC.
#[derive(Debug, Clone)]
pub struct ArunRansacConfig {
    /// Maximum number of RANSAC iterations.
    pub max_iterations: usize,
    /// Inlier threshold in meters (point-to-point error).
    pub inlier_threshold: f64,
    /// Probability of finding an uncontaminated sample; drives adaptive
    /// early termination.
    pub probability: f64,
}

impl Default for ArunRansacConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            inlier_threshold: 0.1,
            probability: 0.99,
        }
    }
}

/// Result of a successful RANSAC run.
#[derive(Debug, Clone)]
pub struct ArunRansacResult {
    /// Estimated transform T with points2 ≈ T · points1.
    pub transform: SE3,
    /// Indices of inlier correspondences.
    pub inliers: Vec<usize>,
    /// Mean squared error over the inliers.
    pub mse: f64,
}

/// Estimate the rigid transform T such that `points2 ≈ T · points1`.
///
/// Returns `None` when fewer than 3 correspondences are given or no sample
/// produces a model with at least 3 inliers.
pub fn align_points_ransac(
    points1: &[Vector3<f64>],
    points2: &[Vector3<f64>],
    config: &ArunRansacConfig,
) -> Option<ArunRansacResult> {
    let n = points1.len();
    if n < 3 || n != points2.len() {
        return None;
    }

    let mut rng = rand::thread_rng();
    let mut best_result: Option<ArunRansacResult> = None;
    let mut best_inliers = 0;
    let mut max_iter = config.max_iterations.max(1);

    let mut iteration = 0;
    while iteration < max_iter {
        let indices = sample_three_indices(&mut rng, n);

        let sample_pts1: Vec<_> = indices.iter().map(|&i| points1[i]).collect();
        let sample_pts2: Vec<_> = indices.iter().map(|&i| points2[i]).collect();

        if let Some(transform) = solve_arun(&sample_pts1, &sample_pts2) {
            let (inliers, mse) =
                find_inliers(points1, points2, &transform, config.inlier_threshold);

            if inliers.len() > best_inliers {
                best_inliers = inliers.len();

                // Update adaptive iteration count before moving the inliers.
                let inlier_ratio = best_inliers as f64 / n as f64;
                let updated_iter =
                    compute_adaptive_iterations(inlier_ratio, config.probability, 3);
                max_iter = max_iter.min(iteration.saturating_add(1).saturating_add(updated_iter));

                best_result = Some(ArunRansacResult {
                    transform,
                    inliers,
                    mse,
                });
            }
        }

        iteration += 1;
    }

    // Refine with the full inlier set.
    if let Some(ref mut result) = best_result {
        let inlier_pts1: Vec<_> = result.inliers.iter().map(|&i| points1[i]).collect();
        let inlier_pts2: Vec<_> = result.inliers.iter().map(|&i| points2[i]).collect();

        if let Some(refined) = solve_arun(&inlier_pts1, &inlier_pts2) {
            let (new_inliers, new_mse) =
                find_inliers(points1, points2, &refined, config.inlier_threshold);
            if new_inliers.len() >= result.inliers.len() {
                result.transform = refined;
                result.inliers = new_inliers;
                result.mse = new_mse;
            }
        }
    }

    best_result.filter(|r| r.inliers.len() >= 3)
}

/// Closed-form rigid alignment (Arun et al.): centroids, cross-covariance,
/// rotation via SVD with reflection handling, then t = c2 - R * c1.
fn solve_arun(points1: &[Vector3<f64>], points2: &[Vector3<f64>]) -> Option<SE3> {
    let n = points1.len();
    if n < 3 {
        return None;
    }

    let centroid1 = compute_centroid(points1);
    let centroid2 = compute_centroid(points2);

    let centered1: Vec<_> = points1.iter().map(|p| p - centroid1).collect();
    let centered2: Vec<_> = points2.iter().map(|p| p - centroid2).collect();

    // Cross-covariance: H = sum(p1_i * p2_i^T)
    let mut h = Matrix3::zeros();
    for i in 0..n {
        h += centered1[i] * centered2[i].transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;

    // R = V * U^T
    let mut rotation_mat = v_t.transpose() * u.transpose();

    // Reflection case (det(R) = -1): flip the sign of the last column of V.
    if rotation_mat.determinant() < 0.0 {
        let mut v = v_t.transpose();
        for i in 0..3 {
            v[(i, 2)] = -v[(i, 2)];
        }
        rotation_mat = v * u.transpose();
    }

    let rotation =
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation_mat));
    let translation = centroid2 - rotation * centroid1;

    Some(SE3 {
        rotation,
        translation,
    })
}

fn compute_centroid(points: &[Vector3<f64>]) -> Vector3<f64> {
    if points.is_empty() {
        return Vector3::zeros();
    }
    let sum: Vector3<f64> = points.iter().sum();
    sum / points.len() as f64
}

/// Inliers of a candidate transform, with their mean squared error.
fn find_inliers(
    points1: &[Vector3<f64>],
    points2: &[Vector3<f64>],
    transform: &SE3,
    threshold: f64,
) -> (Vec<usize>, f64) {
    let threshold_sq = threshold * threshold;
    let mut inliers = Vec::new();
    let mut sum_sq_error = 0.0;

    for (i, (p1, p2)) in points1.iter().zip(points2.iter()).enumerate() {
        let error_sq = (transform.transform_point(p1) - p2).norm_squared();
        if error_sq < threshold_sq {
            inliers.push(i);
            sum_sq_error += error_sq;
        }
    }

    let mse = if inliers.is_empty() {
        f64::INFINITY
    } else {
        sum_sq_error / inliers.len() as f64
    };

    (inliers, mse)
}

/// Sample three unique random indices.
fn sample_three_indices(rng: &mut impl Rng, n: usize) -> [usize; 3] {
    let mut indices = [0usize; 3];
    indices[0] = rng.gen_range(0..n);

    loop {
        indices[1] = rng.gen_range(0..n);
        if indices[1] != indices[0] {
            break;
        }
    }

    loop {
        indices[2] = rng.gen_range(0..n);
        if indices[2] != indices[0] && indices[2] != indices[1] {
            break;
        }
    }

    indices
}

/// k = log(1 - p) / log(1 - w^n) for inlier ratio w and sample size n.
fn compute_adaptive_iterations(inlier_ratio: f64, probability: f64, sample_size: usize) -> usize {
    if inlier_ratio <= 0.0 {
        return usize::MAX;
    }
    if inlier_ratio >= 1.0 {
        return 1;
    }

    let w_n = inlier_ratio.powi(sample_size as i32);
    let log_denom = (1.0 - w_n).ln();

    if log_denom.abs() < 1e-10 {
        return 1;
    }

    let k = (1.0 - probability).ln() / log_denom;
    (k.ceil() as usize).max(1)
}
