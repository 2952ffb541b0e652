//! SE3: 6-DOF rigid-body transformation (rotation + translation).
//!
//! Relative poses between pose-graph vertices are rigid: depth is observable
//! on every robot, so there is no scale degree of freedom to estimate.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

/// Rigid-body transformation: p' = R * p + t.
#[derive(Debug, Clone, PartialEq)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    /// Identity transformation.
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Construct from a rotation matrix and translation.
    pub fn from_rt(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        let rot3 = Rotation3::from_matrix_unchecked(rotation);
        Self {
            rotation: UnitQuaternion::from_rotation_matrix(&rot3),
            translation,
        }
    }

    /// Construct from quaternion components (w-first) and translation.
    pub fn from_quaternion(qw: f64, qx: f64, qy: f64, qz: f64, translation: Vector3<f64>) -> Self {
        let rotation =
            UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(qw, qx, qy, qz));
        Self {
            rotation,
            translation,
        }
    }

    /// Inverse transformation: T^{-1} = [R^T | -R^T*t].
    pub fn inverse(&self) -> Self {
        let rot_inv = self.rotation.inverse();
        Self {
            rotation: rot_inv,
            translation: -(rot_inv * self.translation),
        }
    }

    /// Compose two transforms: self ∘ other.
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// Transform a single point: p' = R * p + t.
    pub fn transform_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    /// Get the rotation matrix.
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// Quaternion components in (x, y, z, w) order, as serialized in the
    /// debug log and the published edge message.
    pub fn quaternion_xyzw(&self) -> [f64; 4] {
        let q = self.rotation.quaternion();
        [q.i, q.j, q.k, q.w]
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_transform() {
        let t = SE3::identity();
        let p = Vector3::new(1.0, -2.0, 3.0);
        assert_relative_eq!(t.transform_point(&p), p, epsilon = 1e-12);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let rotation = UnitQuaternion::from_axis_angle(
            &nalgebra::Unit::new_normalize(Vector3::new(1.0, 2.0, -1.0)),
            0.7,
        );
        let t = SE3 {
            rotation,
            translation: Vector3::new(0.5, -1.5, 2.0),
        };

        let roundtrip = t.compose(&t.inverse());
        assert_relative_eq!(roundtrip.translation.norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(roundtrip.rotation.angle(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_compose_matches_sequential_transform() {
        let a = SE3 {
            rotation: UnitQuaternion::from_axis_angle(
                &nalgebra::Unit::new_normalize(Vector3::new(0.0, 0.0, 1.0)),
                std::f64::consts::FRAC_PI_2,
            ),
            translation: Vector3::new(1.0, 0.0, 0.0),
        };
        let b = SE3 {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::new(0.0, 2.0, 0.0),
        };

        let p = Vector3::new(1.0, 1.0, 1.0);
        let composed = a.compose(&b);
        assert_relative_eq!(
            composed.transform_point(&p),
            a.transform_point(&b.transform_point(&p)),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_quaternion_xyzw_identity() {
        let q = SE3::identity().quaternion_xyzw();
        assert_relative_eq!(q[0], 0.0);
        assert_relative_eq!(q[1], 0.0);
        assert_relative_eq!(q[2], 0.0);
        assert_relative_eq!(q[3], 1.0);
    }
}
