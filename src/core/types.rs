use glam::{DMat3, DQuat, DVec3};
use serde::{Deserialize, Serialize};

/// Rigid transform: rotation followed by translation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub translation: DVec3,
    pub rotation: DQuat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        translation: DVec3::ZERO,
        rotation: DQuat::IDENTITY,
    };

    pub fn new(translation: DVec3, rotation: DQuat) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn from_translation(translation: DVec3) -> Self {
        Self::new(translation, DQuat::IDENTITY)
    }

    pub fn transform_point(&self, point: DVec3) -> DVec3 {
        self.rotation * point + self.translation
    }

    pub fn transform_vector(&self, vector: DVec3) -> DVec3 {
        self.rotation * vector
    }

    pub fn inverse(&self) -> Pose {
        let rotation = self.rotation.inverse();
        Pose {
            translation: -(rotation * self.translation),
            rotation,
        }
    }

    /// Composition `self * other`: applies `other` first.
    pub fn combine(&self, other: &Pose) -> Pose {
        Pose {
            translation: self.transform_point(other.translation),
            rotation: (self.rotation * other.rotation).normalize(),
        }
    }

    /// Linear interpolation of the translation and spherical interpolation of the rotation.
    pub fn interpolate(start: &Pose, end: &Pose, t: f64) -> Pose {
        Pose {
            translation: start.translation.lerp(end.translation, t),
            rotation: start.rotation.slerp(end.rotation, t),
        }
    }

    pub fn rotation_matrix(&self) -> DMat3 {
        DMat3::from_quat(self.rotation)
    }

    pub fn abs_diff_eq(&self, other: &Pose, epsilon: f64) -> bool {
        self.translation.abs_diff_eq(other.translation, epsilon)
            && (self.rotation.abs_diff_eq(other.rotation, epsilon)
                || self.rotation.abs_diff_eq(-other.rotation, epsilon))
    }
}

/// Linear and angular velocity of a rigid representation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    pub linear: DVec3,
    pub angular: DVec3,
}

/// Mass, local center of mass and inertia about that center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassProperties {
    pub mass: f64,
    pub center: DVec3,
    pub inertia: DMat3,
}

impl Default for MassProperties {
    fn default() -> Self {
        Self {
            mass: 1.0,
            center: DVec3::ZERO,
            inertia: DMat3::IDENTITY,
        }
    }
}

impl MassProperties {
    /// Inertia about the center of mass expressed in world axes.
    pub fn world_inertia(&self, rotation: DQuat) -> DMat3 {
        let r = DMat3::from_quat(rotation);
        r * self.inertia * r.transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn pose_inverse_round_trips_points() {
        let pose = Pose::new(
            DVec3::new(1.0, 2.0, 3.0),
            DQuat::from_axis_angle(DVec3::Y, 0.7),
        );
        let point = DVec3::new(-0.5, 4.0, 2.0);
        let back = pose.inverse().transform_point(pose.transform_point(point));
        assert_relative_eq!(back.x, point.x, epsilon = 1e-12);
        assert_relative_eq!(back.y, point.y, epsilon = 1e-12);
        assert_relative_eq!(back.z, point.z, epsilon = 1e-12);
    }

    #[test]
    fn interpolation_midpoint() {
        let start = Pose::from_translation(DVec3::new(1.0, 2.0, 3.0));
        let end = Pose::from_translation(DVec3::new(3.0, 2.0, 1.0));
        let mid = Pose::interpolate(&start, &end, 0.5);
        assert!(mid.abs_diff_eq(&Pose::from_translation(DVec3::splat(2.0)), 1e-12));
    }
}
