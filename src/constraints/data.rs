use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::{
    constraints::ConstraintType, dynamics::mlcp::MlcpConstraintType,
    utils::math::orthonormal_basis,
};

/// Physical parameters of one constraint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConstraintData {
    /// Non-penetration along `normal`, the direction in which the positive side separates.
    Contact { normal: DVec3, distance: f64 },
    /// Non-penetration with Coulomb friction in the tangent plane.
    FrictionalContact {
        normal: DVec3,
        distance: f64,
        friction: f64,
    },
    /// Both attachment points coincide.
    FixedPoint,
    /// The positive attachment point stays on the line through `point` along `direction`.
    ///
    /// `point` is measured from the negative attachment point.
    Sliding { point: DVec3, direction: DVec3 },
    /// The rotation vector of the positive side minus the one of the negative side stays at
    /// `target`. Only holds for small relative rotations.
    FixedRotationVector { target: DVec3 },
}

/// One MLCP row: `b += sign·(direction · P)`, plus `offset` on the positive side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintRow {
    pub direction: DVec3,
    pub offset: f64,
}

impl ConstraintRow {
    fn new(direction: DVec3, offset: f64) -> Self {
        Self { direction, offset }
    }
}

impl ConstraintData {
    pub fn contact(normal: DVec3) -> Self {
        ConstraintData::Contact {
            normal,
            distance: 0.0,
        }
    }

    pub fn frictional_contact(normal: DVec3, friction: f64) -> Self {
        ConstraintData::FrictionalContact {
            normal,
            distance: 0.0,
            friction,
        }
    }

    pub fn sliding(point: DVec3, direction: DVec3) -> Self {
        ConstraintData::Sliding {
            point,
            direction: direction.normalize_or_zero(),
        }
    }

    pub fn fixed_rotation_vector(target: DVec3) -> Self {
        ConstraintData::FixedRotationVector { target }
    }

    pub fn constraint_type(&self) -> ConstraintType {
        match self {
            ConstraintData::Contact { .. } => ConstraintType::Contact,
            ConstraintData::FrictionalContact { .. } => ConstraintType::FrictionalContact,
            ConstraintData::FixedPoint => ConstraintType::FixedPoint,
            ConstraintData::Sliding { .. } => ConstraintType::Sliding,
            ConstraintData::FixedRotationVector { .. } => ConstraintType::FixedRotationVector,
        }
    }

    pub fn mlcp_type(&self) -> MlcpConstraintType {
        match self {
            ConstraintData::Contact { .. } => MlcpConstraintType::Unilateral,
            ConstraintData::FrictionalContact { .. } => MlcpConstraintType::UnilateralFrictional,
            ConstraintData::FixedPoint | ConstraintData::FixedRotationVector { .. } => {
                MlcpConstraintType::Bilateral3D
            }
            ConstraintData::Sliding { .. } => MlcpConstraintType::Bilateral2D,
        }
    }

    pub fn num_rows(&self) -> usize {
        self.mlcp_type().num_rows()
    }

    /// Friction coefficient of the MLCP block.
    pub fn mu(&self) -> f64 {
        match self {
            ConstraintData::FrictionalContact { friction, .. } => *friction,
            _ => 0.0,
        }
    }

    /// Row directions and positive-side offsets, in MLCP row order.
    ///
    /// Rotation vector rows project the rotation vector of each side instead of its
    /// attachment point.
    pub fn rows(&self) -> Vec<ConstraintRow> {
        match *self {
            ConstraintData::Contact { normal, distance } => vec![ConstraintRow::new(normal, distance)],
            ConstraintData::FrictionalContact {
                normal, distance, ..
            } => {
                let (t1, t2) = orthonormal_basis(normal);
                vec![
                    ConstraintRow::new(normal, distance),
                    ConstraintRow::new(t1, 0.0),
                    ConstraintRow::new(t2, 0.0),
                ]
            }
            ConstraintData::FixedPoint => [DVec3::X, DVec3::Y, DVec3::Z]
                .into_iter()
                .map(|axis| ConstraintRow::new(axis, 0.0))
                .collect(),
            ConstraintData::FixedRotationVector { target } => [DVec3::X, DVec3::Y, DVec3::Z]
                .into_iter()
                .map(|axis| ConstraintRow::new(axis, -axis.dot(target)))
                .collect(),
            ConstraintData::Sliding { point, direction } => {
                let (n1, n2) = orthonormal_basis(direction);
                vec![
                    ConstraintRow::new(n1, -n1.dot(point)),
                    ConstraintRow::new(n2, -n2.dot(point)),
                ]
            }
        }
    }
}
