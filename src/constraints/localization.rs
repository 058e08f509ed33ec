use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::{
    core::representation::Representation,
    error::{PhysicsError, Result},
    utils::allocator::EntityId,
};

/// Point attached to a representation, tracked as the representation moves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Localization {
    /// Offset in the frame of a fixed representation.
    Fixed {
        representation: EntityId,
        local_position: DVec3,
    },
    /// Offset in the frame of a rigid representation.
    Rigid {
        representation: EntityId,
        local_position: DVec3,
    },
    Node {
        representation: EntityId,
        node: usize,
    },
    /// Barycentric point of a surface triangle, over node indices.
    Triangle {
        representation: EntityId,
        nodes: [usize; 3],
        barycentric: DVec3,
    },
}

impl Localization {
    pub fn representation(&self) -> EntityId {
        match self {
            Localization::Fixed { representation, .. }
            | Localization::Rigid { representation, .. }
            | Localization::Node { representation, .. }
            | Localization::Triangle { representation, .. } => *representation,
        }
    }

    /// Current world position on `representation`.
    pub fn position(&self, representation: &Representation) -> Result<DVec3> {
        match (self, representation) {
            (Localization::Fixed { local_position, .. }, Representation::Fixed(fixed)) => {
                Ok(fixed.pose().transform_point(*local_position))
            }
            (Localization::Rigid { local_position, .. }, Representation::Rigid(rigid)) => {
                Ok(rigid.pose().transform_point(*local_position))
            }
            (Localization::Node { node, .. }, _) => {
                let positions = representation.node_positions();
                positions.get(*node).copied().ok_or(PhysicsError::NodeOutOfRange {
                    node: *node,
                    num_nodes: positions.len(),
                })
            }
            (
                Localization::Triangle {
                    nodes, barycentric, ..
                },
                _,
            ) => {
                let positions = representation.node_positions();
                let mut point = DVec3::ZERO;
                for (&node, weight) in nodes.iter().zip(barycentric.to_array()) {
                    let position = positions.get(node).ok_or(PhysicsError::NodeOutOfRange {
                        node,
                        num_nodes: positions.len(),
                    })?;
                    point += *position * weight;
                }
                Ok(point)
            }
            _ => Err(self.mismatch(representation)),
        }
    }

    /// Current world velocity of the attached point.
    pub fn velocity(&self, representation: &Representation) -> Result<DVec3> {
        match (self, representation) {
            (Localization::Fixed { .. }, Representation::Fixed(_)) => Ok(DVec3::ZERO),
            (Localization::Rigid { local_position, .. }, Representation::Rigid(rigid)) => {
                let velocity = rigid.velocity();
                let lever = rigid.pose().transform_point(*local_position) - rigid.mass_center();
                Ok(velocity.linear + velocity.angular.cross(lever))
            }
            (Localization::Node { node, .. }, _) => {
                node_velocities(representation, &[*node], &[1.0])
            }
            (
                Localization::Triangle {
                    nodes, barycentric, ..
                },
                _,
            ) => node_velocities(representation, nodes, &barycentric.to_array()),
            _ => Err(self.mismatch(representation)),
        }
    }

    fn mismatch(&self, representation: &Representation) -> PhysicsError {
        PhysicsError::unsupported(format!(
            "localization {:?} does not apply to {} representation '{}'",
            self,
            representation.kind(),
            representation.name()
        ))
    }
}

fn node_velocities(
    representation: &Representation,
    nodes: &[usize],
    weights: &[f64],
) -> Result<DVec3> {
    let state = match representation {
        Representation::MassSpring(r) => r.core()?.current_state(),
        Representation::Fem3D(r) => r.core().current_state(),
        _ => {
            return Err(PhysicsError::unsupported(format!(
                "{} representation '{}' has no nodes",
                representation.kind(),
                representation.name()
            )))
        }
    };
    let mut velocity = DVec3::ZERO;
    for (&node, &weight) in nodes.iter().zip(weights) {
        if node >= state.num_nodes() {
            return Err(PhysicsError::NodeOutOfRange {
                node,
                num_nodes: state.num_nodes(),
            });
        }
        velocity += state.velocity(node) * weight;
    }
    Ok(velocity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        mass_spring::{MassSpringParameters, MassSpringRepresentation},
        types::Pose,
    };
    use approx::assert_relative_eq;

    #[test]
    fn triangle_localization_interpolates_nodes() {
        let cloth = MassSpringRepresentation::grid_2d(
            "cloth",
            [DVec3::ZERO, DVec3::X, DVec3::new(1.0, 0.0, 1.0), DVec3::Z],
            [2, 2],
            &[],
            MassSpringParameters::default(),
        )
        .expect("valid grid");
        let representation = Representation::from(cloth);
        let localization = Localization::Triangle {
            representation: EntityId::from_index(0),
            nodes: [0, 1, 3],
            barycentric: DVec3::new(0.5, 0.25, 0.25),
        };
        let position = localization.position(&representation).expect("nodes exist");
        assert_relative_eq!(position.x, 0.5, epsilon = 1e-12);
        assert_relative_eq!(position.z, 0.25, epsilon = 1e-12);
        assert_eq!(
            localization.velocity(&representation).expect("nodes exist"),
            DVec3::ZERO
        );
    }

    #[test]
    fn rigid_localization_on_fixed_representation_is_rejected() {
        let representation = Representation::from(
            crate::core::fixed::FixedRepresentation::new("floor", Pose::IDENTITY),
        );
        let localization = Localization::Rigid {
            representation: EntityId::from_index(0),
            local_position: DVec3::ZERO,
        };
        assert!(localization.position(&representation).is_err());
    }
}
