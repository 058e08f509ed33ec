//! Closed set of physics representations handled by the pipeline.

use std::fmt;

use glam::DVec3;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{
    collision::contact::Location,
    constraints::localization::Localization,
    core::{
        fem3d::Fem3DRepresentation, fixed::FixedRepresentation,
        mass_spring::MassSpringRepresentation, rigidbody::RigidRepresentation, shapes::Shape,
        types::Pose,
    },
    error::{PhysicsError, Result},
    utils::allocator::EntityId,
};

/// Key of the constraint implementation registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RepresentationKind {
    Fixed,
    Rigid,
    MassSpring,
    Fem3D,
}

impl fmt::Display for RepresentationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RepresentationKind::Fixed => "fixed",
            RepresentationKind::Rigid => "rigid",
            RepresentationKind::MassSpring => "mass-spring",
            RepresentationKind::Fem3D => "fem3d",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum Representation {
    Fixed(FixedRepresentation),
    Rigid(RigidRepresentation),
    MassSpring(MassSpringRepresentation),
    Fem3D(Fem3DRepresentation),
}

impl From<FixedRepresentation> for Representation {
    fn from(value: FixedRepresentation) -> Self {
        Representation::Fixed(value)
    }
}

impl From<RigidRepresentation> for Representation {
    fn from(value: RigidRepresentation) -> Self {
        Representation::Rigid(value)
    }
}

impl From<MassSpringRepresentation> for Representation {
    fn from(value: MassSpringRepresentation) -> Self {
        Representation::MassSpring(value)
    }
}

impl From<Fem3DRepresentation> for Representation {
    fn from(value: Fem3DRepresentation) -> Self {
        Representation::Fem3D(value)
    }
}

impl Representation {
    pub fn kind(&self) -> RepresentationKind {
        match self {
            Representation::Fixed(_) => RepresentationKind::Fixed,
            Representation::Rigid(_) => RepresentationKind::Rigid,
            Representation::MassSpring(_) => RepresentationKind::MassSpring,
            Representation::Fem3D(_) => RepresentationKind::Fem3D,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Representation::Fixed(r) => &r.name,
            Representation::Rigid(r) => &r.name,
            Representation::MassSpring(r) => &r.name,
            Representation::Fem3D(r) => &r.name,
        }
    }

    pub fn is_active(&self) -> bool {
        match self {
            Representation::Fixed(r) => r.is_active,
            Representation::Rigid(r) => r.is_active,
            Representation::MassSpring(r) => r.is_active,
            Representation::Fem3D(r) => r.is_active,
        }
    }

    pub fn set_active(&mut self, active: bool) {
        match self {
            Representation::Fixed(r) => r.is_active = active,
            Representation::Rigid(r) => r.is_active = active,
            Representation::MassSpring(r) => r.is_active = active,
            Representation::Fem3D(r) => r.is_active = active,
        }
    }

    /// World pose; deformables live in world coordinates and report the identity.
    pub fn pose(&self) -> Pose {
        match self {
            Representation::Fixed(r) => r.pose(),
            Representation::Rigid(r) => r.pose(),
            Representation::MassSpring(_) | Representation::Fem3D(_) => Pose::IDENTITY,
        }
    }

    pub fn previous_pose(&self) -> Pose {
        match self {
            Representation::Fixed(r) => r.previous_pose(),
            Representation::Rigid(r) => r.previous_state().pose,
            Representation::MassSpring(_) | Representation::Fem3D(_) => Pose::IDENTITY,
        }
    }

    /// Returns `false` for representations whose pose is not a free parameter.
    pub fn set_pose(&mut self, pose: Pose) -> bool {
        match self {
            Representation::Fixed(r) => {
                r.set_pose(pose);
                true
            }
            Representation::Rigid(r) => {
                r.set_pose(pose);
                true
            }
            Representation::MassSpring(_) | Representation::Fem3D(_) => false,
        }
    }

    pub fn num_dof(&self) -> usize {
        match self {
            Representation::Fixed(_) => 0,
            Representation::Rigid(_) => crate::core::rigidbody::RIGID_NUM_DOF,
            Representation::MassSpring(r) => r.num_dof(),
            Representation::Fem3D(r) => r.core().num_dof(),
        }
    }

    /// Node positions of deformables, empty otherwise.
    pub fn node_positions(&self) -> Vec<DVec3> {
        match self {
            Representation::Fixed(_) | Representation::Rigid(_) => Vec::new(),
            Representation::MassSpring(r) => r
                .core()
                .map(|core| core.node_positions())
                .unwrap_or_default(),
            Representation::Fem3D(r) => r.core().node_positions(),
        }
    }

    pub fn before_update(&mut self) {
        match self {
            Representation::Fixed(r) => r.before_update(),
            Representation::Rigid(r) => r.before_update(),
            Representation::MassSpring(_) | Representation::Fem3D(_) => {}
        }
    }

    /// Motion without constraints over `dt`.
    pub fn free_motion(&mut self, dt: f64, gravity: DVec3) -> Result<()> {
        match self {
            Representation::Fixed(_) => Ok(()),
            Representation::Rigid(r) => r.free_motion(dt, gravity),
            Representation::MassSpring(r) => r.free_motion(dt, gravity),
            Representation::Fem3D(r) => r.free_motion(dt, gravity),
        }
    }

    /// Compliance of the last free motion, `None` for representations without DOF.
    pub fn compliance(&self) -> Option<&DMatrix<f64>> {
        let compliance = match self {
            Representation::Fixed(_) => return None,
            Representation::Rigid(r) => r.compliance(),
            Representation::MassSpring(r) => r.core().ok()?.compliance(),
            Representation::Fem3D(r) => r.core().compliance(),
        };
        (compliance.nrows() == self.num_dof() && compliance.nrows() > 0).then_some(compliance)
    }

    /// Applies this representation's slice of the MLCP DOF correction.
    pub fn apply_correction(&mut self, dt: f64, delta: &DVector<f64>) -> Result<()> {
        match self {
            Representation::Fixed(_) => Ok(()),
            Representation::Rigid(r) => r.apply_correction(dt, delta),
            Representation::MassSpring(r) => r.core_mut()?.apply_correction(dt, delta),
            Representation::Fem3D(r) => r.core_mut().apply_correction(dt, delta),
        }
    }

    /// Force for the next free motion.
    ///
    /// Rigid bodies take `force` at the center of mass plus `torque`; deformables take
    /// `force` on `node`, or spread over every node when `node` is `None`.
    pub fn apply_external_force(
        &mut self,
        force: DVec3,
        torque: DVec3,
        node: Option<usize>,
    ) -> Result<()> {
        match self {
            Representation::Fixed(r) => Err(PhysicsError::invalid_parameter(format!(
                "fixed representation '{}' cannot take forces",
                r.name
            ))),
            Representation::Rigid(r) => {
                r.add_external_generalized_force(force, torque);
                Ok(())
            }
            Representation::MassSpring(r) => r.add_external_force(node, force),
            Representation::Fem3D(r) => r.add_external_force(node, force),
        }
    }

    /// Collision geometry refreshed from the current nodes, `None` for representations whose
    /// shape does not deform.
    pub fn deformed_collision_shape(&self) -> Result<Option<Shape>> {
        match self {
            Representation::Fixed(_) | Representation::Rigid(_) => Ok(None),
            Representation::MassSpring(r) => r.collision_shape().map(Some),
            Representation::Fem3D(r) => r.collision_shape().map(Some),
        }
    }

    /// Attachment point of a contact location on this representation.
    pub fn create_localization(&self, handle: EntityId, location: &Location) -> Result<Localization> {
        match self {
            Representation::Fixed(r) => Ok(Localization::Fixed {
                representation: handle,
                local_position: local_position(&r.pose(), location),
            }),
            Representation::Rigid(r) => Ok(Localization::Rigid {
                representation: handle,
                local_position: local_position(&r.pose(), location),
            }),
            Representation::MassSpring(r) => {
                deformable_localization(handle, location, r.triangles(), r.num_dof() / 3)
            }
            Representation::Fem3D(r) => {
                deformable_localization(handle, location, r.surface(), r.core().num_nodes())
            }
        }
    }
}

fn local_position(pose: &Pose, location: &Location) -> DVec3 {
    location
        .rigid_local_position
        .unwrap_or_else(|| pose.inverse().transform_point(location.global_position))
}

fn deformable_localization(
    handle: EntityId,
    location: &Location,
    triangles: &[[usize; 3]],
    num_nodes: usize,
) -> Result<Localization> {
    if let Some(triangle) = &location.triangle {
        let nodes = triangles.get(triangle.index).copied().ok_or_else(|| {
            PhysicsError::unsupported(format!(
                "triangle {} is not on the surface ({} triangles)",
                triangle.index,
                triangles.len()
            ))
        })?;
        return Ok(Localization::Triangle {
            representation: handle,
            nodes,
            barycentric: triangle.coordinate,
        });
    }
    if let Some(node) = location.node {
        if node >= num_nodes {
            return Err(PhysicsError::NodeOutOfRange { node, num_nodes });
        }
        return Ok(Localization::Node {
            representation: handle,
            node,
        });
    }
    Err(PhysicsError::unsupported(
        "deformable locations need a node or a triangle",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::core::rigidbody::RigidParameters;

    #[test]
    fn rigid_localization_uses_the_body_frame() {
        let pose = Pose::from_translation(DVec3::new(0.0, 2.0, 0.0));
        let rigid = RigidRepresentation::new(
            "ball",
            Arc::new(Shape::sphere(0.5)),
            RigidParameters::default(),
            pose,
        )
        .expect("valid rigid");
        let representation = Representation::from(rigid);
        let handle = EntityId::from_index(4);
        let localization = representation
            .create_localization(handle, &Location::new(DVec3::new(0.0, 1.5, 0.0)))
            .expect("rigid localization");
        assert_eq!(
            localization,
            Localization::Rigid {
                representation: handle,
                local_position: DVec3::new(0.0, -0.5, 0.0),
            }
        );
    }

    #[test]
    fn fixed_representation_has_no_compliance() {
        let representation = Representation::from(FixedRepresentation::new("floor", Pose::IDENTITY));
        assert_eq!(representation.num_dof(), 0);
        assert!(representation.compliance().is_none());
        assert!(representation.node_positions().is_empty());
    }
}
