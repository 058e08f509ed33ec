//! Per-representation contributions of a constraint side to the MLCP.

use std::collections::HashMap;

use glam::DVec3;

use crate::{
    constraints::{data::ConstraintData, localization::Localization, ConstraintSide, ConstraintType},
    core::{
        representation::{Representation, RepresentationKind},
        rigidbody::RIGID_NUM_DOF,
    },
    dynamics::mlcp::MlcpPhysicsProblem,
    error::{PhysicsError, Result},
    utils::math::rotation_vector,
};

/// Everything a constraint side needs to write its rows.
pub struct BuildContext<'a> {
    pub dt: f64,
    pub representation: &'a Representation,
    pub localization: &'a Localization,
    /// First column of the representation in `H`.
    pub dof_offset: usize,
    /// First row of the constraint in `b` and `H`.
    pub row_offset: usize,
    pub side: ConstraintSide,
}

pub type BuildFn = fn(&BuildContext<'_>, &ConstraintData, &mut MlcpPhysicsProblem) -> Result<()>;

/// How one kind of representation takes part in one kind of constraint.
#[derive(Clone, Copy)]
pub struct ConstraintImplementation {
    pub representation: RepresentationKind,
    pub constraint: ConstraintType,
    build: BuildFn,
}

impl std::fmt::Debug for ConstraintImplementation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConstraintImplementation")
            .field("representation", &self.representation)
            .field("constraint", &self.constraint)
            .finish()
    }
}

impl ConstraintImplementation {
    pub fn new(representation: RepresentationKind, constraint: ConstraintType, build: BuildFn) -> Self {
        Self {
            representation,
            constraint,
            build,
        }
    }

    /// Adds the signed contribution of this side into `problem.b` and `problem.h`.
    pub fn build(
        &self,
        context: &BuildContext<'_>,
        data: &ConstraintData,
        problem: &mut MlcpPhysicsProblem,
    ) -> Result<()> {
        let rows = data.num_rows();
        if context.row_offset + rows > problem.num_rows() {
            return Err(PhysicsError::invalid_parameter(format!(
                "constraint rows {}..{} outside the {} rows of the problem",
                context.row_offset,
                context.row_offset + rows,
                problem.num_rows()
            )));
        }
        (self.build)(context, data, problem)
    }
}

/// Implementations keyed by representation kind and constraint type.
#[derive(Debug, Clone, Default)]
pub struct ConstraintImplementationRegistry {
    implementations: HashMap<(RepresentationKind, ConstraintType), ConstraintImplementation>,
}

impl ConstraintImplementationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry covering every constraint type on every representation kind, except
    /// orientation constraints on deformables, which have no orientation.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ConstraintImplementation::new(
            RepresentationKind::Fixed,
            ConstraintType::FixedRotationVector,
            build_fixed_rotation,
        ));
        registry.register(ConstraintImplementation::new(
            RepresentationKind::Rigid,
            ConstraintType::FixedRotationVector,
            build_rigid_rotation,
        ));
        for constraint in ConstraintType::ALL.into_iter().filter(|c| c.is_positional()) {
            registry.register(ConstraintImplementation::new(
                RepresentationKind::Fixed,
                constraint,
                build_fixed,
            ));
            registry.register(ConstraintImplementation::new(
                RepresentationKind::Rigid,
                constraint,
                build_rigid,
            ));
            registry.register(ConstraintImplementation::new(
                RepresentationKind::MassSpring,
                constraint,
                build_deformable,
            ));
            registry.register(ConstraintImplementation::new(
                RepresentationKind::Fem3D,
                constraint,
                build_deformable,
            ));
        }
        registry
    }

    /// Replaces any implementation registered for the same key.
    pub fn register(&mut self, implementation: ConstraintImplementation) {
        self.implementations.insert(
            (implementation.representation, implementation.constraint),
            implementation,
        );
    }

    pub fn get(
        &self,
        representation: RepresentationKind,
        constraint: ConstraintType,
    ) -> Result<&ConstraintImplementation> {
        self.implementations
            .get(&(representation, constraint))
            .ok_or_else(|| PhysicsError::ImplementationNotFound {
                representation: representation.to_string(),
                constraint: constraint.to_string(),
            })
    }
}

/// Adds `sign·(direction · P)` to every row, and the row offset on the positive side.
fn add_violation(context: &BuildContext<'_>, data: &ConstraintData, position: DVec3, problem: &mut MlcpPhysicsProblem) {
    let sign = context.side.sign();
    for (i, row) in data.rows().iter().enumerate() {
        let mut value = sign * row.direction.dot(position);
        if context.side == ConstraintSide::Positive {
            value += row.offset;
        }
        problem.b[context.row_offset + i] += value;
    }
}

fn build_fixed(context: &BuildContext<'_>, data: &ConstraintData, problem: &mut MlcpPhysicsProblem) -> Result<()> {
    let position = context.localization.position(context.representation)?;
    add_violation(context, data, position, problem);
    Ok(())
}

/// `H = sign·dt·[direction, GP × direction]` with `GP` the lever from the center of mass.
fn build_rigid(context: &BuildContext<'_>, data: &ConstraintData, problem: &mut MlcpPhysicsProblem) -> Result<()> {
    let Representation::Rigid(rigid) = context.representation else {
        return Err(PhysicsError::unsupported(format!(
            "rigid constraint built on {} representation '{}'",
            context.representation.kind(),
            context.representation.name()
        )));
    };
    check_columns(context, RIGID_NUM_DOF, problem)?;

    let position = context.localization.position(context.representation)?;
    add_violation(context, data, position, problem);

    let scale = context.side.sign() * context.dt;
    let lever = position - rigid.mass_center();
    for (i, row) in data.rows().iter().enumerate() {
        let angular = lever.cross(row.direction);
        let r = context.row_offset + i;
        for k in 0..3 {
            problem.h[(r, context.dof_offset + k)] += scale * row.direction[k];
            problem.h[(r, context.dof_offset + 3 + k)] += scale * angular[k];
        }
    }
    Ok(())
}

/// `H(node dofs) = sign·dt·wᵢ·direction` over the nodes of the localization.
fn build_deformable(context: &BuildContext<'_>, data: &ConstraintData, problem: &mut MlcpPhysicsProblem) -> Result<()> {
    let weighted_nodes: Vec<(usize, f64)> = match context.localization {
        Localization::Node { node, .. } => vec![(*node, 1.0)],
        Localization::Triangle {
            nodes, barycentric, ..
        } => nodes.iter().copied().zip(barycentric.to_array()).collect(),
        other => {
            return Err(PhysicsError::unsupported(format!(
                "{:?} cannot attach to {} representation '{}'",
                other,
                context.representation.kind(),
                context.representation.name()
            )))
        }
    };
    check_columns(context, context.representation.num_dof(), problem)?;

    let position = context.localization.position(context.representation)?;
    add_violation(context, data, position, problem);

    let scale = context.side.sign() * context.dt;
    for (i, row) in data.rows().iter().enumerate() {
        let r = context.row_offset + i;
        for &(node, weight) in &weighted_nodes {
            for k in 0..3 {
                problem.h[(r, context.dof_offset + 3 * node + k)] += scale * weight * row.direction[k];
            }
        }
    }
    Ok(())
}

fn build_fixed_rotation(
    context: &BuildContext<'_>,
    data: &ConstraintData,
    problem: &mut MlcpPhysicsProblem,
) -> Result<()> {
    let rotation = rotation_vector(context.representation.pose().rotation);
    add_violation(context, data, rotation, problem);
    Ok(())
}

/// `H = sign·dt·I` on the angular columns, `ω` being expressed in world frame.
fn build_rigid_rotation(
    context: &BuildContext<'_>,
    data: &ConstraintData,
    problem: &mut MlcpPhysicsProblem,
) -> Result<()> {
    if context.representation.kind() != RepresentationKind::Rigid {
        return Err(PhysicsError::unsupported(format!(
            "rigid rotation constraint built on {} representation '{}'",
            context.representation.kind(),
            context.representation.name()
        )));
    }
    check_columns(context, RIGID_NUM_DOF, problem)?;

    let rotation = rotation_vector(context.representation.pose().rotation);
    add_violation(context, data, rotation, problem);

    let scale = context.side.sign() * context.dt;
    for (i, row) in data.rows().iter().enumerate() {
        for k in 0..3 {
            problem.h[(context.row_offset + i, context.dof_offset + 3 + k)] += scale * row.direction[k];
        }
    }
    Ok(())
}

fn check_columns(context: &BuildContext<'_>, num_dof: usize, problem: &MlcpPhysicsProblem) -> Result<()> {
    if context.dof_offset + num_dof > problem.num_dof() {
        return Err(PhysicsError::invalid_parameter(format!(
            "columns {}..{} outside the {} DOF of the problem",
            context.dof_offset,
            context.dof_offset + num_dof,
            problem.num_dof()
        )));
    }
    Ok(())
}
