//! State shared by every node-based representation: the rest, previous and current
//! [`OdeState`]s and the solver integrating them.

use glam::DVec3;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{
    dynamics::{
        linear_solver::LinearSolverKind,
        ode_solver::{IntegrationScheme, OdeEquation, OdeSolver},
        ode_state::OdeState,
    },
    error::{PhysicsError, Result},
    utils::math::add_node_vec3,
};

/// Damping proportional to the mass and stiffness matrices: `D = α·M + β·K`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RayleighDamping {
    pub mass_coefficient: f64,
    pub stiffness_coefficient: f64,
}

impl RayleighDamping {
    pub fn is_zero(&self) -> bool {
        self.mass_coefficient == 0.0 && self.stiffness_coefficient == 0.0
    }

    /// `α·M + β·K`.
    pub fn matrix(&self, mass: &DMatrix<f64>, stiffness: &DMatrix<f64>) -> DMatrix<f64> {
        mass * self.mass_coefficient + stiffness * self.stiffness_coefficient
    }
}

/// Loads applied on top of the model forces during the next free motion only.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalLoads {
    forces: DVector<f64>,
    is_empty: bool,
}

impl ExternalLoads {
    pub fn new(num_dof: usize) -> Self {
        Self {
            forces: DVector::zeros(num_dof),
            is_empty: true,
        }
    }

    /// Adds `force` on `node` (3 DOF per node).
    pub fn add_node_force(&mut self, node: usize, force: DVec3) -> Result<()> {
        let num_nodes = self.forces.len() / 3;
        if node >= num_nodes {
            return Err(PhysicsError::NodeOutOfRange { node, num_nodes });
        }
        add_node_vec3(&mut self.forces, 3, node, force);
        self.is_empty = false;
        Ok(())
    }

    /// Spreads `force` evenly over every node.
    pub fn add_distributed_force(&mut self, force: DVec3) {
        let num_nodes = self.forces.len() / 3;
        if num_nodes == 0 {
            return;
        }
        let share = force / num_nodes as f64;
        for node in 0..num_nodes {
            add_node_vec3(&mut self.forces, 3, node, share);
        }
        self.is_empty = false;
    }

    pub fn add_to(&self, f: &mut DVector<f64>) {
        if !self.is_empty {
            *f += &self.forces;
        }
    }

    pub fn clear(&mut self) {
        if !self.is_empty {
            self.forces.fill(0.0);
            self.is_empty = true;
        }
    }
}

/// Initial, previous and current states of a deformable representation and their solver.
#[derive(Debug)]
pub struct DeformableCore {
    initial_state: OdeState,
    previous_state: OdeState,
    current_state: OdeState,
    solver: OdeSolver,
}

impl DeformableCore {
    pub fn new(
        initial_state: OdeState,
        scheme: IntegrationScheme,
        linear_solver: LinearSolverKind,
    ) -> Self {
        Self {
            previous_state: initial_state.clone(),
            current_state: initial_state.clone(),
            initial_state,
            solver: OdeSolver::new(scheme, linear_solver),
        }
    }

    pub fn initial_state(&self) -> &OdeState {
        &self.initial_state
    }

    pub fn previous_state(&self) -> &OdeState {
        &self.previous_state
    }

    pub fn current_state(&self) -> &OdeState {
        &self.current_state
    }

    pub fn current_state_mut(&mut self) -> &mut OdeState {
        &mut self.current_state
    }

    pub fn num_dof(&self) -> usize {
        self.current_state.num_dof()
    }

    pub fn num_nodes(&self) -> usize {
        self.current_state.num_nodes()
    }

    pub fn reset_state(&mut self) {
        self.current_state = self.initial_state.clone();
        self.previous_state = self.initial_state.clone();
    }

    pub fn node_positions(&self) -> Vec<DVec3> {
        self.current_state.node_positions()
    }

    /// Compliance of the last solve, sized `num_dof × num_dof`.
    ///
    /// Before the first free motion this is an empty matrix.
    pub fn compliance(&self) -> &DMatrix<f64> {
        self.solver.compliance_matrix()
    }

    /// Integrates `model` over `dt` from the current state.
    ///
    /// On failure the current state is restored so that the representation can sit the
    /// frame out.
    pub fn free_motion(&mut self, dt: f64, model: &mut dyn OdeEquation) -> Result<()> {
        self.previous_state.clone_from(&self.current_state);
        let result = self
            .solver
            .solve(dt, model, &self.previous_state, &mut self.current_state);
        if result.is_err() {
            self.current_state.clone_from(&self.previous_state);
        }
        result
    }

    /// Rolls back the last free motion.
    pub fn restore_previous(&mut self) {
        self.current_state.clone_from(&self.previous_state);
    }

    /// Applies a velocity correction: `v += Δv`, `x += dt·Δv`.
    pub fn apply_correction(&mut self, dt: f64, delta: &DVector<f64>) -> Result<()> {
        if delta.len() != self.num_dof() {
            return Err(PhysicsError::invalid_parameter(format!(
                "deformable correction needs {} values, got {}",
                self.num_dof(),
                delta.len()
            )));
        }
        *self.current_state.velocities_mut() += delta;
        *self.current_state.positions_mut() += delta * dt;
        if self.current_state.is_valid() {
            Ok(())
        } else {
            Err(PhysicsError::InvalidState(
                "correction produced non-finite values".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distributed_force_is_split_between_nodes() {
        let mut loads = ExternalLoads::new(6);
        loads.add_distributed_force(DVec3::new(0.0, 2.0, 0.0));
        let mut f = DVector::zeros(6);
        loads.add_to(&mut f);
        assert_eq!(f[1], 1.0);
        assert_eq!(f[4], 1.0);
        loads.clear();
        let mut g = DVector::zeros(6);
        loads.add_to(&mut g);
        assert_eq!(g.sum(), 0.0);
    }

    #[test]
    fn node_force_out_of_range_is_rejected() {
        let mut loads = ExternalLoads::new(6);
        assert!(loads.add_node_force(2, DVec3::X).is_err());
    }
}
