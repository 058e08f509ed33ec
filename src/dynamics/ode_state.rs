//! Per-node state integrated by the ODE solvers.

use glam::DVec3;
use nalgebra::{DMatrix, DVector};

use crate::{
    error::{PhysicsError, Result},
    utils::math::{node_vec3, set_node_vec3},
};

/// Positions and velocities of every node plus the DOF fixed by boundary conditions.
///
/// `positions.len() == velocities.len() == dof_per_node * num_nodes` at all times.
#[derive(Debug, Clone, PartialEq)]
pub struct OdeState {
    dof_per_node: usize,
    num_nodes: usize,
    positions: DVector<f64>,
    velocities: DVector<f64>,
    is_boundary_condition: Vec<bool>,
    boundary_conditions: Vec<usize>,
}

impl Default for OdeState {
    fn default() -> Self {
        Self::new()
    }
}

impl OdeState {
    pub fn new() -> Self {
        Self {
            dof_per_node: 0,
            num_nodes: 0,
            positions: DVector::zeros(0),
            velocities: DVector::zeros(0),
            is_boundary_condition: Vec::new(),
            boundary_conditions: Vec::new(),
        }
    }

    /// State sized for `num_nodes` nodes of `dof_per_node` DOF each, zeroed.
    pub fn with_num_dof(dof_per_node: usize, num_nodes: usize) -> Result<Self> {
        let mut state = Self::new();
        state.set_num_dof(dof_per_node, num_nodes)?;
        Ok(state)
    }

    /// Allocates and zeroes positions and velocities, clearing boundary conditions.
    pub fn set_num_dof(&mut self, dof_per_node: usize, num_nodes: usize) -> Result<()> {
        if dof_per_node == 0 || num_nodes == 0 {
            return Err(PhysicsError::InvalidDofCount {
                dof_per_node,
                num_nodes,
            });
        }
        let num_dof = dof_per_node * num_nodes;
        self.dof_per_node = dof_per_node;
        self.num_nodes = num_nodes;
        self.positions = DVector::zeros(num_dof);
        self.velocities = DVector::zeros(num_dof);
        self.is_boundary_condition = vec![false; num_dof];
        self.boundary_conditions.clear();
        Ok(())
    }

    /// Zeroes positions and velocities and clears boundary conditions, keeping the size.
    pub fn reset(&mut self) {
        self.positions.fill(0.0);
        self.velocities.fill(0.0);
        self.is_boundary_condition.fill(false);
        self.boundary_conditions.clear();
    }

    pub fn num_dof_per_node(&self) -> usize {
        self.dof_per_node
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn num_dof(&self) -> usize {
        self.positions.len()
    }

    pub fn positions(&self) -> &DVector<f64> {
        &self.positions
    }

    pub fn positions_mut(&mut self) -> &mut DVector<f64> {
        &mut self.positions
    }

    pub fn velocities(&self) -> &DVector<f64> {
        &self.velocities
    }

    pub fn velocities_mut(&mut self) -> &mut DVector<f64> {
        &mut self.velocities
    }

    /// Position of a node, for states with at least 3 DOF per node.
    pub fn position(&self, node: usize) -> DVec3 {
        node_vec3(&self.positions, self.dof_per_node, node)
    }

    pub fn velocity(&self, node: usize) -> DVec3 {
        node_vec3(&self.velocities, self.dof_per_node, node)
    }

    pub fn set_position(&mut self, node: usize, position: DVec3) {
        set_node_vec3(&mut self.positions, self.dof_per_node, node, position);
    }

    pub fn set_velocity(&mut self, node: usize, velocity: DVec3) {
        set_node_vec3(&mut self.velocities, self.dof_per_node, node, velocity);
    }

    /// All node positions, for states with 3 DOF per node.
    pub fn node_positions(&self) -> Vec<DVec3> {
        (0..self.num_nodes).map(|node| self.position(node)).collect()
    }

    /// Fixes every DOF of `node`.
    pub fn add_boundary_condition(&mut self, node: usize) -> Result<()> {
        self.check_node(node)?;
        for dof in 0..self.dof_per_node {
            self.add_boundary_condition_dof(node, dof)?;
        }
        Ok(())
    }

    /// Fixes one DOF of `node`. Fixing an already fixed DOF does nothing.
    pub fn add_boundary_condition_dof(&mut self, node: usize, dof: usize) -> Result<()> {
        self.check_node(node)?;
        if dof >= self.dof_per_node {
            return Err(PhysicsError::DofOutOfRange {
                dof,
                dof_per_node: self.dof_per_node,
            });
        }
        let index = node * self.dof_per_node + dof;
        if !self.is_boundary_condition[index] {
            self.is_boundary_condition[index] = true;
            self.boundary_conditions.push(index);
        }
        Ok(())
    }

    pub fn boundary_conditions(&self) -> &[usize] {
        &self.boundary_conditions
    }

    pub fn is_boundary_condition(&self, dof: usize) -> bool {
        self.is_boundary_condition.get(dof).copied().unwrap_or(false)
    }

    /// Zeroes the fixed entries of `vector`.
    pub fn apply_boundary_conditions_to_vector(&self, vector: &mut DVector<f64>) {
        for &dof in &self.boundary_conditions {
            vector[dof] = 0.0;
        }
    }

    /// Zeroes the fixed rows and columns of `matrix`.
    ///
    /// The diagonal entry is set to 1 when `has_compliance` is true, keeping a system matrix
    /// solvable, and to 0 otherwise, so that a compliance matrix moves no fixed DOF.
    pub fn apply_boundary_conditions_to_matrix(
        &self,
        matrix: &mut DMatrix<f64>,
        has_compliance: bool,
    ) {
        let diagonal = if has_compliance { 1.0 } else { 0.0 };
        for &dof in &self.boundary_conditions {
            matrix.row_mut(dof).fill(0.0);
            matrix.column_mut(dof).fill(0.0);
            matrix[(dof, dof)] = diagonal;
        }
    }

    /// True when every position and velocity is finite.
    pub fn is_valid(&self) -> bool {
        self.positions.iter().all(|v| v.is_finite())
            && self.velocities.iter().all(|v| v.is_finite())
    }

    fn check_node(&self, node: usize) -> Result<()> {
        if self.dof_per_node == 0 {
            return Err(PhysicsError::UninitializedState);
        }
        if node >= self.num_nodes {
            return Err(PhysicsError::NodeOutOfRange {
                node,
                num_nodes: self.num_nodes,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_conditions_need_a_size() {
        let mut state = OdeState::new();
        assert!(matches!(
            state.add_boundary_condition(0),
            Err(PhysicsError::UninitializedState)
        ));
        assert!(matches!(
            OdeState::with_num_dof(0, 3),
            Err(PhysicsError::InvalidDofCount { .. })
        ));
    }

    #[test]
    fn boundary_conditions_are_recorded_once() {
        let mut state = OdeState::with_num_dof(3, 4).expect("valid size");
        state.add_boundary_condition(1).expect("node in range");
        state.add_boundary_condition_dof(1, 2).expect("dof in range");
        state.add_boundary_condition_dof(3, 0).expect("dof in range");
        assert_eq!(state.boundary_conditions(), &[3, 4, 5, 9]);
        assert!(state.is_boundary_condition(4));
        assert!(!state.is_boundary_condition(6));
        assert!(matches!(
            state.add_boundary_condition(4),
            Err(PhysicsError::NodeOutOfRange { node: 4, num_nodes: 4 })
        ));
        assert!(matches!(
            state.add_boundary_condition_dof(0, 3),
            Err(PhysicsError::DofOutOfRange { .. })
        ));
    }

    #[test]
    fn applying_to_matrix_is_idempotent() {
        let mut state = OdeState::with_num_dof(3, 2).expect("valid size");
        state.add_boundary_condition(0).expect("node in range");

        let mut once = DMatrix::from_fn(6, 6, |i, j| (i * 6 + j) as f64 + 1.0);
        state.apply_boundary_conditions_to_matrix(&mut once, true);
        let mut twice = once.clone();
        state.apply_boundary_conditions_to_matrix(&mut twice, true);

        assert_eq!(once, twice);
        assert_eq!(once[(0, 0)], 1.0);
        assert_eq!(once[(0, 4)], 0.0);
        assert_eq!(once[(4, 1)], 0.0);
        assert_eq!(once[(4, 4)], 29.0);

        let mut vector = DVector::from_element(6, 2.0);
        state.apply_boundary_conditions_to_vector(&mut vector);
        assert_eq!(vector.as_slice(), &[0.0, 0.0, 0.0, 2.0, 2.0, 2.0]);
    }
}
