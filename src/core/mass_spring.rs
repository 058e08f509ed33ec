//! Mass-spring representation and its 1D/2D grid builders.

use glam::DVec3;
use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{
    core::{
        deformable::{DeformableCore, ExternalLoads, RayleighDamping},
        mesh::TriangleMesh,
        shapes::{ParticlesShape, Shape},
    },
    dynamics::{
        fem_element::FemElement,
        linear_solver::LinearSolverKind,
        ode_solver::{IntegrationScheme, OdeEquation},
        ode_state::OdeState,
        springs::{LinearSpring, SpringParameters},
    },
    error::{PhysicsError, Result},
    utils::math::add_node_vec3,
};

/// Parameters shared by the grid builders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MassSpringParameters {
    /// Split evenly between the nodes.
    pub total_mass: f64,
    pub stretching: SpringParameters,
    pub bending: SpringParameters,
    pub face_diagonal: SpringParameters,
    pub rayleigh: RayleighDamping,
    pub integration_scheme: IntegrationScheme,
    pub linear_solver: LinearSolverKind,
    pub is_gravity_enabled: bool,
    /// Radius of the particles standing for the nodes when the model has no surface.
    pub collision_radius: f64,
}

impl Default for MassSpringParameters {
    fn default() -> Self {
        Self {
            total_mass: 1.0,
            stretching: SpringParameters::new(100.0, 1.0),
            bending: SpringParameters::default(),
            face_diagonal: SpringParameters::default(),
            rayleigh: RayleighDamping::default(),
            integration_scheme: IntegrationScheme::default(),
            linear_solver: LinearSolverKind::default(),
            is_gravity_enabled: true,
            collision_radius: 0.0,
        }
    }
}

/// Equations of motion of a set of point masses linked by springs.
///
/// `F = Σ springs + M·g + F_ext − (α·M + β·K)·v`, with `M` diagonal.
#[derive(Debug)]
pub struct MassSpringModel {
    masses: Vec<f64>,
    springs: Vec<LinearSpring>,
    gravity: Option<DVec3>,
    rayleigh: RayleighDamping,
    external: ExternalLoads,
}

impl MassSpringModel {
    fn new(rayleigh: RayleighDamping) -> Self {
        Self {
            masses: Vec::new(),
            springs: Vec::new(),
            gravity: None,
            rayleigh,
            external: ExternalLoads::new(0),
        }
    }

    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    pub fn springs(&self) -> &[LinearSpring] {
        &self.springs
    }

    pub fn total_mass(&self) -> f64 {
        self.masses.iter().sum()
    }

    fn spring_stiffness(&self, state: &OdeState) -> DMatrix<f64> {
        let mut k = DMatrix::zeros(state.num_dof(), state.num_dof());
        for spring in &self.springs {
            spring.add_stiffness(state, &mut k, 1.0);
        }
        k
    }
}

impl OdeEquation for MassSpringModel {
    fn compute_f(&mut self, state: &OdeState) -> DVector<f64> {
        let mut f = DVector::zeros(state.num_dof());
        for spring in &self.springs {
            spring.add_force(state, &mut f, 1.0);
        }
        if let Some(gravity) = self.gravity {
            for (node, &mass) in self.masses.iter().enumerate() {
                add_node_vec3(&mut f, 3, node, gravity * mass);
            }
        }
        self.external.add_to(&mut f);

        if !self.rayleigh.is_zero() {
            let (m, k) = (self.compute_m(state), self.spring_stiffness(state));
            let damping = self.rayleigh.matrix(&m, &k);
            f -= damping * state.velocities();
        }
        f
    }

    fn compute_m(&mut self, state: &OdeState) -> DMatrix<f64> {
        let mut m = DMatrix::zeros(state.num_dof(), state.num_dof());
        for (node, &mass) in self.masses.iter().enumerate() {
            for axis in 0..3 {
                m[(3 * node + axis, 3 * node + axis)] = mass;
            }
        }
        m
    }

    fn compute_d(&mut self, state: &OdeState) -> DMatrix<f64> {
        let (m, k) = (self.compute_m(state), self.spring_stiffness(state));
        let mut d = self.rayleigh.matrix(&m, &k);
        for spring in &self.springs {
            spring.add_damping(state, &mut d, 1.0);
        }
        d
    }

    fn compute_k(&mut self, state: &OdeState) -> DMatrix<f64> {
        self.spring_stiffness(state)
    }
}

/// Network of point masses and linear springs, 3 DOF per node.
///
/// Nodes, springs and boundary conditions are added first; [`Self::initialize`] then sizes
/// the states and computes the spring rest lengths.
#[derive(Debug)]
pub struct MassSpringRepresentation {
    pub name: String,
    parameters: MassSpringParameters,
    rest_positions: Vec<DVec3>,
    boundary_conditions: Vec<usize>,
    triangles: Vec<[usize; 3]>,
    model: MassSpringModel,
    core: Option<DeformableCore>,
    pub is_active: bool,
}

impl MassSpringRepresentation {
    pub fn new(name: impl Into<String>, parameters: MassSpringParameters) -> Self {
        Self {
            name: name.into(),
            parameters,
            rest_positions: Vec::new(),
            boundary_conditions: Vec::new(),
            triangles: Vec::new(),
            model: MassSpringModel::new(parameters.rayleigh),
            core: None,
            is_active: true,
        }
    }

    /// Chain of `num_nodes` nodes evenly spaced between two extremities.
    ///
    /// Stretching springs link consecutive nodes, bending springs skip one node.
    pub fn grid_1d(
        name: impl Into<String>,
        extremities: [DVec3; 2],
        num_nodes: usize,
        boundary_conditions: &[usize],
        parameters: MassSpringParameters,
    ) -> Result<Self> {
        if num_nodes < 2 {
            return Err(PhysicsError::InvalidDofCount {
                dof_per_node: 3,
                num_nodes,
            });
        }
        let mut representation = Self::new(name, parameters);
        let mass = parameters.total_mass / num_nodes as f64;
        for i in 0..num_nodes {
            let t = i as f64 / (num_nodes - 1) as f64;
            representation.add_node(extremities[0].lerp(extremities[1], t), mass);
        }
        for i in 0..num_nodes - 1 {
            representation.add_spring(i, i + 1, parameters.stretching);
        }
        if has_springs(&parameters.bending) {
            for i in 0..num_nodes.saturating_sub(2) {
                representation.add_spring(i, i + 2, parameters.bending);
            }
        }
        for &node in boundary_conditions {
            representation.add_boundary_condition(node);
        }
        representation.initialize()?;
        Ok(representation)
    }

    /// Planar grid of `num_nodes[0]` rows by `num_nodes[1]` columns.
    ///
    /// Node positions are interpolated bilinearly between the four corners, given in order
    /// (first row, first column), (first row, last column), (last row, last column),
    /// (last row, first column). Node `(row, col)` has index `row * num_nodes[1] + col`. Every
    /// grid cell yields two surface triangles.
    pub fn grid_2d(
        name: impl Into<String>,
        corners: [DVec3; 4],
        num_nodes: [usize; 2],
        boundary_conditions: &[usize],
        parameters: MassSpringParameters,
    ) -> Result<Self> {
        let [rows, cols] = num_nodes;
        if rows < 2 || cols < 2 {
            return Err(PhysicsError::InvalidDofCount {
                dof_per_node: 3,
                num_nodes: rows * cols,
            });
        }
        let mut representation = Self::new(name, parameters);
        let mass = parameters.total_mass / (rows * cols) as f64;
        for row in 0..rows {
            let v = row as f64 / (rows - 1) as f64;
            for col in 0..cols {
                let u = col as f64 / (cols - 1) as f64;
                let position = corners[0] * ((1.0 - u) * (1.0 - v))
                    + corners[1] * (u * (1.0 - v))
                    + corners[2] * (u * v)
                    + corners[3] * ((1.0 - u) * v);
                representation.add_node(position, mass);
            }
        }

        let index = |row: usize, col: usize| row * cols + col;
        let mut link = |step: usize, spring: SpringParameters| {
            for row in 0..rows {
                for col in 0..cols {
                    if col + step < cols {
                        representation.add_spring(index(row, col), index(row, col + step), spring);
                    }
                    if row + step < rows {
                        representation.add_spring(index(row, col), index(row + step, col), spring);
                    }
                }
            }
        };
        link(1, parameters.stretching);
        if has_springs(&parameters.bending) {
            link(2, parameters.bending);
        }
        let with_diagonals = has_springs(&parameters.face_diagonal);
        for row in 0..rows - 1 {
            for col in 0..cols - 1 {
                let a = index(row, col);
                let b = index(row, col + 1);
                let c = index(row + 1, col);
                let d = index(row + 1, col + 1);
                if with_diagonals {
                    representation.add_spring(a, d, parameters.face_diagonal);
                    representation.add_spring(b, c, parameters.face_diagonal);
                }
                representation.add_triangle([a, b, d]);
                representation.add_triangle([a, d, c]);
            }
        }
        for &node in boundary_conditions {
            representation.add_boundary_condition(node);
        }
        representation.initialize()?;
        Ok(representation)
    }

    /// Adds a node and returns its index.
    pub fn add_node(&mut self, position: DVec3, mass: f64) -> usize {
        self.rest_positions.push(position);
        self.model.masses.push(mass);
        self.rest_positions.len() - 1
    }

    pub fn add_spring(&mut self, node0: usize, node1: usize, parameters: SpringParameters) {
        self.model
            .springs
            .push(LinearSpring::new(node0, node1, parameters));
    }

    pub fn add_boundary_condition(&mut self, node: usize) {
        self.boundary_conditions.push(node);
    }

    /// Adds a surface triangle over three node indices.
    pub fn add_triangle(&mut self, nodes: [usize; 3]) {
        self.triangles.push(nodes);
    }

    /// Sizes the states from the added nodes and computes the spring rest lengths.
    pub fn initialize(&mut self) -> Result<()> {
        let num_nodes = self.rest_positions.len();
        let mut state = OdeState::with_num_dof(3, num_nodes)?;
        for (node, &position) in self.rest_positions.iter().enumerate() {
            state.set_position(node, position);
        }
        for &node in &self.boundary_conditions {
            state.add_boundary_condition(node)?;
        }
        if let Some(&mass) = self.model.masses.iter().find(|&&m| !(m > 0.0)) {
            return Err(PhysicsError::invalid_parameter(format!(
                "node mass must be positive, got {mass}"
            )));
        }
        for spring in &mut self.model.springs {
            spring.initialize(&state)?;
        }
        if let Some(&node) = self.triangles.iter().flatten().find(|&&n| n >= num_nodes) {
            return Err(PhysicsError::NodeOutOfRange { node, num_nodes });
        }
        self.model.external = ExternalLoads::new(state.num_dof());
        debug!(
            "mass-spring '{}': {} nodes, {} springs, {} fixed DOF",
            self.name,
            num_nodes,
            self.model.springs.len(),
            state.boundary_conditions().len()
        );
        self.core = Some(DeformableCore::new(
            state,
            self.parameters.integration_scheme,
            self.parameters.linear_solver,
        ));
        Ok(())
    }

    pub fn parameters(&self) -> &MassSpringParameters {
        &self.parameters
    }

    pub fn model(&self) -> &MassSpringModel {
        &self.model
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    pub fn core(&self) -> Result<&DeformableCore> {
        self.core.as_ref().ok_or(PhysicsError::UninitializedState)
    }

    pub fn core_mut(&mut self) -> Result<&mut DeformableCore> {
        self.core.as_mut().ok_or(PhysicsError::UninitializedState)
    }

    pub fn num_dof(&self) -> usize {
        self.core.as_ref().map_or(0, DeformableCore::num_dof)
    }

    pub fn add_external_force(&mut self, node: Option<usize>, force: DVec3) -> Result<()> {
        match node {
            Some(node) => self.model.external.add_node_force(node, force),
            None => {
                self.model.external.add_distributed_force(force);
                Ok(())
            }
        }
    }

    pub fn free_motion(&mut self, dt: f64, gravity: DVec3) -> Result<()> {
        let core = self.core.as_mut().ok_or(PhysicsError::UninitializedState)?;
        self.model.gravity = self.parameters.is_gravity_enabled.then_some(gravity);
        let result = core.free_motion(dt, &mut self.model);
        self.model.external.clear();
        result
    }

    /// Surface mesh over the nodes, or one particle per node for models without triangles.
    pub fn collision_shape(&self) -> Result<Shape> {
        let positions = self.core()?.node_positions();
        if self.triangles.is_empty() {
            Ok(Shape::Particles(ParticlesShape::new(
                self.parameters.collision_radius,
                positions,
            )))
        } else {
            Ok(Shape::Mesh(TriangleMesh::new(positions, self.triangles.clone())?))
        }
    }
}

fn has_springs(parameters: &SpringParameters) -> bool {
    parameters.stiffness != 0.0 || parameters.damping != 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn grid_2d_splits_the_total_mass() {
        let parameters = MassSpringParameters {
            total_mass: 3.0,
            face_diagonal: SpringParameters::new(10.0, 0.0),
            ..MassSpringParameters::default()
        };
        let grid = MassSpringRepresentation::grid_2d(
            "cloth",
            [
                DVec3::ZERO,
                DVec3::X,
                DVec3::new(1.0, 0.0, 1.0),
                DVec3::Z,
            ],
            [3, 4],
            &[0, 3],
            parameters,
        )
        .expect("valid grid");
        assert_relative_eq!(grid.model().total_mass(), 3.0, epsilon = 1e-12);
        assert_eq!(grid.triangles().len(), 2 * 2 * 3);
        // 3 rows x 3 horizontal + 2 x 4 vertical stretching, 2 diagonals per cell.
        assert_eq!(grid.model().springs().len(), 9 + 8 + 12);
        let state = grid.core().expect("initialized").current_state();
        assert!(state.is_boundary_condition(9));
        assert_relative_eq!(state.position(5).x, 1.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(state.position(5).z, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn grid_1d_adds_bending_springs() {
        let parameters = MassSpringParameters {
            bending: SpringParameters::new(5.0, 0.0),
            ..MassSpringParameters::default()
        };
        let chain = MassSpringRepresentation::grid_1d(
            "rope",
            [DVec3::ZERO, DVec3::new(0.0, 0.0, 4.0)],
            5,
            &[0],
            parameters,
        )
        .expect("valid chain");
        assert_eq!(chain.model().springs().len(), 4 + 3);
        assert!(matches!(chain.collision_shape(), Ok(Shape::Particles(_))));
    }

    #[test]
    fn single_node_falls_with_mass_damping() {
        let damping = 0.5;
        let mut representation = MassSpringRepresentation::new(
            "point",
            MassSpringParameters {
                rayleigh: RayleighDamping {
                    mass_coefficient: damping,
                    stiffness_coefficient: 0.0,
                },
                ..MassSpringParameters::default()
            },
        );
        representation.add_node(DVec3::ZERO, 2.0);
        representation.initialize().expect("valid model");
        let v0 = DVec3::new(1.0, 0.0, 0.0);
        representation
            .core_mut()
            .expect("initialized")
            .current_state_mut()
            .set_velocity(0, v0);

        let dt = 1e-3;
        let g = DVec3::new(0.0, -9.81, 0.0);
        representation.free_motion(dt, g).expect("stable step");

        let state = representation.core().expect("initialized").current_state();
        let v1 = v0 + (g - v0 * damping) * dt;
        assert_relative_eq!(state.velocity(0).x, v1.x, epsilon = 1e-12);
        assert_relative_eq!(state.velocity(0).y, v1.y, epsilon = 1e-12);
        assert_relative_eq!(state.position(0).y, v1.y * dt, epsilon = 1e-12);
    }

    #[test]
    fn rayleigh_damping_combines_mass_and_stiffness() {
        let rayleigh = RayleighDamping {
            mass_coefficient: 0.5,
            stiffness_coefficient: 0.1,
        };
        let mut representation = MassSpringRepresentation::new(
            "pair",
            MassSpringParameters {
                rayleigh,
                is_gravity_enabled: false,
                ..MassSpringParameters::default()
            },
        );
        representation.add_node(DVec3::ZERO, 2.0);
        representation.add_node(DVec3::X, 2.0);
        representation.add_spring(0, 1, SpringParameters::new(100.0, 0.0));
        representation.initialize().expect("valid model");

        let state = representation
            .core()
            .expect("initialized")
            .current_state()
            .clone();
        let model = &mut representation.model;
        let m = model.compute_m(&state);
        let k = model.compute_k(&state);
        let d = model.compute_d(&state);
        assert_relative_eq!(d, &m * 0.5 + &k * 0.1, epsilon = 1e-12);
        assert_relative_eq!(d[(0, 0)], 0.5 * 2.0 + 0.1 * k[(0, 0)], epsilon = 1e-12);
    }

    #[test]
    fn uninitialized_model_cannot_move() {
        let mut representation =
            MassSpringRepresentation::new("empty", MassSpringParameters::default());
        assert!(matches!(
            representation.free_motion(1e-3, DVec3::ZERO),
            Err(PhysicsError::UninitializedState)
        ));
    }
}
