//! Volumetric finite element representation built from hexahedra and tetrahedra.

use std::collections::HashMap;

use glam::DVec3;
use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{
    core::{
        deformable::{DeformableCore, ExternalLoads, RayleighDamping},
        mesh::TriangleMesh,
        shapes::Shape,
    },
    dynamics::{
        fem3d_cube::FemElement3DCube,
        fem3d_tetrahedron::FemElement3DTetrahedron,
        fem_element::{FemElement, FemMaterial},
        linear_solver::LinearSolverKind,
        ode_solver::{IntegrationScheme, OdeEquation},
        ode_state::OdeState,
    },
    error::{PhysicsError, Result},
    utils::math::set_node_vec3,
};

/// Outward faces of a hexahedron, each split into two triangles.
const CUBE_FACES: [[usize; 4]; 6] = [
    [0, 3, 2, 1],
    [4, 5, 6, 7],
    [0, 1, 5, 4],
    [1, 2, 6, 5],
    [2, 3, 7, 6],
    [3, 0, 4, 7],
];

/// Outward faces of a positively oriented tetrahedron.
const TETRAHEDRON_FACES: [[usize; 3]; 4] = [[0, 2, 1], [0, 1, 3], [1, 2, 3], [0, 3, 2]];

/// Already parsed volume mesh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fem3DMeshData {
    pub nodes: Vec<DVec3>,
    pub cubes: Vec<[usize; 8]>,
    pub tetrahedrons: Vec<[usize; 4]>,
    pub boundary_conditions: Vec<usize>,
    /// Collision surface over node indices; computed from the element faces when empty.
    pub surface: Vec<[usize; 3]>,
}

impl Fem3DMeshData {
    /// Triangles of the faces used by exactly one element.
    pub fn boundary_surface(&self) -> Vec<[usize; 3]> {
        let mut faces: Vec<Vec<usize>> = Vec::new();
        for cube in &self.cubes {
            faces.extend(CUBE_FACES.iter().map(|f| f.iter().map(|&i| cube[i]).collect()));
        }
        for tetrahedron in &self.tetrahedrons {
            faces.extend(
                TETRAHEDRON_FACES
                    .iter()
                    .map(|f| f.iter().map(|&i| tetrahedron[i]).collect()),
            );
        }

        let key = |face: &[usize]| {
            let mut sorted = face.to_vec();
            sorted.sort_unstable();
            sorted
        };
        let mut counts: HashMap<Vec<usize>, usize> = HashMap::new();
        for face in &faces {
            *counts.entry(key(face)).or_default() += 1;
        }

        let mut triangles = Vec::new();
        for face in faces.iter().filter(|face| counts[&key(face)] == 1) {
            match face.as_slice() {
                &[a, b, c] => triangles.push([a, b, c]),
                &[a, b, c, d] => {
                    triangles.push([a, b, c]);
                    triangles.push([a, c, d]);
                }
                _ => {}
            }
        }
        triangles
    }
}

/// Material, damping and integration settings of a volumetric model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Fem3DParameters {
    pub material: FemMaterial,
    pub rayleigh: RayleighDamping,
    pub integration_scheme: IntegrationScheme,
    pub linear_solver: LinearSolverKind,
    pub is_gravity_enabled: bool,
}

impl Default for Fem3DParameters {
    fn default() -> Self {
        Self {
            material: FemMaterial::default(),
            rayleigh: RayleighDamping::default(),
            integration_scheme: IntegrationScheme::default(),
            linear_solver: LinearSolverKind::default(),
            is_gravity_enabled: true,
        }
    }
}

/// Equations of motion of a set of linear elastic elements.
///
/// Every element is linear, so `M` and `K` are assembled once from the rest state.
#[derive(Debug)]
pub struct Fem3DModel {
    elements: Vec<Box<dyn FemElement>>,
    mass: DMatrix<f64>,
    stiffness: DMatrix<f64>,
    gravity: Option<DVec3>,
    rayleigh: RayleighDamping,
    external: ExternalLoads,
}

impl Fem3DModel {
    fn new(
        mut elements: Vec<Box<dyn FemElement>>,
        rest_state: &OdeState,
        rayleigh: RayleighDamping,
    ) -> Result<Self> {
        let n = rest_state.num_dof();
        let mut mass = DMatrix::zeros(n, n);
        let mut stiffness = DMatrix::zeros(n, n);
        for element in &mut elements {
            element.initialize(rest_state)?;
            element.add_mass(rest_state, &mut mass, 1.0);
            element.add_stiffness(rest_state, &mut stiffness, 1.0);
        }
        Ok(Self {
            elements,
            mass,
            stiffness,
            gravity: None,
            rayleigh,
            external: ExternalLoads::new(n),
        })
    }

    pub fn elements(&self) -> &[Box<dyn FemElement>] {
        &self.elements
    }

    /// Sum of the consistent mass matrix entries of one axis.
    pub fn total_mass(&self) -> f64 {
        (0..self.mass.nrows() / 3)
            .flat_map(|i| (0..self.mass.ncols() / 3).map(move |j| (3 * i, 3 * j)))
            .map(|index| self.mass[index])
            .sum()
    }

    /// Fails with the first inverted or collapsed element.
    pub fn check_volumes(&self, state: &OdeState) -> Result<f64> {
        self.elements
            .iter()
            .map(|element| element.volume(state))
            .sum()
    }
}

impl OdeEquation for Fem3DModel {
    fn compute_f(&mut self, state: &OdeState) -> DVector<f64> {
        let mut f = DVector::zeros(state.num_dof());
        for element in &self.elements {
            element.add_force(state, &mut f, 1.0);
        }
        if let Some(gravity) = self.gravity {
            let mut g = DVector::zeros(state.num_dof());
            for node in 0..state.num_nodes() {
                set_node_vec3(&mut g, 3, node, gravity);
            }
            f += &self.mass * g;
        }
        self.external.add_to(&mut f);
        if !self.rayleigh.is_zero() {
            f -= self.rayleigh.matrix(&self.mass, &self.stiffness) * state.velocities();
        }
        f
    }

    fn compute_m(&mut self, _state: &OdeState) -> DMatrix<f64> {
        self.mass.clone()
    }

    fn compute_d(&mut self, _state: &OdeState) -> DMatrix<f64> {
        self.rayleigh.matrix(&self.mass, &self.stiffness)
    }

    fn compute_k(&mut self, _state: &OdeState) -> DMatrix<f64> {
        self.stiffness.clone()
    }
}

/// Finite element representation, 3 DOF per node.
#[derive(Debug)]
pub struct Fem3DRepresentation {
    pub name: String,
    parameters: Fem3DParameters,
    surface: Vec<[usize; 3]>,
    model: Fem3DModel,
    core: DeformableCore,
    pub is_active: bool,
}

impl Fem3DRepresentation {
    pub fn new(
        name: impl Into<String>,
        mesh: &Fem3DMeshData,
        parameters: Fem3DParameters,
    ) -> Result<Self> {
        let name = name.into();
        parameters.material.validate()?;
        let mut state = OdeState::with_num_dof(3, mesh.nodes.len())?;
        for (node, &position) in mesh.nodes.iter().enumerate() {
            state.set_position(node, position);
        }
        for &node in &mesh.boundary_conditions {
            state.add_boundary_condition(node)?;
        }

        let mut elements: Vec<Box<dyn FemElement>> = Vec::new();
        for &cube in &mesh.cubes {
            elements.push(Box::new(FemElement3DCube::new(cube, parameters.material)));
        }
        for &tetrahedron in &mesh.tetrahedrons {
            elements.push(Box::new(FemElement3DTetrahedron::new(
                tetrahedron,
                parameters.material,
            )));
        }
        if elements.is_empty() {
            return Err(PhysicsError::invalid_parameter(format!(
                "FEM representation '{name}' has no element"
            )));
        }
        let model = Fem3DModel::new(elements, &state, parameters.rayleigh)?;

        let surface = if mesh.surface.is_empty() {
            mesh.boundary_surface()
        } else {
            mesh.surface.clone()
        };
        let num_nodes = state.num_nodes();
        if let Some(&node) = surface.iter().flatten().find(|&&n| n >= num_nodes) {
            return Err(PhysicsError::NodeOutOfRange { node, num_nodes });
        }
        debug!(
            "FEM '{}': {} nodes, {} elements, {} surface triangles",
            name,
            num_nodes,
            model.elements.len(),
            surface.len()
        );

        Ok(Self {
            name,
            parameters,
            surface,
            model,
            core: DeformableCore::new(
                state,
                parameters.integration_scheme,
                parameters.linear_solver,
            ),
            is_active: true,
        })
    }

    pub fn parameters(&self) -> &Fem3DParameters {
        &self.parameters
    }

    pub fn model(&self) -> &Fem3DModel {
        &self.model
    }

    pub fn surface(&self) -> &[[usize; 3]] {
        &self.surface
    }

    pub fn core(&self) -> &DeformableCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut DeformableCore {
        &mut self.core
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

    /// Integrates the model and rejects states where an element inverted.
    pub fn free_motion(&mut self, dt: f64, gravity: DVec3) -> Result<()> {
        self.model.gravity = self.parameters.is_gravity_enabled.then_some(gravity);
        let result = self.core.free_motion(dt, &mut self.model);
        self.model.external.clear();
        result?;
        if let Err(err) = self.model.check_volumes(self.core.current_state()) {
            self.core.restore_previous();
            return Err(err);
        }
        Ok(())
    }

    pub fn collision_shape(&self) -> Result<Shape> {
        Ok(Shape::Mesh(TriangleMesh::new(
            self.core.node_positions(),
            self.surface.clone(),
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_cubes() -> Fem3DMeshData {
        let mut nodes = Vec::new();
        for z in 0..2 {
            for &(x, y) in &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
                nodes.push(DVec3::new(x, y, z as f64));
            }
        }
        // Second cube stacked on top of the first.
        for &(x, y) in &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
            nodes.push(DVec3::new(x, y, 2.0));
        }
        Fem3DMeshData {
            nodes,
            cubes: vec![[0, 1, 2, 3, 4, 5, 6, 7], [4, 5, 6, 7, 8, 9, 10, 11]],
            boundary_conditions: vec![0, 1, 2, 3],
            ..Fem3DMeshData::default()
        }
    }

    #[test]
    fn shared_faces_are_not_on_the_surface() {
        let surface = two_cubes().boundary_surface();
        assert_eq!(surface.len(), 10 * 2);
        assert!(!surface.contains(&[4, 5, 6]));
    }

    #[test]
    fn tetrahedron_surface_is_its_four_faces() {
        let mesh = Fem3DMeshData {
            nodes: vec![DVec3::ZERO, DVec3::X, DVec3::Y, DVec3::Z],
            tetrahedrons: vec![[0, 1, 2, 3]],
            ..Fem3DMeshData::default()
        };
        let surface = mesh.boundary_surface();
        assert_eq!(surface.len(), 4);
        let mesh = TriangleMesh::new(mesh.nodes.clone(), surface).expect("valid surface");
        // Outward normal of the face opposite to node 3.
        assert_relative_eq!(mesh.normal(0).z, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn model_mass_matches_density_and_volume() {
        let parameters = Fem3DParameters {
            material: FemMaterial {
                density: 10.0,
                ..FemMaterial::default()
            },
            ..Fem3DParameters::default()
        };
        let fem = Fem3DRepresentation::new("column", &two_cubes(), parameters)
            .expect("valid mesh");
        assert_relative_eq!(fem.model().total_mass(), 20.0, epsilon = 1e-9);
        assert_relative_eq!(
            fem.model()
                .check_volumes(fem.core().current_state())
                .expect("positive volumes"),
            2.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn fixed_base_holds_under_gravity() {
        let parameters = Fem3DParameters {
            integration_scheme: IntegrationScheme::ImplicitEuler,
            ..Fem3DParameters::default()
        };
        let mut fem = Fem3DRepresentation::new("column", &two_cubes(), parameters)
            .expect("valid mesh");
        fem.free_motion(1e-3, DVec3::new(0.0, 0.0, -9.81))
            .expect("stable step");
        let state = fem.core().current_state();
        assert_eq!(state.position(0), DVec3::ZERO);
        assert!(state.position(8).z < 2.0);
        assert_eq!(fem.core().compliance().nrows(), 36);
    }
}
