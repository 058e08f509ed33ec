//! Elements assembled into the equations of motion of deformable representations.

use nalgebra::{DMatrix, DVector, SMatrix};
use serde::{Deserialize, Serialize};

use crate::{
    dynamics::ode_state::OdeState,
    error::{PhysicsError, Result},
};

/// Isotropic linear elastic material.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FemMaterial {
    pub young_modulus: f64,
    pub poisson_ratio: f64,
    pub density: f64,
}

impl Default for FemMaterial {
    fn default() -> Self {
        Self {
            young_modulus: 1e6,
            poisson_ratio: 0.45,
            density: 1000.0,
        }
    }
}

impl FemMaterial {
    pub fn validate(&self) -> Result<()> {
        if self.young_modulus <= 0.0 {
            return Err(PhysicsError::invalid_parameter(
                "Young's modulus must be positive",
            ));
        }
        if !(self.poisson_ratio > -1.0 && self.poisson_ratio < 0.5) {
            return Err(PhysicsError::invalid_parameter(
                "Poisson ratio must be in (-1, 0.5)",
            ));
        }
        if self.density <= 0.0 {
            return Err(PhysicsError::invalid_parameter("density must be positive"));
        }
        Ok(())
    }

    /// Constitutive matrix for strains ordered xx, yy, zz, xy, yz, zx (engineering shear).
    pub fn constitutive_matrix(&self) -> SMatrix<f64, 6, 6> {
        let e = self.young_modulus;
        let nu = self.poisson_ratio;
        let lambda = e * nu / ((1.0 + nu) * (1.0 - 2.0 * nu));
        let mu = e / (2.0 * (1.0 + nu));

        let mut c = SMatrix::<f64, 6, 6>::zeros();
        for i in 0..3 {
            for j in 0..3 {
                c[(i, j)] = lambda;
            }
            c[(i, i)] = lambda + 2.0 * mu;
            c[(i + 3, i + 3)] = mu;
        }
        c
    }
}

/// A spring or volumetric element scatter-adding into representation-level vectors and
/// matrices at the DOF of its nodes.
///
/// All elements work on states with 3 DOF per node.
pub trait FemElement: Send + Sync + std::fmt::Debug {
    fn node_ids(&self) -> &[usize];

    /// Computes rest quantities from the rest state; fails on degenerate geometry.
    fn initialize(&mut self, rest_state: &OdeState) -> Result<()>;

    /// Current volume, failing for inverted or collapsed elements.
    fn volume(&self, state: &OdeState) -> Result<f64>;

    fn add_force(&self, state: &OdeState, f: &mut DVector<f64>, scale: f64);

    fn add_mass(&self, state: &OdeState, m: &mut DMatrix<f64>, scale: f64);

    fn add_damping(&self, state: &OdeState, d: &mut DMatrix<f64>, scale: f64);

    fn add_stiffness(&self, state: &OdeState, k: &mut DMatrix<f64>, scale: f64);

    fn add_fmdk(
        &self,
        state: &OdeState,
        f: &mut DVector<f64>,
        m: &mut DMatrix<f64>,
        d: &mut DMatrix<f64>,
        k: &mut DMatrix<f64>,
    ) {
        self.add_force(state, f, 1.0);
        self.add_mass(state, m, 1.0);
        self.add_damping(state, d, 1.0);
        self.add_stiffness(state, k, 1.0);
    }

    /// Checks that every node id exists in a state of `num_nodes` nodes.
    fn check_node_ids(&self, num_nodes: usize) -> Result<()> {
        match self.node_ids().iter().find(|&&node| node >= num_nodes) {
            Some(&node) => Err(PhysicsError::NodeOutOfRange { node, num_nodes }),
            None => Ok(()),
        }
    }
}

/// Gathers the positions of `node_ids` into one flat vector.
pub(crate) fn gather<const N: usize>(
    vector: &DVector<f64>,
    node_ids: &[usize],
) -> SMatrix<f64, N, 1> {
    SMatrix::<f64, N, 1>::from_fn(|i, _| vector[node_ids[i / 3] * 3 + i % 3])
}

/// Scatter-adds an element vector into a representation-level vector.
pub(crate) fn scatter<const N: usize>(
    local: &SMatrix<f64, N, 1>,
    node_ids: &[usize],
    target: &mut DVector<f64>,
    scale: f64,
) {
    for i in 0..N {
        target[node_ids[i / 3] * 3 + i % 3] += scale * local[i];
    }
}
