//! Trilinear hexahedral finite element.
//!
//! Nodes are ordered as the corners of the reference cube `[-1, 1]³` with natural
//! coordinates (ε, η, μ):
//!
//! ```text
//!        7 ---- 6
//!       /|     /|      μ
//!      4 ---- 5 |      |  η
//!      | 3 ---| 2      | /
//!      |/     |/       |/
//!      0 ---- 1        +---- ε
//! ```
//!
//! Matrices are integrated with 2×2×2 Gauss-Legendre quadrature.

use nalgebra::{DMatrix, DVector, Matrix3, SMatrix, Vector3};

use crate::{
    config::MIN_ELEMENT_VOLUME,
    dynamics::{
        fem_element::{gather, scatter, FemElement, FemMaterial},
        ode_state::OdeState,
    },
    error::{PhysicsError, Result},
    utils::math::add_sub_matrix,
};

const EPSILON_SIGN: [f64; 8] = [-1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0];
const ETA_SIGN: [f64; 8] = [-1.0, -1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0];
const MU_SIGN: [f64; 8] = [-1.0, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 1.0];

type Matrix24 = SMatrix<f64, 24, 24>;
type Vector24 = SMatrix<f64, 24, 1>;

/// One quadrature point: natural coordinates and weight.
fn gauss_points() -> impl Iterator<Item = ([f64; 3], f64)> {
    let a = 1.0 / 3.0f64.sqrt();
    let abscissas = [-a, a];
    abscissas.into_iter().flat_map(move |e| {
        abscissas
            .into_iter()
            .flat_map(move |n| abscissas.into_iter().map(move |m| ([e, n, m], 1.0)))
    })
}

fn shape_function(i: usize, [e, n, m]: [f64; 3]) -> f64 {
    0.125 * (1.0 + e * EPSILON_SIGN[i]) * (1.0 + n * ETA_SIGN[i]) * (1.0 + m * MU_SIGN[i])
}

/// Derivatives of shape function `i` with respect to (ε, η, μ).
fn shape_derivatives(i: usize, [e, n, m]: [f64; 3]) -> Vector3<f64> {
    let (se, sn, sm) = (EPSILON_SIGN[i], ETA_SIGN[i], MU_SIGN[i]);
    Vector3::new(
        0.125 * se * (1.0 + n * sn) * (1.0 + m * sm),
        0.125 * sn * (1.0 + e * se) * (1.0 + m * sm),
        0.125 * sm * (1.0 + e * se) * (1.0 + n * sn),
    )
}

/// Jacobian of the natural-to-world map; row r holds ∂x/∂ξ_r.
fn jacobian(positions: &Vector24, point: [f64; 3]) -> Matrix3<f64> {
    let mut j = Matrix3::zeros();
    for i in 0..8 {
        let d = shape_derivatives(i, point);
        for r in 0..3 {
            for c in 0..3 {
                j[(r, c)] += d[r] * positions[3 * i + c];
            }
        }
    }
    j
}

/// 8-node hexahedral element with stiffness and mass computed once at rest.
#[derive(Debug, Clone)]
pub struct FemElement3DCube {
    node_ids: [usize; 8],
    material: FemMaterial,
    rest_positions: Vector24,
    rest_volume: f64,
    stiffness: Box<Matrix24>,
    mass: Box<Matrix24>,
}

impl FemElement3DCube {
    pub fn new(node_ids: [usize; 8], material: FemMaterial) -> Self {
        Self {
            node_ids,
            material,
            rest_positions: Vector24::zeros(),
            rest_volume: 0.0,
            stiffness: Box::new(Matrix24::zeros()),
            mass: Box::new(Matrix24::zeros()),
        }
    }

    pub fn material(&self) -> &FemMaterial {
        &self.material
    }

    pub fn rest_volume(&self) -> f64 {
        self.rest_volume
    }

    pub fn stiffness_matrix(&self) -> &Matrix24 {
        &self.stiffness
    }

    pub fn mass_matrix(&self) -> &Matrix24 {
        &self.mass
    }

    fn volume_of(&self, positions: &Vector24) -> Result<f64> {
        let volume: f64 = gauss_points()
            .map(|(point, weight)| weight * jacobian(positions, point).determinant())
            .sum();
        if volume <= MIN_ELEMENT_VOLUME {
            return Err(PhysicsError::DegenerateElement {
                node_ids: self.node_ids.to_vec(),
                volume,
            });
        }
        Ok(volume)
    }

    /// Strain-displacement matrix at `point`, with the Jacobian determinant.
    fn strain_displacement(
        &self,
        positions: &Vector24,
        point: [f64; 3],
    ) -> Result<(SMatrix<f64, 6, 24>, f64)> {
        let j = jacobian(positions, point);
        let det = j.determinant();
        let inverse = j.try_inverse().ok_or_else(|| PhysicsError::NonInvertibleJacobian {
            node_ids: self.node_ids.to_vec(),
            determinant: det,
        })?;

        let mut b = SMatrix::<f64, 6, 24>::zeros();
        for i in 0..8 {
            let d = inverse * shape_derivatives(i, point);
            let (dx, dy, dz) = (d[0], d[1], d[2]);
            let c = 3 * i;
            b[(0, c)] = dx;
            b[(1, c + 1)] = dy;
            b[(2, c + 2)] = dz;
            b[(3, c)] = dy;
            b[(3, c + 1)] = dx;
            b[(4, c + 1)] = dz;
            b[(4, c + 2)] = dy;
            b[(5, c)] = dz;
            b[(5, c + 2)] = dx;
        }
        Ok((b, det))
    }
}

impl FemElement for FemElement3DCube {
    fn node_ids(&self) -> &[usize] {
        &self.node_ids
    }

    fn initialize(&mut self, rest_state: &OdeState) -> Result<()> {
        self.check_node_ids(rest_state.num_nodes())?;
        self.material.validate()?;
        self.rest_positions = gather::<24>(rest_state.positions(), &self.node_ids);
        self.rest_volume = self.volume_of(&self.rest_positions)?;

        let c = self.material.constitutive_matrix();
        let mut stiffness = Matrix24::zeros();
        let mut mass = Matrix24::zeros();
        for (point, weight) in gauss_points() {
            let (b, det) = self.strain_displacement(&self.rest_positions, point)?;
            stiffness += b.transpose() * c * b * (weight * det);

            let mut phi = SMatrix::<f64, 3, 24>::zeros();
            for i in 0..8 {
                let n = shape_function(i, point);
                for axis in 0..3 {
                    phi[(axis, 3 * i + axis)] = n;
                }
            }
            mass += phi.transpose() * phi * (weight * det * self.material.density);
        }
        *self.stiffness = stiffness;
        *self.mass = mass;
        Ok(())
    }

    fn volume(&self, state: &OdeState) -> Result<f64> {
        self.volume_of(&gather::<24>(state.positions(), &self.node_ids))
    }

    fn add_force(&self, state: &OdeState, f: &mut DVector<f64>, scale: f64) {
        let displacement = gather::<24>(state.positions(), &self.node_ids) - self.rest_positions;
        let force = -(*self.stiffness * displacement);
        scatter(&force, &self.node_ids, f, scale);
    }

    fn add_mass(&self, _state: &OdeState, m: &mut DMatrix<f64>, scale: f64) {
        add_sub_matrix(&*self.mass, &self.node_ids, 3, m, scale);
    }

    fn add_damping(&self, _state: &OdeState, _d: &mut DMatrix<f64>, _scale: f64) {}

    fn add_stiffness(&self, _state: &OdeState, k: &mut DMatrix<f64>, scale: f64) {
        add_sub_matrix(&*self.stiffness, &self.node_ids, 3, k, scale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::DVec3;

    fn cube_state(corners: &[DVec3; 8]) -> OdeState {
        let mut state = OdeState::with_num_dof(3, 8).expect("valid size");
        for (node, corner) in corners.iter().enumerate() {
            state.set_position(node, *corner);
        }
        state
    }

    fn unit_cube() -> [DVec3; 8] {
        std::array::from_fn(|i| {
            DVec3::new(
                (EPSILON_SIGN[i] + 1.0) * 0.5,
                (ETA_SIGN[i] + 1.0) * 0.5,
                (MU_SIGN[i] + 1.0) * 0.5,
            )
        })
    }

    #[test]
    fn mass_matrix_sums_to_element_mass() {
        let material = FemMaterial {
            density: 250.0,
            ..FemMaterial::default()
        };
        let mut cube = FemElement3DCube::new([0, 1, 2, 3, 4, 5, 6, 7], material);
        cube.initialize(&cube_state(&unit_cube())).expect("valid cube");
        // Each axis block sums to the total mass.
        let total: f64 = (0..8)
            .flat_map(|i| (0..8).map(move |j| (i, j)))
            .map(|(i, j)| cube.mass_matrix()[(3 * i, 3 * j)])
            .sum();
        assert_relative_eq!(total, 250.0, epsilon = 1e-9);
    }

    #[test]
    fn rigid_translation_produces_no_force() {
        let mut cube = FemElement3DCube::new([0, 1, 2, 3, 4, 5, 6, 7], FemMaterial::default());
        let rest = cube_state(&unit_cube());
        cube.initialize(&rest).expect("valid cube");

        let moved = unit_cube().map(|p| p + DVec3::new(0.3, -2.0, 1.0));
        let mut f = DVector::zeros(24);
        cube.add_force(&cube_state(&moved), &mut f, 1.0);
        assert!(f.amax() < 1e-6, "rigid motion must not strain the element");
    }
}
