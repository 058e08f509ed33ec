use nalgebra::{DMatrix, DVector, Matrix4, SMatrix};

use crate::{
    config::MIN_ELEMENT_VOLUME,
    dynamics::{
        fem_element::{gather, scatter, FemElement, FemMaterial},
        ode_state::OdeState,
    },
    error::{PhysicsError, Result},
    utils::math::add_sub_matrix,
};

type Matrix12 = SMatrix<f64, 12, 12>;
type Vector12 = SMatrix<f64, 12, 1>;

/// Linear (constant strain) tetrahedron.
///
/// Nodes must be ordered so that `(x1 − x0)·((x2 − x0) × (x3 − x0)) > 0`.
#[derive(Debug, Clone)]
pub struct FemElement3DTetrahedron {
    node_ids: [usize; 4],
    material: FemMaterial,
    rest_positions: Vector12,
    rest_volume: f64,
    stiffness: Matrix12,
    mass: Matrix12,
}

impl FemElement3DTetrahedron {
    pub fn new(node_ids: [usize; 4], material: FemMaterial) -> Self {
        Self {
            node_ids,
            material,
            rest_positions: Vector12::zeros(),
            rest_volume: 0.0,
            stiffness: Matrix12::zeros(),
            mass: Matrix12::zeros(),
        }
    }

    pub fn rest_volume(&self) -> f64 {
        self.rest_volume
    }

    fn signed_volume(positions: &Vector12) -> f64 {
        let p = |i: usize| positions.fixed_rows::<3>(3 * i).into_owned();
        let (a, b, c) = (p(1) - p(0), p(2) - p(0), p(3) - p(0));
        a.dot(&b.cross(&c)) / 6.0
    }

    fn check_volume(&self, volume: f64) -> Result<f64> {
        if volume <= MIN_ELEMENT_VOLUME {
            return Err(PhysicsError::DegenerateElement {
                node_ids: self.node_ids.to_vec(),
                volume,
            });
        }
        Ok(volume)
    }
}

impl FemElement for FemElement3DTetrahedron {
    fn node_ids(&self) -> &[usize] {
        &self.node_ids
    }

    fn initialize(&mut self, rest_state: &OdeState) -> Result<()> {
        self.check_node_ids(rest_state.num_nodes())?;
        self.material.validate()?;
        self.rest_positions = gather::<12>(rest_state.positions(), &self.node_ids);
        self.rest_volume = self.check_volume(Self::signed_volume(&self.rest_positions))?;

        // Rows of the inverse of [1 x y z] give the linear shape function coefficients.
        let coordinates = Matrix4::from_fn(|i, j| {
            if j == 0 {
                1.0
            } else {
                self.rest_positions[3 * i + j - 1]
            }
        });
        let coefficients = coordinates.try_inverse().ok_or_else(|| {
            PhysicsError::DegenerateElement {
                node_ids: self.node_ids.to_vec(),
                volume: self.rest_volume,
            }
        })?;

        let mut b = SMatrix::<f64, 6, 12>::zeros();
        for i in 0..4 {
            let (dx, dy, dz) = (
                coefficients[(1, i)],
                coefficients[(2, i)],
                coefficients[(3, i)],
            );
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
        let c = self.material.constitutive_matrix();
        self.stiffness = b.transpose() * c * b * self.rest_volume;

        let factor = self.material.density * self.rest_volume / 20.0;
        self.mass = Matrix12::from_fn(|row, col| {
            if row % 3 != col % 3 {
                0.0
            } else if row / 3 == col / 3 {
                2.0 * factor
            } else {
                factor
            }
        });
        Ok(())
    }

    fn volume(&self, state: &OdeState) -> Result<f64> {
        self.check_volume(Self::signed_volume(&gather::<12>(
            state.positions(),
            &self.node_ids,
        )))
    }

    fn add_force(&self, state: &OdeState, f: &mut DVector<f64>, scale: f64) {
        let displacement = gather::<12>(state.positions(), &self.node_ids) - self.rest_positions;
        let force = -(self.stiffness * displacement);
        scatter(&force, &self.node_ids, f, scale);
    }

    fn add_mass(&self, _state: &OdeState, m: &mut DMatrix<f64>, scale: f64) {
        add_sub_matrix(&self.mass, &self.node_ids, 3, m, scale);
    }

    fn add_damping(&self, _state: &OdeState, _d: &mut DMatrix<f64>, _scale: f64) {}

    fn add_stiffness(&self, _state: &OdeState, k: &mut DMatrix<f64>, scale: f64) {
        add_sub_matrix(&self.stiffness, &self.node_ids, 3, k, scale);
    }
}
