use glam::{DMat3, DVec3};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{
    dynamics::{fem_element::FemElement, ode_state::OdeState},
    error::{PhysicsError, Result},
    utils::math::{add_block3, add_node_vec3, outer},
};

/// Stiffness and damping of one family of springs.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SpringParameters {
    pub stiffness: f64,
    pub damping: f64,
}

impl SpringParameters {
    pub fn new(stiffness: f64, damping: f64) -> Self {
        Self { stiffness, damping }
    }
}

/// Linear spring between two nodes.
///
/// The force on node 0 is `k(l − l₀)u + c((v₁ − v₀)·u)u` with `u` the unit vector from node 0
/// to node 1; node 1 receives the opposite force.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSpring {
    node_ids: [usize; 2],
    pub stiffness: f64,
    pub damping: f64,
    rest_length: f64,
}

impl LinearSpring {
    pub fn new(node0: usize, node1: usize, parameters: SpringParameters) -> Self {
        Self {
            node_ids: [node0, node1],
            stiffness: parameters.stiffness,
            damping: parameters.damping,
            rest_length: 0.0,
        }
    }

    pub fn rest_length(&self) -> f64 {
        self.rest_length
    }

    fn axis(&self, state: &OdeState) -> Option<(DVec3, f64)> {
        let delta = state.position(self.node_ids[1]) - state.position(self.node_ids[0]);
        let length = delta.length();
        (length > f64::EPSILON).then(|| (delta / length, length))
    }

    fn add_pair_blocks(&self, block: &DMat3, target: &mut DMatrix<f64>, scale: f64) {
        let [a, b] = self.node_ids;
        add_block3(target, 3 * a, 3 * a, block, scale);
        add_block3(target, 3 * b, 3 * b, block, scale);
        add_block3(target, 3 * a, 3 * b, block, -scale);
        add_block3(target, 3 * b, 3 * a, block, -scale);
    }
}

impl FemElement for LinearSpring {
    fn node_ids(&self) -> &[usize] {
        &self.node_ids
    }

    fn initialize(&mut self, rest_state: &OdeState) -> Result<()> {
        self.check_node_ids(rest_state.num_nodes())?;
        let (_, length) = self.axis(rest_state).ok_or_else(|| PhysicsError::DegenerateElement {
            node_ids: self.node_ids.to_vec(),
            volume: 0.0,
        })?;
        self.rest_length = length;
        Ok(())
    }

    fn volume(&self, _state: &OdeState) -> Result<f64> {
        Ok(0.0)
    }

    fn add_force(&self, state: &OdeState, f: &mut DVector<f64>, scale: f64) {
        let Some((u, length)) = self.axis(state) else {
            return;
        };
        let relative_velocity = state.velocity(self.node_ids[1]) - state.velocity(self.node_ids[0]);
        let magnitude =
            self.stiffness * (length - self.rest_length) + self.damping * relative_velocity.dot(u);
        let force = u * (magnitude * scale);
        add_node_vec3(f, 3, self.node_ids[0], force);
        add_node_vec3(f, 3, self.node_ids[1], -force);
    }

    fn add_mass(&self, _state: &OdeState, _m: &mut DMatrix<f64>, _scale: f64) {}

    fn add_damping(&self, state: &OdeState, d: &mut DMatrix<f64>, scale: f64) {
        if let Some((u, _)) = self.axis(state) {
            self.add_pair_blocks(&(outer(u, u) * self.damping), d, scale);
        }
    }

    fn add_stiffness(&self, state: &OdeState, k: &mut DMatrix<f64>, scale: f64) {
        if let Some((u, length)) = self.axis(state) {
            let ratio = self.rest_length / length;
            let block = (DMat3::IDENTITY * (1.0 - ratio) + outer(u, u) * ratio) * self.stiffness;
            self.add_pair_blocks(&block, k, scale);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_nodes(length: f64) -> OdeState {
        let mut state = OdeState::with_num_dof(3, 2).expect("valid size");
        state.set_position(1, DVec3::new(length, 0.0, 0.0));
        state
    }

    #[test]
    fn stretched_spring_pulls_nodes_together() {
        let mut spring = LinearSpring::new(0, 1, SpringParameters::new(10.0, 0.0));
        spring.initialize(&two_nodes(1.0)).expect("valid spring");

        let stretched = two_nodes(1.5);
        let mut f = DVector::zeros(6);
        spring.add_force(&stretched, &mut f, 1.0);
        assert_relative_eq!(f[0], 5.0);
        assert_relative_eq!(f[3], -5.0);
    }

    #[test]
    fn stiffness_is_the_negative_force_gradient() {
        let mut spring = LinearSpring::new(0, 1, SpringParameters::new(7.0, 0.0));
        spring.initialize(&two_nodes(1.0)).expect("valid spring");
        let mut state = two_nodes(1.3);
        state.set_position(1, DVec3::new(1.3, 0.4, -0.2));

        let mut k = DMatrix::zeros(6, 6);
        spring.add_stiffness(&state, &mut k, 1.0);

        let h = 1e-6;
        for column in 0..6 {
            let mut plus = state.clone();
            plus.positions_mut()[column] += h;
            let mut minus = state.clone();
            minus.positions_mut()[column] -= h;
            let (mut fp, mut fm) = (DVector::zeros(6), DVector::zeros(6));
            spring.add_force(&plus, &mut fp, 1.0);
            spring.add_force(&minus, &mut fm, 1.0);
            let gradient = (fp - fm) / (2.0 * h);
            for row in 0..6 {
                assert_relative_eq!(k[(row, column)], -gradient[row], epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn zero_length_spring_is_rejected() {
        let mut spring = LinearSpring::new(0, 1, SpringParameters::new(1.0, 0.0));
        assert!(spring.initialize(&two_nodes(0.0)).is_err());
    }
}
