use std::sync::Arc;

use glam::{DMat3, DVec3};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{
    core::{
        shapes::Shape,
        types::{MassProperties, Pose, Velocity},
    },
    error::{PhysicsError, Result},
    utils::math::angular_velocity_to_quat,
};

/// Number of DOF of a rigid representation: linear then angular velocity.
pub const RIGID_NUM_DOF: usize = 6;

/// Physical parameters of a rigid representation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidParameters {
    pub density: f64,
    pub linear_damping: f64,
    pub angular_damping: f64,
    pub is_gravity_enabled: bool,
}

impl Default for RigidParameters {
    fn default() -> Self {
        Self {
            density: 1000.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            is_gravity_enabled: true,
        }
    }
}

/// Pose and velocity of a rigid representation. Velocities are those of the center of mass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RigidState {
    pub pose: Pose,
    pub velocity: Velocity,
}

/// Rigid body with mass properties derived from its shape.
///
/// `pose` places the shape frame; the center of mass sits at `mass.center` in that frame.
#[derive(Debug, Clone)]
pub struct RigidRepresentation {
    pub name: String,
    shape: Arc<Shape>,
    parameters: RigidParameters,
    mass: MassProperties,
    inverse_inertia: DMat3,
    initial_state: RigidState,
    previous_state: RigidState,
    current_state: RigidState,
    external_force: DVec3,
    external_torque: DVec3,
    compliance: DMatrix<f64>,
    pub is_active: bool,
}

impl RigidRepresentation {
    pub fn new(
        name: impl Into<String>,
        shape: Arc<Shape>,
        parameters: RigidParameters,
        pose: Pose,
    ) -> Result<Self> {
        shape.validate()?;
        if !(parameters.density > 0.0) {
            return Err(PhysicsError::invalid_parameter(format!(
                "rigid density must be positive, got {}",
                parameters.density
            )));
        }
        let mass = shape.mass_properties(parameters.density);
        Self::with_mass_properties(name, shape, parameters, mass, pose)
    }

    /// Builds a rigid representation with explicit mass properties, ignoring the density.
    pub fn with_mass_properties(
        name: impl Into<String>,
        shape: Arc<Shape>,
        parameters: RigidParameters,
        mass: MassProperties,
        pose: Pose,
    ) -> Result<Self> {
        if !(mass.mass > 0.0 && mass.mass.is_finite()) {
            return Err(PhysicsError::invalid_parameter(format!(
                "rigid mass must be positive, got {}",
                mass.mass
            )));
        }
        if mass.inertia.determinant().abs() <= f64::EPSILON {
            return Err(PhysicsError::singular("rigid inertia tensor is not invertible"));
        }
        let state = RigidState {
            pose,
            velocity: Velocity::default(),
        };
        Ok(Self {
            name: name.into(),
            shape,
            parameters,
            inverse_inertia: mass.inertia.inverse(),
            mass,
            initial_state: state,
            previous_state: state,
            current_state: state,
            external_force: DVec3::ZERO,
            external_torque: DVec3::ZERO,
            compliance: DMatrix::zeros(RIGID_NUM_DOF, RIGID_NUM_DOF),
            is_active: true,
        })
    }

    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    pub fn parameters(&self) -> &RigidParameters {
        &self.parameters
    }

    pub fn mass_properties(&self) -> &MassProperties {
        &self.mass
    }

    pub fn current_state(&self) -> &RigidState {
        &self.current_state
    }

    pub fn previous_state(&self) -> &RigidState {
        &self.previous_state
    }

    pub fn pose(&self) -> Pose {
        self.current_state.pose
    }

    pub fn velocity(&self) -> Velocity {
        self.current_state.velocity
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.current_state.pose = pose;
    }

    pub fn set_velocity(&mut self, velocity: Velocity) {
        self.current_state.velocity = velocity;
    }

    pub fn reset_state(&mut self) {
        self.current_state = self.initial_state;
        self.previous_state = self.initial_state;
    }

    /// World position of the center of mass.
    pub fn mass_center(&self) -> DVec3 {
        self.current_state.pose.transform_point(self.mass.center)
    }

    /// Force and torque (about the center of mass) applied during the next free motion.
    pub fn add_external_generalized_force(&mut self, force: DVec3, torque: DVec3) {
        self.external_force += force;
        self.external_torque += torque;
    }

    pub fn world_inverse_inertia(&self) -> DMat3 {
        let r = self.current_state.pose.rotation_matrix();
        r * self.inverse_inertia * r.transpose()
    }

    /// `blockdiag(dt/m·I, dt·I_world⁻¹)` of the last free motion.
    pub fn compliance(&self) -> &DMatrix<f64> {
        &self.compliance
    }

    pub fn before_update(&mut self) {
        self.previous_state = self.current_state;
    }

    /// Symplectic Euler step under gravity, damping and the accumulated external loads.
    pub fn free_motion(&mut self, dt: f64, gravity: DVec3) -> Result<()> {
        let inverse_inertia = self.world_inverse_inertia();

        let mut force = self.external_force;
        if self.parameters.is_gravity_enabled {
            force += gravity * self.mass.mass;
        }
        let velocity = &mut self.current_state.velocity;
        velocity.linear += force * (dt / self.mass.mass);
        velocity.angular += inverse_inertia * self.external_torque * dt;
        velocity.linear *= 1.0 / (1.0 + dt * self.parameters.linear_damping);
        velocity.angular *= 1.0 / (1.0 + dt * self.parameters.angular_damping);

        let Velocity { linear, angular } = *velocity;
        self.integrate_pose(linear, angular, dt);
        self.external_force = DVec3::ZERO;
        self.external_torque = DVec3::ZERO;

        self.update_compliance(dt, inverse_inertia);
        self.check_state()
    }

    /// Applies an MLCP velocity correction `[Δv, Δω]` and the matching pose correction.
    pub fn apply_correction(&mut self, dt: f64, delta: &DVector<f64>) -> Result<()> {
        if delta.len() != RIGID_NUM_DOF {
            return Err(PhysicsError::invalid_parameter(format!(
                "rigid correction needs {RIGID_NUM_DOF} values, got {}",
                delta.len()
            )));
        }
        let linear = DVec3::new(delta[0], delta[1], delta[2]);
        let angular = DVec3::new(delta[3], delta[4], delta[5]);
        self.current_state.velocity.linear += linear;
        self.current_state.velocity.angular += angular;
        self.integrate_pose(linear, angular, dt);
        self.check_state()
    }

    /// Moves the center of mass by `dt·linear` and rotates about it by `dt·angular`.
    fn integrate_pose(&mut self, linear: DVec3, angular: DVec3, dt: f64) {
        let pose = &mut self.current_state.pose;
        let center = pose.transform_point(self.mass.center) + linear * dt;
        pose.rotation = (angular_velocity_to_quat(angular, dt) * pose.rotation).normalize();
        pose.translation = center - pose.rotation * self.mass.center;
    }

    fn update_compliance(&mut self, dt: f64, inverse_inertia: DMat3) {
        self.compliance.fill(0.0);
        for i in 0..3 {
            self.compliance[(i, i)] = dt / self.mass.mass;
            for j in 0..3 {
                self.compliance[(3 + i, 3 + j)] = dt * inverse_inertia.col(j)[i];
            }
        }
    }

    fn check_state(&self) -> Result<()> {
        let RigidState { pose, velocity } = &self.current_state;
        if pose.translation.is_finite()
            && pose.rotation.is_finite()
            && velocity.linear.is_finite()
            && velocity.angular.is_finite()
        {
            Ok(())
        } else {
            Err(PhysicsError::InvalidState(format!(
                "rigid representation '{}' diverged",
                self.name
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sphere() -> RigidRepresentation {
        RigidRepresentation::new(
            "sphere",
            Arc::new(Shape::sphere(0.1)),
            RigidParameters::default(),
            Pose::IDENTITY,
        )
        .expect("valid sphere")
    }

    #[test]
    fn free_fall_is_symplectic() {
        let mut rigid = sphere();
        let gravity = DVec3::new(0.0, -9.81, 0.0);
        rigid.free_motion(1e-3, gravity).expect("finite state");
        assert_relative_eq!(rigid.velocity().linear.y, -9.81e-3, epsilon = 1e-12);
        assert_relative_eq!(rigid.pose().translation.y, -9.81e-6, epsilon = 1e-12);
    }

    #[test]
    fn compliance_is_inverse_mass_scaled_by_dt() {
        let mut rigid = sphere();
        rigid.free_motion(0.01, DVec3::ZERO).expect("finite state");
        let mass = rigid.mass_properties().mass;
        assert_relative_eq!(rigid.compliance()[(0, 0)], 0.01 / mass, epsilon = 1e-12);
        assert_eq!(rigid.compliance()[(0, 3)], 0.0);
    }

    #[test]
    fn zero_density_is_rejected() {
        let result = RigidRepresentation::new(
            "massless",
            Arc::new(Shape::sphere(0.1)),
            RigidParameters {
                density: 0.0,
                ..RigidParameters::default()
            },
            Pose::IDENTITY,
        );
        assert!(result.is_err());
    }
}
