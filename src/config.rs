//! Global configuration constants and runtime settings for the physics core.

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Default gravity vector applied to rigid, deformable and particle representations (Y-up).
pub const DEFAULT_GRAVITY: [f64; 3] = [0.0, -9.81, 0.0];

/// Default rate of the physics thread (in Hz).
pub const DEFAULT_PHYSICS_RATE: f64 = 1000.0;

/// Maximum number of Gauss-Seidel sweeps performed by the MLCP solver.
pub const DEFAULT_MLCP_MAX_ITERATIONS: usize = 30;

/// Convergence threshold on the largest multiplier change between two sweeps.
pub const DEFAULT_MLCP_EPSILON_CONVERGENCE: f64 = 1e-8;

/// Violation below which a unilateral constraint is considered satisfied.
pub const DEFAULT_MLCP_CONTACT_TOLERANCE: f64 = 2e-5;

/// Over-relaxation applied to each Gauss-Seidel update.
pub const DEFAULT_MLCP_RELAXATION: f64 = 1.0;

/// Signed distance under which a vertex is reported in contact with a plane.
pub const DEFAULT_CONTACT_EPSILON: f64 = 1e-10;

/// Tolerance used when bracketing polynomial roots during continuous collision detection.
pub const DEFAULT_CCD_ROOT_EPSILON: f64 = 1e-10;

/// Maximum number of triangles stored in an AABB tree leaf.
pub const DEFAULT_AABB_TREE_LEAF_SIZE: usize = 4;

/// Default duration of a pose interpolation (in seconds).
pub const DEFAULT_INTERPOLATION_DURATION: f64 = 1.0;

/// Simulated seconds between two debug listings of the collision pairs.
pub const DEFAULT_PAIR_LOG_INTERVAL: f64 = 5.0;

/// Smallest element volume accepted when building finite elements.
pub const MIN_ELEMENT_VOLUME: f64 = 1e-12;

/// Tuning of the projected Gauss-Seidel MLCP solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MlcpSolverConfig {
    pub max_iterations: usize,
    pub epsilon_convergence: f64,
    pub contact_tolerance: f64,
    pub relaxation: f64,
}

impl Default for MlcpSolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MLCP_MAX_ITERATIONS,
            epsilon_convergence: DEFAULT_MLCP_EPSILON_CONVERGENCE,
            contact_tolerance: DEFAULT_MLCP_CONTACT_TOLERANCE,
            relaxation: DEFAULT_MLCP_RELAXATION,
        }
    }
}

/// Runtime settings of a [`crate::world::PhysicsManager`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Target update rate of the physics thread.
    pub rate_hz: f64,
    /// Gravity applied to every representation that enables it.
    pub gravity: DVec3,
    /// Fan per-pair collision work out on the rayon pool.
    pub parallel: bool,
    pub mlcp: MlcpSolverConfig,
    /// Simulated seconds between two debug listings of the collision pairs.
    pub log_pairs_interval: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            rate_hz: DEFAULT_PHYSICS_RATE,
            gravity: DVec3::from_array(DEFAULT_GRAVITY),
            parallel: cfg!(feature = "parallel"),
            mlcp: MlcpSolverConfig::default(),
            log_pairs_interval: DEFAULT_PAIR_LOG_INTERVAL,
        }
    }
}

impl PhysicsConfig {
    /// Period matching [`Self::rate_hz`], falling back to the default rate for invalid values.
    pub fn period(&self) -> f64 {
        if self.rate_hz > 0.0 && self.rate_hz.is_finite() {
            1.0 / self.rate_hz
        } else {
            1.0 / DEFAULT_PHYSICS_RATE
        }
    }
}
