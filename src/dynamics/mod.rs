//! Simulation dynamics modules: ODE integration, finite elements, springs and the MLCP solver.

pub mod fem3d_cube;
pub mod fem3d_tetrahedron;
pub mod fem_element;
pub mod linear_solver;
pub mod mlcp;
pub mod ode_solver;
pub mod ode_state;
pub mod pose_interpolator;
pub mod springs;

pub use fem3d_cube::FemElement3DCube;
pub use fem3d_tetrahedron::FemElement3DTetrahedron;
pub use fem_element::{FemElement, FemMaterial};
pub use linear_solver::{LinearSolveAndInverse, LinearSolverKind};
pub use mlcp::{GaussSeidelMlcpSolver, MlcpConstraintType, MlcpPhysicsProblem, MlcpSolution};
pub use ode_solver::{IntegrationScheme, OdeEquation, OdeSolver};
pub use ode_state::OdeState;
pub use pose_interpolator::PoseInterpolator;
pub use springs::{LinearSpring, SpringParameters};
