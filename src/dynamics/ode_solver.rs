//! Time integration of `M·a = F(x, v)` for deformable representations.
//!
//! Every scheme forms a system matrix `S`, solves one linear system with it and keeps
//! `S⁻¹` (with boundary conditions applied) as the compliance matrix used to build the
//! frame's constraints.
//!
//! | Scheme | `S` | Right-hand side | Update |
//! |---|---|---|---|
//! | explicit Euler | `M/dt` | `F` | `x₁ = x₀ + dt·v₀`, `v₁ = v₀ + Δv` |
//! | modified explicit Euler | `M/dt` | `F` | `v₁ = v₀ + Δv`, `x₁ = x₀ + dt·v₁` |
//! | implicit Euler | `M/dt + D + dt·K` | `F − dt·K·v₀` | `v₁ = v₀ + Δv`, `x₁ = x₀ + dt·v₁` |
//! | static | `K` | `F` | `x₁ = x₀ + Δx`, `v₁ = 0` |
//! | Runge-Kutta 4 | `M/dt` | `F` at 4 stages | classic RK4 on `(x, v)` |
//!
//! `K` follows the stiffness convention `K = −∂F/∂x`. The linear variants assemble `M`, `D`
//! and `K` (and factorize `S`) once and only re-evaluate `F` afterwards, until the time step
//! or the fixed DOF change.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{
    dynamics::{
        linear_solver::{LinearSolveAndInverse, LinearSolverKind},
        ode_state::OdeState,
    },
    error::{PhysicsError, Result},
};

/// Equations of motion of a deformable model.
pub trait OdeEquation {
    /// Generalized forces at `state`.
    fn compute_f(&mut self, state: &OdeState) -> DVector<f64>;

    fn compute_m(&mut self, state: &OdeState) -> DMatrix<f64>;

    fn compute_d(&mut self, state: &OdeState) -> DMatrix<f64>;

    /// Stiffness `−∂F/∂x`.
    fn compute_k(&mut self, state: &OdeState) -> DMatrix<f64>;

    fn compute_fmdk(
        &mut self,
        state: &OdeState,
    ) -> (DVector<f64>, DMatrix<f64>, DMatrix<f64>, DMatrix<f64>) {
        (
            self.compute_f(state),
            self.compute_m(state),
            self.compute_d(state),
            self.compute_k(state),
        )
    }
}

/// Time integration scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IntegrationScheme {
    ExplicitEuler,
    LinearExplicitEuler,
    #[default]
    ModifiedExplicitEuler,
    LinearModifiedExplicitEuler,
    ImplicitEuler,
    LinearImplicitEuler,
    Static,
    LinearStatic,
    RungeKutta4,
    LinearRungeKutta4,
}

impl IntegrationScheme {
    /// Linear schemes assemble M, D and K once and reuse them.
    pub fn is_linear(self) -> bool {
        matches!(
            self,
            IntegrationScheme::LinearExplicitEuler
                | IntegrationScheme::LinearModifiedExplicitEuler
                | IntegrationScheme::LinearImplicitEuler
                | IntegrationScheme::LinearStatic
                | IntegrationScheme::LinearRungeKutta4
        )
    }

    fn family(self) -> SchemeFamily {
        match self {
            IntegrationScheme::ExplicitEuler | IntegrationScheme::LinearExplicitEuler => {
                SchemeFamily::ExplicitEuler
            }
            IntegrationScheme::ModifiedExplicitEuler
            | IntegrationScheme::LinearModifiedExplicitEuler => SchemeFamily::ModifiedExplicitEuler,
            IntegrationScheme::ImplicitEuler | IntegrationScheme::LinearImplicitEuler => {
                SchemeFamily::ImplicitEuler
            }
            IntegrationScheme::Static | IntegrationScheme::LinearStatic => SchemeFamily::Static,
            IntegrationScheme::RungeKutta4 | IntegrationScheme::LinearRungeKutta4 => {
                SchemeFamily::RungeKutta4
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchemeFamily {
    ExplicitEuler,
    ModifiedExplicitEuler,
    ImplicitEuler,
    Static,
    RungeKutta4,
}

/// Matrices of a linear scheme, valid while the time step and the fixed DOF are unchanged.
#[derive(Debug)]
struct CachedSystem {
    dt: f64,
    boundary_conditions: Vec<usize>,
    k: DMatrix<f64>,
}

impl CachedSystem {
    fn matches(&self, dt: f64, state: &OdeState) -> bool {
        self.dt == dt
            && self.k.nrows() == state.num_dof()
            && self.boundary_conditions == state.boundary_conditions()
    }
}

/// Integrates an [`OdeEquation`] with a given scheme and linear solver.
#[derive(Debug)]
pub struct OdeSolver {
    scheme: IntegrationScheme,
    linear_solver: Box<dyn LinearSolveAndInverse>,
    system_matrix: DMatrix<f64>,
    compliance_matrix: DMatrix<f64>,
    cached: Option<CachedSystem>,
}

impl OdeSolver {
    pub fn new(scheme: IntegrationScheme, linear_solver: LinearSolverKind) -> Self {
        Self {
            scheme,
            linear_solver: linear_solver.build(),
            system_matrix: DMatrix::zeros(0, 0),
            compliance_matrix: DMatrix::zeros(0, 0),
            cached: None,
        }
    }

    pub fn scheme(&self) -> IntegrationScheme {
        self.scheme
    }

    pub fn system_matrix(&self) -> &DMatrix<f64> {
        &self.system_matrix
    }

    /// Inverse of the last system matrix, zero on rows/columns of fixed DOF.
    pub fn compliance_matrix(&self) -> &DMatrix<f64> {
        &self.compliance_matrix
    }

    /// Advances `current` by `dt` into `new`.
    ///
    /// `new` must have the size of `current`; its boundary conditions are not touched.
    pub fn solve(
        &mut self,
        dt: f64,
        equation: &mut dyn OdeEquation,
        current: &OdeState,
        new: &mut OdeState,
    ) -> Result<()> {
        if dt <= 0.0 || !dt.is_finite() {
            return Err(PhysicsError::invalid_parameter(format!(
                "time step must be positive, got {dt}"
            )));
        }
        if new.num_dof() != current.num_dof() {
            *new = current.clone();
        }

        let family = self.scheme.family();
        let reuse = self.scheme.is_linear()
            && self
                .cached
                .as_ref()
                .is_some_and(|cached| cached.matches(dt, current));

        let force = if reuse {
            equation.compute_f(current)
        } else {
            let (f, m, d, k) = equation.compute_fmdk(current);
            let system = match family {
                SchemeFamily::ExplicitEuler
                | SchemeFamily::ModifiedExplicitEuler
                | SchemeFamily::RungeKutta4 => &m / dt,
                SchemeFamily::ImplicitEuler => &m / dt + &d + &k * dt,
                SchemeFamily::Static => k.clone(),
            };
            self.factorize(system, current)?;
            self.cached = Some(CachedSystem {
                dt,
                boundary_conditions: current.boundary_conditions().to_vec(),
                k,
            });
            f
        };

        match family {
            SchemeFamily::ExplicitEuler => {
                let delta_v = self.solve_constrained(force, current)?;
                *new.positions_mut() = current.positions() + current.velocities() * dt;
                *new.velocities_mut() = current.velocities() + delta_v;
            }
            SchemeFamily::ModifiedExplicitEuler => {
                let delta_v = self.solve_constrained(force, current)?;
                *new.velocities_mut() = current.velocities() + delta_v;
                *new.positions_mut() = current.positions() + new.velocities() * dt;
            }
            SchemeFamily::ImplicitEuler => {
                let k = self.stiffness()?;
                let rhs = force - k * current.velocities() * dt;
                let delta_v = self.solve_constrained(rhs, current)?;
                *new.velocities_mut() = current.velocities() + delta_v;
                *new.positions_mut() = current.positions() + new.velocities() * dt;
            }
            SchemeFamily::Static => {
                let delta_x = self.solve_constrained(force, current)?;
                *new.positions_mut() = current.positions() + delta_x;
                new.velocities_mut().fill(0.0);
            }
            SchemeFamily::RungeKutta4 => self.runge_kutta4(dt, equation, current, new, force)?,
        }

        for &dof in current.boundary_conditions() {
            new.positions_mut()[dof] = current.positions()[dof];
            new.velocities_mut()[dof] = 0.0;
        }

        if !new.is_valid() {
            return Err(PhysicsError::InvalidState(format!(
                "{:?} produced non-finite values",
                self.scheme
            )));
        }
        Ok(())
    }

    fn factorize(&mut self, mut system: DMatrix<f64>, state: &OdeState) -> Result<()> {
        state.apply_boundary_conditions_to_matrix(&mut system, true);
        self.linear_solver.set_matrix(&system)?;
        let mut compliance = self.linear_solver.inverse()?;
        state.apply_boundary_conditions_to_matrix(&mut compliance, false);
        self.system_matrix = system;
        self.compliance_matrix = compliance;
        Ok(())
    }

    fn stiffness(&self) -> Result<&DMatrix<f64>> {
        self.cached
            .as_ref()
            .map(|cached| &cached.k)
            .ok_or_else(|| PhysicsError::singular("stiffness matrix not assembled"))
    }

    fn solve_constrained(&self, mut rhs: DVector<f64>, state: &OdeState) -> Result<DVector<f64>> {
        state.apply_boundary_conditions_to_vector(&mut rhs);
        self.linear_solver.solve(&rhs)
    }

    /// `S = M/dt`, so `M⁻¹·F = S⁻¹·F / dt`.
    fn acceleration(&self, force: DVector<f64>, state: &OdeState, dt: f64) -> Result<DVector<f64>> {
        Ok(self.solve_constrained(force, state)? / dt)
    }

    fn runge_kutta4(
        &self,
        dt: f64,
        equation: &mut dyn OdeEquation,
        current: &OdeState,
        new: &mut OdeState,
        force: DVector<f64>,
    ) -> Result<()> {
        let x0 = current.positions().clone();
        let v0 = current.velocities().clone();
        let mut stage = current.clone();

        let k1x = v0.clone();
        let k1v = self.acceleration(force, current, dt)?;

        *stage.positions_mut() = &x0 + &k1x * (dt / 2.0);
        *stage.velocities_mut() = &v0 + &k1v * (dt / 2.0);
        let k2x = stage.velocities().clone();
        let k2v = self.acceleration(equation.compute_f(&stage), current, dt)?;

        *stage.positions_mut() = &x0 + &k2x * (dt / 2.0);
        *stage.velocities_mut() = &v0 + &k2v * (dt / 2.0);
        let k3x = stage.velocities().clone();
        let k3v = self.acceleration(equation.compute_f(&stage), current, dt)?;

        *stage.positions_mut() = &x0 + &k3x * dt;
        *stage.velocities_mut() = &v0 + &k3v * dt;
        let k4x = stage.velocities().clone();
        let k4v = self.acceleration(equation.compute_f(&stage), current, dt)?;

        *new.positions_mut() = &x0 + (k1x + &k2x * 2.0 + &k3x * 2.0 + k4x) * (dt / 6.0);
        *new.velocities_mut() = &v0 + (k1v + &k2v * 2.0 + &k3v * 2.0 + k4v) * (dt / 6.0);
        Ok(())
    }
}
