//! Mixed linear complementarity problem assembled each frame from the active constraints.
//!
//! With `w = A·x + b`, every constraint block is one of:
//! * bilateral: `w = 0`, `x` free,
//! * unilateral: `x ≥ 0`, `w ≥ 0`, `x·w = 0`,
//! * unilateral frictional: a unilateral normal row followed by two tangential rows whose
//!   multipliers stay inside the Coulomb disk `|x_t| ≤ μ·x_n`.

use log::trace;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::config::MlcpSolverConfig;

/// Kind of one constraint block in the MLCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MlcpConstraintType {
    Bilateral1D,
    Bilateral2D,
    Bilateral3D,
    Unilateral,
    UnilateralFrictional,
}

impl MlcpConstraintType {
    /// Number of MLCP rows used by one constraint of this kind.
    pub fn num_rows(self) -> usize {
        match self {
            MlcpConstraintType::Bilateral1D | MlcpConstraintType::Unilateral => 1,
            MlcpConstraintType::Bilateral2D => 2,
            MlcpConstraintType::Bilateral3D | MlcpConstraintType::UnilateralFrictional => 3,
        }
    }
}

/// Global problem of one frame together with the matrices needed to distribute its solution.
///
/// `h` maps representation DOF velocities to constraint rows, `cht = C·Hᵀ` with `C` the
/// block-diagonal compliance of every active representation, and `a = H·C·Hᵀ`.
#[derive(Debug, Clone, PartialEq)]
pub struct MlcpPhysicsProblem {
    pub a: DMatrix<f64>,
    pub b: DVector<f64>,
    /// Friction coefficient of every constraint block, 0 for frictionless blocks.
    pub mu: Vec<f64>,
    pub constraint_types: Vec<MlcpConstraintType>,
    pub h: DMatrix<f64>,
    pub cht: DMatrix<f64>,
}

impl Default for MlcpPhysicsProblem {
    fn default() -> Self {
        Self::zero(0, 0)
    }
}

impl MlcpPhysicsProblem {
    /// Problem with `num_rows` constraint rows over `num_dof` representation DOF, all zero.
    pub fn zero(num_rows: usize, num_dof: usize) -> Self {
        Self {
            a: DMatrix::zeros(num_rows, num_rows),
            b: DVector::zeros(num_rows),
            mu: Vec::new(),
            constraint_types: Vec::new(),
            h: DMatrix::zeros(num_rows, num_dof),
            cht: DMatrix::zeros(num_dof, num_rows),
        }
    }

    pub fn num_rows(&self) -> usize {
        self.b.len()
    }

    pub fn num_dof(&self) -> usize {
        self.h.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.b.is_empty()
    }

    /// True when the constraint blocks cover exactly the rows of the problem.
    pub fn is_consistent(&self) -> bool {
        let rows: usize = self.constraint_types.iter().map(|t| t.num_rows()).sum();
        rows == self.num_rows()
            && self.mu.len() == self.constraint_types.len()
            && self.a.nrows() == rows
            && self.a.ncols() == rows
            && self.h.nrows() == rows
            && self.cht.ncols() == rows
            && self.cht.nrows() == self.num_dof()
    }
}

/// Multipliers of one solve and the DOF velocity correction they produce.
#[derive(Debug, Clone, PartialEq)]
pub struct MlcpSolution {
    pub x: DVector<f64>,
    /// `CHt·x`, sliced per representation by `PushResults`.
    pub dof_correction: DVector<f64>,
    pub iterations: usize,
    pub converged: bool,
}

impl Default for MlcpSolution {
    fn default() -> Self {
        Self {
            x: DVector::zeros(0),
            dof_correction: DVector::zeros(0),
            iterations: 0,
            converged: true,
        }
    }
}

/// Projected Gauss-Seidel solver.
#[derive(Debug, Clone, Default)]
pub struct GaussSeidelMlcpSolver {
    pub config: MlcpSolverConfig,
}

impl GaussSeidelMlcpSolver {
    pub fn new(config: MlcpSolverConfig) -> Self {
        Self { config }
    }

    pub fn solve(&self, problem: &MlcpPhysicsProblem) -> MlcpSolution {
        let n = problem.num_rows();
        let mut x = DVector::zeros(n);
        if n == 0 {
            return MlcpSolution {
                dof_correction: DVector::zeros(problem.num_dof()),
                ..MlcpSolution::default()
            };
        }

        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.config.max_iterations {
            iterations += 1;
            let mut largest_change = 0.0f64;
            let mut row = 0;
            for (block, &kind) in problem.constraint_types.iter().enumerate() {
                let mu = problem.mu.get(block).copied().unwrap_or(0.0);
                let change = match kind {
                    MlcpConstraintType::Bilateral1D
                    | MlcpConstraintType::Bilateral2D
                    | MlcpConstraintType::Bilateral3D => (row..row + kind.num_rows())
                        .map(|r| self.relax_row(problem, &mut x, r, f64::NEG_INFINITY))
                        .fold(0.0, f64::max),
                    MlcpConstraintType::Unilateral => self.relax_row(problem, &mut x, row, 0.0),
                    MlcpConstraintType::UnilateralFrictional => {
                        self.relax_frictional(problem, &mut x, row, mu)
                    }
                };
                largest_change = largest_change.max(change);
                row += kind.num_rows();
            }
            if largest_change < self.config.epsilon_convergence {
                converged = true;
                break;
            }
        }
        trace!(
            "MLCP with {} rows solved in {} sweeps (converged: {})",
            n,
            iterations,
            converged
        );

        let dof_correction = &problem.cht * &x;
        MlcpSolution {
            x,
            dof_correction,
            iterations,
            converged,
        }
    }

    fn violation(problem: &MlcpPhysicsProblem, x: &DVector<f64>, row: usize) -> f64 {
        problem.a.row(row).dot(&x.transpose()) + problem.b[row]
    }

    /// One Gauss-Seidel update of `row`, clamped below at `lower`. Returns `|Δx|`.
    fn relax_row(
        &self,
        problem: &MlcpPhysicsProblem,
        x: &mut DVector<f64>,
        row: usize,
        lower: f64,
    ) -> f64 {
        let diagonal = problem.a[(row, row)];
        if diagonal.abs() <= f64::EPSILON {
            return 0.0;
        }
        let w = Self::violation(problem, x, row);
        if lower == 0.0 && x[row] == 0.0 && w >= -self.config.contact_tolerance {
            return 0.0;
        }
        let previous = x[row];
        x[row] = (previous - self.config.relaxation * w / diagonal).max(lower);
        (x[row] - previous).abs()
    }

    fn relax_frictional(
        &self,
        problem: &MlcpPhysicsProblem,
        x: &mut DVector<f64>,
        row: usize,
        mu: f64,
    ) -> f64 {
        let change = self.relax_row(problem, x, row, 0.0);
        let normal = x[row];
        let before = (x[row + 1], x[row + 2]);
        for tangent in [row + 1, row + 2] {
            self.relax_row(problem, x, tangent, f64::NEG_INFINITY);
        }

        let limit = mu * normal;
        let magnitude = (x[row + 1] * x[row + 1] + x[row + 2] * x[row + 2]).sqrt();
        if magnitude > limit {
            let scale = if magnitude > 0.0 { limit / magnitude } else { 0.0 };
            x[row + 1] *= scale;
            x[row + 2] *= scale;
        }
        change
            .max((x[row + 1] - before.0).abs())
            .max((x[row + 2] - before.1).abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn problem(
        a: DMatrix<f64>,
        b: DVector<f64>,
        types: Vec<MlcpConstraintType>,
        mu: Vec<f64>,
    ) -> MlcpPhysicsProblem {
        let n = b.len();
        MlcpPhysicsProblem {
            a,
            b,
            mu,
            constraint_types: types,
            h: DMatrix::identity(n, n),
            cht: DMatrix::identity(n, n),
        }
    }

    #[test]
    fn penetrating_contact_is_pushed_apart() {
        let p = problem(
            DMatrix::from_element(1, 1, 2.0),
            DVector::from_element(1, -1.0),
            vec![MlcpConstraintType::Unilateral],
            vec![0.0],
        );
        let solution = GaussSeidelMlcpSolver::default().solve(&p);
        assert!(solution.converged);
        assert_relative_eq!(solution.x[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(solution.dof_correction[0], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn separated_contact_produces_no_impulse() {
        let p = problem(
            DMatrix::from_element(1, 1, 2.0),
            DVector::from_element(1, 0.3),
            vec![MlcpConstraintType::Unilateral],
            vec![0.0],
        );
        let solution = GaussSeidelMlcpSolver::default().solve(&p);
        assert_eq!(solution.x[0], 0.0);
    }

    #[test]
    fn bilateral_rows_can_pull() {
        let p = problem(
            DMatrix::from_element(1, 1, 4.0),
            DVector::from_element(1, 2.0),
            vec![MlcpConstraintType::Bilateral1D],
            vec![0.0],
        );
        let solution = GaussSeidelMlcpSolver::default().solve(&p);
        assert_relative_eq!(solution.x[0], -0.5, epsilon = 1e-12);
    }

    #[test]
    fn friction_is_bounded_by_the_coulomb_disk() {
        let p = problem(
            DMatrix::identity(3, 3),
            DVector::from_vec(vec![-1.0, 0.5, 0.0]),
            vec![MlcpConstraintType::UnilateralFrictional],
            vec![0.2],
        );
        let solution = GaussSeidelMlcpSolver::default().solve(&p);
        assert_relative_eq!(solution.x[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(solution.x[1], -0.2, epsilon = 1e-12);
        assert_relative_eq!(solution.x[2], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn consistency_checks_row_counts() {
        let mut p = MlcpPhysicsProblem::zero(4, 6);
        p.constraint_types = vec![
            MlcpConstraintType::Unilateral,
            MlcpConstraintType::UnilateralFrictional,
        ];
        p.mu = vec![0.0, 0.5];
        assert!(p.is_consistent());
        p.constraint_types.pop();
        p.mu.pop();
        assert!(!p.is_consistent());
    }
}
