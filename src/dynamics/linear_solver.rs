//! Linear solvers used by the ODE solvers: solve `A·x = b` and produce `A⁻¹`.

use nalgebra::{DMatrix, DVector, LU};
use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, Result};

/// Solves systems with a fixed matrix and exposes its inverse.
pub trait LinearSolveAndInverse: Send + Sync + std::fmt::Debug {
    /// Sets (and factorizes) the system matrix.
    fn set_matrix(&mut self, matrix: &DMatrix<f64>) -> Result<()>;

    fn solve(&self, b: &DVector<f64>) -> Result<DVector<f64>>;

    fn inverse(&self) -> Result<DMatrix<f64>>;
}

/// Structure of the system matrix, selecting the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinearSolverKind {
    /// Dense LU factorization, works for any invertible matrix.
    #[default]
    Dense,
    /// Diagonal matrices, e.g. lumped mass matrices with explicit schemes.
    Diagonal,
    /// Block tri-diagonal matrices, e.g. 1D chains of nodes.
    TriDiagonalBlock { block_size: usize },
}

impl LinearSolverKind {
    pub fn build(self) -> Box<dyn LinearSolveAndInverse> {
        match self {
            LinearSolverKind::Dense => Box::new(DenseLinearSolver::default()),
            LinearSolverKind::Diagonal => Box::new(DiagonalLinearSolver::default()),
            LinearSolverKind::TriDiagonalBlock { block_size } => {
                Box::new(TriDiagonalBlockLinearSolver::new(block_size))
            }
        }
    }
}

/// LU-based solver for dense matrices.
#[derive(Debug, Default)]
pub struct DenseLinearSolver {
    lu: Option<LU<f64, nalgebra::Dyn, nalgebra::Dyn>>,
    size: usize,
}

impl LinearSolveAndInverse for DenseLinearSolver {
    fn set_matrix(&mut self, matrix: &DMatrix<f64>) -> Result<()> {
        if !matrix.is_square() {
            return Err(PhysicsError::singular(format!(
                "matrix is not square ({}x{})",
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        let lu = matrix.clone().lu();
        if !lu.is_invertible() {
            self.lu = None;
            return Err(PhysicsError::singular("LU factorization is not invertible"));
        }
        self.size = matrix.nrows();
        self.lu = Some(lu);
        Ok(())
    }

    fn solve(&self, b: &DVector<f64>) -> Result<DVector<f64>> {
        let lu = self
            .lu
            .as_ref()
            .ok_or_else(|| PhysicsError::singular("no matrix set"))?;
        lu.solve(b)
            .ok_or_else(|| PhysicsError::singular("LU solve failed"))
    }

    fn inverse(&self) -> Result<DMatrix<f64>> {
        let lu = self
            .lu
            .as_ref()
            .ok_or_else(|| PhysicsError::singular("no matrix set"))?;
        lu.try_inverse()
            .ok_or_else(|| PhysicsError::singular(format!("{0}x{0} inverse failed", self.size)))
    }
}

/// Solver for diagonal matrices; off-diagonal entries are ignored.
#[derive(Debug, Default)]
pub struct DiagonalLinearSolver {
    inverse_diagonal: DVector<f64>,
}

impl LinearSolveAndInverse for DiagonalLinearSolver {
    fn set_matrix(&mut self, matrix: &DMatrix<f64>) -> Result<()> {
        let diagonal = matrix.diagonal();
        if let Some(index) = diagonal.iter().position(|d| d.abs() < f64::MIN_POSITIVE) {
            return Err(PhysicsError::singular(format!(
                "zero diagonal entry at {index}"
            )));
        }
        self.inverse_diagonal = diagonal.map(|d| 1.0 / d);
        Ok(())
    }

    fn solve(&self, b: &DVector<f64>) -> Result<DVector<f64>> {
        if b.len() != self.inverse_diagonal.len() {
            return Err(PhysicsError::singular("size mismatch"));
        }
        Ok(self.inverse_diagonal.component_mul(b))
    }

    fn inverse(&self) -> Result<DMatrix<f64>> {
        Ok(DMatrix::from_diagonal(&self.inverse_diagonal))
    }
}

/// Block Thomas algorithm for block tri-diagonal matrices.
///
/// Entries outside the three block diagonals are ignored.
#[derive(Debug)]
pub struct TriDiagonalBlockLinearSolver {
    block_size: usize,
    lower: Vec<DMatrix<f64>>,
    upper: Vec<DMatrix<f64>>,
    /// Inverses of the eliminated diagonal blocks.
    pivots: Vec<DMatrix<f64>>,
    /// `pivot_i⁻¹ · upper_i`, reused by back substitution.
    reduced_upper: Vec<DMatrix<f64>>,
}

impl TriDiagonalBlockLinearSolver {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
            lower: Vec::new(),
            upper: Vec::new(),
            pivots: Vec::new(),
            reduced_upper: Vec::new(),
        }
    }

    fn num_blocks(&self) -> usize {
        self.pivots.len()
    }
}

impl LinearSolveAndInverse for TriDiagonalBlockLinearSolver {
    fn set_matrix(&mut self, matrix: &DMatrix<f64>) -> Result<()> {
        let n = self.block_size;
        if !matrix.is_square() || matrix.nrows() % n != 0 {
            return Err(PhysicsError::singular(format!(
                "{}x{} matrix is not made of {n}x{n} blocks",
                matrix.nrows(),
                matrix.ncols()
            )));
        }
        let count = matrix.nrows() / n;
        let block = |i: usize, j: usize| matrix.view((i * n, j * n), (n, n)).into_owned();

        self.lower = (1..count).map(|i| block(i, i - 1)).collect();
        self.upper = (0..count.saturating_sub(1)).map(|i| block(i, i + 1)).collect();
        self.pivots.clear();
        self.reduced_upper.clear();

        for i in 0..count {
            let mut diagonal = block(i, i);
            if i > 0 {
                diagonal -= &self.lower[i - 1] * &self.reduced_upper[i - 1];
            }
            let pivot = diagonal.try_inverse().ok_or_else(|| {
                PhysicsError::singular(format!("diagonal block {i} is not invertible"))
            })?;
            if i + 1 < count {
                self.reduced_upper.push(&pivot * &self.upper[i]);
            }
            self.pivots.push(pivot);
        }
        Ok(())
    }

    fn solve(&self, b: &DVector<f64>) -> Result<DVector<f64>> {
        let n = self.block_size;
        let count = self.num_blocks();
        if b.len() != n * count {
            return Err(PhysicsError::singular("size mismatch"));
        }
        let segment = |v: &DVector<f64>, i: usize| v.rows(i * n, n).into_owned();

        // Forward elimination.
        let mut reduced: Vec<DVector<f64>> = Vec::with_capacity(count);
        for i in 0..count {
            let mut rhs = segment(b, i);
            if i > 0 {
                rhs -= &self.lower[i - 1] * &reduced[i - 1];
            }
            reduced.push(&self.pivots[i] * rhs);
        }

        // Back substitution.
        let mut x = DVector::zeros(n * count);
        for i in (0..count).rev() {
            let mut value = reduced[i].clone();
            if i + 1 < count {
                value -= &self.reduced_upper[i] * x.rows(i * n + n, n);
            }
            x.rows_mut(i * n, n).copy_from(&value);
        }
        Ok(x)
    }

    fn inverse(&self) -> Result<DMatrix<f64>> {
        let size = self.block_size * self.num_blocks();
        let mut inverse = DMatrix::zeros(size, size);
        for column in 0..size {
            let mut unit = DVector::zeros(size);
            unit[column] = 1.0;
            inverse.set_column(column, &self.solve(&unit)?);
        }
        Ok(inverse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tridiagonal(size: usize) -> DMatrix<f64> {
        DMatrix::from_fn(size, size, |i, j| match i.abs_diff(j) {
            0 => 4.0 + i as f64,
            1 | 2 | 3 => -1.0 / (1.0 + (i + j) as f64),
            _ => 0.0,
        })
    }

    #[test]
    fn block_solver_matches_dense() {
        let matrix = tridiagonal(9);
        let b = DVector::from_fn(9, |i, _| i as f64 - 3.0);

        let mut dense = DenseLinearSolver::default();
        dense.set_matrix(&matrix).expect("invertible");
        let mut block = TriDiagonalBlockLinearSolver::new(3);
        block.set_matrix(&matrix).expect("invertible");

        let expected = dense.solve(&b).expect("solve");
        let actual = block.solve(&b).expect("solve");
        for i in 0..9 {
            assert_relative_eq!(expected[i], actual[i], epsilon = 1e-12);
        }

        let dense_inverse = dense.inverse().expect("inverse");
        let block_inverse = block.inverse().expect("inverse");
        assert_relative_eq!(dense_inverse, block_inverse, epsilon = 1e-12);
    }

    #[test]
    fn singular_matrices_are_reported() {
        let matrix = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);
        let mut dense = DenseLinearSolver::default();
        assert!(dense.set_matrix(&matrix).is_err());

        let mut diagonal = DiagonalLinearSolver::default();
        assert!(diagonal
            .set_matrix(&DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 0.0])))
            .is_err());
    }

    #[test]
    fn diagonal_solver_inverts_entries() {
        let mut diagonal = DiagonalLinearSolver::default();
        diagonal
            .set_matrix(&DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 4.0])))
            .expect("invertible");
        let x = diagonal
            .solve(&DVector::from_vec(vec![1.0, 1.0]))
            .expect("solve");
        assert_eq!(x.as_slice(), &[0.5, 0.25]);
    }
}
