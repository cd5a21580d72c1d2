//! Linear solvers for the assembled systems.

use super::{diagonal, spmv, SparseMatrix};
use crate::{
  error::{Error, Result},
  params::InputParameters,
};

use faer::solvers::SpSolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverKind {
  /// Jacobi preconditioned conjugate gradients.
  Pcg,
  /// Sparse LU factorisation.
  DirectLu,
}

impl SolverKind {
  pub fn from_name(name: &str) -> Result<Self> {
    match name {
      "PCG" | "HypreAMS" | "HypreBoomerAMG" => Ok(Self::Pcg),
      "LU" | "SuperLU" | "Direct" => Ok(Self::DirectLu),
      other => Err(Error::parameter("SolverType", format!("unknown solver `{other}`"))),
    }
  }
}

/// Tolerances and limits of a linear solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOptions {
  pub tolerance: f64,
  pub abs_tolerance: f64,
  pub max_iter: usize,
  pub print_level: i64,
  pub kind: SolverKind,
}

impl Default for SolverOptions {
  fn default() -> Self {
    Self {
      tolerance: 1e-16,
      abs_tolerance: 1e-16,
      max_iter: 1000,
      print_level: 0,
      kind: SolverKind::Pcg,
    }
  }
}

impl SolverOptions {
  /// Reads `Tolerance`, `AbsTolerance`, `MaxIter`, `PrintLevel` and `SolverType`,
  /// falling back to `defaults` for absent keys.
  pub fn from_params(params: &InputParameters, defaults: SolverOptions) -> Result<Self> {
    let kind = if params.has("SolverType") {
      SolverKind::from_name(params.get_str("SolverType")?)?
    } else {
      defaults.kind
    };
    Ok(Self {
      tolerance: params.get_float_or("Tolerance", defaults.tolerance)?,
      abs_tolerance: params.get_float_or("AbsTolerance", defaults.abs_tolerance)?,
      max_iter: params.get_usize_or("MaxIter", defaults.max_iter)?,
      print_level: params.get_int_or("PrintLevel", defaults.print_level)?,
      kind,
    })
  }

  pub fn with_tolerance(mut self, tolerance: f64) -> Self {
    self.tolerance = tolerance;
    self
  }
  pub fn with_max_iter(mut self, max_iter: usize) -> Self {
    self.max_iter = max_iter;
    self
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveReport {
  pub iterations: usize,
  pub residual: f64,
  pub converged: bool,
}

pub trait LinearSolver {
  /// Solves $A x = b$ using `x` as initial guess.
  ///
  /// Non-convergence is not an error: it is logged and the best-effort
  /// iterate is returned.
  fn solve(
    &mut self,
    a: &nas::CsrMatrix<f64>,
    b: &na::DVector<f64>,
    x: &mut na::DVector<f64>,
  ) -> Result<SolveReport>;
}

/// Conjugate gradients with diagonal preconditioning.
///
/// The preconditioner is built from the matrix passed to [`JacobiPcg::new`],
/// the iteration always uses the matrix handed to `solve`.
pub struct JacobiPcg {
  inv_diag: na::DVector<f64>,
  options: SolverOptions,
}

impl JacobiPcg {
  pub fn new(a: &nas::CsrMatrix<f64>, options: SolverOptions) -> Self {
    let inv_diag = diagonal(a).map(|d| if d.abs() > 0.0 { 1.0 / d } else { 1.0 });
    Self { inv_diag, options }
  }
}

impl LinearSolver for JacobiPcg {
  fn solve(
    &mut self,
    a: &nas::CsrMatrix<f64>,
    b: &na::DVector<f64>,
    x: &mut na::DVector<f64>,
  ) -> Result<SolveReport> {
    let n = b.len();
    if a.nrows() != n || a.ncols() != n || x.len() != n || self.inv_diag.len() != n {
      return Err(Error::DimensionMismatch {
        context: "conjugate gradient solve",
        expected: a.nrows(),
        found: n,
      });
    }

    let bnorm = b.norm();
    let threshold = (self.options.tolerance * bnorm).max(self.options.abs_tolerance);

    let mut r = b - spmv(a, x);
    let mut rnorm = r.norm();
    if rnorm <= threshold {
      return Ok(SolveReport {
        iterations: 0,
        residual: rnorm,
        converged: true,
      });
    }
    let mut z = r.component_mul(&self.inv_diag);
    let mut p = z.clone();
    let mut rz = r.dot(&z);

    let mut iterations = 0;
    while iterations < self.options.max_iter {
      iterations += 1;
      let ap = spmv(a, &p);
      let pap = p.dot(&ap);
      if pap.abs() <= f64::MIN_POSITIVE {
        break;
      }
      let alpha = rz / pap;
      x.axpy(alpha, &p, 1.0);
      r.axpy(-alpha, &ap, 1.0);
      rnorm = r.norm();
      if self.options.print_level > 1 {
        tracing::info!("pcg iteration {iterations:>4}: |r| = {rnorm:.3e}");
      }
      if rnorm <= threshold {
        break;
      }
      z = r.component_mul(&self.inv_diag);
      let rz_new = r.dot(&z);
      let beta = rz_new / rz;
      rz = rz_new;
      p = &z + beta * &p;
    }

    let converged = rnorm <= threshold;
    if !converged {
      tracing::warn!(
        "pcg did not converge after {iterations} iterations: |r| = {rnorm:.3e}, target {threshold:.3e}"
      );
    } else if self.options.print_level > 0 {
      tracing::info!("pcg converged in {iterations} iterations: |r| = {rnorm:.3e}");
    }
    Ok(SolveReport {
      iterations,
      residual: rnorm,
      converged,
    })
  }
}

/// Sparse LU factorisation of a fixed matrix.
pub struct FaerLu {
  raw: faer::sparse::linalg::solvers::Lu<usize, f64>,
}

impl FaerLu {
  pub fn new(a: &SparseMatrix) -> Result<Self> {
    let raw = a
      .to_faer_csc()?
      .sp_lu()
      .map_err(|e| Error::Solver(format!("lu factorisation failed: {e:?}")))?;
    Ok(Self { raw })
  }

  pub fn solve(&self, b: &na::DVector<f64>) -> na::DVector<f64> {
    let b = faer::col::from_slice(b.as_slice());
    na::DVector::from_vec(self.raw.solve(b).as_slice().to_vec())
  }
}

/// Direct solver; the factorisation is fixed at construction.
///
/// The residual is checked against the matrix handed to `solve`, which may
/// differ from the factorised one.
pub struct DirectLu {
  lu: FaerLu,
  options: SolverOptions,
}

impl DirectLu {
  pub fn new(a: &nas::CsrMatrix<f64>, options: SolverOptions) -> Result<Self> {
    let mut triplets = Vec::with_capacity(a.nnz());
    for (i, row) in a.row_iter().enumerate() {
      for (&j, &v) in row.col_indices().iter().zip(row.values()) {
        triplets.push((i, j, v));
      }
    }
    let lu = FaerLu::new(&SparseMatrix::new(a.nrows(), a.ncols(), triplets))?;
    Ok(Self { lu, options })
  }
}

impl LinearSolver for DirectLu {
  fn solve(
    &mut self,
    a: &nas::CsrMatrix<f64>,
    b: &na::DVector<f64>,
    x: &mut na::DVector<f64>,
  ) -> Result<SolveReport> {
    *x = self.lu.solve(b);
    let residual = (b - spmv(a, x)).norm();
    if !residual.is_finite() {
      return Err(Error::Solver("direct solve produced non-finite values".into()));
    }
    let threshold = (self.options.tolerance * b.norm()).max(self.options.abs_tolerance);
    let converged = residual <= threshold;
    if !converged {
      tracing::warn!("direct solve missed the tolerance: |r| = {residual:.3e}, target {threshold:.3e}");
    } else if self.options.print_level > 0 {
      tracing::info!("direct solve: |r| = {residual:.3e}");
    }
    Ok(SolveReport {
      iterations: 1,
      residual,
      converged,
    })
  }
}

pub fn build_solver(a: &nas::CsrMatrix<f64>, options: &SolverOptions) -> Result<Box<dyn LinearSolver>> {
  Ok(match options.kind {
    SolverKind::Pcg => Box::new(JacobiPcg::new(a, options.clone())),
    SolverKind::DirectLu => Box::new(DirectLu::new(a, options.clone())?),
  })
}

/// Convenience one-shot solve with a fresh solver.
pub fn solve_system(
  a: &nas::CsrMatrix<f64>,
  b: &na::DVector<f64>,
  x: &mut na::DVector<f64>,
  options: &SolverOptions,
) -> Result<SolveReport> {
  build_solver(a, options)?.solve(a, b, x)
}
