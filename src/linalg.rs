//! Sparse matrices and linear solvers.

pub mod solvers;

use crate::error::{Error, Result};

use itertools::Itertools;

/// Triplet (COO) matrix used during assembly. Duplicates are summed on conversion.
#[derive(Debug, Default, Clone)]
pub struct SparseMatrix {
  nrows: usize,
  ncols: usize,
  triplets: Vec<(usize, usize, f64)>,
}

impl SparseMatrix {
  pub fn zeros(nrows: usize, ncols: usize) -> Self {
    Self::new(nrows, ncols, Vec::new())
  }
  pub fn new(nrows: usize, ncols: usize, triplets: Vec<(usize, usize, f64)>) -> Self {
    Self {
      nrows,
      ncols,
      triplets,
    }
  }

  pub fn nrows(&self) -> usize {
    self.nrows
  }
  pub fn ncols(&self) -> usize {
    self.ncols
  }
  pub fn triplets(&self) -> &[(usize, usize, f64)] {
    &self.triplets
  }

  pub fn push(&mut self, r: usize, c: usize, v: f64) {
    if v != 0.0 {
      self.triplets.push((r, c, v));
    }
  }

  /// Appends `scale * other` shifted by the given block offsets.
  pub fn add_block(&mut self, other: &SparseMatrix, row_offset: usize, col_offset: usize, scale: f64) {
    for &(r, c, v) in &other.triplets {
      self.push(r + row_offset, c + col_offset, scale * v);
    }
  }

  pub fn transpose(&self) -> Self {
    let triplets = self.triplets.iter().map(|&(r, c, v)| (c, r, v)).collect();
    Self::new(self.ncols, self.nrows, triplets)
  }

  pub fn set_zero<F>(&mut self, predicate: F)
  where
    F: Fn(usize, usize) -> bool,
  {
    self.triplets.retain(|&(r, c, _)| !predicate(r, c));
  }

  pub fn to_nalgebra_coo(&self) -> Result<nas::CooMatrix<f64>> {
    let (rows, cols, vals) = self.triplets.iter().copied().multiunzip();
    nas::CooMatrix::try_from_triplets(self.nrows, self.ncols, rows, cols, vals)
      .map_err(|e| Error::Solver(format!("invalid sparse matrix: {e}")))
  }

  pub fn to_nalgebra_csr(&self) -> Result<nas::CsrMatrix<f64>> {
    Ok((&self.to_nalgebra_coo()?).into())
  }

  pub fn to_nalgebra_dense(&self) -> Result<na::DMatrix<f64>> {
    Ok((&self.to_nalgebra_coo()?).into())
  }

  pub fn to_faer_csc(&self) -> Result<faer::sparse::SparseColMat<usize, f64>> {
    faer::sparse::SparseColMat::try_new_from_triplets(self.nrows, self.ncols, &self.triplets)
      .map_err(|e| Error::Solver(format!("invalid sparse matrix: {e:?}")))
  }

  pub fn mul_vec(&self, x: &na::DVector<f64>) -> na::DVector<f64> {
    let mut y = na::DVector::zeros(self.nrows);
    for &(r, c, v) in &self.triplets {
      y[r] += v * x[c];
    }
    y
  }
}

/// $y = A x$
pub fn spmv(a: &nas::CsrMatrix<f64>, x: &na::DVector<f64>) -> na::DVector<f64> {
  let mut y = na::DVector::zeros(a.nrows());
  for (i, row) in a.row_iter().enumerate() {
    y[i] = row
      .col_indices()
      .iter()
      .zip(row.values())
      .map(|(&j, &v)| v * x[j])
      .sum();
  }
  y
}

pub fn diagonal(a: &nas::CsrMatrix<f64>) -> na::DVector<f64> {
  let mut d = na::DVector::zeros(a.nrows());
  for (i, row) in a.row_iter().enumerate() {
    d[i] = row
      .col_indices()
      .iter()
      .zip(row.values())
      .filter(|(j, _)| **j == i)
      .map(|(_, &v)| v)
      .sum();
  }
  d
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn duplicates_are_summed() {
    let mut m = SparseMatrix::zeros(2, 2);
    m.push(0, 0, 1.0);
    m.push(0, 0, 2.0);
    m.push(1, 0, 0.0);
    m.push(1, 1, 4.0);
    assert_eq!(m.triplets().len(), 3);
    let dense = m.to_nalgebra_dense().unwrap();
    assert_eq!(dense, na::DMatrix::from_row_slice(2, 2, &[3.0, 0.0, 0.0, 4.0]));

    let csr = m.to_nalgebra_csr().unwrap();
    let x = na::DVector::from_vec(vec![1.0, 2.0]);
    assert_eq!(spmv(&csr, &x), na::DVector::from_vec(vec![3.0, 8.0]));
    assert_eq!(m.mul_vec(&x), spmv(&csr, &x));
    assert_eq!(diagonal(&csr), na::DVector::from_vec(vec![3.0, 4.0]));
  }

  #[test]
  fn blocks_and_transpose() {
    let mut b = SparseMatrix::zeros(1, 2);
    b.push(0, 1, 5.0);
    let mut m = SparseMatrix::zeros(3, 3);
    m.add_block(&b, 2, 0, 1.0);
    m.add_block(&b.transpose(), 0, 2, -1.0);
    let dense = m.to_nalgebra_dense().unwrap();
    assert_eq!(dense[(2, 1)], 5.0);
    assert_eq!(dense[(1, 2)], -5.0);
  }
}
