//! Global assembly and essential dof elimination.

use crate::{
  fe::{DofIdx, FeFamily, FeSpace},
  linalg::SparseMatrix,
  mesh::Attribute,
  operators::{BoundaryElVecProvider, CellContext, ElMatProvider, ElVecProvider},
};

pub type GalVec = na::DVector<f64>;

/// Assembly algorithm for the Galerkin Matrix.
///
/// Rows are test dofs, columns trial dofs. Both spaces must live on the same mesh.
pub fn assemble_galmat(test: &FeSpace, trial: &FeSpace, elmat: &dyn ElMatProvider) -> SparseMatrix {
  assert_eq!(elmat.row_family(), test.family());
  assert_eq!(elmat.col_family(), trial.family());
  let mesh = test.mesh();

  let mut galmat = SparseMatrix::zeros(test.ndofs(), trial.ndofs());
  for icell in 0..mesh.ncells() {
    let cell = CellContext {
      cell: icell,
      geo: mesh.cell_geometry(icell),
      attribute: mesh.attribute(icell),
    };
    let elmat = elmat.eval(&cell);
    for (ilocal, &iglobal) in test.cell_dofs(icell).iter().enumerate() {
      for (jlocal, &jglobal) in trial.cell_dofs(icell).iter().enumerate() {
        galmat.push(iglobal, jglobal, elmat[(ilocal, jlocal)]);
      }
    }
  }
  galmat
}

/// Assembly algorithm for the Galerkin Vector.
pub fn assemble_galvec(space: &FeSpace, elvec: &dyn ElVecProvider) -> GalVec {
  assert_eq!(elvec.family(), space.family());
  let mesh = space.mesh();

  let mut galvec = GalVec::zeros(space.ndofs());
  for icell in 0..mesh.ncells() {
    let cell = CellContext {
      cell: icell,
      geo: mesh.cell_geometry(icell),
      attribute: mesh.attribute(icell),
    };
    let elvec = elvec.eval(&cell);
    for (ilocal, &iglobal) in space.cell_dofs(icell).iter().enumerate() {
      galvec[iglobal] += elvec[ilocal];
    }
  }
  galvec
}

/// Assembly over the boundary elements with the given attributes.
pub fn assemble_boundary_galvec(
  space: &FeSpace,
  attributes: &[Attribute],
  elvec: &dyn BoundaryElVecProvider,
) -> GalVec {
  assert_eq!(elvec.family(), space.family());
  let mesh = space.mesh();

  let mut galvec = GalVec::zeros(space.ndofs());
  for (f, be) in mesh.boundary_faces(attributes) {
    let icell = mesh.face_cells(f)[0];
    let Some(local_face) = mesh.local_face(icell, f) else {
      continue;
    };
    let cell = CellContext {
      cell: icell,
      geo: mesh.cell_geometry(icell),
      attribute: mesh.attribute(icell),
    };
    let outward = mesh.face_oriented_outward(f, icell).map(|v| *mesh.coord(v));
    let elvec = elvec.eval(&cell, local_face, &outward, be.attribute);
    for (ilocal, &iglobal) in space.cell_dofs(icell).iter().enumerate() {
      galvec[iglobal] += elvec[ilocal];
    }
  }
  galvec
}

pub fn indicies_to_flags(indicies: &[usize], len: usize) -> Vec<bool> {
  let mut flags = vec![false; len];
  indicies.iter().for_each(|&i| flags[i] = true);
  flags
}

pub fn sparse_to_dense_data<T>(sparse: Vec<(usize, T)>, len: usize) -> Vec<Option<T>> {
  let mut dense = Vec::from_iter((0..len).map(|_| None));
  sparse.into_iter().for_each(|(i, t)| dense[i] = Some(t));
  dense
}

/// Fix DOFs of FE solution.
///
/// Is used to enforce essential boundary conditions.
///
/// Modifies supplied galerkin matrix and galerkin vector,
/// such that the FE solution has the given coefficents on the dofs,
/// while keeping the matrix symmetric if it was before.
/// $mat(A_0, 0; 0, I) vec(mu_0, mu_diff) = vec(phi - A_(0 diff) gamma, gamma)$
pub fn fix_dofs_coeff(dof_coeffs: &[(DofIdx, f64)], galmat: &mut SparseMatrix, galvec: &mut GalVec) {
  let ndofs = galmat.nrows();

  let dof_coeffs_opt = sparse_to_dense_data(dof_coeffs.to_vec(), ndofs);
  let dof_coeffs_zeroed =
    na::DVector::from_iterator(ndofs, dof_coeffs_opt.iter().map(|v| v.unwrap_or(0.0)));

  // Modify galvec.
  *galvec -= galmat.mul_vec(&dof_coeffs_zeroed);

  // Set galvec to prescribed coefficents.
  dof_coeffs.iter().for_each(|&(i, v)| galvec[i] = v);

  // Set entires zero that share a (row or column) index with a fixed dof.
  galmat.set_zero(|r, c| dof_coeffs_opt[r].is_some() || dof_coeffs_opt[c].is_some());

  // Set galmat diagonal for dofs to one.
  for &(i, _) in dof_coeffs {
    galmat.push(i, i, 1.0);
  }
}

pub fn fix_dofs_zero(dofs: &[DofIdx], galmat: &mut SparseMatrix, galvec: &mut GalVec) {
  let dof_coeffs: Vec<_> = dofs.iter().map(|&i| (i, 0.0)).collect();
  fix_dofs_coeff(&dof_coeffs, galmat, galvec);
}

/// Sorts essential dofs and keeps the last prescribed value of repeated ones.
pub fn dedup_dof_coeffs(mut dof_coeffs: Vec<(DofIdx, f64)>) -> Vec<(DofIdx, f64)> {
  // stable sort keeps insertion order among equal dofs
  dof_coeffs.sort_by_key(|&(i, _)| i);
  let mut deduped: Vec<(DofIdx, f64)> = Vec::with_capacity(dof_coeffs.len());
  for (i, v) in dof_coeffs {
    match deduped.last_mut() {
      Some(last) if last.0 == i => last.1 = v,
      _ => deduped.push((i, v)),
    }
  }
  deduped
}

/// Discrete gradient $(G V)_e = V_j - V_i$ for edge $e = (i, j)$, $i < j$.
pub fn discrete_gradient(h1: &FeSpace, hcurl: &FeSpace) -> SparseMatrix {
  assert_eq!(h1.family(), FeFamily::H1);
  assert_eq!(hcurl.family(), FeFamily::HCurl);
  let mesh = hcurl.mesh();
  let mut grad = SparseMatrix::zeros(hcurl.ndofs(), h1.ndofs());
  for e in 0..mesh.nedges() {
    let [i, j] = *mesh.edge(e);
    grad.push(e, i, -1.0);
    grad.push(e, j, 1.0);
  }
  grad
}

/// Discrete curl $(C A)_f = A_(j k) - A_(i k) + A_(i j)$ for face $f = (i, j, k)$, $i < j < k$.
pub fn discrete_curl(hcurl: &FeSpace, hdiv: &FeSpace) -> SparseMatrix {
  assert_eq!(hcurl.family(), FeFamily::HCurl);
  assert_eq!(hdiv.family(), FeFamily::HDiv);
  let mesh = hdiv.mesh();
  let mut curl = SparseMatrix::zeros(hdiv.ndofs(), hcurl.ndofs());
  for f in 0..mesh.nfaces() {
    let [i, j, k] = *mesh.face(f);
    for (edge, sign) in [([j, k], 1.0), ([i, k], -1.0), ([i, j], 1.0)] {
      if let Some(e) = mesh.edge_index(edge) {
        curl.push(f, e, sign);
      }
    }
  }
  curl
}
