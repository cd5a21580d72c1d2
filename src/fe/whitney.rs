//! Local Whitney basis functions on a tetrahedron.
//!
//! Every lowest order vector basis function is affine and is represented as
//! $w = sum_a lambda_a c_a$ with constant coefficient vectors $c_a$.
//! Element matrices then reduce to the barycentric mass
//! $integral_K lambda_a lambda_b$.

use super::FeFamily;
use crate::{
  geometry::{Barycentric, TetGeometry},
  mesh::{LOCAL_EDGES, LOCAL_FACES},
};

pub type BaryTerms = [na::Vector3<f64>; 4];

/// Coefficients of the vector basis function `ilocal` w.r.t. the barycentrics.
///
/// Edge $(i,j)$: $lambda_i nabla lambda_j - lambda_j nabla lambda_i$.
/// Face $(i,j,k)$: $2 (lambda_i nabla lambda_j times nabla lambda_k + "cyclic")$.
pub fn bary_terms(family: FeFamily, geo: &TetGeometry, ilocal: usize) -> BaryTerms {
  let g = geo.difbarys();
  let mut terms = [na::Vector3::zeros(); 4];
  match family {
    FeFamily::H1 => panic!("H1 basis functions are scalar"),
    FeFamily::HCurl => {
      let [i, j] = LOCAL_EDGES[ilocal];
      terms[i] = g[j];
      terms[j] = -g[i];
    }
    FeFamily::HDiv => {
      let [i, j, k] = LOCAL_FACES[ilocal];
      terms[i] = 2.0 * g[j].cross(&g[k]);
      terms[j] = 2.0 * g[k].cross(&g[i]);
      terms[k] = 2.0 * g[i].cross(&g[j]);
    }
  }
  terms
}

pub fn eval_terms(terms: &BaryTerms, bary: &Barycentric) -> na::Vector3<f64> {
  terms.iter().zip(bary).map(|(t, &l)| l * t).sum()
}

/// Value of a vector basis function at a barycentric point.
pub fn eval_vector_basis(
  family: FeFamily,
  geo: &TetGeometry,
  ilocal: usize,
  bary: &Barycentric,
) -> na::Vector3<f64> {
  eval_terms(&bary_terms(family, geo, ilocal), bary)
}

/// $nabla times (lambda_i nabla lambda_j - lambda_j nabla lambda_i) = 2 nabla lambda_i times nabla lambda_j$
pub fn edge_curl(geo: &TetGeometry, ilocal: usize) -> na::Vector3<f64> {
  let [i, j] = LOCAL_EDGES[ilocal];
  2.0 * geo.difbary(i).cross(geo.difbary(j))
}

/// $integral_K (sum_a lambda_a u_a) dot (sum_b lambda_b v_b)$
pub fn terms_inner(geo: &TetGeometry, u: &BaryTerms, v: &BaryTerms) -> f64 {
  let mut sum = 0.0;
  for a in 0..4 {
    for b in 0..4 {
      sum += geo.bary_mass(a, b) * u[a].dot(&v[b]);
    }
  }
  sum
}

/// $integral_K c dot (sum_a lambda_a u_a)$ for a constant vector $c$.
pub fn terms_integral_against(geo: &TetGeometry, u: &BaryTerms, c: &na::Vector3<f64>) -> f64 {
  geo.vol() / 4.0 * u.iter().map(|t| t.dot(c)).sum::<f64>()
}
