//! Element matrix and element vector providers.
//!
//! Coefficients of bilinear forms are evaluated once per cell at its
//! centroid. Load vectors use a quadrature that is exact for affine data.

use crate::{
  coefficients::{EvalPoint, ScalarCoefficient, VectorCoefficient},
  fe::{gridfunction::GridFunction, whitney, FeFamily},
  geometry::{tet_quadrature, triangle_area_vector, triangle_quadrature, TetGeometry},
  mesh::{Attribute, CellIdx, LOCAL_FACES},
};

use std::rc::Rc;

pub type ElMat = na::DMatrix<f64>;
pub type ElVec = na::DVector<f64>;

/// Cell handed to the providers during assembly.
pub struct CellContext<'a> {
  pub cell: CellIdx,
  pub geo: &'a TetGeometry,
  pub attribute: Attribute,
}

impl CellContext<'_> {
  pub fn centroid(&self) -> EvalPoint {
    EvalPoint::new(self.geo.centroid(), self.attribute)
  }
}

/// Rows belong to the test space, columns to the trial space.
pub trait ElMatProvider {
  fn row_family(&self) -> FeFamily;
  fn col_family(&self) -> FeFamily;
  fn eval(&self, cell: &CellContext) -> ElMat;
}

pub trait ElVecProvider {
  fn family(&self) -> FeFamily;
  fn eval(&self, cell: &CellContext) -> ElVec;
}

/// Element vector of a boundary element, expressed in the dofs of an adjacent cell.
pub trait BoundaryElVecProvider {
  fn family(&self) -> FeFamily;
  /// `outward` are the face vertices ordered with the normal pointing out of the cell.
  fn eval(&self, cell: &CellContext, local_face: usize, outward: &[na::Vector3<f64>; 3], attribute: Attribute) -> ElVec;
}

fn vector_terms(family: FeFamily, geo: &TetGeometry) -> Vec<whitney::BaryTerms> {
  (0..family.nlocal_dofs())
    .map(|i| whitney::bary_terms(family, geo, i))
    .collect()
}

/// $A = [(sigma nabla phi_j, nabla phi_i)]_(i,j)$
pub struct DiffusionElmat {
  coef: Rc<dyn ScalarCoefficient>,
}
impl DiffusionElmat {
  pub fn new(coef: Rc<dyn ScalarCoefficient>) -> Self {
    Self { coef }
  }
}
impl ElMatProvider for DiffusionElmat {
  fn row_family(&self) -> FeFamily {
    FeFamily::H1
  }
  fn col_family(&self) -> FeFamily {
    FeFamily::H1
  }
  fn eval(&self, cell: &CellContext) -> ElMat {
    let sigma = self.coef.eval(&cell.centroid());
    let g = cell.geo.difbarys();
    ElMat::from_fn(4, 4, |i, j| cell.geo.vol() * sigma * g[i].dot(&g[j]))
  }
}

/// Exact scalar mass matrix $[(beta phi_j, phi_i)]_(i,j)$.
pub struct ScalarMassElmat {
  coef: Rc<dyn ScalarCoefficient>,
}
impl ScalarMassElmat {
  pub fn new(coef: Rc<dyn ScalarCoefficient>) -> Self {
    Self { coef }
  }
}
impl ElMatProvider for ScalarMassElmat {
  fn row_family(&self) -> FeFamily {
    FeFamily::H1
  }
  fn col_family(&self) -> FeFamily {
    FeFamily::H1
  }
  fn eval(&self, cell: &CellContext) -> ElMat {
    let beta = self.coef.eval(&cell.centroid());
    ElMat::from_fn(4, 4, |i, j| beta * cell.geo.bary_mass(i, j))
  }
}

/// Vector mass matrix between any two of H(curl) and H(div).
///
/// $M = [(beta bold(w)_j, bold(w)_i)]_(i,j)$
pub struct VectorMassElmat {
  test: FeFamily,
  trial: FeFamily,
  coef: Rc<dyn ScalarCoefficient>,
}
impl VectorMassElmat {
  pub fn new(test: FeFamily, trial: FeFamily, coef: Rc<dyn ScalarCoefficient>) -> Self {
    assert!(test.is_vector() && trial.is_vector());
    Self { test, trial, coef }
  }
  pub fn square(family: FeFamily, coef: Rc<dyn ScalarCoefficient>) -> Self {
    Self::new(family, family, coef)
  }
}
impl ElMatProvider for VectorMassElmat {
  fn row_family(&self) -> FeFamily {
    self.test
  }
  fn col_family(&self) -> FeFamily {
    self.trial
  }
  fn eval(&self, cell: &CellContext) -> ElMat {
    let beta = self.coef.eval(&cell.centroid());
    let rows = vector_terms(self.test, cell.geo);
    let cols = vector_terms(self.trial, cell.geo);
    ElMat::from_fn(rows.len(), cols.len(), |i, j| {
      beta * whitney::terms_inner(cell.geo, &rows[i], &cols[j])
    })
  }
}

/// $C = [(alpha nabla times bold(w)_j, nabla times bold(w)_i)]_(i,j)$
pub struct CurlCurlElmat {
  coef: Rc<dyn ScalarCoefficient>,
}
impl CurlCurlElmat {
  pub fn new(coef: Rc<dyn ScalarCoefficient>) -> Self {
    Self { coef }
  }
}
impl ElMatProvider for CurlCurlElmat {
  fn row_family(&self) -> FeFamily {
    FeFamily::HCurl
  }
  fn col_family(&self) -> FeFamily {
    FeFamily::HCurl
  }
  fn eval(&self, cell: &CellContext) -> ElMat {
    let alpha = self.coef.eval(&cell.centroid());
    let curls: Vec<_> = (0..6).map(|i| whitney::edge_curl(cell.geo, i)).collect();
    ElMat::from_fn(6, 6, |i, j| cell.geo.vol() * alpha * curls[i].dot(&curls[j]))
  }
}

/// Gradient of an H1 trial function tested against H(curl).
///
/// $G = [(sigma nabla phi_j, bold(w)_i)]_(i,j)$
pub struct MixedGradientElmat {
  coef: Rc<dyn ScalarCoefficient>,
}
impl MixedGradientElmat {
  pub fn new(coef: Rc<dyn ScalarCoefficient>) -> Self {
    Self { coef }
  }
}
impl ElMatProvider for MixedGradientElmat {
  fn row_family(&self) -> FeFamily {
    FeFamily::HCurl
  }
  fn col_family(&self) -> FeFamily {
    FeFamily::H1
  }
  fn eval(&self, cell: &CellContext) -> ElMat {
    let sigma = self.coef.eval(&cell.centroid());
    let rows = vector_terms(FeFamily::HCurl, cell.geo);
    ElMat::from_fn(6, 4, |i, j| {
      sigma * whitney::terms_integral_against(cell.geo, &rows[i], cell.geo.difbary(j))
    })
  }
}

/// H(curl) trial function tested against gradients of H1.
///
/// $D = [(sigma bold(w)_j, nabla phi_i)]_(i,j)$
pub struct WeakDivergenceElmat {
  coef: Rc<dyn ScalarCoefficient>,
}
impl WeakDivergenceElmat {
  pub fn new(coef: Rc<dyn ScalarCoefficient>) -> Self {
    Self { coef }
  }
}
impl ElMatProvider for WeakDivergenceElmat {
  fn row_family(&self) -> FeFamily {
    FeFamily::H1
  }
  fn col_family(&self) -> FeFamily {
    FeFamily::HCurl
  }
  fn eval(&self, cell: &CellContext) -> ElMat {
    MixedGradientElmat::new(Rc::clone(&self.coef)).eval(cell).transpose()
  }
}

/// $[(bold(f), bold(w)_i)]_i$ for a vector coefficient.
pub struct VectorLoadElvec {
  family: FeFamily,
  coef: Rc<dyn VectorCoefficient>,
}
impl VectorLoadElvec {
  pub fn new(family: FeFamily, coef: Rc<dyn VectorCoefficient>) -> Self {
    assert!(family.is_vector());
    Self { family, coef }
  }
}
impl ElVecProvider for VectorLoadElvec {
  fn family(&self) -> FeFamily {
    self.family
  }
  fn eval(&self, cell: &CellContext) -> ElVec {
    let terms = vector_terms(self.family, cell.geo);
    let rule = tet_quadrature();
    let mut elvec = ElVec::zeros(terms.len());
    for (bary, weight) in rule.points.iter().zip(&rule.weights) {
      let x = cell.geo.bary2global(bary);
      let f = self.coef.eval(&EvalPoint::new(x, cell.attribute));
      for (i, t) in terms.iter().enumerate() {
        elvec[i] += weight * cell.geo.vol() * f.dot(&whitney::eval_terms(t, bary));
      }
    }
    elvec
  }
}

/// $[(f, phi_i)]_i$ for a scalar coefficient.
pub struct ScalarLoadElvec {
  coef: Rc<dyn ScalarCoefficient>,
}
impl ScalarLoadElvec {
  pub fn new(coef: Rc<dyn ScalarCoefficient>) -> Self {
    Self { coef }
  }
}
impl ElVecProvider for ScalarLoadElvec {
  fn family(&self) -> FeFamily {
    FeFamily::H1
  }
  fn eval(&self, cell: &CellContext) -> ElVec {
    let rule = tet_quadrature();
    let mut elvec = ElVec::zeros(4);
    for (bary, weight) in rule.points.iter().zip(&rule.weights) {
      let x = cell.geo.bary2global(bary);
      let f = self.coef.eval(&EvalPoint::new(x, cell.attribute));
      for i in 0..4 {
        elvec[i] += weight * cell.geo.vol() * f * bary[i];
      }
    }
    elvec
  }
}

/// Action of a bilinear form on a fixed field, $[scale a(u, psi_i)]_i$.
///
/// The field is a snapshot taken when the provider is built.
pub struct FieldActionElvec {
  elmat: Box<dyn ElMatProvider>,
  field: GridFunction,
  scale: f64,
}
impl FieldActionElvec {
  pub fn new(elmat: Box<dyn ElMatProvider>, field: GridFunction, scale: f64) -> Self {
    assert_eq!(elmat.col_family(), field.family());
    Self { elmat, field, scale }
  }
}
impl ElVecProvider for FieldActionElvec {
  fn family(&self) -> FeFamily {
    self.elmat.row_family()
  }
  fn eval(&self, cell: &CellContext) -> ElVec {
    let dofs = self.field.space().cell_dofs(cell.cell);
    let local = ElVec::from_iterator(dofs.len(), dofs.iter().map(|&i| self.field.data()[i]));
    self.scale * self.elmat.eval(cell) * local
  }
}

fn face_bary(local_face: usize, point: &[f64; 3]) -> [f64; 4] {
  let mut bary = [0.0; 4];
  for (m, &ilocal) in LOCAL_FACES[local_face].iter().enumerate() {
    bary[ilocal] = point[m];
  }
  bary
}

/// $[integral_Gamma g phi_i]_i$, e.g. a Neumann flux of an H1 problem.
pub struct ScalarBoundaryLoadElvec {
  coef: Rc<dyn ScalarCoefficient>,
}
impl ScalarBoundaryLoadElvec {
  pub fn new(coef: Rc<dyn ScalarCoefficient>) -> Self {
    Self { coef }
  }
}
impl BoundaryElVecProvider for ScalarBoundaryLoadElvec {
  fn family(&self) -> FeFamily {
    FeFamily::H1
  }
  fn eval(&self, cell: &CellContext, local_face: usize, outward: &[na::Vector3<f64>; 3], attribute: Attribute) -> ElVec {
    let area = triangle_area_vector(outward).norm();
    let rule = triangle_quadrature(2);
    let mut elvec = ElVec::zeros(4);
    for (point, weight) in rule.points.iter().zip(&rule.weights) {
      let bary = face_bary(local_face, point);
      let g = self.coef.eval(&EvalPoint::new(cell.geo.bary2global(&bary), attribute));
      for i in 0..4 {
        elvec[i] += weight * area * g * bary[i];
      }
    }
    elvec
  }
}

/// $[integral_Gamma bold(g) dot bold(w)_i]_i$ on H(curl).
pub struct VectorBoundaryLoadElvec {
  coef: Rc<dyn VectorCoefficient>,
}
impl VectorBoundaryLoadElvec {
  pub fn new(coef: Rc<dyn VectorCoefficient>) -> Self {
    Self { coef }
  }
}
impl BoundaryElVecProvider for VectorBoundaryLoadElvec {
  fn family(&self) -> FeFamily {
    FeFamily::HCurl
  }
  fn eval(&self, cell: &CellContext, local_face: usize, outward: &[na::Vector3<f64>; 3], attribute: Attribute) -> ElVec {
    let area = triangle_area_vector(outward).norm();
    let terms = vector_terms(FeFamily::HCurl, cell.geo);
    let rule = triangle_quadrature(2);
    let mut elvec = ElVec::zeros(6);
    for (point, weight) in rule.points.iter().zip(&rule.weights) {
      let bary = face_bary(local_face, point);
      let g = self.coef.eval(&EvalPoint::new(cell.geo.bary2global(&bary), attribute));
      for (i, t) in terms.iter().enumerate() {
        elvec[i] += weight * area * g.dot(&whitney::eval_terms(t, &bary));
      }
    }
    elvec
  }
}
