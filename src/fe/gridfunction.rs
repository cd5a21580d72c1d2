//! Discrete fields: dof vectors bound to a space.

use super::{whitney, DofIdx, FeFamily, FeSpace};
use crate::{
  coefficients::{EvalPoint, ScalarCoefficient, VectorCoefficient},
  error::{Error, Result},
  geometry::{triangle_area_vector, triangle_quadrature, Barycentric},
  mesh::{Attribute, CellIdx, LOCAL_FACES},
};

use std::rc::Rc;

/// Discrete field. Its length is fixed by the space at creation.
#[derive(Debug, Clone)]
pub struct GridFunction {
  space: Rc<FeSpace>,
  data: na::DVector<f64>,
}

impl GridFunction {
  pub fn new(space: Rc<FeSpace>) -> Self {
    let data = na::DVector::zeros(space.ndofs());
    Self { space, data }
  }

  pub fn from_data(space: Rc<FeSpace>, data: na::DVector<f64>) -> Result<Self> {
    let mut gf = Self::new(space);
    gf.copy_from(&data)?;
    Ok(gf)
  }

  pub fn space(&self) -> &Rc<FeSpace> {
    &self.space
  }
  pub fn family(&self) -> FeFamily {
    self.space.family()
  }
  pub fn len(&self) -> usize {
    self.data.len()
  }
  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn data(&self) -> &na::DVector<f64> {
    &self.data
  }
  pub fn as_mut_slice(&mut self) -> &mut [f64] {
    self.data.as_mut_slice()
  }
  pub fn set(&mut self, idof: DofIdx, value: f64) {
    self.data[idof] = value;
  }

  pub fn copy_from(&mut self, data: &na::DVector<f64>) -> Result<()> {
    self.copy_from_slice(data.as_slice())
  }
  pub fn copy_from_slice(&mut self, data: &[f64]) -> Result<()> {
    if data.len() != self.data.len() {
      return Err(Error::DimensionMismatch {
        context: "grid function data",
        expected: self.data.len(),
        found: data.len(),
      });
    }
    self.data.as_mut_slice().copy_from_slice(data);
    Ok(())
  }

  pub fn fill(&mut self, value: f64) {
    self.data.fill(value);
  }
  pub fn scale(&mut self, factor: f64) {
    self.data *= factor;
  }
  /// $u <- u + a v$
  pub fn axpy(&mut self, a: f64, v: &na::DVector<f64>) -> Result<()> {
    if v.len() != self.data.len() {
      return Err(Error::DimensionMismatch {
        context: "grid function axpy",
        expected: self.data.len(),
        found: v.len(),
      });
    }
    self.data.axpy(a, v, 1.0);
    Ok(())
  }

  fn local_dofs(&self, c: CellIdx) -> impl Iterator<Item = (usize, f64)> + '_ {
    self
      .space
      .cell_dofs(c)
      .iter()
      .enumerate()
      .map(|(ilocal, &idof)| (ilocal, self.data[idof]))
  }
}

/// Evaluation.
impl GridFunction {
  pub fn eval_scalar(&self, c: CellIdx, bary: &Barycentric) -> f64 {
    assert_eq!(self.family(), FeFamily::H1, "scalar evaluation needs an H1 field");
    self.local_dofs(c).map(|(i, u)| u * bary[i]).sum()
  }

  pub fn eval_gradient(&self, c: CellIdx) -> na::Vector3<f64> {
    assert_eq!(self.family(), FeFamily::H1, "gradient evaluation needs an H1 field");
    let geo = self.space.mesh().cell_geometry(c);
    self.local_dofs(c).map(|(i, u)| u * geo.difbary(i)).sum()
  }

  pub fn eval_vector(&self, c: CellIdx, bary: &Barycentric) -> na::Vector3<f64> {
    let family = self.family();
    assert!(family.is_vector(), "vector evaluation needs a vector field");
    let geo = self.space.mesh().cell_geometry(c);
    self
      .local_dofs(c)
      .map(|(i, u)| u * whitney::eval_vector_basis(family, geo, i, bary))
      .sum()
  }

  pub fn eval_vector_at_centroid(&self, c: CellIdx) -> na::Vector3<f64> {
    self.eval_vector(c, &[0.25; 4])
  }

  pub fn eval_curl(&self, c: CellIdx) -> na::Vector3<f64> {
    assert_eq!(self.family(), FeFamily::HCurl, "curl evaluation needs an H(curl) field");
    let geo = self.space.mesh().cell_geometry(c);
    self
      .local_dofs(c)
      .map(|(i, u)| u * whitney::edge_curl(geo, i))
      .sum()
  }

  /// Flux $integral_Gamma u dot n$ through the boundary elements with the given attributes.
  ///
  /// The field is evaluated from the first cell adjacent to each face and the
  /// normal points out of that cell.
  pub fn boundary_flux(&self, attributes: &[Attribute]) -> f64 {
    let mesh = self.space.mesh();
    let rule = triangle_quadrature(2 * self.space.order().max(1));
    let mut flux = 0.0;
    for (f, _) in mesh.boundary_faces(attributes) {
      let c = mesh.face_cells(f)[0];
      let outward = mesh.face_oriented_outward(f, c).map(|v| *mesh.coord(v));
      let area_vector = triangle_area_vector(&outward);
      let Some(lf) = mesh.local_face(c, f) else {
        continue;
      };
      for (point, weight) in rule.points.iter().zip(&rule.weights) {
        let mut bary = [0.0; 4];
        for (m, &ilocal) in LOCAL_FACES[lf].iter().enumerate() {
          bary[ilocal] = point[m];
        }
        flux += weight * self.eval_vector(c, &bary).dot(&area_vector);
      }
    }
    flux
  }
}

/// Interpolation of coefficients.
impl GridFunction {
  /// Vertex values for H1, edge-midpoint tangential integrals for H(curl),
  /// face-centroid fluxes for H(div).
  pub fn project_scalar(&mut self, coef: &dyn ScalarCoefficient) {
    assert_eq!(self.family(), FeFamily::H1);
    let mesh = Rc::clone(self.space.mesh());
    for c in 0..mesh.ncells() {
      let attribute = mesh.attribute(c);
      for &v in mesh.cell(c) {
        self.data[v] = coef.eval(&EvalPoint::new(*mesh.coord(v), attribute));
      }
    }
  }

  pub fn project_vector(&mut self, coef: &dyn VectorCoefficient) {
    let mesh = Rc::clone(self.space.mesh());
    for c in 0..mesh.ncells() {
      let attribute = mesh.attribute(c);
      match self.family() {
        FeFamily::H1 => panic!("vector projection needs a vector field"),
        FeFamily::HCurl => {
          for &e in mesh.cell_edges(c) {
            let [a, b] = *mesh.edge(e);
            self.data[e] = edge_dof(coef, mesh.coord(a), mesh.coord(b), attribute);
          }
        }
        FeFamily::HDiv => {
          for &f in mesh.cell_faces(c) {
            self.data[f] = face_dof(coef, &mesh.face_coords(f), attribute);
          }
        }
      }
    }
  }

  /// Sets the dofs on the given boundary attributes only.
  pub fn project_boundary_scalar(&mut self, coef: &dyn ScalarCoefficient, attributes: &[Attribute]) {
    assert_eq!(self.family(), FeFamily::H1);
    let mesh = Rc::clone(self.space.mesh());
    for (f, be) in mesh.boundary_faces(attributes) {
      for &v in mesh.face(f) {
        self.data[v] = coef.eval(&EvalPoint::new(*mesh.coord(v), be.attribute));
      }
    }
  }

  /// Sets the tangential (H(curl)) or normal (H(div)) dofs on the given boundary attributes.
  pub fn project_boundary_vector(&mut self, coef: &dyn VectorCoefficient, attributes: &[Attribute]) {
    let mesh = Rc::clone(self.space.mesh());
    for (f, be) in mesh.boundary_faces(attributes) {
      match self.family() {
        FeFamily::H1 => panic!("vector projection needs a vector field"),
        FeFamily::HCurl => {
          let [a, b, c] = *mesh.face(f);
          for [p, q] in [[a, b], [a, c], [b, c]] {
            if let Some(e) = mesh.edge_index([p, q]) {
              self.data[e] = edge_dof(coef, mesh.coord(p), mesh.coord(q), be.attribute);
            }
          }
        }
        FeFamily::HDiv => {
          self.data[f] = face_dof(coef, &mesh.face_coords(f), be.attribute);
        }
      }
    }
  }
}

fn edge_dof(
  coef: &dyn VectorCoefficient,
  xa: &na::Vector3<f64>,
  xb: &na::Vector3<f64>,
  attribute: Attribute,
) -> f64 {
  let mid = 0.5 * (xa + xb);
  coef.eval(&EvalPoint::new(mid, attribute)).dot(&(xb - xa))
}

fn face_dof(coef: &dyn VectorCoefficient, x: &[na::Vector3<f64>; 3], attribute: Attribute) -> f64 {
  let centre = (x[0] + x[1] + x[2]) / 3.0;
  coef
    .eval(&EvalPoint::new(centre, attribute))
    .dot(&triangle_area_vector(x))
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    coefficients::{FunctionCoefficient, VectorConstantCoefficient, VectorFunctionCoefficient},
    geometry::Point,
    mesh::cuboid::CuboidMeshInfo,
  };
  use approx::assert_relative_eq;

  fn space(name: &str) -> Rc<FeSpace> {
    let mesh = Rc::new(CuboidMeshInfo::unit(2).to_mesh().unwrap());
    Rc::new(FeSpace::from_name(mesh, name).unwrap())
  }

  #[test]
  fn constant_fields_are_reproduced() {
    let value = na::Vector3::new(1.0, -2.0, 0.5);
    let coef = VectorConstantCoefficient::new(value);
    for name in ["ND_3D_P1", "RT_3D_P0"] {
      let mut gf = GridFunction::new(space(name));
      gf.project_vector(&coef);
      let ncells = gf.space().mesh().ncells();
      for c in 0..ncells {
        assert_relative_eq!(gf.eval_vector(c, &[0.1, 0.2, 0.3, 0.4]), value, epsilon = 1e-12);
      }
    }
  }

  #[test]
  fn linear_scalar_and_its_gradient() {
    let mut gf = GridFunction::new(space("H1_3D_P1"));
    gf.project_scalar(&FunctionCoefficient::new(|x, _| 1.0 + 2.0 * x[0] - x[2]));
    let geo = gf.space().mesh().cell_geometry(5).clone();
    let bary = [0.1, 0.2, 0.3, 0.4];
    let x = geo.bary2global(&bary);
    assert_relative_eq!(gf.eval_scalar(5, &bary), 1.0 + 2.0 * x[0] - x[2], epsilon = 1e-12);
    assert_relative_eq!(gf.eval_gradient(5), na::Vector3::new(2.0, 0.0, -1.0), epsilon = 1e-12);
  }

  #[test]
  fn rotation_has_constant_curl() {
    let mut gf = GridFunction::new(space("ND_3D_P1"));
    // curl of (-y, x, 0) / 2 is e_z
    gf.project_vector(&VectorFunctionCoefficient::new(|x: &Point, _| {
      na::Vector3::new(-0.5 * x[1], 0.5 * x[0], 0.0)
    }));
    for c in 0..gf.space().mesh().ncells() {
      assert_relative_eq!(gf.eval_curl(c), na::Vector3::z(), epsilon = 1e-12);
    }
  }

  #[test]
  fn flux_of_constant_field_through_a_side() {
    let mut gf = GridFunction::new(space("ND_3D_P1"));
    gf.project_vector(&VectorConstantCoefficient::new(na::Vector3::new(3.0, 1.0, 0.0)));
    // side x+ has outward normal e_x and unit area
    assert_relative_eq!(gf.boundary_flux(&[2]), 3.0, epsilon = 1e-12);
    assert_relative_eq!(gf.boundary_flux(&[1]), -3.0, epsilon = 1e-12);
    assert_relative_eq!(gf.boundary_flux(&[1, 2]), 0.0, epsilon = 1e-12);
  }

  #[test]
  fn data_length_is_fixed() {
    let mut gf = GridFunction::new(space("H1_3D_P1"));
    assert!(gf.copy_from(&na::DVector::zeros(3)).is_err());
  }
}
