//! Bilinear, mixed bilinear and linear forms collecting integrators.

use crate::{
  assemble::{self, GalVec},
  error::{Error, Result},
  fe::FeSpace,
  linalg::SparseMatrix,
  mesh::Attribute,
  operators::{BoundaryElVecProvider, ElMatProvider, ElVecProvider},
};

use std::rc::Rc;

fn check_family(context: &'static str, expected: &FeSpace, found: crate::fe::FeFamily) -> Result<()> {
  if expected.family() != found {
    return Err(Error::UnsupportedElement(format!(
      "{context}: integrator for {found:?} on {} space",
      expected.collection()
    )));
  }
  Ok(())
}

/// Square bilinear form on one space.
pub struct BilinearForm {
  space: Rc<FeSpace>,
  integrators: Vec<Box<dyn ElMatProvider>>,
}

impl BilinearForm {
  pub fn new(space: Rc<FeSpace>) -> Self {
    Self {
      space,
      integrators: Vec::new(),
    }
  }

  pub fn space(&self) -> &Rc<FeSpace> {
    &self.space
  }
  pub fn nintegrators(&self) -> usize {
    self.integrators.len()
  }

  pub fn add_domain_integrator(&mut self, integrator: Box<dyn ElMatProvider>) -> Result<()> {
    check_family("bilinear form", &self.space, integrator.row_family())?;
    check_family("bilinear form", &self.space, integrator.col_family())?;
    self.integrators.push(integrator);
    Ok(())
  }

  pub fn assemble(&self) -> SparseMatrix {
    let n = self.space.ndofs();
    let mut galmat = SparseMatrix::zeros(n, n);
    for integrator in &self.integrators {
      let part = assemble::assemble_galmat(&self.space, &self.space, integrator.as_ref());
      galmat.add_block(&part, 0, 0, 1.0);
    }
    galmat
  }
}

/// Bilinear form coupling a trial space to a different test space.
pub struct MixedBilinearForm {
  trial: Rc<FeSpace>,
  test: Rc<FeSpace>,
  integrators: Vec<Box<dyn ElMatProvider>>,
}

impl MixedBilinearForm {
  pub fn new(trial: Rc<FeSpace>, test: Rc<FeSpace>) -> Result<Self> {
    if !trial.shares_mesh(&test) {
      return Err(Error::Mesh("mixed form spaces live on different meshes".into()));
    }
    Ok(Self {
      trial,
      test,
      integrators: Vec::new(),
    })
  }

  pub fn trial_space(&self) -> &Rc<FeSpace> {
    &self.trial
  }
  pub fn test_space(&self) -> &Rc<FeSpace> {
    &self.test
  }
  pub fn nintegrators(&self) -> usize {
    self.integrators.len()
  }

  pub fn add_domain_integrator(&mut self, integrator: Box<dyn ElMatProvider>) -> Result<()> {
    check_family("mixed bilinear form", &self.test, integrator.row_family())?;
    check_family("mixed bilinear form", &self.trial, integrator.col_family())?;
    self.integrators.push(integrator);
    Ok(())
  }

  pub fn assemble(&self) -> SparseMatrix {
    let mut galmat = SparseMatrix::zeros(self.test.ndofs(), self.trial.ndofs());
    for integrator in &self.integrators {
      let part = assemble::assemble_galmat(&self.test, &self.trial, integrator.as_ref());
      galmat.add_block(&part, 0, 0, 1.0);
    }
    galmat
  }
}

/// Linear form: domain and boundary integrators plus directly added dual vectors.
pub struct LinearForm {
  space: Rc<FeSpace>,
  domain_integrators: Vec<Box<dyn ElVecProvider>>,
  boundary_integrators: Vec<(Vec<Attribute>, Box<dyn BoundaryElVecProvider>)>,
  direct: GalVec,
}

impl LinearForm {
  pub fn new(space: Rc<FeSpace>) -> Self {
    let direct = GalVec::zeros(space.ndofs());
    Self {
      space,
      domain_integrators: Vec::new(),
      boundary_integrators: Vec::new(),
      direct,
    }
  }

  pub fn space(&self) -> &Rc<FeSpace> {
    &self.space
  }
  pub fn nintegrators(&self) -> usize {
    self.domain_integrators.len() + self.boundary_integrators.len()
  }

  pub fn add_domain_integrator(&mut self, integrator: Box<dyn ElVecProvider>) -> Result<()> {
    check_family("linear form", &self.space, integrator.family())?;
    self.domain_integrators.push(integrator);
    Ok(())
  }

  pub fn add_boundary_integrator(
    &mut self,
    attributes: Vec<Attribute>,
    integrator: Box<dyn BoundaryElVecProvider>,
  ) -> Result<()> {
    check_family("linear form", &self.space, integrator.family())?;
    self.boundary_integrators.push((attributes, integrator));
    Ok(())
  }

  /// Adds `scale * v` to the assembled vector.
  pub fn add(&mut self, scale: f64, v: &GalVec) -> Result<()> {
    if v.len() != self.direct.len() {
      return Err(Error::DimensionMismatch {
        context: "linear form addition",
        expected: self.direct.len(),
        found: v.len(),
      });
    }
    self.direct.axpy(scale, v, 1.0);
    Ok(())
  }

  pub fn assemble(&self) -> GalVec {
    let mut galvec = self.direct.clone();
    for integrator in &self.domain_integrators {
      galvec += assemble::assemble_galvec(&self.space, integrator.as_ref());
    }
    for (attributes, integrator) in &self.boundary_integrators {
      galvec += assemble::assemble_boundary_galvec(&self.space, attributes, integrator.as_ref());
    }
    galvec
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    coefficients::{ConstantCoefficient, ScalarCoefficient},
    mesh::cuboid::CuboidMeshInfo,
    operators::{DiffusionElmat, MixedGradientElmat, ScalarBoundaryLoadElvec, ScalarLoadElvec},
  };
  use approx::assert_relative_eq;

  fn constant(v: f64) -> Rc<dyn ScalarCoefficient> {
    Rc::new(ConstantCoefficient::new(v))
  }

  #[test]
  fn integrators_are_summed() {
    let mesh = Rc::new(CuboidMeshInfo::unit(1).to_mesh().unwrap());
    let h1 = Rc::new(FeSpace::from_name(mesh, "H1_3D_P1").unwrap());

    let mut lf = LinearForm::new(h1.clone());
    lf.add_domain_integrator(Box::new(ScalarLoadElvec::new(constant(2.0)))).unwrap();
    lf.add_boundary_integrator(vec![1], Box::new(ScalarBoundaryLoadElvec::new(constant(3.0))))
      .unwrap();
    lf.add(1.0, &GalVec::from_element(8, 0.5)).unwrap();
    let galvec = lf.assemble();
    // total: 2 * volume + 3 * area + 8 * 0.5
    assert_relative_eq!(galvec.sum(), 2.0 + 3.0 + 4.0, epsilon = 1e-12);

    let mut blf = BilinearForm::new(h1.clone());
    blf.add_domain_integrator(Box::new(DiffusionElmat::new(constant(1.0)))).unwrap();
    assert!(blf
      .add_domain_integrator(Box::new(MixedGradientElmat::new(constant(1.0))))
      .is_err());
    // constants are in the kernel of the stiffness matrix
    let ones = na::DVector::from_element(8, 1.0);
    assert_relative_eq!(blf.assemble().mul_vec(&ones).norm(), 0.0, epsilon = 1e-12);
  }
}
