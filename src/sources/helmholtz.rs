use super::{hcurl_mass, solve_constrained, unit_coefficient};
use crate::{
  assemble::{self, discrete_gradient},
  error::{Error, Result},
  fe::{gridfunction::GridFunction, DofIdx, FeCollection, FeFamily, FeSpace},
  linalg::{solvers::SolverOptions, SparseMatrix},
  operators::DiffusionElmat,
};

use std::rc::Rc;

/// Removes the gradient part of an H(curl) field.
///
/// Solves $(nabla phi, nabla phi') = (bold(J), nabla phi')$ and replaces
/// $bold(J) <- bold(J) - nabla phi$, which leaves $G^T M bold(J) = 0$ at every
/// vertex where $phi$ is free. Vertices in `fixed` carry $phi = 0$.
pub struct HelmholtzProjector {
  h1: Rc<FeSpace>,
  hcurl: Rc<FeSpace>,
  gradient: SparseMatrix,
  gradient_t: SparseMatrix,
  mass: SparseMatrix,
  stiffness: SparseMatrix,
  options: SolverOptions,
}

impl HelmholtzProjector {
  pub fn new(hcurl: Rc<FeSpace>, options: SolverOptions) -> Result<Self> {
    if hcurl.family() != FeFamily::HCurl {
      return Err(Error::UnsupportedElement(format!(
        "helmholtz projection of {} field",
        hcurl.collection()
      )));
    }
    let h1 = Rc::new(FeSpace::new(
      Rc::clone(hcurl.mesh()),
      FeCollection::lowest(FeFamily::H1),
    ));
    let gradient = discrete_gradient(&h1, &hcurl);
    let gradient_t = gradient.transpose();
    let mass = hcurl_mass(&hcurl, unit_coefficient());
    let stiffness = assemble::assemble_galmat(&h1, &h1, &DiffusionElmat::new(unit_coefficient()));
    Ok(Self {
      h1,
      hcurl,
      gradient,
      gradient_t,
      mass,
      stiffness,
      options,
    })
  }

  pub fn h1_space(&self) -> &Rc<FeSpace> {
    &self.h1
  }

  /// Weak divergence $G^T M bold(J)$, one entry per vertex.
  pub fn weak_divergence(&self, field: &GridFunction) -> na::DVector<f64> {
    self.gradient_t.mul_vec(&self.mass.mul_vec(field.data()))
  }

  pub fn project(&self, field: &mut GridFunction, fixed: &[DofIdx]) -> Result<()> {
    if !Rc::ptr_eq(field.space().mesh(), self.hcurl.mesh()) || field.family() != FeFamily::HCurl {
      return Err(Error::Mesh("field does not live in the projector's H(curl) space".into()));
    }
    let rhs = self.weak_divergence(field);
    // without fixed vertices $phi$ is determined up to a constant
    let dof_coeffs: Vec<_> = if fixed.is_empty() {
      vec![(0, 0.0)]
    } else {
      assemble::dedup_dof_coeffs(fixed.iter().map(|&d| (d, 0.0)).collect())
    };
    let phi = solve_constrained(self.stiffness.clone(), rhs, &dof_coeffs, &self.options)?;
    field.axpy(-1.0, &self.gradient.mul_vec(&phi))?;
    Ok(())
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{coefficients::VectorFunctionCoefficient, mesh::cuboid::CuboidMeshInfo};

  #[test]
  fn projection_removes_weak_divergence() {
    let mesh = Rc::new(CuboidMeshInfo::unit(2).to_mesh().unwrap());
    let hcurl = Rc::new(FeSpace::from_name(mesh, "ND_3D_P1").unwrap());
    let options = SolverOptions::default().with_tolerance(1e-14).with_max_iter(2000);
    let projector = HelmholtzProjector::new(hcurl.clone(), options).unwrap();

    let mut field = GridFunction::new(hcurl);
    field.project_vector(&VectorFunctionCoefficient::new(|x, _| {
      na::Vector3::new(x[0] * x[0], x[1] * x[2], x[0] + x[1])
    }));
    let before = projector.weak_divergence(&field).amax();
    assert!(before > 1e-3);

    projector.project(&mut field, &[]).unwrap();
    let after = projector.weak_divergence(&field);
    // the pinned vertex absorbs the compatibility condition
    assert!(after.amax() < 1e-10 * before.max(1.0), "{after}");
  }

  #[test]
  fn gradients_are_removed_entirely() {
    let mesh = Rc::new(CuboidMeshInfo::unit(2).to_mesh().unwrap());
    let hcurl = Rc::new(FeSpace::from_name(mesh, "ND_3D_P1").unwrap());
    let projector = HelmholtzProjector::new(hcurl.clone(), SolverOptions::default()).unwrap();

    let mut v = GridFunction::new(Rc::clone(projector.h1_space()));
    v.project_scalar(&crate::coefficients::FunctionCoefficient::new(|x, _| x[0] * x[1] - x[2]));
    let mut field = GridFunction::from_data(hcurl, projector.gradient.mul_vec(v.data())).unwrap();
    projector.project(&mut field, &[]).unwrap();
    assert!(field.data().amax() < 1e-8);
  }
}
