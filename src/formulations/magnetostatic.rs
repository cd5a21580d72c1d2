use super::{
  kernel_params, register_curl_aux, register_field_if_absent, register_space_if_absent, require_scalar, Formulation,
  HCURL_SPACE, HDIV_SPACE,
};
use crate::{
  auxsolvers::AuxSolvers,
  coefficients::{Coefficients, ConstantCoefficient, RatioCoefficient},
  equation_system::EquationSystem,
  error::Result,
  kernels::{CurlCurlKernel, Kernel, VectorFeMassKernel},
  mesh::Mesh,
  registry::{FeSpaces, GridFunctions},
};

use std::rc::Rc;

/// Gauge term added to the curl-curl operator to make it definite.
pub const DEFAULT_REGULARISATION: f64 = 1e-6;

/// $nabla times (nu nabla times bold(A)) + epsilon bold(A) = bold(J)$, solved once.
///
/// The coil sources supply $bold(J)$. $nu = 1 / mu$ is derived from the
/// permeability unless a reluctivity coefficient is already registered.
#[derive(Debug, Clone)]
pub struct MagnetostaticFormulation {
  permeability: String,
  variable: String,
  regularisation: f64,
  curl: Option<String>,
}

impl MagnetostaticFormulation {
  pub const RELUCTIVITY: &'static str = "magnetic_reluctivity";
  pub const REGULARISATION: &'static str = "_magnetostatic_regularisation";

  pub fn new(permeability: &str, variable: &str) -> Self {
    Self {
      permeability: permeability.to_string(),
      variable: variable.to_string(),
      regularisation: DEFAULT_REGULARISATION,
      curl: None,
    }
  }

  pub fn with_regularisation(mut self, epsilon: f64) -> Self {
    self.regularisation = epsilon;
    self
  }
  pub fn with_curl(mut self, name: &str) -> Self {
    self.curl = Some(name.to_string());
    self
  }

  pub fn variable(&self) -> &str {
    &self.variable
  }
}

impl Formulation for MagnetostaticFormulation {
  fn is_time_domain(&self) -> bool {
    false
  }

  fn register_fe_spaces(&self, mesh: &Rc<Mesh>, fespaces: &mut FeSpaces) -> Result<()> {
    register_space_if_absent(fespaces, mesh, HCURL_SPACE, "ND_3D_P1")?;
    if self.curl.is_some() {
      register_space_if_absent(fespaces, mesh, HDIV_SPACE, "RT_3D_P0")?;
    }
    Ok(())
  }

  fn register_grid_functions(&self, fespaces: &FeSpaces, gridfunctions: &mut GridFunctions) -> Result<()> {
    const REQUESTER: &str = "MagnetostaticFormulation";
    register_field_if_absent(gridfunctions, fespaces, &self.variable, HCURL_SPACE, REQUESTER)?;
    if let Some(curl) = &self.curl {
      register_field_if_absent(gridfunctions, fespaces, curl, HDIV_SPACE, REQUESTER)?;
    }
    Ok(())
  }

  fn register_coefficients(&self, coefficients: &mut Coefficients) -> Result<()> {
    const REQUESTER: &str = "MagnetostaticFormulation";
    if !coefficients.scalars.has(Self::RELUCTIVITY) {
      let mu = coefficients.scalars.require(&self.permeability, REQUESTER)?;
      let one = Rc::new(ConstantCoefficient::new(1.0));
      coefficients.add_scalar(Self::RELUCTIVITY, Rc::new(RatioCoefficient::new(one, mu)))?;
    }
    if !coefficients.scalars.has(Self::REGULARISATION) {
      coefficients.add_scalar(
        Self::REGULARISATION,
        Rc::new(ConstantCoefficient::new(self.regularisation)),
      )?;
    }
    require_scalar(coefficients, Self::RELUCTIVITY, REQUESTER)
  }

  fn register_aux_solvers(&self, aux_solvers: &mut AuxSolvers) -> Result<()> {
    match &self.curl {
      Some(curl) => register_curl_aux(aux_solvers, &self.variable, curl),
      None => Ok(()),
    }
  }

  fn construct_equation_system(&self) -> Result<EquationSystem> {
    let mut es = EquationSystem::new();
    es.add_variable(&self.variable)?;
    es.add_kernel(
      &self.variable,
      Kernel::diagonal(CurlCurlKernel::new(&kernel_params(Self::RELUCTIVITY))?),
    )?;
    es.add_kernel(
      &self.variable,
      Kernel::diagonal(VectorFeMassKernel::new(&kernel_params(Self::REGULARISATION))?),
    )?;
    Ok(es)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn steady_single_block() {
    let formulation = MagnetostaticFormulation::new("mu", "a");
    assert!(!formulation.is_time_domain());
    let es = formulation.construct_equation_system().unwrap();
    assert!(!es.is_time_dependent());
    assert_eq!(es.test_variable_names(), vec!["a"]);
    assert_eq!(es.nkernels("a"), 2);

    let mut coefficients = Coefficients::new();
    assert!(formulation.register_coefficients(&mut coefficients).is_err());
  }
}
