use super::{
  coupled_kernel_params, kernel_params, register_curl_aux, register_field_if_absent, register_space_if_absent,
  register_time_derivative, require_scalar, Formulation, HCURL_SPACE, HDIV_SPACE,
};
use crate::{
  auxsolvers::AuxSolvers,
  coefficients::{Coefficients, ConstantCoefficient, RatioCoefficient},
  equation_system::EquationSystem,
  error::Result,
  kernels::{CurlCurlKernel, Kernel, VectorFeMassKernel, WeakCurlCurlKernel},
  mesh::Mesh,
  registry::{FeSpaces, GridFunctions},
};

use std::rc::Rc;

/// $alpha$ derived as the reciprocal of another coefficient.
#[derive(Debug, Clone)]
struct Reciprocal {
  of: String,
}

/// $nabla times (alpha nabla times bold(u)) + beta dot(bold(u)) = bold(s)$
/// for an H(curl) variable $bold(u)$, integrated for $dot(bold(u))$:
///
/// $("dt" alpha nabla times dot(bold(u)), nabla times bold(v)) + (beta dot(bold(u)), bold(v))
///   = -(alpha nabla times bold(u)_n, nabla times bold(v)) + (bold(s), bold(v))$
#[derive(Debug, Clone)]
pub struct HCurlFormulation {
  alpha: String,
  beta: String,
  variable: String,
  curl: Option<String>,
  reciprocal: Option<Reciprocal>,
}

impl HCurlFormulation {
  pub fn new(alpha: &str, beta: &str, variable: &str) -> Self {
    Self {
      alpha: alpha.to_string(),
      beta: beta.to_string(),
      variable: variable.to_string(),
      curl: None,
      reciprocal: None,
    }
  }

  /// Magnetic vector potential formulation, $alpha = 1 / mu$ and $beta = sigma$.
  pub fn a_formulation(permeability: &str, conductivity: &str, variable: &str) -> Self {
    let mut formulation = Self::new("magnetic_reluctivity", conductivity, variable);
    formulation.reciprocal = Some(Reciprocal {
      of: permeability.to_string(),
    });
    formulation
  }

  /// Also computes $nabla times bold(u)$ into the H(div) field `name` after every step.
  pub fn with_curl(mut self, name: &str) -> Self {
    self.curl = Some(name.to_string());
    self
  }

  pub fn alpha(&self) -> &str {
    &self.alpha
  }
  pub fn beta(&self) -> &str {
    &self.beta
  }
  pub fn variable(&self) -> &str {
    &self.variable
  }
}

impl Formulation for HCurlFormulation {
  fn is_time_domain(&self) -> bool {
    true
  }

  fn register_fe_spaces(&self, mesh: &Rc<Mesh>, fespaces: &mut FeSpaces) -> Result<()> {
    register_space_if_absent(fespaces, mesh, HCURL_SPACE, "ND_3D_P1")?;
    if self.curl.is_some() {
      register_space_if_absent(fespaces, mesh, HDIV_SPACE, "RT_3D_P0")?;
    }
    Ok(())
  }

  fn register_grid_functions(&self, fespaces: &FeSpaces, gridfunctions: &mut GridFunctions) -> Result<()> {
    const REQUESTER: &str = "HCurlFormulation";
    register_field_if_absent(gridfunctions, fespaces, &self.variable, HCURL_SPACE, REQUESTER)?;
    register_time_derivative(gridfunctions, &self.variable, REQUESTER)?;
    if let Some(curl) = &self.curl {
      register_field_if_absent(gridfunctions, fespaces, curl, HDIV_SPACE, REQUESTER)?;
    }
    Ok(())
  }

  fn register_coefficients(&self, coefficients: &mut Coefficients) -> Result<()> {
    const REQUESTER: &str = "HCurlFormulation";
    if let Some(reciprocal) = &self.reciprocal {
      if !coefficients.scalars.has(&self.alpha) {
        let of = coefficients.scalars.require(&reciprocal.of, REQUESTER)?;
        let one = Rc::new(ConstantCoefficient::new(1.0));
        coefficients.add_scalar(&self.alpha, Rc::new(RatioCoefficient::new(one, of)))?;
      }
    }
    require_scalar(coefficients, &self.alpha, REQUESTER)?;
    require_scalar(coefficients, &self.beta, REQUESTER)
  }

  fn register_aux_solvers(&self, aux_solvers: &mut AuxSolvers) -> Result<()> {
    match &self.curl {
      Some(curl) => register_curl_aux(aux_solvers, &self.variable, curl),
      None => Ok(()),
    }
  }

  fn construct_equation_system(&self) -> Result<EquationSystem> {
    let mut es = EquationSystem::new();
    let test = es.add_time_derivative_variable(&self.variable)?;
    let dt_alpha = es.add_dt_scaled_coefficient(&self.alpha);
    es.add_kernel(
      &test,
      Kernel::linear(WeakCurlCurlKernel::new(&coupled_kernel_params(&self.alpha, &self.variable))?),
    )?;
    es.add_kernel(&test, Kernel::diagonal(CurlCurlKernel::new(&kernel_params(&dt_alpha))?))?;
    es.add_kernel(&test, Kernel::diagonal(VectorFeMassKernel::new(&kernel_params(&self.beta))?))?;
    Ok(es)
  }
}
