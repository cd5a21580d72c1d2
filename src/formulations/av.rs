use super::{
  coupled_kernel_params, kernel_params, register_field_if_absent, register_space_if_absent, require_scalar,
  Formulation, HCurlFormulation, H1_SPACE,
};
use crate::{
  auxsolvers::AuxSolvers,
  coefficients::Coefficients,
  equation_system::{time_derivative_name, EquationSystem},
  error::Result,
  kernels::{DiffusionKernel, Kernel, MixedVectorGradientKernel, VectorFeWeakDivergenceKernel},
  mesh::Mesh,
  registry::{FeSpaces, GridFunctions},
};

use std::rc::Rc;

/// Coupled magnetic vector potential $bold(A)$ and electric scalar potential $V$:
///
/// $nabla times (nu nabla times bold(A)) + sigma (dot(bold(A)) + nabla V) = 0$,
/// $nabla dot sigma (dot(bold(A)) + nabla V) = 0$.
///
/// $bold(A)$ is integrated in time, $V$ is solved for algebraically at every
/// step. The block system is symmetric.
#[derive(Debug, Clone)]
pub struct AvFormulation {
  vector: HCurlFormulation,
  potential: String,
}

impl AvFormulation {
  pub fn new(permeability: &str, conductivity: &str, vector_potential: &str, scalar_potential: &str) -> Self {
    Self {
      vector: HCurlFormulation::a_formulation(permeability, conductivity, vector_potential),
      potential: scalar_potential.to_string(),
    }
  }

  pub fn with_curl(mut self, name: &str) -> Self {
    self.vector = self.vector.with_curl(name);
    self
  }

  pub fn vector_potential(&self) -> &str {
    self.vector.variable()
  }
  pub fn scalar_potential(&self) -> &str {
    &self.potential
  }
}

impl Formulation for AvFormulation {
  fn is_time_domain(&self) -> bool {
    true
  }

  fn register_fe_spaces(&self, mesh: &Rc<Mesh>, fespaces: &mut FeSpaces) -> Result<()> {
    self.vector.register_fe_spaces(mesh, fespaces)?;
    register_space_if_absent(fespaces, mesh, H1_SPACE, "H1_3D_P1")
  }

  fn register_grid_functions(&self, fespaces: &FeSpaces, gridfunctions: &mut GridFunctions) -> Result<()> {
    self.vector.register_grid_functions(fespaces, gridfunctions)?;
    register_field_if_absent(gridfunctions, fespaces, &self.potential, H1_SPACE, "AVFormulation")
  }

  fn register_coefficients(&self, coefficients: &mut Coefficients) -> Result<()> {
    self.vector.register_coefficients(coefficients)?;
    require_scalar(coefficients, self.vector.beta(), "AVFormulation")
  }

  fn register_aux_solvers(&self, aux_solvers: &mut AuxSolvers) -> Result<()> {
    self.vector.register_aux_solvers(aux_solvers)
  }

  fn construct_equation_system(&self) -> Result<EquationSystem> {
    let sigma = self.vector.beta();
    let mut es = self.vector.construct_equation_system()?;
    let da_dt = time_derivative_name(self.vector.variable());
    es.add_kernel(
      &da_dt,
      Kernel::mixed(MixedVectorGradientKernel::new(&coupled_kernel_params(sigma, &self.potential))?),
    )?;

    es.add_variable(&self.potential)?;
    es.add_kernel(
      &self.potential,
      Kernel::mixed(VectorFeWeakDivergenceKernel::new(&coupled_kernel_params(sigma, &da_dt))?),
    )?;
    es.add_kernel(&self.potential, Kernel::diagonal(DiffusionKernel::new(&kernel_params(sigma))?))?;
    Ok(es)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn block_structure() {
    let formulation = AvFormulation::new("mu", "sigma", "a", "v");
    let es = formulation.construct_equation_system().unwrap();
    assert_eq!(es.test_variable_names(), vec!["d(a)/dt", "v"]);
    assert_eq!(es.state_variable_names(), vec!["a"]);
    assert_eq!(es.nkernels("d(a)/dt"), 4);
    assert_eq!(es.nkernels("v"), 2);
  }
}
