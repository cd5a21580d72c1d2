//! Formulations: the spaces, fields, coefficients and kernels of one
//! physical model, registered on top of what the user provided.

pub mod av;
pub mod hcurl;
pub mod magnetostatic;

pub use av::AvFormulation;
pub use hcurl::HCurlFormulation;
pub use magnetostatic::MagnetostaticFormulation;

use crate::{
  auxsolvers::{AuxSolvers, CurlAuxSolver},
  coefficients::Coefficients,
  equation_system::{time_derivative_name, EquationSystem},
  error::{Error, Result},
  fe::{gridfunction::GridFunction, FeSpace},
  mesh::Mesh,
  params::InputParameters,
  registry::{FeSpaces, GridFunctions},
};

use std::{cell::RefCell, rc::Rc};

/// Default space names registered by the formulations when absent.
pub const H1_SPACE: &str = "_H1FESpace";
pub const HCURL_SPACE: &str = "_HCurlFESpace";
pub const HDIV_SPACE: &str = "_HDivFESpace";

pub trait Formulation {
  /// Whether the problem is integrated in time or solved once.
  fn is_time_domain(&self) -> bool;

  fn register_fe_spaces(&self, mesh: &Rc<Mesh>, fespaces: &mut FeSpaces) -> Result<()>;
  fn register_grid_functions(&self, fespaces: &FeSpaces, gridfunctions: &mut GridFunctions) -> Result<()>;
  /// Registers derived coefficients and checks that the required ones exist.
  fn register_coefficients(&self, coefficients: &mut Coefficients) -> Result<()>;
  fn register_aux_solvers(&self, aux_solvers: &mut AuxSolvers) -> Result<()>;
  fn construct_equation_system(&self) -> Result<EquationSystem>;
}

pub(crate) fn register_space_if_absent(
  fespaces: &mut FeSpaces,
  mesh: &Rc<Mesh>,
  name: &str,
  collection: &str,
) -> Result<()> {
  if !fespaces.has(name) {
    fespaces.register_owned(name, FeSpace::from_name(Rc::clone(mesh), collection)?)?;
  }
  Ok(())
}

pub(crate) fn register_field_if_absent(
  gridfunctions: &mut GridFunctions,
  fespaces: &FeSpaces,
  name: &str,
  space: &str,
  requester: &str,
) -> Result<()> {
  if !gridfunctions.has(name) {
    let space = fespaces.require(space, requester)?;
    gridfunctions.register_owned(name, RefCell::new(GridFunction::new(space)))?;
  }
  Ok(())
}

/// Registers `d(name)/dt` on the space of the existing field `name`.
pub(crate) fn register_time_derivative(gridfunctions: &mut GridFunctions, name: &str, requester: &str) -> Result<()> {
  let derivative = time_derivative_name(name);
  if !gridfunctions.has(&derivative) {
    let space = Rc::clone(gridfunctions.require(name, requester)?.borrow().space());
    gridfunctions.register_owned(&derivative, RefCell::new(GridFunction::new(space)))?;
  }
  Ok(())
}

pub(crate) fn require_scalar(coefficients: &Coefficients, name: &str, requester: &str) -> Result<()> {
  if coefficients.scalars.has(name) {
    Ok(())
  } else {
    Err(Error::missing("scalar coefficient", name, requester))
  }
}

pub(crate) fn kernel_params(coef: &str) -> InputParameters {
  InputParameters::new().with("CoefficientName", coef)
}

pub(crate) fn coupled_kernel_params(coef: &str, coupled: &str) -> InputParameters {
  kernel_params(coef).with("CoupledVariableName", coupled)
}

/// Registers the curl post-processor writing $nabla times bold(u)$ into `curl`.
pub(crate) fn register_curl_aux(aux_solvers: &mut AuxSolvers, variable: &str, curl: &str) -> Result<()> {
  let name = format!("_{curl}_aux");
  if !aux_solvers.has(&name) {
    let params = InputParameters::new()
      .with("VariableName", variable)
      .with("CurlName", curl);
    aux_solvers.add(&name, CurlAuxSolver::new(&params)?)?;
  }
  Ok(())
}
