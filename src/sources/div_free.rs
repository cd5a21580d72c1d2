use super::{auxiliary_solver_options, hcurl_mass, unit_coefficient, HelmholtzProjector, Source};
use crate::{
  coefficients::VectorCoefficient,
  error::{Error, Result},
  fe::gridfunction::GridFunction,
  forms::LinearForm,
  linalg::{solvers::SolverOptions, spmv},
  params::InputParameters,
  registry::Bindings,
};

use std::{cell::RefCell, rc::Rc};

/// Prescribed current density, cleaned of its divergence on every apply.
pub struct DivFreeSource {
  source_name: String,
  coef_name: String,
  options: SolverOptions,
  state: Option<DivFreeState>,
}

struct DivFreeState {
  coef: Rc<dyn VectorCoefficient>,
  source: Rc<RefCell<GridFunction>>,
  projector: HelmholtzProjector,
  mass: nas::CsrMatrix<f64>,
}

impl DivFreeSource {
  /// Reads `SourceName`, `SourceCoefName` and the optional `SolverOptions`.
  pub fn new(params: &InputParameters) -> Result<Self> {
    Ok(Self {
      source_name: params.get_str("SourceName")?.to_string(),
      coef_name: params.get_str("SourceCoefName")?.to_string(),
      options: auxiliary_solver_options(params)?,
      state: None,
    })
  }
}

impl Source for DivFreeSource {
  fn init(&mut self, bindings: &Bindings) -> Result<()> {
    const REQUESTER: &str = "DivFreeSource";
    let coef = bindings.coefficients.vectors.require(&self.coef_name, REQUESTER)?;
    let source = bindings.gridfunctions.require(&self.source_name, REQUESTER)?;
    let space = Rc::clone(source.borrow().space());
    let projector = HelmholtzProjector::new(Rc::clone(&space), self.options.clone())?;
    let mass = hcurl_mass(&space, unit_coefficient()).to_nalgebra_csr()?;
    self.state = Some(DivFreeState {
      coef,
      source,
      projector,
      mass,
    });
    Ok(())
  }

  fn apply(&self, lf: &mut LinearForm) -> Result<()> {
    let state = self
      .state
      .as_ref()
      .ok_or_else(|| Error::Uninitialized("DivFreeSource".into()))?;
    let mut source = state.source.borrow_mut();
    source.project_vector(state.coef.as_ref());
    state.projector.project(&mut source, &[])?;
    lf.add(1.0, &spmv(&state.mass, source.data()))
  }
}
