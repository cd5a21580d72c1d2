//! Forcing terms injected into the H(curl) right hand sides.
//!
//! A source resolves and precomputes in `init` and contributes to a
//! linear form on every `apply`.

pub mod closed_coil;
pub mod div_free;
pub mod helmholtz;
pub mod open_coil;
pub mod scalar_potential;

pub use closed_coil::ClosedCoilSource;
pub use div_free::DivFreeSource;
pub use helmholtz::HelmholtzProjector;
pub use open_coil::OpenCoilSource;
pub use scalar_potential::{PotentialSolver, ScalarPotentialSource};

use crate::{
  assemble::{self, GalVec},
  coefficients::{ConstantCoefficient, ScalarCoefficient},
  error::Result,
  fe::{DofIdx, FeFamily, FeSpace},
  forms::LinearForm,
  linalg::{
    solvers::{self, SolverKind, SolverOptions},
    SparseMatrix,
  },
  operators::VectorMassElmat,
  params::InputParameters,
  registry::{Bindings, NamedRegistry, Ownership},
};

use std::{cell::RefCell, rc::Rc};

pub trait Source {
  fn init(&mut self, bindings: &Bindings) -> Result<()>;
  fn apply(&self, lf: &mut LinearForm) -> Result<()>;
}

/// Named sources, applied in registration order.
#[derive(Clone)]
pub struct Sources {
  sources: NamedRegistry<RefCell<dyn Source>>,
}

impl Default for Sources {
  fn default() -> Self {
    Self::new()
  }
}

impl Sources {
  pub fn new() -> Self {
    Self {
      sources: NamedRegistry::new("source"),
    }
  }

  pub fn add(&mut self, name: &str, source: impl Source + 'static) -> Result<()> {
    let source: Rc<RefCell<dyn Source>> = Rc::new(RefCell::new(source));
    self.sources.register(name, source, Ownership::Owned)
  }

  pub fn get(&self, name: &str) -> Option<Rc<RefCell<dyn Source>>> {
    self.sources.get(name)
  }
  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.sources.names()
  }
  pub fn len(&self) -> usize {
    self.sources.len()
  }
  pub fn is_empty(&self) -> bool {
    self.sources.is_empty()
  }

  pub fn init(&self, bindings: &Bindings) -> Result<()> {
    for (name, source) in self.sources.iter() {
      tracing::debug!("initialising source `{name}`");
      source.borrow_mut().init(bindings)?;
    }
    Ok(())
  }

  pub fn apply(&self, lf: &mut LinearForm) -> Result<()> {
    for (_, source) in self.sources.iter() {
      source.borrow().apply(lf)?;
    }
    Ok(())
  }
}

/// Options of the auxiliary solves performed by sources, read from the
/// optional nested `SolverOptions` bag.
pub(crate) fn auxiliary_solver_options(params: &InputParameters) -> Result<SolverOptions> {
  let defaults = SolverOptions {
    tolerance: 1e-14,
    abs_tolerance: 1e-20,
    max_iter: 2000,
    print_level: 0,
    kind: SolverKind::Pcg,
  };
  SolverOptions::from_params(&params.get_params_or_empty("SolverOptions")?, defaults)
}

/// Solves $A x = b$ with the given dofs prescribed, starting from the prescribed values.
pub(crate) fn solve_constrained(
  mut matrix: SparseMatrix,
  mut rhs: GalVec,
  dof_coeffs: &[(DofIdx, f64)],
  options: &SolverOptions,
) -> Result<na::DVector<f64>> {
  assemble::fix_dofs_coeff(dof_coeffs, &mut matrix, &mut rhs);
  let mut x = na::DVector::zeros(rhs.len());
  for &(i, v) in dof_coeffs {
    x[i] = v;
  }
  let matrix = matrix.to_nalgebra_csr()?;
  solvers::solve_system(&matrix, &rhs, &mut x, options)?;
  Ok(x)
}

pub(crate) fn unit_coefficient() -> Rc<dyn ScalarCoefficient> {
  Rc::new(ConstantCoefficient::new(1.0))
}

/// Coefficient weighted H(curl) mass matrix.
pub(crate) fn hcurl_mass(space: &FeSpace, coef: Rc<dyn ScalarCoefficient>) -> SparseMatrix {
  assemble::assemble_galmat(space, space, &VectorMassElmat::square(FeFamily::HCurl, coef))
}
