//! Post-processing solves deriving fields from the solution after each step.

use crate::{
  assemble::{self, discrete_curl},
  coefficients::{Coefficients, ScalarCoefficient},
  error::{Error, Result},
  fe::{gridfunction::GridFunction, FeFamily},
  linalg::{
    solvers::{self, SolverKind, SolverOptions},
    SparseMatrix,
  },
  operators::VectorMassElmat,
  params::InputParameters,
  registry::{GridFunctions, NamedRegistry, Ownership},
};

use std::{cell::RefCell, rc::Rc};

pub trait AuxSolver {
  fn init(&mut self, gridfunctions: &GridFunctions, coefficients: &Coefficients) -> Result<()>;
  fn solve(&mut self, t: f64) -> Result<()>;
}

/// Named aux solvers, run in registration order.
#[derive(Clone)]
pub struct AuxSolvers {
  solvers: NamedRegistry<RefCell<dyn AuxSolver>>,
}

impl Default for AuxSolvers {
  fn default() -> Self {
    Self::new()
  }
}

impl AuxSolvers {
  pub fn new() -> Self {
    Self {
      solvers: NamedRegistry::new("aux solver"),
    }
  }

  pub fn add(&mut self, name: &str, solver: impl AuxSolver + 'static) -> Result<()> {
    let solver: Rc<RefCell<dyn AuxSolver>> = Rc::new(RefCell::new(solver));
    self.solvers.register(name, solver, Ownership::Owned)
  }
  pub fn has(&self, name: &str) -> bool {
    self.solvers.has(name)
  }
  pub fn len(&self) -> usize {
    self.solvers.len()
  }
  pub fn is_empty(&self) -> bool {
    self.solvers.is_empty()
  }

  pub fn init(&self, gridfunctions: &GridFunctions, coefficients: &Coefficients) -> Result<()> {
    for (_, solver) in self.solvers.iter() {
      solver.borrow_mut().init(gridfunctions, coefficients)?;
    }
    Ok(())
  }

  pub fn solve(&self, t: f64) -> Result<()> {
    for (_, solver) in self.solvers.iter() {
      solver.borrow_mut().solve(t)?;
    }
    Ok(())
  }
}

/// $bold(B) = nabla times bold(A)$ from H(curl) into H(div), exact through the discrete curl.
pub struct CurlAuxSolver {
  input_name: String,
  output_name: String,
  state: Option<(Rc<RefCell<GridFunction>>, Rc<RefCell<GridFunction>>, SparseMatrix)>,
}

impl CurlAuxSolver {
  /// Reads `VariableName` (H(curl)) and `CurlName` (H(div)).
  pub fn new(params: &InputParameters) -> Result<Self> {
    Ok(Self {
      input_name: params.get_str("VariableName")?.to_string(),
      output_name: params.get_str("CurlName")?.to_string(),
      state: None,
    })
  }
}

impl AuxSolver for CurlAuxSolver {
  fn init(&mut self, gridfunctions: &GridFunctions, _: &Coefficients) -> Result<()> {
    let input = gridfunctions.require(&self.input_name, "CurlAuxSolver")?;
    let output = gridfunctions.require(&self.output_name, "CurlAuxSolver")?;
    let curl = {
      let (a, b) = (input.borrow(), output.borrow());
      if a.family() != FeFamily::HCurl || b.family() != FeFamily::HDiv || !a.space().shares_mesh(b.space()) {
        return Err(Error::UnsupportedElement(format!(
          "curl from {} to {}",
          a.space().collection(),
          b.space().collection()
        )));
      }
      discrete_curl(a.space(), b.space())
    };
    self.state = Some((input, output, curl));
    Ok(())
  }

  fn solve(&mut self, _: f64) -> Result<()> {
    let (input, output, curl) = self
      .state
      .as_ref()
      .ok_or_else(|| Error::Uninitialized("CurlAuxSolver".into()))?;
    let b = curl.mul_vec(input.borrow().data());
    output.borrow_mut().copy_from(&b)
  }
}

/// L2 projection of $a c bold(u)$ into another vector space:
/// $M_"out" bold(x) = a M_"mixed"(c) bold(u)$.
pub struct ScaledVectorGridFunctionAux {
  input_name: String,
  output_name: String,
  coef_name: String,
  scale: f64,
  options: SolverOptions,
  state: Option<ScaledState>,
}

struct ScaledState {
  input: Rc<RefCell<GridFunction>>,
  output: Rc<RefCell<GridFunction>>,
  coef: Rc<dyn ScalarCoefficient>,
  mass: nas::CsrMatrix<f64>,
}

impl ScaledVectorGridFunctionAux {
  /// Reads `InputVariableName`, `ScaledVariableName`, `CoefficientName`, the
  /// optional `Scale` (default 1) and the optional `SolverOptions`.
  pub fn new(params: &InputParameters) -> Result<Self> {
    let defaults = SolverOptions {
      tolerance: 1e-14,
      abs_tolerance: 1e-20,
      max_iter: 1000,
      print_level: 0,
      kind: SolverKind::Pcg,
    };
    Ok(Self {
      input_name: params.get_str("InputVariableName")?.to_string(),
      output_name: params.get_str("ScaledVariableName")?.to_string(),
      coef_name: params.get_str("CoefficientName")?.to_string(),
      scale: params.get_float_or("Scale", 1.0)?,
      options: SolverOptions::from_params(&params.get_params_or_empty("SolverOptions")?, defaults)?,
      state: None,
    })
  }
}

impl AuxSolver for ScaledVectorGridFunctionAux {
  fn init(&mut self, gridfunctions: &GridFunctions, coefficients: &Coefficients) -> Result<()> {
    const REQUESTER: &str = "ScaledVectorGridFunctionAux";
    let input = gridfunctions.require(&self.input_name, REQUESTER)?;
    let output = gridfunctions.require(&self.output_name, REQUESTER)?;
    let coef = coefficients.scalars.require(&self.coef_name, REQUESTER)?;
    let mass = {
      let (u, x) = (input.borrow(), output.borrow());
      if !u.family().is_vector() || !x.family().is_vector() || !u.space().shares_mesh(x.space()) {
        return Err(Error::UnsupportedElement(format!(
          "scaled projection from {} to {}",
          u.space().collection(),
          x.space().collection()
        )));
      }
      let unit: Rc<dyn ScalarCoefficient> = Rc::new(crate::coefficients::ConstantCoefficient::new(1.0));
      assemble::assemble_galmat(
        x.space(),
        x.space(),
        &VectorMassElmat::square(x.family(), unit),
      )
      .to_nalgebra_csr()?
    };
    self.state = Some(ScaledState {
      input,
      output,
      coef,
      mass,
    });
    Ok(())
  }

  fn solve(&mut self, _: f64) -> Result<()> {
    let state = self
      .state
      .as_ref()
      .ok_or_else(|| Error::Uninitialized("ScaledVectorGridFunctionAux".into()))?;
    let rhs = {
      let (u, x) = (state.input.borrow(), state.output.borrow());
      let mixed = assemble::assemble_galmat(
        x.space(),
        u.space(),
        &VectorMassElmat::new(x.family(), u.family(), Rc::clone(&state.coef)),
      );
      mixed.mul_vec(u.data()) * self.scale
    };
    let mut x = state.output.borrow().data().clone();
    solvers::solve_system(&state.mass, &rhs, &mut x, &self.options)?;
    state.output.borrow_mut().copy_from(&x)
  }
}
