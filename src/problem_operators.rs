//! Operators driving an equation system, in time or at steady state.

use crate::{
  auxsolvers::AuxSolvers,
  boundary_conditions::BcMap,
  coefficients::Coefficients,
  equation_system::{time_derivative_name, EquationSystem},
  error::{Error, Result},
  linalg::solvers::{self, LinearSolver, SolverOptions},
  mesh::Mesh,
  ode::TimeDependentOperator,
  registry::{Bindings, FeSpaces, GridFunctions},
  sources::Sources,
};

use std::rc::Rc;

/// Registries shared by the components of one problem.
pub struct ProblemData {
  pub mesh: Rc<Mesh>,
  pub fespaces: FeSpaces,
  pub gridfunctions: GridFunctions,
  pub bc_map: BcMap,
  pub coefficients: Coefficients,
  pub sources: Sources,
  pub aux_solvers: AuxSolvers,
  pub solver_options: SolverOptions,
}

impl ProblemData {
  pub fn bindings(&self) -> Bindings<'_> {
    Bindings {
      gridfunctions: &self.gridfunctions,
      fespaces: &self.fespaces,
      bc_map: &self.bc_map,
      coefficients: &self.coefficients,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorState {
  Uninitialized,
  Ready,
}

/// Relative change of the time step below which the cached solver is kept.
const DT_REBUILD_TOLERANCE: f64 = 1e-12;

/// Time dependent operator whose implicit solve is one equation system solve.
///
/// The state vector holds the integrated variables, block by block. Each
/// implicit solve yields their time derivatives; algebraic variables are
/// written straight into their fields.
pub struct TimeDomainEquationSystemOperator {
  data: ProblemData,
  equation_system: EquationSystem,
  state: OperatorState,
  time: f64,
  offsets: Vec<usize>,
  solver: Option<Box<dyn LinearSolver>>,
  solver_dt: f64,
  solver_rebuilds: usize,
}

impl TimeDomainEquationSystemOperator {
  pub fn new(data: ProblemData, equation_system: EquationSystem) -> Self {
    Self {
      data,
      equation_system,
      state: OperatorState::Uninitialized,
      time: 0.0,
      offsets: vec![0],
      solver: None,
      solver_dt: 0.0,
      solver_rebuilds: 0,
    }
  }

  pub fn data(&self) -> &ProblemData {
    &self.data
  }
  pub fn equation_system(&self) -> &EquationSystem {
    &self.equation_system
  }
  pub fn state(&self) -> OperatorState {
    self.state
  }
  /// Number of times the linear solver has been set up.
  pub fn solver_rebuilds(&self) -> usize {
    self.solver_rebuilds
  }
  /// Block offsets of the integrated variables in the state vector.
  pub fn offsets(&self) -> &[usize] {
    &self.offsets
  }

  /// Initialises the equation system and sizes the zero state vector `x`.
  pub fn init(&mut self, x: &mut na::DVector<f64>) -> Result<()> {
    let data = &mut self.data;
    self.equation_system.init(
      &data.gridfunctions,
      &data.fespaces,
      &data.bc_map,
      &mut data.coefficients,
    )?;

    self.offsets = vec![0];
    for name in self.equation_system.state_variable_names() {
      let field = self.data.gridfunctions.require(name, "TimeDomainEquationSystemOperator")?;
      let mut field = field.borrow_mut();
      field.fill(0.0);
      let ndofs = field.len();
      self.offsets.push(self.offsets.last().copied().unwrap_or(0) + ndofs);
    }
    for name in self.equation_system.test_variable_names() {
      let field = self.data.gridfunctions.require(name, "TimeDomainEquationSystemOperator")?;
      field.borrow_mut().fill(0.0);
    }
    *x = na::DVector::zeros(self.size());

    self.solver = None;
    self.state = OperatorState::Ready;
    tracing::debug!("time domain operator ready with state blocks {:?}", self.offsets);
    Ok(())
  }

  fn check_ready(&self) -> Result<()> {
    match self.state {
      OperatorState::Ready => Ok(()),
      OperatorState::Uninitialized => Err(Error::Uninitialized("TimeDomainEquationSystemOperator".into())),
    }
  }

  fn check_len(&self, context: &'static str, v: &na::DVector<f64>) -> Result<()> {
    if v.len() != self.size() {
      return Err(Error::DimensionMismatch {
        context,
        expected: self.size(),
        found: v.len(),
      });
    }
    Ok(())
  }

  /// Copies the blocks of `x` into the integrated variable fields.
  pub fn set_grid_functions(&self, x: &na::DVector<f64>) -> Result<()> {
    for (i, name) in self.equation_system.state_variable_names().into_iter().enumerate() {
      let field = self.data.gridfunctions.require(name, "TimeDomainEquationSystemOperator")?;
      field
        .borrow_mut()
        .copy_from_slice(&x.as_slice()[self.offsets[i]..self.offsets[i + 1]])?;
    }
    Ok(())
  }
}

impl TimeDependentOperator for TimeDomainEquationSystemOperator {
  fn size(&self) -> usize {
    self.offsets.last().copied().unwrap_or(0)
  }
  fn time(&self) -> f64 {
    self.time
  }
  fn set_time(&mut self, t: f64) {
    self.time = t;
  }

  fn implicit_solve(&mut self, dt: f64, x: &na::DVector<f64>, dxdt: &mut na::DVector<f64>) -> Result<()> {
    self.check_ready()?;
    self.check_len("implicit solve state", x)?;
    self.check_len("implicit solve derivative", dxdt)?;

    self.set_grid_functions(x)?;
    self.data.coefficients.set_time(self.time);
    self.equation_system.set_time_step(dt);
    self.equation_system.update(&self.data.bc_map, &self.data.sources)?;
    let system = self.equation_system.form_linear_system()?;

    let stale = (dt - self.solver_dt).abs() > DT_REBUILD_TOLERANCE * dt.abs();
    if self.solver.is_none() || stale {
      self.solver = Some(solvers::build_solver(&system.matrix, &self.data.solver_options)?);
      self.solver_dt = dt;
      self.solver_rebuilds += 1;
      tracing::debug!("set up linear solver for dt = {dt:e}");
    }
    let mut solution = system.x;
    if let Some(solver) = self.solver.as_mut() {
      let report = solver.solve(&system.matrix, &system.rhs, &mut solution)?;
      if self.data.solver_options.print_level > 0 {
        tracing::info!(
          "t = {:.6e}: linear solve took {} iterations, |r| = {:.3e}",
          self.time,
          report.iterations,
          report.residual
        );
      }
    }
    self
      .equation_system
      .recover_fem_solution(&solution, &self.data.gridfunctions)?;

    for (i, name) in self.equation_system.state_variable_names().into_iter().enumerate() {
      let derivative = self
        .data
        .gridfunctions
        .require(&time_derivative_name(name), "TimeDomainEquationSystemOperator")?;
      dxdt
        .rows_mut(self.offsets[i], self.offsets[i + 1] - self.offsets[i])
        .copy_from(derivative.borrow().data());
    }
    Ok(())
  }
}

/// Solves an equation system of non-differentiated variables once per call.
pub struct SteadyStateEquationSystemOperator {
  data: ProblemData,
  equation_system: EquationSystem,
  state: OperatorState,
}

impl SteadyStateEquationSystemOperator {
  pub fn new(data: ProblemData, equation_system: EquationSystem) -> Self {
    Self {
      data,
      equation_system,
      state: OperatorState::Uninitialized,
    }
  }

  pub fn data(&self) -> &ProblemData {
    &self.data
  }
  pub fn equation_system(&self) -> &EquationSystem {
    &self.equation_system
  }
  pub fn state(&self) -> OperatorState {
    self.state
  }

  pub fn init(&mut self) -> Result<()> {
    let data = &mut self.data;
    self.equation_system.init(
      &data.gridfunctions,
      &data.fespaces,
      &data.bc_map,
      &mut data.coefficients,
    )?;
    self.state = OperatorState::Ready;
    Ok(())
  }

  pub fn solve(&mut self, t: f64) -> Result<()> {
    if self.state != OperatorState::Ready {
      return Err(Error::Uninitialized("SteadyStateEquationSystemOperator".into()));
    }
    self.data.coefficients.set_time(t);
    self.equation_system.update(&self.data.bc_map, &self.data.sources)?;
    let system = self.equation_system.form_linear_system()?;
    let mut solution = system.x;
    let report = solvers::solve_system(&system.matrix, &system.rhs, &mut solution, &self.data.solver_options)?;
    if self.data.solver_options.print_level > 0 {
      tracing::info!(
        "steady solve took {} iterations, |r| = {:.3e}",
        report.iterations,
        report.residual
      );
    }
    self
      .equation_system
      .recover_fem_solution(&solution, &self.data.gridfunctions)
  }
}
