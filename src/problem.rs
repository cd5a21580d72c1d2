//! Staged construction of equation system problems.
//!
//! Construction follows a fixed order: spaces, fields, coefficients, aux
//! solvers, sources, equation system, operator, initial state, time stepper.
//! Each stage consumes what the previous ones registered, so the builder
//! rejects stages called out of order.

use crate::{
  auxsolvers::{AuxSolver, AuxSolvers},
  boundary_conditions::{BcMap, BoundaryCondition},
  coefficients::Coefficients,
  equation_system::EquationSystem,
  error::{Error, Result},
  fe::{gridfunction::GridFunction, FeSpace},
  formulations::Formulation,
  kernels::Kernel,
  linalg::solvers::SolverOptions,
  mesh::Mesh,
  ode::{BackwardEuler, OdeSolver},
  problem_operators::{ProblemData, SteadyStateEquationSystemOperator, TimeDomainEquationSystemOperator},
  registry::{new_fespaces, new_gridfunctions, GridFunctions},
  sources::{Source, Sources},
};

use std::{cell::RefCell, rc::Rc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildStage {
  Setup,
  FeSpaces,
  GridFunctions,
  Coefficients,
  AuxSolvers,
  Sources,
  EquationSystem,
  Operator,
  State,
  Timestepper,
}

impl BuildStage {
  pub fn previous(self) -> Option<Self> {
    use BuildStage::*;
    Some(match self {
      Setup => return None,
      FeSpaces => Setup,
      GridFunctions => FeSpaces,
      Coefficients => GridFunctions,
      AuxSolvers => Coefficients,
      Sources => AuxSolvers,
      EquationSystem => Sources,
      Operator => EquationSystem,
      State => Operator,
      Timestepper => State,
    })
  }
}

pub enum ProblemOperator {
  TimeDomain(TimeDomainEquationSystemOperator),
  Steady(SteadyStateEquationSystemOperator),
}

impl ProblemOperator {
  pub fn data(&self) -> &ProblemData {
    match self {
      Self::TimeDomain(op) => op.data(),
      Self::Steady(op) => op.data(),
    }
  }
  pub fn equation_system(&self) -> &EquationSystem {
    match self {
      Self::TimeDomain(op) => op.equation_system(),
      Self::Steady(op) => op.equation_system(),
    }
  }
}

/// Fully constructed problem, ready to be stepped or solved.
pub struct Problem {
  operator: ProblemOperator,
  ode_solver: Option<Box<dyn OdeSolver>>,
  x: na::DVector<f64>,
  t: f64,
}

impl Problem {
  pub fn operator(&self) -> &ProblemOperator {
    &self.operator
  }
  pub fn data(&self) -> &ProblemData {
    self.operator.data()
  }
  pub fn gridfunctions(&self) -> &GridFunctions {
    &self.data().gridfunctions
  }
  pub fn is_time_domain(&self) -> bool {
    matches!(self.operator, ProblemOperator::TimeDomain(_))
  }
  pub fn time(&self) -> f64 {
    self.t
  }
  pub fn set_time(&mut self, t: f64) {
    self.t = t;
  }
  /// Integrated variables, block by block.
  pub fn state(&self) -> &na::DVector<f64> {
    &self.x
  }

  /// Advances the integrated variables by `dt` and runs the aux solvers.
  pub fn step(&mut self, dt: f64) -> Result<()> {
    let ProblemOperator::TimeDomain(op) = &mut self.operator else {
      return Err(Error::Uninitialized("time stepper of a steady problem".into()));
    };
    let ode_solver = self
      .ode_solver
      .as_mut()
      .ok_or_else(|| Error::Uninitialized("time stepper".into()))?;
    ode_solver.step(op, &mut self.x, &mut self.t, dt)?;
    op.set_grid_functions(&self.x)?;
    op.data().aux_solvers.solve(self.t)
  }

  /// Solves a steady problem at the current time and runs the aux solvers.
  pub fn solve_steady(&mut self) -> Result<()> {
    let ProblemOperator::Steady(op) = &mut self.operator else {
      return Err(Error::Uninitialized("steady operator of a time domain problem".into()));
    };
    op.solve(self.t)?;
    op.data().aux_solvers.solve(self.t)
  }
}

pub trait ProblemBuilder {
  fn stage(&self) -> BuildStage;

  fn register_fe_spaces(&mut self) -> Result<()>;
  fn register_grid_functions(&mut self) -> Result<()>;
  fn register_coefficients(&mut self) -> Result<()>;
  fn register_aux_solvers(&mut self) -> Result<()>;
  fn init_sources(&mut self) -> Result<()>;
  fn construct_equation_system(&mut self) -> Result<()>;
  fn construct_operator(&mut self) -> Result<()>;
  fn construct_state(&mut self) -> Result<()>;
  fn construct_timestepper(&mut self) -> Result<()>;

  fn return_problem(self) -> Result<Problem>
  where
    Self: Sized;
}

/// Drives a builder through every stage in order.
pub struct ProblemBuildSequencer;

impl ProblemBuildSequencer {
  pub fn construct_equation_system_problem<B: ProblemBuilder>(mut builder: B) -> Result<Problem> {
    builder.register_fe_spaces()?;
    builder.register_grid_functions()?;
    builder.register_coefficients()?;
    builder.register_aux_solvers()?;
    builder.init_sources()?;
    builder.construct_equation_system()?;
    builder.construct_operator()?;
    builder.construct_state()?;
    builder.construct_timestepper()?;
    builder.return_problem()
  }
}

/// Builds a problem from user supplied components and a formulation that
/// fills in everything missing.
pub struct EquationSystemProblemBuilder<F: Formulation> {
  formulation: F,
  stage: BuildStage,
  data: Option<ProblemData>,
  kernels: Vec<(String, Kernel)>,
  equation_system: Option<EquationSystem>,
  operator: Option<ProblemOperator>,
  x: na::DVector<f64>,
  ode_solver: Option<Box<dyn OdeSolver>>,
}

fn staged<T>(slot: &mut Option<T>, what: &str) -> Result<T> {
  slot
    .take()
    .ok_or_else(|| Error::BuildOrder(format!("{what} is not available")))
}

fn live(data: &mut Option<ProblemData>) -> Result<&mut ProblemData> {
  data
    .as_mut()
    .ok_or_else(|| Error::BuildOrder("problem data already moved into the operator".into()))
}

impl<F: Formulation> EquationSystemProblemBuilder<F> {
  pub fn new(mesh: Rc<Mesh>, formulation: F) -> Self {
    let data = ProblemData {
      mesh,
      fespaces: new_fespaces(),
      gridfunctions: new_gridfunctions(),
      bc_map: BcMap::new(),
      coefficients: Coefficients::new(),
      sources: Sources::new(),
      aux_solvers: AuxSolvers::new(),
      solver_options: SolverOptions::default(),
    };
    Self {
      formulation,
      stage: BuildStage::Setup,
      data: Some(data),
      kernels: Vec::new(),
      equation_system: None,
      operator: None,
      x: na::DVector::zeros(0),
      ode_solver: None,
    }
  }

  pub fn formulation(&self) -> &F {
    &self.formulation
  }

  fn advance(&mut self, stage: BuildStage) -> Result<()> {
    if stage.previous() != Some(self.stage) {
      return Err(Error::BuildOrder(format!(
        "cannot enter stage {stage:?} from stage {:?}",
        self.stage
      )));
    }
    tracing::debug!("problem builder stage {stage:?}");
    self.stage = stage;
    Ok(())
  }

  fn setup_data(&mut self) -> Result<&mut ProblemData> {
    if self.stage != BuildStage::Setup {
      return Err(Error::BuildOrder(format!(
        "problem components can only be added during setup, not at stage {:?}",
        self.stage
      )));
    }
    live(&mut self.data)
  }

  pub fn add_fe_space(&mut self, name: &str, collection: &str) -> Result<()> {
    let data = self.setup_data()?;
    let space = FeSpace::from_name(Rc::clone(&data.mesh), collection)?;
    data.fespaces.register_owned(name, space)?;
    Ok(())
  }

  pub fn add_grid_function(&mut self, name: &str, fespace: &str) -> Result<()> {
    let data = self.setup_data()?;
    let space = data.fespaces.require(fespace, "EquationSystemProblemBuilder")?;
    data
      .gridfunctions
      .register_owned(name, RefCell::new(GridFunction::new(space)))?;
    Ok(())
  }

  pub fn set_coefficients(&mut self, coefficients: Coefficients) -> Result<()> {
    self.setup_data()?.coefficients = coefficients;
    Ok(())
  }

  pub fn add_boundary_condition(&mut self, name: &str, bc: BoundaryCondition) -> Result<()> {
    self.setup_data()?.bc_map.add(name, bc)
  }

  pub fn add_source(&mut self, name: &str, source: impl Source + 'static) -> Result<()> {
    self.setup_data()?.sources.add(name, source)
  }

  pub fn add_aux_solver(&mut self, name: &str, aux: impl AuxSolver + 'static) -> Result<()> {
    self.setup_data()?.aux_solvers.add(name, aux)
  }

  /// Extra kernel added to the formulation's equation system.
  pub fn add_kernel(&mut self, test_variable: &str, kernel: Kernel) -> Result<()> {
    self.setup_data()?;
    self.kernels.push((test_variable.to_string(), kernel));
    Ok(())
  }

  pub fn set_solver_options(&mut self, options: SolverOptions) -> Result<()> {
    self.setup_data()?.solver_options = options;
    Ok(())
  }
}

impl<F: Formulation> ProblemBuilder for EquationSystemProblemBuilder<F> {
  fn stage(&self) -> BuildStage {
    self.stage
  }

  fn register_fe_spaces(&mut self) -> Result<()> {
    self.advance(BuildStage::FeSpaces)?;
    let Self { formulation, data, .. } = self;
    let data = live(data)?;
    formulation.register_fe_spaces(&data.mesh, &mut data.fespaces)
  }

  fn register_grid_functions(&mut self) -> Result<()> {
    self.advance(BuildStage::GridFunctions)?;
    let Self { formulation, data, .. } = self;
    let data = live(data)?;
    formulation.register_grid_functions(&data.fespaces, &mut data.gridfunctions)
  }

  fn register_coefficients(&mut self) -> Result<()> {
    self.advance(BuildStage::Coefficients)?;
    let Self { formulation, data, .. } = self;
    let data = live(data)?;
    formulation.register_coefficients(&mut data.coefficients)
  }

  fn register_aux_solvers(&mut self) -> Result<()> {
    self.advance(BuildStage::AuxSolvers)?;
    let Self { formulation, data, .. } = self;
    let data = live(data)?;
    formulation.register_aux_solvers(&mut data.aux_solvers)?;
    data.aux_solvers.init(&data.gridfunctions, &data.coefficients)
  }

  fn init_sources(&mut self) -> Result<()> {
    self.advance(BuildStage::Sources)?;
    let data = live(&mut self.data)?;
    data.sources.init(&data.bindings())
  }

  fn construct_equation_system(&mut self) -> Result<()> {
    self.advance(BuildStage::EquationSystem)?;
    let mut es = self.formulation.construct_equation_system()?;
    for (test_variable, kernel) in self.kernels.drain(..) {
      es.add_kernel(&test_variable, kernel)?;
    }
    self.equation_system = Some(es);
    Ok(())
  }

  fn construct_operator(&mut self) -> Result<()> {
    self.advance(BuildStage::Operator)?;
    let data = staged(&mut self.data, "problem data")?;
    let es = staged(&mut self.equation_system, "equation system")?;
    self.operator = Some(if self.formulation.is_time_domain() {
      ProblemOperator::TimeDomain(TimeDomainEquationSystemOperator::new(data, es))
    } else {
      ProblemOperator::Steady(SteadyStateEquationSystemOperator::new(data, es))
    });
    Ok(())
  }

  fn construct_state(&mut self) -> Result<()> {
    self.advance(BuildStage::State)?;
    match self.operator.as_mut() {
      Some(ProblemOperator::TimeDomain(op)) => op.init(&mut self.x),
      Some(ProblemOperator::Steady(op)) => op.init(),
      None => Err(Error::BuildOrder("operator is not available".into())),
    }
  }

  fn construct_timestepper(&mut self) -> Result<()> {
    self.advance(BuildStage::Timestepper)?;
    if self.formulation.is_time_domain() {
      self.ode_solver = Some(Box::new(BackwardEuler::new()));
    }
    Ok(())
  }

  fn return_problem(mut self) -> Result<Problem> {
    if self.stage != BuildStage::Timestepper {
      return Err(Error::BuildOrder(format!(
        "problem requested at stage {:?}",
        self.stage
      )));
    }
    Ok(Problem {
      operator: staged(&mut self.operator, "operator")?,
      ode_solver: self.ode_solver,
      x: self.x,
      t: 0.0,
    })
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{formulations::HCurlFormulation, mesh::cuboid::CuboidMeshInfo};

  fn builder() -> EquationSystemProblemBuilder<HCurlFormulation> {
    let mesh = Rc::new(CuboidMeshInfo::unit(1).to_mesh().unwrap());
    EquationSystemProblemBuilder::new(mesh, HCurlFormulation::new("alpha", "beta", "u"))
  }

  #[test]
  fn stages_must_follow_in_order() {
    let mut builder = builder();
    assert!(matches!(builder.register_grid_functions(), Err(Error::BuildOrder(_))));
    assert_eq!(builder.stage(), BuildStage::Setup);
    builder.register_fe_spaces().unwrap();
    assert!(matches!(builder.register_fe_spaces(), Err(Error::BuildOrder(_))));
    assert!(matches!(
      builder.add_fe_space("late", "H1_3D_P1"),
      Err(Error::BuildOrder(_))
    ));
  }

  #[test]
  fn unfinished_builder_yields_no_problem() {
    let mut builder = builder();
    builder.register_fe_spaces().unwrap();
    assert!(matches!(builder.return_problem(), Err(Error::BuildOrder(_))));
  }
}
