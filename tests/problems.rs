extern crate nalgebra as na;

use magnetofem::{
  auxsolvers::AuxSolvers,
  boundary_conditions::{BcMap, BoundaryCondition, ScalarDirichletBc, VectorDirichletBc},
  coefficients::{Coefficients, ConstantCoefficient, VectorConstantCoefficient, VectorFunctionCoefficient},
  error::Error,
  executioners::{SteadyExecutioner, TransientExecutioner},
  formulations::{AvFormulation, Formulation, HCurlFormulation, MagnetostaticFormulation},
  kernels::{Kernel, VectorFeDomainLfKernel},
  linalg::solvers::{SolverKind, SolverOptions},
  mesh::{cuboid::CuboidMeshInfo, Mesh},
  ode::TimeDependentOperator,
  params::InputParameters,
  problem::{EquationSystemProblemBuilder, Problem, ProblemBuildSequencer, ProblemOperator},
  problem_operators::{OperatorState, ProblemData, TimeDomainEquationSystemOperator},
  registry::{new_fespaces, new_gridfunctions},
  sources::{DivFreeSource, Sources},
};

use approx::assert_relative_eq;
use std::rc::Rc;

fn init_logging() {
  let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn mesh() -> Rc<Mesh> {
  Rc::new(CuboidMeshInfo::unit(2).to_mesh().unwrap())
}

fn solver_options() -> SolverOptions {
  SolverOptions {
    tolerance: 1e-12,
    abs_tolerance: 1e-14,
    max_iter: 2000,
    print_level: 0,
    kind: SolverKind::Pcg,
  }
}

fn scalars(values: &[(&str, f64)]) -> Coefficients {
  let mut coefficients = Coefficients::new();
  for &(name, value) in values {
    coefficients
      .add_scalar(name, Rc::new(ConstantCoefficient::new(value)))
      .unwrap();
  }
  coefficients
}

/// $nabla times nabla times bold(u) + 2 dot(bold(u)) = bold(s)$ with uniform $bold(s)$ and
/// zero initial state, whose solution $bold(u) = t bold(s) / 2$ backward Euler reproduces exactly.
fn forced_hcurl_problem() -> Problem {
  let mut builder = EquationSystemProblemBuilder::new(mesh(), HCurlFormulation::new("alpha", "beta", "u"));
  let mut coefficients = scalars(&[("alpha", 1.0), ("beta", 2.0)]);
  coefficients
    .add_vector("s", Rc::new(VectorConstantCoefficient::new(na::Vector3::x())))
    .unwrap();
  builder.set_coefficients(coefficients).unwrap();
  let forcing = InputParameters::new().with("VectorCoefficientName", "s");
  builder
    .add_kernel("d(u)/dt", Kernel::linear(VectorFeDomainLfKernel::new(&forcing).unwrap()))
    .unwrap();
  builder.set_solver_options(solver_options()).unwrap();
  ProblemBuildSequencer::construct_equation_system_problem(builder).unwrap()
}

fn assert_uniform(problem: &Problem, name: &str, expected: na::Vector3<f64>) {
  let field = problem.gridfunctions().get(name).unwrap();
  let field = field.borrow();
  for c in 0..field.space().mesh().ncells() {
    assert_relative_eq!(field.eval_vector_at_centroid(c), expected, epsilon = 1e-8);
  }
}

fn solver_rebuilds(problem: &Problem) -> usize {
  match problem.operator() {
    ProblemOperator::TimeDomain(op) => op.solver_rebuilds(),
    ProblemOperator::Steady(_) => panic!("expected a time domain problem"),
  }
}

#[test]
fn backward_euler_reproduces_linear_growth() {
  init_logging();
  let mut problem = forced_hcurl_problem();
  assert!(problem.is_time_domain());
  let executioner = TransientExecutioner::new(
    &InputParameters::new()
      .with("TimeStep", 0.1)
      .with("EndTime", 0.3)
      .with("VisualisationSteps", 2usize),
  )
  .unwrap();
  executioner.execute(&mut problem).unwrap();

  assert_relative_eq!(problem.time(), 0.3, epsilon = 1e-12);
  assert_uniform(&problem, "u", na::Vector3::new(0.15, 0.0, 0.0));
  assert_uniform(&problem, "d(u)/dt", na::Vector3::new(0.5, 0.0, 0.0));
}

#[test]
fn solver_is_rebuilt_only_when_the_time_step_changes() {
  init_logging();
  let mut problem = forced_hcurl_problem();
  for _ in 0..3 {
    problem.step(0.1).unwrap();
  }
  assert_eq!(solver_rebuilds(&problem), 1);
  problem.step(0.05).unwrap();
  assert_eq!(solver_rebuilds(&problem), 2);
  assert_uniform(&problem, "u", na::Vector3::new(0.175, 0.0, 0.0));
}

#[test]
fn operator_rejects_solves_before_init() {
  init_logging();
  let formulation = HCurlFormulation::new("alpha", "beta", "u");
  let data = ProblemData {
    mesh: mesh(),
    fespaces: new_fespaces(),
    gridfunctions: new_gridfunctions(),
    bc_map: BcMap::new(),
    coefficients: scalars(&[("alpha", 1.0), ("beta", 1.0)]),
    sources: Sources::new(),
    aux_solvers: AuxSolvers::new(),
    solver_options: solver_options(),
  };
  let es = formulation.construct_equation_system().unwrap();
  let mut op = TimeDomainEquationSystemOperator::new(data, es);
  assert_eq!(op.state(), OperatorState::Uninitialized);
  let x = na::DVector::zeros(0);
  let mut k = na::DVector::zeros(0);
  assert!(matches!(
    op.implicit_solve(0.1, &x, &mut k),
    Err(Error::Uninitialized(_))
  ));
}

#[test]
fn missing_formulation_coefficient_aborts_construction() {
  init_logging();
  let mut builder = EquationSystemProblemBuilder::new(mesh(), HCurlFormulation::new("alpha", "beta", "u"));
  builder
    .set_coefficients(scalars(&[("alpha", 1.0)]))
    .unwrap();
  let err = ProblemBuildSequencer::construct_equation_system_problem(builder).err();
  assert!(matches!(
    err,
    Some(Error::Missing { ref name, ref requester, .. }) if name == "beta" && requester == "HCurlFormulation"
  ));
}

#[test]
fn av_system_is_symmetric_and_stays_at_rest() {
  init_logging();
  let mut builder = EquationSystemProblemBuilder::new(mesh(), AvFormulation::new("mu", "sigma", "a", "v"));
  builder
    .set_coefficients(scalars(&[("mu", 1.0), ("sigma", 1.0)]))
    .unwrap();
  builder
    .add_boundary_condition(
      "ground",
      BoundaryCondition::Essential(Box::new(ScalarDirichletBc::constant("v", vec![1], 0.0))),
    )
    .unwrap();
  builder.set_solver_options(solver_options()).unwrap();
  let mut problem = ProblemBuildSequencer::construct_equation_system_problem(builder).unwrap();
  problem.step(0.1).unwrap();

  for name in ["a", "v", "d(a)/dt"] {
    let field = problem.gridfunctions().get(name).unwrap();
    assert_eq!(field.borrow().data().amax(), 0.0, "{name}");
  }

  let system = problem
    .operator()
    .equation_system()
    .form_linear_system()
    .unwrap();
  let matrix = na::DMatrix::from(&system.matrix);
  assert_eq!(system.offsets.len(), 3);
  assert!((&matrix - matrix.transpose()).amax() < 1e-12);
  let (n_a, n_v) = (system.offsets[1], system.offsets[2] - system.offsets[1]);
  assert!(matrix.view((0, n_a), (n_a, n_v)).amax() > 0.0);
}

#[test]
fn magnetostatic_problem_with_divergence_free_source() {
  init_logging();
  let mesh = mesh();
  let mut builder = EquationSystemProblemBuilder::new(
    mesh,
    MagnetostaticFormulation::new("mu", "a").with_curl("b"),
  );
  builder.add_fe_space("HCurl", "ND_3D_P1").unwrap();
  builder.add_grid_function("J", "HCurl").unwrap();
  let mut coefficients = scalars(&[("mu", 1.0)]);
  coefficients
    .add_vector(
      "J0",
      Rc::new(VectorFunctionCoefficient::new(|x, _| {
        na::Vector3::new(0.5 - x[1], x[0] - 0.5, 0.0)
      })),
    )
    .unwrap();
  builder.set_coefficients(coefficients).unwrap();
  builder
    .add_boundary_condition(
      "tangential_a",
      BoundaryCondition::Essential(Box::new(VectorDirichletBc::new(
        "a",
        vec![1, 2, 3, 4, 5, 6],
        Rc::new(VectorConstantCoefficient::new(na::Vector3::zeros())),
      ))),
    )
    .unwrap();
  let source = InputParameters::new()
    .with("SourceName", "J")
    .with("SourceCoefName", "J0");
  builder
    .add_source("coil", DivFreeSource::new(&source).unwrap())
    .unwrap();
  builder.set_solver_options(solver_options()).unwrap();
  let mut problem = ProblemBuildSequencer::construct_equation_system_problem(builder).unwrap();
  assert!(!problem.is_time_domain());
  assert!(matches!(problem.step(0.1), Err(Error::Uninitialized(_))));

  SteadyExecutioner::new().execute(&mut problem).unwrap();
  let a = problem.gridfunctions().get("a").unwrap().borrow().data().clone();
  let b = problem.gridfunctions().get("b").unwrap().borrow().data().clone();
  assert!(a.amax() > 0.0);
  assert!(b.amax() > 0.0);

  SteadyExecutioner::new().execute(&mut problem).unwrap();
  let again = problem.gridfunctions().get("a").unwrap().borrow().data().clone();
  assert_relative_eq!(again, a, epsilon = 1e-12);
}
