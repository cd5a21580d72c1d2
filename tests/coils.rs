extern crate nalgebra as na;

use magnetofem::{
  boundary_conditions::BcMap,
  coefficients::{Coefficients, ConstantCoefficient},
  error::Error,
  fe::{gridfunction::GridFunction, FeFamily, FeSpace},
  forms::LinearForm,
  geometry::Point,
  linalg::solvers::{SolverKind, SolverOptions},
  mesh::{cuboid::CuboidMeshInfo, Attribute, BoundaryElement, Mesh},
  params::InputParameters,
  registry::{new_fespaces, new_gridfunctions, Bindings, FeSpaces, GridFunctions},
  sources::{ClosedCoilSource, HelmholtzProjector, OpenCoilSource, Source},
};

use approx::assert_relative_eq;
use std::{cell::RefCell, rc::Rc};

struct Problem {
  mesh: Rc<Mesh>,
  hcurl: Rc<FeSpace>,
  fespaces: FeSpaces,
  gridfunctions: GridFunctions,
  bc_map: BcMap,
  coefficients: Coefficients,
}

impl Problem {
  fn new(mesh: Mesh, current: f64) -> Self {
    let mesh = Rc::new(mesh);
    let hcurl = Rc::new(FeSpace::from_name(Rc::clone(&mesh), "ND_3D_P1").unwrap());
    let mut gridfunctions = new_gridfunctions();
    gridfunctions
      .register_owned("J", RefCell::new(GridFunction::new(hcurl.clone())))
      .unwrap();
    let mut coefficients = Coefficients::new();
    coefficients
      .add_scalar("I", Rc::new(ConstantCoefficient::new(current)))
      .unwrap();
    Self {
      mesh,
      hcurl,
      fespaces: new_fespaces(),
      gridfunctions,
      bc_map: BcMap::new(),
      coefficients,
    }
  }

  fn bindings(&self) -> Bindings<'_> {
    Bindings {
      gridfunctions: &self.gridfunctions,
      fespaces: &self.fespaces,
      bc_map: &self.bc_map,
      coefficients: &self.coefficients,
    }
  }

  fn source(&self) -> na::DVector<f64> {
    self.gridfunctions.get("J").unwrap().borrow().data().clone()
  }
}

fn init_logging() {
  let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn coil_params() -> InputParameters {
  InputParameters::new()
    .with("SourceName", "J")
    .with("IFuncCoefName", "I")
}

fn projector_options() -> SolverOptions {
  SolverOptions {
    tolerance: 1e-14,
    abs_tolerance: 1e-20,
    max_iter: 2000,
    print_level: 0,
    kind: SolverKind::Pcg,
  }
}

/// Largest weak divergence of `field` over vertices not on the given boundary attributes.
fn max_weak_divergence(field: &GridFunction, electrodes: &[Attribute]) -> f64 {
  let projector = HelmholtzProjector::new(Rc::clone(field.space()), projector_options()).unwrap();
  let divergence = projector.weak_divergence(field);
  let excluded = field.space().mesh().boundary_vertices(electrodes);
  (0..divergence.len())
    .filter(|v| !excluded.contains(v))
    .map(|v| divergence[v].abs())
    .fold(0.0, f64::max)
}

#[test]
fn open_coil_in_a_bar_carries_uniform_unit_current() {
  init_logging();
  let info = CuboidMeshInfo::new(Point::zeros(), Point::new(1.0, 0.5, 0.5), [2, 1, 1]);
  let problem = Problem::new(info.to_mesh().unwrap(), 2.0);
  let mut coil = OpenCoilSource::new(&coil_params(), vec![1], (1, 2)).unwrap();
  coil.init(&problem.bindings()).unwrap();

  assert_relative_eq!(coil.raw_flux().unwrap().abs(), 0.25, epsilon = 1e-10);
  let unit = coil.unit_source().unwrap();
  for c in 0..unit.space().mesh().ncells() {
    assert_relative_eq!(
      unit.eval_vector_at_centroid(c),
      na::Vector3::new(4.0, 0.0, 0.0),
      epsilon = 1e-8
    );
  }
  assert_relative_eq!(
    unit.boundary_flux(&[coil.ref_face()]).abs(),
    1.0,
    epsilon = 1e-10
  );

  let mut first_lf = LinearForm::new(problem.hcurl.clone());
  coil.apply(&mut first_lf).unwrap();
  let first = problem.source();
  let mut second_lf = LinearForm::new(problem.hcurl.clone());
  coil.apply(&mut second_lf).unwrap();
  assert_relative_eq!(problem.source(), first, epsilon = 1e-14);
  let rhs = first_lf.assemble();
  assert!(rhs.amax() > 0.0);
  assert_relative_eq!(second_lf.assemble(), rhs, epsilon = 1e-14);

  let j = problem.gridfunctions.get("J").unwrap();
  let j = j.borrow();
  for c in 0..problem.mesh.ncells() {
    assert_relative_eq!(
      j.eval_vector_at_centroid(c),
      na::Vector3::new(8.0, 0.0, 0.0),
      epsilon = 1e-8
    );
  }
  assert!(max_weak_divergence(&j, &[1, 2]) < 1e-8);
}

#[test]
fn bar_flux_matches_conductance() {
  init_logging();
  let info = CuboidMeshInfo::new(Point::zeros(), Point::new(2.0, 1.0, 1.0), [2, 1, 1]);
  let problem = Problem::new(info.to_mesh().unwrap(), 1.0);
  let mut coil = OpenCoilSource::new(&coil_params(), vec![1], (1, 2)).unwrap();
  coil.init(&problem.bindings()).unwrap();
  // $sigma A Delta V / L$ with unit conductivity
  assert_relative_eq!(coil.raw_flux().unwrap().abs(), 0.5, epsilon = 1e-10);
}

#[test]
fn current_scales_the_source_linearly() {
  init_logging();
  let fields = |current: f64| {
    let problem = Problem::new(CuboidMeshInfo::unit(2).to_mesh().unwrap(), current);
    let mut coil = OpenCoilSource::new(&coil_params(), vec![1], (5, 6)).unwrap();
    coil.init(&problem.bindings()).unwrap();
    let mut lf = LinearForm::new(problem.hcurl.clone());
    coil.apply(&mut lf).unwrap();
    (problem.source(), lf.assemble())
  };
  let (j1, lf1) = fields(1.0);
  let (j3, lf3) = fields(-3.0);
  assert_relative_eq!(j3, j1 * -3.0, epsilon = 1e-10);
  assert_relative_eq!(lf3, lf1 * -3.0, epsilon = 1e-10);
}

#[test]
fn missing_electrode_is_degenerate() {
  init_logging();
  let problem = Problem::new(CuboidMeshInfo::unit(1).to_mesh().unwrap(), 1.0);
  let mut coil = OpenCoilSource::new(&coil_params(), vec![1], (42, 2)).unwrap();
  assert!(matches!(
    coil.init(&problem.bindings()),
    Err(Error::Degenerate { .. })
  ));
}

const COIL: Attribute = 1;
const AIR: Attribute = 2;
const ELECTRODE: Attribute = 7;

/// Square ring coil around an air core, cut by an internal electrode at $y = 1.5$, $x <= 1$.
fn ring_mesh() -> Mesh {
  let info = CuboidMeshInfo::new(Point::zeros(), Point::new(3.0, 3.0, 0.5), [6, 6, 1]);
  let mesh = info
    .to_mesh_with_attributes(|[i, j, _]| {
      if (2..=3).contains(&i) && (2..=3).contains(&j) {
        AIR
      } else {
        COIL
      }
    })
    .unwrap();
  for f in 0..mesh.nfaces() {
    let x = mesh.face_coords(f);
    let on_cut = x.iter().all(|p| (p[1] - 1.5).abs() < 1e-12 && p[0] <= 1.0 + 1e-12);
    if !on_cut {
      continue;
    }
    let below = mesh
      .face_cells(f)
      .iter()
      .copied()
      .find(|&c| mesh.cell_geometry(c).centroid()[1] < 1.5)
      .unwrap();
    mesh
      .add_boundary_element(BoundaryElement {
        vertices: mesh.face_oriented_outward(f, below),
        attribute: ELECTRODE,
      })
      .unwrap();
  }
  mesh
}

#[test]
fn closed_coil_restores_attributes_and_keeps_the_cut() {
  init_logging();
  let problem = Problem::new(ring_mesh(), 3.0);
  let attributes = problem.mesh.cell_attributes();
  let nboundary = problem.mesh.nboundary_elements();
  assert_eq!(problem.mesh.max_boundary_attribute(), ELECTRODE);

  let mut coil = ClosedCoilSource::new(&coil_params(), vec![COIL], ELECTRODE).unwrap();
  coil.init(&problem.bindings()).unwrap();

  assert_eq!(problem.mesh.cell_attributes(), attributes);
  let wedge = coil.wedge().unwrap();
  assert_eq!(wedge.electrode_attribute, ELECTRODE + 1);
  assert_eq!(wedge.domain_attribute, AIR + 1);
  assert!(!wedge.cells.is_empty());
  assert!(wedge.cells.iter().all(|&c| attributes[c] == COIL));
  assert_eq!(
    problem.mesh.nboundary_elements(),
    nboundary + wedge.faces.len()
  );
  assert_eq!(
    problem.mesh.boundary_faces(&[ELECTRODE + 1]).len(),
    wedge.faces.len()
  );
}

#[test]
fn closed_coil_halves_carry_unit_divergence_free_current() {
  init_logging();
  let problem = Problem::new(ring_mesh(), 3.0);
  let mut coil = ClosedCoilSource::new(&coil_params(), vec![COIL], ELECTRODE).unwrap();
  coil.init(&problem.bindings()).unwrap();
  let electrodes = [ELECTRODE, ELECTRODE + 1];

  for open in coil.open_coils().unwrap() {
    assert_eq!(open.ref_face(), ELECTRODE);
    let unit = open.unit_source().unwrap();
    assert_relative_eq!(unit.boundary_flux(&[ELECTRODE]).abs(), 1.0, epsilon = 1e-8);
    assert!(max_weak_divergence(unit, &electrodes) < 1e-8);
  }

  let mut first_lf = LinearForm::new(problem.hcurl.clone());
  coil.apply(&mut first_lf).unwrap();
  let first = problem.source();
  assert!(first.amax() > 0.0);
  let mut second_lf = LinearForm::new(problem.hcurl.clone());
  coil.apply(&mut second_lf).unwrap();
  assert_relative_eq!(problem.source(), first, epsilon = 1e-14);
  let rhs = first_lf.assemble();
  assert!(rhs.amax() > 0.0);
  assert_relative_eq!(second_lf.assemble(), rhs, epsilon = 1e-14);
}

#[test]
fn closed_coil_loop_is_divergence_free_across_its_electrodes() {
  init_logging();
  let problem = Problem::new(ring_mesh(), 3.0);
  let mut coil = ClosedCoilSource::new(&coil_params(), vec![COIL], ELECTRODE).unwrap();
  coil.init(&problem.bindings()).unwrap();

  let unit = coil.unit_source().unwrap();
  assert_relative_eq!(unit.boundary_flux(&[ELECTRODE]).abs(), 1.0, epsilon = 1e-10);
  // every coil vertex, the electrode vertices included
  assert!(max_weak_divergence(unit, &[]) < 1e-8);

  let mut lf = LinearForm::new(problem.hcurl.clone());
  coil.apply(&mut lf).unwrap();
  let source = problem.source();
  let submesh = coil.submesh().unwrap();
  let ncoil = problem
    .mesh
    .cell_attributes()
    .iter()
    .filter(|&&a| a == COIL)
    .count();
  assert_eq!(submesh.mesh().ncells(), ncoil);
  for (ichild, &iparent) in submesh.parent_dofs(FeFamily::HCurl).iter().enumerate() {
    assert_relative_eq!(source[iparent], 3.0 * unit.data()[ichild], epsilon = 1e-12);
  }
  let mut restricted = GridFunction::new(Rc::clone(unit.space()));
  for (ichild, &iparent) in submesh.parent_dofs(FeFamily::HCurl).iter().enumerate() {
    restricted.set(ichild, source[iparent]);
  }
  assert!(max_weak_divergence(&restricted, &[]) < 3e-8);
}

#[test]
fn closed_coil_init_runs_once() {
  init_logging();
  let problem = Problem::new(ring_mesh(), 1.0);
  let mut coil = ClosedCoilSource::new(&coil_params(), vec![COIL], ELECTRODE).unwrap();
  coil.init(&problem.bindings()).unwrap();
  let nboundary = problem.mesh.nboundary_elements();
  let unit = coil.unit_source().unwrap().data().clone();

  coil.init(&problem.bindings()).unwrap();
  assert_eq!(problem.mesh.nboundary_elements(), nboundary);
  assert_eq!(problem.mesh.max_boundary_attribute(), ELECTRODE + 1);
  assert_eq!(coil.unit_source().unwrap().data(), &unit);
}

#[test]
fn closed_coil_without_electrode_faces_fails() {
  init_logging();
  let problem = Problem::new(ring_mesh(), 1.0);
  let mut coil = ClosedCoilSource::new(&coil_params(), vec![COIL], 42).unwrap();
  assert!(matches!(coil.init(&problem.bindings()), Err(Error::Mesh(_))));
  assert_eq!(problem.mesh.max_attribute(), AIR);
}
