use super::{auxiliary_solver_options, hcurl_mass, solve_constrained, Source};
use crate::{
  assemble::{self, discrete_gradient, GalVec},
  boundary_conditions::BcMap,
  coefficients::ScalarCoefficient,
  error::{Error, Result},
  fe::{gridfunction::GridFunction, FeFamily, FeSpace},
  forms::LinearForm,
  linalg::{solvers::SolverOptions, spmv, SparseMatrix},
  operators::DiffusionElmat,
  params::InputParameters,
  registry::Bindings,
};

use std::{cell::RefCell, rc::Rc};

/// Solves $(sigma nabla V, nabla V') = 0$ subject to the essential conditions of
/// the potential and evaluates $-nabla V$ in H(curl) through the discrete gradient.
pub struct PotentialSolver {
  h1: Rc<FeSpace>,
  hcurl: Rc<FeSpace>,
  stiffness: SparseMatrix,
  gradient: SparseMatrix,
  options: SolverOptions,
}

impl PotentialSolver {
  pub fn new(
    h1: Rc<FeSpace>,
    hcurl: Rc<FeSpace>,
    conductivity: Rc<dyn ScalarCoefficient>,
    options: SolverOptions,
  ) -> Result<Self> {
    if h1.family() != FeFamily::H1 || hcurl.family() != FeFamily::HCurl {
      return Err(Error::UnsupportedElement(format!(
        "potential solve on {} and {}",
        h1.collection(),
        hcurl.collection()
      )));
    }
    if !h1.shares_mesh(&hcurl) {
      return Err(Error::Mesh("potential and field spaces live on different meshes".into()));
    }
    let stiffness = assemble::assemble_galmat(&h1, &h1, &DiffusionElmat::new(conductivity));
    let gradient = discrete_gradient(&h1, &hcurl);
    Ok(Self {
      h1,
      hcurl,
      stiffness,
      gradient,
      options,
    })
  }

  pub fn h1_space(&self) -> &Rc<FeSpace> {
    &self.h1
  }
  pub fn hcurl_space(&self) -> &Rc<FeSpace> {
    &self.hcurl
  }
  pub fn gradient(&self) -> &SparseMatrix {
    &self.gradient
  }

  /// Writes the potential into `potential` and $-nabla V$ into `field`.
  pub fn solve(
    &self,
    bc_map: &BcMap,
    potential_name: &str,
    potential: &mut GridFunction,
    field: &mut GridFunction,
  ) -> Result<()> {
    let mut prescribed = GridFunction::new(Rc::clone(&self.h1));
    let mut dofs = Vec::new();
    bc_map.apply_essential_bcs(potential_name, &mut dofs, &mut prescribed)?;
    if dofs.is_empty() {
      return Err(Error::degenerate(
        format!("potential `{potential_name}`"),
        "no essential boundary conditions fix the potential",
      ));
    }
    let dof_coeffs = assemble::dedup_dof_coeffs(
      dofs.into_iter().map(|d| (d, prescribed.data()[d])).collect(),
    );

    let rhs = GalVec::zeros(self.h1.ndofs());
    let v = solve_constrained(self.stiffness.clone(), rhs, &dof_coeffs, &self.options)?;
    potential.copy_from(&v)?;
    field.copy_from(&-self.gradient.mul_vec(&v))?;
    Ok(())
  }
}

/// Current $-sigma nabla V$ of an electric potential driven by the boundary
/// conditions registered for the potential variable.
///
/// The named source field holds $-nabla V$, the conductivity enters through
/// the weighted mass matrix of its dual.
pub struct ScalarPotentialSource {
  source_name: String,
  potential_name: String,
  hcurl_space_name: String,
  h1_space_name: String,
  conductivity_name: String,
  options: SolverOptions,
  state: Option<ScalarPotentialState>,
}

struct ScalarPotentialState {
  solver: PotentialSolver,
  bc_map: BcMap,
  source: Rc<RefCell<GridFunction>>,
  potential: Rc<RefCell<GridFunction>>,
  mass: nas::CsrMatrix<f64>,
}

impl ScalarPotentialSource {
  /// Reads `SourceName`, `PotentialName`, `HCurlFESpaceName`, `H1FESpaceName`,
  /// `ConductivityCoefName` and the optional `SolverOptions`.
  pub fn new(params: &InputParameters) -> Result<Self> {
    Ok(Self {
      source_name: params.get_str("SourceName")?.to_string(),
      potential_name: params.get_str("PotentialName")?.to_string(),
      hcurl_space_name: params.get_str("HCurlFESpaceName")?.to_string(),
      h1_space_name: params.get_str("H1FESpaceName")?.to_string(),
      conductivity_name: params.get_str("ConductivityCoefName")?.to_string(),
      options: auxiliary_solver_options(params)?,
      state: None,
    })
  }

  fn state(&self) -> Result<&ScalarPotentialState> {
    self
      .state
      .as_ref()
      .ok_or_else(|| Error::Uninitialized("ScalarPotentialSource".into()))
  }

  fn solve(&self) -> Result<()> {
    let state = self.state()?;
    state.solver.solve(
      &state.bc_map,
      &self.potential_name,
      &mut state.potential.borrow_mut(),
      &mut state.source.borrow_mut(),
    )
  }
}

impl Source for ScalarPotentialSource {
  fn init(&mut self, bindings: &Bindings) -> Result<()> {
    const REQUESTER: &str = "ScalarPotentialSource";
    let hcurl = bindings.fespaces.require(&self.hcurl_space_name, REQUESTER)?;
    let h1 = bindings.fespaces.require(&self.h1_space_name, REQUESTER)?;
    let conductivity = bindings
      .coefficients
      .scalars
      .require(&self.conductivity_name, REQUESTER)?;
    let source = bindings.gridfunctions.require(&self.source_name, REQUESTER)?;
    let potential = bindings.gridfunctions.require(&self.potential_name, REQUESTER)?;

    let mass = hcurl_mass(&hcurl, Rc::clone(&conductivity)).to_nalgebra_csr()?;
    let solver = PotentialSolver::new(h1, hcurl, conductivity, self.options.clone())?;
    self.state = Some(ScalarPotentialState {
      solver,
      bc_map: bindings.bc_map.clone(),
      source,
      potential,
      mass,
    });
    self.solve()
  }

  /// Re-solves with the current boundary data and adds $(sigma bold(E), bold(v)')$.
  fn apply(&self, lf: &mut LinearForm) -> Result<()> {
    self.solve()?;
    let state = self.state()?;
    let dual = spmv(&state.mass, state.source.borrow().data());
    lf.add(1.0, &dual)
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    boundary_conditions::ScalarDirichletBc,
    coefficients::{Coefficients, ConstantCoefficient},
    mesh::cuboid::CuboidMeshInfo,
    registry::{new_fespaces, new_gridfunctions},
  };
  use approx::assert_relative_eq;

  #[test]
  fn linear_potential_gives_uniform_field() {
    let mesh = Rc::new(CuboidMeshInfo::unit(2).to_mesh().unwrap());
    let mut fespaces = new_fespaces();
    let h1 = fespaces
      .register_owned("H1", FeSpace::from_name(mesh.clone(), "H1_3D_P1").unwrap())
      .unwrap();
    let hcurl = fespaces
      .register_owned("HCurl", FeSpace::from_name(mesh, "ND_3D_P1").unwrap())
      .unwrap();
    let mut gridfunctions = new_gridfunctions();
    let source = gridfunctions
      .register_owned("E", RefCell::new(GridFunction::new(hcurl.clone())))
      .unwrap();
    gridfunctions
      .register_owned("V", RefCell::new(GridFunction::new(h1)))
      .unwrap();
    let mut bc_map = BcMap::new();
    bc_map.add_essential("high", ScalarDirichletBc::constant("V", vec![1], 2.0)).unwrap();
    bc_map.add_essential("low", ScalarDirichletBc::constant("V", vec![2], 0.0)).unwrap();
    let mut coefficients = Coefficients::new();
    coefficients
      .add_scalar("sigma", Rc::new(ConstantCoefficient::new(3.0)))
      .unwrap();

    let params = InputParameters::new()
      .with("SourceName", "E")
      .with("PotentialName", "V")
      .with("HCurlFESpaceName", "HCurl")
      .with("H1FESpaceName", "H1")
      .with("ConductivityCoefName", "sigma");
    let mut sps = ScalarPotentialSource::new(&params).unwrap();
    let mut lf = LinearForm::new(hcurl.clone());
    assert!(matches!(sps.apply(&mut lf), Err(Error::Uninitialized(_))));

    let bindings = Bindings {
      gridfunctions: &gridfunctions,
      fespaces: &fespaces,
      bc_map: &bc_map,
      coefficients: &coefficients,
    };
    sps.init(&bindings).unwrap();
    for c in 0..hcurl.mesh().ncells() {
      let e = source.borrow().eval_vector_at_centroid(c);
      assert_relative_eq!(e, na::Vector3::new(2.0, 0.0, 0.0), epsilon = 1e-8);
    }

    sps.apply(&mut lf).unwrap();
    // $(sigma bold(E), bold(1)_x)$ over the unit cube
    let mut uniform = GridFunction::new(hcurl);
    uniform.project_vector(&crate::coefficients::VectorConstantCoefficient::new(na::Vector3::x()));
    assert_relative_eq!(lf.assemble().dot(uniform.data()), 6.0, epsilon = 1e-8);
  }
}
