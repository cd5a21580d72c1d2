//! Coupled block systems assembled from per-variable kernel lists.
//!
//! Each unknown owns an ordered list of kernels. Per solve the system
//! rebuilds, for every unknown, a bilinear form (diagonal block), mixed
//! forms (off diagonal blocks) and a linear form (right hand side), and
//! eliminates essential dofs symmetrically from the block matrix.

use crate::{
  assemble::{self, fix_dofs_coeff},
  boundary_conditions::BcMap,
  coefficients::{Coefficients, ConstantCoefficient, ProductCoefficient},
  error::{Error, Result},
  fe::{gridfunction::GridFunction, DofIdx, FeFamily, FeSpace},
  forms::{BilinearForm, LinearForm, MixedBilinearForm},
  kernels::Kernel,
  linalg::SparseMatrix,
  registry::{Bindings, FeSpaces, GridFunctions, Ownership},
  sources::Sources,
};

use indexmap::IndexMap;
use std::rc::Rc;

/// Name of the field holding the time derivative of `name`.
pub fn time_derivative_name(name: &str) -> String {
  format!("d({name})/dt")
}

/// Name of the coefficient $"dt" dot c$ derived from coefficient `name`.
pub fn dt_scaled_name(name: &str) -> String {
  format!("dt_{name}")
}

#[derive(Debug, Clone)]
struct Variable {
  /// Name of the field solved for.
  test: String,
  /// Name of the integrated field, for time derivative unknowns.
  state: Option<String>,
}

impl Variable {
  /// Boundary conditions are registered against the state variable.
  fn bc_name(&self) -> &str {
    self.state.as_deref().unwrap_or(&self.test)
  }
}

/// Assembled saddle point or block system with essential dofs eliminated.
pub struct LinearSystem {
  pub matrix: nas::CsrMatrix<f64>,
  pub rhs: na::DVector<f64>,
  /// Initial guess carrying the essential values.
  pub x: na::DVector<f64>,
  pub offsets: Vec<usize>,
}

struct Forms {
  blfs: Vec<BilinearForm>,
  mblfs: IndexMap<(usize, usize), MixedBilinearForm>,
  lfs: Vec<LinearForm>,
  ess: Vec<Vec<(DofIdx, f64)>>,
}

pub struct EquationSystem {
  variables: Vec<Variable>,
  kernels: IndexMap<String, Vec<Kernel>>,
  dt: f64,
  dt_coef: Rc<ConstantCoefficient>,
  dt_scaled: Vec<String>,
  test_spaces: Vec<Rc<FeSpace>>,
  initialized: bool,
  forms: Option<Forms>,
}

impl Default for EquationSystem {
  fn default() -> Self {
    Self::new()
  }
}

impl EquationSystem {
  pub fn new() -> Self {
    Self {
      variables: Vec::new(),
      kernels: IndexMap::new(),
      dt: 1.0,
      dt_coef: Rc::new(ConstantCoefficient::new(1.0)),
      dt_scaled: Vec::new(),
      test_spaces: Vec::new(),
      initialized: false,
      forms: None,
    }
  }

  fn check_unique(&self, test: &str) -> Result<()> {
    if self.variables.iter().any(|v| v.test == test) {
      return Err(Error::Duplicate {
        kind: "equation system variable",
        name: test.to_string(),
      });
    }
    Ok(())
  }

  /// Unknown solved for directly (steady or algebraic).
  pub fn add_variable(&mut self, name: &str) -> Result<()> {
    self.check_unique(name)?;
    self.variables.push(Variable {
      test: name.to_string(),
      state: None,
    });
    Ok(())
  }

  /// Unknown integrated in time; the system solves for its time derivative.
  ///
  /// Returns the name of the derivative (test) variable.
  pub fn add_time_derivative_variable(&mut self, name: &str) -> Result<String> {
    let test = time_derivative_name(name);
    self.check_unique(&test)?;
    self.variables.push(Variable {
      test: test.clone(),
      state: Some(name.to_string()),
    });
    Ok(test)
  }

  pub fn add_kernel(&mut self, test_variable: &str, kernel: Kernel) -> Result<()> {
    if !self.has_variable(test_variable) {
      return Err(Error::UnknownVariable(test_variable.to_string()));
    }
    self
      .kernels
      .entry(test_variable.to_string())
      .or_default()
      .push(kernel);
    Ok(())
  }

  /// Requests a coefficient `dt_<name>` tracking the current time step, registered at init.
  pub fn add_dt_scaled_coefficient(&mut self, name: &str) -> String {
    if !self.dt_scaled.iter().any(|n| n == name) {
      self.dt_scaled.push(name.to_string());
    }
    dt_scaled_name(name)
  }

  pub fn has_variable(&self, test_variable: &str) -> bool {
    self.variables.iter().any(|v| v.test == test_variable)
  }
  pub fn test_variable_names(&self) -> Vec<&str> {
    self.variables.iter().map(|v| v.test.as_str()).collect()
  }
  /// Integrated variables in block order.
  pub fn state_variable_names(&self) -> Vec<&str> {
    self.variables.iter().filter_map(|v| v.state.as_deref()).collect()
  }
  pub fn is_time_dependent(&self) -> bool {
    self.variables.iter().any(|v| v.state.is_some())
  }
  pub fn nkernels(&self, test_variable: &str) -> usize {
    self.kernels.get(test_variable).map_or(0, Vec::len)
  }

  pub fn dt(&self) -> f64 {
    self.dt
  }
  pub fn dt_coefficient(&self) -> &Rc<ConstantCoefficient> {
    &self.dt_coef
  }

  pub fn set_time_step(&mut self, dt: f64) {
    self.dt = dt;
    self.dt_coef.set_constant(dt);
  }

  fn variable_index(&self, test: &str) -> Result<usize> {
    self
      .variables
      .iter()
      .position(|v| v.test == test)
      .ok_or_else(|| Error::UnknownVariable(test.to_string()))
  }

  /// Registers derived coefficients, resolves the test spaces and initialises every kernel.
  pub fn init(
    &mut self,
    gridfunctions: &GridFunctions,
    fespaces: &FeSpaces,
    bc_map: &BcMap,
    coefficients: &mut Coefficients,
  ) -> Result<()> {
    for name in &self.dt_scaled {
      let base = coefficients.scalars.require(name, "EquationSystem")?;
      let scaled = ProductCoefficient::new(self.dt_coef.clone(), base);
      coefficients
        .scalars
        .register(&dt_scaled_name(name), Rc::new(scaled), Ownership::Owned)?;
    }

    self.test_spaces = self
      .variables
      .iter()
      .map(|v| {
        gridfunctions
          .require(&v.test, "EquationSystem")
          .map(|gf| Rc::clone(gf.borrow().space()))
      })
      .collect::<Result<_>>()?;

    let bindings = Bindings {
      gridfunctions,
      fespaces,
      bc_map,
      coefficients,
    };
    for (test, kernels) in self.kernels.iter_mut() {
      for kernel in kernels.iter_mut() {
        if let Some(trial) = kernel.trial_variable() {
          if !self.variables.iter().any(|v| v.test == trial) {
            return Err(Error::UnknownVariable(format!("{trial} (coupled to {test})")));
          }
        }
        kernel.init(&bindings)?;
      }
    }

    self.initialized = true;
    tracing::debug!(
      "initialised equation system with variables {:?}",
      self.test_variable_names()
    );
    Ok(())
  }

  /// Rebuilds all forms from the kernels, boundary conditions and sources.
  pub fn update(&mut self, bc_map: &BcMap, sources: &Sources) -> Result<()> {
    if !self.initialized {
      return Err(Error::Uninitialized("EquationSystem".into()));
    }

    let nvars = self.variables.len();
    let mut blfs = Vec::with_capacity(nvars);
    let mut mblfs: IndexMap<(usize, usize), MixedBilinearForm> = IndexMap::new();
    let mut lfs = Vec::with_capacity(nvars);
    let mut ess = Vec::with_capacity(nvars);

    for (i, variable) in self.variables.iter().enumerate() {
      let space = &self.test_spaces[i];
      let mut blf = BilinearForm::new(Rc::clone(space));
      let mut lf = LinearForm::new(Rc::clone(space));

      bc_map.apply_integrated_bcs(variable.bc_name(), &mut lf)?;

      for kernel in self.kernels.get(&variable.test).into_iter().flatten() {
        match kernel {
          Kernel::Diagonal(k) => k.apply(&mut blf)?,
          Kernel::Linear(k) => k.apply(&mut lf)?,
          Kernel::Coupled(k) | Kernel::Mixed(k) => {
            let j = self.variable_index(k.trial_variable())?;
            let trial_space = &self.test_spaces[j];
            if matches!(kernel, Kernel::Coupled(_)) && trial_space.family() != space.family() {
              return Err(Error::UnsupportedElement(format!(
                "coupled kernel between {} and {}",
                trial_space.collection(),
                space.collection()
              )));
            }
            let mblf = match mblfs.entry((i, j)) {
              indexmap::map::Entry::Occupied(e) => e.into_mut(),
              indexmap::map::Entry::Vacant(e) => {
                e.insert(MixedBilinearForm::new(Rc::clone(trial_space), Rc::clone(space))?)
              }
            };
            k.apply(mblf)?;
          }
        }
      }

      if space.family() == FeFamily::HCurl {
        sources.apply(&mut lf)?;
      }

      let mut prescribed = GridFunction::new(Rc::clone(space));
      let mut dofs = Vec::new();
      bc_map.apply_essential_bcs(variable.bc_name(), &mut dofs, &mut prescribed)?;
      ess.push(dofs.into_iter().map(|d| (d, prescribed.data()[d])).collect());

      blfs.push(blf);
      lfs.push(lf);
    }

    self.forms = Some(Forms {
      blfs,
      mblfs,
      lfs,
      ess,
    });
    Ok(())
  }

  pub fn offsets(&self) -> Vec<usize> {
    let mut offsets = vec![0];
    for space in &self.test_spaces {
      offsets.push(offsets.last().copied().unwrap_or(0) + space.ndofs());
    }
    offsets
  }

  /// Assembles the block operator and right hand side of the last update.
  pub fn form_linear_system(&self) -> Result<LinearSystem> {
    let forms = self
      .forms
      .as_ref()
      .ok_or_else(|| Error::Uninitialized("EquationSystem forms".into()))?;
    let offsets = self.offsets();
    let n = offsets.last().copied().unwrap_or(0);

    let mut matrix = SparseMatrix::zeros(n, n);
    let mut rhs = na::DVector::zeros(n);
    for (i, (blf, lf)) in forms.blfs.iter().zip(&forms.lfs).enumerate() {
      matrix.add_block(&blf.assemble(), offsets[i], offsets[i], 1.0);
      rhs.rows_mut(offsets[i], lf.space().ndofs()).copy_from(&lf.assemble());
    }
    for (&(i, j), mblf) in &forms.mblfs {
      matrix.add_block(&mblf.assemble(), offsets[i], offsets[j], 1.0);
    }

    let dof_coeffs: Vec<_> = forms
      .ess
      .iter()
      .enumerate()
      .flat_map(|(i, ess)| {
        let offset = offsets[i];
        ess.iter().map(move |&(d, v)| (offset + d, v))
      })
      .collect();
    let dof_coeffs = assemble::dedup_dof_coeffs(dof_coeffs);
    fix_dofs_coeff(&dof_coeffs, &mut matrix, &mut rhs);

    let mut x = na::DVector::zeros(n);
    for &(d, v) in &dof_coeffs {
      x[d] = v;
    }

    tracing::debug!("formed block system of size {n} with {} essential dofs", dof_coeffs.len());
    Ok(LinearSystem {
      matrix: matrix.to_nalgebra_csr()?,
      rhs,
      x,
      offsets,
    })
  }

  /// Scatters the block solution into the test variable fields.
  pub fn recover_fem_solution(&self, x: &na::DVector<f64>, gridfunctions: &GridFunctions) -> Result<()> {
    let offsets = self.offsets();
    let n = offsets.last().copied().unwrap_or(0);
    if x.len() != n {
      return Err(Error::DimensionMismatch {
        context: "equation system solution",
        expected: n,
        found: x.len(),
      });
    }
    for (i, variable) in self.variables.iter().enumerate() {
      let gf = gridfunctions.require(&variable.test, "EquationSystem")?;
      gf.borrow_mut()
        .copy_from_slice(&x.as_slice()[offsets[i]..offsets[i + 1]])?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    boundary_conditions::VectorDirichletBc,
    coefficients::{ConstantCoefficient, VectorConstantCoefficient},
    kernels::{VectorFeMassKernel, WeakCurlCurlKernel},
    mesh::cuboid::CuboidMeshInfo,
    params::InputParameters,
    registry::{new_fespaces, new_gridfunctions},
  };
  use std::cell::RefCell;

  struct Fixture {
    fespaces: FeSpaces,
    gridfunctions: GridFunctions,
    coefficients: Coefficients,
  }

  fn fixture() -> Fixture {
    let mesh = Rc::new(CuboidMeshInfo::unit(1).to_mesh().unwrap());
    let mut fespaces = new_fespaces();
    let nd = fespaces
      .register_owned("HCurl", FeSpace::from_name(mesh, "ND_3D_P1").unwrap())
      .unwrap();
    let mut gridfunctions = new_gridfunctions();
    for name in ["u", "d(u)/dt"] {
      gridfunctions
        .register_owned(name, RefCell::new(GridFunction::new(nd.clone())))
        .unwrap();
    }
    let mut coefficients = Coefficients::new();
    for (name, v) in [("a", 1.0), ("b", 2.0), ("c", 3.0)] {
      coefficients
        .add_scalar(name, Rc::new(ConstantCoefficient::new(v)))
        .unwrap();
    }
    Fixture {
      fespaces,
      gridfunctions,
      coefficients,
    }
  }

  fn mass(name: &str) -> Kernel {
    let params = InputParameters::new().with("CoefficientName", name);
    Kernel::diagonal(VectorFeMassKernel::new(&params).unwrap())
  }

  fn assembled(order: [&str; 3]) -> na::DMatrix<f64> {
    let mut f = fixture();
    let mut system = EquationSystem::new();
    let test = system.add_time_derivative_variable("u").unwrap();
    for name in order {
      system.add_kernel(&test, mass(name)).unwrap();
    }
    let bcs = BcMap::new();
    system
      .init(&f.gridfunctions, &f.fespaces, &bcs, &mut f.coefficients)
      .unwrap();
    system.set_time_step(0.1);
    system.update(&bcs, &Sources::new()).unwrap();
    let ls = system.form_linear_system().unwrap();
    (&ls.matrix).into()
  }

  #[test]
  fn kernel_order_does_not_change_the_operator() {
    let a = assembled(["a", "b", "c"]);
    let b = assembled(["c", "a", "b"]);
    assert!((a - b).abs().max() < 1e-12);
  }

  #[test]
  fn essential_dofs_of_later_blocks_are_offset() {
    let mut f = fixture();
    let nd = f.fespaces.get("HCurl").unwrap();
    f.gridfunctions
      .register_owned("w", RefCell::new(GridFunction::new(nd.clone())))
      .unwrap();
    let mut system = EquationSystem::new();
    let test = system.add_time_derivative_variable("u").unwrap();
    system.add_kernel(&test, mass("a")).unwrap();
    system.add_variable("w").unwrap();
    system.add_kernel("w", mass("b")).unwrap();

    let value = Rc::new(VectorConstantCoefficient::new(na::Vector3::new(0.0, 1.0, 2.0)));
    let mut bcs = BcMap::new();
    bcs
      .add_essential("wall", VectorDirichletBc::new("w", vec![2], value.clone()))
      .unwrap();
    system
      .init(&f.gridfunctions, &f.fespaces, &bcs, &mut f.coefficients)
      .unwrap();
    system.set_time_step(0.1);
    system.update(&bcs, &Sources::new()).unwrap();
    let ls = system.form_linear_system().unwrap();

    let offset = ls.offsets[1];
    assert_eq!(offset, nd.ndofs());
    let mut expected = GridFunction::new(nd.clone());
    expected.project_boundary_vector(value.as_ref(), &[2]);
    let matrix = na::DMatrix::from(&ls.matrix);
    let dofs = nd.boundary_dofs(&[2]);
    assert!(!dofs.is_empty());
    for d in dofs {
      let row = offset + d;
      assert_eq!(ls.x[row], expected.data()[d]);
      assert_eq!(ls.rhs[row], expected.data()[d]);
      assert_eq!(matrix.row(row).iter().filter(|v| **v != 0.0).count(), 1);
      assert_eq!(matrix[(row, row)], 1.0);
    }
    assert!(expected.data().amax() > 0.0);
    assert!(ls.x.rows(0, offset).iter().all(|v| *v == 0.0));
  }

  #[test]
  fn naming_and_validation() {
    let mut system = EquationSystem::new();
    assert_eq!(system.add_time_derivative_variable("u").unwrap(), "d(u)/dt");
    assert!(system.add_time_derivative_variable("u").is_err());
    assert!(matches!(
      system.add_kernel("v", mass("a")),
      Err(Error::UnknownVariable(_))
    ));
    assert_eq!(system.add_dt_scaled_coefficient("a"), "dt_a");
    assert_eq!(system.state_variable_names(), vec!["u"]);
    assert!(system.is_time_dependent());
    assert!(matches!(
      system.update(&BcMap::new(), &Sources::new()),
      Err(Error::Uninitialized(_))
    ));
  }

  #[test]
  fn dt_scaled_coefficients_follow_the_time_step() {
    let mut f = fixture();
    let mut system = EquationSystem::new();
    system.add_time_derivative_variable("u").unwrap();
    let name = system.add_dt_scaled_coefficient("b");
    system
      .init(&f.gridfunctions, &f.fespaces, &BcMap::new(), &mut f.coefficients)
      .unwrap();
    system.set_time_step(0.25);
    let coef = f.coefficients.scalars.get(&name).unwrap();
    let p = crate::coefficients::EvalPoint::new(na::Vector3::zeros(), 1);
    assert_eq!(coef.eval(&p), 0.5);
  }

  #[test]
  fn unknown_coupled_variable_fails_init() {
    let mut f = fixture();
    let mut system = EquationSystem::new();
    let test = system.add_time_derivative_variable("u").unwrap();
    let params = InputParameters::new()
      .with("CoefficientName", "a")
      .with("CoupledVariableName", "u");
    system
      .add_kernel(&test, Kernel::linear(WeakCurlCurlKernel::new(&params).unwrap()))
      .unwrap();
    // linear kernels may read any registered field
    system
      .init(&f.gridfunctions, &f.fespaces, &BcMap::new(), &mut f.coefficients)
      .unwrap();

    let mut system = EquationSystem::new();
    let test = system.add_time_derivative_variable("u").unwrap();
    let params = InputParameters::new()
      .with("CoefficientName", "a")
      .with("CoupledVariableName", "w");
    let kernel = crate::kernels::MixedVectorMassKernel::new(&params).unwrap();
    system.add_kernel(&test, Kernel::coupled(kernel)).unwrap();
    assert!(matches!(
      system.init(&f.gridfunctions, &f.fespaces, &BcMap::new(), &mut f.coefficients),
      Err(Error::UnknownVariable(_))
    ));
  }
}
