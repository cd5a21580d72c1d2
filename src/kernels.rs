//! Weak form kernels contributing integrators to the forms of one test variable.
//!
//! A kernel resolves its named coefficients and fields once in `init` and
//! then adds exactly one integrator per `apply`.

use crate::{
  coefficients::{ScalarCoefficient, VectorCoefficient},
  error::{Error, Result},
  fe::gridfunction::GridFunction,
  forms::{BilinearForm, LinearForm, MixedBilinearForm},
  operators::{
    CurlCurlElmat, DiffusionElmat, FieldActionElvec, MixedGradientElmat, ScalarLoadElvec,
    ScalarMassElmat, VectorLoadElvec, VectorMassElmat, WeakDivergenceElmat,
  },
  params::InputParameters,
  registry::Bindings,
};

use std::{cell::RefCell, rc::Rc};

pub trait KernelInit {
  fn init(&mut self, bindings: &Bindings) -> Result<()>;
}

/// Bilinear in the test variable itself.
pub trait BilinearKernel: KernelInit {
  fn apply(&self, blf: &mut BilinearForm) -> Result<()>;
}

/// Bilinear in another (trial) variable, tested against the test variable.
pub trait MixedBilinearKernel: KernelInit {
  fn trial_variable(&self) -> &str;
  fn apply(&self, mblf: &mut MixedBilinearForm) -> Result<()>;
}

/// Contributes to the right hand side.
pub trait LinearKernel: KernelInit {
  fn apply(&self, lf: &mut LinearForm) -> Result<()>;
}

/// Kernel tagged with the shape of the form it contributes to.
///
/// `Coupled` kernels couple two variables on spaces of the same family,
/// `Mixed` kernels couple variables on spaces of different families.
pub enum Kernel {
  Diagonal(Box<dyn BilinearKernel>),
  Coupled(Box<dyn MixedBilinearKernel>),
  Mixed(Box<dyn MixedBilinearKernel>),
  Linear(Box<dyn LinearKernel>),
}

impl Kernel {
  pub fn diagonal(kernel: impl BilinearKernel + 'static) -> Self {
    Self::Diagonal(Box::new(kernel))
  }
  pub fn coupled(kernel: impl MixedBilinearKernel + 'static) -> Self {
    Self::Coupled(Box::new(kernel))
  }
  pub fn mixed(kernel: impl MixedBilinearKernel + 'static) -> Self {
    Self::Mixed(Box::new(kernel))
  }
  pub fn linear(kernel: impl LinearKernel + 'static) -> Self {
    Self::Linear(Box::new(kernel))
  }

  pub fn init(&mut self, bindings: &Bindings) -> Result<()> {
    match self {
      Self::Diagonal(k) => k.init(bindings),
      Self::Coupled(k) | Self::Mixed(k) => k.init(bindings),
      Self::Linear(k) => k.init(bindings),
    }
  }

  pub fn trial_variable(&self) -> Option<&str> {
    match self {
      Self::Coupled(k) | Self::Mixed(k) => Some(k.trial_variable()),
      _ => None,
    }
  }
}

fn resolve_scalar(bindings: &Bindings, name: &str, requester: &str) -> Result<Rc<dyn ScalarCoefficient>> {
  bindings.coefficients.scalars.require(name, requester)
}

fn initialised<T: ?Sized>(slot: &Option<Rc<T>>, kernel: &str) -> Result<Rc<T>> {
  slot
    .clone()
    .ok_or_else(|| Error::Uninitialized(kernel.to_string()))
}

/// Kernel with a single named scalar coefficient.
struct CoefficientSlot {
  name: String,
  coef: Option<Rc<dyn ScalarCoefficient>>,
}

impl CoefficientSlot {
  fn from_params(params: &InputParameters) -> Result<Self> {
    Ok(Self {
      name: params.get_str("CoefficientName")?.to_string(),
      coef: None,
    })
  }
  fn init(&mut self, bindings: &Bindings, kernel: &str) -> Result<()> {
    self.coef = Some(resolve_scalar(bindings, &self.name, kernel)?);
    Ok(())
  }
  fn get(&self, kernel: &str) -> Result<Rc<dyn ScalarCoefficient>> {
    initialised(&self.coef, kernel)
  }
}

/// $(sigma nabla u, nabla u')$
pub struct DiffusionKernel {
  coef: CoefficientSlot,
}
impl DiffusionKernel {
  pub fn new(params: &InputParameters) -> Result<Self> {
    Ok(Self {
      coef: CoefficientSlot::from_params(params)?,
    })
  }
}
impl KernelInit for DiffusionKernel {
  fn init(&mut self, bindings: &Bindings) -> Result<()> {
    self.coef.init(bindings, "DiffusionKernel")
  }
}
impl BilinearKernel for DiffusionKernel {
  fn apply(&self, blf: &mut BilinearForm) -> Result<()> {
    let coef = self.coef.get("DiffusionKernel")?;
    blf.add_domain_integrator(Box::new(DiffusionElmat::new(coef)))
  }
}

/// $(beta u, u')$ on H1.
pub struct MassKernel {
  coef: CoefficientSlot,
}
impl MassKernel {
  pub fn new(params: &InputParameters) -> Result<Self> {
    Ok(Self {
      coef: CoefficientSlot::from_params(params)?,
    })
  }
}
impl KernelInit for MassKernel {
  fn init(&mut self, bindings: &Bindings) -> Result<()> {
    self.coef.init(bindings, "MassKernel")
  }
}
impl BilinearKernel for MassKernel {
  fn apply(&self, blf: &mut BilinearForm) -> Result<()> {
    let coef = self.coef.get("MassKernel")?;
    blf.add_domain_integrator(Box::new(ScalarMassElmat::new(coef)))
  }
}

/// $(beta bold(u), bold(u)')$ on H(curl) or H(div).
pub struct VectorFeMassKernel {
  coef: CoefficientSlot,
}
impl VectorFeMassKernel {
  pub fn new(params: &InputParameters) -> Result<Self> {
    Ok(Self {
      coef: CoefficientSlot::from_params(params)?,
    })
  }
}
impl KernelInit for VectorFeMassKernel {
  fn init(&mut self, bindings: &Bindings) -> Result<()> {
    self.coef.init(bindings, "VectorFEMassKernel")
  }
}
impl BilinearKernel for VectorFeMassKernel {
  fn apply(&self, blf: &mut BilinearForm) -> Result<()> {
    let coef = self.coef.get("VectorFEMassKernel")?;
    let family = blf.space().family();
    if !family.is_vector() {
      return Err(Error::UnsupportedElement(format!(
        "VectorFEMassKernel on {}",
        blf.space().collection()
      )));
    }
    blf.add_domain_integrator(Box::new(VectorMassElmat::square(family, coef)))
  }
}

/// $(alpha nabla times bold(u), nabla times bold(u)')$
pub struct CurlCurlKernel {
  coef: CoefficientSlot,
}
impl CurlCurlKernel {
  pub fn new(params: &InputParameters) -> Result<Self> {
    Ok(Self {
      coef: CoefficientSlot::from_params(params)?,
    })
  }
}
impl KernelInit for CurlCurlKernel {
  fn init(&mut self, bindings: &Bindings) -> Result<()> {
    self.coef.init(bindings, "CurlCurlKernel")
  }
}
impl BilinearKernel for CurlCurlKernel {
  fn apply(&self, blf: &mut BilinearForm) -> Result<()> {
    let coef = self.coef.get("CurlCurlKernel")?;
    blf.add_domain_integrator(Box::new(CurlCurlElmat::new(coef)))
  }
}

/// $(sigma nabla p, bold(u)')$ with H1 trial variable $p$.
pub struct MixedVectorGradientKernel {
  coef: CoefficientSlot,
  trial: String,
}
impl MixedVectorGradientKernel {
  pub fn new(params: &InputParameters) -> Result<Self> {
    Ok(Self {
      coef: CoefficientSlot::from_params(params)?,
      trial: params.get_str("CoupledVariableName")?.to_string(),
    })
  }
}
impl KernelInit for MixedVectorGradientKernel {
  fn init(&mut self, bindings: &Bindings) -> Result<()> {
    self.coef.init(bindings, "MixedVectorGradientKernel")
  }
}
impl MixedBilinearKernel for MixedVectorGradientKernel {
  fn trial_variable(&self) -> &str {
    &self.trial
  }
  fn apply(&self, mblf: &mut MixedBilinearForm) -> Result<()> {
    let coef = self.coef.get("MixedVectorGradientKernel")?;
    mblf.add_domain_integrator(Box::new(MixedGradientElmat::new(coef)))
  }
}

/// $(sigma bold(u), nabla q')$ with H(curl) trial variable $bold(u)$.
pub struct VectorFeWeakDivergenceKernel {
  coef: CoefficientSlot,
  trial: String,
}
impl VectorFeWeakDivergenceKernel {
  pub fn new(params: &InputParameters) -> Result<Self> {
    Ok(Self {
      coef: CoefficientSlot::from_params(params)?,
      trial: params.get_str("CoupledVariableName")?.to_string(),
    })
  }
}
impl KernelInit for VectorFeWeakDivergenceKernel {
  fn init(&mut self, bindings: &Bindings) -> Result<()> {
    self.coef.init(bindings, "VectorFEWeakDivergenceKernel")
  }
}
impl MixedBilinearKernel for VectorFeWeakDivergenceKernel {
  fn trial_variable(&self) -> &str {
    &self.trial
  }
  fn apply(&self, mblf: &mut MixedBilinearForm) -> Result<()> {
    let coef = self.coef.get("VectorFEWeakDivergenceKernel")?;
    mblf.add_domain_integrator(Box::new(WeakDivergenceElmat::new(coef)))
  }
}

/// $(beta bold(v), bold(u)')$ with a vector valued trial variable $bold(v)$.
pub struct MixedVectorMassKernel {
  coef: CoefficientSlot,
  trial: String,
}
impl MixedVectorMassKernel {
  pub fn new(params: &InputParameters) -> Result<Self> {
    Ok(Self {
      coef: CoefficientSlot::from_params(params)?,
      trial: params.get_str("CoupledVariableName")?.to_string(),
    })
  }
}
impl KernelInit for MixedVectorMassKernel {
  fn init(&mut self, bindings: &Bindings) -> Result<()> {
    self.coef.init(bindings, "MixedVectorMassKernel")
  }
}
impl MixedBilinearKernel for MixedVectorMassKernel {
  fn trial_variable(&self) -> &str {
    &self.trial
  }
  fn apply(&self, mblf: &mut MixedBilinearForm) -> Result<()> {
    let coef = self.coef.get("MixedVectorMassKernel")?;
    let test = mblf.test_space().family();
    let trial = mblf.trial_space().family();
    if !test.is_vector() || !trial.is_vector() {
      return Err(Error::UnsupportedElement(format!(
        "MixedVectorMassKernel from {} to {}",
        mblf.trial_space().collection(),
        mblf.test_space().collection()
      )));
    }
    mblf.add_domain_integrator(Box::new(VectorMassElmat::new(test, trial, coef)))
  }
}

/// $-(alpha nabla times bold(u)_n, nabla times bold(u)')$ for the current value
/// $bold(u)_n$ of a coupled variable.
pub struct WeakCurlCurlKernel {
  coef: CoefficientSlot,
  coupled_name: String,
  coupled: Option<Rc<RefCell<GridFunction>>>,
}
impl WeakCurlCurlKernel {
  pub fn new(params: &InputParameters) -> Result<Self> {
    Ok(Self {
      coef: CoefficientSlot::from_params(params)?,
      coupled_name: params.get_str("CoupledVariableName")?.to_string(),
      coupled: None,
    })
  }
}
impl KernelInit for WeakCurlCurlKernel {
  fn init(&mut self, bindings: &Bindings) -> Result<()> {
    self.coef.init(bindings, "WeakCurlCurlKernel")?;
    self.coupled = Some(
      bindings
        .gridfunctions
        .require(&self.coupled_name, "WeakCurlCurlKernel")?,
    );
    Ok(())
  }
}
impl LinearKernel for WeakCurlCurlKernel {
  fn apply(&self, lf: &mut LinearForm) -> Result<()> {
    let coef = self.coef.get("WeakCurlCurlKernel")?;
    let coupled = initialised(&self.coupled, "WeakCurlCurlKernel")?;
    let snapshot = coupled.borrow().clone();
    if !snapshot.space().shares_mesh(lf.space()) {
      return Err(Error::Mesh(format!(
        "coupled variable `{}` lives on another mesh",
        self.coupled_name
      )));
    }
    lf.add_domain_integrator(Box::new(FieldActionElvec::new(
      Box::new(CurlCurlElmat::new(coef)),
      snapshot,
      -1.0,
    )))
  }
}

/// $(bold(f), bold(u)')$ for a named vector coefficient.
pub struct VectorFeDomainLfKernel {
  name: String,
  coef: Option<Rc<dyn VectorCoefficient>>,
}
impl VectorFeDomainLfKernel {
  pub fn new(params: &InputParameters) -> Result<Self> {
    Ok(Self {
      name: params.get_str("VectorCoefficientName")?.to_string(),
      coef: None,
    })
  }
}
impl KernelInit for VectorFeDomainLfKernel {
  fn init(&mut self, bindings: &Bindings) -> Result<()> {
    self.coef = Some(
      bindings
        .coefficients
        .vectors
        .require(&self.name, "VectorFEDomainLFKernel")?,
    );
    Ok(())
  }
}
impl LinearKernel for VectorFeDomainLfKernel {
  fn apply(&self, lf: &mut LinearForm) -> Result<()> {
    let coef = initialised(&self.coef, "VectorFEDomainLFKernel")?;
    let family = lf.space().family();
    if !family.is_vector() {
      return Err(Error::UnsupportedElement(format!(
        "VectorFEDomainLFKernel on {}",
        lf.space().collection()
      )));
    }
    lf.add_domain_integrator(Box::new(VectorLoadElvec::new(family, coef)))
  }
}

/// $(f, v')$ for a named scalar coefficient.
pub struct DomainLfKernel {
  coef: CoefficientSlot,
}
impl DomainLfKernel {
  pub fn new(params: &InputParameters) -> Result<Self> {
    Ok(Self {
      coef: CoefficientSlot::from_params(params)?,
    })
  }
}
impl KernelInit for DomainLfKernel {
  fn init(&mut self, bindings: &Bindings) -> Result<()> {
    self.coef.init(bindings, "DomainLFKernel")
  }
}
impl LinearKernel for DomainLfKernel {
  fn apply(&self, lf: &mut LinearForm) -> Result<()> {
    let coef = self.coef.get("DomainLFKernel")?;
    lf.add_domain_integrator(Box::new(ScalarLoadElvec::new(coef)))
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{
    boundary_conditions::BcMap,
    coefficients::{Coefficients, ConstantCoefficient},
    fe::FeSpace,
    mesh::cuboid::CuboidMeshInfo,
    registry::{new_fespaces, new_gridfunctions},
  };

  #[test]
  fn apply_requires_init_and_bindings() {
    let mesh = Rc::new(CuboidMeshInfo::unit(1).to_mesh().unwrap());
    let h1 = Rc::new(FeSpace::from_name(mesh, "H1_3D_P1").unwrap());
    let params = InputParameters::new().with("CoefficientName", "sigma");
    let mut kernel = DiffusionKernel::new(&params).unwrap();

    let mut blf = BilinearForm::new(h1);
    assert!(matches!(kernel.apply(&mut blf), Err(Error::Uninitialized(_))));

    let (fespaces, gridfunctions, bc_map) = (new_fespaces(), new_gridfunctions(), BcMap::new());
    let mut coefficients = Coefficients::new();
    {
      let bindings = Bindings {
        gridfunctions: &gridfunctions,
        fespaces: &fespaces,
        bc_map: &bc_map,
        coefficients: &coefficients,
      };
      assert!(matches!(
        kernel.init(&bindings),
        Err(Error::Missing { name, requester, .. }) if name == "sigma" && requester == "DiffusionKernel"
      ));
    }

    coefficients
      .add_scalar("sigma", Rc::new(ConstantCoefficient::new(2.0)))
      .unwrap();
    let bindings = Bindings {
      gridfunctions: &gridfunctions,
      fespaces: &fespaces,
      bc_map: &bc_map,
      coefficients: &coefficients,
    };
    kernel.init(&bindings).unwrap();
    kernel.apply(&mut blf).unwrap();
    assert_eq!(blf.nintegrators(), 1);
  }

  #[test]
  fn missing_parameters_fail_construction() {
    assert!(WeakCurlCurlKernel::new(&InputParameters::new().with("CoefficientName", "a")).is_err());
  }
}
