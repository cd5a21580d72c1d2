//! Essential and integrated boundary conditions keyed by variable name.

use crate::{
  coefficients::{ConstantCoefficient, ScalarCoefficient, VectorCoefficient},
  error::{Error, Result},
  fe::{gridfunction::GridFunction, DofIdx, FeFamily},
  forms::LinearForm,
  mesh::Attribute,
  operators::{ScalarBoundaryLoadElvec, VectorBoundaryLoadElvec},
  registry::{NamedRegistry, Ownership},
};

use std::rc::Rc;

/// Condition prescribing dof values on part of the boundary.
pub trait EssentialBc {
  fn variable(&self) -> &str;
  fn boundary_attributes(&self) -> &[Attribute];
  /// Writes the prescribed values into the boundary dofs of `gf`.
  fn project(&self, gf: &mut GridFunction) -> Result<()>;
}

/// Condition entering the weak form as a boundary integral.
pub trait IntegratedBc {
  fn variable(&self) -> &str;
  fn apply(&self, lf: &mut LinearForm) -> Result<()>;
}

pub enum BoundaryCondition {
  Essential(Box<dyn EssentialBc>),
  Integrated(Box<dyn IntegratedBc>),
}

impl BoundaryCondition {
  pub fn variable(&self) -> &str {
    match self {
      Self::Essential(bc) => bc.variable(),
      Self::Integrated(bc) => bc.variable(),
    }
  }
}

fn wrong_space(bc: &str, gf: &GridFunction) -> Error {
  Error::UnsupportedElement(format!("{bc} on {} space", gf.space().collection()))
}

/// $u = g$ on $Gamma_D$ for an H1 variable.
pub struct ScalarDirichletBc {
  variable: String,
  attributes: Vec<Attribute>,
  coef: Rc<dyn ScalarCoefficient>,
}
impl ScalarDirichletBc {
  pub fn new(variable: &str, attributes: Vec<Attribute>, coef: Rc<dyn ScalarCoefficient>) -> Self {
    Self {
      variable: variable.to_string(),
      attributes,
      coef,
    }
  }
  pub fn constant(variable: &str, attributes: Vec<Attribute>, value: f64) -> Self {
    Self::new(variable, attributes, Rc::new(ConstantCoefficient::new(value)))
  }
}
impl EssentialBc for ScalarDirichletBc {
  fn variable(&self) -> &str {
    &self.variable
  }
  fn boundary_attributes(&self) -> &[Attribute] {
    &self.attributes
  }
  fn project(&self, gf: &mut GridFunction) -> Result<()> {
    if gf.family() != FeFamily::H1 {
      return Err(wrong_space("scalar Dirichlet condition", gf));
    }
    gf.project_boundary_scalar(self.coef.as_ref(), &self.attributes);
    Ok(())
  }
}

/// $n times u = n times g$ (H(curl)) or $n dot u = n dot g$ (H(div)) on $Gamma_D$.
pub struct VectorDirichletBc {
  variable: String,
  attributes: Vec<Attribute>,
  coef: Rc<dyn VectorCoefficient>,
}
impl VectorDirichletBc {
  pub fn new(variable: &str, attributes: Vec<Attribute>, coef: Rc<dyn VectorCoefficient>) -> Self {
    Self {
      variable: variable.to_string(),
      attributes,
      coef,
    }
  }
}
impl EssentialBc for VectorDirichletBc {
  fn variable(&self) -> &str {
    &self.variable
  }
  fn boundary_attributes(&self) -> &[Attribute] {
    &self.attributes
  }
  fn project(&self, gf: &mut GridFunction) -> Result<()> {
    if !gf.family().is_vector() {
      return Err(wrong_space("vector Dirichlet condition", gf));
    }
    gf.project_boundary_vector(self.coef.as_ref(), &self.attributes);
    Ok(())
  }
}

/// Adds $integral_Gamma g v$ for an H1 variable.
pub struct ScalarNeumannBc {
  variable: String,
  attributes: Vec<Attribute>,
  coef: Rc<dyn ScalarCoefficient>,
}
impl ScalarNeumannBc {
  pub fn new(variable: &str, attributes: Vec<Attribute>, coef: Rc<dyn ScalarCoefficient>) -> Self {
    Self {
      variable: variable.to_string(),
      attributes,
      coef,
    }
  }
}
impl IntegratedBc for ScalarNeumannBc {
  fn variable(&self) -> &str {
    &self.variable
  }
  fn apply(&self, lf: &mut LinearForm) -> Result<()> {
    lf.add_boundary_integrator(
      self.attributes.clone(),
      Box::new(ScalarBoundaryLoadElvec::new(Rc::clone(&self.coef))),
    )
  }
}

/// Adds $integral_Gamma bold(g) dot bold(v)$ for an H(curl) variable,
/// e.g. a prescribed tangential field $n times H$.
pub struct VectorBoundaryLoadBc {
  variable: String,
  attributes: Vec<Attribute>,
  coef: Rc<dyn VectorCoefficient>,
}
impl VectorBoundaryLoadBc {
  pub fn new(variable: &str, attributes: Vec<Attribute>, coef: Rc<dyn VectorCoefficient>) -> Self {
    Self {
      variable: variable.to_string(),
      attributes,
      coef,
    }
  }
}
impl IntegratedBc for VectorBoundaryLoadBc {
  fn variable(&self) -> &str {
    &self.variable
  }
  fn apply(&self, lf: &mut LinearForm) -> Result<()> {
    lf.add_boundary_integrator(
      self.attributes.clone(),
      Box::new(VectorBoundaryLoadElvec::new(Rc::clone(&self.coef))),
    )
  }
}

/// Named boundary conditions of a problem.
#[derive(Clone)]
pub struct BcMap {
  bcs: NamedRegistry<BoundaryCondition>,
}

impl Default for BcMap {
  fn default() -> Self {
    Self::new()
  }
}

impl BcMap {
  pub fn new() -> Self {
    Self {
      bcs: NamedRegistry::new("boundary condition"),
    }
  }

  pub fn add(&mut self, name: &str, bc: BoundaryCondition) -> Result<()> {
    self.bcs.register(name, Rc::new(bc), Ownership::Owned)
  }
  pub fn add_essential(&mut self, name: &str, bc: impl EssentialBc + 'static) -> Result<()> {
    self.add(name, BoundaryCondition::Essential(Box::new(bc)))
  }
  pub fn add_integrated(&mut self, name: &str, bc: impl IntegratedBc + 'static) -> Result<()> {
    self.add(name, BoundaryCondition::Integrated(Box::new(bc)))
  }

  pub fn has(&self, name: &str) -> bool {
    self.bcs.has(name)
  }
  pub fn len(&self) -> usize {
    self.bcs.len()
  }
  pub fn is_empty(&self) -> bool {
    self.bcs.is_empty()
  }

  fn essential_for<'a>(&'a self, variable: &'a str) -> impl Iterator<Item = &'a dyn EssentialBc> + 'a {
    self.bcs.iter().filter_map(move |(_, bc)| match bc.as_ref() {
      BoundaryCondition::Essential(bc) if bc.variable() == variable => Some(bc.as_ref()),
      _ => None,
    })
  }

  /// Projects every essential condition of `variable` into `gf`, in registration
  /// order, and appends the constrained dofs.
  pub fn apply_essential_bcs(
    &self,
    variable: &str,
    dofs: &mut Vec<DofIdx>,
    gf: &mut GridFunction,
  ) -> Result<()> {
    for bc in self.essential_for(variable) {
      bc.project(gf)?;
      dofs.extend(gf.space().boundary_dofs(bc.boundary_attributes()));
    }
    Ok(())
  }

  /// Constrained dofs of `variable` within the space of `gf`, without projecting values.
  pub fn essential_dofs(&self, variable: &str, gf: &GridFunction) -> Vec<DofIdx> {
    let mut dofs: Vec<_> = self
      .essential_for(variable)
      .flat_map(|bc| gf.space().boundary_dofs(bc.boundary_attributes()))
      .collect();
    dofs.sort_unstable();
    dofs.dedup();
    dofs
  }

  pub fn apply_integrated_bcs(&self, variable: &str, lf: &mut LinearForm) -> Result<()> {
    for (_, bc) in self.bcs.iter() {
      if let BoundaryCondition::Integrated(bc) = bc.as_ref() {
        if bc.variable() == variable {
          bc.apply(lf)?;
        }
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use crate::{fe::FeSpace, mesh::cuboid::CuboidMeshInfo};

  #[test]
  fn essential_conditions_in_registration_order() {
    let mesh = Rc::new(CuboidMeshInfo::unit(1).to_mesh().unwrap());
    let h1 = Rc::new(FeSpace::from_name(mesh, "H1_3D_P1").unwrap());
    let mut bcs = BcMap::new();
    bcs.add_essential("high", ScalarDirichletBc::constant("V", vec![1], 1.0)).unwrap();
    bcs.add_essential("low", ScalarDirichletBc::constant("V", vec![2], 0.0)).unwrap();
    bcs.add_essential("other", ScalarDirichletBc::constant("U", vec![3], 5.0)).unwrap();
    assert!(bcs
      .add_essential("low", ScalarDirichletBc::constant("V", vec![2], 0.0))
      .is_err());

    let mut gf = GridFunction::new(h1);
    gf.fill(-1.0);
    let mut dofs = Vec::new();
    bcs.apply_essential_bcs("V", &mut dofs, &mut gf).unwrap();
    assert_eq!(dofs, vec![0, 2, 4, 6, 1, 3, 5, 7]);
    assert_eq!(gf.data()[0], 1.0);
    assert_eq!(gf.data()[1], 0.0);
    assert_eq!(bcs.essential_dofs("U", &gf), vec![0, 1, 4, 5]);
  }
}
