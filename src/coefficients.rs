//! Scalar and vector coefficients of position, subdomain and time.
//!
//! Time is pushed into coefficients exclusively through
//! [`Coefficients::set_time`], which the time stepper calls once per solve.
//! Time dependent coefficients keep their clock in a `Cell`.

use crate::{
  error::{Error, Result},
  geometry::Point,
  mesh::Attribute,
  registry::{NamedRegistry, Ownership},
};

use std::{cell::Cell, collections::BTreeMap, rc::Rc};

/// Location a coefficient is evaluated at.
#[derive(Debug, Clone, Copy)]
pub struct EvalPoint {
  pub x: Point,
  pub attribute: Attribute,
}

impl EvalPoint {
  pub fn new(x: Point, attribute: Attribute) -> Self {
    Self { x, attribute }
  }
}

pub trait ScalarCoefficient {
  fn eval(&self, p: &EvalPoint) -> f64;
  fn set_time(&self, _t: f64) {}
}

pub trait VectorCoefficient {
  fn eval(&self, p: &EvalPoint) -> na::Vector3<f64>;
  fn set_time(&self, _t: f64) {}
}

/// Constant that may be overwritten between solves, e.g. the time step.
pub struct ConstantCoefficient {
  value: Cell<f64>,
}
impl ConstantCoefficient {
  pub fn new(value: f64) -> Self {
    Self {
      value: Cell::new(value),
    }
  }
  pub fn constant(&self) -> f64 {
    self.value.get()
  }
  pub fn set_constant(&self, value: f64) {
    self.value.set(value);
  }
}
impl ScalarCoefficient for ConstantCoefficient {
  fn eval(&self, _p: &EvalPoint) -> f64 {
    self.value.get()
  }
}

type ScalarFn = dyn Fn(&Point, f64) -> f64;

/// Closed form function $f(x, t)$.
pub struct FunctionCoefficient {
  f: Box<ScalarFn>,
  time: Cell<f64>,
}
impl FunctionCoefficient {
  pub fn new(f: impl Fn(&Point, f64) -> f64 + 'static) -> Self {
    Self {
      f: Box::new(f),
      time: Cell::new(0.0),
    }
  }
  pub fn time(&self) -> f64 {
    self.time.get()
  }
}
impl ScalarCoefficient for FunctionCoefficient {
  fn eval(&self, p: &EvalPoint) -> f64 {
    (self.f)(&p.x, self.time.get())
  }
  fn set_time(&self, t: f64) {
    self.time.set(t);
  }
}

/// Coefficient defined per element attribute. Unlisted attributes evaluate to zero.
#[derive(Default)]
pub struct PiecewiseCoefficient {
  pieces: BTreeMap<Attribute, Rc<dyn ScalarCoefficient>>,
}
impl PiecewiseCoefficient {
  pub fn new() -> Self {
    Self::default()
  }
  pub fn with(mut self, attribute: Attribute, coef: Rc<dyn ScalarCoefficient>) -> Self {
    self.pieces.insert(attribute, coef);
    self
  }
  pub fn insert(&mut self, attribute: Attribute, coef: Rc<dyn ScalarCoefficient>) {
    self.pieces.insert(attribute, coef);
  }
  pub fn attributes(&self) -> impl Iterator<Item = Attribute> + '_ {
    self.pieces.keys().copied()
  }
}
impl ScalarCoefficient for PiecewiseCoefficient {
  fn eval(&self, p: &EvalPoint) -> f64 {
    self.pieces.get(&p.attribute).map_or(0.0, |c| c.eval(p))
  }
  fn set_time(&self, t: f64) {
    self.pieces.values().for_each(|c| c.set_time(t));
  }
}

/// $a b$
pub struct ProductCoefficient {
  a: Rc<dyn ScalarCoefficient>,
  b: Rc<dyn ScalarCoefficient>,
}
impl ProductCoefficient {
  pub fn new(a: Rc<dyn ScalarCoefficient>, b: Rc<dyn ScalarCoefficient>) -> Self {
    Self { a, b }
  }
}
impl ScalarCoefficient for ProductCoefficient {
  fn eval(&self, p: &EvalPoint) -> f64 {
    self.a.eval(p) * self.b.eval(p)
  }
  fn set_time(&self, t: f64) {
    self.a.set_time(t);
    self.b.set_time(t);
  }
}

/// $a / b$
pub struct RatioCoefficient {
  numerator: Rc<dyn ScalarCoefficient>,
  denominator: Rc<dyn ScalarCoefficient>,
}
impl RatioCoefficient {
  pub fn new(numerator: Rc<dyn ScalarCoefficient>, denominator: Rc<dyn ScalarCoefficient>) -> Self {
    Self {
      numerator,
      denominator,
    }
  }
}
impl ScalarCoefficient for RatioCoefficient {
  fn eval(&self, p: &EvalPoint) -> f64 {
    self.numerator.eval(p) / self.denominator.eval(p)
  }
  fn set_time(&self, t: f64) {
    self.numerator.set_time(t);
    self.denominator.set_time(t);
  }
}

pub struct VectorConstantCoefficient {
  value: na::Vector3<f64>,
}
impl VectorConstantCoefficient {
  pub fn new(value: na::Vector3<f64>) -> Self {
    Self { value }
  }
}
impl VectorCoefficient for VectorConstantCoefficient {
  fn eval(&self, _p: &EvalPoint) -> na::Vector3<f64> {
    self.value
  }
}

type VectorFn = dyn Fn(&Point, f64) -> na::Vector3<f64>;

pub struct VectorFunctionCoefficient {
  f: Box<VectorFn>,
  time: Cell<f64>,
}
impl VectorFunctionCoefficient {
  pub fn new(f: impl Fn(&Point, f64) -> na::Vector3<f64> + 'static) -> Self {
    Self {
      f: Box::new(f),
      time: Cell::new(0.0),
    }
  }
}
impl VectorCoefficient for VectorFunctionCoefficient {
  fn eval(&self, p: &EvalPoint) -> na::Vector3<f64> {
    (self.f)(&p.x, self.time.get())
  }
  fn set_time(&self, t: f64) {
    self.time.set(t);
  }
}

#[derive(Default)]
pub struct PiecewiseVectorCoefficient {
  pieces: BTreeMap<Attribute, Rc<dyn VectorCoefficient>>,
}
impl PiecewiseVectorCoefficient {
  pub fn new() -> Self {
    Self::default()
  }
  pub fn with(mut self, attribute: Attribute, coef: Rc<dyn VectorCoefficient>) -> Self {
    self.pieces.insert(attribute, coef);
    self
  }
}
impl VectorCoefficient for PiecewiseVectorCoefficient {
  fn eval(&self, p: &EvalPoint) -> na::Vector3<f64> {
    self
      .pieces
      .get(&p.attribute)
      .map_or_else(na::Vector3::zeros, |c| c.eval(p))
  }
  fn set_time(&self, t: f64) {
    self.pieces.values().for_each(|c| c.set_time(t));
  }
}

/// $a bold(v)$
pub struct ScalarVectorProductCoefficient {
  a: Rc<dyn ScalarCoefficient>,
  v: Rc<dyn VectorCoefficient>,
}
impl ScalarVectorProductCoefficient {
  pub fn new(a: Rc<dyn ScalarCoefficient>, v: Rc<dyn VectorCoefficient>) -> Self {
    Self { a, v }
  }
}
impl VectorCoefficient for ScalarVectorProductCoefficient {
  fn eval(&self, p: &EvalPoint) -> na::Vector3<f64> {
    self.a.eval(p) * self.v.eval(p)
  }
  fn set_time(&self, t: f64) {
    self.a.set_time(t);
    self.v.set_time(t);
  }
}

/// Material properties of one region of the mesh.
pub struct Subdomain {
  pub name: String,
  pub id: Attribute,
  pub scalar_coefficients: NamedRegistry<dyn ScalarCoefficient>,
}

impl Subdomain {
  pub fn new(name: &str, id: Attribute) -> Self {
    Self {
      name: name.to_string(),
      id,
      scalar_coefficients: NamedRegistry::new("subdomain property"),
    }
  }

  pub fn with_property(mut self, name: &str, coef: Rc<dyn ScalarCoefficient>) -> Result<Self> {
    self.scalar_coefficients.register(name, coef, Ownership::Owned)?;
    Ok(self)
  }
}

/// Named scalar and vector coefficients of a problem.
pub struct Coefficients {
  pub scalars: NamedRegistry<dyn ScalarCoefficient>,
  pub vectors: NamedRegistry<dyn VectorCoefficient>,
  time: Cell<f64>,
}

impl Default for Coefficients {
  fn default() -> Self {
    Self::new()
  }
}

impl Coefficients {
  pub fn new() -> Self {
    Self {
      scalars: NamedRegistry::new("scalar coefficient"),
      vectors: NamedRegistry::new("vector coefficient"),
      time: Cell::new(0.0),
    }
  }

  /// Assembles piecewise global coefficients from per-subdomain properties.
  ///
  /// A property missing on some subdomain evaluates to zero there.
  pub fn from_subdomains(subdomains: &[Subdomain]) -> Result<Self> {
    let mut ids: Vec<_> = subdomains.iter().map(|s| s.id).collect();
    ids.sort_unstable();
    if let Some(w) = ids.windows(2).find(|w| w[0] == w[1]) {
      return Err(Error::Duplicate {
        kind: "subdomain",
        name: w[0].to_string(),
      });
    }

    let mut coefficients = Self::new();
    let mut properties: Vec<&str> = subdomains
      .iter()
      .flat_map(|s| s.scalar_coefficients.names())
      .collect();
    let mut seen = std::collections::HashSet::new();
    properties.retain(|p| seen.insert(*p));

    for property in properties {
      let mut piecewise = PiecewiseCoefficient::new();
      for subdomain in subdomains {
        if let Some(coef) = subdomain.scalar_coefficients.get(property) {
          piecewise.insert(subdomain.id, coef);
        }
      }
      coefficients
        .scalars
        .register(property, Rc::new(piecewise), Ownership::Owned)?;
    }
    Ok(coefficients)
  }

  pub fn time(&self) -> f64 {
    self.time.get()
  }

  /// Propagates the current time to every registered coefficient.
  pub fn set_time(&self, t: f64) {
    self.time.set(t);
    self.scalars.iter().for_each(|(_, c)| c.set_time(t));
    self.vectors.iter().for_each(|(_, c)| c.set_time(t));
  }

  pub fn add_scalar(&mut self, name: &str, coef: Rc<dyn ScalarCoefficient>) -> Result<()> {
    self.scalars.register(name, coef, Ownership::Owned)
  }
  pub fn add_vector(&mut self, name: &str, coef: Rc<dyn VectorCoefficient>) -> Result<()> {
    self.vectors.register(name, coef, Ownership::Owned)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn point(attribute: Attribute) -> EvalPoint {
    EvalPoint::new(Point::new(1.0, 2.0, 3.0), attribute)
  }

  #[test]
  fn set_time_reaches_nested_coefficients() {
    let mut coefficients = Coefficients::new();
    let ramp = Rc::new(FunctionCoefficient::new(|x, t| x[0] * t));
    let two = Rc::new(ConstantCoefficient::new(2.0));
    coefficients
      .add_scalar("scaled", Rc::new(ProductCoefficient::new(two, ramp.clone())))
      .unwrap();

    coefficients.set_time(0.5);
    assert_eq!(ramp.time(), 0.5);
    assert_eq!(coefficients.time(), 0.5);
    let scaled = coefficients.scalars.get("scaled").unwrap();
    assert_eq!(scaled.eval(&point(1)), 1.0);
  }

  #[test]
  fn subdomains_build_piecewise_properties() {
    let copper = Subdomain::new("copper", 1)
      .with_property("conductivity", Rc::new(ConstantCoefficient::new(5.0)))
      .unwrap();
    let air = Subdomain::new("air", 2)
      .with_property("conductivity", Rc::new(ConstantCoefficient::new(1.0)))
      .unwrap()
      .with_property("permeability", Rc::new(ConstantCoefficient::new(3.0)))
      .unwrap();
    let coefficients = Coefficients::from_subdomains(&[copper, air]).unwrap();

    let sigma = coefficients.scalars.get("conductivity").unwrap();
    assert_eq!(sigma.eval(&point(1)), 5.0);
    assert_eq!(sigma.eval(&point(2)), 1.0);
    let mu = coefficients.scalars.get("permeability").unwrap();
    assert_eq!(mu.eval(&point(1)), 0.0);
    assert_eq!(mu.eval(&point(2)), 3.0);
  }

  #[test]
  fn duplicate_subdomain_ids_are_rejected() {
    let result = Coefficients::from_subdomains(&[Subdomain::new("a", 1), Subdomain::new("b", 1)]);
    assert!(matches!(result, Err(Error::Duplicate { .. })));
  }
}
