//! Typed key-value configuration bags.

use crate::error::{Error, Result};

use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
  Str(String),
  Int(i64),
  Float(f64),
  Bool(bool),
  Params(InputParameters),
}

impl ParamValue {
  fn type_name(&self) -> &'static str {
    match self {
      Self::Str(_) => "string",
      Self::Int(_) => "integer",
      Self::Float(_) => "float",
      Self::Bool(_) => "bool",
      Self::Params(_) => "parameter set",
    }
  }
}

impl From<&str> for ParamValue {
  fn from(v: &str) -> Self {
    Self::Str(v.to_string())
  }
}
impl From<String> for ParamValue {
  fn from(v: String) -> Self {
    Self::Str(v)
  }
}
impl From<i64> for ParamValue {
  fn from(v: i64) -> Self {
    Self::Int(v)
  }
}
impl From<i32> for ParamValue {
  fn from(v: i32) -> Self {
    Self::Int(v as i64)
  }
}
impl From<usize> for ParamValue {
  fn from(v: usize) -> Self {
    Self::Int(v as i64)
  }
}
impl From<f64> for ParamValue {
  fn from(v: f64) -> Self {
    Self::Float(v)
  }
}
impl From<bool> for ParamValue {
  fn from(v: bool) -> Self {
    Self::Bool(v)
  }
}
impl From<InputParameters> for ParamValue {
  fn from(v: InputParameters) -> Self {
    Self::Params(v)
  }
}

/// Named configuration values handed to kernels, sources and solvers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputParameters {
  values: IndexMap<String, ParamValue>,
}

impl InputParameters {
  pub fn new() -> Self {
    Self::default()
  }

  /// Builder style setter.
  pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
    self.set(name, value);
    self
  }

  pub fn set(&mut self, name: &str, value: impl Into<ParamValue>) {
    self.values.insert(name.to_string(), value.into());
  }

  pub fn has(&self, name: &str) -> bool {
    self.values.contains_key(name)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.values.keys().map(String::as_str)
  }

  fn require(&self, name: &str) -> Result<&ParamValue> {
    self
      .values
      .get(name)
      .ok_or_else(|| Error::parameter(name, "required parameter is missing"))
  }

  fn type_error(name: &str, expected: &str, found: &ParamValue) -> Error {
    Error::parameter(
      name,
      format!("expected {expected}, found {}", found.type_name()),
    )
  }

  pub fn get_str(&self, name: &str) -> Result<&str> {
    match self.require(name)? {
      ParamValue::Str(s) => Ok(s),
      other => Err(Self::type_error(name, "string", other)),
    }
  }

  pub fn get_int(&self, name: &str) -> Result<i64> {
    match self.require(name)? {
      ParamValue::Int(i) => Ok(*i),
      other => Err(Self::type_error(name, "integer", other)),
    }
  }

  pub fn get_usize(&self, name: &str) -> Result<usize> {
    let i = self.get_int(name)?;
    usize::try_from(i).map_err(|_| Error::parameter(name, format!("expected non-negative, found {i}")))
  }

  /// Integers are accepted where floats are expected.
  pub fn get_float(&self, name: &str) -> Result<f64> {
    match self.require(name)? {
      ParamValue::Float(f) => Ok(*f),
      ParamValue::Int(i) => Ok(*i as f64),
      other => Err(Self::type_error(name, "float", other)),
    }
  }

  pub fn get_bool(&self, name: &str) -> Result<bool> {
    match self.require(name)? {
      ParamValue::Bool(b) => Ok(*b),
      other => Err(Self::type_error(name, "bool", other)),
    }
  }

  pub fn get_params(&self, name: &str) -> Result<&InputParameters> {
    match self.require(name)? {
      ParamValue::Params(p) => Ok(p),
      other => Err(Self::type_error(name, "parameter set", other)),
    }
  }

  pub fn get_str_or<'a>(&'a self, name: &str, default: &'a str) -> Result<&'a str> {
    if self.has(name) {
      self.get_str(name)
    } else {
      Ok(default)
    }
  }

  pub fn get_int_or(&self, name: &str, default: i64) -> Result<i64> {
    if self.has(name) {
      self.get_int(name)
    } else {
      Ok(default)
    }
  }

  pub fn get_usize_or(&self, name: &str, default: usize) -> Result<usize> {
    if self.has(name) {
      self.get_usize(name)
    } else {
      Ok(default)
    }
  }

  pub fn get_float_or(&self, name: &str, default: f64) -> Result<f64> {
    if self.has(name) {
      self.get_float(name)
    } else {
      Ok(default)
    }
  }

  pub fn get_bool_or(&self, name: &str, default: bool) -> Result<bool> {
    if self.has(name) {
      self.get_bool(name)
    } else {
      Ok(default)
    }
  }

  /// Missing nested sets resolve to an empty one.
  pub fn get_params_or_empty(&self, name: &str) -> Result<InputParameters> {
    if self.has(name) {
      self.get_params(name).cloned()
    } else {
      Ok(InputParameters::new())
    }
  }
}
