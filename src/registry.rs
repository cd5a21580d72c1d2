//! Name-keyed registries for spaces, fields, coefficients and the like.

use crate::{
  boundary_conditions::BcMap,
  coefficients::Coefficients,
  error::{Error, Result},
  fe::{gridfunction::GridFunction, FeSpace},
};

use indexmap::IndexMap;
use std::{cell::RefCell, rc::Rc};

/// Provenance of a registered object.
///
/// `Owned` entries were constructed by the component holding the registry,
/// `Borrowed` entries were handed in from an enclosing problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
  Owned,
  Borrowed,
}

struct Entry<T: ?Sized> {
  value: Rc<T>,
  ownership: Ownership,
}

impl<T: ?Sized> Clone for Entry<T> {
  fn clone(&self) -> Self {
    Self {
      value: Rc::clone(&self.value),
      ownership: self.ownership,
    }
  }
}

/// Insertion ordered map from unique names to shared objects.
///
/// Registering an already taken name is rejected. Callers wanting
/// "register a default if absent" query [`NamedRegistry::has`] first.
pub struct NamedRegistry<T: ?Sized> {
  kind: &'static str,
  entries: IndexMap<String, Entry<T>>,
}

impl<T: ?Sized> Clone for NamedRegistry<T> {
  fn clone(&self) -> Self {
    Self {
      kind: self.kind,
      entries: self.entries.clone(),
    }
  }
}

impl<T: ?Sized> NamedRegistry<T> {
  pub fn new(kind: &'static str) -> Self {
    Self {
      kind,
      entries: IndexMap::new(),
    }
  }

  pub fn kind(&self) -> &'static str {
    self.kind
  }

  pub fn register(&mut self, name: &str, value: Rc<T>, ownership: Ownership) -> Result<()> {
    if self.entries.contains_key(name) {
      return Err(Error::Duplicate {
        kind: self.kind,
        name: name.to_string(),
      });
    }
    self
      .entries
      .insert(name.to_string(), Entry { value, ownership });
    Ok(())
  }

  /// Not-found is signalled by `None`.
  pub fn get(&self, name: &str) -> Option<Rc<T>> {
    self.entries.get(name).map(|e| Rc::clone(&e.value))
  }

  /// Like [`Self::get`], but a missing name is a configuration error
  /// naming the requesting component.
  pub fn require(&self, name: &str, requester: &str) -> Result<Rc<T>> {
    self
      .get(name)
      .ok_or_else(|| Error::missing(self.kind, name, requester))
  }

  pub fn has(&self, name: &str) -> bool {
    self.entries.contains_key(name)
  }

  pub fn ownership(&self, name: &str) -> Option<Ownership> {
    self.entries.get(name).map(|e| e.ownership)
  }

  pub fn deregister(&mut self, name: &str) -> Option<Rc<T>> {
    self.entries.shift_remove(name).map(|e| e.value)
  }

  /// Drops every owned entry, keeping borrowed ones.
  pub fn release_owned(&mut self) {
    self.entries.retain(|_, e| e.ownership == Ownership::Borrowed);
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.entries.keys().map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &Rc<T>)> {
    self.entries.iter().map(|(k, e)| (k.as_str(), &e.value))
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

impl<T> NamedRegistry<T> {
  pub fn register_owned(&mut self, name: &str, value: T) -> Result<Rc<T>> {
    let value = Rc::new(value);
    self.register(name, Rc::clone(&value), Ownership::Owned)?;
    Ok(value)
  }
}

pub type FeSpaces = NamedRegistry<FeSpace>;
pub type GridFunctions = NamedRegistry<RefCell<GridFunction>>;

pub fn new_fespaces() -> FeSpaces {
  NamedRegistry::new("FE space")
}
pub fn new_gridfunctions() -> GridFunctions {
  NamedRegistry::new("grid function")
}

/// Borrowed view of the registries from which components resolve the
/// names they were configured with.
#[derive(Clone, Copy)]
pub struct Bindings<'a> {
  pub gridfunctions: &'a GridFunctions,
  pub fespaces: &'a FeSpaces,
  pub bc_map: &'a BcMap,
  pub coefficients: &'a Coefficients,
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn duplicate_registration_is_rejected() {
    let mut registry: NamedRegistry<f64> = NamedRegistry::new("value");
    registry.register_owned("a", 1.0).unwrap();
    let err = registry.register_owned("a", 2.0).unwrap_err();
    assert!(matches!(err, Error::Duplicate { name, .. } if name == "a"));
    assert_eq!(*registry.get("a").unwrap(), 1.0);
    assert_eq!(registry.len(), 1);
  }

  #[test]
  fn lookup_and_ownership() {
    let mut registry: NamedRegistry<f64> = NamedRegistry::new("value");
    registry.register_owned("b", 2.0).unwrap();
    registry
      .register("a", Rc::new(1.0), Ownership::Borrowed)
      .unwrap();

    assert!(registry.get("c").is_none());
    assert!(matches!(
      registry.require("c", "test"),
      Err(Error::Missing { name, requester, .. }) if name == "c" && requester == "test"
    ));
    assert_eq!(registry.names().collect::<Vec<_>>(), vec!["b", "a"]);
    assert_eq!(registry.ownership("a"), Some(Ownership::Borrowed));

    registry.release_owned();
    assert!(!registry.has("b"));
    assert!(registry.has("a"));
    assert!(registry.deregister("a").is_some());
    assert!(registry.is_empty());
  }

  #[test]
  fn unsized_entries() {
    let mut registry: NamedRegistry<dyn Fn(f64) -> f64> = NamedRegistry::new("function");
    registry
      .register("double", Rc::new(|x: f64| 2.0 * x), Ownership::Owned)
      .unwrap();
    assert_eq!(registry.get("double").unwrap()(3.0), 6.0);
  }
}
