use thiserror::Error;

/// Errors raised while building or running a problem.
///
/// Every variant except solver non-convergence (which is only logged) is
/// fatal: it is propagated to the driver, which aborts the run.
#[derive(Debug, Error)]
pub enum Error {
  #[error("{kind} `{name}` not found in registry when initialising {requester}")]
  Missing {
    kind: &'static str,
    name: String,
    requester: String,
  },
  #[error("{kind} `{name}` is already registered")]
  Duplicate { kind: &'static str, name: String },
  #[error("variable `{0}` has not been added to the equation system")]
  UnknownVariable(String),
  #[error("parameter `{name}`: {reason}")]
  Parameter { name: String, reason: String },
  #[error("unsupported finite element collection `{0}`")]
  UnsupportedElement(String),
  #[error("invalid mesh: {0}")]
  Mesh(String),
  #[error("numerical degeneracy in {context}: {reason}")]
  Degenerate { context: String, reason: String },
  #[error("dimension mismatch in {context}: expected {expected}, found {found}")]
  DimensionMismatch {
    context: &'static str,
    expected: usize,
    found: usize,
  },
  #[error("linear solver failure: {0}")]
  Solver(String),
  #[error("{0} used before initialisation")]
  Uninitialized(String),
  #[error("problem construction out of order: {0}")]
  BuildOrder(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
  pub fn missing(kind: &'static str, name: &str, requester: &str) -> Self {
    Self::Missing {
      kind,
      name: name.to_string(),
      requester: requester.to_string(),
    }
  }

  pub fn degenerate(context: impl Into<String>, reason: impl Into<String>) -> Self {
    Self::Degenerate {
      context: context.into(),
      reason: reason.into(),
    }
  }

  pub fn parameter(name: &str, reason: impl Into<String>) -> Self {
    Self::Parameter {
      name: name.to_string(),
      reason: reason.into(),
    }
  }
}
