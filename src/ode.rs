//! Implicit time integration of $dot(x) = f(x, t)$.

use crate::error::Result;

/// Operator that can solve for the time derivative implicitly.
pub trait TimeDependentOperator {
  fn size(&self) -> usize;
  fn time(&self) -> f64;
  fn set_time(&mut self, t: f64);
  /// Solves $k = f(x + "dt" k, t)$ for $k$ at the current time.
  fn implicit_solve(&mut self, dt: f64, x: &na::DVector<f64>, k: &mut na::DVector<f64>) -> Result<()>;
}

pub trait OdeSolver {
  /// Advances `x` from `t` to `t + dt`.
  fn step(
    &mut self,
    op: &mut dyn TimeDependentOperator,
    x: &mut na::DVector<f64>,
    t: &mut f64,
    dt: f64,
  ) -> Result<()>;
}

/// $x_(n+1) = x_n + "dt" k$ with $k = f(x_(n+1), t_(n+1))$.
#[derive(Debug, Default)]
pub struct BackwardEuler {
  k: na::DVector<f64>,
}

impl BackwardEuler {
  pub fn new() -> Self {
    Self::default()
  }
}

impl OdeSolver for BackwardEuler {
  fn step(
    &mut self,
    op: &mut dyn TimeDependentOperator,
    x: &mut na::DVector<f64>,
    t: &mut f64,
    dt: f64,
  ) -> Result<()> {
    if self.k.len() != x.len() {
      self.k = na::DVector::zeros(x.len());
    }
    op.set_time(*t + dt);
    op.implicit_solve(dt, x, &mut self.k)?;
    x.axpy(dt, &self.k, 1.0);
    *t += dt;
    Ok(())
  }
}

#[cfg(test)]
mod test {
  use super::*;
  use approx::assert_relative_eq;

  /// $dot(x) = -lambda x$
  struct Decay {
    lambda: f64,
    t: f64,
  }
  impl TimeDependentOperator for Decay {
    fn size(&self) -> usize {
      1
    }
    fn time(&self) -> f64 {
      self.t
    }
    fn set_time(&mut self, t: f64) {
      self.t = t;
    }
    fn implicit_solve(&mut self, dt: f64, x: &na::DVector<f64>, k: &mut na::DVector<f64>) -> Result<()> {
      *k = x * (-self.lambda / (1.0 + self.lambda * dt));
      Ok(())
    }
  }

  #[test]
  fn backward_euler_decay() {
    let mut op = Decay { lambda: 2.0, t: 0.0 };
    let mut solver = BackwardEuler::new();
    let mut x = na::DVector::from_element(1, 1.0);
    let mut t = 0.0;
    for _ in 0..4 {
      solver.step(&mut op, &mut x, &mut t, 0.25).unwrap();
    }
    assert_relative_eq!(t, 1.0);
    assert_relative_eq!(op.time(), 1.0);
    assert_relative_eq!(x[0], 1.5f64.powi(-4), epsilon = 1e-14);
  }
}
