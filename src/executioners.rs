//! Drivers running a constructed problem to completion.

use crate::{
  error::{Error, Result},
  params::InputParameters,
  problem::Problem,
};

/// Steps below this fraction of the nominal step are merged into the previous one.
const END_TIME_SLACK: f64 = 1e-9;

/// Backward Euler from `StartTime` to `EndTime` with constant `TimeStep`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransientExecutioner {
  pub dt: f64,
  pub start_time: f64,
  pub end_time: f64,
  /// Every how many steps a summary is logged.
  pub visualisation_steps: usize,
}

impl TransientExecutioner {
  /// Reads `TimeStep`, `StartTime` (default 0), `EndTime` and
  /// `VisualisationSteps` (default 1).
  pub fn new(params: &InputParameters) -> Result<Self> {
    let executioner = Self {
      dt: params.get_float("TimeStep")?,
      start_time: params.get_float_or("StartTime", 0.0)?,
      end_time: params.get_float("EndTime")?,
      visualisation_steps: params.get_usize_or("VisualisationSteps", 1)?.max(1),
    };
    if !(executioner.dt > 0.0) {
      return Err(Error::parameter("TimeStep", "must be positive"));
    }
    if executioner.end_time < executioner.start_time {
      return Err(Error::parameter("EndTime", "lies before StartTime"));
    }
    Ok(executioner)
  }

  /// Number of steps taken to reach the end time.
  pub fn nsteps(&self) -> usize {
    let span = (self.end_time - self.start_time) / self.dt;
    (span - END_TIME_SLACK).ceil().max(0.0) as usize
  }

  /// Steps `problem` to the end time, shortening the last step to land on it.
  pub fn execute(&self, problem: &mut Problem) -> Result<()> {
    problem.set_time(self.start_time);
    let nsteps = self.nsteps();
    for it in 1..=nsteps {
      let t = problem.time();
      let dt = self.dt.min(self.end_time - t);
      problem.step(dt)?;
      if it % self.visualisation_steps == 0 || it == nsteps {
        tracing::info!("step {it}/{nsteps}, t = {:.6e}", problem.time());
      }
    }
    Ok(())
  }
}

/// Single steady solve.
#[derive(Debug, Clone, Default)]
pub struct SteadyExecutioner;

impl SteadyExecutioner {
  pub fn new() -> Self {
    Self
  }

  pub fn execute(&self, problem: &mut Problem) -> Result<()> {
    problem.solve_steady()?;
    tracing::info!("steady solve finished");
    Ok(())
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn params(dt: f64, end: f64) -> InputParameters {
    InputParameters::new()
      .with("TimeStep", dt)
      .with("EndTime", end)
  }

  #[test]
  fn step_count() {
    assert_eq!(TransientExecutioner::new(&params(0.1, 0.3)).unwrap().nsteps(), 3);
    assert_eq!(TransientExecutioner::new(&params(0.25, 1.0)).unwrap().nsteps(), 4);
    assert_eq!(TransientExecutioner::new(&params(0.4, 1.0)).unwrap().nsteps(), 3);
    assert_eq!(TransientExecutioner::new(&params(0.4, 0.0)).unwrap().nsteps(), 0);
  }

  #[test]
  fn invalid_times_are_rejected() {
    assert!(TransientExecutioner::new(&params(0.0, 1.0)).is_err());
    assert!(TransientExecutioner::new(&params(0.1, 1.0).with("StartTime", 2.0)).is_err());
    assert!(TransientExecutioner::new(&InputParameters::new().with("TimeStep", 0.1)).is_err());
  }
}
