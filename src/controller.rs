//! Adaptive choice of the simulation time step.
//!
//! The [`ErrorController`] runs a model at a time step and at half of it and compares the two
//! trajectories on the coarse grid. If they differ by more than the error tolerance, the time
//! step is halved and the comparison repeated with the finer trajectory as the new coarse one.

use serde::{Deserialize, Serialize};

use crate::config::Parameters;
use crate::core::{Model, Trajectory};
use crate::errors::{ConvergenceFailure, DenimError, Result};
use crate::simulation::Simulation;
use crate::stats::TrajectoryDistance;

/// Which trajectory of the accepted pair is returned.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Acceptance {
    #[default]
    Coarse,
    Fine,
}

/// Error between the trajectories at `time_step` and `time_step / 2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefinementRound {
    pub time_step: f64,
    pub error: f64,
}

#[derive(Debug, Clone)]
pub struct Accepted {
    pub trajectory: Trajectory,
    /// Time step of the returned trajectory.
    pub time_step: f64,
    pub error: f64,
    pub history: Vec<RefinementRound>,
}

pub struct ErrorController<'a> {
    model: &'a Model,
    parameters: Parameters,
}

impl<'a> ErrorController<'a> {
    pub fn new(model: &'a Model, parameters: &Parameters) -> Result<Self> {
        parameters.validate()?;
        Ok(Self {
            model,
            parameters: parameters.clone(),
        })
    }

    pub fn run(&self) -> Result<Accepted> {
        self.run_with(|_| {})
    }

    /// Refine the time step until the error tolerance is met, calling `on_round` after every
    /// comparison.
    pub fn run_with<F>(&self, mut on_round: F) -> Result<Accepted>
    where
        F: FnMut(&RefinementRound),
    {
        let tolerance = self.parameters.error_tolerance;
        let mut time_step = self.parameters.time_step;
        let mut n_steps = self.parameters.n_steps(time_step);
        let mut history: Vec<RefinementRound> = Vec::new();

        let (mut coarse, mut fine) = self.first_pair(time_step, n_steps)?;
        loop {
            let error = coarse.distance(&fine, self.parameters.metric)?;
            let round = RefinementRound { time_step, error };
            log::info!(
                "Error between time steps {} and {}: {:e}",
                time_step,
                time_step / 2.,
                error
            );
            history.push(round);
            on_round(&round);

            if error <= tolerance {
                let (trajectory, time_step) = match self.parameters.acceptance {
                    Acceptance::Coarse => (coarse, time_step),
                    Acceptance::Fine => (fine, time_step / 2.),
                };
                log::info!("Accepted time step {time_step}.");
                return Ok(Accepted {
                    trajectory,
                    time_step,
                    error,
                    history,
                });
            }

            if history.len() >= self.parameters.max_refinements {
                log::error!(
                    "No convergence after {} refinements, error {:e} exceeds tolerance {:e}.",
                    history.len(),
                    error,
                    tolerance
                );
                return Err(DenimError::ConvergenceFailure(Box::new(ConvergenceFailure {
                    time_step: time_step / 2.,
                    error,
                    tolerance,
                    history,
                    trajectory: fine,
                })));
            }

            time_step /= 2.;
            n_steps *= 2;
            coarse = fine;
            fine = self.simulate(time_step / 2., n_steps * 2)?;
        }
    }

    fn simulate(&self, time_step: f64, n_steps: usize) -> Result<Trajectory> {
        let simulation = Simulation::new(
            self.model,
            time_step,
            n_steps,
            self.parameters.tail_tolerance,
        )?;
        Ok(simulation.run())
    }

    #[cfg(feature = "parallel")]
    fn first_pair(&self, time_step: f64, n_steps: usize) -> Result<(Trajectory, Trajectory)> {
        let (coarse, fine) = rayon::join(
            || self.simulate(time_step, n_steps),
            || self.simulate(time_step / 2., n_steps * 2),
        );
        Ok((coarse?, fine?))
    }

    #[cfg(not(feature = "parallel"))]
    fn first_pair(&self, time_step: f64, n_steps: usize) -> Result<(Trajectory, Trajectory)> {
        let coarse = self.simulate(time_step, n_steps)?;
        let fine = self.simulate(time_step / 2., n_steps * 2)?;
        Ok((coarse, fine))
    }
}
