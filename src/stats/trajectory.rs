use serde::{Deserialize, Serialize};

use crate::core::Trajectory;
use crate::errors::{DenimError, Result};

/// How the difference between two values of a trajectory is measured.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorMetric {
    #[default]
    Absolute,
    /// Difference relative to the larger magnitude, zero if both values are zero.
    Relative,
}

impl ErrorMetric {
    #[inline]
    pub fn error(&self, a: f64, b: f64) -> f64 {
        match self {
            ErrorMetric::Absolute => (a - b).abs(),
            ErrorMetric::Relative => {
                let scale = a.abs().max(b.abs());
                if scale == 0. {
                    0.
                } else {
                    (a - b).abs() / scale
                }
            }
        }
    }
}

/// Trait extension to compare trajectories computed at different resolutions
pub trait TrajectoryDistance {
    fn distance(&self, finer: &Self, metric: ErrorMetric) -> Result<f64>;
}

impl TrajectoryDistance for Trajectory {
    /// Maximum difference between this trajectory and one computed at half the time step.
    ///
    /// Step `k` of this trajectory is compared with step `2k` of `finer`, for every stratum and
    /// compartment.
    fn distance(&self, finer: &Self, metric: ErrorMetric) -> Result<f64> {
        if self.strata() != finer.strata() || self.compartments() != finer.compartments() {
            return Err(DenimError::DimensionMismatch(
                "trajectories have different strata or compartments".to_string(),
            ));
        }
        if (finer.time_step() * 2. - self.time_step()).abs() > 1e-12 * self.time_step() {
            return Err(DenimError::DimensionMismatch(format!(
                "time step {} is not half of {}",
                finer.time_step(),
                self.time_step()
            )));
        }
        if self.is_empty() || finer.len() < 2 * (self.len() - 1) + 1 {
            return Err(DenimError::DimensionMismatch(format!(
                "{} steps at the finer resolution do not cover {} coarse steps",
                finer.len(),
                self.len()
            )));
        }

        let mut distance: f64 = 0.;
        for step in 0..self.len() {
            let coarse = self.at(step);
            let fine = finer.at(2 * step);
            for (a, b) in coarse.iter().zip(fine.iter()) {
                distance = distance.max(metric.error(*a, *b));
            }
        }
        Ok(distance)
    }
}
