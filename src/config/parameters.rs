use serde::{Deserialize, Serialize};

use crate::controller::Acceptance;
use crate::errors::{DenimError, Result};
use crate::stats::ErrorMetric;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Parameters {
    /// Length of the simulated period in days.
    pub days_follow_up: f64,

    /// Initial time step in days. It is halved until the error tolerance is met.
    pub time_step: f64,

    /// Maximum allowed difference between trajectories at consecutive resolutions.
    pub error_tolerance: f64,

    /// The number of times the time step may be halved before giving up.
    #[serde(default = "default_max_refinements")]
    pub max_refinements: usize,

    /// Survival below which hazard tables are cut off.
    #[serde(default = "default_tail_tolerance")]
    pub tail_tolerance: f64,

    /// Which of the two trajectories of the accepted round is returned.
    #[serde(default)]
    pub acceptance: Acceptance,

    #[serde(default)]
    pub metric: ErrorMetric,
}

fn default_max_refinements() -> usize {
    6
}

fn default_tail_tolerance() -> f64 {
    1e-10
}

impl Parameters {
    pub fn new(days_follow_up: f64, time_step: f64, error_tolerance: f64) -> Self {
        Self {
            days_follow_up,
            time_step,
            error_tolerance,
            max_refinements: default_max_refinements(),
            tail_tolerance: default_tail_tolerance(),
            acceptance: Acceptance::default(),
            metric: ErrorMetric::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.days_follow_up.is_finite() && self.days_follow_up > 0.) {
            return Err(DenimError::InvalidParameter(format!(
                "days of follow up must be positive, got {}",
                self.days_follow_up
            )));
        }
        if !(self.time_step.is_finite() && self.time_step > 0.) {
            return Err(DenimError::InvalidParameter(format!(
                "time step must be positive, got {}",
                self.time_step
            )));
        }
        if !(self.error_tolerance.is_finite() && self.error_tolerance > 0.) {
            return Err(DenimError::InvalidParameter(format!(
                "error tolerance must be positive, got {}",
                self.error_tolerance
            )));
        }
        if self.max_refinements == 0 {
            return Err(DenimError::InvalidParameter(
                "at least one refinement is needed to estimate the error".to_string(),
            ));
        }
        if !(0. ..1.).contains(&self.tail_tolerance) {
            return Err(DenimError::InvalidParameter(format!(
                "tail tolerance must be in [0, 1), got {}",
                self.tail_tolerance
            )));
        }
        Ok(())
    }

    /// Number of steps needed to cover the follow up period at a given time step.
    pub fn n_steps(&self, time_step: f64) -> usize {
        let steps = self.days_follow_up / time_step;
        let rounded = steps.round();
        if (steps - rounded).abs() > 1e-9 * steps.max(1.) {
            log::warn!(
                "{} days are not a multiple of the time step {}, simulating {} steps.",
                self.days_follow_up,
                time_step,
                rounded.max(1.)
            );
        }
        (rounded as usize).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let parameters: Parameters =
            serde_yaml::from_str("{days_follow_up: 100, time_step: 0.5, error_tolerance: 0.01}")
                .unwrap();
        assert_eq!(parameters, Parameters::new(100., 0.5, 0.01));
        assert_eq!(parameters.max_refinements, 6);
        assert_eq!(parameters.acceptance, Acceptance::Coarse);
        assert_eq!(parameters.metric, ErrorMetric::Absolute);
    }

    #[test]
    fn validate() {
        assert!(Parameters::new(100., 0.5, 0.01).validate().is_ok());
        let no_tail = Parameters {
            tail_tolerance: 0.,
            max_refinements: 1,
            ..Parameters::new(100., 0.5, 0.01)
        };
        assert!(no_tail.validate().is_ok());
        for parameters in [
            Parameters::new(0., 0.5, 0.01),
            Parameters::new(100., -0.5, 0.01),
            Parameters::new(100., 0.5, 0.),
            Parameters::new(f64::NAN, 0.5, 0.01),
            Parameters {
                max_refinements: 0,
                ..Parameters::new(100., 0.5, 0.01)
            },
            Parameters {
                tail_tolerance: 1.,
                ..Parameters::new(100., 0.5, 0.01)
            },
            Parameters {
                tail_tolerance: -0.1,
                ..Parameters::new(100., 0.5, 0.01)
            },
        ] {
            assert!(matches!(
                parameters.validate(),
                Err(DenimError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn n_steps() {
        let parameters = Parameters::new(10., 1., 0.01);
        assert_eq!(parameters.n_steps(1.), 10);
        assert_eq!(parameters.n_steps(0.25), 40);
        assert_eq!(parameters.n_steps(3.), 3);
        assert_eq!(parameters.n_steps(50.), 1);
    }
}
