//! Dwell-time distributions and their discretization into per-step hazards.
//!
//! A [`Distribution`] describes how long an individual stays in a compartment. The simulation
//! never samples from it. Instead, the survival function is discretized at the simulation time
//! step into a [`HazardTable`]: the probability of leaving during the next step given that an
//! individual has already stayed `k` steps.

use serde::{Deserialize, Deserializer, Serialize};

use super::special::gamma_q;
use crate::errors::{DenimError, Result};

/// Hazards further outside of [0, 1] than this are rejected instead of clamped.
const HAZARD_EPSILON: f64 = 1e-9;

/// Upper bound on the number of entries in a hazard table.
const MAX_TABLE_LENGTH: usize = 10_000_000;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Distribution {
    Exponential { rate: f64 },
    Gamma { scale: f64, shape: f64 },
    Weibull { scale: f64, shape: f64 },
    Nonparametric(WaitingTime),
}

/// Empirical waiting-time distribution.
///
/// Entry `k` of the table is the probability of leaving during the `k`-th bin after entering.
/// Each bin spans `bin_width` days.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct WaitingTime {
    weights: Vec<f64>,
    bin_width: f64,
}

fn default_bin_width() -> f64 {
    1.
}

impl<'de> Deserialize<'de> for WaitingTime {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawWaitingTime {
            weights: Vec<f64>,
            #[serde(default = "default_bin_width")]
            bin_width: f64,
        }

        let raw = RawWaitingTime::deserialize(deserializer)?;
        WaitingTime::with_bin_width(raw.weights, raw.bin_width)
            .map_err(|e| serde::de::Error::custom(format!("{}", e)))
    }
}

impl WaitingTime {
    pub fn new(weights: Vec<f64>) -> Result<Self> {
        Self::with_bin_width(weights, default_bin_width())
    }

    /// Create a waiting-time table and normalize it to a probability mass function.
    pub fn with_bin_width(mut weights: Vec<f64>, bin_width: f64) -> Result<Self> {
        if weights.is_empty() {
            return Err(DenimError::InvalidDistribution(
                "waiting-time table is empty".to_string(),
            ));
        }
        if let Some(weight) = weights.iter().find(|w| !w.is_finite() || **w < 0.) {
            return Err(DenimError::InvalidDistribution(format!(
                "waiting-time table contains invalid weight {weight}"
            )));
        }
        if !(bin_width.is_finite() && bin_width > 0.) {
            return Err(DenimError::InvalidDistribution(format!(
                "bin width must be positive, got {bin_width}"
            )));
        }

        let sum: f64 = weights.iter().sum();
        if sum <= 0. {
            return Err(DenimError::InvalidDistribution(
                "waiting-time table has no positive weight".to_string(),
            ));
        }
        if sum != 1. {
            weights.iter_mut().for_each(|w| *w /= sum);
        }

        Ok(Self { weights, bin_width })
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn bin_width(&self) -> f64 {
        self.bin_width
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Probability of leaving during bin `k` given survival through the first `k` bins.
    pub fn hazard(&self, k: usize) -> f64 {
        if k >= self.weights.len() {
            return 1.;
        }
        let survival: f64 = 1. - self.weights[..k].iter().sum::<f64>();
        if survival <= 0. {
            return 1.;
        }
        (self.weights[k] / survival).clamp(0., 1.)
    }

    /// Survival function with the CDF interpolated linearly inside each bin.
    pub fn survival(&self, t: f64) -> f64 {
        if t <= 0. {
            return 1.;
        }
        let position = t / self.bin_width;
        let bin = position.floor() as usize;
        if bin >= self.weights.len() {
            return 0.;
        }
        let before: f64 = self.weights[..bin].iter().sum();
        let within = self.weights[bin] * (position - bin as f64);
        (1. - before - within).max(0.)
    }

    /// Time after which nobody remains in the compartment.
    pub fn support(&self) -> f64 {
        self.weights.len() as f64 * self.bin_width
    }

    pub fn mean(&self) -> f64 {
        // uniform within each bin
        self.weights
            .iter()
            .enumerate()
            .map(|(k, w)| w * (k as f64 + 0.5) * self.bin_width)
            .sum()
    }
}

impl Distribution {
    pub fn exponential(rate: f64) -> Result<Self> {
        let distribution = Distribution::Exponential { rate };
        distribution.validate()?;
        Ok(distribution)
    }

    pub fn gamma(scale: f64, shape: f64) -> Result<Self> {
        let distribution = Distribution::Gamma { scale, shape };
        distribution.validate()?;
        Ok(distribution)
    }

    pub fn weibull(scale: f64, shape: f64) -> Result<Self> {
        let distribution = Distribution::Weibull { scale, shape };
        distribution.validate()?;
        Ok(distribution)
    }

    pub fn nonparametric(weights: Vec<f64>) -> Result<Self> {
        Ok(Distribution::Nonparametric(WaitingTime::new(weights)?))
    }

    /// Check the parameters. Distributions read from configuration files bypass the
    /// constructors, so models call this before using them.
    pub fn validate(&self) -> Result<()> {
        let check = |name: &str, value: f64| {
            if value.is_finite() && value > 0. {
                Ok(())
            } else {
                Err(DenimError::InvalidDistribution(format!(
                    "{} {name} must be positive and finite, got {value}",
                    self.name()
                )))
            }
        };
        match self {
            Distribution::Exponential { rate } => check("rate", *rate),
            Distribution::Gamma { scale, shape } | Distribution::Weibull { scale, shape } => {
                check("scale", *scale)?;
                check("shape", *shape)
            }
            // normalized on construction
            Distribution::Nonparametric(_) => Ok(()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Distribution::Exponential { .. } => "exponential",
            Distribution::Gamma { .. } => "gamma",
            Distribution::Weibull { .. } => "weibull",
            Distribution::Nonparametric(_) => "nonparametric",
        }
    }

    /// Probability of staying longer than `t` days.
    pub fn survival(&self, t: f64) -> f64 {
        if t <= 0. {
            return 1.;
        }
        match self {
            Distribution::Exponential { rate } => (-rate * t).exp(),
            Distribution::Gamma { scale, shape } => gamma_q(*shape, t / scale),
            Distribution::Weibull { scale, shape } => (-(t / scale).powf(*shape)).exp(),
            Distribution::Nonparametric(waiting_time) => waiting_time.survival(t),
        }
    }

    pub fn mean(&self) -> f64 {
        match self {
            Distribution::Exponential { rate } => 1. / rate,
            Distribution::Gamma { scale, shape } => scale * shape,
            Distribution::Weibull { scale, shape } => {
                scale * super::special::ln_gamma(1. + 1. / shape).exp()
            }
            Distribution::Nonparametric(waiting_time) => waiting_time.mean(),
        }
    }

    /// Whether the hazard is independent of the time already spent in the compartment.
    pub fn is_memoryless(&self) -> bool {
        matches!(self, Distribution::Exponential { .. })
    }

    /// Probability of leaving during step `k + 1` given survival through `k` steps of length
    /// `time_step`.
    pub fn hazard(&self, k: usize, time_step: f64) -> Result<f64> {
        let before = self.survival(k as f64 * time_step);
        let after = self.survival((k + 1) as f64 * time_step);
        if before <= 0. {
            return Ok(1.);
        }
        check_hazard(1. - after / before)
    }

    /// Discretize the distribution at the given time step.
    ///
    /// The table ends once the survival function drops to `tail_tolerance` or below, or at the
    /// end of the support of a waiting-time table; beyond it the hazard is one.
    pub fn hazard_table(&self, time_step: f64, tail_tolerance: f64) -> Result<HazardTable> {
        if let Distribution::Exponential { rate } = self {
            return Ok(HazardTable::constant(check_hazard(
                1. - (-rate * time_step).exp(),
            )?));
        }

        let support = match self {
            Distribution::Nonparametric(waiting_time) => Some(waiting_time.support()),
            _ => None,
        };

        let mut hazards = Vec::new();
        let mut before = 1.;
        for k in 0..MAX_TABLE_LENGTH {
            if before <= tail_tolerance {
                break;
            }
            let start = k as f64 * time_step;
            if let Some(support) = support
                && start >= support
            {
                break;
            }
            let after = self.survival(start + time_step);
            hazards.push(check_hazard(1. - after / before)?);
            before = after;
        }
        if hazards.len() == MAX_TABLE_LENGTH {
            log::warn!(
                "Hazard table for {} distribution truncated at {} steps.",
                self.name(),
                MAX_TABLE_LENGTH
            );
        }
        Ok(HazardTable::aged(hazards))
    }
}

fn check_hazard(hazard: f64) -> Result<f64> {
    if hazard.is_nan() || !(-HAZARD_EPSILON..=1. + HAZARD_EPSILON).contains(&hazard) {
        return Err(DenimError::InvalidDistribution(format!(
            "hazard {hazard} is outside of [0, 1]"
        )));
    }
    Ok(hazard.clamp(0., 1.))
}

/// Per-step hazards of a discretized distribution.
#[derive(Debug, Clone, PartialEq)]
pub enum HazardTable {
    /// The same hazard at every age.
    Constant(f64),
    /// Hazard by age in steps; one past the end of the table.
    Aged(Vec<f64>),
}

impl HazardTable {
    pub fn constant(hazard: f64) -> Self {
        HazardTable::Constant(hazard)
    }

    pub fn aged(hazards: Vec<f64>) -> Self {
        HazardTable::Aged(hazards)
    }

    #[inline]
    pub fn get(&self, age: usize) -> f64 {
        match self {
            HazardTable::Constant(hazard) => *hazard,
            HazardTable::Aged(hazards) => hazards.get(age).copied().unwrap_or(1.),
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, HazardTable::Constant(_))
    }

    /// Number of ages that can be occupied before everybody has left.
    pub fn max_age(&self) -> Option<usize> {
        match self {
            HazardTable::Constant(_) => None,
            HazardTable::Aged(hazards) => Some(hazards.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_waiting_time() {
        let waiting_time = WaitingTime::new(vec![1., 2., 3., 4.]).unwrap();
        let sum: f64 = waiting_time.weights().iter().sum();
        assert!((sum - 1.).abs() < 1e-12);
        assert_eq!(waiting_time.weights()[0], 0.1);
    }

    #[test]
    fn check_hazard_clamps_and_rejects() {
        assert_eq!(check_hazard(1. + 5e-10).unwrap(), 1.);
        assert_eq!(check_hazard(-5e-10).unwrap(), 0.);
        assert_eq!(check_hazard(0.25).unwrap(), 0.25);
        assert!(matches!(
            check_hazard(1. + 1e-6),
            Err(DenimError::InvalidDistribution(_))
        ));
        assert!(matches!(
            check_hazard(-1e-6),
            Err(DenimError::InvalidDistribution(_))
        ));
        assert!(matches!(
            check_hazard(f64::NAN),
            Err(DenimError::InvalidDistribution(_))
        ));
    }

    #[test]
    fn reject_invalid_waiting_time() {
        assert!(matches!(
            WaitingTime::new(vec![]),
            Err(DenimError::InvalidDistribution(_))
        ));
        assert!(matches!(
            WaitingTime::new(vec![0., 0., 0.]),
            Err(DenimError::InvalidDistribution(_))
        ));
        assert!(matches!(
            WaitingTime::new(vec![0.5, -0.1, 0.6]),
            Err(DenimError::InvalidDistribution(_))
        ));
        assert!(matches!(
            WaitingTime::with_bin_width(vec![1.], 0.),
            Err(DenimError::InvalidDistribution(_))
        ));
    }

    #[test]
    fn waiting_time_hazard() {
        let waiting_time = WaitingTime::new(vec![0.1, 0.2, 0.3, 0.4]).unwrap();
        let expected = [0.1, 0.2 / 0.9, 0.3 / 0.7, 1.];
        for (k, hazard) in expected.iter().enumerate() {
            assert!((waiting_time.hazard(k) - hazard).abs() < 1e-12);
        }
        for k in 4..10 {
            assert_eq!(waiting_time.hazard(k), 1.);
        }
    }

    #[test]
    fn waiting_time_hazard_in_unit_interval() {
        let waiting_time = WaitingTime::new(vec![3., 0., 7., 1e-9, 2., 0., 0.]).unwrap();
        for k in 0..20 {
            let hazard = waiting_time.hazard(k);
            assert!((0. ..=1.).contains(&hazard));
        }
    }

    #[test]
    fn leading_zeros_never_leave() {
        let waiting_time = WaitingTime::new(vec![0., 0., 1.]).unwrap();
        assert_eq!(waiting_time.hazard(0), 0.);
        assert_eq!(waiting_time.hazard(1), 0.);
        assert_eq!(waiting_time.hazard(2), 1.);
    }

    #[test]
    fn nonparametric_table_matches_waiting_time() {
        let weights = vec![0.05, 0.25, 0.4, 0.2, 0.1];
        let distribution = Distribution::nonparametric(weights.clone()).unwrap();
        let table = distribution.hazard_table(1., 1e-10).unwrap();
        let Distribution::Nonparametric(waiting_time) = &distribution else {
            unreachable!()
        };
        assert_eq!(table.max_age(), Some(weights.len()));
        for k in 0..10 {
            assert!((table.get(k) - waiting_time.hazard(k)).abs() < 1e-12);
        }
    }

    #[test]
    fn nonparametric_table_with_finer_step() {
        let distribution = Distribution::nonparametric(vec![0.5, 0.5]).unwrap();
        let table = distribution.hazard_table(0.5, 1e-10).unwrap();
        // uniform over two days: survival 1, 0.75, 0.5, 0.25, 0
        let expected = [0.25, 1. / 3., 0.5, 1.];
        assert_eq!(table.max_age(), Some(4));
        for (k, hazard) in expected.iter().enumerate() {
            assert!((table.get(k) - hazard).abs() < 1e-12);
        }
    }

    #[test]
    fn exponential_hazard_is_constant() {
        let distribution = Distribution::exponential(0.3).unwrap();
        let table = distribution.hazard_table(0.1, 1e-10).unwrap();
        assert!(table.is_constant());
        let expected = 1. - f64::exp(-0.03);
        for k in [0, 1, 10, 1000] {
            assert!((table.get(k) - expected).abs() < 1e-15);
            assert!((distribution.hazard(k, 0.1).unwrap() - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn gamma_hazard_increases_with_age() {
        let distribution = Distribution::gamma(1., 3.).unwrap();
        let table = distribution.hazard_table(0.1, 1e-10).unwrap();
        assert!(!table.is_constant());
        let max_age = table.max_age().unwrap();
        assert!(max_age > 10);
        for k in 1..max_age {
            assert!(table.get(k) >= table.get(k - 1) - 1e-12);
            assert!((0. ..=1.).contains(&table.get(k)));
        }
        assert_eq!(table.get(max_age), 1.);
    }

    #[test]
    fn weibull_shape_one_is_exponential() {
        let weibull = Distribution::weibull(2., 1.).unwrap();
        let exponential = Distribution::exponential(0.5).unwrap();
        for k in 0..50 {
            let a = weibull.hazard(k, 0.25).unwrap();
            let b = exponential.hazard(k, 0.25).unwrap();
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn survival_ends_table() {
        let distribution = Distribution::weibull(1., 2.).unwrap();
        let table = distribution.hazard_table(0.01, 1e-6).unwrap();
        let max_age = table.max_age().unwrap();
        assert!(distribution.survival(max_age as f64 * 0.01) <= 1e-6);
        assert!(distribution.survival((max_age - 1) as f64 * 0.01) > 1e-6);
    }

    #[test]
    fn reject_invalid_parameters() {
        assert!(Distribution::exponential(0.).is_err());
        assert!(Distribution::exponential(f64::NAN).is_err());
        assert!(Distribution::gamma(-1., 2.).is_err());
        assert!(Distribution::weibull(1., 0.).is_err());
        assert!(Distribution::Gamma {
            scale: 1.,
            shape: f64::INFINITY
        }
        .validate()
        .is_err());
    }

    #[test]
    fn means() {
        assert!((Distribution::exponential(0.25).unwrap().mean() - 4.).abs() < 1e-12);
        assert!((Distribution::gamma(2., 3.).unwrap().mean() - 6.).abs() < 1e-12);
        assert!((Distribution::weibull(2., 1.).unwrap().mean() - 2.).abs() < 1e-9);
        assert!((Distribution::nonparametric(vec![1., 1.]).unwrap().mean() - 1.).abs() < 1e-12);
    }

    #[test]
    fn read_write_yaml() {
        let distributions = vec![
            Distribution::exponential(0.5).unwrap(),
            Distribution::gamma(2., 3.).unwrap(),
            Distribution::weibull(1.5, 2.).unwrap(),
            Distribution::nonparametric(vec![0.25, 0.5, 0.25]).unwrap(),
        ];
        let yaml = serde_yaml::to_string(&distributions).unwrap();
        let read: Vec<Distribution> = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(read, distributions);
    }

    #[test]
    fn read_normalizes_waiting_time() {
        let yaml = "!Nonparametric\nweights: [2, 2]\n";
        let distribution: Distribution = serde_yaml::from_str(yaml).unwrap();
        let Distribution::Nonparametric(waiting_time) = distribution else {
            panic!("wrong variant")
        };
        assert_eq!(waiting_time.weights(), &[0.5, 0.5]);
        assert_eq!(waiting_time.bin_width(), 1.);

        let yaml = "!Nonparametric\nweights: [0, 0]\n";
        assert!(serde_yaml::from_str::<Distribution>(yaml).is_err());
    }
}
