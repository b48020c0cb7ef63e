//! Age-structured bookkeeping of compartment occupancy.
//!
//! A [`Cohort`] stores the occupancy of a compartment by the number of steps since entering it.
//! Cohorts whose hazard does not depend on age are collapsed into a single bin.

use std::collections::VecDeque;

/// Occupancy of one branch of a compartment, indexed by age in steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Cohort {
    bins: VecDeque<f64>,
    aged: bool,
}

/// Result of advancing a cohort by one step.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Advance {
    pub outflow: f64,
    /// Number of bins that had to be clamped to zero.
    pub clamped: usize,
}

impl Cohort {
    pub fn new(aged: bool) -> Self {
        Self {
            bins: VecDeque::new(),
            aged,
        }
    }

    /// Cohort with all initial occupants at age zero.
    pub fn with_occupancy(aged: bool, occupancy: f64) -> Self {
        let mut cohort = Self::new(aged);
        cohort.bins.push_back(occupancy);
        cohort
    }

    pub fn is_aged(&self) -> bool {
        self.aged
    }

    pub fn bins(&self) -> &VecDeque<f64> {
        &self.bins
    }

    pub fn is_empty(&self) -> bool {
        self.bins.iter().all(|bin| *bin == 0.)
    }

    pub fn occupancy(&self) -> f64 {
        self.bins.iter().sum()
    }

    /// Apply the hazard of every age and shift the remaining occupants one age up.
    ///
    /// Aged cohorts open an empty age-zero slot for arrivals, which are added with
    /// [`Cohort::admit`].
    pub fn advance<F>(&mut self, hazard: F) -> Advance
    where
        F: Fn(usize) -> f64,
    {
        let mut result = Advance::default();
        for (age, bin) in self.bins.iter_mut().enumerate() {
            let leaving = *bin * hazard(age);
            let mut remaining = *bin - leaving;
            if remaining < 0. {
                log::warn!("Negative occupancy {remaining:e} at age {age} clamped to zero.");
                result.clamped += 1;
                remaining = 0.;
            }
            result.outflow += *bin - remaining;
            *bin = remaining;
        }

        while self.bins.back() == Some(&0.) {
            self.bins.pop_back();
        }

        if self.aged {
            self.bins.push_front(0.);
        }
        result
    }

    /// Add arrivals at age zero.
    pub fn admit(&mut self, arrivals: f64) {
        if arrivals <= 0. {
            return;
        }
        match self.bins.front_mut() {
            Some(front) => *front += arrivals,
            None => self.bins.push_back(arrivals),
        }
    }
}
