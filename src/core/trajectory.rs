//! Per-step compartment totals of a simulation run.

use ndarray::{Array2, Array3, ArrayView1, ArrayView2, s};

use super::contact::IMPLICIT_STRATUM;

/// Numerical corrections applied during a run.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Diagnostics {
    /// Number of bins that became negative through round-off and were clamped to zero.
    pub clamped: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    time_step: f64,
    strata: Vec<String>,
    compartments: Vec<String>,
    /// Totals indexed by step, stratum and compartment.
    values: Array3<f64>,
    diagnostics: Diagnostics,
}

impl Trajectory {
    /// Allocate a trajectory for `n_steps` steps after the initial state.
    pub fn new(
        time_step: f64,
        strata: Vec<String>,
        compartments: Vec<String>,
        n_steps: usize,
    ) -> Self {
        let values = Array3::zeros((n_steps + 1, strata.len(), compartments.len()));
        Self {
            time_step,
            strata,
            compartments,
            values,
            diagnostics: Diagnostics::default(),
        }
    }

    /// Store the totals of step `step`, indexed by stratum and compartment.
    pub fn record(&mut self, step: usize, totals: &Array2<f64>) {
        self.values.slice_mut(s![step, .., ..]).assign(totals);
    }

    pub fn add_diagnostics(&mut self, diagnostics: Diagnostics) {
        self.diagnostics.clamped += diagnostics.clamped;
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    pub fn strata(&self) -> &[String] {
        &self.strata
    }

    pub fn compartments(&self) -> &[String] {
        &self.compartments
    }

    pub fn values(&self) -> &Array3<f64> {
        &self.values
    }

    /// Number of recorded time points, including the initial state.
    pub fn len(&self) -> usize {
        self.values.dim().0
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn time(&self, step: usize) -> f64 {
        step as f64 * self.time_step
    }

    pub fn times(&self) -> Vec<f64> {
        (0..self.len()).map(|step| self.time(step)).collect()
    }

    #[inline]
    pub fn get(&self, step: usize, stratum: usize, compartment: usize) -> f64 {
        self.values[[step, stratum, compartment]]
    }

    /// Totals of all strata and compartments at one step.
    pub fn at(&self, step: usize) -> ArrayView2<'_, f64> {
        self.values.slice(s![step, .., ..])
    }

    /// Time series of one compartment in one stratum.
    pub fn series(&self, stratum: usize, compartment: usize) -> ArrayView1<'_, f64> {
        self.values.slice(s![.., stratum, compartment])
    }

    /// Time series of a compartment summed over strata.
    pub fn compartment_series(&self, compartment: usize) -> Vec<f64> {
        (0..self.len())
            .map(|step| self.values.slice(s![step, .., compartment]).sum())
            .collect()
    }

    /// Total population of a stratum at one step.
    pub fn stratum_total(&self, step: usize, stratum: usize) -> f64 {
        self.values.slice(s![step, stratum, ..]).sum()
    }

    pub fn compartment_index(&self, name: &str) -> Option<usize> {
        self.compartments.iter().position(|c| c == name)
    }

    pub fn stratum_index(&self, key: &str) -> Option<usize> {
        self.strata.iter().position(|s| s == key)
    }

    /// Column labels in stratum-major order: `C` for a model without strata, `C[stratum]`
    /// otherwise.
    pub fn labels(&self) -> Vec<String> {
        self.strata
            .iter()
            .flat_map(|stratum| {
                self.compartments.iter().map(move |compartment| {
                    if stratum == IMPLICIT_STRATUM {
                        compartment.clone()
                    } else {
                        format!("{compartment}[{stratum}]")
                    }
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn trajectory() -> Trajectory {
        let mut trajectory = Trajectory::new(
            0.5,
            vec!["a".to_string(), "b".to_string()],
            vec!["S".to_string(), "I".to_string()],
            2,
        );
        trajectory.record(0, &array![[10., 0.], [5., 1.]]);
        trajectory.record(1, &array![[9., 1.], [4., 2.]]);
        trajectory.record(2, &array![[7., 3.], [3., 3.]]);
        trajectory
    }

    #[test]
    fn record_and_read() {
        let trajectory = trajectory();
        assert_eq!(trajectory.len(), 3);
        assert_eq!(trajectory.times(), vec![0., 0.5, 1.]);
        assert_eq!(trajectory.get(1, 1, 0), 4.);
        assert_eq!(trajectory.series(0, 1).to_vec(), vec![0., 1., 3.]);
        assert_eq!(trajectory.compartment_series(0), vec![15., 13., 10.]);
        assert_eq!(trajectory.stratum_total(2, 1), 6.);
        assert_eq!(trajectory.at(2), array![[7., 3.], [3., 3.]]);
    }

    #[test]
    fn labels() {
        assert_eq!(trajectory().labels(), vec!["S[a]", "I[a]", "S[b]", "I[b]"]);
        let single = Trajectory::new(
            1.,
            vec![IMPLICIT_STRATUM.to_string()],
            vec!["S".to_string(), "I".to_string()],
            1,
        );
        assert_eq!(single.labels(), vec!["S", "I"]);
    }
}
