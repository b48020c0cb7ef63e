//! Deterministic discrete-time simulation of a compartmental model.

use ndarray::{Array1, Array2};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::core::{Cohort, Diagnostics, HazardTable, Model, Rule, Trajectory};
use crate::errors::{DenimError, Result};

/// Hazard source of one edge in one stratum.
#[derive(Debug, Clone, PartialEq)]
enum EdgeHazard {
    Table(HazardTable),
    Infection { transmission_rate: f64 },
}

impl EdgeHazard {
    fn is_aged(&self) -> bool {
        matches!(self, EdgeHazard::Table(table) if !table.is_constant())
    }
}

/// Occupants of a compartment that leave through `edge`, or stay for good if there is none.
#[derive(Debug, Clone, PartialEq)]
struct Branch {
    edge: Option<usize>,
    share: f64,
    cohort: Cohort,
}

type Compartments = Vec<Vec<Branch>>;

/// Age-structured occupancy of every stratum and compartment.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    step: usize,
    strata: Vec<Compartments>,
}

impl State {
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn occupancy(&self, stratum: usize, compartment: usize) -> f64 {
        self.strata[stratum][compartment]
            .iter()
            .map(|branch| branch.cohort.occupancy())
            .sum()
    }

    /// Cohorts of a compartment, one per outgoing transition.
    pub fn cohorts(&self, stratum: usize, compartment: usize) -> impl Iterator<Item = &Cohort> {
        self.strata[stratum][compartment]
            .iter()
            .map(|branch| &branch.cohort)
    }

    /// Occupancy indexed by stratum and compartment.
    pub fn totals(&self) -> Array2<f64> {
        let n_compartments = self.strata.first().map_or(0, |c| c.len());
        Array2::from_shape_fn((self.strata.len(), n_compartments), |(s, c)| {
            self.occupancy(s, c)
        })
    }
}

pub struct Simulation<'a> {
    model: &'a Model,
    time_step: f64,
    n_steps: usize,
    /// Hazards by stratum and edge.
    hazards: Vec<Vec<EdgeHazard>>,
    populations: Vec<f64>,
}

impl<'a> Simulation<'a> {
    /// Prepare a run of `n_steps` steps of length `time_step`.
    ///
    /// Hazard tables of all distribution-governed transitions are computed here, once per run.
    pub fn new(
        model: &'a Model,
        time_step: f64,
        n_steps: usize,
        tail_tolerance: f64,
    ) -> Result<Self> {
        if !(time_step.is_finite() && time_step > 0.) {
            return Err(DenimError::InvalidParameter(format!(
                "time step must be positive, got {time_step}"
            )));
        }

        let hazards = (0..model.strata().len())
            .map(|stratum| {
                model
                    .rules(stratum)
                    .iter()
                    .map(|rule| match rule {
                        Rule::Distribution(distribution) => Ok(EdgeHazard::Table(
                            distribution.hazard_table(time_step, tail_tolerance)?,
                        )),
                        Rule::ForceOfInfection(force) => Ok(EdgeHazard::Infection {
                            transmission_rate: force.transmission_rate,
                        }),
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        let populations = (0..model.strata().len())
            .map(|stratum| model.stratum_population(stratum))
            .collect();

        log::debug!("Prepared simulation with time step {time_step} and {n_steps} steps.");
        Ok(Self {
            model,
            time_step,
            n_steps,
            hazards,
            populations,
        })
    }

    pub fn model(&self) -> &Model {
        self.model
    }

    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    /// State at step zero: every occupant at age zero, split over the outgoing transitions.
    pub fn initial_state(&self) -> State {
        let graph = self.model.graph();
        let strata = (0..self.model.strata().len())
            .map(|stratum| {
                (0..graph.compartments().len())
                    .map(|compartment| {
                        let occupancy = self.model.initial_values()[[stratum, compartment]];
                        let outgoing = graph.outgoing(compartment);
                        if outgoing.is_empty() {
                            return vec![Branch {
                                edge: None,
                                share: 1.,
                                cohort: Cohort::with_occupancy(false, occupancy),
                            }];
                        }
                        outgoing
                            .iter()
                            .map(|&edge| {
                                let share = graph.edges()[edge].proportion;
                                let aged = self.hazards[stratum][edge].is_aged();
                                Branch {
                                    edge: Some(edge),
                                    share,
                                    cohort: Cohort::with_occupancy(aged, occupancy * share),
                                }
                            })
                            .collect()
                    })
                    .collect()
            })
            .collect();
        State { step: 0, strata }
    }

    /// Force of infection acting on every stratum.
    pub fn force_of_infection(&self, state: &State) -> Array1<f64> {
        let prevalence: Array1<f64> = self
            .populations
            .iter()
            .enumerate()
            .map(|(stratum, &population)| {
                if population <= 0. {
                    return 0.;
                }
                let infectious: f64 = self
                    .model
                    .infectious()
                    .iter()
                    .map(|&compartment| state.occupancy(stratum, compartment))
                    .sum();
                infectious / population
            })
            .collect();
        self.model.contacts().weights().dot(&prevalence)
    }

    /// Advance the state by one step.
    pub fn step(&self, state: &State) -> (State, Diagnostics) {
        let force = self.force_of_infection(state);
        let (strata, clamped): (Vec<Compartments>, Vec<usize>) =
            self.advance_strata(state, &force).into_iter().unzip();
        let next = State {
            step: state.step + 1,
            strata,
        };
        let diagnostics = Diagnostics {
            clamped: clamped.into_iter().sum(),
        };
        (next, diagnostics)
    }

    #[cfg(feature = "parallel")]
    fn advance_strata(&self, state: &State, force: &Array1<f64>) -> Vec<(Compartments, usize)> {
        state
            .strata
            .par_iter()
            .enumerate()
            .map(|(stratum, compartments)| {
                self.advance_stratum(stratum, compartments, force[stratum])
            })
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn advance_strata(&self, state: &State, force: &Array1<f64>) -> Vec<(Compartments, usize)> {
        state
            .strata
            .iter()
            .enumerate()
            .map(|(stratum, compartments)| {
                self.advance_stratum(stratum, compartments, force[stratum])
            })
            .collect()
    }

    fn advance_stratum(
        &self,
        stratum: usize,
        compartments: &Compartments,
        force: f64,
    ) -> (Compartments, usize) {
        let edges = self.model.graph().edges();
        let mut next = compartments.clone();
        let mut inflow = vec![0.; next.len()];
        let mut clamped = 0;

        for branch in next.iter_mut().flatten() {
            let Some(edge) = branch.edge else {
                continue;
            };
            if branch.cohort.is_empty() {
                continue;
            }
            let advance = match &self.hazards[stratum][edge] {
                EdgeHazard::Table(table) => branch.cohort.advance(|age| table.get(age)),
                EdgeHazard::Infection { transmission_rate } => {
                    let hazard = 1. - (-transmission_rate * self.time_step * force).exp();
                    branch.cohort.advance(|_| hazard)
                }
            };
            inflow[edges[edge].to] += advance.outflow;
            clamped += advance.clamped;
        }

        // arrivals are admitted after all outflows so they cannot leave in the same step
        for (compartment, arrivals) in inflow.into_iter().enumerate() {
            for branch in next[compartment].iter_mut() {
                branch.cohort.admit(arrivals * branch.share);
            }
        }
        (next, clamped)
    }

    pub fn run(&self) -> Trajectory {
        self.run_with(|_| {})
    }

    /// Run all steps, calling `callback` with the index of every completed step.
    pub fn run_with<F>(&self, mut callback: F) -> Trajectory
    where
        F: FnMut(usize),
    {
        let mut trajectory = Trajectory::new(
            self.time_step,
            self.model.strata().to_vec(),
            self.model.compartments().to_vec(),
            self.n_steps,
        );

        let mut state = self.initial_state();
        trajectory.record(0, &state.totals());
        for step in 1..=self.n_steps {
            let (next, diagnostics) = self.step(&state);
            trajectory.record(step, &next.totals());
            trajectory.add_diagnostics(diagnostics);
            state = next;
            log::trace!("Completed step {step}/{}.", self.n_steps);
            callback(step);
        }

        let clamped = trajectory.diagnostics().clamped;
        if clamped > 0 {
            log::warn!(
                "Clamped {clamped} negative occupancies at time step {}.",
                self.time_step
            );
        }
        log::debug!(
            "Finished {} steps at time step {}.",
            self.n_steps,
            self.time_step
        );
        trajectory
    }
}
