//! Validated, immutable description of a stratified compartmental model.

use itertools::Itertools;
use ndarray::Array2;

use super::contact::ContactStructure;
use super::transition::{Rule, TransitionGraph};
use crate::errors::{DenimError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    graph: TransitionGraph,
    contacts: ContactStructure,
    /// Rule of every edge, per stratum.
    rules: Vec<Vec<Rule>>,
    /// Initial occupancy by stratum and compartment.
    initial_values: Array2<f64>,
    infectious: Vec<usize>,
}

impl Model {
    pub fn new(
        graph: TransitionGraph,
        contacts: ContactStructure,
        rules: Vec<Vec<Rule>>,
        initial_values: Array2<f64>,
        infectious: Vec<usize>,
    ) -> Result<Self> {
        let n_strata = contacts.len();
        let n_compartments = graph.compartments().len();

        if initial_values.dim() != (n_strata, n_compartments) {
            return Err(DenimError::DimensionMismatch(format!(
                "initial values have shape {:?}, expected ({n_strata}, {n_compartments})",
                initial_values.dim()
            )));
        }
        if let Some(value) = initial_values.iter().find(|v| !v.is_finite() || **v < 0.) {
            return Err(DenimError::InvalidParameter(format!(
                "initial value {value} is negative or not finite"
            )));
        }
        if rules.len() != n_strata || rules.iter().any(|r| r.len() != graph.edges().len()) {
            return Err(DenimError::DimensionMismatch(format!(
                "expected rules for {} transitions in each of {n_strata} strata",
                graph.edges().len()
            )));
        }
        if let Some(&idx) = infectious.iter().find(|&&idx| idx >= n_compartments) {
            return Err(DenimError::MalformedTransition(format!(
                "infectious compartment index {idx} out of range"
            )));
        }

        // the kind of every edge must agree across strata
        for (edge, stratum) in (0..graph.edges().len()).cartesian_product(1..n_strata) {
            if rules[stratum][edge].is_force_of_infection()
                != rules[0][edge].is_force_of_infection()
            {
                return Err(DenimError::MalformedTransition(format!(
                    "transition `{}` has a distribution in some strata only (differs in `{}`)",
                    graph.edge_key(edge),
                    contacts.strata()[stratum]
                )));
            }
        }
        for rule in rules.iter().flatten() {
            if let Rule::ForceOfInfection(force) = rule
                && !(force.transmission_rate.is_finite() && force.transmission_rate >= 0.)
            {
                return Err(DenimError::InvalidParameter(format!(
                    "transmission rate {} is negative or not finite",
                    force.transmission_rate
                )));
            }
        }

        Ok(Self {
            graph,
            contacts,
            rules,
            initial_values,
            infectious,
        })
    }

    pub fn graph(&self) -> &TransitionGraph {
        &self.graph
    }

    pub fn contacts(&self) -> &ContactStructure {
        &self.contacts
    }

    pub fn compartments(&self) -> &[String] {
        self.graph.compartments()
    }

    pub fn strata(&self) -> &[String] {
        self.contacts.strata()
    }

    pub fn rules(&self, stratum: usize) -> &[Rule] {
        &self.rules[stratum]
    }

    pub fn initial_values(&self) -> &Array2<f64> {
        &self.initial_values
    }

    pub fn infectious(&self) -> &[usize] {
        &self.infectious
    }

    /// Total population of a stratum, which is conserved during a simulation.
    pub fn stratum_population(&self, stratum: usize) -> f64 {
        self.initial_values.row(stratum).sum()
    }

    /// Log a summary of the model.
    pub fn describe(&self) {
        log::info!(
            "Model with compartments [{}] in {} strata",
            self.compartments().join(", "),
            self.strata().len()
        );
        for warning in self.graph.warnings() {
            log::warn!("{}", warning);
        }
        for (stratum, name) in self.strata().iter().enumerate() {
            for (edge, rule) in self.rules[stratum].iter().enumerate() {
                let description = match rule {
                    Rule::Distribution(distribution) => format!(
                        "{} distribution with mean {:.3} days",
                        distribution.name(),
                        distribution.mean()
                    ),
                    Rule::ForceOfInfection(force) => format!(
                        "force of infection with transmission rate {}",
                        force.transmission_rate
                    ),
                };
                log::info!(
                    "[{}] {}: {}",
                    name,
                    self.graph.edge_key(edge),
                    description
                );
            }
        }
    }
}
