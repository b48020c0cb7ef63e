//! Model definition as read from a configuration file.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::core::contact::IMPLICIT_STRATUM;
use crate::core::{
    ContactCombination, ContactMatrix, ContactStructure, Distribution, EdgeKey, ForceOfInfection,
    Model, TransitionGraph, TransitionSpec,
};
use crate::errors::{DenimError, Result};

/// Initial occupancy of each compartment, either for the single stratum of an unstratified
/// model or keyed by stratum.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum InitialValues {
    Flat(BTreeMap<String, f64>),
    Stratified(BTreeMap<String, BTreeMap<String, f64>>),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub transitions: Vec<TransitionSpec>,

    pub initial_values: InitialValues,

    /// Dwell-time distributions of transitions, shared by all strata. Transitions without a
    /// distribution are driven by the force of infection.
    #[serde(default)]
    pub distributions: BTreeMap<EdgeKey, Distribution>,

    /// Distributions that replace the shared ones in individual strata.
    #[serde(default)]
    pub stratified_distributions: BTreeMap<String, BTreeMap<EdgeKey, Distribution>>,

    #[serde(default)]
    pub contact_matrices: Vec<ContactMatrix>,

    #[serde(default)]
    pub combination: ContactCombination,

    /// Transmission rate of transitions driven by the force of infection. Required as soon as
    /// one transition has no distribution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transmission_rate: Option<f64>,

    #[serde(default)]
    pub infectious_compartments: Vec<String>,
}

impl ModelSettings {
    /// Validate the settings and build the model.
    pub fn build(&self) -> Result<Model> {
        let contacts = ContactStructure::new(self.contact_matrices.clone(), &self.combination)?;
        let initial_values = self.stratum_initial_values(&contacts)?;

        let known: Vec<String> = initial_values
            .iter()
            .flat_map(|values| values.keys().cloned())
            .collect::<BTreeSet<String>>()
            .into_iter()
            .collect();
        let graph = TransitionGraph::new(&self.transitions, &known)?;

        let infectious = self
            .infectious_compartments
            .iter()
            .map(|name| {
                graph.compartment_index(name).ok_or_else(|| {
                    DenimError::MalformedTransition(format!(
                        "unknown infectious compartment `{name}`"
                    ))
                })
            })
            .collect::<Result<Vec<usize>>>()?;
        let force_of_infection = ForceOfInfection {
            transmission_rate: self.transmission_rate.unwrap_or(0.),
            infectious: infectious.clone(),
        };

        for stratum in self.stratified_distributions.keys() {
            contacts.stratum_index(stratum)?;
        }
        let rules = contacts
            .strata()
            .iter()
            .map(|stratum| {
                let mut distributions = self.distributions.clone();
                if let Some(overrides) = self.stratified_distributions.get(stratum) {
                    distributions.extend(overrides.clone());
                }
                graph.classify(&distributions, &force_of_infection)
            })
            .collect::<Result<Vec<_>>>()?;
        if self.transmission_rate.is_none()
            && let Some(edge) = rules
                .first()
                .and_then(|rules| rules.iter().position(|rule| rule.is_force_of_infection()))
        {
            return Err(DenimError::InvalidParameter(format!(
                "transition `{}` is driven by the force of infection but no transmission rate is given",
                graph.edge_key(edge)
            )));
        }

        let compartments = graph.compartments();
        let values = Array2::from_shape_fn((contacts.len(), compartments.len()), |(s, c)| {
            initial_values[s]
                .get(&compartments[c])
                .copied()
                .unwrap_or(0.)
        });

        Model::new(graph, contacts, rules, values, infectious)
    }

    /// Initial values of every stratum in stratum order.
    fn stratum_initial_values(
        &self,
        contacts: &ContactStructure,
    ) -> Result<Vec<BTreeMap<String, f64>>> {
        match &self.initial_values {
            InitialValues::Flat(values) => {
                if !contacts.is_implicit() {
                    return Err(DenimError::DimensionMismatch(
                        "initial values must be given per stratum for a stratified model"
                            .to_string(),
                    ));
                }
                Ok(vec![values.clone()])
            }
            InitialValues::Stratified(strata) => {
                for key in strata.keys() {
                    contacts.stratum_index(key)?;
                }
                contacts
                    .strata()
                    .iter()
                    .map(|stratum| {
                        strata.get(stratum).cloned().ok_or_else(|| {
                            DenimError::DimensionMismatch(if stratum == IMPLICIT_STRATUM {
                                "initial values are missing".to_string()
                            } else {
                                format!("initial values are missing for stratum `{stratum}`")
                            })
                        })
                    })
                    .collect()
            }
        }
    }
}
