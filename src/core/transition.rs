//! Transition topology between compartments.

use derive_more::Display;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

use super::distribution::Distribution;
use crate::errors::{DenimError, Result};

/// Tolerance on the sum of split proportions.
const PROPORTION_TOLERANCE: f64 = 1e-9;

/// A directed edge between two named compartments, written `"S -> I"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("{from} -> {to}")]
pub struct EdgeKey {
    pub from: String,
    pub to: String,
}

impl EdgeKey {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl FromStr for EdgeKey {
    type Err = DenimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split("->").map(str::trim).collect::<Vec<_>>().as_slice() {
            [from, to] if !from.is_empty() && !to.is_empty() => Ok(EdgeKey::new(from, to)),
            _ => Err(DenimError::MalformedTransition(format!(
                "invalid transition `{s}`, expected `from -> to`"
            ))),
        }
    }
}

impl Serialize for EdgeKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EdgeKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|e| serde::de::Error::custom(format!("{}", e)))
    }
}

/// Declaration of a transition as read from the configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransitionSpec {
    pub from: String,
    pub to: String,
    /// Share of the source compartment that takes this transition. Required when the source
    /// has more than one outgoing transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proportion: Option<f64>,
}

impl TransitionSpec {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            proportion: None,
        }
    }

    pub fn with_proportion(from: &str, to: &str, proportion: f64) -> Self {
        Self {
            proportion: Some(proportion),
            ..Self::new(from, to)
        }
    }
}

/// Rule governing the hazard of an edge.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Distribution(Distribution),
    ForceOfInfection(ForceOfInfection),
}

impl Rule {
    pub fn is_force_of_infection(&self) -> bool {
        matches!(self, Rule::ForceOfInfection(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForceOfInfection {
    pub transmission_rate: f64,
    /// Indices of the infectious compartments.
    pub infectious: Vec<usize>,
}

/// A validated edge with compartments resolved to indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    pub proportion: f64,
}

/// Problems in a topology that do not prevent simulation.
#[derive(Debug, Clone, PartialEq, Display)]
pub enum GraphWarning {
    /// Every compartment with an outgoing transition also has an incoming one.
    #[display("transition graph has no root compartment")]
    NoRoot,
    /// A compartment appears in no transition.
    #[display("compartment `{_0}` is not part of any transition")]
    Isolated(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionGraph {
    compartments: Vec<String>,
    edges: Vec<Edge>,
    outgoing: Vec<Vec<usize>>,
    warnings: Vec<GraphWarning>,
}

impl TransitionGraph {
    /// Build the graph from transition declarations.
    ///
    /// `known` lists the compartments that have initial values. Compartments are ordered by
    /// their first appearance in `transitions`, followed by the remaining known compartments.
    pub fn new(transitions: &[TransitionSpec], known: &[String]) -> Result<Self> {
        let known_set: HashSet<&str> = known.iter().map(String::as_str).collect();
        let mut compartments: Vec<String> = Vec::new();

        let mut edges: Vec<Edge> = Vec::with_capacity(transitions.len());
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        let mut declared: Vec<Option<f64>> = Vec::with_capacity(transitions.len());
        for transition in transitions {
            let from = resolve(&transition.from, &known_set, &mut compartments)?;
            let to = resolve(&transition.to, &known_set, &mut compartments)?;
            if from == to {
                return Err(DenimError::MalformedTransition(format!(
                    "self transition `{} -> {}`",
                    transition.from, transition.to
                )));
            }
            if !seen.insert((from, to)) {
                return Err(DenimError::MalformedTransition(format!(
                    "transition `{} -> {}` is declared twice",
                    transition.from, transition.to
                )));
            }
            if let Some(proportion) = transition.proportion
                && !(proportion.is_finite() && proportion > 0. && proportion <= 1.)
            {
                return Err(DenimError::MalformedTransition(format!(
                    "proportion {proportion} of `{} -> {}` is not in (0, 1]",
                    transition.from, transition.to
                )));
            }
            edges.push(Edge {
                from,
                to,
                proportion: transition.proportion.unwrap_or(1.),
            });
            declared.push(transition.proportion);
        }

        let mut warnings = Vec::new();
        for name in known {
            if !compartments.contains(name) {
                warnings.push(GraphWarning::Isolated(name.clone()));
                compartments.push(name.clone());
            }
        }

        let mut outgoing = vec![Vec::new(); compartments.len()];
        for (idx, edge) in edges.iter().enumerate() {
            outgoing[edge.from].push(idx);
        }

        // split policy
        for (compartment, edge_ids) in outgoing.iter().enumerate() {
            if edge_ids.len() < 2 {
                continue;
            }
            if edge_ids.iter().any(|&idx| declared[idx].is_none()) {
                return Err(DenimError::MalformedTransition(format!(
                    "compartment `{}` has {} outgoing transitions without proportions",
                    compartments[compartment],
                    edge_ids.len()
                )));
            }
            let total: f64 = edge_ids.iter().map(|&idx| edges[idx].proportion).sum();
            if (total - 1.).abs() > PROPORTION_TOLERANCE {
                return Err(DenimError::MalformedTransition(format!(
                    "proportions out of `{}` sum to {total} instead of 1",
                    compartments[compartment]
                )));
            }
        }
        for (compartment, edge_ids) in outgoing.iter().enumerate() {
            if let [idx] = edge_ids.as_slice()
                && edges[*idx].proportion != 1.
            {
                return Err(DenimError::MalformedTransition(format!(
                    "single transition out of `{}` has proportion {}",
                    compartments[compartment], edges[*idx].proportion
                )));
            }
        }

        let has_incoming: HashSet<usize> = edges.iter().map(|e| e.to).collect();
        if !edges.is_empty() && edges.iter().all(|e| has_incoming.contains(&e.from)) {
            warnings.push(GraphWarning::NoRoot);
        }

        Ok(Self {
            compartments,
            edges,
            outgoing,
            warnings,
        })
    }

    pub fn compartments(&self) -> &[String] {
        &self.compartments
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn warnings(&self) -> &[GraphWarning] {
        &self.warnings
    }

    /// Indices of the edges leaving a compartment.
    pub fn outgoing(&self, compartment: usize) -> &[usize] {
        &self.outgoing[compartment]
    }

    pub fn compartment_index(&self, name: &str) -> Option<usize> {
        self.compartments.iter().position(|c| c == name)
    }

    pub fn edge_index(&self, key: &EdgeKey) -> Option<usize> {
        let from = self.compartment_index(&key.from)?;
        let to = self.compartment_index(&key.to)?;
        self.edges.iter().position(|e| e.from == from && e.to == to)
    }

    pub fn edge_key(&self, edge: usize) -> EdgeKey {
        let edge = &self.edges[edge];
        EdgeKey::new(&self.compartments[edge.from], &self.compartments[edge.to])
    }

    /// Resolve the rule of every edge.
    ///
    /// Edges with a distribution are distribution-governed, all others are driven by the force
    /// of infection.
    pub fn classify(
        &self,
        distributions: &BTreeMap<EdgeKey, Distribution>,
        force_of_infection: &ForceOfInfection,
    ) -> Result<Vec<Rule>> {
        for key in distributions.keys() {
            if self.edge_index(key).is_none() {
                return Err(DenimError::MalformedTransition(format!(
                    "distribution given for unknown transition `{key}`"
                )));
            }
        }

        (0..self.edges.len())
            .map(|idx| match distributions.get(&self.edge_key(idx)) {
                Some(distribution) => {
                    distribution.validate()?;
                    Ok(Rule::Distribution(distribution.clone()))
                }
                None => {
                    if force_of_infection.infectious.is_empty() {
                        return Err(DenimError::MalformedTransition(format!(
                            "transition `{}` has no distribution and no infectious compartments are given",
                            self.edge_key(idx)
                        )));
                    }
                    Ok(Rule::ForceOfInfection(force_of_infection.clone()))
                }
            })
            .collect()
    }
}

fn resolve(name: &str, known: &HashSet<&str>, compartments: &mut Vec<String>) -> Result<usize> {
    if !known.contains(name) {
        return Err(DenimError::MalformedTransition(format!(
            "compartment `{name}` has no initial value"
        )));
    }
    Ok(match compartments.iter().position(|c| c == name) {
        Some(idx) => idx,
        None => {
            compartments.push(name.to_string());
            compartments.len() - 1
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn sir() -> Vec<TransitionSpec> {
        vec![TransitionSpec::new("S", "I"), TransitionSpec::new("I", "R")]
    }

    #[test]
    fn parse_edge_key() {
        let key: EdgeKey = "S -> I".parse().unwrap();
        assert_eq!(key, EdgeKey::new("S", "I"));
        let key: EdgeKey = "  Ia->R ".parse().unwrap();
        assert_eq!(key, EdgeKey::new("Ia", "R"));
        assert_eq!(key.to_string(), "Ia -> R");
        assert!("S I".parse::<EdgeKey>().is_err());
        assert!("S -> ".parse::<EdgeKey>().is_err());
        assert!("S -> I -> R".parse::<EdgeKey>().is_err());
    }

    #[test]
    fn compartment_order() {
        let graph = TransitionGraph::new(&sir(), &names(&["R", "Q", "I", "S"])).unwrap();
        assert_eq!(graph.compartments(), &names(&["S", "I", "R", "Q"])[..]);
        assert_eq!(graph.warnings(), &[GraphWarning::Isolated("Q".to_string())]);
        assert_eq!(graph.outgoing(0), &[0]);
        assert_eq!(graph.outgoing(2), &[] as &[usize]);
    }

    #[test]
    fn unknown_compartment() {
        let result = TransitionGraph::new(&sir(), &names(&["S", "I"]));
        assert!(matches!(result, Err(DenimError::MalformedTransition(_))));
    }

    #[test]
    fn self_and_duplicate_transitions() {
        let known = names(&["S", "I", "R"]);
        let result = TransitionGraph::new(&[TransitionSpec::new("S", "S")], &known);
        assert!(matches!(result, Err(DenimError::MalformedTransition(_))));

        let mut transitions = sir();
        transitions.push(TransitionSpec::new("S", "I"));
        let result = TransitionGraph::new(&transitions, &known);
        assert!(matches!(result, Err(DenimError::MalformedTransition(_))));
    }

    #[test]
    fn no_root_warning() {
        let transitions = vec![
            TransitionSpec::new("S", "I"),
            TransitionSpec::new("I", "R"),
            TransitionSpec::new("R", "S"),
        ];
        let graph = TransitionGraph::new(&transitions, &names(&["S", "I", "R"])).unwrap();
        assert_eq!(graph.warnings(), &[GraphWarning::NoRoot]);
    }

    #[test]
    fn split_requires_proportions() {
        let known = names(&["I", "R", "D"]);
        let transitions = vec![TransitionSpec::new("I", "R"), TransitionSpec::new("I", "D")];
        let result = TransitionGraph::new(&transitions, &known);
        assert!(matches!(result, Err(DenimError::MalformedTransition(_))));

        let transitions = vec![
            TransitionSpec::with_proportion("I", "R", 0.9),
            TransitionSpec::with_proportion("I", "D", 0.2),
        ];
        let result = TransitionGraph::new(&transitions, &known);
        assert!(matches!(result, Err(DenimError::MalformedTransition(_))));

        let transitions = vec![
            TransitionSpec::with_proportion("I", "R", 0.9),
            TransitionSpec::with_proportion("I", "D", 0.1),
        ];
        let graph = TransitionGraph::new(&transitions, &known).unwrap();
        assert_eq!(graph.outgoing(0), &[0, 1]);
        assert_eq!(graph.edges()[1].proportion, 0.1);
    }

    #[test]
    fn single_transition_with_partial_proportion() {
        let transitions = vec![TransitionSpec::with_proportion("I", "R", 0.5)];
        let result = TransitionGraph::new(&transitions, &names(&["I", "R"]));
        assert!(matches!(result, Err(DenimError::MalformedTransition(_))));
    }

    #[test]
    fn classify_rules() {
        let graph = TransitionGraph::new(&sir(), &names(&["S", "I", "R"])).unwrap();
        let force = ForceOfInfection {
            transmission_rate: 1.5,
            infectious: vec![1],
        };
        let distributions = BTreeMap::from([(
            EdgeKey::new("I", "R"),
            Distribution::exponential(0.5).unwrap(),
        )]);
        let rules = graph.classify(&distributions, &force).unwrap();
        assert!(rules[0].is_force_of_infection());
        assert_eq!(
            rules[1],
            Rule::Distribution(Distribution::exponential(0.5).unwrap())
        );
    }

    #[test]
    fn classify_rejects_unknown_edges() {
        let graph = TransitionGraph::new(&sir(), &names(&["S", "I", "R"])).unwrap();
        let force = ForceOfInfection {
            transmission_rate: 1.5,
            infectious: vec![1],
        };
        let distributions = BTreeMap::from([(
            EdgeKey::new("S", "R"),
            Distribution::exponential(0.5).unwrap(),
        )]);
        let result = graph.classify(&distributions, &force);
        assert!(matches!(result, Err(DenimError::MalformedTransition(_))));
    }

    #[test]
    fn classify_requires_infectious_compartments() {
        let graph = TransitionGraph::new(&sir(), &names(&["S", "I", "R"])).unwrap();
        let force = ForceOfInfection {
            transmission_rate: 1.5,
            infectious: vec![],
        };
        let result = graph.classify(&BTreeMap::new(), &force);
        assert!(matches!(result, Err(DenimError::MalformedTransition(_))));
    }

    #[test]
    fn read_transition_yaml() {
        let yaml = "- { from: S, to: I }\n- { from: I, to: R, proportion: 1.0 }\n";
        let transitions: Vec<TransitionSpec> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(transitions[0], TransitionSpec::new("S", "I"));
        assert_eq!(transitions[1], TransitionSpec::with_proportion("I", "R", 1.));
    }
}
