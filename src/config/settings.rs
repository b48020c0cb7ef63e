//! Settings module.

use super::model::ModelSettings;
use super::parameters::Parameters;

use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Settings {
    pub model: ModelSettings,
    pub parameters: Parameters,
}

#[derive(Debug)]
pub enum SettingsError {
    IoError(std::io::Error),
    YamlError(serde_yaml::Error),
}

impl std::error::Error for SettingsError {}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::IoError(error) => write!(formatter, "IO error: {}", error),
            SettingsError::YamlError(error) => write!(formatter, "YAML error: {}", error),
        }
    }
}

impl std::fmt::Display for Settings {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut output = vec![];
        self.write(&mut output).map_err(|_| std::fmt::Error)?;
        let output = String::from_utf8(output).map_err(|_| std::fmt::Error)?;
        write!(formatter, "{}", output)
    }
}

impl Settings {
    pub fn write(&self, writer: &mut dyn std::io::Write) -> Result<(), SettingsError> {
        serde_yaml::to_writer(writer, self).map_err(SettingsError::YamlError)
    }

    pub fn read(reader: &mut dyn std::io::Read) -> Result<Settings, SettingsError> {
        serde_yaml::from_reader(reader).map_err(SettingsError::YamlError)
    }

    pub fn write_to_file(&self, filename: &str) -> Result<(), SettingsError> {
        let file = fs::File::create(filename).map_err(SettingsError::IoError)?;
        let mut writer = std::io::BufWriter::new(file);
        self.write(&mut writer)
    }

    pub fn read_from_file(filename: &str) -> Result<Settings, SettingsError> {
        let file = fs::File::open(filename).map_err(SettingsError::IoError)?;
        let mut reader = std::io::BufReader::new(file);
        Self::read(&mut reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::InitialValues;
    use crate::core::{
        ContactCombination, ContactMatrix, Distribution, EdgeKey, TransitionSpec, WaitingTime,
    };
    use std::collections::BTreeMap;

    const SEIR: &str = r#"
model:
  transitions:
    - { from: S, to: E }
    - { from: E, to: I }
    - { from: I, to: R, proportion: 0.9 }
    - { from: I, to: D, proportion: 0.1 }
  initial_values: { S: 990, E: 0, I: 10, R: 0, D: 0 }
  distributions:
    "E -> I": !Gamma { scale: 1.5, shape: 3.0 }
    "I -> R": !Exponential { rate: 0.2 }
    "I -> D": !Nonparametric { weights: [0, 1, 2, 1], bin_width: 2.0 }
  transmission_rate: 0.4
  infectious_compartments: [I]
parameters:
  days_follow_up: 120
  time_step: 0.5
  error_tolerance: 1.0
  metric: Relative
"#;

    #[test]
    fn read_seir() {
        let settings = Settings::read(&mut SEIR.as_bytes()).unwrap();
        assert_eq!(settings.parameters.time_step, 0.5);
        assert_eq!(settings.model.transitions[2].proportion, Some(0.9));
        assert_eq!(
            settings.model.distributions[&EdgeKey::new("I", "D")],
            Distribution::Nonparametric(
                WaitingTime::with_bin_width(vec![0., 0.25, 0.5, 0.25], 2.).unwrap()
            )
        );
        let model = settings.model.build().unwrap();
        assert_eq!(model.compartments(), &["S", "E", "I", "R", "D"]);
        assert_eq!(model.graph().outgoing(2), &[2, 3]);
    }

    #[test]
    fn read_write() {
        let settings = Settings {
            model: ModelSettings {
                transitions: vec![
                    TransitionSpec::new("S", "I"),
                    TransitionSpec::with_proportion("I", "R", 0.7),
                    TransitionSpec::with_proportion("I", "D", 0.3),
                ],
                initial_values: InitialValues::Stratified(BTreeMap::from([
                    (
                        "young".to_string(),
                        BTreeMap::from([("S".to_string(), 500.), ("I".to_string(), 5.)]),
                    ),
                    (
                        "old".to_string(),
                        BTreeMap::from([("S".to_string(), 300.), ("I".to_string(), 0.)]),
                    ),
                ])),
                distributions: BTreeMap::from([
                    (
                        EdgeKey::new("I", "R"),
                        Distribution::weibull(5., 2.).unwrap(),
                    ),
                    (
                        EdgeKey::new("I", "D"),
                        Distribution::nonparametric(vec![0.5, 0.5]).unwrap(),
                    ),
                ]),
                stratified_distributions: BTreeMap::new(),
                contact_matrices: vec![
                    ContactMatrix::new(
                        "age",
                        vec!["young".to_string(), "old".to_string()],
                        vec![vec![0.9, 0.2], vec![0.2, 0.6]],
                    )
                    .unwrap(),
                ],
                combination: ContactCombination::WeightedSum { weights: vec![] },
                transmission_rate: Some(0.3),
                infectious_compartments: vec!["I".to_string()],
            },
            parameters: Parameters::new(60., 1., 0.1),
        };
        let mut output = vec![];
        settings.write(&mut output).unwrap();
        let settings2 = Settings::read(&mut &output[..]).unwrap();
        assert_eq!(settings, settings2);
    }
}
