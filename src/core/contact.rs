//! Contact structure between population strata.
//!
//! Every contact matrix describes one stratification dimension (location, age group, ...). The
//! strata of a model are the cross product of the levels of all dimensions and are identified
//! by their level names joined with [`STRATUM_DELIMITER`].

use itertools::Itertools;
use ndarray::Array2;
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::{DenimError, Result};

pub const STRATUM_DELIMITER: &str = ".";

/// Key of the single stratum of a model without contact matrices.
pub const IMPLICIT_STRATUM: &str = "";

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ContactMatrix {
    name: String,
    levels: Vec<String>,
    #[serde(serialize_with = "serialize_weights")]
    weights: Array2<f64>,
}

fn serialize_weights<S>(
    weights: &Array2<f64>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let rows: Vec<Vec<f64>> = weights.rows().into_iter().map(|row| row.to_vec()).collect();
    rows.serialize(serializer)
}

impl<'de> Deserialize<'de> for ContactMatrix {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawContactMatrix {
            name: String,
            levels: Vec<String>,
            weights: Vec<Vec<f64>>,
        }

        let raw = RawContactMatrix::deserialize(deserializer)?;
        ContactMatrix::new(&raw.name, raw.levels, raw.weights)
            .map_err(|e| serde::de::Error::custom(format!("{}", e)))
    }
}

impl ContactMatrix {
    pub fn new(name: &str, levels: Vec<String>, weights: Vec<Vec<f64>>) -> Result<Self> {
        let size = levels.len();
        if size == 0 {
            return Err(DenimError::DimensionMismatch(format!(
                "contact matrix `{name}` has no levels"
            )));
        }
        if weights.len() != size || weights.iter().any(|row| row.len() != size) {
            return Err(DenimError::DimensionMismatch(format!(
                "contact matrix `{name}` must be {size}x{size} to match its levels"
            )));
        }
        if let Some(level) = levels.iter().duplicates().next() {
            return Err(DenimError::DimensionMismatch(format!(
                "level `{level}` appears twice in contact matrix `{name}`"
            )));
        }
        if let Some(level) = levels
            .iter()
            .find(|level| level.is_empty() || level.contains(STRATUM_DELIMITER))
        {
            return Err(DenimError::DimensionMismatch(format!(
                "level `{level}` of contact matrix `{name}` is empty or contains `{STRATUM_DELIMITER}`"
            )));
        }
        if let Some(weight) = weights.iter().flatten().find(|w| !w.is_finite() || **w < 0.) {
            return Err(DenimError::DimensionMismatch(format!(
                "contact matrix `{name}` has invalid weight {weight}"
            )));
        }

        let weights = Array2::from_shape_vec((size, size), weights.concat())
            .map_err(|e| DenimError::DimensionMismatch(format!("{e}")))?;
        Ok(Self {
            name: name.to_string(),
            levels,
            weights,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn size(&self) -> usize {
        self.levels.len()
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.weights[[row, col]]
    }
}

/// How the entries of several contact matrices combine into a weight between two strata.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub enum ContactCombination {
    /// Dimensions are independent layers: multiply the entries.
    #[default]
    Product,
    /// Weighted sum of the entries, one weight per matrix. Equal weights if empty.
    WeightedSum { weights: Vec<f64> },
}

impl ContactCombination {
    fn combine(&self, entries: &[f64]) -> f64 {
        match self {
            ContactCombination::Product => entries.iter().product(),
            ContactCombination::WeightedSum { weights } if weights.is_empty() => {
                entries.iter().sum::<f64>() / entries.len() as f64
            }
            ContactCombination::WeightedSum { weights } => {
                entries.iter().zip(weights).map(|(e, w)| e * w).sum()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContactStructure {
    matrices: Vec<ContactMatrix>,
    strata: Vec<String>,
    /// Level index of every stratum in each dimension.
    levels: Vec<Vec<usize>>,
    weights: Array2<f64>,
}

impl ContactStructure {
    pub fn new(matrices: Vec<ContactMatrix>, combination: &ContactCombination) -> Result<Self> {
        if let ContactCombination::WeightedSum { weights } = combination {
            if !weights.is_empty() && weights.len() != matrices.len() {
                return Err(DenimError::DimensionMismatch(format!(
                    "{} combination weights given for {} contact matrices",
                    weights.len(),
                    matrices.len()
                )));
            }
            if let Some(weight) = weights.iter().find(|w| !w.is_finite() || **w < 0.) {
                return Err(DenimError::DimensionMismatch(format!(
                    "invalid combination weight {weight}"
                )));
            }
        }
        if let Some(name) = matrices.iter().map(|m| m.name()).duplicates().next() {
            return Err(DenimError::DimensionMismatch(format!(
                "contact matrix `{name}` is given twice"
            )));
        }

        let levels: Vec<Vec<usize>> = if matrices.is_empty() {
            vec![vec![]]
        } else {
            matrices
                .iter()
                .map(|m| 0..m.size())
                .multi_cartesian_product()
                .collect()
        };

        let strata: Vec<String> = levels
            .iter()
            .map(|indices| {
                indices
                    .iter()
                    .zip(&matrices)
                    .map(|(&idx, matrix)| matrix.levels[idx].as_str())
                    .join(STRATUM_DELIMITER)
            })
            .collect();

        let n = strata.len();
        let weights = if matrices.is_empty() {
            Array2::ones((1, 1))
        } else {
            Array2::from_shape_fn((n, n), |(a, b)| {
                let entries: Vec<f64> = matrices
                    .iter()
                    .enumerate()
                    .map(|(d, matrix)| matrix.get(levels[a][d], levels[b][d]))
                    .collect();
                combination.combine(&entries)
            })
        };

        Ok(Self {
            matrices,
            strata,
            levels,
            weights,
        })
    }

    /// A single implicit stratum with unit weight.
    pub fn implicit() -> Self {
        Self {
            matrices: Vec::new(),
            strata: vec![IMPLICIT_STRATUM.to_string()],
            levels: vec![vec![]],
            weights: Array2::ones((1, 1)),
        }
    }

    pub fn strata(&self) -> &[String] {
        &self.strata
    }

    pub fn len(&self) -> usize {
        self.strata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strata.is_empty()
    }

    pub fn is_implicit(&self) -> bool {
        self.matrices.is_empty()
    }

    pub fn matrices(&self) -> &[ContactMatrix] {
        &self.matrices
    }

    /// Level indices of a stratum, one per contact matrix.
    pub fn levels(&self, stratum: usize) -> &[usize] {
        &self.levels[stratum]
    }

    #[inline]
    pub fn weight(&self, a: usize, b: usize) -> f64 {
        self.weights[[a, b]]
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn stratum_index(&self, key: &str) -> Result<usize> {
        self.strata.iter().position(|s| s == key).ok_or_else(|| {
            DenimError::DimensionMismatch(format!(
                "`{key}` is not a stratum of the contact dimensions ({})",
                self.matrices.iter().map(|m| m.name()).join(" x ")
            ))
        })
    }

    pub fn weight_by_key(&self, a: &str, b: &str) -> Result<f64> {
        Ok(self.weight(self.stratum_index(a)?, self.stratum_index(b)?))
    }
}
