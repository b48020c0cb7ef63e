//! All errors that can occur in the denim library.

use std::fmt;

use crate::controller::RefinementRound;
use crate::core::Trajectory;

pub type Result<T> = std::result::Result<T, DenimError>;

#[derive(Clone, Debug)]
pub enum DenimError {
    InvalidDistribution(String),
    MalformedTransition(String),
    DimensionMismatch(String),
    InvalidParameter(String),
    ConvergenceFailure(Box<ConvergenceFailure>),
}

/// Diagnostic payload of a refinement campaign that did not meet its tolerance.
#[derive(Clone, Debug)]
pub struct ConvergenceFailure {
    /// Time step of the finest trajectory that was computed.
    pub time_step: f64,
    /// Error between the last two resolutions.
    pub error: f64,
    pub tolerance: f64,
    pub history: Vec<RefinementRound>,
    pub trajectory: Trajectory,
}

impl fmt::Display for DenimError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DenimError::InvalidDistribution(message) => {
                write!(f, "InvalidDistribution: {}", message)
            }
            DenimError::MalformedTransition(message) => {
                write!(f, "MalformedTransition: {}", message)
            }
            DenimError::DimensionMismatch(message) => {
                write!(f, "DimensionMismatch: {}", message)
            }
            DenimError::InvalidParameter(message) => {
                write!(f, "InvalidParameter: {}", message)
            }
            DenimError::ConvergenceFailure(failure) => write!(
                f,
                "ConvergenceFailure: error {:e} exceeds tolerance {:e} after {} refinements (time step {})",
                failure.error,
                failure.tolerance,
                failure.history.len(),
                failure.time_step
            ),
        }
    }
}

impl std::error::Error for DenimError {}
