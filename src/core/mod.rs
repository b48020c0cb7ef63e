//! This module contains the core datatypes of the library.

mod special;

pub mod cohort;
pub mod contact;
pub mod distribution;
pub mod model;
pub mod trajectory;
pub mod transition;

pub use cohort::Cohort;
pub use contact::{ContactCombination, ContactMatrix, ContactStructure};
pub use distribution::{Distribution, HazardTable, WaitingTime};
pub use model::Model;
pub use trajectory::{Diagnostics, Trajectory};
pub use transition::{EdgeKey, ForceOfInfection, Rule, TransitionGraph, TransitionSpec};
