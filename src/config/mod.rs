//! Configuration data structures for simulation setups.

mod model;
mod parameters;
mod settings;

pub use model::{InitialValues, ModelSettings};
pub use parameters::Parameters;
pub use settings::{Settings, SettingsError};
