//! Statistics and metric trait implementations

pub mod trajectory;

pub use trajectory::ErrorMetric;
pub use trajectory::TrajectoryDistance;
