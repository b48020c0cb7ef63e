//! IO traits for writing trajectories.

mod trajectory;

pub use trajectory::{CsvTrajectoryWriter, NpyTrajectoryWriter, TrajectoryWriter, write_csv};
