use npyz::WriterBuilder;
use std::{fs, io, path::Path};

use crate::core::Trajectory;

pub trait TrajectoryWriter {
    fn write(&self, trajectory: &Trajectory) -> Result<(), std::io::Error>;

    fn get_path(&self) -> &Path;

    fn create_file(&self) -> Result<io::BufWriter<fs::File>, std::io::Error> {
        let path = self.get_path();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        Ok(io::BufWriter::new(fs::File::create(path)?))
    }
}

/// Writes a trajectory as a table with a `time` column and one column per stratum and
/// compartment.
pub struct CsvTrajectoryWriter<'a> {
    path: &'a Path,
}

impl<'a> CsvTrajectoryWriter<'a> {
    pub fn new(path: &'a Path) -> Self {
        Self { path }
    }
}

impl TrajectoryWriter for CsvTrajectoryWriter<'_> {
    fn get_path(&self) -> &Path {
        self.path
    }

    fn write(&self, trajectory: &Trajectory) -> Result<(), std::io::Error> {
        log::info!("Writing trajectory to {}", self.path.display());
        let file = self.create_file()?;
        write_csv(file, trajectory)
    }
}

/// Write the trajectory as CSV to any writer.
pub fn write_csv<W: io::Write>(writer: W, trajectory: &Trajectory) -> Result<(), std::io::Error> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header = vec!["time".to_string()];
    header.extend(trajectory.labels());
    csv_writer.write_record(&header)?;

    for step in 0..trajectory.len() {
        let mut record = vec![trajectory.time(step).to_string()];
        record.extend(trajectory.at(step).iter().map(|value| value.to_string()));
        csv_writer.write_record(&record)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Writes the `[time, stratum, compartment]` array of a trajectory in NPY format.
pub struct NpyTrajectoryWriter<'a> {
    path: &'a Path,
}

impl<'a> NpyTrajectoryWriter<'a> {
    pub fn new(path: &'a Path) -> Self {
        Self { path }
    }
}

impl TrajectoryWriter for NpyTrajectoryWriter<'_> {
    fn get_path(&self) -> &Path {
        self.path
    }

    fn write(&self, trajectory: &Trajectory) -> Result<(), std::io::Error> {
        log::info!("Writing trajectory array to {}", self.path.display());
        let mut file = self.create_file()?;
        let shape: Vec<u64> = trajectory.values().shape().iter().map(|&n| n as u64).collect();
        let mut npy_writer = npyz::WriteOptions::<f64>::new()
            .default_dtype()
            .shape(&shape)
            .writer(&mut file)
            .begin_nd()?;
        npy_writer.extend(trajectory.values().iter().copied())?;
        npy_writer.finish()?;
        Ok(())
    }
}
