use anyhow::Result;

use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

use crate::args::Args;
use crate::config::{Parameters, Settings};
use crate::controller::{Accepted, ErrorController, RefinementRound};
use crate::core::{Model, Trajectory};
use crate::errors::DenimError;
use crate::readwrite::{CsvTrajectoryWriter, NpyTrajectoryWriter, TrajectoryWriter};

pub struct Runner {
    args: Args,
    settings: Settings,
    model: Model,
}

impl Runner {
    pub fn new(args: Args) -> Result<Runner> {
        Self::setup_logger(&args);
        #[cfg(feature = "parallel")]
        Self::setup_rayon(&args);

        let mut settings = Self::load_settings(&args.settings)?;
        Self::apply_overrides(&args, &mut settings.parameters);
        settings.parameters.validate()?;

        let model = settings.model.build()?;
        model.describe();

        Ok(Self {
            args,
            settings,
            model,
        })
    }

    pub fn start(&self) -> Result<()> {
        let accepted = self.run()?;
        self.finish(&accepted.trajectory)?;
        Ok(())
    }

    fn run(&self) -> Result<Accepted> {
        let parameters = &self.settings.parameters;
        let bar = match self.args.disable_progress_bar {
            true => None,
            false => {
                let bar = ProgressBar::new(parameters.max_refinements as u64);
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template(
                            "[{bar:40}] {pos:>7}/{len:7} [{elapsed_precise} / {duration_precise}] {msg}",
                        )?
                        .progress_chars("=> "),
                );
                bar.set_message(format!("time step {}", parameters.time_step));
                Some(bar)
            }
        };

        let controller = ErrorController::new(&self.model, parameters)?;
        let result = controller.run_with(|round| {
            if let Some(bar) = bar.as_ref() {
                bar.inc(1);
                bar.set_message(format!(
                    "time step {}: error {:e}",
                    round.time_step, round.error
                ));
            }
        });

        match result {
            Ok(accepted) => {
                if let Some(bar) = bar {
                    bar.finish_with_message(format!("Accepted time step {}.", accepted.time_step));
                }
                Self::log_history(&accepted.history);
                log::info!(
                    "Accepted time step {} with error {:e}.",
                    accepted.time_step,
                    accepted.error
                );
                Ok(accepted)
            }
            Err(DenimError::ConvergenceFailure(failure)) => {
                if let Some(bar) = bar {
                    bar.abandon_with_message("No convergence.");
                }
                Self::log_history(&failure.history);
                log::error!(
                    "Finest time step {} still has error {:e} (tolerance {:e}).",
                    failure.time_step,
                    failure.error,
                    failure.tolerance
                );
                Err(DenimError::ConvergenceFailure(failure).into())
            }
            Err(error) => Err(error.into()),
        }
    }

    fn finish(&self, trajectory: &Trajectory) -> Result<()> {
        let diagnostics = trajectory.diagnostics();
        if diagnostics.clamped > 0 {
            log::warn!(
                "{} negative occupancies were clamped to zero in the accepted run.",
                diagnostics.clamped
            );
        }

        CsvTrajectoryWriter::new(Path::new(&self.args.output)).write(trajectory)?;
        if let Some(npy) = &self.args.npy {
            NpyTrajectoryWriter::new(Path::new(npy)).write(trajectory)?;
        }
        log::info!("Finished simulation.");
        Ok(())
    }

    fn log_history(history: &[RefinementRound]) {
        for round in history {
            log::info!(
                "time_step={} error={:e}",
                round.time_step,
                round.error
            );
        }
    }

    /// Setup logging level and file
    fn setup_logger(args: &Args) {
        let log_level = match args.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };
        simple_logging::log_to_file(args.log_file.as_str(), log_level).unwrap_or_else(|_| {
            eprintln!("Unable to open log file.");
            std::process::exit(1);
        });
    }

    /// Setup rayon thread pool
    #[cfg(feature = "parallel")]
    fn setup_rayon(args: &Args) {
        if let Some(n_threads) = args.threads {
            println!("Setting number of threads to {}.", n_threads);
            rayon::ThreadPoolBuilder::new()
                .num_threads(n_threads)
                .build_global()
                .unwrap_or_else(|_| {
                    eprintln!("Unable to set number of threads.");
                    std::process::exit(1);
                });
        }
    }

    /// Load settings from file
    fn load_settings(path: &str) -> Result<Settings> {
        let settings: Settings = Settings::read_from_file(path)?;
        log::info!("Loaded settings\n{}", settings);
        Ok(settings)
    }

    fn apply_overrides(args: &Args, parameters: &mut Parameters) {
        if let Some(time_step) = args.time_step {
            log::info!("Overriding time step with {time_step}.");
            parameters.time_step = time_step;
        }
        if let Some(error_tolerance) = args.error_tolerance {
            log::info!("Overriding error tolerance with {error_tolerance}.");
            parameters.error_tolerance = error_tolerance;
        }
        if let Some(days) = args.days {
            log::info!("Overriding days of follow up with {days}.");
            parameters.days_follow_up = days;
        }
    }
}
