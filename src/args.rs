use clap::Parser;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None, name = "denim")]
pub struct Args {
    /// Path to settings.
    #[clap(long)]
    pub settings: String,

    /// Path to output (csv file)
    #[clap(long, short)]
    pub output: String,

    /// Additionally write the trajectory as npy array to this path.
    #[clap(long)]
    pub npy: Option<String>,

    /// Path to log file.
    #[clap(long, default_value = "denim.log")]
    pub log_file: String,

    /// Increase logging verbosity.
    #[clap(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Number of threads.
    #[clap(long)]
    pub threads: Option<usize>,

    /// Disable the progress bar.
    #[clap(long)]
    pub disable_progress_bar: bool,

    /// Override the initial time step of the settings.
    #[clap(long)]
    pub time_step: Option<f64>,

    /// Override the error tolerance of the settings.
    #[clap(long)]
    pub error_tolerance: Option<f64>,

    /// Override the number of days to simulate.
    #[clap(long)]
    pub days: Option<f64>,
}
