use clap::Parser;

use denim::args::Args;
use denim::runner::Runner;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let runner = Runner::new(args)?;
    runner.start()
}
