use clap::Parser;
use pmp_experiment_engine::cli::{self, Cli, Command};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Simulate(args) => cli::simulate::run(args),
        Command::SampleSize(args) => cli::sample_size::run(args),
    }
}
