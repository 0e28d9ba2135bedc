mod commands;
mod output;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

/// Parameter sweeps over the NeuLAND simulation chain
#[derive(Parser, Debug)]
#[command(name = "neuland", version, about)]
struct Cli {
    /// Log engine spawns, skips and kills
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one or more stages over the configured parameter sweep
    Sweep(commands::sweep::SweepArgs),
    /// Run a single stage for one parameter tuple
    Stage(commands::stage::StageArgs),
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env("NEULAND_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Sweep(args) => commands::sweep::execute(args, cli.verbose).await,
        Command::Stage(args) => commands::stage::execute(args).await,
    }
}
