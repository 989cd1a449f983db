use clap::{Parser, Subcommand};
use std::process;
use tracing::error;
use tracing_subscriber::EnvFilter;

mod cmd;
mod reports;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(global = true, long, default_value_t = false)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run (or resume) every execution unit of an experiment.
    Run(cmd::run::RunArgs),
    /// Expand and filter an experiment without evaluating anything.
    Plan(cmd::plan::PlanArgs),
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let result = match cli.command {
        Commands::Run(args) => cmd::run::run(args),
        Commands::Plan(args) => cmd::plan::run(args),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("❌ FATAL: {}", e);
            process::exit(1);
        }
    }
}
