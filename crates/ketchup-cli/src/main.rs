//! Ketchup CLI - capture the state of a Kubernetes cluster

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod display;
mod error;
mod exit_codes;
mod logging;
mod util;

use commands::collect::CollectArgs;

#[derive(Parser)]
#[command(name = "ketchup")]
#[command(author = "Ketchup Contributors")]
#[command(version)]
#[command(about = "Capture the state of a Kubernetes cluster as a reapply-ready archive", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect cluster resources into a run directory and archive
    Collect(CollectArgs),

    /// Show the contents and summary of a run archive
    Inspect {
        /// Archive path
        archive: PathBuf,

        /// List every file in the archive
        #[arg(long)]
        files: bool,

        /// Print the summary document as stored
        #[arg(long)]
        raw: bool,
    },
}

#[tokio::main]
async fn main() {
    miette::set_panic_hook();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version also arrive here
            let code = if e.use_stderr() {
                exit_codes::USAGE_ERROR
            } else {
                exit_codes::SUCCESS
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    logging::init(cli.verbose);

    let result = match cli.command {
        Commands::Collect(args) => commands::collect::run(args).await,
        Commands::Inspect {
            archive,
            files,
            raw,
        } => commands::inspect::run(&archive, files, raw),
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
