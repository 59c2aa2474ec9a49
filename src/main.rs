use std::path::PathBuf;

use clap::{Parser, Subcommand};

use chain_smoker::cli::commands::{self, RunOptions};
use chain_smoker::logging;

#[derive(Parser)]
#[command(name = "chain-smoker", about = "Declarative HTTP smoke tests", version)]
struct Cli {
    /// Log debug detail (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run suite files against their APIs
    Run {
        /// Suite files
        files: Vec<PathBuf>,

        /// Run every .yaml/.yml file in this directory
        #[arg(short, long)]
        directory: Option<PathBuf>,

        /// Output format: text, yaml, json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate suite files without sending requests
    Validate {
        /// Suite files
        files: Vec<PathBuf>,

        /// Validate every .yaml/.yml file in this directory
        #[arg(short, long)]
        directory: Option<PathBuf>,
    },

    /// Convert a recorded request/response pair into a suite file
    Capture {
        /// JSON record from the recording proxy
        record: PathBuf,

        /// Suite file to write
        #[arg(short, long)]
        output: PathBuf,

        /// Rewrite config (YAML)
        #[arg(short, long)]
        rewrite: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Some(Commands::Run {
            files,
            directory,
            format,
            output,
        }) => {
            let options = RunOptions {
                dir: directory,
                files,
                format,
                output,
                verbose: cli.verbose,
            };
            match commands::run_run(&options) {
                Ok(true) => {}
                Ok(false) => std::process::exit(1),
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::Validate { files, directory }) => {
            match commands::run_validate(directory.as_deref(), &files) {
                Ok(result) => println!("{result}"),
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::Capture {
            record,
            output,
            rewrite,
        }) => match commands::run_capture(&record, &output, rewrite.as_deref()) {
            Ok(result) => println!("{result}"),
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        },
        None => {
            // No subcommand: show help
            Cli::parse_from(["chain-smoker", "--help"]);
        }
    }
}
