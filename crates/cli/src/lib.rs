pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "paintquote",
    about = "Paintquote operator CLI",
    long_about = "Apply migrations, load the demo company, inspect configuration, and price quick-quote requests.",
    after_help = "Examples:\n  paintquote migrate\n  paintquote seed\n  paintquote config\n  paintquote price request.json --save"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo painting company (idempotent) and verify it")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Price a quick-quote request read from a JSON file")]
    Price {
        #[arg(help = "Path to a JSON quote request (companyId, measurements, ...)")]
        input: PathBuf,
        #[arg(long, help = "Store the priced quote")]
        save: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Price { input, save } => commands::price::run(&input, save),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
