mod commands;
mod helpers;

use clap::Parser;
use smh_core::domain::SmhError;
use tracing_subscriber::EnvFilter;

const LOG_FILTER_ENV: &str = "SMH_LOG";

pub fn run_from_env() -> i32 {
    init_logging();
    let args: Vec<String> = std::env::args().skip(1).collect();

    match run(args) {
        Ok(code) => code,
        Err(error) => {
            let smh_error = error.as_smh_error();
            eprintln!("{}", smh_error.diagnostic_line());
            smh_error.exit_code()
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once("smh-rs".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();
    parse_and_dispatch(full_args)
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => dispatch_parsed(cli.command),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(name = "smh-rs", version, about = "Spectral model fitting for stellar spectroscopy")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Merge line lists into one table
    Merge(commands::MergeArgs),
    /// Sort a line list by one of its columns
    Sort(commands::SortArgs),
    /// Fit one profile model per transition against a spectrum
    Fit(commands::FitArgs),
    /// Report conflict groups of an exported model archive
    Conflicts(commands::ConflictsArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Merge(args) => commands::run_merge_command(args),
        CliCommand::Sort(args) => commands::run_sort_command(args),
        CliCommand::Fit(args) => commands::run_fit_command(args),
        CliCommand::Conflicts(args) => commands::run_conflicts_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Compute(SmhError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    fn as_smh_error(&self) -> SmhError {
        match self {
            Self::Usage(message) => SmhError::input_validation("INPUT.CLI_USAGE", message.clone()),
            Self::Compute(error) => error.clone(),
            Self::Internal(error) => SmhError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}
