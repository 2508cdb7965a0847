pub mod commands;
pub mod handlers;

pub use commands::{CliArgs, EXAMPLE, USAGE};
pub use handlers::handle_scan;

use crate::config::ConfigError;
use clap::error::ErrorKind;
use clap::Parser;
use std::ffi::OsString;
use tracing::{debug, error, info};

/// Exit status for a wrong argument count
pub const USAGE_EXIT_CODE: i32 = -1;

/// Result of command-line parsing
#[derive(Debug)]
pub enum ParseOutcome {
    Run(CliArgs),
    Exit(i32),
}

/// Parses the command line, reporting usage errors through the log
///
/// `--help` and `--version` exit 0. Exactly six values always run, even when
/// clap would read one of them as an unknown flag. Any other count exits with
/// [`USAGE_EXIT_CODE`].
pub fn parse_from<I, T>(args: I) -> ParseOutcome
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();

    match CliArgs::try_parse_from(&args) {
        Ok(cli) => ParseOutcome::Run(cli),
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            ParseOutcome::Exit(0)
        }
        Err(err) => {
            let positional = args.len().saturating_sub(1);
            debug!("clap rejected arguments: {:?}", err.kind());
            if let Some(cli) = args.get(1..).and_then(CliArgs::from_positionals) {
                return ParseOutcome::Run(cli);
            }
            error!("{}", ConfigError::WrongArgumentCount(positional));
            error!("{}", USAGE);
            info!("{}", EXAMPLE);
            ParseOutcome::Exit(USAGE_EXIT_CODE)
        }
    }
}
