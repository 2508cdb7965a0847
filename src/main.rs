use codeql_scan::cli::{handle_scan, parse_from, ParseOutcome};
use codeql_scan::util::init_from_env;
use codeql_scan::VERSION;

use std::env;
use tracing::debug;

#[tokio::main]
async fn main() {
    init_from_env();

    debug!("codeql-scan v{} starting", VERSION);

    let args = match parse_from(env::args_os()) {
        ParseOutcome::Run(args) => args,
        ParseOutcome::Exit(code) => std::process::exit(code),
    };
    debug!("Arguments: {:?}", args);

    let exit_code = handle_scan(args).await;

    std::process::exit(exit_code);
}
