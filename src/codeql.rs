//! Argument lists for the CodeQL CLI subcommands
//!
//! The shapes here mirror the CLI exactly:
//!
//! ```text
//! codeql database create -v <db> --threads <N> --language <lang> --command <cmd> --source-root <root> [--overwrite]
//! codeql database analyze -v <db> <queries> --threads <N> --format=sarif-latest --output <file>
//! codeql pack install <path>
//! ```

use crate::runner::CommandSpec;
use crate::types::{AnalysisSpec, BuildSpec, ToolLocation};
use std::path::Path;

/// Results format requested from `database analyze`
pub const SARIF_FORMAT: &str = "sarif-latest";

/// Marker file CodeQL writes into every finalized database
pub const DATABASE_MARKER: &str = "codeql-database.yml";

/// `database create`, tracing `spec.build_command` under the extractor
pub fn database_create(tool: &ToolLocation, spec: &BuildSpec, overwrite: bool) -> CommandSpec {
    let command = CommandSpec::new(tool.executable())
        .arg("database")
        .arg("create")
        .arg("-v")
        .arg(&spec.db_name)
        .arg("--threads")
        .arg(spec.threads.to_string())
        .arg("--language")
        .arg(&spec.language)
        .arg("--command")
        .arg(&spec.build_command)
        .arg("--source-root")
        .arg(&spec.source_root);

    if overwrite {
        command.arg("--overwrite")
    } else {
        command
    }
}

/// `database analyze`, writing SARIF to `spec.output`
pub fn database_analyze(tool: &ToolLocation, spec: &AnalysisSpec) -> CommandSpec {
    CommandSpec::new(tool.executable())
        .arg("database")
        .arg("analyze")
        .arg("-v")
        .arg(&spec.db_name)
        .arg(&spec.queries)
        .arg("--threads")
        .arg(spec.threads.to_string())
        .arg(format!("--format={}", SARIF_FORMAT))
        .arg("--output")
        .arg(&spec.output)
}

pub fn pack_install(tool: &ToolLocation, pack: &Path) -> CommandSpec {
    CommandSpec::new(tool.executable())
        .arg("pack")
        .arg("install")
        .arg(pack)
}

/// Whether `database` looks like a finalized CodeQL database
pub fn is_database(database: &Path) -> bool {
    database.join(DATABASE_MARKER).is_file()
}
