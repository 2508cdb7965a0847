use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

pub const USAGE: &str = r#"Usage: codeql-scan "source_root" "build_command" "codeql_db_name" "language" "queries" "sarif-output""#;
pub const EXAMPLE: &str = r#"Example: codeql-scan "./app" "dotnet build" "codeql-db-app" "csharp" "codeql/csharp-all" "codeql-results.sarif""#;

/// Build a CodeQL database from a CI build and analyze it into a SARIF file
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(
    name = "codeql-scan",
    version,
    about = "Build a CodeQL database from a CI build and analyze it into a SARIF file",
    long_about = "codeql-scan locates the CodeQL CLI (./codeql, ~/codeql, or %ProgramFiles%\\codeql \
                  on Windows), downloads the pinned release bundle if none is installed, creates \
                  an analysis database by tracing the build command, then analyzes it with the \
                  given query pack.\n\n\
                  Tuning is read from CODEQL_SCAN_* environment variables.\n\n\
                  Example:\n  \
                  codeql-scan ./app \"dotnet build\" codeql-db-app csharp codeql/csharp-all codeql-results.sarif"
)]
pub struct CliArgs {
    #[arg(value_name = "SOURCE_ROOT", allow_hyphen_values = true, help = "Root of the source tree to analyze")]
    pub source_root: PathBuf,

    #[arg(
        value_name = "BUILD_COMMAND",
        allow_hyphen_values = true,
        help = "Build command traced while creating the database"
    )]
    pub build_command: String,

    #[arg(value_name = "DB_NAME", allow_hyphen_values = true, help = "Database directory, shared by both phases")]
    pub db_name: String,

    #[arg(value_name = "LANGUAGE", allow_hyphen_values = true, help = "CodeQL language identifier, e.g. csharp")]
    pub language: String,

    #[arg(value_name = "QUERIES", allow_hyphen_values = true, help = "Query pack to run, e.g. codeql/csharp-all")]
    pub queries: String,

    #[arg(value_name = "SARIF_OUTPUT", allow_hyphen_values = true, help = "Where the SARIF results are written")]
    pub sarif_output: PathBuf,
}

impl CliArgs {
    /// Takes exactly six raw values in positional order, without flag parsing
    pub fn from_positionals(values: &[OsString]) -> Option<Self> {
        let [source_root, build_command, db_name, language, queries, sarif_output] = values else {
            return None;
        };

        Some(Self {
            source_root: PathBuf::from(source_root),
            build_command: build_command.to_string_lossy().into_owned(),
            db_name: db_name.to_string_lossy().into_owned(),
            language: language.to_string_lossy().into_owned(),
            queries: queries.to_string_lossy().into_owned(),
            sarif_output: PathBuf::from(sarif_output),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_six_positionals() {
        let args = CliArgs::try_parse_from([
            "codeql-scan",
            "./app",
            "dotnet build",
            "codeql-db-app",
            "csharp",
            "codeql/csharp-all",
            "codeql-results.sarif",
        ])
        .unwrap();

        assert_eq!(args.source_root, PathBuf::from("./app"));
        assert_eq!(args.build_command, "dotnet build");
        assert_eq!(args.db_name, "codeql-db-app");
        assert_eq!(args.language, "csharp");
        assert_eq!(args.queries, "codeql/csharp-all");
        assert_eq!(args.sarif_output, PathBuf::from("codeql-results.sarif"));
    }

    #[test]
    fn test_wrong_arity_rejected() {
        assert!(CliArgs::try_parse_from(["codeql-scan", "a", "b", "c", "d", "e"]).is_err());
        assert!(
            CliArgs::try_parse_from(["codeql-scan", "a", "b", "c", "d", "e", "f", "g"]).is_err()
        );
    }

    #[test]
    fn test_hyphen_leading_values() {
        let args = CliArgs::try_parse_from([
            "codeql-scan",
            "./app",
            "make",
            "-db",
            "cpp",
            "codeql/cpp-queries",
            "out.sarif",
        ])
        .unwrap();
        assert_eq!(args.db_name, "-db");
    }

    #[test]
    fn test_from_positionals() {
        let values: Vec<OsString> = ["-src", "make -j4", "db", "cpp", "codeql/cpp-queries", "out.sarif"]
            .into_iter()
            .map(OsString::from)
            .collect();
        let args = CliArgs::from_positionals(&values).unwrap();
        assert_eq!(args.source_root, PathBuf::from("-src"));
        assert_eq!(args.build_command, "make -j4");
        assert_eq!(args.sarif_output, PathBuf::from("out.sarif"));

        assert!(CliArgs::from_positionals(&values[..5]).is_none());
    }
}
