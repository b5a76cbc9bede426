//! Command-line interface for sqlcsv.
//!
//! The argument structures live here so they can be parsed in tests; the
//! binary in `main.rs` runs the commands.

pub mod output;

use clap::{ArgAction, Args, Parser, Subcommand};
use sqlcsv_core::connector::DEFAULT_PROBE_TIMEOUT;
use sqlcsv_core::session::{DEFAULT_BATCH_SIZE, DEFAULT_MAX_TEXT_LEN};
use sqlcsv_core::{Credentials, FetchOptions, ServerConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Query used by `--smoke-test`.
pub const SMOKE_TEST_QUERY: &str =
    "SELECT 'test' AS kind, GETDATE() AS executed_at, @@VERSION AS sql_version";

/// File written by `--smoke-test` inside the output directory.
pub const SMOKE_TEST_FILE: &str = "connection_test.csv";

/// CLI argument structure
#[derive(Parser)]
#[command(name = "sqlcsv")]
#[command(about = "Export SQL Server query results to CSV")]
#[command(version)]
#[command(long_about = "
sqlcsv - SQL Server to CSV exporter

Connects to Microsoft SQL Server through ODBC, trying each supported
driver and encryption setting in turn, then runs every .sql file of a
directory and writes one CSV per file.

CSV FORMAT:
- UTF-8, every field quoted, CRLF line endings
- NULL as empty field, bits as 1/0, whole floats without decimals

ENVIRONMENT:
  MSSQL_SERVER, MSSQL_DATABASE, MSSQL_USERNAME, MSSQL_PASSWORD,
  MSSQL_TRUSTED_CONNECTION, SQLCSV_SQL_DIR, SQLCSV_OUTPUT_DIR

EXAMPLES:
  sqlcsv                                  # run sql_scripts/*.sql into results/
  sqlcsv run --sql-dir queries --report report.json
  sqlcsv export daily.sql -o daily.csv
  sqlcsv test
  sqlcsv probe --port 1433
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Export every .sql file of a directory (default)
    Run(RunArgs),
    /// Export a single query file
    Export(ExportArgs),
    /// Connect and print the server version
    Test,
    /// List installed SQL Server ODBC drivers
    Drivers,
    /// Check TCP reachability of the server
    Probe(ProbeArgs),
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all output except errors")]
    pub quiet: bool,
}

/// Connection settings. Not `Debug`: it holds the plain password.
#[derive(Args)]
pub struct ConnectionArgs {
    /// Server name, `host`, `host,port` or `host\instance`
    #[arg(long, global = true, env = "MSSQL_SERVER", default_value = "localhost")]
    pub server: String,

    /// Database name
    #[arg(long, global = true, env = "MSSQL_DATABASE", default_value = "master")]
    pub database: String,

    /// SQL authentication user
    #[arg(long, global = true, env = "MSSQL_USERNAME")]
    pub username: Option<String>,

    /// SQL authentication password
    #[arg(long, global = true, env = "MSSQL_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Use integrated (trusted) authentication instead of SQL authentication
    #[arg(
        long,
        global = true,
        env = "MSSQL_TRUSTED_CONNECTION",
        default_value = "false",
        default_missing_value = "true",
        num_args = 0..=1,
        require_equals = true,
        action = ArgAction::Set,
        value_parser = parse_trusted
    )]
    pub trusted_connection: bool,

    /// Login timeout in seconds
    #[arg(long, global = true, default_value_t = 30)]
    pub login_timeout: u64,
}

impl ConnectionArgs {
    /// Builds the server configuration from the parsed arguments.
    pub fn server_config(&self) -> ServerConfig {
        let timeout = Duration::from_secs(self.login_timeout);
        ServerConfig {
            connect_timeout: timeout,
            login_timeout: timeout,
            ..ServerConfig::new(self.server.clone())
                .with_database(self.database.clone())
                .with_credentials(Credentials::new(
                    self.username.clone(),
                    self.password.clone(),
                ))
                .with_trusted_connection(self.trusted_connection)
        }
    }
}

/// Only a case-insensitive `true` enables trusted authentication.
///
/// # Errors
/// Never fails; every other value disables it
pub fn parse_trusted(value: &str) -> Result<bool, String> {
    Ok(value.trim().eq_ignore_ascii_case("true"))
}

#[derive(Debug, Clone, Args)]
pub struct FetchArgs {
    /// Rows fetched per round trip
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Largest text column bound in batches; longer or unbounded columns are read row by row
    #[arg(long, default_value_t = DEFAULT_MAX_TEXT_LEN)]
    pub max_text_len: usize,
}

impl FetchArgs {
    /// Fetch options for the exporter.
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions::default()
            .with_batch_size(self.batch_size)
            .with_max_text_len(self.max_text_len)
    }
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Directory containing .sql files
    #[arg(long, env = "SQLCSV_SQL_DIR", default_value = "sql_scripts")]
    pub sql_dir: PathBuf,

    /// Directory receiving the CSV files
    #[arg(short, long, env = "SQLCSV_OUTPUT_DIR", default_value = "results")]
    pub output_dir: PathBuf,

    /// Write a JSON report of every job to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Export a fixed test query to connection_test.csv before the batch (off by default)
    #[arg(long)]
    pub smoke_test: bool,

    #[command(flatten)]
    pub fetch: FetchArgs,
}

impl RunArgs {
    /// Run arguments as given by environment and defaults alone.
    ///
    /// # Errors
    /// Returns the parse error when an environment value is invalid
    pub fn from_env() -> Result<Self, clap::Error> {
        #[derive(Parser)]
        struct Defaults {
            #[command(flatten)]
            run: RunArgs,
        }
        Defaults::try_parse_from(["sqlcsv"]).map(|defaults| defaults.run)
    }

    /// Destination of the smoke test export.
    pub fn smoke_test_output(&self) -> PathBuf {
        self.output_dir.join(SMOKE_TEST_FILE)
    }
}

#[derive(Debug, Clone, Args)]
pub struct ExportArgs {
    /// Query file to execute
    #[arg(value_name = "SQL_FILE")]
    pub sql_file: PathBuf,

    /// Output CSV path (defaults to the query file name with .csv)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub fetch: FetchArgs,
}

impl ExportArgs {
    /// Output path, derived from the query file name when not given.
    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            Path::new(self.sql_file.file_name().unwrap_or_default()).with_extension("csv")
        })
    }
}

#[derive(Debug, Clone, Args)]
pub struct ProbeArgs {
    /// Host to probe (defaults to the host part of --server)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to probe (defaults to the port of --server, else 1433)
    #[arg(long)]
    pub port: Option<u16>,

    /// Connect timeout in seconds
    #[arg(long, default_value_t = DEFAULT_PROBE_TIMEOUT.as_secs())]
    pub timeout: u64,
}

impl ProbeArgs {
    /// Host and port to probe, falling back to the server setting.
    ///
    /// # Errors
    /// Returns a configuration error when `server` cannot be parsed
    pub fn target(&self, server: &str) -> sqlcsv_core::Result<(String, u16)> {
        let address = sqlcsv_core::ServerAddress::parse(server)?;
        Ok((
            self.host.clone().unwrap_or(address.host),
            self.port.unwrap_or(address.port),
        ))
    }
}
