//! SQL Server to CSV export tool.
//!
//! Connects through ODBC by trying each supported driver and TLS setting in
//! order, runs the configured queries one after another and writes each
//! result set to a CSV file.
//!
//! # Security Guarantees
//! - Passwords never appear in logs or console output
//! - Queries are executed exactly as written

use anyhow::{Context, Result};
use clap::Parser;
use sqlcsv::output::{
    format_connection_failure, format_drivers, format_summary, prepare_output_dir, save_report,
    troubleshooting_hints,
};
use sqlcsv::{Cli, Command, ExportArgs, ProbeArgs, RunArgs, SMOKE_TEST_QUERY};
use sqlcsv_core::connector::DEFAULT_PROBE_TIMEOUT;
use sqlcsv_core::logging::init_logging;
use sqlcsv_core::odbc::{
    Environment, OdbcOpener, OdbcSession, create_environment, list_available_drivers,
};
use sqlcsv_core::{
    Connector, Exporter, ServerConfig, SqlCsvError, discover_jobs, test_connectivity,
};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.global.verbose, cli.global.quiet) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Dispatches the command; `Ok(false)` means it ran but something failed.
fn run(cli: &Cli) -> Result<bool> {
    let config = cli.connection.server_config();

    match &cli.command {
        Some(Command::Run(args)) => run_batch(&config, args),
        None => {
            let args = RunArgs::from_env().context("Invalid run settings in environment")?;
            run_batch(&config, &args)
        }
        Some(Command::Export(args)) => export_one(&config, args),
        Some(Command::Test) => test_connection(&config),
        Some(Command::Drivers) => list_drivers(),
        Some(Command::Probe(args)) => probe(&config, args),
    }
}

/// Connects with the default candidate table, printing diagnostics on failure.
///
/// Returns `None` once the failure has been reported.
fn connect<'env>(
    env: &'env Environment,
    config: &ServerConfig,
) -> Result<Option<OdbcSession<'env>>> {
    info!("Target: {}", config);

    match Connector::new().connect(&OdbcOpener::new(env), config) {
        Ok(connected) => {
            println!("Connected to {} using {}", config.database, connected.candidate);
            Ok(Some(connected.session))
        }
        Err(SqlCsvError::ConnectionFailure { attempts }) => {
            eprintln!("{}", format_connection_failure(&attempts));
            report_installed_drivers(env);

            let outcome = config.address().ok().map(|address| {
                test_connectivity(&address.host, address.port, DEFAULT_PROBE_TIMEOUT)
            });
            eprintln!("{}", troubleshooting_hints(outcome.as_ref()));
            Ok(None)
        }
        Err(e) => Err(e).context("Cannot connect"),
    }
}

fn report_installed_drivers(env: &Environment) {
    match list_available_drivers(env) {
        Ok(drivers) => eprintln!("{}", format_drivers(&drivers)),
        Err(e) => warn!("Could not list ODBC drivers: {}", e),
    }
}

/// Runs every `.sql` file of the script directory.
fn run_batch(config: &ServerConfig, args: &RunArgs) -> Result<bool> {
    config.require_credentials()?;
    prepare_output_dir(&args.output_dir)?;

    let jobs = if args.sql_dir.is_dir() {
        discover_jobs(&args.sql_dir, &args.output_dir)?
    } else {
        warn!("SQL directory {} not found", args.sql_dir.display());
        Vec::new()
    };
    if jobs.is_empty() && !args.smoke_test {
        println!("No SQL scripts found in {}", args.sql_dir.display());
    }

    let env = create_environment().context("Failed to initialize ODBC")?;
    let Some(session) = connect(&env, config)? else {
        return Ok(false);
    };
    let mut exporter = Exporter::new(session).with_fetch_options(args.fetch.fetch_options());

    let mut smoke_ok = true;
    if args.smoke_test {
        let output = args.smoke_test_output();
        match exporter.export_query(SMOKE_TEST_QUERY, &output) {
            Ok(rows) => info!("Smoke test wrote {} rows to {}", rows, output.display()),
            Err(e) => {
                error!("Smoke test failed: {}", e);
                smoke_ok = false;
            }
        }
    }

    info!("Found {} SQL scripts", jobs.len());
    let report = exporter.run_batch(&jobs);
    exporter.close();

    if !report.jobs.is_empty() {
        println!("{}", format_summary(&report));
    }
    if let Some(path) = &args.report {
        save_report(&report, path)?;
    }
    println!("Results are in {}", args.output_dir.display());

    Ok(smoke_ok && report.all_succeeded())
}

/// Exports a single query file.
fn export_one(config: &ServerConfig, args: &ExportArgs) -> Result<bool> {
    config.require_credentials()?;
    let output = args.output_path();
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        prepare_output_dir(parent)?;
    }

    let env = create_environment().context("Failed to initialize ODBC")?;
    let Some(session) = connect(&env, config)? else {
        return Ok(false);
    };
    let mut exporter = Exporter::new(session).with_fetch_options(args.fetch.fetch_options());

    let rows = exporter
        .export_file(&args.sql_file, &output)
        .with_context(|| format!("Export of {} failed", args.sql_file.display()))?;
    println!("{} rows written to {}", rows, output.display());
    Ok(true)
}

/// Connects and prints the server version and clock.
fn test_connection(config: &ServerConfig) -> Result<bool> {
    info!("Testing database connection...");
    let env = create_environment().context("Failed to initialize ODBC")?;
    let Some(session) = connect(&env, config)? else {
        return Ok(false);
    };

    let info = Exporter::new(session)
        .verify_session()
        .context("Connection test query failed")?;
    println!("Connection test successful");
    println!("  Version: {}", info.version.lines().next().unwrap_or_default());
    println!("  Server time: {}", info.current_time);
    Ok(true)
}

fn list_drivers() -> Result<bool> {
    let env = create_environment().context("Failed to initialize ODBC")?;
    let drivers = list_available_drivers(&env).context("Failed to list ODBC drivers")?;
    println!("{}", format_drivers(&drivers));
    Ok(!drivers.is_empty())
}

fn probe(config: &ServerConfig, args: &ProbeArgs) -> Result<bool> {
    let (host, port) = args.target(&config.server)?;
    let outcome = test_connectivity(&host, port, Duration::from_secs(args.timeout));
    println!("{host}:{port} {outcome}");
    Ok(outcome.is_reachable())
}
