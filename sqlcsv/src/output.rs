//! Console and file output of export runs.
//!
//! Tracing carries the detailed diagnostics; this module renders the short
//! human-facing summaries printed at the end of a command.

use sqlcsv_core::{BatchReport, CandidateFailure, ProbeOutcome, Result, SqlCsvError};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::Path;

/// Creates the output directory if it does not exist yet.
///
/// # Errors
/// Returns `FileWrite` when the directory cannot be created
pub fn prepare_output_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| SqlCsvError::file_write(dir, e))
}

/// Saves the batch report as JSON.
///
/// # Errors
/// Returns `Serialization` or `FileWrite`
pub fn save_report(report: &BatchReport, path: &Path) -> Result<()> {
    report.write_json(path)?;
    tracing::info!("Report written to {}", path.display());
    Ok(())
}

/// One line per job plus a totals line.
pub fn format_summary(report: &BatchReport) -> String {
    let mut out = String::from("Export summary:\n");
    for job in &report.jobs {
        let status = match (&job.rows, &job.error) {
            (Some(rows), _) if job.success => format!("OK ({rows} rows)"),
            (_, Some(error)) => format!("FAILED: {error}"),
            _ => "FAILED".to_string(),
        };
        let _ = writeln!(out, "  {} -> {}: {}", job.job, job.csv_output.display(), status);
    }
    let _ = write!(
        out,
        "{} succeeded, {} failed, {} rows written",
        report.succeeded(),
        report.failed(),
        report.total_rows()
    );
    out
}

/// Every rejected candidate with its category and remediation hint.
pub fn format_connection_failure(attempts: &[CandidateFailure]) -> String {
    let mut out = format!("Connection failed after {} attempts:\n", attempts.len());
    for (index, attempt) in attempts.iter().enumerate() {
        let _ = writeln!(out, "  {}. {}", index + 1, attempt.candidate);
        let _ = writeln!(out, "     {}: {}", attempt.kind, attempt.message);
        let _ = writeln!(out, "     hint: {}", attempt.kind.hint());
    }
    out
}

/// Troubleshooting advice, tailored by the probe result when there is one.
pub fn troubleshooting_hints(probe: Option<&ProbeOutcome>) -> String {
    let mut out = String::new();
    match probe {
        Some(outcome) if outcome.is_reachable() => {
            let _ = writeln!(
                out,
                "Network OK ({outcome}): check the credentials and the SQL Server configuration."
            );
        }
        Some(outcome) => {
            let _ = writeln!(out, "Network problem detected: {outcome}");
        }
        None => {}
    }
    out.push_str(
        "Troubleshooting:\n\
         \x20 1. Check MSSQL_SERVER\n\
         \x20 2. Azure SQL: use 'server.database.windows.net'\n\
         \x20 3. Named instances: use 'server\\instance' or 'server,port'\n\
         \x20 4. Make sure the firewall allows port 1433\n\
         \x20 5. From a container, use 'host.docker.internal' instead of 'localhost'\n",
    );
    out
}

/// Installed SQL Server drivers, or installation advice when there are none.
pub fn format_drivers(drivers: &BTreeSet<String>) -> String {
    if drivers.is_empty() {
        return "No SQL Server ODBC driver found. Install Microsoft ODBC Driver 18 (or 17) for SQL Server.".to_string();
    }
    let mut out = String::from("SQL Server ODBC drivers:\n");
    for driver in drivers {
        let _ = writeln!(out, "  {driver}");
    }
    out
}
