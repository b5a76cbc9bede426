//! Per-job results of a batch export run.

use crate::error::SqlCsvError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Result of one export job.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    /// Job name (SQL file name or `<inline>`)
    pub job: String,
    /// CSV destination
    pub csv_output: PathBuf,
    /// Whether the CSV was fully written
    pub success: bool,
    /// Data rows written, when successful
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
    /// Error message, when failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the job finished
    pub finished_at: DateTime<Utc>,
}

impl JobOutcome {
    /// Records a successful job.
    pub fn succeeded(job: impl Into<String>, csv_output: impl Into<PathBuf>, rows: u64) -> Self {
        Self {
            job: job.into(),
            csv_output: csv_output.into(),
            success: true,
            rows: Some(rows),
            error: None,
            finished_at: Utc::now(),
        }
    }

    /// Records a failed job.
    pub fn failed(
        job: impl Into<String>,
        csv_output: impl Into<PathBuf>,
        error: &SqlCsvError,
    ) -> Self {
        Self {
            job: job.into(),
            csv_output: csv_output.into(),
            success: false,
            rows: None,
            error: Some(error.to_string()),
            finished_at: Utc::now(),
        }
    }
}

/// Ordered outcomes of a batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    /// Outcomes in execution order
    pub jobs: Vec<JobOutcome>,
}

impl BatchReport {
    /// Appends an outcome.
    pub fn push(&mut self, outcome: JobOutcome) {
        self.jobs.push(outcome);
    }

    /// Number of successful jobs.
    pub fn succeeded(&self) -> usize {
        self.jobs.iter().filter(|j| j.success).count()
    }

    /// Number of failed jobs.
    pub fn failed(&self) -> usize {
        self.jobs.len() - self.succeeded()
    }

    /// Whether every job succeeded. An empty batch counts as success.
    pub fn all_succeeded(&self) -> bool {
        self.jobs.iter().all(|j| j.success)
    }

    /// Total data rows written by successful jobs.
    pub fn total_rows(&self) -> u64 {
        self.jobs.iter().filter_map(|j| j.rows).sum()
    }

    /// Pretty-printed JSON form of the report.
    ///
    /// # Errors
    /// Returns `Serialization` if the report cannot be encoded
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string_pretty(self).map_err(|source| SqlCsvError::Serialization {
            context: "batch report".to_string(),
            source,
        })
    }

    /// Writes the JSON report to `path`.
    ///
    /// # Errors
    /// Returns `Serialization` or `FileWrite`
    pub fn write_json(&self, path: &Path) -> crate::Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|e| SqlCsvError::file_write(path, e))
    }
}
