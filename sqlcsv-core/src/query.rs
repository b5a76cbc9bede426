//! Query sources and export job discovery.

use crate::error::SqlCsvError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where the SQL text of a job comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySource {
    /// SQL text given directly
    Inline(String),
    /// A `.sql` file read at execution time
    File(PathBuf),
}

impl QuerySource {
    /// Resolves the SQL text, reading the file if needed.
    ///
    /// # Errors
    /// Returns `FileRead` when the file is missing or not valid UTF-8
    pub fn load(&self) -> crate::Result<String> {
        match self {
            Self::Inline(sql) => Ok(sql.clone()),
            Self::File(path) => load_query_from_file(path),
        }
    }
}

/// One export: a query and the CSV file it is written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryJob {
    /// SQL to execute
    pub source: QuerySource,
    /// CSV destination
    pub output: PathBuf,
}

impl QueryJob {
    /// Creates a job reading SQL from `sql_path`.
    pub fn from_file(sql_path: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            source: QuerySource::File(sql_path.into()),
            output: output.into(),
        }
    }

    /// Creates a job for inline SQL text.
    pub fn inline(sql: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            source: QuerySource::Inline(sql.into()),
            output: output.into(),
        }
    }

    /// Short name used in logs and reports.
    pub fn name(&self) -> String {
        match &self.source {
            QuerySource::File(path) => path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned()),
            QuerySource::Inline(_) => "<inline>".to_string(),
        }
    }
}

/// Reads a query file verbatim as UTF-8 text.
///
/// # Errors
/// Returns `FileRead` when the file is missing, unreadable or not UTF-8
pub fn load_query_from_file(path: &Path) -> crate::Result<String> {
    std::fs::read_to_string(path).map_err(|e| SqlCsvError::file_read(path, e))
}

/// Lists `.sql` files of `sql_dir` as jobs writing into `output_dir`.
///
/// The extension match is case-insensitive and jobs are sorted by file
/// name. Each CSV keeps the SQL file's stem: `sales.sql` → `sales.csv`.
///
/// # Errors
/// Returns `FileRead` when the directory cannot be listed
pub fn discover_jobs(sql_dir: &Path, output_dir: &Path) -> crate::Result<Vec<QueryJob>> {
    let entries = std::fs::read_dir(sql_dir).map_err(|e| SqlCsvError::file_read(sql_dir, e))?;

    let mut sql_files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| SqlCsvError::file_read(sql_dir, e))?;
        let path = entry.path();
        if path.is_file() && has_sql_extension(&path) {
            sql_files.push(path);
        }
    }
    sql_files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    debug!("Found {} SQL files in {}", sql_files.len(), sql_dir.display());

    Ok(sql_files
        .into_iter()
        .map(|path| {
            let csv_name = Path::new(path.file_name().unwrap_or_default()).with_extension("csv");
            QueryJob::from_file(path, output_dir.join(csv_name))
        })
        .collect())
}

fn has_sql_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("sql"))
}
