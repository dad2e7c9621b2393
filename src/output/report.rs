//! Per-job CSV crawl report
//!
//! One file per completed job, `<report-dir>/<job-id>.csv`, listing every
//! HTML page the indexing observer saw across all windows.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Column header of the report
pub const REPORT_HEADER: &str = "status_code,uri,depth,found_on";

/// One line of the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    pub status_code: u16,
    pub uri: String,
    pub depth: u32,
    pub found_on: Option<String>,
}

/// Where the report of `job_id` lives
pub fn report_path(report_dir: &Path, job_id: &str) -> PathBuf {
    report_dir.join(format!("{}.csv", job_id))
}

/// Quotes a field when it contains a delimiter, a quote or a line break
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Formats rows as CSV, header included
pub fn format_report(rows: &[ReportRow]) -> String {
    let mut csv = String::with_capacity(64 * (rows.len() + 1));
    csv.push_str(REPORT_HEADER);
    csv.push('\n');

    for row in rows {
        csv.push_str(&format!(
            "{},{},{},{}\n",
            row.status_code,
            csv_field(&row.uri),
            row.depth,
            csv_field(row.found_on.as_deref().unwrap_or(""))
        ));
    }

    csv
}

/// Writes the report of `job_id`, creating the report directory if needed
///
/// # Returns
///
/// * `Ok(PathBuf)` - Path of the written report
/// * `Err(io::Error)` - Failed to create the directory or write the file
pub fn write_report(report_dir: &Path, job_id: &str, rows: &[ReportRow]) -> io::Result<PathBuf> {
    fs::create_dir_all(report_dir)?;

    let path = report_path(report_dir, job_id);
    let mut file = File::create(&path)?;
    file.write_all(format_report(rows).as_bytes())?;

    Ok(path)
}
