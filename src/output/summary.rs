//! Job summaries for the command line

use crate::job::Job;
use crate::worker::{observers_of, META_ENGINE_JOB_ID, META_OBSERVER_RESULTS};
use std::fmt::Write;

/// Formats one job in full: status, progress, warnings and observer results
pub fn format_job(job: &Job) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "=== Job {} ===\n", job.id());
    let _ = writeln!(out, "  Kind: {}", job.kind());
    let _ = writeln!(out, "  Owner: {}", job.owner());
    let _ = writeln!(out, "  Status: {}", job.status());
    let _ = writeln!(out, "  Progress: {:.1}%", job.progress());
    let _ = writeln!(out, "  Public: {}", job.is_public());
    let _ = writeln!(out, "  Created: {}", job.created_at().to_rfc3339());
    let _ = writeln!(out, "  Updated: {}", job.updated_at().to_rfc3339());

    if let Some(session) = job.metadata_value(META_ENGINE_JOB_ID).and_then(|v| v.as_str()) {
        let _ = writeln!(out, "  Session: {}", session);
    }
    if let Some(observers) = observers_of(job) {
        let _ = writeln!(out, "  Observers: {}", observers.join(", "));
    }

    if !job.warnings().is_empty() {
        let _ = writeln!(out, "\nWarnings ({}):", job.warnings().len());
        for warning in job.warnings() {
            let _ = writeln!(out, "  - {}", warning);
        }
    }

    if let Some(serde_json::Value::Object(results)) = job.metadata_value(META_OBSERVER_RESULTS) {
        let _ = writeln!(out, "\nObserver Results:");
        for (name, result) in results {
            match result {
                // Row lists are summarized; the CSV report has the details
                serde_json::Value::Array(rows) => {
                    let _ = writeln!(out, "  {}: {} rows", name, rows.len());
                }
                other => {
                    let _ = writeln!(out, "  {}: {}", name, other);
                }
            }
        }
    }

    out
}

/// One line per job: id, status, progress and warning count
pub fn format_job_list(jobs: &[Job]) -> String {
    if jobs.is_empty() {
        return "No open jobs\n".to_string();
    }

    let mut out = String::new();
    for job in jobs {
        let _ = writeln!(
            out,
            "{}  {:<9}  {:>5.1}%  {} warning(s)  {}",
            job.id(),
            job.status().to_string(),
            job.progress(),
            job.warnings().len(),
            job.owner()
        );
    }
    out
}

pub fn print_job(job: &Job) {
    print!("{}", format_job(job));
}

pub fn print_job_list(jobs: &[Job]) {
    print!("{}", format_job_list(jobs));
}
