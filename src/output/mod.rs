//! Output module for crawl reports and job summaries
//!
//! This module handles:
//! - Writing the per-job CSV crawl report
//! - Formatting job snapshots for the command line

mod report;
mod summary;

pub use report::{format_report, report_path, write_report, ReportRow, REPORT_HEADER};
pub use summary::{format_job, format_job_list, print_job, print_job_list};
