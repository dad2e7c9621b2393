//! Job model
//!
//! A [`Job`] is an immutable snapshot of one unit of work. It knows nothing
//! about crawling; the execution loop keeps its crawl-specific state in the
//! job's metadata bag.

#[allow(clippy::module_inception)]
mod job;
mod owner;
mod status;

pub use job::{warnings_from_json, Job, JobId, JobParts};
pub use owner::{Caller, Owner};
pub use status::Status;

use thiserror::Error;

/// Argument errors raised by job transformations
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid job identifier '{0}': expected a version-4 UUID")]
    InvalidId(String),

    #[error("Progress must be within [0, 100], got {0}")]
    ProgressOutOfRange(f64),

    #[error("System-owned jobs cannot be made public")]
    PublicSystemJob,

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: Status, to: Status },

    #[error("A job cannot be its own parent")]
    SelfParent,

    #[error("Warnings must be strings, got {0}")]
    InvalidWarning(String),
}
