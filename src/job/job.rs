//! The immutable job value
//!
//! Every transformation returns a sibling value; a `Job` held by one layer is
//! never changed underneath it by another.

use crate::job::{JobError, Owner, Status};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::{Uuid, Version};

/// Job identity: a random version-4 UUID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parses and validates a job identifier
    ///
    /// Anything that is not a hyphenated version-4 UUID is rejected.
    pub fn parse(s: &str) -> Result<Self, JobError> {
        let uuid = Uuid::parse_str(s).map_err(|_| JobError::InvalidId(s.to_string()))?;
        if uuid.get_version() != Some(Version::Random) {
            return Err(JobError::InvalidId(s.to_string()));
        }
        Ok(Self(uuid))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for JobId {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Raw field values used to rebuild a job from storage
///
/// [`Job::from_parts`] re-checks every invariant, so a corrupted row can't
/// produce an invalid job.
#[derive(Debug, Clone)]
pub struct JobParts {
    pub id: JobId,
    pub kind: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: Status,
    pub owner: Owner,
    pub progress: f64,
    pub warnings: Vec<String>,
    pub metadata: Map<String, Value>,
    pub is_public: bool,
    pub parent: Option<JobId>,
}

/// One schedulable unit of long-running work
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    id: JobId,
    kind: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    status: Status,
    owner: Owner,
    progress: f64,
    warnings: Vec<String>,
    metadata: Map<String, Value>,
    is_public: bool,
    parent: Option<JobId>,
}

impl Job {
    /// Creates a fresh job in `New` status
    pub fn new(kind: impl Into<String>, owner: Owner) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new_v4(),
            kind: kind.into(),
            created_at: now,
            updated_at: now,
            status: Status::New,
            owner,
            progress: 0.0,
            warnings: Vec::new(),
            metadata: Map::new(),
            is_public: false,
            parent: None,
        }
    }

    /// Rebuilds a job from stored fields, validating invariants
    pub fn from_parts(parts: JobParts) -> Result<Self, JobError> {
        check_progress(parts.progress)?;
        if parts.is_public && parts.owner.is_system() {
            return Err(JobError::PublicSystemJob);
        }
        if parts.parent == Some(parts.id) {
            return Err(JobError::SelfParent);
        }

        Ok(Self {
            id: parts.id,
            kind: parts.kind,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
            status: parts.status,
            owner: parts.owner,
            progress: parts.progress,
            warnings: parts.warnings,
            metadata: parts.metadata,
            is_public: parts.is_public,
            parent: parts.parent,
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn is_public(&self) -> bool {
        self.is_public
    }

    pub fn parent(&self) -> Option<JobId> {
        self.parent
    }

    /// Moves the job to `Pending`; allowed from `New` and `Pending`
    pub fn mark_pending(&self) -> Result<Self, JobError> {
        self.with_status(Status::Pending)
    }

    /// Moves the job to `Completed` with progress 100
    pub fn mark_completed(&self) -> Self {
        let mut next = self.touched();
        next.status = Status::Completed;
        next.progress = 100.0;
        next
    }

    fn with_status(&self, status: Status) -> Result<Self, JobError> {
        if !self.status.can_transition_to(status) {
            return Err(JobError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        let mut next = self.touched();
        next.status = status;
        Ok(next)
    }

    /// Sets progress; values outside `[0, 100]` (and NaN) are rejected
    pub fn with_progress(&self, progress: f64) -> Result<Self, JobError> {
        check_progress(progress)?;
        let mut next = self.touched();
        next.progress = progress;
        Ok(next)
    }

    pub fn with_warning(&self, warning: impl Into<String>) -> Self {
        let mut next = self.touched();
        next.warnings.push(warning.into());
        next
    }

    /// Appends warnings in order; duplicates are kept
    pub fn with_warnings<I, S>(&self, warnings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.touched();
        next.warnings.extend(warnings.into_iter().map(Into::into));
        next
    }

    pub fn with_metadata(&self, key: impl Into<String>, value: Value) -> Self {
        let mut next = self.touched();
        next.metadata.insert(key.into(), value);
        next
    }

    /// Replaces the whole metadata bag
    pub fn with_metadata_map(&self, metadata: Map<String, Value>) -> Self {
        let mut next = self.touched();
        next.metadata = metadata;
        next
    }

    /// Sets visibility; system-owned jobs can never be public
    pub fn with_public(&self, is_public: bool) -> Result<Self, JobError> {
        if is_public && self.owner.is_system() {
            return Err(JobError::PublicSystemJob);
        }
        let mut next = self.touched();
        next.is_public = is_public;
        Ok(next)
    }

    pub fn with_parent(&self, parent: Option<JobId>) -> Result<Self, JobError> {
        if parent == Some(self.id) {
            return Err(JobError::SelfParent);
        }
        let mut next = self.touched();
        next.parent = parent;
        Ok(next)
    }

    fn touched(&self) -> Self {
        let mut next = self.clone();
        next.updated_at = Utc::now();
        next
    }
}

fn check_progress(progress: f64) -> Result<(), JobError> {
    if !(0.0..=100.0).contains(&progress) {
        return Err(JobError::ProgressOutOfRange(progress));
    }
    Ok(())
}

/// Decodes a stored warnings list, rejecting non-string entries
pub fn warnings_from_json(value: Value) -> Result<Vec<String>, JobError> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(JobError::InvalidWarning(other.to_string())),
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        other => Err(JobError::InvalidWarning(other.to_string())),
    }
}
