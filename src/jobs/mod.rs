//! Job store facade
//!
//! [`Jobs`] is the only way the rest of the crate reads or writes job
//! snapshots. It is bound to an optional [`Caller`]; ownership of new jobs and
//! visibility of listings both follow from that caller.

use crate::job::{Caller, Job, JobId, Owner, Status};
use crate::storage::{SharedStorage, Storage, StorageResult};
use tracing::debug;

/// Persistence and lookup of jobs on behalf of one caller
#[derive(Clone)]
pub struct Jobs {
    storage: SharedStorage,
    caller: Option<Caller>,
}

impl Jobs {
    pub fn new(storage: SharedStorage, caller: Option<Caller>) -> Self {
        Self { storage, caller }
    }

    /// A store acting for nobody in particular (workers, maintenance)
    pub fn system(storage: SharedStorage) -> Self {
        Self::new(storage, None)
    }

    pub fn caller(&self) -> Option<&Caller> {
        self.caller.as_ref()
    }

    /// Creates and persists a new job
    ///
    /// The job is owned by the caller, or by the system when there is none.
    pub fn create_job(&self, kind: &str) -> StorageResult<Job> {
        let owner = self
            .caller
            .as_ref()
            .map(Caller::as_owner)
            .unwrap_or(Owner::System);

        let job = Job::new(kind, owner);
        self.persist(&job)?;

        debug!(job = %job.id(), owner = %job.owner(), "Created job");
        Ok(job)
    }

    /// Open jobs visible to the caller, most recent first
    ///
    /// Visible means owned by the caller or by the system. Without a caller
    /// nothing is visible.
    pub fn find_my_new_or_pending(&self) -> StorageResult<Vec<Job>> {
        let Some(caller) = &self.caller else {
            return Ok(Vec::new());
        };

        let owners = [caller.as_owner(), Owner::System];
        let statuses: Vec<Status> = Status::all_states()
            .into_iter()
            .filter(Status::is_open)
            .collect();

        self.storage.with(|s| s.list_jobs(&owners, &statuses))
    }

    /// Point lookup; no visibility filtering is applied
    pub fn get_by_uuid(&self, id: JobId) -> StorageResult<Option<Job>> {
        self.storage.with(|s| s.get_job(id))
    }

    /// Inserts or fully overwrites the stored snapshot
    pub fn persist(&self, job: &Job) -> StorageResult<()> {
        self.storage.with(|s| s.upsert_job(job))
    }

    /// Every job of the given owner regardless of status (CLI listings)
    pub fn list_owned_by(&self, owner: &Owner) -> StorageResult<Vec<Job>> {
        self.storage
            .with(|s| s.list_jobs(std::slice::from_ref(owner), &Status::all_states()))
    }
}
