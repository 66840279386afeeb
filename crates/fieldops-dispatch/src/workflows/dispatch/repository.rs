use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Broadcast, CustomerId, Job, JobId, TechnicianId, TechnicianProfile, VerificationStatus,
};
use super::geo::GeoPoint;

/// Booking records owned by the booking collaborator.
///
/// Every status change performed through this trait is guarded; nothing here
/// reads a job and writes it back unconditionally.
#[async_trait]
pub trait JobRepository: Send + Sync + 'static {
    async fn insert_job(&self, job: Job) -> Result<Job, RepositoryError>;
    async fn fetch_job(&self, id: &JobId) -> Result<Option<Job>, RepositoryError>;
    /// Jobs in `requested`/`broadcasted` with no assignee.
    async fn open_jobs(&self) -> Result<Vec<Job>, RepositoryError>;
    /// The job currently keeping `technician` busy, if any.
    async fn active_job_for(
        &self,
        technician: &TechnicianId,
    ) -> Result<Option<Job>, RepositoryError>;
    /// `requested` -> `broadcasted`, only while the job is unassigned.
    /// Returns whether the transition happened.
    async fn mark_broadcasted(&self, id: &JobId) -> Result<bool, RepositoryError>;
}

/// Append/transition-only offer ledger. Rows are never deleted.
#[async_trait]
pub trait BroadcastRepository: Send + Sync + 'static {
    /// Inserts a `sent` row for every technician without an existing row for
    /// `job`, returning only the rows created by this call.
    ///
    /// The claimability check and the inserts are atomic: once `job` is unknown,
    /// assigned or past `broadcasted`, nothing is written and the result is empty.
    async fn record_sent(
        &self,
        job: &JobId,
        technicians: &[TechnicianId],
        at: DateTime<Utc>,
    ) -> Result<Vec<Broadcast>, RepositoryError>;
    async fn find_broadcast(
        &self,
        job: &JobId,
        technician: &TechnicianId,
    ) -> Result<Option<Broadcast>, RepositoryError>;
    async fn sent_for_technician(
        &self,
        technician: &TechnicianId,
    ) -> Result<Vec<Broadcast>, RepositoryError>;
    async fn sent_for_job(&self, job: &JobId) -> Result<Vec<Broadcast>, RepositoryError>;
    /// Every row for `job` regardless of state, oldest first.
    async fn history_for_job(&self, job: &JobId) -> Result<Vec<Broadcast>, RepositoryError>;
}

/// Transactional surface used by the assignment committer.
///
/// Mutations take `&mut Self::Snapshot`. The snapshot is consumed by
/// `commit_snapshot` or `abort_snapshot`; a snapshot dropped without commit
/// must roll back every mutation made through it.
#[async_trait]
pub trait AssignmentStore: JobRepository + BroadcastRepository {
    type Snapshot: Send;

    async fn begin_snapshot(&self) -> Result<Self::Snapshot, RepositoryError>;
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), RepositoryError>;
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), RepositoryError>;

    /// Single conditional update: set `accepted`, the assignee and `assigned_at`
    /// only if the job is `requested`/`broadcasted` and unassigned.
    ///
    /// `Ok(None)` means zero rows matched (the job was already taken or closed).
    async fn claim_job(
        &self,
        snapshot: &mut Self::Snapshot,
        job: &JobId,
        technician: &TechnicianId,
        at: DateTime<Utc>,
    ) -> Result<Option<Job>, RepositoryError>;

    /// `sent` -> `accepted` for the winning row.
    async fn mark_accepted(
        &self,
        snapshot: &mut Self::Snapshot,
        job: &JobId,
        technician: &TechnicianId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// `sent` -> `expired` for every other row of `job`; returns the expired technicians.
    async fn expire_others(
        &self,
        snapshot: &mut Self::Snapshot,
        job: &JobId,
        except: &TechnicianId,
        at: DateTime<Utc>,
    ) -> Result<Vec<TechnicianId>, RepositoryError>;
}

/// KYC and bank verification collaborator.
#[async_trait]
pub trait VerificationDirectory: Send + Sync + 'static {
    async fn verification_status(
        &self,
        technician: &TechnicianId,
    ) -> Result<VerificationStatus, RepositoryError>;
}

/// Training/work-status collaborator, also the owner of the stored location.
#[async_trait]
pub trait ProfileDirectory: Send + Sync + 'static {
    async fn profile(
        &self,
        technician: &TechnicianId,
    ) -> Result<Option<TechnicianProfile>, RepositoryError>;
    async fn technicians(&self) -> Result<Vec<TechnicianProfile>, RepositoryError>;
    async fn update_location(
        &self,
        technician: &TechnicianId,
        location: GeoPoint,
    ) -> Result<(), RepositoryError>;
    async fn set_online(&self, technician: &TechnicianId, online: bool)
        -> Result<(), RepositoryError>;
}

/// Storage error shared by every collaborator trait.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("transaction aborted: {0}")]
    Aborted(String),
}

/// Fire-and-forget push transport.
#[async_trait]
pub trait NotificationTransport: Send + Sync + 'static {
    async fn notify_customer_assigned(
        &self,
        customer: &CustomerId,
        notice: AssignmentNotice,
    ) -> Result<(), NotificationError>;
    async fn notify_job_taken(
        &self,
        technicians: &[TechnicianId],
        job: &JobId,
    ) -> Result<(), NotificationError>;
}

/// Payload pushed to the customer once a technician holds the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentNotice {
    pub job_id: JobId,
    pub technician_id: TechnicianId,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Result of a step that is allowed to fail without failing its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum BestEffort {
    Delivered,
    Skipped,
    Failed(String),
}

impl BestEffort {
    pub fn from_result<E: std::fmt::Display>(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::Delivered,
            Err(err) => Self::Failed(err.to_string()),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}
