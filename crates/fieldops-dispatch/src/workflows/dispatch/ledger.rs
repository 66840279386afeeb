use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use super::domain::{Broadcast, JobId, TechnicianId};
use super::repository::{AssignmentStore, BroadcastRepository, RepositoryError};

/// Offer ledger: who was offered which job, and what became of the offer.
///
/// Only `record_broadcast` creates rows and only the accept/expire pair
/// transitions them.
pub struct BroadcastLedger<S> {
    store: Arc<S>,
}

impl<S> BroadcastLedger<S>
where
    S: BroadcastRepository,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Idempotent per (job, technician). Returns the technicians newly offered the job.
    pub async fn record_broadcast(
        &self,
        job: &JobId,
        technicians: &[TechnicianId],
    ) -> Result<Vec<TechnicianId>, RepositoryError> {
        if technicians.is_empty() {
            return Ok(Vec::new());
        }

        let created = self.store.record_sent(job, technicians, Utc::now()).await?;
        let offered: Vec<TechnicianId> = created
            .into_iter()
            .map(|row| row.technician_id)
            .collect();

        if !offered.is_empty() {
            info!(job = %job, offered = offered.len(), "broadcast recorded");
        }
        Ok(offered)
    }

    pub async fn offer(
        &self,
        job: &JobId,
        technician: &TechnicianId,
    ) -> Result<Option<Broadcast>, RepositoryError> {
        self.store.find_broadcast(job, technician).await
    }

    pub async fn list_sent_for_technician(
        &self,
        technician: &TechnicianId,
    ) -> Result<Vec<Broadcast>, RepositoryError> {
        self.store.sent_for_technician(technician).await
    }

    pub async fn list_sent_for_job(&self, job: &JobId) -> Result<Vec<Broadcast>, RepositoryError> {
        self.store.sent_for_job(job).await
    }

    pub async fn history(&self, job: &JobId) -> Result<Vec<Broadcast>, RepositoryError> {
        self.store.history_for_job(job).await
    }
}

impl<S> BroadcastLedger<S>
where
    S: AssignmentStore,
{
    pub async fn mark_accepted(
        &self,
        snapshot: &mut S::Snapshot,
        job: &JobId,
        technician: &TechnicianId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.store.mark_accepted(snapshot, job, technician, at).await
    }

    pub async fn mark_others_expired(
        &self,
        snapshot: &mut S::Snapshot,
        job: &JobId,
        except: &TechnicianId,
        at: DateTime<Utc>,
    ) -> Result<Vec<TechnicianId>, RepositoryError> {
        self.store.expire_others(snapshot, job, except, at).await
    }
}
