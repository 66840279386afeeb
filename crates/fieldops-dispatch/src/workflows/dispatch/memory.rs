//! In-memory reference implementations of the dispatch collaborators.
//!
//! `InMemoryDispatchStore` keeps jobs and the broadcast ledger behind one
//! async mutex. A snapshot owns that lock for its whole lifetime and records an
//! undo log, so the conditional claim and the ledger transitions become visible
//! together or not at all.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use super::domain::{
    Broadcast, BroadcastState, Job, JobId, JobStatus, TechnicianId, TechnicianProfile,
    VerificationStatus,
};
use super::geo::GeoPoint;
use super::repository::{
    AssignmentStore, BroadcastRepository, JobRepository, ProfileDirectory, RepositoryError,
    VerificationDirectory,
};

#[derive(Debug, Default)]
struct DispatchState {
    jobs: BTreeMap<JobId, Job>,
    broadcasts: Vec<Broadcast>,
}

impl DispatchState {
    fn broadcast_index(&self, job: &JobId, technician: &TechnicianId) -> Option<usize> {
        self.broadcasts
            .iter()
            .position(|row| &row.job_id == job && &row.technician_id == technician)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryDispatchStore {
    state: Arc<Mutex<DispatchState>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryDispatchStore {
    /// Simulates an outage: every subsequent call fails with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(RepositoryError::Unavailable(
                "dispatch store offline".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    /// Every ledger row, in insertion order.
    pub async fn all_broadcasts(&self) -> Vec<Broadcast> {
        self.state.lock().await.broadcasts.clone()
    }

    /// Moves an assigned job along its service lifecycle (used by fixtures and demos).
    pub async fn advance_job(&self, id: &JobId, status: JobStatus) -> Result<(), RepositoryError> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        let job = state.jobs.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if job.assigned_technician.is_none() && status.holds_assignment() {
            return Err(RepositoryError::Aborted(format!(
                "job {id} has no assignee for status {}",
                status.label()
            )));
        }
        job.status = status;
        Ok(())
    }
}

enum Undo {
    Job(Job),
    Broadcast { index: usize, previous: Broadcast },
}

/// Open transaction against `InMemoryDispatchStore`.
pub struct MemorySnapshot {
    state: OwnedMutexGuard<DispatchState>,
    undo: Vec<Undo>,
    committed: bool,
}

impl MemorySnapshot {
    fn rollback(&mut self) {
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::Job(previous) => {
                    self.state.jobs.insert(previous.id.clone(), previous);
                }
                Undo::Broadcast { index, previous } => {
                    self.state.broadcasts[index] = previous;
                }
            }
        }
    }
}

impl Drop for MemorySnapshot {
    fn drop(&mut self) {
        if !self.committed {
            self.rollback();
        }
    }
}

#[async_trait]
impl JobRepository for InMemoryDispatchStore {
    async fn insert_job(&self, job: Job) -> Result<Job, RepositoryError> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        if state.jobs.contains_key(&job.id) {
            return Err(RepositoryError::Conflict);
        }
        state.jobs.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    async fn fetch_job(&self, id: &JobId) -> Result<Option<Job>, RepositoryError> {
        self.ensure_available()?;
        Ok(self.state.lock().await.jobs.get(id).cloned())
    }

    async fn open_jobs(&self) -> Result<Vec<Job>, RepositoryError> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .values()
            .filter(|job| job.is_claimable())
            .cloned()
            .collect())
    }

    async fn active_job_for(
        &self,
        technician: &TechnicianId,
    ) -> Result<Option<Job>, RepositoryError> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .values()
            .find(|job| {
                job.status.is_active() && job.assigned_technician.as_ref() == Some(technician)
            })
            .cloned())
    }

    async fn mark_broadcasted(&self, id: &JobId) -> Result<bool, RepositoryError> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        let job = state.jobs.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if job.status == JobStatus::Requested && job.assigned_technician.is_none() {
            job.status = JobStatus::Broadcasted;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

#[async_trait]
impl BroadcastRepository for InMemoryDispatchStore {
    async fn record_sent(
        &self,
        job: &JobId,
        technicians: &[TechnicianId],
        at: DateTime<Utc>,
    ) -> Result<Vec<Broadcast>, RepositoryError> {
        self.ensure_available()?;
        let mut state = self.state.lock().await;
        let claimable = state.jobs.get(job).is_some_and(Job::is_claimable);
        if !claimable {
            return Ok(Vec::new());
        }
        let mut created = Vec::new();
        for technician in technicians {
            if state.broadcast_index(job, technician).is_some() {
                continue;
            }
            let row = Broadcast::sent(job.clone(), technician.clone(), at);
            state.broadcasts.push(row.clone());
            created.push(row);
        }
        Ok(created)
    }

    async fn find_broadcast(
        &self,
        job: &JobId,
        technician: &TechnicianId,
    ) -> Result<Option<Broadcast>, RepositoryError> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        Ok(state
            .broadcast_index(job, technician)
            .map(|index| state.broadcasts[index].clone()))
    }

    async fn sent_for_technician(
        &self,
        technician: &TechnicianId,
    ) -> Result<Vec<Broadcast>, RepositoryError> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        Ok(state
            .broadcasts
            .iter()
            .filter(|row| &row.technician_id == technician && row.state == BroadcastState::Sent)
            .cloned()
            .collect())
    }

    async fn sent_for_job(&self, job: &JobId) -> Result<Vec<Broadcast>, RepositoryError> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        Ok(state
            .broadcasts
            .iter()
            .filter(|row| &row.job_id == job && row.state == BroadcastState::Sent)
            .cloned()
            .collect())
    }

    async fn history_for_job(&self, job: &JobId) -> Result<Vec<Broadcast>, RepositoryError> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        Ok(state
            .broadcasts
            .iter()
            .filter(|row| &row.job_id == job)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AssignmentStore for InMemoryDispatchStore {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, RepositoryError> {
        self.ensure_available()?;
        let state = self.state.clone().lock_owned().await;
        Ok(MemorySnapshot {
            state,
            undo: Vec::new(),
            committed: false,
        })
    }

    async fn commit_snapshot(&self, mut snapshot: MemorySnapshot) -> Result<(), RepositoryError> {
        // Dropping an uncommitted snapshot rolls it back.
        self.ensure_available()?;
        snapshot.committed = true;
        Ok(())
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), RepositoryError> {
        drop(snapshot);
        Ok(())
    }

    async fn claim_job(
        &self,
        snapshot: &mut MemorySnapshot,
        job: &JobId,
        technician: &TechnicianId,
        at: DateTime<Utc>,
    ) -> Result<Option<Job>, RepositoryError> {
        self.ensure_available()?;
        let record = snapshot
            .state
            .jobs
            .get_mut(job)
            .ok_or(RepositoryError::NotFound)?;
        if !record.is_claimable() {
            return Ok(None);
        }

        let previous = record.clone();
        record.status = JobStatus::Accepted;
        record.assigned_technician = Some(technician.clone());
        record.assigned_at = Some(at);
        let claimed = record.clone();
        snapshot.undo.push(Undo::Job(previous));
        Ok(Some(claimed))
    }

    async fn mark_accepted(
        &self,
        snapshot: &mut MemorySnapshot,
        job: &JobId,
        technician: &TechnicianId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.ensure_available()?;
        let index = snapshot
            .state
            .broadcast_index(job, technician)
            .filter(|&index| snapshot.state.broadcasts[index].state == BroadcastState::Sent)
            .ok_or_else(|| {
                RepositoryError::Aborted(format!("no sent broadcast for {job}/{technician}"))
            })?;

        let row = &mut snapshot.state.broadcasts[index];
        let previous = row.clone();
        row.state = BroadcastState::Accepted;
        row.updated_at = at;
        snapshot.undo.push(Undo::Broadcast { index, previous });
        Ok(())
    }

    async fn expire_others(
        &self,
        snapshot: &mut MemorySnapshot,
        job: &JobId,
        except: &TechnicianId,
        at: DateTime<Utc>,
    ) -> Result<Vec<TechnicianId>, RepositoryError> {
        self.ensure_available()?;
        let mut expired = Vec::new();
        for index in 0..snapshot.state.broadcasts.len() {
            let row = &mut snapshot.state.broadcasts[index];
            if &row.job_id != job || &row.technician_id == except {
                continue;
            }
            if row.state != BroadcastState::Sent {
                continue;
            }
            let previous = row.clone();
            row.state = BroadcastState::Expired;
            row.updated_at = at;
            expired.push(row.technician_id.clone());
            snapshot.undo.push(Undo::Broadcast { index, previous });
        }
        Ok(expired)
    }
}

#[derive(Debug, Clone)]
struct TechnicianEntry {
    profile: TechnicianProfile,
    verification: VerificationStatus,
}

/// Combined verification and profile directory keyed by technician.
#[derive(Default, Clone)]
pub struct InMemoryTechnicianDirectory {
    entries: Arc<RwLock<BTreeMap<TechnicianId, TechnicianEntry>>>,
}

impl InMemoryTechnicianDirectory {
    pub async fn upsert(&self, profile: TechnicianProfile, verification: VerificationStatus) {
        let mut guard = self.entries.write().await;
        guard.insert(
            profile.technician_id.clone(),
            TechnicianEntry {
                profile,
                verification,
            },
        );
    }
}

#[async_trait]
impl VerificationDirectory for InMemoryTechnicianDirectory {
    async fn verification_status(
        &self,
        technician: &TechnicianId,
    ) -> Result<VerificationStatus, RepositoryError> {
        let guard = self.entries.read().await;
        guard
            .get(technician)
            .map(|entry| entry.verification)
            .ok_or(RepositoryError::NotFound)
    }
}

#[async_trait]
impl ProfileDirectory for InMemoryTechnicianDirectory {
    async fn profile(
        &self,
        technician: &TechnicianId,
    ) -> Result<Option<TechnicianProfile>, RepositoryError> {
        let guard = self.entries.read().await;
        Ok(guard.get(technician).map(|entry| entry.profile.clone()))
    }

    async fn technicians(&self) -> Result<Vec<TechnicianProfile>, RepositoryError> {
        let guard = self.entries.read().await;
        Ok(guard.values().map(|entry| entry.profile.clone()).collect())
    }

    async fn update_location(
        &self,
        technician: &TechnicianId,
        location: GeoPoint,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.entries.write().await;
        let entry = guard.get_mut(technician).ok_or(RepositoryError::NotFound)?;
        entry.profile.location = Some(location);
        Ok(())
    }

    async fn set_online(
        &self,
        technician: &TechnicianId,
        online: bool,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.entries.write().await;
        let entry = guard.get_mut(technician).ok_or(RepositoryError::NotFound)?;
        entry.profile.is_online = online;
        Ok(())
    }
}
