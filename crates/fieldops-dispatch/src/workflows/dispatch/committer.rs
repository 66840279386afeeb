use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::domain::{Job, JobId, TechnicianId};
use super::eligibility::{EligibilityEvaluator, IneligibilityReason};
use super::ledger::BroadcastLedger;
use super::repository::{
    AssignmentNotice, AssignmentStore, BestEffort, NotificationTransport, ProfileDirectory,
    RepositoryError, VerificationDirectory,
};

/// Expected, user-facing reasons an accept does not produce an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Busy,
    NotOffered,
    Ineligible,
    AlreadyTaken,
}

impl ConflictKind {
    pub const fn code(self) -> &'static str {
        match self {
            Self::Busy => "busy",
            Self::NotOffered => "not_offered",
            Self::Ineligible => "ineligible",
            Self::AlreadyTaken => "already_taken",
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            Self::Busy => "technician already has an active job",
            Self::NotOffered => "job was not offered to this technician",
            Self::Ineligible => "technician is not eligible to accept jobs",
            Self::AlreadyTaken => "job was already taken by another technician",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AcceptError {
    #[error("job not found")]
    JobNotFound,
    #[error("{}", .kind.message())]
    Conflict {
        kind: ConflictKind,
        reasons: Vec<IneligibilityReason>,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl AcceptError {
    fn conflict(kind: ConflictKind) -> Self {
        Self::Conflict {
            kind,
            reasons: Vec::new(),
        }
    }

    pub fn conflict_kind(&self) -> Option<ConflictKind> {
        match self {
            Self::Conflict { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Post-commit notification results; inspected by callers, never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationReport {
    pub customer: BestEffort,
    pub losers: BestEffort,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcceptOutcome {
    pub job: Job,
    pub expired: Vec<TechnicianId>,
    pub notifications: NotificationReport,
}

/// Sole writer of the accepted/expired transition.
pub struct AssignmentCommitter<S, D, N> {
    store: Arc<S>,
    ledger: Arc<BroadcastLedger<S>>,
    evaluator: Arc<EligibilityEvaluator<S, D>>,
    notifier: Arc<N>,
}

impl<S, D, N> AssignmentCommitter<S, D, N>
where
    S: AssignmentStore,
    D: VerificationDirectory + ProfileDirectory,
    N: NotificationTransport,
{
    pub fn new(
        store: Arc<S>,
        ledger: Arc<BroadcastLedger<S>>,
        evaluator: Arc<EligibilityEvaluator<S, D>>,
        notifier: Arc<N>,
    ) -> Self {
        Self {
            store,
            ledger,
            evaluator,
            notifier,
        }
    }

    /// Converts an offer into a binding assignment.
    ///
    /// Preconditions run in order (busy, offered, eligible) and may be stale;
    /// the conditional claim inside the snapshot is what decides the race.
    pub async fn accept(
        &self,
        job_id: &JobId,
        technician: &TechnicianId,
    ) -> Result<AcceptOutcome, AcceptError> {
        if self.store.fetch_job(job_id).await?.is_none() {
            return Err(AcceptError::JobNotFound);
        }

        if self.store.active_job_for(technician).await?.is_some() {
            return Err(AcceptError::conflict(ConflictKind::Busy));
        }

        if self.ledger.offer(job_id, technician).await?.is_none() {
            return Err(AcceptError::conflict(ConflictKind::NotOffered));
        }

        let report = self.evaluator.evaluate(technician).await;
        if !report.eligible {
            return Err(AcceptError::Conflict {
                kind: ConflictKind::Ineligible,
                reasons: report.reasons,
            });
        }

        let now = Utc::now();
        let (job, expired) = self.commit(job_id, technician, now).await?;
        info!(
            job = %job_id,
            technician = %technician,
            expired = expired.len(),
            "job assigned"
        );

        let notifications = self.notify(&job, &expired, now).await;
        Ok(AcceptOutcome {
            job,
            expired,
            notifications,
        })
    }

    async fn commit(
        &self,
        job_id: &JobId,
        technician: &TechnicianId,
        now: DateTime<Utc>,
    ) -> Result<(Job, Vec<TechnicianId>), AcceptError> {
        let mut snapshot = self.store.begin_snapshot().await?;

        let claimed = match self
            .store
            .claim_job(&mut snapshot, job_id, technician, now)
            .await
        {
            Ok(Some(job)) => job,
            Ok(None) => {
                self.abort(snapshot, job_id).await;
                info!(job = %job_id, technician = %technician, "accept lost the race");
                return Err(AcceptError::conflict(ConflictKind::AlreadyTaken));
            }
            Err(err) => {
                self.abort(snapshot, job_id).await;
                return Err(err.into());
            }
        };

        let settled = match self
            .ledger
            .mark_accepted(&mut snapshot, job_id, technician, now)
            .await
        {
            Ok(()) => {
                self.ledger
                    .mark_others_expired(&mut snapshot, job_id, technician, now)
                    .await
            }
            Err(err) => Err(err),
        };

        let expired = match settled {
            Ok(expired) => expired,
            Err(err) => {
                self.abort(snapshot, job_id).await;
                warn!(job = %job_id, error = %err, "assignment rolled back");
                return Err(err.into());
            }
        };

        self.store.commit_snapshot(snapshot).await?;
        Ok((claimed, expired))
    }

    async fn abort(&self, snapshot: S::Snapshot, job_id: &JobId) {
        if let Err(err) = self.store.abort_snapshot(snapshot).await {
            warn!(job = %job_id, error = %err, "snapshot abort failed");
        }
    }

    async fn notify(
        &self,
        job: &Job,
        expired: &[TechnicianId],
        assigned_at: DateTime<Utc>,
    ) -> NotificationReport {
        let Some(technician) = job.assigned_technician.clone() else {
            return NotificationReport {
                customer: BestEffort::Skipped,
                losers: BestEffort::Skipped,
            };
        };

        let notice = AssignmentNotice {
            job_id: job.id.clone(),
            technician_id: technician,
            assigned_at,
        };
        let customer = BestEffort::from_result(
            self.notifier
                .notify_customer_assigned(&job.customer_id, notice)
                .await,
        );

        let losers = if expired.is_empty() {
            BestEffort::Skipped
        } else {
            BestEffort::from_result(self.notifier.notify_job_taken(expired, &job.id).await)
        };

        if let BestEffort::Failed(reason) = &customer {
            warn!(job = %job.id, %reason, "customer assignment notification failed");
        }
        if let BestEffort::Failed(reason) = &losers {
            warn!(job = %job.id, %reason, "job-taken notification failed");
        }

        NotificationReport { customer, losers }
    }
}
