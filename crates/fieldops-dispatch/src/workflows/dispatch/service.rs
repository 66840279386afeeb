use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::candidates::{
    compare_distance, CandidateSelector, JobMatch, JobSearch, SearchScope, SelectionError,
};
use super::committer::{AcceptError, AcceptOutcome, AssignmentCommitter, ConflictKind};
use super::domain::{Broadcast, Job, JobId, JobRequest, TechnicianId, TechnicianProfile};
use super::eligibility::{EligibilityEvaluator, EligibilityReport, IneligibilityReason};
use super::geo::GeoPoint;
use super::ledger::BroadcastLedger;
use super::rematch::{LocationRematcher, RematchOutcome};
use super::repository::{
    AssignmentStore, NotificationTransport, ProfileDirectory, RepositoryError,
    VerificationDirectory,
};
use crate::config::DispatchConfig;

static JOB_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_job_id() -> JobId {
    let id = JOB_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    JobId(format!("job-{id:06}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    Accept,
}

/// Both eligibility views for one technician.
#[derive(Debug, Clone, Serialize)]
pub struct EligibilityView {
    pub evaluation: EligibilityReport,
    pub activation: EligibilityReport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BroadcastOutcome {
    pub job: Job,
    pub offered: Vec<TechnicianId>,
}

/// Error raised by the dispatch service.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("missing or invalid technician identity")]
    Unauthenticated,
    #[error("technician is not eligible: {:?}", .0.codes())]
    Ineligible(EligibilityReport),
    #[error("{}", .kind.message())]
    Conflict {
        kind: ConflictKind,
        reasons: Vec<IneligibilityReason>,
    },
    #[error("job {0} already exists")]
    DuplicateJob(JobId),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("technician location unknown")]
    LocationUnknown,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for DispatchError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound => Self::NotFound("record"),
            other => Self::Repository(other),
        }
    }
}

impl From<AcceptError> for DispatchError {
    fn from(value: AcceptError) -> Self {
        match value {
            AcceptError::JobNotFound => Self::NotFound("job"),
            AcceptError::Conflict { kind, reasons } => Self::Conflict { kind, reasons },
            AcceptError::Repository(err) => err.into(),
        }
    }
}

impl From<SelectionError> for DispatchError {
    fn from(value: SelectionError) -> Self {
        match value {
            SelectionError::Ineligible(report) => Self::Ineligible(report),
            SelectionError::LocationUnknown => Self::LocationUnknown,
            SelectionError::InvalidRadius(radius) => {
                Self::InvalidInput(format!("radius must be positive meters, got {radius}"))
            }
            SelectionError::Repository(err) => err.into(),
        }
    }
}

/// Facade composing eligibility, selection, ledger, committer and rematch.
pub struct DispatchService<S, D, N> {
    store: Arc<S>,
    directory: Arc<D>,
    evaluator: Arc<EligibilityEvaluator<S, D>>,
    selector: Arc<CandidateSelector<S, D>>,
    ledger: Arc<BroadcastLedger<S>>,
    committer: AssignmentCommitter<S, D, N>,
    rematcher: LocationRematcher<S, D>,
}

impl<S, D, N> DispatchService<S, D, N>
where
    S: AssignmentStore,
    D: VerificationDirectory + ProfileDirectory,
    N: NotificationTransport,
{
    pub fn new(store: Arc<S>, directory: Arc<D>, notifier: Arc<N>, config: DispatchConfig) -> Self {
        let evaluator = Arc::new(EligibilityEvaluator::new(store.clone(), directory.clone()));
        let ledger = Arc::new(BroadcastLedger::new(store.clone()));
        let rematch_cooldown = config.rematch_cooldown;
        let selector = Arc::new(CandidateSelector::new(
            store.clone(),
            directory.clone(),
            evaluator.clone(),
            config,
        ));
        let committer = AssignmentCommitter::new(
            store.clone(),
            ledger.clone(),
            evaluator.clone(),
            notifier,
        );
        let rematcher = LocationRematcher::new(
            store.clone(),
            directory.clone(),
            selector.clone(),
            ledger.clone(),
            rematch_cooldown,
        );

        Self {
            store,
            directory,
            evaluator,
            selector,
            ledger,
            committer,
            rematcher,
        }
    }

    pub async fn eligibility(&self, technician: &TechnicianId) -> EligibilityView {
        let evaluation = self.evaluator.evaluate(technician).await;
        let activation = evaluation.activation();
        EligibilityView {
            evaluation,
            activation,
        }
    }

    /// Open jobs visible to the technician: offers still open plus feed-radius matches.
    ///
    /// Ineligible or busy technicians get an empty list rather than an error.
    pub async fn my_jobs(&self, technician: &TechnicianId) -> Result<Vec<JobMatch>, DispatchError> {
        let report = self.evaluator.evaluate(technician).await;
        if !report.eligible {
            return Ok(Vec::new());
        }

        let mut visible = match self
            .selector
            .find_candidate_jobs(technician, &JobSearch::feed())
            .await
        {
            Ok(matches) => matches,
            Err(SelectionError::Ineligible(_)) => return Ok(Vec::new()),
            Err(SelectionError::LocationUnknown) => Vec::new(),
            Err(err) => return Err(err.into()),
        };

        let origin = self
            .directory
            .profile(technician)
            .await?
            .and_then(|profile| profile.location);
        let mut seen: BTreeSet<JobId> = visible.iter().map(|entry| entry.job.id.clone()).collect();

        for offer in self.ledger.list_sent_for_technician(technician).await? {
            if seen.contains(&offer.job_id) {
                continue;
            }
            let Some(job) = self.store.fetch_job(&offer.job_id).await? else {
                continue;
            };
            if !job.is_claimable() {
                continue;
            }
            let distance_m = origin
                .zip(job.location)
                .map(|(from, to)| from.distance_m(&to));
            seen.insert(job.id.clone());
            visible.push(JobMatch { job, distance_m });
        }

        visible.sort_by(|left, right| {
            compare_distance(left.distance_m, right.distance_m)
                .then_with(|| left.job.id.cmp(&right.job.id))
        });
        Ok(visible)
    }

    /// Explicit search around the given point (or the stored one), nearest first.
    pub async fn nearby_jobs(
        &self,
        technician: &TechnicianId,
        lat: Option<f64>,
        lng: Option<f64>,
        radius_m: Option<f64>,
    ) -> Result<Vec<JobMatch>, DispatchError> {
        let origin = match (lat, lng) {
            (Some(lat), Some(lng)) => Some(
                GeoPoint::new(lat, lng)
                    .map_err(|err| DispatchError::InvalidInput(err.to_string()))?,
            ),
            (None, None) => None,
            _ => {
                return Err(DispatchError::InvalidInput(
                    "lat and lng must be supplied together".to_string(),
                ))
            }
        };

        let search = JobSearch {
            origin,
            radius_m,
            scope: SearchScope::Search,
        };
        Ok(self
            .selector
            .find_candidate_jobs(technician, &search)
            .await?)
    }

    pub async fn respond_to_job(
        &self,
        job: &JobId,
        technician: &TechnicianId,
        action: JobAction,
    ) -> Result<AcceptOutcome, DispatchError> {
        match action {
            JobAction::Accept => Ok(self.committer.accept(job, technician).await?),
        }
    }

    pub async fn location_update(
        &self,
        technician: &TechnicianId,
        lat: f64,
        lng: f64,
    ) -> Result<RematchOutcome, DispatchError> {
        let location =
            GeoPoint::new(lat, lng).map_err(|err| DispatchError::InvalidInput(err.to_string()))?;
        match self.rematcher.on_location_update(technician, location).await {
            Ok(outcome) => Ok(outcome),
            Err(RepositoryError::NotFound) => Err(DispatchError::NotFound("technician")),
            Err(err) => Err(err.into()),
        }
    }

    /// Going online requires account activation; going offline never fails on eligibility.
    pub async fn set_availability(
        &self,
        technician: &TechnicianId,
        online: bool,
    ) -> Result<TechnicianProfile, DispatchError> {
        if self.directory.profile(technician).await?.is_none() {
            return Err(DispatchError::NotFound("technician"));
        }

        if online {
            let activation = self.evaluator.activation(technician).await;
            if !activation.eligible {
                return Err(DispatchError::Ineligible(activation));
            }
        }

        self.directory.set_online(technician, online).await?;
        info!(technician = %technician, online, "availability changed");
        self.directory
            .profile(technician)
            .await?
            .ok_or(DispatchError::NotFound("technician"))
    }

    /// Registers a booking handed over by the booking collaborator and broadcasts it.
    pub async fn open_job(&self, request: JobRequest) -> Result<BroadcastOutcome, DispatchError> {
        let JobRequest {
            job_id,
            customer_id,
            service_type,
            location,
        } = request;

        if service_type.trim().is_empty() {
            return Err(DispatchError::InvalidInput(
                "service_type must not be empty".to_string(),
            ));
        }
        if let Some(point) = location {
            GeoPoint::new(point.lat, point.lng)
                .map_err(|err| DispatchError::InvalidInput(err.to_string()))?;
        }

        let job = Job::requested(
            job_id.unwrap_or_else(next_job_id),
            customer_id,
            service_type,
            location,
        );
        let id = job.id.clone();
        let job = match self.store.insert_job(job).await {
            Ok(job) => job,
            Err(RepositoryError::Conflict) => return Err(DispatchError::DuplicateJob(id)),
            Err(err) => return Err(err.into()),
        };
        info!(job = %job.id, service = %job.service_type, "job opened");

        self.broadcast_job(&job.id).await
    }

    /// One matching pass for an open job: offer it to every new eligible candidate.
    pub async fn broadcast_job(&self, job_id: &JobId) -> Result<BroadcastOutcome, DispatchError> {
        let job = self
            .store
            .fetch_job(job_id)
            .await?
            .ok_or(DispatchError::NotFound("job"))?;
        if !job.is_claimable() {
            return Err(DispatchError::Conflict {
                kind: ConflictKind::AlreadyTaken,
                reasons: Vec::new(),
            });
        }

        let candidates = self.selector.find_candidate_technicians(&job).await?;
        let offered = self.ledger.record_broadcast(&job.id, &candidates).await?;
        if !offered.is_empty() {
            self.store.mark_broadcasted(&job.id).await?;
        }

        let job = self
            .store
            .fetch_job(job_id)
            .await?
            .ok_or(DispatchError::NotFound("job"))?;
        Ok(BroadcastOutcome { job, offered })
    }

    /// Every offer made for the job, for audit.
    pub async fn job_history(&self, job_id: &JobId) -> Result<Vec<Broadcast>, DispatchError> {
        if self.store.fetch_job(job_id).await?.is_none() {
            return Err(DispatchError::NotFound("job"));
        }
        Ok(self.ledger.history(job_id).await?)
    }

    pub async fn job(&self, job_id: &JobId) -> Result<Job, DispatchError> {
        self.store
            .fetch_job(job_id)
            .await?
            .ok_or(DispatchError::NotFound("job"))
    }

    pub fn config(&self) -> &DispatchConfig {
        self.selector.config()
    }
}
