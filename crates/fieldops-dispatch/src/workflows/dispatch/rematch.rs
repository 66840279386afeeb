use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::candidates::{CandidateSelector, JobSearch, SearchScope, SelectionError};
use super::domain::{JobId, JobStatus, TechnicianId};
use super::geo::GeoPoint;
use super::ledger::BroadcastLedger;
use super::repository::{
    BroadcastRepository, JobRepository, ProfileDirectory, RepositoryError, VerificationDirectory,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RematchOutcome {
    pub location_updated: bool,
    /// False when the cooldown suppressed matching or matching failed.
    pub match_calculation: bool,
    pub matched_jobs: Vec<JobId>,
    /// Subset of `matched_jobs` offered to the technician by this update.
    pub newly_broadcast: Vec<JobId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_error: Option<String>,
}

impl RematchOutcome {
    fn skipped(match_error: Option<String>) -> Self {
        Self {
            location_updated: true,
            match_calculation: false,
            matched_jobs: Vec::new(),
            newly_broadcast: Vec::new(),
            match_error,
        }
    }
}

/// Per-technician gate allowing at most one matching pass per `cooldown`.
struct Cooldown {
    window: Duration,
    last_run: Mutex<HashMap<TechnicianId, Instant>>,
}

impl Cooldown {
    fn new(window: Duration) -> Self {
        Self {
            window,
            last_run: Mutex::new(HashMap::new()),
        }
    }

    /// Check-and-stamp in one critical section so concurrent pings cannot both pass.
    fn try_acquire(&self, technician: &TechnicianId) -> bool {
        let now = Instant::now();
        let mut last_run = match self.last_run.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match last_run.get(technician) {
            Some(previous) if now.duration_since(*previous) < self.window => false,
            _ => {
                last_run.insert(technician.clone(), now);
                true
            }
        }
    }
}

pub struct LocationRematcher<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
    selector: Arc<CandidateSelector<S, D>>,
    ledger: Arc<BroadcastLedger<S>>,
    cooldown: Cooldown,
}

impl<S, D> LocationRematcher<S, D>
where
    S: JobRepository + BroadcastRepository,
    D: VerificationDirectory + ProfileDirectory,
{
    pub fn new(
        store: Arc<S>,
        directory: Arc<D>,
        selector: Arc<CandidateSelector<S, D>>,
        ledger: Arc<BroadcastLedger<S>>,
        cooldown: Duration,
    ) -> Self {
        Self {
            store,
            directory,
            selector,
            ledger,
            cooldown: Cooldown::new(cooldown),
        }
    }

    /// Stores the point unconditionally, then rematches unless the cooldown is active.
    pub async fn on_location_update(
        &self,
        technician: &TechnicianId,
        location: GeoPoint,
    ) -> Result<RematchOutcome, RepositoryError> {
        self.directory.update_location(technician, location).await?;

        if !self.cooldown.try_acquire(technician) {
            debug!(technician = %technician, "rematch suppressed by cooldown");
            return Ok(RematchOutcome::skipped(None));
        }

        let (matched_jobs, newly_broadcast) = match self.rematch(technician, location).await {
            Ok(result) => result,
            Err(err) => {
                warn!(technician = %technician, error = %err, "rematch failed after location update");
                return Ok(RematchOutcome::skipped(Some(err.to_string())));
            }
        };

        info!(
            technician = %technician,
            matched = matched_jobs.len(),
            new = newly_broadcast.len(),
            "rematch completed"
        );
        Ok(RematchOutcome {
            location_updated: true,
            match_calculation: true,
            matched_jobs,
            newly_broadcast,
            match_error: None,
        })
    }

    async fn rematch(
        &self,
        technician: &TechnicianId,
        location: GeoPoint,
    ) -> Result<(Vec<JobId>, Vec<JobId>), SelectionError> {
        let search = JobSearch {
            origin: Some(location),
            radius_m: None,
            scope: SearchScope::Feed,
        };
        let matches = match self.selector.find_candidate_jobs(technician, &search).await {
            Ok(matches) => matches,
            Err(SelectionError::Ineligible(_)) => return Ok((Vec::new(), Vec::new())),
            Err(err) => return Err(err),
        };

        let mut matched_jobs = Vec::with_capacity(matches.len());
        let mut newly_broadcast = Vec::new();
        for candidate in matches {
            let job = candidate.job;
            let offered = self
                .ledger
                .record_broadcast(&job.id, std::slice::from_ref(technician))
                .await?;
            if !offered.is_empty() {
                if job.status == JobStatus::Requested {
                    self.store.mark_broadcasted(&job.id).await?;
                }
                newly_broadcast.push(job.id.clone());
            }
            matched_jobs.push(job.id);
        }
        Ok((matched_jobs, newly_broadcast))
    }
}
