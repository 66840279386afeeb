use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;

use super::domain::{Job, TechnicianId};
use super::eligibility::{EligibilityEvaluator, EligibilityReport};
use super::geo::GeoPoint;
use super::repository::{JobRepository, ProfileDirectory, RepositoryError, VerificationDirectory};
use crate::config::DispatchConfig;

/// Which fallback radius applies when the caller gives none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Explicit searches (nearby jobs).
    Search,
    /// Passive feeds (my jobs, location rematch).
    Feed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobSearch {
    pub origin: Option<GeoPoint>,
    pub radius_m: Option<f64>,
    pub scope: SearchScope,
}

impl JobSearch {
    pub fn feed() -> Self {
        Self {
            origin: None,
            radius_m: None,
            scope: SearchScope::Feed,
        }
    }
}

/// An open job together with its distance from the search origin.
///
/// `distance_m` is `None` for jobs without a location; those are radius-exempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobMatch {
    pub job: Job,
    pub distance_m: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("technician is not eligible: {:?}", .0.codes())]
    Ineligible(EligibilityReport),
    #[error("technician location unknown")]
    LocationUnknown,
    #[error("search radius must be a positive number of meters, got {0}")]
    InvalidRadius(f64),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct CandidateSelector<J, D> {
    jobs: Arc<J>,
    directory: Arc<D>,
    evaluator: Arc<EligibilityEvaluator<J, D>>,
    config: DispatchConfig,
}

impl<J, D> CandidateSelector<J, D>
where
    J: JobRepository,
    D: VerificationDirectory + ProfileDirectory,
{
    pub fn new(
        jobs: Arc<J>,
        directory: Arc<D>,
        evaluator: Arc<EligibilityEvaluator<J, D>>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            jobs,
            directory,
            evaluator,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    fn fallback_radius(&self, scope: SearchScope) -> f64 {
        match scope {
            SearchScope::Search => self.config.search_radius_m,
            SearchScope::Feed => self.config.feed_radius_m,
        }
    }

    /// Open, unassigned jobs within range of the technician, nearest first.
    pub async fn find_candidate_jobs(
        &self,
        technician: &TechnicianId,
        search: &JobSearch,
    ) -> Result<Vec<JobMatch>, SelectionError> {
        let radius_m = search
            .radius_m
            .unwrap_or_else(|| self.fallback_radius(search.scope));
        if !radius_m.is_finite() || radius_m <= 0.0 {
            return Err(SelectionError::InvalidRadius(radius_m));
        }

        let report = self.evaluator.evaluate(technician).await;
        if !report.eligible {
            return Err(SelectionError::Ineligible(report));
        }

        let origin = match search.origin {
            Some(origin) => origin,
            None => self
                .directory
                .profile(technician)
                .await?
                .and_then(|profile| profile.location)
                .ok_or(SelectionError::LocationUnknown)?,
        };

        let mut matches: Vec<JobMatch> = self
            .jobs
            .open_jobs()
            .await?
            .into_iter()
            .filter_map(|job| {
                let distance_m = job.location.map(|location| origin.distance_m(&location));
                match distance_m {
                    Some(distance) if distance > radius_m => None,
                    _ => Some(JobMatch { job, distance_m }),
                }
            })
            .collect();

        matches.sort_by(|left, right| compare_distance(left.distance_m, right.distance_m));
        Ok(matches)
    }

    /// Eligible technicians within the search radius of `job`, nearest first.
    ///
    /// Busy, offline and unverified technicians never appear here, regardless of distance.
    pub async fn find_candidate_technicians(
        &self,
        job: &Job,
    ) -> Result<Vec<TechnicianId>, SelectionError> {
        let radius_m = self.config.search_radius_m;
        let mut ranked: Vec<(TechnicianId, Option<f64>)> = Vec::new();

        for profile in self.directory.technicians().await? {
            if !profile.is_online {
                continue;
            }
            let distance = match (job.location, profile.location) {
                (None, _) => None,
                (Some(_), None) => continue,
                (Some(target), Some(location)) => {
                    let distance = location.distance_m(&target);
                    if distance > radius_m {
                        continue;
                    }
                    Some(distance)
                }
            };

            if self.evaluator.evaluate_profile(&profile).await.eligible {
                ranked.push((profile.technician_id, distance));
            }
        }

        ranked.sort_by(|left, right| {
            compare_distance(left.1, right.1).then_with(|| left.0.cmp(&right.0))
        });
        Ok(ranked.into_iter().map(|(technician, _)| technician).collect())
    }
}

/// Located entries ascend by distance; unlocated entries sort last.
pub(super) fn compare_distance(left: Option<f64>, right: Option<f64>) -> Ordering {
    match (left, right) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
