use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::domain::{TechnicianId, TechnicianProfile, VerificationStatus, WorkStatus};
use super::repository::{JobRepository, ProfileDirectory, RepositoryError, VerificationDirectory};

/// Stable reason codes, reported in checklist order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum IneligibilityReason {
    Kyc,
    Bank,
    Training,
    WorkStatus,
    Offline,
    ActiveJob,
    LookupFailed {
        collaborator: &'static str,
        message: String,
    },
}

impl IneligibilityReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Kyc => "kyc",
            Self::Bank => "bank",
            Self::Training => "training",
            Self::WorkStatus => "work_status",
            Self::Offline => "offline",
            Self::ActiveJob => "active_job",
            Self::LookupFailed { .. } => "lookup_failed",
        }
    }

    fn lookup(collaborator: &'static str, error: &RepositoryError) -> Self {
        Self::LookupFailed {
            collaborator,
            message: error.to_string(),
        }
    }
}

/// Structured eligibility verdict. Never an error: failures become reasons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EligibilityReport {
    pub technician_id: TechnicianId,
    pub eligible: bool,
    pub reasons: Vec<IneligibilityReason>,
}

impl EligibilityReport {
    fn from_reasons(technician_id: TechnicianId, reasons: Vec<IneligibilityReason>) -> Self {
        Self {
            technician_id,
            eligible: reasons.is_empty(),
            reasons,
        }
    }

    /// Account-readiness view: momentary availability is not an activation concern.
    pub fn activation(&self) -> EligibilityReport {
        let reasons = self
            .reasons
            .iter()
            .filter(|reason| **reason != IneligibilityReason::Offline)
            .cloned()
            .collect();
        Self::from_reasons(self.technician_id.clone(), reasons)
    }

    pub fn has(&self, reason: &IneligibilityReason) -> bool {
        self.reasons.contains(reason)
    }

    pub fn is_busy(&self) -> bool {
        self.has(&IneligibilityReason::ActiveJob)
    }

    pub fn codes(&self) -> Vec<&'static str> {
        self.reasons.iter().map(IneligibilityReason::code).collect()
    }
}

/// Computes the fixed checklist: kyc, bank, training, work_status, offline, active_job.
pub struct EligibilityEvaluator<J, D> {
    jobs: Arc<J>,
    directory: Arc<D>,
}

impl<J, D> EligibilityEvaluator<J, D>
where
    J: JobRepository,
    D: VerificationDirectory + ProfileDirectory,
{
    pub fn new(jobs: Arc<J>, directory: Arc<D>) -> Self {
        Self { jobs, directory }
    }

    pub async fn evaluate(&self, technician: &TechnicianId) -> EligibilityReport {
        let (profile, verification, active) = tokio::join!(
            self.directory.profile(technician),
            self.directory.verification_status(technician),
            self.jobs.active_job_for(technician),
        );

        let profile = match profile {
            Ok(Some(profile)) => Ok(profile),
            Ok(None) => Err(RepositoryError::NotFound),
            Err(err) => Err(err),
        };
        let active = active.map(|job| job.is_some());

        self.assemble(technician, verification, profile.as_ref(), active)
    }

    /// Same checklist for a profile the caller already holds (candidate scans).
    pub async fn evaluate_profile(&self, profile: &TechnicianProfile) -> EligibilityReport {
        let technician = &profile.technician_id;
        let (verification, active) = tokio::join!(
            self.directory.verification_status(technician),
            self.jobs.active_job_for(technician),
        );
        let active = active.map(|job| job.is_some());

        self.assemble(technician, verification, Ok(profile), active)
    }

    pub async fn activation(&self, technician: &TechnicianId) -> EligibilityReport {
        self.evaluate(technician).await.activation()
    }

    fn assemble(
        &self,
        technician: &TechnicianId,
        verification: Result<VerificationStatus, RepositoryError>,
        profile: Result<&TechnicianProfile, &RepositoryError>,
        busy: Result<bool, RepositoryError>,
    ) -> EligibilityReport {
        let mut reasons = Vec::new();

        match verification {
            Ok(status) => {
                if !status.kyc_approved {
                    reasons.push(IneligibilityReason::Kyc);
                }
                if !status.bank_verified {
                    reasons.push(IneligibilityReason::Bank);
                }
            }
            Err(err) => reasons.push(IneligibilityReason::lookup("verification", &err)),
        }

        match profile {
            Ok(profile) => {
                if !profile.training_completed {
                    reasons.push(IneligibilityReason::Training);
                }
                if profile.work_status != WorkStatus::Approved {
                    reasons.push(IneligibilityReason::WorkStatus);
                }
                if !profile.is_online {
                    reasons.push(IneligibilityReason::Offline);
                }
            }
            Err(err) => reasons.push(IneligibilityReason::lookup("profile", err)),
        }

        match busy {
            Ok(true) => reasons.push(IneligibilityReason::ActiveJob),
            Ok(false) => {}
            Err(err) => reasons.push(IneligibilityReason::lookup("jobs", &err)),
        }

        let report = EligibilityReport::from_reasons(technician.clone(), reasons);
        if !report.eligible {
            debug!(technician = %technician, reasons = ?report.codes(), "technician not eligible");
        }
        report
    }
}
