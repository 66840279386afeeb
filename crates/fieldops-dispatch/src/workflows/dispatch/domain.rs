use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::geo::GeoPoint;

/// Opaque technician identity as resolved by the account collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TechnicianId(pub String);

/// Booking identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub String);

impl fmt::Display for TechnicianId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Account-level work status maintained by the training/onboarding collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Pending,
    Trained,
    Approved,
    Suspended,
    Deleted,
}

impl WorkStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Trained => "trained",
            Self::Approved => "approved",
            Self::Suspended => "suspended",
            Self::Deleted => "deleted",
        }
    }
}

/// Booking lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Requested,
    Broadcasted,
    Accepted,
    OnTheWay,
    Reached,
    InProgress,
    Completed,
    Cancelled,
}

impl JobStatus {
    /// Statuses from which a job can still be claimed.
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Requested | Self::Broadcasted)
    }

    /// Statuses that keep a technician busy.
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::OnTheWay | Self::Reached | Self::InProgress
        )
    }

    /// Statuses that carry an assigned technician.
    pub const fn holds_assignment(self) -> bool {
        self.is_active() || matches!(self, Self::Completed)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Broadcasted => "broadcasted",
            Self::Accepted => "accepted",
            Self::OnTheWay => "on_the_way",
            Self::Reached => "reached",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Open booking as seen by the dispatch engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub customer_id: CustomerId,
    pub service_type: String,
    pub location: Option<GeoPoint>,
    pub status: JobStatus,
    pub assigned_technician: Option<TechnicianId>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn requested(
        id: JobId,
        customer_id: CustomerId,
        service_type: impl Into<String>,
        location: Option<GeoPoint>,
    ) -> Self {
        Self {
            id,
            customer_id,
            service_type: service_type.into(),
            location,
            status: JobStatus::Requested,
            assigned_technician: None,
            assigned_at: None,
            created_at: Utc::now(),
        }
    }

    /// True when the compare-and-swap in the committer would succeed.
    pub fn is_claimable(&self) -> bool {
        self.status.is_open() && self.assigned_technician.is_none()
    }
}

/// Delivery state of a single offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastState {
    Sent,
    Accepted,
    Expired,
}

/// Ledger row recording that `job_id` was offered to `technician_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Broadcast {
    pub job_id: JobId,
    pub technician_id: TechnicianId,
    pub state: BroadcastState,
    pub sent_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Broadcast {
    pub fn sent(job_id: JobId, technician_id: TechnicianId, at: DateTime<Utc>) -> Self {
        Self {
            job_id,
            technician_id,
            state: BroadcastState::Sent,
            sent_at: at,
            updated_at: at,
        }
    }
}

/// Snapshot of the training/work-status collaborator's view of a technician.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicianProfile {
    pub technician_id: TechnicianId,
    pub training_completed: bool,
    pub work_status: WorkStatus,
    pub is_online: bool,
    pub location: Option<GeoPoint>,
}

/// KYC and bank verification flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VerificationStatus {
    pub kyc_approved: bool,
    pub bank_verified: bool,
}

/// Booking hand-off payload from the booking collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct JobRequest {
    #[serde(default)]
    pub job_id: Option<JobId>,
    pub customer_id: CustomerId,
    pub service_type: String,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}
