use async_trait::async_trait;
use fieldops_dispatch::error::AppError;
use fieldops_dispatch::workflows::dispatch::{
    AssignmentNotice, CustomerId, GeoPoint, InMemoryTechnicianDirectory, JobId,
    NotificationError, NotificationTransport, TechnicianId, TechnicianProfile, VerificationStatus,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Notification transport that records deliveries in the service log.
#[derive(Default)]
pub(crate) struct LoggingNotifier {
    delivered: AtomicU64,
}

impl LoggingNotifier {
    pub(crate) fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl NotificationTransport for LoggingNotifier {
    async fn notify_customer_assigned(
        &self,
        customer: &CustomerId,
        notice: AssignmentNotice,
    ) -> Result<(), NotificationError> {
        info!(
            customer = %customer,
            job = %notice.job_id,
            technician = %notice.technician_id,
            assigned_at = %notice.assigned_at.to_rfc3339(),
            "customer notified of assignment"
        );
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn notify_job_taken(
        &self,
        technicians: &[TechnicianId],
        job: &JobId,
    ) -> Result<(), NotificationError> {
        info!(job = %job, recipients = technicians.len(), "job-taken notice sent");
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// One technician in a roster file: the profile fields plus verification flags.
#[derive(Debug, Deserialize)]
pub(crate) struct RosterEntry {
    #[serde(flatten)]
    pub(crate) profile: TechnicianProfile,
    #[serde(default)]
    pub(crate) verification: VerificationStatus,
}

pub(crate) fn load_roster(path: &Path) -> Result<Vec<RosterEntry>, AppError> {
    let bytes = std::fs::read(path)?;
    parse_roster(&bytes)
}

/// Parses a roster and rejects any entry whose location is out of range.
pub(crate) fn parse_roster(bytes: &[u8]) -> Result<Vec<RosterEntry>, AppError> {
    let entries: Vec<RosterEntry> =
        serde_json::from_slice(bytes).map_err(std::io::Error::from)?;
    for entry in &entries {
        if let Some(point) = entry.profile.location {
            GeoPoint::new(point.lat, point.lng).map_err(|err| {
                std::io::Error::new(
                    ErrorKind::InvalidData,
                    format!("roster entry {}: {err}", entry.profile.technician_id),
                )
            })?;
        }
    }
    Ok(entries)
}

pub(crate) async fn seed_directory(
    directory: &InMemoryTechnicianDirectory,
    roster: Vec<RosterEntry>,
) -> usize {
    let count = roster.len();
    for entry in roster {
        directory.upsert(entry.profile, entry.verification).await;
    }
    count
}
