use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::DispatchConfig;
use crate::workflows::dispatch::domain::{
    Broadcast, CustomerId, Job, JobId, TechnicianId, TechnicianProfile, VerificationStatus,
    WorkStatus,
};
use crate::workflows::dispatch::geo::GeoPoint;
use crate::workflows::dispatch::memory::{
    InMemoryDispatchStore, InMemoryTechnicianDirectory, MemorySnapshot,
};
use crate::workflows::dispatch::repository::{
    AssignmentNotice, AssignmentStore, BroadcastRepository, JobRepository, NotificationError,
    NotificationTransport, RepositoryError,
};
use crate::workflows::dispatch::service::DispatchService;

/// Downtown reference point; other fixtures are placed relative to it.
pub(super) const HUB: GeoPoint = GeoPoint {
    lat: 12.9716,
    lng: 77.5946,
};

pub(super) fn tech(id: &str) -> TechnicianId {
    TechnicianId(id.to_string())
}

pub(super) fn job_id(id: &str) -> JobId {
    JobId(id.to_string())
}

/// A point roughly `km` kilometers north of the hub.
pub(super) fn north_of_hub(km: f64) -> GeoPoint {
    GeoPoint {
        lat: HUB.lat + km / 111.2,
        lng: HUB.lng,
    }
}

pub(super) fn verified() -> VerificationStatus {
    VerificationStatus {
        kyc_approved: true,
        bank_verified: true,
    }
}

pub(super) fn ready_profile(id: &str, location: Option<GeoPoint>) -> TechnicianProfile {
    TechnicianProfile {
        technician_id: tech(id),
        training_completed: true,
        work_status: WorkStatus::Approved,
        is_online: true,
        location,
    }
}

pub(super) fn open_job(id: &str, location: Option<GeoPoint>) -> Job {
    Job::requested(
        job_id(id),
        CustomerId(format!("cust-{id}")),
        "appliance_repair",
        location,
    )
}

pub(super) fn config(cooldown: Duration) -> DispatchConfig {
    DispatchConfig {
        rematch_cooldown: cooldown,
        ..DispatchConfig::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum NotificationEvent {
    CustomerAssigned {
        customer: CustomerId,
        notice: AssignmentNotice,
    },
    JobTaken {
        technicians: Vec<TechnicianId>,
        job: JobId,
    },
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    events: Mutex<Vec<NotificationEvent>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub(super) fn failing() -> Self {
        let notifier = Self::default();
        notifier.failing.store(true, Ordering::SeqCst);
        notifier
    }

    pub(super) fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }

    fn push(&self, event: NotificationEvent) -> Result<(), NotificationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::Transport("push gateway down".to_string()));
        }
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(event);
        Ok(())
    }
}

#[async_trait]
impl NotificationTransport for RecordingNotifier {
    async fn notify_customer_assigned(
        &self,
        customer: &CustomerId,
        notice: AssignmentNotice,
    ) -> Result<(), NotificationError> {
        self.push(NotificationEvent::CustomerAssigned {
            customer: customer.clone(),
            notice,
        })
    }

    async fn notify_job_taken(
        &self,
        technicians: &[TechnicianId],
        job: &JobId,
    ) -> Result<(), NotificationError> {
        self.push(NotificationEvent::JobTaken {
            technicians: technicians.to_vec(),
            job: job.clone(),
        })
    }
}

pub(super) type TestService =
    DispatchService<InMemoryDispatchStore, InMemoryTechnicianDirectory, RecordingNotifier>;

pub(super) struct World {
    pub(super) store: Arc<InMemoryDispatchStore>,
    pub(super) directory: Arc<InMemoryTechnicianDirectory>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) service: Arc<TestService>,
}

impl World {
    pub(super) fn new(cooldown: Duration) -> Self {
        Self::with_notifier(cooldown, RecordingNotifier::default())
    }

    pub(super) fn with_notifier(cooldown: Duration, notifier: RecordingNotifier) -> Self {
        let store = Arc::new(InMemoryDispatchStore::default());
        let directory = Arc::new(InMemoryTechnicianDirectory::default());
        let notifier = Arc::new(notifier);
        let service = Arc::new(DispatchService::new(
            store.clone(),
            directory.clone(),
            notifier.clone(),
            config(cooldown),
        ));
        Self {
            store,
            directory,
            notifier,
            service,
        }
    }

    pub(super) async fn ready_technician(&self, id: &str, location: Option<GeoPoint>) {
        self.directory
            .upsert(ready_profile(id, location), verified())
            .await;
    }

    pub(super) async fn insert_job(&self, id: &str, location: Option<GeoPoint>) -> Job {
        self.store
            .insert_job(open_job(id, location))
            .await
            .expect("job inserted")
    }

    pub(super) async fn offer(&self, id: &str, technicians: &[&str]) {
        let technicians: Vec<TechnicianId> = technicians.iter().map(|t| tech(t)).collect();
        self.store
            .record_sent(&job_id(id), &technicians, Utc::now())
            .await
            .expect("broadcast recorded");
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

/// Delegates to the in-memory store but fails the sibling-expiry step,
/// which happens after the job has been claimed inside the snapshot.
#[derive(Default, Clone)]
pub(super) struct ExpiryFailingStore {
    pub(super) inner: InMemoryDispatchStore,
}

#[async_trait]
impl JobRepository for ExpiryFailingStore {
    async fn insert_job(&self, job: Job) -> Result<Job, RepositoryError> {
        self.inner.insert_job(job).await
    }

    async fn fetch_job(&self, id: &JobId) -> Result<Option<Job>, RepositoryError> {
        self.inner.fetch_job(id).await
    }

    async fn open_jobs(&self) -> Result<Vec<Job>, RepositoryError> {
        self.inner.open_jobs().await
    }

    async fn active_job_for(
        &self,
        technician: &TechnicianId,
    ) -> Result<Option<Job>, RepositoryError> {
        self.inner.active_job_for(technician).await
    }

    async fn mark_broadcasted(&self, id: &JobId) -> Result<bool, RepositoryError> {
        self.inner.mark_broadcasted(id).await
    }
}

#[async_trait]
impl BroadcastRepository for ExpiryFailingStore {
    async fn record_sent(
        &self,
        job: &JobId,
        technicians: &[TechnicianId],
        at: DateTime<Utc>,
    ) -> Result<Vec<Broadcast>, RepositoryError> {
        self.inner.record_sent(job, technicians, at).await
    }

    async fn find_broadcast(
        &self,
        job: &JobId,
        technician: &TechnicianId,
    ) -> Result<Option<Broadcast>, RepositoryError> {
        self.inner.find_broadcast(job, technician).await
    }

    async fn sent_for_technician(
        &self,
        technician: &TechnicianId,
    ) -> Result<Vec<Broadcast>, RepositoryError> {
        self.inner.sent_for_technician(technician).await
    }

    async fn sent_for_job(&self, job: &JobId) -> Result<Vec<Broadcast>, RepositoryError> {
        self.inner.sent_for_job(job).await
    }

    async fn history_for_job(&self, job: &JobId) -> Result<Vec<Broadcast>, RepositoryError> {
        self.inner.history_for_job(job).await
    }
}

#[async_trait]
impl AssignmentStore for ExpiryFailingStore {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, RepositoryError> {
        self.inner.begin_snapshot().await
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), RepositoryError> {
        self.inner.commit_snapshot(snapshot).await
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), RepositoryError> {
        self.inner.abort_snapshot(snapshot).await
    }

    async fn claim_job(
        &self,
        snapshot: &mut MemorySnapshot,
        job: &JobId,
        technician: &TechnicianId,
        at: DateTime<Utc>,
    ) -> Result<Option<Job>, RepositoryError> {
        self.inner.claim_job(snapshot, job, technician, at).await
    }

    async fn mark_accepted(
        &self,
        snapshot: &mut MemorySnapshot,
        job: &JobId,
        technician: &TechnicianId,
        at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.inner.mark_accepted(snapshot, job, technician, at).await
    }

    async fn expire_others(
        &self,
        _snapshot: &mut MemorySnapshot,
        _job: &JobId,
        _except: &TechnicianId,
        _at: DateTime<Utc>,
    ) -> Result<Vec<TechnicianId>, RepositoryError> {
        Err(RepositoryError::Unavailable("ledger write timed out".to_string()))
    }
}

/// Delegates to the in-memory store, but the first `record_sent` call lets
/// `winner` claim and commit the job before the rows are written. This mirrors
/// an accept landing between candidate selection and ledger recording.
pub(super) struct ClaimBeforeRecordStore {
    pub(super) inner: InMemoryDispatchStore,
    winner: TechnicianId,
    fired: AtomicBool,
}

impl ClaimBeforeRecordStore {
    pub(super) fn new(inner: InMemoryDispatchStore, winner: &str) -> Self {
        Self {
            inner,
            winner: tech(winner),
            fired: AtomicBool::new(false),
        }
    }

    async fn commit_winner(&self, job: &JobId) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let mut snapshot = self.inner.begin_snapshot().await?;
        if self
            .inner
            .claim_job(&mut snapshot, job, &self.winner, now)
            .await?
            .is_none()
        {
            return self.inner.abort_snapshot(snapshot).await;
        }
        self.inner
            .mark_accepted(&mut snapshot, job, &self.winner, now)
            .await?;
        self.inner
            .expire_others(&mut snapshot, job, &self.winner, now)
            .await?;
        self.inner.commit_snapshot(snapshot).await
    }
}

#[async_trait]
impl JobRepository for ClaimBeforeRecordStore {
    async fn insert_job(&self, job: Job) -> Result<Job, RepositoryError> {
        self.inner.insert_job(job).await
    }

    async fn fetch_job(&self, id: &JobId) -> Result<Option<Job>, RepositoryError> {
        self.inner.fetch_job(id).await
    }

    async fn open_jobs(&self) -> Result<Vec<Job>, RepositoryError> {
        self.inner.open_jobs().await
    }

    async fn active_job_for(
        &self,
        technician: &TechnicianId,
    ) -> Result<Option<Job>, RepositoryError> {
        self.inner.active_job_for(technician).await
    }

    async fn mark_broadcasted(&self, id: &JobId) -> Result<bool, RepositoryError> {
        self.inner.mark_broadcasted(id).await
    }
}

#[async_trait]
impl BroadcastRepository for ClaimBeforeRecordStore {
    async fn record_sent(
        &self,
        job: &JobId,
        technicians: &[TechnicianId],
        at: DateTime<Utc>,
    ) -> Result<Vec<Broadcast>, RepositoryError> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.commit_winner(job).await?;
        }
        self.inner.record_sent(job, technicians, at).await
    }

    async fn find_broadcast(
        &self,
        job: &JobId,
        technician: &TechnicianId,
    ) -> Result<Option<Broadcast>, RepositoryError> {
        self.inner.find_broadcast(job, technician).await
    }

    async fn sent_for_technician(
        &self,
        technician: &TechnicianId,
    ) -> Result<Vec<Broadcast>, RepositoryError> {
        self.inner.sent_for_technician(technician).await
    }

    async fn sent_for_job(&self, job: &JobId) -> Result<Vec<Broadcast>, RepositoryError> {
        self.inner.sent_for_job(job).await
    }

    async fn history_for_job(&self, job: &JobId) -> Result<Vec<Broadcast>, RepositoryError> {
        self.inner.history_for_job(job).await
    }
}
