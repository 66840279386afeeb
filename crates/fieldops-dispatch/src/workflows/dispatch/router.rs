use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::candidates::JobMatch;
use super::committer::AcceptOutcome;
use super::domain::{Broadcast, JobId, JobRequest, TechnicianId, TechnicianProfile};
use super::rematch::RematchOutcome;
use super::repository::{
    AssignmentStore, NotificationTransport, ProfileDirectory, VerificationDirectory,
};
use super::service::{
    BroadcastOutcome, DispatchError, DispatchService, EligibilityView, JobAction,
};

/// Header carrying the identity resolved by the upstream auth collaborator.
pub const TECHNICIAN_HEADER: &str = "x-technician-id";

type SharedService<S, D, N> = Arc<DispatchService<S, D, N>>;

#[derive(Debug, Deserialize)]
pub struct NearbyQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub action: JobAction,
}

#[derive(Debug, Deserialize)]
pub struct LocationRequest {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityRequest {
    pub online: bool,
}

/// Router builder exposing the technician-facing and booking hand-off endpoints.
pub fn dispatch_router<S, D, N>(service: SharedService<S, D, N>) -> Router
where
    S: AssignmentStore,
    D: VerificationDirectory + ProfileDirectory,
    N: NotificationTransport,
{
    Router::new()
        .route("/api/v1/dispatch/my-jobs", get(my_jobs_handler::<S, D, N>))
        .route(
            "/api/v1/dispatch/nearby-jobs",
            get(nearby_jobs_handler::<S, D, N>),
        )
        .route(
            "/api/v1/dispatch/jobs/:job_id/respond",
            post(respond_handler::<S, D, N>),
        )
        .route(
            "/api/v1/dispatch/location",
            post(location_handler::<S, D, N>),
        )
        .route(
            "/api/v1/dispatch/eligibility",
            get(eligibility_handler::<S, D, N>),
        )
        .route(
            "/api/v1/dispatch/availability",
            post(availability_handler::<S, D, N>),
        )
        .route("/api/v1/dispatch/jobs", post(open_job_handler::<S, D, N>))
        .route(
            "/api/v1/dispatch/jobs/:job_id/broadcast",
            post(broadcast_handler::<S, D, N>),
        )
        .route(
            "/api/v1/dispatch/jobs/:job_id/broadcasts",
            get(history_handler::<S, D, N>),
        )
        .with_state(service)
}

pub(crate) fn technician_identity(headers: &HeaderMap) -> Result<TechnicianId, DispatchError> {
    headers
        .get(TECHNICIAN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| TechnicianId(value.to_string()))
        .ok_or(DispatchError::Unauthenticated)
}

pub(crate) async fn my_jobs_handler<S, D, N>(
    State(service): State<SharedService<S, D, N>>,
    headers: HeaderMap,
) -> Result<Json<Vec<JobMatch>>, DispatchError>
where
    S: AssignmentStore,
    D: VerificationDirectory + ProfileDirectory,
    N: NotificationTransport,
{
    let technician = technician_identity(&headers)?;
    Ok(Json(service.my_jobs(&technician).await?))
}

pub(crate) async fn nearby_jobs_handler<S, D, N>(
    State(service): State<SharedService<S, D, N>>,
    headers: HeaderMap,
    Query(query): Query<NearbyQuery>,
) -> Result<Json<Vec<JobMatch>>, DispatchError>
where
    S: AssignmentStore,
    D: VerificationDirectory + ProfileDirectory,
    N: NotificationTransport,
{
    let technician = technician_identity(&headers)?;
    let jobs = service
        .nearby_jobs(&technician, query.lat, query.lng, query.radius)
        .await?;
    Ok(Json(jobs))
}

pub(crate) async fn respond_handler<S, D, N>(
    State(service): State<SharedService<S, D, N>>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
    Json(request): Json<RespondRequest>,
) -> Result<Json<AcceptOutcome>, DispatchError>
where
    S: AssignmentStore,
    D: VerificationDirectory + ProfileDirectory,
    N: NotificationTransport,
{
    let technician = technician_identity(&headers)?;
    let outcome = service
        .respond_to_job(&JobId(job_id), &technician, request.action)
        .await?;
    Ok(Json(outcome))
}

pub(crate) async fn location_handler<S, D, N>(
    State(service): State<SharedService<S, D, N>>,
    headers: HeaderMap,
    Json(request): Json<LocationRequest>,
) -> Result<Json<RematchOutcome>, DispatchError>
where
    S: AssignmentStore,
    D: VerificationDirectory + ProfileDirectory,
    N: NotificationTransport,
{
    let technician = technician_identity(&headers)?;
    let outcome = service
        .location_update(&technician, request.lat, request.lng)
        .await?;
    Ok(Json(outcome))
}

pub(crate) async fn eligibility_handler<S, D, N>(
    State(service): State<SharedService<S, D, N>>,
    headers: HeaderMap,
) -> Result<Json<EligibilityView>, DispatchError>
where
    S: AssignmentStore,
    D: VerificationDirectory + ProfileDirectory,
    N: NotificationTransport,
{
    let technician = technician_identity(&headers)?;
    Ok(Json(service.eligibility(&technician).await))
}

pub(crate) async fn availability_handler<S, D, N>(
    State(service): State<SharedService<S, D, N>>,
    headers: HeaderMap,
    Json(request): Json<AvailabilityRequest>,
) -> Result<Json<TechnicianProfile>, DispatchError>
where
    S: AssignmentStore,
    D: VerificationDirectory + ProfileDirectory,
    N: NotificationTransport,
{
    let technician = technician_identity(&headers)?;
    let profile = service
        .set_availability(&technician, request.online)
        .await?;
    Ok(Json(profile))
}

pub(crate) async fn open_job_handler<S, D, N>(
    State(service): State<SharedService<S, D, N>>,
    Json(request): Json<JobRequest>,
) -> Result<(StatusCode, Json<BroadcastOutcome>), DispatchError>
where
    S: AssignmentStore,
    D: VerificationDirectory + ProfileDirectory,
    N: NotificationTransport,
{
    let outcome = service.open_job(request).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub(crate) async fn broadcast_handler<S, D, N>(
    State(service): State<SharedService<S, D, N>>,
    Path(job_id): Path<String>,
) -> Result<Json<BroadcastOutcome>, DispatchError>
where
    S: AssignmentStore,
    D: VerificationDirectory + ProfileDirectory,
    N: NotificationTransport,
{
    Ok(Json(service.broadcast_job(&JobId(job_id)).await?))
}

pub(crate) async fn history_handler<S, D, N>(
    State(service): State<SharedService<S, D, N>>,
    Path(job_id): Path<String>,
) -> Result<Json<Vec<Broadcast>>, DispatchError>
where
    S: AssignmentStore,
    D: VerificationDirectory + ProfileDirectory,
    N: NotificationTransport,
{
    Ok(Json(service.job_history(&JobId(job_id)).await?))
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::Unauthenticated => StatusCode::UNAUTHORIZED,
            DispatchError::Ineligible(_) => StatusCode::FORBIDDEN,
            DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::Conflict { .. } | DispatchError::DuplicateJob(_) => {
                StatusCode::CONFLICT
            }
            DispatchError::LocationUnknown | DispatchError::InvalidInput(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            DispatchError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = self.status();
        let payload = match &self {
            DispatchError::Ineligible(report) => json!({
                "error": self.to_string(),
                "code": "ineligible",
                "reasons": report.reasons,
            }),
            DispatchError::Conflict { kind, reasons } => json!({
                "error": self.to_string(),
                "code": kind.code(),
                "reasons": reasons,
            }),
            DispatchError::DuplicateJob(_) => json!({
                "error": self.to_string(),
                "code": "duplicate_job",
            }),
            DispatchError::LocationUnknown => json!({
                "error": self.to_string(),
                "code": "location_unknown",
            }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(payload)).into_response()
    }
}
