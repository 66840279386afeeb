use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use fieldops_dispatch::workflows::dispatch::{
    dispatch_router, AssignmentStore, DispatchService, NotificationTransport, ProfileDirectory,
    VerificationDirectory,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_dispatch_routes<S, D, N>(service: Arc<DispatchService<S, D, N>>) -> axum::Router
where
    S: AssignmentStore,
    D: VerificationDirectory + ProfileDirectory,
    N: NotificationTransport,
{
    dispatch_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::LoggingNotifier;
    use axum::body::Body;
    use axum::http::Request;
    use fieldops_dispatch::config::DispatchConfig;
    use fieldops_dispatch::workflows::dispatch::{
        InMemoryDispatchStore, InMemoryTechnicianDirectory,
    };
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    fn app(ready: bool) -> axum::Router {
        let service = Arc::new(DispatchService::new(
            Arc::new(InMemoryDispatchStore::default()),
            Arc::new(InMemoryTechnicianDirectory::default()),
            Arc::new(LoggingNotifier::default()),
            DispatchConfig::default(),
        ));
        let readiness = Arc::new(AtomicBool::new(false));
        readiness.store(ready, Ordering::Release);
        let state = AppState {
            readiness,
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_dispatch_routes(service).layer(Extension(state))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let response = app(false).oneshot(get("/health")).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_tracks_startup_flag() {
        let starting = app(false).oneshot(get("/ready")).await.expect("response");
        let ready = app(true).oneshot(get("/ready")).await.expect("response");

        assert_eq!(starting.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ready.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_prometheus_text() {
        let response = app(true).oneshot(get("/metrics")).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
    }

    #[tokio::test]
    async fn dispatch_routes_are_mounted() {
        let response = app(true)
            .oneshot(get("/api/v1/dispatch/eligibility"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
