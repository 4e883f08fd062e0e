//! Metrics and probe endpoints.
//!
//! - `GET /metrics`: Prometheus text exposition
//! - `GET /healthz`, `GET /readyz`: process liveness

use crate::error::ControllerError;
use crate::metrics::FleetMetrics;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Router serving the metrics and probe endpoints
pub fn router(metrics: FleetMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(ok_handler))
        .route("/readyz", get(ok_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<FleetMetrics>) -> Response {
    match metrics.export() {
        Ok(body) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn ok_handler() -> &'static str {
    "ok"
}

/// Binds the listener; failing here aborts startup.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ControllerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| ControllerError::Server(format!("failed to bind {}: {}", addr, e)))
}

/// Serves until `token` is cancelled.
pub async fn serve(listener: TcpListener, metrics: FleetMetrics, token: CancellationToken) -> Result<(), ControllerError> {
    if let Ok(addr) = listener.local_addr() {
        info!("Serving metrics on http://{}/metrics", addr);
    }

    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(token.cancelled_owned())
        .await
        .map_err(|e| ControllerError::Server(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    async fn get_body(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let metrics = FleetMetrics::new().unwrap();
        metrics.set_managed_clusters(3);

        let (status, body) = get_body(router(metrics), "/metrics").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("fleet_managed_clusters 3"));
    }

    #[tokio::test]
    async fn test_probe_endpoints() {
        let metrics = FleetMetrics::new().unwrap();
        for path in ["/healthz", "/readyz"] {
            let (status, body) = get_body(router(metrics.clone()), path).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, "ok");
        }
        let (status, _) = get_body(router(metrics), "/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let token = CancellationToken::new();
        let server = tokio::spawn(serve(listener, FleetMetrics::new().unwrap(), token.clone()));

        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_error() {
        let listener = bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let err = bind(addr).await.unwrap_err();

        assert!(matches!(err, ControllerError::Server(_)));
    }
}
