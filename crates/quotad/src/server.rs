//! HTTP surface: landing page, metrics and liveness.

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use quota_metrics::ExporterRegistry;
use quota_metrics::registry::CONTENT_TYPE;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub registry: ExporterRegistry,
    pub version: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(landing_page))
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// GET /metrics
pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.registry.gather().await {
        Ok(body) => (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "gather failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("An error has occurred while serving metrics:\n\n{e}"),
            )
                .into_response()
        }
    }
}

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}

/// GET /
pub async fn landing_page(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        r#"<html>
<head><title>AWS Quota Exporter</title></head>
<body>
<h1>AWS Quota Exporter</h1>
<p>Version: {}</p>
<p><a href="/metrics">Metrics</a></p>
</body>
</html>
"#,
        state.version
    ))
}
