//! HTTP surface: the scrape endpoint, the health probe, and a small
//! landing page.
//!
//! `/metrics` serves whatever the cache holds; the only SQL a scrape can
//! trigger is the synchronous run of on-demand jobs (interval zero, no
//! cron), which completes before the registry is gathered.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};
use tower_http::trace::TraceLayer;

use crate::exporter::Exporter;

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub exporter: Arc<Exporter>,
    /// Path the scrape endpoint is mounted on.
    pub metrics_path: String,
    /// Ping every connection from `/healthz` instead of answering
    /// unconditionally.
    pub deep_check: bool,
}

/// Create the router with all routes.
pub fn create_router(state: AppState) -> Router {
    let metrics_path = state.metrics_path.clone();
    Router::new()
        .route("/", get(index_handler))
        .route(&metrics_path, get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Landing page linking the telemetry path.
async fn index_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(format!(
        r#"<html>
<head><title>SQL Exporter</title></head>
<body>
<h1>SQL Exporter</h1>
<p><a href="{}">Metrics</a></p>
</body>
</html>
"#,
        state.metrics_path
    ))
}

/// Scrape endpoint: trigger on-demand jobs, then serialize the registry.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    state.exporter.run_on_demand().await;

    let families = state.exporter.registry().gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {e}"),
        )
            .into_response();
    }

    (
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

/// Liveness probe; with deep check enabled, verifies every connection.
async fn healthz_handler(State(state): State<Arc<AppState>>) -> Response {
    if !state.deep_check {
        return (StatusCode::OK, "OK").into_response();
    }

    for job in state.exporter.jobs() {
        if let Err(e) = job.check_connections().await {
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    }
    (StatusCode::OK, "OK").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFile;
    use crate::driver::Value;
    use crate::exporter::Collaborators;
    use crate::testutil::{row, FakeConnector};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn exporter_with(connector: &FakeConnector, yaml: &str) -> Arc<Exporter> {
        let config = ConfigFile::from_yaml(yaml).unwrap();
        let collaborators = Collaborators {
            connector: Arc::new(connector.clone()),
            tokens: None,
            inventory: None,
        };
        Arc::new(Exporter::new(config, collaborators).await.unwrap())
    }

    fn router(exporter: Arc<Exporter>, deep_check: bool) -> Router {
        create_router(AppState {
            exporter,
            metrics_path: "/metrics".to_string(),
            deep_check,
        })
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[tokio::test]
    async fn test_healthz_stub_is_unconditional() {
        let connector = FakeConnector::failing("down");
        let exporter = exporter_with(
            &connector,
            r#"
jobs:
  - name: j
    interval: 5m
    connections: ["postgres://u@h/d"]
    queries:
      - name: q
        values: [count]
        query: "SELECT 1.0 AS count"
"#,
        )
        .await;
        let app = router(exporter, false);

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "OK");
    }

    #[tokio::test]
    async fn test_healthz_deep_check_reports_first_failure() {
        let connector = FakeConnector::failing("connection refused");
        let exporter = exporter_with(
            &connector,
            r#"
jobs:
  - name: j
    interval: 5m
    connections: ["postgres://u@h/d"]
    queries:
      - name: q
        values: [count]
        query: "SELECT 1.0 AS count"
"#,
        )
        .await;
        let app = router(exporter, true);

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(response).await.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_landing_page_links_metrics_path() {
        let connector = FakeConnector::new();
        let exporter = exporter_with(&connector, "jobs: []").await;
        let app = router(exporter, false);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains(r#"<a href="/metrics">"#));
    }

    #[tokio::test]
    async fn test_scrape_serves_cached_samples() {
        let connector = FakeConnector::new();
        connector.stub(
            "SELECT 1.0 AS count",
            vec![row(&[("count", Value::Float(1.0))])],
        );
        let exporter = exporter_with(
            &connector,
            r#"
jobs:
  - name: j
    interval: 5m
    connections: ["postgres://u@h/d"]
    queries:
      - name: q
        values: [count]
        query: "SELECT 1.0 AS count"
"#,
        )
        .await;

        // One scheduled run happened; the scrape reads the cache.
        exporter.jobs()[0].run_once().await.unwrap();

        let app = router(Arc::clone(&exporter), false);
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let text = body_text(response).await;
        assert!(text.contains("sql_q"), "missing query family: {text}");
        assert!(text.contains(r#"driver="postgres""#));
        assert!(text.contains(r#"sql_job="j""#));
        assert!(text.contains(r#"col="count""#));
        assert!(text.contains("sql_exporter_queries_total"));
    }

    #[tokio::test]
    async fn test_scrape_triggers_on_demand_jobs() {
        let connector = FakeConnector::new();
        connector.stub(
            "SELECT 2.0 AS count",
            vec![row(&[("count", Value::Float(2.0))])],
        );
        let exporter = exporter_with(
            &connector,
            r#"
jobs:
  - name: pulse
    interval: 0s
    connections: ["postgres://u@h/d"]
    queries:
      - name: q
        values: [count]
        query: "SELECT 2.0 AS count"
"#,
        )
        .await;
        assert!(exporter.jobs()[0].is_on_demand());

        let app = router(Arc::clone(&exporter), false);
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // The run happened during the scrape itself.
        let text = body_text(response).await;
        assert!(text.contains("sql_q"), "on-demand job did not run: {text}");
        assert!(connector
            .queries_run()
            .contains(&"SELECT 2.0 AS count".to_string()));
    }
}
