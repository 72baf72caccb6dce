//! `RelayServer`: Axum HTTP + WebSocket server around the hub.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Method, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::deployment::DeploymentInfo;
use crate::errors::RelayError;
use crate::health::{self, HealthResponse};
use crate::hub::HubHandle;
use crate::report::{self, BenchmarkResponse, BenchmarkResults, ReportFormat};
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::gate;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the running hub.
    pub hub: HubHandle,
    /// Process-wide limits.
    pub config: Arc<ServerConfig>,
    /// Build metadata.
    pub deployment: Arc<DeploymentInfo>,
    /// Prometheus handle for rendering `/metrics`.
    pub metrics: PrometheusHandle,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
}

/// The relay server.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    hub: HubHandle,
    hub_task: Mutex<Option<JoinHandle<()>>>,
    deployment: Arc<DeploymentInfo>,
    metrics: PrometheusHandle,
    shutdown: Arc<ShutdownCoordinator>,
}

impl RelayServer {
    /// Create a server and start its hub. Must be called inside a runtime.
    ///
    /// Fails with [`RelayError::InvalidConfig`] before anything is spawned if
    /// a limit is out of range.
    pub fn new(
        config: ServerConfig,
        deployment: DeploymentInfo,
        metrics_handle: PrometheusHandle,
    ) -> Result<Self, RelayError> {
        config.validate()?;
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let (hub, hub_task) = HubHandle::spawn(config.broadcast_queue_capacity, shutdown.token());
        Ok(Self {
            config: Arc::new(config),
            hub,
            hub_task: Mutex::new(Some(hub_task)),
            deployment: Arc::new(deployment),
            metrics: metrics_handle,
            shutdown,
        })
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: self.hub.clone(),
            config: self.config.clone(),
            deployment: self.deployment.clone(),
            metrics: self.metrics.clone(),
            shutdown: self.shutdown.clone(),
        };

        Router::new()
            .route("/ws/{username}", get(gate::ws_upgrade))
            .route("/ws", get(gate::missing_name))
            .route("/ws/", get(gate::missing_name))
            .route("/health", get(health_handler))
            .route("/test/benchmark", get(benchmark_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(cors_layer())
    }

    /// Bind and serve in the background until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(%addr, "relay server listening");
        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                warn!(error = %e, "http server error");
            }
        });
        Ok((addr, handle))
    }

    /// Stop accepting, close every queue and wait for connections to drain,
    /// bounded by the configured shutdown timeout.
    pub async fn stop(&self, serve: JoinHandle<()>) {
        let mut handles = vec![serve];
        if let Some(hub_task) = self.hub_task.lock().take() {
            handles.push(hub_task);
        }
        self.shutdown
            .graceful_shutdown(handles, Some(self.config.shutdown_timeout()))
            .await;
    }

    /// Get the hub handle.
    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the deployment info.
    pub fn deployment(&self) -> &DeploymentInfo {
        &self.deployment
    }
}

/// Any origin; GET, POST and OPTIONS; `Content-Type` header.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.hub.snapshot();
    Json(health::health_check(&snapshot, &state.deployment))
}

/// GET /test/benchmark
async fn benchmark_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let began = Instant::now();
    let snapshot = state.hub.snapshot();
    let results = BenchmarkResults::from_snapshot(&snapshot, began);
    let markdown = report::render_markdown(&results, &state.deployment.commit);

    let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok());
    let format = ReportFormat::from_accept(accept);
    let content_type = [(header::CONTENT_TYPE, format.content_type())];
    match format {
        ReportFormat::Markdown => (content_type, markdown).into_response(),
        ReportFormat::Html => (content_type, report::markdown_to_html(&markdown)).into_response(),
        ReportFormat::Json => {
            let report_html = report::markdown_to_html(&markdown);
            Json(BenchmarkResponse {
                results,
                report_markdown: markdown,
                report_html,
            })
            .into_response()
        }
    }
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let body = crate::metrics::render(&state.metrics);
    (
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    use super::*;
    use crate::hub::Client;

    fn make_server() -> RelayServer {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let config = ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..ServerConfig::default()
        };
        RelayServer::new(config, DeploymentInfo::default(), handle).unwrap()
    }

    async fn get_body(app: Router, req: Request<Body>) -> (StatusCode, HeaderMap, String) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = axum::body::to_bytes(resp.into_body(), 1_000_000)
            .await
            .unwrap();
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn server_with_custom_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert_eq!(server.hub().connected_count(), 0);
        assert!(!server.shutdown().is_shutting_down());
        assert_eq!(server.deployment().actor, "manual");
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_up_front() {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let config = ServerConfig {
            keepalive_interval_ms: 0,
            ..ServerConfig::default()
        };
        let result = RelayServer::new(config, DeploymentInfo::default(), handle);
        assert!(matches!(result, Err(RelayError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn health_endpoint_returns_document() {
        let server = make_server();
        let (client, _rx) = Client::new("alice", 4);
        server.hub().register(client).await.unwrap();

        let (status, headers, body) = get_body(server.router(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");

        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["status"], "healthy");
        assert_eq!(parsed["version"], "1.0.0");
        assert_eq!(parsed["metrics"]["connected_users"], 1);
        assert_eq!(parsed["metrics"]["users"][0], "alice");
        assert_eq!(parsed["metrics"]["total_connections"], 1);
        assert!(parsed["server"]["uptime_seconds"].is_number());
        assert!(parsed["deployment"]["commit"].is_string());
    }

    #[tokio::test]
    async fn benchmark_negotiates_markdown() {
        let server = make_server();
        let req = Request::builder()
            .uri("/test/benchmark")
            .header(header::ACCEPT, "text/markdown")
            .body(Body::empty())
            .unwrap();
        let (status, headers, body) = get_body(server.router(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/markdown");
        assert!(body.starts_with("# WebSocket Relay Server - Performance Report"));
    }

    #[tokio::test]
    async fn benchmark_negotiates_html() {
        let server = make_server();
        let req = Request::builder()
            .uri("/test/benchmark")
            .header(header::ACCEPT, "text/html")
            .body(Body::empty())
            .unwrap();
        let (_, headers, body) = get_body(server.router(), req).await;
        assert_eq!(headers[header::CONTENT_TYPE], "text/html");
        assert!(body.starts_with("<!DOCTYPE html>"));
    }

    #[tokio::test]
    async fn benchmark_defaults_to_json() {
        let server = make_server();
        let (_, headers, body) = get_body(server.router(), get("/test/benchmark")).await;
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["results"]["server"]["version"], "1.0.0");
        assert!(parsed["report_markdown"].as_str().unwrap().contains("## Server Status"));
        assert!(parsed["report_html"].as_str().unwrap().contains("<h2>Server Status</h2>"));
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_text() {
        let server = make_server();
        let (status, headers, _) = get_body(server.router(), get("/metrics")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(
            headers[header::CONTENT_TYPE]
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );
    }

    #[tokio::test]
    async fn missing_username_is_bad_request() {
        let server = make_server();
        for uri in ["/ws", "/ws/"] {
            let (status, _, body) = get_body(server.router(), get(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body, "Username required in URL");
        }
    }

    #[tokio::test]
    async fn taken_username_is_conflict_before_upgrade() {
        let server = make_server();
        let (client, _rx) = Client::new("alice", 4);
        server.hub().register(client).await.unwrap();

        // Plain GET without upgrade headers still gets the name check first
        let (status, _, body) = get_body(server.router(), get("/ws/alice")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, "Username already connected");
    }

    #[tokio::test]
    async fn free_username_without_upgrade_is_rejected_by_extractor() {
        let server = make_server();
        let (status, _, _) = get_body(server.router(), get("/ws/bob")).await;
        assert!(status.is_client_error());
        assert_ne!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn cors_headers_present() {
        let server = make_server();
        let req = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "https://example.com")
            .body(Body::empty())
            .unwrap();
        let (_, headers, _) = get_body(server.router(), req).await;
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn cors_preflight_is_ok() {
        let server = make_server();
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/health")
            .header(header::ORIGIN, "https://example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap();
        let (status, headers, _) = get_body(server.router(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS]
            .to_str()
            .unwrap()
            .to_string();
        assert!(methods.contains("GET"));
        assert!(methods.contains("OPTIONS"));
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let (status, _, _) = get_body(server.router(), get("/nonexistent")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stop_drains_hub() {
        let server = make_server();
        let (client, mut rx) = Client::new("alice", 4);
        server.hub().register(client).await.unwrap();

        let (_addr, serve) = server.listen().await.unwrap();
        server.stop(serve).await;

        assert!(server.shutdown().is_shutting_down());
        assert!(rx.recv().await.is_none());
        assert_eq!(server.hub().connected_count(), 0);
    }
}
