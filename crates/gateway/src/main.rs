//! ReceiptBox API Gateway
//!
//! The single entry point for the front end.
//! Handles:
//! - The GraphQL API (queries, mutations, multipart receipt uploads)
//! - Serving stored receipt images
//! - Rate limiting
//! - Observability (logging, metrics, health)

mod graphql;
mod handlers;
mod middleware;

use anyhow::Context as _;
use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, Next},
    routing::get,
    Router,
};
use graphql::ReceiptSchema;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use middleware::rate_limit::{create_rate_limiter, rate_limit_middleware};
use receiptbox_common::{
    config::{AppConfig, ObservabilityConfig},
    db::DbPool,
    extraction::ReceiptExtractor,
    llm::create_chat_client,
    metrics::{self as app_metrics, EXTRACTION_BUCKETS, LATENCY_BUCKETS, METRICS_PREFIX},
    ocr::create_ocr_provider,
    services::{ItemService, ReceiptService},
    storage::{create_storage, StorageProvider},
    Repository,
};
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Room for the multipart envelope around the largest accepted image
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub storage: Arc<dyn StorageProvider>,
    pub schema: ReceiptSchema,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        db: DbPool,
        storage: Arc<dyn StorageProvider>,
        extractor: ReceiptExtractor,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let repo = Repository::new(db.clone());
        let schema = graphql::build_schema(
            ReceiptService::new(
                repo.clone(),
                storage.clone(),
                extractor,
                config.server.max_upload_bytes,
            ),
            ItemService::new(repo),
        );

        Self {
            config,
            db,
            storage,
            schema,
            metrics,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    init_tracing(&config.observability);

    info!("Starting ReceiptBox API Gateway v{}", receiptbox_common::VERSION);

    let config = Arc::new(config);

    // Initialize metrics
    let metrics = if config.observability.metrics_enabled {
        Some(install_metrics()?)
    } else {
        None
    };

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    db.migrate().await?;

    // External integrations
    let storage = create_storage(&config.storage);
    let extractor = ReceiptExtractor::new(
        create_ocr_provider(&config.ocr)?,
        create_chat_client(&config.llm)?,
    );

    info!(
        upload_dir = %config.storage.upload_dir.display(),
        ocr = %config.ocr.provider,
        model = %config.llm.model,
        "Extraction pipeline ready"
    );

    // Create app state
    let state = AppState::new(config.clone(), db, storage, extractor, metrics);

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr = config.bind_address();
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Install the Prometheus recorder and describe all metrics
fn install_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_request_duration_seconds", METRICS_PREFIX)),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_extraction_duration_seconds", METRICS_PREFIX)),
            EXTRACTION_BUCKETS,
        )?
        .install_recorder()?;

    app_metrics::register_metrics();
    Ok(handle)
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let mut app = Router::new()
        // GraphQL (POST) and GraphiQL (GET)
        .route("/graphql", get(graphql::graphiql).post(graphql::graphql_handler))

        // Stored receipt images
        .route("/uploads/{key}", get(handlers::uploads::get_image))

        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(handlers::metrics::metrics))
        .route_layer(from_fn(middleware::metrics::track_metrics));

    if config.rate_limit.enabled {
        let limiter = create_rate_limiter(&config.rate_limit);
        app = app.layer(from_fn(move |request: Request, next: Next| {
            rate_limit_middleware(request, next, limiter.clone())
        }));
    }

    // Compose the app
    app.layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(
            config.server.max_upload_bytes + MULTIPART_OVERHEAD_BYTES,
        ))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.server.cors_origins))
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// CORS for the SPA; credentials require explicit origins, methods and headers
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static("apollo-require-preflight"),
        ])
        .allow_credentials(true)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use receiptbox_common::config::RateLimitConfig;
    use receiptbox_common::llm::MockChatClient;
    use receiptbox_common::ocr::MockOcr;
    use receiptbox_common::storage::LocalStorage;
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "receiptbox-test-boundary";

    async fn test_app(config: AppConfig) -> (Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = DbPool::in_memory().await.unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path(), "/uploads"));
        let extractor = ReceiptExtractor::new(
            Arc::new(MockOcr::default()),
            Arc::new(MockChatClient::default()),
        );

        let state = AppState::new(Arc::new(config), db, storage, extractor, None);
        (create_router(state), dir)
    }

    async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    fn multipart_upload(filename: &str, bytes: &[u8]) -> Request<Body> {
        let operations = r#"{"query":"mutation($file: Upload!) { uploadReceipt(file: $file) { id storeName imageUrl items { name } } }","variables":{"file":null}}"#;

        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"operations\"\r\n\r\n{ops}\r\n\
                 --{b}\r\nContent-Disposition: form-data; name=\"map\"\r\n\r\n{{\"0\":[\"variables.file\"]}}\r\n\
                 --{b}\r\nContent-Disposition: form-data; name=\"0\"; filename=\"{name}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n",
                b = BOUNDARY,
                ops = operations,
                name = filename,
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/graphql")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let (app, _dir) = test_app(AppConfig::default()).await;

        let response = app.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(body_json(response).await["status"], "healthy");

        let response = app.oneshot(get("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ready");
        assert_eq!(body["checks"]["database"]["up"], true);
        assert_eq!(body["checks"]["storage"]["up"], true);
    }

    #[tokio::test]
    async fn test_not_ready_when_upload_dir_unusable() {
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("uploads");
        std::fs::write(&blocked, b"file in the way").unwrap();

        let state = AppState::new(
            Arc::new(AppConfig::default()),
            DbPool::in_memory().await.unwrap(),
            Arc::new(LocalStorage::new(&blocked, "/uploads")),
            ReceiptExtractor::new(Arc::new(MockOcr::default()), Arc::new(MockChatClient::default())),
            None,
        );

        let response = create_router(state).oneshot(get("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = body_json(response).await;
        assert_eq!(body["status"], "not_ready");
        assert_eq!(body["checks"]["database"]["up"], true);
        assert_eq!(body["checks"]["storage"]["up"], false);
        assert!(body["checks"]["storage"]["error"].is_string());
    }

    #[tokio::test]
    async fn test_graphql_json_query() {
        let (app, _dir) = test_app(AppConfig::default()).await;

        let request = Request::builder()
            .method("POST")
            .uri("/graphql")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"query":"{ receipts { id } }"}"#))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["receipts"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_graphiql_page() {
        let (app, _dir) = test_app(AppConfig::default()).await;

        let response = app.oneshot(get("/graphql")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(html.contains("graphiql"));
    }

    #[tokio::test]
    async fn test_multipart_upload_then_fetch_image() {
        let (app, _dir) = test_app(AppConfig::default()).await;

        let response = app
            .clone()
            .oneshot(multipart_upload("receipt.png", b"\x89PNG-bytes"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let receipt = &body["data"]["uploadReceipt"];
        assert_eq!(receipt["storeName"], "Corner Grocer");
        assert_eq!(receipt["items"].as_array().unwrap().len(), 2);

        let image_url = receipt["imageUrl"].as_str().unwrap();
        let response = app.oneshot(get(image_url)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(body_bytes(response).await, b"\x89PNG-bytes");
    }

    #[tokio::test]
    async fn test_multipart_upload_rejects_non_image() {
        let (app, dir) = test_app(AppConfig::default()).await;

        let response = app
            .oneshot(multipart_upload("invoice.pdf", b"%PDF"))
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["errors"][0]["extensions"]["code"], "INVALID_FILE_TYPE");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_image_is_404() {
        let (app, _dir) = test_app(AppConfig::default()).await;

        let response = app.oneshot(get("/uploads/nothing-here.png")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_metrics_disabled_is_404() {
        let (app, _dir) = test_app(AppConfig::default()).await;

        let response = app.oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_front_end() {
        let (app, _dir) = test_app(AppConfig::default()).await;

        let request = Request::builder()
            .method("OPTIONS")
            .uri("/graphql")
            .header(header::ORIGIN, "http://localhost:3000")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:3000");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[tokio::test]
    async fn test_rate_limit_returns_429() {
        let config = AppConfig {
            rate_limit: RateLimitConfig {
                requests_per_second: 1,
                burst: 1,
                enabled: true,
            },
            ..AppConfig::default()
        };
        let (app, _dir) = test_app(config).await;

        let first = app.clone().oneshot(get("/health")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
