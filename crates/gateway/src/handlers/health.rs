//! Liveness and readiness probes

use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use receiptbox_common::errors::Result;
use serde::Serialize;
use std::future::Future;
use std::time::Instant;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub checks: ReadyChecks,
}

/// One entry per dependency an upload needs
#[derive(Serialize)]
pub struct ReadyChecks {
    pub database: Probe,
    pub storage: Probe,
}

#[derive(Serialize)]
pub struct Probe {
    pub up: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Probe {
    async fn run(name: &str, check: impl Future<Output = Result<()>>) -> Self {
        let started = Instant::now();
        let outcome = check.await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => Self { up: true, latency_ms, error: None },
            Err(e) => {
                tracing::warn!(dependency = name, error = %e, "Readiness probe failed");
                Self { up: false, latency_ms, error: Some(e.to_string()) }
            }
        }
    }
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: receiptbox_common::VERSION,
    })
}

/// GET /ready; 503 until both the database and the image store answer
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let checks = ReadyChecks {
        database: Probe::run("database", state.db.ping()).await,
        storage: Probe::run("storage", state.storage.check()).await,
    };

    if checks.database.up && checks.storage.up {
        (StatusCode::OK, Json(ReadyResponse { status: "ready", checks }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse { status: "not_ready", checks }),
        )
    }
}
