//! Liveness endpoint. `GET /health` (and `/`) report uptime and scheduler job status.

use crate::domain::DomainError;
use crate::ports::Clock;
use crate::usecases::scheduler::{SchedulerHandle, SchedulerStatus};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::info;

#[derive(Clone)]
pub struct HealthState {
    started_at: Instant,
    scheduler: SchedulerHandle,
    clock: Arc<dyn Clock>,
}

impl HealthState {
    pub fn new(scheduler: SchedulerHandle, clock: Arc<dyn Clock>) -> Self {
        Self {
            started_at: Instant::now(),
            scheduler,
            clock,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
    pub scheduler: SchedulerStatus,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: state.clock.now(),
        scheduler: state.scheduler.status(),
    })
}

/// Serve until `shutdown` flips to true.
pub async fn serve(
    port: u16,
    state: HealthState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), DomainError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| DomainError::Config(format!("cannot bind health port {port}: {e}")))?;
    info!(%addr, "health check server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .map_err(|e| DomainError::Config(format!("health server failed: {e}")))?;

    info!("health check server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::FixedClock;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_health_reports_scheduler_jobs() {
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap();
        let handle = SchedulerHandle::default();
        handle.register_job("daily_reports", "Daily report delivery", Some(now));
        handle.set_running(true);

        let state = HealthState::new(handle, Arc::new(FixedClock(now)));
        let Json(body) = health(State(state)).await;

        assert_eq!(body.status, "healthy");
        assert_eq!(body.timestamp, now);
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["scheduler"]["running"], true);
        assert_eq!(value["scheduler"]["jobs"][0]["id"], "daily_reports");
        assert!(value["uptime_seconds"].is_u64());
    }
}
