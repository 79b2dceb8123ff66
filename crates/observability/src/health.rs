//! Health-Check-Endpunkt fuer deskproxy
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und laufenden Verbindungen

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::metrics::ProxyMetrics;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Server faehrt herunter und nimmt keine Verbindungen mehr an
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub aktive_verbindungen: i64,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    bereit: Arc<AtomicBool>,
    metriken: ProxyMetrics,
}

impl HealthState {
    pub fn neu(metriken: ProxyMetrics) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            bereit: Arc::new(AtomicBool::new(true)),
            metriken,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn ist_bereit(&self) -> bool {
        self.bereit.load(Ordering::Relaxed)
    }

    /// Wird beim Herunterfahren auf `false` gesetzt
    pub fn bereit_setzen(&self, bereit: bool) {
        self.bereit.store(bereit, Ordering::Relaxed);
    }

    pub fn antwort(&self) -> HealthResponse {
        let status = if self.ist_bereit() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };

        HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            aktive_verbindungen: self.metriken.aktive_verbindungen_gesamt(),
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let response = state.antwort();
    let http_status = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (http_status, Json(response))
}
