//! Health-Check-Endpunkt fuer Kryptochat
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime, Raum- und Client-Anzahl

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::metrics::RelayMetrics;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    ShuttingDown,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub rooms: i64,
    pub clients: i64,
}

/// Geteilter Zustand fuer den Health-Check-Handler
///
/// Raum- und Client-Anzahl werden aus den Gauges gelesen.
#[derive(Clone)]
pub struct HealthState {
    start_time: Arc<Instant>,
    herunterfahren: Arc<AtomicBool>,
    metriken: RelayMetrics,
}

impl HealthState {
    pub fn neu(metriken: RelayMetrics) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            herunterfahren: Arc::new(AtomicBool::new(false)),
            metriken,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Markiert den Server als herunterfahrend (`/health` liefert dann 503)
    pub fn herunterfahren_melden(&self) {
        self.herunterfahren.store(true, Ordering::Relaxed);
    }

    /// Baut die aktuelle Health-Antwort
    pub fn antwort(&self) -> HealthResponse {
        let status = if self.herunterfahren.load(Ordering::Relaxed) {
            HealthStatus::ShuttingDown
        } else {
            HealthStatus::Healthy
        };
        HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            rooms: self.metriken.rooms_active.get(),
            clients: self.metriken.connected_clients.get(),
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
        HealthStatus::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
    };
    (http_status, Json(response))
}
