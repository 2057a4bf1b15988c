//! Prometheus-kompatible Metriken fuer Kryptochat
//!
//! Registrierte Metriken:
//! - `kryptochat_connected_clients` – Gauge: Aktuell verbundene Clients
//! - `kryptochat_rooms_active` – Gauge: Existierende Raeume
//! - `kryptochat_envelopes_relayed_total` – Counter: Zugestellte Chat-Envelopes
//! - `kryptochat_key_distributions_total` – Counter: Zugestellte Raum-Schluessel
//! - `kryptochat_key_submissions_total` – Counter: Schluessel-Einreichungen (result)
//! - `kryptochat_dropped_messages_total` – Counter: Verworfene Nachrichten (reason)

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Ergebnis-Label fuer angenommene Einreichungen
pub const EINREICHUNG_ANGENOMMEN: &str = "accepted";
/// Ergebnis-Label fuer abgelehnte Einreichungen
pub const EINREICHUNG_ABGELEHNT: &str = "rejected";

/// Alle Kryptochat-Prometheus-Metriken
///
/// Clone teilt die Registry und alle Zaehler.
#[derive(Clone)]
pub struct RelayMetrics {
    pub registry: Arc<Registry>,

    pub connected_clients: IntGauge,
    pub rooms_active: IntGauge,
    pub envelopes_relayed_total: IntCounter,
    pub key_distributions_total: IntCounter,
    pub key_submissions_total: IntCounterVec,
    pub dropped_messages_total: IntCounterVec,
}

impl RelayMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let connected_clients = IntGauge::with_opts(Opts::new(
            "kryptochat_connected_clients",
            "Anzahl aktuell verbundener Clients",
        ))?;
        registry.register(Box::new(connected_clients.clone()))?;

        let rooms_active = IntGauge::with_opts(Opts::new(
            "kryptochat_rooms_active",
            "Anzahl existierender Raeume",
        ))?;
        registry.register(Box::new(rooms_active.clone()))?;

        let envelopes_relayed_total = IntCounter::with_opts(Opts::new(
            "kryptochat_envelopes_relayed_total",
            "Gesamtanzahl zugestellter Chat-Envelopes (pro Empfaenger)",
        ))?;
        registry.register(Box::new(envelopes_relayed_total.clone()))?;

        let key_distributions_total = IntCounter::with_opts(Opts::new(
            "kryptochat_key_distributions_total",
            "Gesamtanzahl zugestellter Raum-Schluessel (pro Empfaenger)",
        ))?;
        registry.register(Box::new(key_distributions_total.clone()))?;

        let key_submissions_total = IntCounterVec::new(
            Opts::new(
                "kryptochat_key_submissions_total",
                "Schluessel-Einreichungen nach Ergebnis",
            ),
            &["result"],
        )?;
        registry.register(Box::new(key_submissions_total.clone()))?;

        let dropped_messages_total = IntCounterVec::new(
            Opts::new(
                "kryptochat_dropped_messages_total",
                "Verworfene Client-Nachrichten nach Grund",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(dropped_messages_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connected_clients,
            rooms_active,
            envelopes_relayed_total,
            key_distributions_total,
            key_submissions_total,
            dropped_messages_total,
        })
    }

    /// Zaehlt eine Einreichung (`accepted` oder `rejected`)
    pub fn einreichung_zaehlen(&self, angenommen: bool) {
        let label = if angenommen {
            EINREICHUNG_ANGENOMMEN
        } else {
            EINREICHUNG_ABGELEHNT
        };
        self.key_submissions_total.with_label_values(&[label]).inc();
    }

    /// Zaehlt eine verworfene Nachricht
    pub fn verworfen_zaehlen(&self, grund: &str) {
        self.dropped_messages_total.with_label_values(&[grund]).inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: RelayMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<RelayMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
