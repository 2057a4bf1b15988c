//! # kryptochat-observability
//!
//! Observability-Crate fuer Kryptochat:
//! - Prometheus-kompatible Metriken (`/metrics`)
//! - Health-Check-Endpunkt (`/health`)
//! - Structured Logging via tracing-subscriber

pub mod health;
pub mod logging;
pub mod metrics;

pub use health::{health_router, HealthResponse, HealthState, HealthStatus};
pub use logging::logging_initialisieren;
pub use metrics::{metrics_router, RelayMetrics};

use anyhow::Result;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Startet den Observability-HTTP-Server (Metriken + Health)
///
/// Endpunkte:
/// - `GET /metrics` – Prometheus scrape format
/// - `GET /health`  – Health-Check JSON
///
/// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
pub async fn observability_server_starten(
    bind_addr: SocketAddr,
    metriken: RelayMetrics,
    health: HealthState,
    shutdown_rx: watch::Receiver<bool>,
    nachlauf: Duration,
) -> Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Observability-Server gestartet");
    observability_server_ausfuehren(listener, metriken, health, shutdown_rx, nachlauf).await
}

/// Bedient `/metrics` und `/health` auf einem bereits gebundenen Listener
///
/// Mit dem Shutdown-Signal meldet `/health` sofort 503. Die Endpunkte
/// bleiben danach noch `nachlauf` lang erreichbar.
pub async fn observability_server_ausfuehren(
    listener: TcpListener,
    metriken: RelayMetrics,
    health: HealthState,
    mut shutdown_rx: watch::Receiver<bool>,
    nachlauf: Duration,
) -> Result<()> {
    use axum::Router;

    let app = Router::new()
        .merge(metrics_router(metriken))
        .merge(health_router(health.clone()));

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while shutdown_rx.changed().await.is_ok() {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
            health.herunterfahren_melden();
            tracing::info!(nachlauf_ms = nachlauf.as_millis() as u64, "Health meldet Shutdown");
            tokio::time::sleep(nachlauf).await;
        })
        .await?;

    tracing::info!("Observability-Server gestoppt");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn http_get(addr: SocketAddr, pfad: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let anfrage = format!("GET {pfad} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(anfrage.as_bytes()).await.unwrap();
        let mut antwort = Vec::new();
        stream.read_to_end(&mut antwort).await.unwrap();
        String::from_utf8_lossy(&antwort).into_owned()
    }

    #[tokio::test]
    async fn health_meldet_503_waehrend_des_nachlaufs() {
        let metriken = RelayMetrics::neu().unwrap();
        let health = HealthState::neu(metriken.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let server = tokio::spawn(observability_server_ausfuehren(
            listener,
            metriken,
            health.clone(),
            shutdown_rx,
            Duration::from_millis(500),
        ));

        let vorher = http_get(addr, "/health").await;
        assert!(vorher.starts_with("HTTP/1.1 200"), "{vorher}");

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while health.antwort().status != HealthStatus::ShuttingDown {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let nachher = http_get(addr, "/health").await;
        assert!(nachher.starts_with("HTTP/1.1 503"), "{nachher}");
        assert!(nachher.contains("shutting_down"));

        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
